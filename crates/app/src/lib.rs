//! Newsrelay application composition root
//!
//! Wires configuration, the database pool, the generative provider and the
//! portal client into a [`DistributionPublisher`].

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use newsrelay_common::Config;
use newsrelay_distribution::{
    DistributionPublisher, DistributionRepositories, Exclusion, PublisherSettings,
};
use newsrelay_llm::{LlmConfig, LlmService, LlmServiceFactory};
use newsrelay_portal::{PortalConfig, PortalService, PortalServiceFactory};

/// Everything a command needs
pub struct App {
    pub repos: DistributionRepositories,
    pub publisher: DistributionPublisher,
}

/// Install the global subscriber. `LOG_FORMAT=json` selects JSON lines.
pub fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log));

    if config.json_logs() {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).pretty().init();
    }
}

/// Connect and bring the schema up to date
pub async fn connect(config: &Config) -> Result<PgPool, anyhow::Error> {
    let pool = PgPool::connect(&config.database_url)
        .await
        .map_err(|e| anyhow::anyhow!("Database connection failed: {}", e))?;

    sqlx::migrate!("../../migrations")
        .run(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("Database migration failed: {}", e))?;

    Ok(pool)
}

/// Build the publisher and repositories from environment configuration
pub fn create_app(config: &Config, pool: PgPool) -> Result<App, anyhow::Error> {
    let llm_config = LlmConfig::from_env()?;
    tracing::info!(config = ?llm_config, "LLM configuration loaded");
    let llm: Arc<dyn LlmService> = Arc::from(LlmServiceFactory::create(llm_config)?);

    let portal_config = PortalConfig::from_env()?;
    let settings = publisher_settings(config, &portal_config);
    let portal: Arc<dyn PortalService> = Arc::from(PortalServiceFactory::create(portal_config)?);

    let repos = DistributionRepositories::new(pool);
    let publisher = DistributionPublisher::new(
        Arc::new(repos.catalog.clone()),
        Arc::new(repos.records.clone()),
        llm,
        portal,
        settings,
    );

    Ok(App { repos, publisher })
}

pub fn publisher_settings(config: &Config, portal: &PortalConfig) -> PublisherSettings {
    PublisherSettings {
        concurrency: config.publish_concurrency.max(1),
        deadline: config.publish_deadline_secs.map(Duration::from_secs),
        media_root: portal.media_root.clone(),
        ..PublisherSettings::default()
    }
}

/// A command-line exclusion: a destination id when it parses as one, otherwise a name
pub fn parse_exclusion(raw: &str) -> Exclusion {
    let raw = raw.trim();
    match Uuid::parse_str(raw) {
        Ok(id) => Exclusion::Id(id),
        Err(_) => Exclusion::Name(raw.to_string()),
    }
}
