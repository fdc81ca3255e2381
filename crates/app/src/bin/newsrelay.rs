//! Newsrelay command line
//!
//! Publishes content items to their mapped destinations and inspects the
//! distribution ledger.

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use newsrelay_app::{connect, create_app, init_tracing, parse_exclusion};
use newsrelay_common::config::Config;
use newsrelay_distribution::{CatalogStore, DistributionStore, PublishRequest};

/// Newsrelay - multi-portal news distribution
#[derive(Parser, Debug)]
#[command(name = "newsrelay")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Publish a content item to every destination mapped for its category
    Publish {
        /// Content item id
        content_id: Uuid,

        /// Id of the user publishing
        #[arg(long)]
        user: Uuid,

        /// Destination id or name to skip; replaces the item's stored exclusions
        #[arg(long = "exclude")]
        exclusions: Vec<String>,

        /// Publish under this category instead of the item's own
        #[arg(long, conflicts_with = "group")]
        category: Option<Uuid>,

        /// Publish across every category of a group
        #[arg(long)]
        group: Option<Uuid>,
    },

    /// Show the distribution records of a content item
    Status {
        /// Content item id
        content_id: Uuid,
    },

    /// Make a mapping the default for its destination
    SetDefaultMapping {
        /// Category mapping id
        mapping_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(&config);
    info!(config = ?config, "Configuration loaded");

    let pool = connect(&config).await.map_err(|e| {
        error!("Failed to prepare database: {}", e);
        e
    })?;
    info!("Database connection established");

    let app = create_app(&config, pool).map_err(|e| {
        error!("Failed to create application: {}", e);
        e
    })?;

    match cli.command {
        Commands::Publish {
            content_id,
            user,
            exclusions,
            category,
            group,
        } => {
            let mut request = PublishRequest::new(content_id, user)
                .with_exclusions(exclusions.iter().map(|e| parse_exclusion(e)).collect());
            if let Some(category) = category {
                request = request.with_category(category);
            }
            if let Some(group) = group {
                request = request.with_group(group);
            }

            let cancel = CancellationToken::new();
            tokio::spawn(cancel_on_signal(cancel.clone()));

            let report = app.publisher.publish(request, cancel).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.all_succeeded() {
                warn!(content_id = %content_id, "Some destinations were not published");
            }
        }
        Commands::Status { content_id } => {
            let records = app.repos.records.list_by_content(content_id).await?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::SetDefaultMapping { mapping_id } => {
            let mapping = app.repos.catalog.set_default_mapping(mapping_id).await?;
            println!("{}", serde_json::to_string_pretty(&mapping)?);
        }
    }

    Ok(())
}

/// Cancel the batch on Ctrl+C. Targets already in flight are marked failed.
async fn cancel_on_signal(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            warn!("Received Ctrl+C signal, cancelling publish");
            cancel.cancel();
        }
        Err(e) => error!("Failed to install Ctrl+C handler: {}", e),
    }
}
