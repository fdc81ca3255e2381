//! Configuration management following 12-factor app principles
//!
//! All configuration is loaded from environment variables to ensure
//! clean separation between code and config. Service-specific settings
//! (LLM provider, portal client) live next to their services.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

const DEFAULT_PUBLISH_CONCURRENCY: usize = 4;

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database connection URL (PostgreSQL)
    pub database_url: String,

    /// Maximum number of destinations processed at once by one publish batch
    pub publish_concurrency: usize,

    /// Optional deadline for a whole publish batch, in seconds
    pub publish_deadline_secs: Option<u64>,

    /// Runtime configuration
    pub rust_log: String,
    pub log_format: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("publish_concurrency", &self.publish_concurrency)
            .field("publish_deadline_secs", &self.publish_deadline_secs)
            .field("rust_log", &self.rust_log)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // Load .env file if it exists

        let config = Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL is required"))?,

            publish_concurrency: parse_concurrency(env::var("PUBLISH_CONCURRENCY").ok()),
            publish_deadline_secs: env::var("PUBLISH_DEADLINE_SECS")
                .ok()
                .and_then(|v| v.parse().ok()),

            rust_log: env::var("RUST_LOG").unwrap_or_else(|_| "newsrelay=debug".to_string()),
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
        };

        Ok(config)
    }

    /// Whether logs should be emitted as JSON lines
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// Parse the concurrency setting, falling back to the default and never below 1
fn parse_concurrency(raw: Option<String>) -> usize {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(DEFAULT_PUBLISH_CONCURRENCY)
        .max(1)
}
