//! Newsrelay Portal Service
//!
//! Delivers rewritten news items to destination portals:
//! - Multipart HTTP client for `POST {base_url}/api/create-news/`
//! - Mock portal service for testing and development
//! - Configurable provider, request timeout and media root
//!
//! Delivery never returns an error. Every outcome, including transport
//! failures, is folded into a [`DeliveryResult`] whose message is the
//! destination's response body or the transport error text, verbatim.

pub mod client;
pub mod mock;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_TIMEOUT_SECS: u64 = 90;

/// Path of the ingestion endpoint relative to a destination's base URL
pub const CREATE_NEWS_PATH: &str = "/api/create-news/";

#[derive(Error, Debug)]
pub enum PortalError {
    #[error("Portal configuration error: {0}")]
    Configuration(String),

    #[error("Portal media error: {0}")]
    Media(String),
}

/// Fixed form-field contract of a destination's ingestion endpoint.
///
/// Field names on the wire are the destination API's, see [`PublishPayload::form_fields`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishPayload {
    /// External id of the destination category
    pub post_cat: String,
    pub post_title: String,
    pub post_short_des: String,
    pub post_des: String,
    pub meta_title: String,
    pub slug: String,
    pub post_tag: String,
    /// Author identity at the destination
    pub author: String,
    pub event_date: chrono::NaiveDate,
    pub event_end_date: chrono::NaiveDate,
    pub schedule_date: chrono::DateTime<chrono::Utc>,
    pub is_active: bool,
    pub event: bool,
    pub head_lines: bool,
    pub articles: bool,
    pub trending: bool,
    pub breaking_news: bool,
    pub post_status: i32,
}

impl PublishPayload {
    /// Form fields in wire order, with flags encoded as `0`/`1`
    pub fn form_fields(&self) -> Vec<(&'static str, String)> {
        let flag = |b: bool| if b { "1" } else { "0" }.to_string();
        vec![
            ("post_cat", self.post_cat.clone()),
            ("post_title", self.post_title.clone()),
            ("post_short_des", self.post_short_des.clone()),
            ("post_des", self.post_des.clone()),
            ("meta_title", self.meta_title.clone()),
            ("slug", self.slug.clone()),
            ("post_tag", self.post_tag.clone()),
            ("author", self.author.clone()),
            ("Event_date", self.event_date.format("%Y-%m-%d").to_string()),
            (
                "Eventend_date",
                self.event_end_date.format("%Y-%m-%d").to_string(),
            ),
            ("schedule_date", self.schedule_date.to_rfc3339()),
            ("is_active", flag(self.is_active)),
            ("Event", flag(self.event)),
            ("Head_Lines", flag(self.head_lines)),
            ("articles", flag(self.articles)),
            ("trending", flag(self.trending)),
            ("BreakingNews", flag(self.breaking_news)),
            ("post_status", self.post_status.to_string()),
        ]
    }
}

/// Binary media attached to a delivery as the `post_image` file field
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl MediaFile {
    /// Read a media reference relative to `media_root`
    pub async fn load(media_root: &std::path::Path, reference: &str) -> Result<Self, PortalError> {
        let path = media_root.join(reference.trim_start_matches('/'));
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| PortalError::Media(format!("{}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "post_image".to_string());
        Ok(Self { file_name, bytes })
    }
}

/// Outcome of one delivery attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryResult {
    /// True only for HTTP 200 and 201
    pub success: bool,
    /// Response body, or transport error text
    pub message: String,
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
}

/// Portal service configuration
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Portal provider (http, mock)
    pub provider: String,
    /// Bound on a single delivery
    pub timeout: Duration,
    /// Directory media references are resolved against
    pub media_root: PathBuf,
}

impl PortalConfig {
    /// Create portal config from environment variables
    pub fn from_env() -> Result<Self, PortalError> {
        dotenvy::dotenv().ok();

        let provider = std::env::var("PORTAL_PROVIDER").unwrap_or_else(|_| "http".to_string());
        let timeout_secs = match std::env::var("PORTAL_TIMEOUT_SECS") {
            Ok(raw) => raw.parse::<u64>().map_err(|_| {
                PortalError::Configuration(format!("PORTAL_TIMEOUT_SECS is not a number: {}", raw))
            })?,
            Err(_) => DEFAULT_TIMEOUT_SECS,
        };
        let media_root = std::env::var("MEDIA_ROOT").unwrap_or_else(|_| "media".to_string());

        Ok(Self {
            provider,
            timeout: Duration::from_secs(timeout_secs),
            media_root: PathBuf::from(media_root),
        })
    }
}

/// Portal service trait for different delivery backends
#[async_trait::async_trait]
pub trait PortalService: Send + Sync {
    /// Deliver one payload to the destination at `base_url`. Never retried internally.
    async fn send(
        &self,
        base_url: &str,
        payload: &PublishPayload,
        media: Option<&MediaFile>,
    ) -> DeliveryResult;
}

/// Factory for creating PortalService implementations
pub struct PortalServiceFactory;

impl PortalServiceFactory {
    pub fn create(config: PortalConfig) -> Result<Box<dyn PortalService>, PortalError> {
        match config.provider.as_str() {
            "http" => {
                tracing::info!(timeout_secs = config.timeout.as_secs(), "Creating HTTP portal client");
                Ok(Box::new(client::PortalClient::new(config.timeout)?))
            }
            "mock" => {
                tracing::info!("Creating mock portal service");
                Ok(Box::new(mock::MockPortalService::new()))
            }
            provider => Err(PortalError::Configuration(format!(
                "Unknown portal provider: {}. Supported providers: http, mock",
                provider
            ))),
        }
    }
}

#[cfg(test)]
pub(crate) fn sample_payload() -> PublishPayload {
    use chrono::TimeZone;

    PublishPayload {
        post_cat: "42".to_string(),
        post_title: "Title".to_string(),
        post_short_des: "Short".to_string(),
        post_des: "<p>Body</p>".to_string(),
        meta_title: "Meta".to_string(),
        slug: "meta".to_string(),
        post_tag: "politics".to_string(),
        author: "7".to_string(),
        event_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
        event_end_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        schedule_date: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap(),
        is_active: true,
        event: false,
        head_lines: true,
        articles: false,
        trending: false,
        breaking_news: true,
        post_status: 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_form_fields_encode_flags_and_dates() {
        let fields = sample_payload().form_fields();
        let get = |name: &str| {
            fields
                .iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.as_str())
                .unwrap()
        };

        assert_eq!(fields.len(), 18);
        assert_eq!(get("post_cat"), "42");
        assert_eq!(get("Event_date"), "2026-03-01");
        assert_eq!(get("Eventend_date"), "2026-03-02");
        assert_eq!(get("schedule_date"), "2026-03-01T09:30:00+00:00");
        assert_eq!(get("is_active"), "1");
        assert_eq!(get("Event"), "0");
        assert_eq!(get("Head_Lines"), "1");
        assert_eq!(get("BreakingNews"), "1");
        assert_eq!(get("post_status"), "3");
    }

    #[test]
    fn test_factory_http_succeeds() {
        let config = PortalConfig {
            provider: "http".to_string(),
            timeout: Duration::from_secs(5),
            media_root: PathBuf::from("media"),
        };
        assert!(PortalServiceFactory::create(config).is_ok());
    }

    #[test]
    fn test_factory_unknown_provider() {
        let config = PortalConfig {
            provider: "ftp".to_string(),
            timeout: Duration::from_secs(5),
            media_root: PathBuf::from("media"),
        };
        let err = match PortalServiceFactory::create(config) {
            Err(e) => e,
            Ok(_) => panic!("Expected error for unknown provider"),
        };
        assert!(err.to_string().contains("Unknown portal provider: ftp"));
    }

    #[tokio::test]
    async fn test_media_load_missing_file_is_media_error() {
        let err = MediaFile::load(std::path::Path::new("/nonexistent-root"), "img/a.jpg")
            .await
            .unwrap_err();
        assert!(matches!(err, PortalError::Media(_)));
        assert!(err.to_string().contains("/nonexistent-root/img/a.jpg"));
    }
}
