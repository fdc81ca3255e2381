//! Portal HTTP Client Implementation
//!
//! Sends a multipart form to `{base_url}/api/create-news/`. HTTP 200 and 201
//! count as delivered; anything else, including transport failures and the
//! request timeout, is reported as a failed delivery.

use std::time::{Duration, Instant};

use reqwest::multipart::{Form, Part};

use crate::{
    DeliveryResult, MediaFile, PortalError, PortalService, PublishPayload, CREATE_NEWS_PATH,
};

/// Real portal client
pub struct PortalClient {
    http: reqwest::Client,
}

impl PortalClient {
    pub fn new(timeout: Duration) -> Result<Self, PortalError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PortalError::Configuration(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http })
    }

    fn endpoint(base_url: &str) -> String {
        format!("{}{}", base_url.trim_end_matches('/'), CREATE_NEWS_PATH)
    }

    fn form(payload: &PublishPayload, media: Option<&MediaFile>) -> Form {
        let mut form = payload
            .form_fields()
            .into_iter()
            .fold(Form::new(), |form, (name, value)| form.text(name, value));

        if let Some(media) = media {
            form = form.part(
                "post_image",
                Part::bytes(media.bytes.clone()).file_name(media.file_name.clone()),
            );
        }
        form
    }
}

#[async_trait::async_trait]
impl PortalService for PortalClient {
    async fn send(
        &self,
        base_url: &str,
        payload: &PublishPayload,
        media: Option<&MediaFile>,
    ) -> DeliveryResult {
        let url = Self::endpoint(base_url);
        let started = Instant::now();

        tracing::debug!(url = %url, has_media = media.is_some(), "Posting news to portal");

        let outcome = self
            .http
            .post(&url)
            .multipart(Self::form(payload, media))
            .send()
            .await;

        let (success, message, status_code) = match outcome {
            Ok(response) => {
                let status = response.status().as_u16();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("Failed to read response body: {}", e));
                (matches!(status, 200 | 201), body, Some(status))
            }
            Err(e) => (false, e.to_string(), None),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            url = %url,
            success,
            status = ?status_code,
            elapsed_ms,
            "Portal responded"
        );

        DeliveryResult {
            success,
            message,
            status_code,
            elapsed_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample_payload;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> PortalClient {
        PortalClient::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_created_is_success_with_body_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/create-news/"))
            .and(body_string_contains("name=\"post_title\""))
            .and(body_string_contains("name=\"BreakingNews\""))
            .respond_with(ResponseTemplate::new(201).set_body_string("{\"id\": 991}"))
            .expect(1)
            .mount(&server)
            .await;

        let result = client().send(&server.uri(), &sample_payload(), None).await;

        assert!(result.success);
        assert_eq!(result.message, "{\"id\": 991}");
        assert_eq!(result.status_code, Some(201));
    }

    #[tokio::test]
    async fn test_trailing_slash_in_base_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/create-news/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let base = format!("{}/", server.uri());
        let result = client().send(&base, &sample_payload(), None).await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_server_error_body_is_kept_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("db error"))
            .mount(&server)
            .await;

        let result = client().send(&server.uri(), &sample_payload(), None).await;

        assert!(!result.success);
        assert_eq!(result.message, "db error");
        assert_eq!(result.status_code, Some(500));
    }

    #[tokio::test]
    async fn test_accepted_is_not_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(202).set_body_string("queued"))
            .mount(&server)
            .await;

        let result = client().send(&server.uri(), &sample_payload(), None).await;
        assert!(!result.success);
        assert_eq!(result.message, "queued");
    }

    #[tokio::test]
    async fn test_media_is_sent_as_post_image() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("name=\"post_image\"; filename=\"cover.jpg\""))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let media = MediaFile {
            file_name: "cover.jpg".to_string(),
            bytes: b"jpegdata".to_vec(),
        };
        let result = client()
            .send(&server.uri(), &sample_payload(), Some(&media))
            .await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_timeout_is_failed_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(201).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let client = PortalClient::new(Duration::from_millis(50)).unwrap();
        let result = client.send(&server.uri(), &sample_payload(), None).await;

        assert!(!result.success);
        assert!(result.status_code.is_none());
        assert!(!result.message.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_failed_delivery() {
        let result = client()
            .send("http://127.0.0.1:1", &sample_payload(), None)
            .await;
        assert!(!result.success);
        assert!(result.status_code.is_none());
        assert!(!result.message.is_empty());
    }
}
