//! Mock Portal Service Implementation
//!
//! Records every delivery for test assertions and answers with a
//! programmable response per destination base URL (default: 201 "created").
//! Thread-safe via `Arc<Mutex<>>`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::{DeliveryResult, MediaFile, PortalService, PublishPayload};

/// How the mock answers a delivery
#[derive(Debug, Clone, PartialEq)]
pub enum MockPortalResponse {
    /// HTTP response with status and body
    Status(u16, String),
    /// Transport-level failure with the given error text
    Transport(String),
}

impl Default for MockPortalResponse {
    fn default() -> Self {
        Self::Status(201, "created".to_string())
    }
}

/// One recorded delivery
#[derive(Debug, Clone)]
pub struct RecordedDelivery {
    pub base_url: String,
    pub payload: PublishPayload,
    pub media_file_name: Option<String>,
}

/// Mock portal service that records deliveries
#[derive(Debug, Clone, Default)]
pub struct MockPortalService {
    deliveries: Arc<Mutex<Vec<RecordedDelivery>>>,
    responses: Arc<Mutex<HashMap<String, MockPortalResponse>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl MockPortalService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure the response for one destination base URL
    pub fn set_response(&self, base_url: impl Into<String>, response: MockPortalResponse) {
        self.responses
            .lock()
            .expect("responses lock poisoned: prior test panicked")
            .insert(base_url.into(), response);
    }

    /// Delay every delivery, to hold work at the suspension point
    pub fn set_delay(&self, delay: Duration) {
        *self
            .delay
            .lock()
            .expect("delay lock poisoned: prior test panicked") = Some(delay);
    }

    /// Return all recorded deliveries
    pub fn recorded_deliveries(&self) -> Vec<RecordedDelivery> {
        self.deliveries
            .lock()
            .expect("deliveries lock poisoned: prior test panicked")
            .clone()
    }

    /// Clear recorded deliveries and configured responses
    pub fn reset(&self) {
        self.deliveries
            .lock()
            .expect("deliveries lock poisoned: prior test panicked")
            .clear();
        self.responses
            .lock()
            .expect("responses lock poisoned: prior test panicked")
            .clear();
    }
}

#[async_trait::async_trait]
impl PortalService for MockPortalService {
    async fn send(
        &self,
        base_url: &str,
        payload: &PublishPayload,
        media: Option<&MediaFile>,
    ) -> DeliveryResult {
        tracing::debug!(base_url = %base_url, "Mock portal: recording delivery");

        let delay = self.delay.lock().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Ok(mut deliveries) = self.deliveries.lock() {
            deliveries.push(RecordedDelivery {
                base_url: base_url.to_string(),
                payload: payload.clone(),
                media_file_name: media.map(|m| m.file_name.clone()),
            });
        }

        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|r| r.get(base_url).cloned())
            .unwrap_or_default();

        let elapsed_ms = delay.map(|d| d.as_millis() as u64).unwrap_or(0);
        match response {
            MockPortalResponse::Status(code, body) => DeliveryResult {
                success: matches!(code, 200 | 201),
                message: body,
                status_code: Some(code),
                elapsed_ms,
            },
            MockPortalResponse::Transport(message) => DeliveryResult {
                success: false,
                message,
                status_code: None,
                elapsed_ms,
            },
        }
    }
}
