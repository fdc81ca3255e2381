//! Mock LLM Service Implementation
//!
//! Used by `LlmServiceFactory` when provider is `"mock"` and by tests.
//! By default it echoes back the first JSON object found in the last user
//! message, which makes a rewrite request round-trip to the original text.
//! Tests can install a handler to script per-request replies.

use std::sync::{Arc, Mutex};

use crate::{CompletionRequest, CompletionResponse, LlmError, LlmService};

pub const MOCK_MODEL: &str = "mock-model";

type Handler = dyn Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync;

/// Mock LLM service for testing
#[derive(Clone)]
pub struct MockLlmService {
    handler: Option<Arc<Handler>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl std::fmt::Debug for MockLlmService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLlmService")
            .field("scripted", &self.handler.is_some())
            .finish()
    }
}

impl MockLlmService {
    pub fn new() -> Self {
        Self {
            handler: None,
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply to every request through `handler`
    pub fn with_handler<F>(handler: F) -> Self
    where
        F: Fn(&CompletionRequest) -> Result<String, LlmError> + Send + Sync + 'static,
    {
        Self {
            handler: Some(Arc::new(handler)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Reply to every request with the same text
    pub fn with_reply(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::with_handler(move |_| Ok(reply.clone()))
    }

    /// Return all recorded requests
    pub fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .expect("requests lock poisoned: prior test panicked")
            .clone()
    }

    fn echo(request: &CompletionRequest) -> String {
        let last_message = request
            .messages
            .last()
            .map(|m| m.content.as_str())
            .unwrap_or("empty");

        match (last_message.find('{'), last_message.rfind('}')) {
            (Some(start), Some(end)) if start < end => last_message[start..=end].to_string(),
            _ => format!("Mock response to: {}", last_message),
        }
    }
}

impl Default for MockLlmService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmService for MockLlmService {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        tracing::debug!("Mock LLM service processing completion request");

        self.requests
            .lock()
            .map_err(|e| LlmError::Request(format!("requests lock poisoned: {e}")))?
            .push(request.clone());

        let content = match &self.handler {
            Some(handler) => handler(&request)?,
            None => Self::echo(&request),
        };

        let model = if request.model.is_empty() {
            MOCK_MODEL.to_string()
        } else {
            request.model
        };
        let input_tokens = request
            .messages
            .iter()
            .map(|m| m.content.len() as i32 / 4)
            .sum::<i32>();
        let output_tokens = content.len() as i32 / 4;

        Ok(CompletionResponse {
            content,
            model,
            input_tokens,
            output_tokens,
            stop_reason: "end_turn".to_string(),
        })
    }

    fn default_model(&self) -> &str {
        MOCK_MODEL
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LlmMessage;

    fn request(content: &str) -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            system_prompt: None,
            messages: vec![LlmMessage::user(content)],
            max_tokens: None,
        }
    }

    #[tokio::test]
    async fn test_mock_echoes_embedded_json() {
        let service = MockLlmService::new();
        let response = service
            .complete(request("Rewrite this:\n{\"title\": \"A\"}\nThanks"))
            .await
            .unwrap();

        assert_eq!(response.content, "{\"title\": \"A\"}");
        assert_eq!(response.model, MOCK_MODEL);
        assert_eq!(response.stop_reason, "end_turn");
    }

    #[tokio::test]
    async fn test_mock_without_json_returns_plain_text() {
        let service = MockLlmService::new();
        let response = service.complete(request("Hello, world!")).await.unwrap();
        assert_eq!(response.content, "Mock response to: Hello, world!");
    }

    #[tokio::test]
    async fn test_mock_handler_can_fail() {
        let service =
            MockLlmService::with_handler(|_| Err(LlmError::Request("boom".to_string())));
        let err = service.complete(request("x")).await.unwrap_err();
        assert_eq!(err, LlmError::Request("boom".to_string()));
        assert_eq!(service.recorded_requests().len(), 1);
    }

    #[tokio::test]
    async fn test_mock_uses_provided_model() {
        let service = MockLlmService::with_reply("ok");
        let mut req = request("Test");
        req.model = "custom-model".to_string();
        let response = service.complete(req).await.unwrap();
        assert_eq!(response.model, "custom-model");
        assert_eq!(response.content, "ok");
    }
}
