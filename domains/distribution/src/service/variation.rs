//! Content variation: canonical text or a destination-specific rewrite

use std::sync::Arc;

use newsrelay_llm::{CompletionRequest, LlmMessage, LlmService};

use crate::domain::entities::{CategoryMapping, ContentItem, Destination, RewrittenContent};
use crate::domain::rewrite::{self, RewriteParse, FALLBACK_PROMPT};
use crate::error::AiGenerationFailed;
use crate::repository::CatalogStore;

const RAW_LOG_LIMIT: usize = 500;

/// Produces the final fields sent to one destination
#[derive(Clone)]
pub struct ContentVariationResolver {
    llm: Arc<dyn LlmService>,
    catalog: Arc<dyn CatalogStore>,
}

impl ContentVariationResolver {
    pub fn new(llm: Arc<dyn LlmService>, catalog: Arc<dyn CatalogStore>) -> Self {
        Self { llm, catalog }
    }

    /// Canonical fields when the mapping says so, otherwise an AI rewrite.
    ///
    /// Every failure on the rewrite path, prompt lookup included, comes back
    /// as [`AiGenerationFailed`].
    pub async fn resolve(
        &self,
        item: &ContentItem,
        mapping: &CategoryMapping,
        destination: &Destination,
    ) -> Result<RewrittenContent, AiGenerationFailed> {
        if mapping.use_canonical_content {
            return Ok(RewrittenContent::canonical(item));
        }

        let failed = |cause: String| AiGenerationFailed {
            destination: destination.name.clone(),
            cause,
        };

        tracing::info!(destination = %destination.name, content_id = %item.id, "Started AI generation");

        let prompt = self
            .prompt_for(destination)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let request = CompletionRequest {
            model: self.llm.default_model().to_string(),
            system_prompt: Some(prompt),
            messages: vec![LlmMessage::user(rewrite::build_user_message(item))],
            max_tokens: None,
        };
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| failed(e.to_string()))?;

        let raw: String = response.content.chars().take(RAW_LOG_LIMIT).collect();
        tracing::info!(destination = %destination.name, raw = %raw, "Raw rewrite response (truncated)");

        match rewrite::parse_rewrite(&response.content) {
            RewriteParse::Valid(fields) => {
                tracing::info!(destination = %destination.name, "Generated AI variation");
                Ok(RewrittenContent::from_rewrite(fields, item))
            }
            RewriteParse::Malformed { reason, .. } => {
                tracing::warn!(destination = %destination.name, reason = %reason, "Malformed rewrite response");
                Err(failed(reason))
            }
        }
    }

    /// Destination prompt, else the global prompt, else the built-in instruction
    async fn prompt_for(&self, destination: &Destination) -> newsrelay_common::Result<String> {
        if let Some(prompt) = self.catalog.active_prompt(Some(destination.id)).await? {
            return Ok(prompt.prompt_text);
        }
        if let Some(prompt) = self.catalog.active_prompt(None).await? {
            return Ok(prompt.prompt_text);
        }
        Ok(FALLBACK_PROMPT.to_string())
    }
}
