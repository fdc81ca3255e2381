//! Publish report returned to the caller

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Terminal state of one target's pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TargetOutcome {
    SkippedExcluded,
    SkippedAlreadySuccess,
    SkippedInProgress,
    NoUserMapping,
    AiFailed,
    SentSuccess,
    SentFailed,
    Cancelled,
}

impl TargetOutcome {
    /// Whether the destination now holds the item
    pub fn is_success(self) -> bool {
        matches!(
            self,
            TargetOutcome::SentSuccess | TargetOutcome::SkippedAlreadySuccess
        )
    }
}

/// One entry per resolved target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub destination_name: String,
    pub destination_category_name: String,
    pub outcome: TargetOutcome,
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<u64>,
}

impl TargetReport {
    pub fn new(
        destination_name: impl Into<String>,
        destination_category_name: impl Into<String>,
        outcome: TargetOutcome,
        message: impl Into<String>,
        elapsed_ms: Option<u64>,
    ) -> Self {
        Self {
            destination_name: destination_name.into(),
            destination_category_name: destination_category_name.into(),
            outcome,
            success: outcome.is_success(),
            message: message.into(),
            elapsed_ms,
        }
    }
}

/// Ordered per-target outcomes of one publish
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishReport {
    pub content_id: Uuid,
    pub results: Vec<TargetReport>,
}

impl PublishReport {
    pub fn count(&self, outcome: TargetOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}
