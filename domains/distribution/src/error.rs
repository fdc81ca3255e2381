//! Publish error taxonomy
//!
//! [`PublishError`] aborts a whole batch. [`TargetFailure`] is recorded on a
//! single target's distribution record and never interrupts its siblings.

use thiserror::Error;

use crate::service::report::TargetOutcome;

/// Batch-fatal publish errors
#[derive(Error, Debug)]
pub enum PublishError {
    /// Missing content item, category, assignment or mappings
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// The distribution ledger or catalog could not be read or written
    #[error("Store error: {0}")]
    Store(#[from] newsrelay_common::Error),
}

impl PublishError {
    pub fn error_code(&self) -> &'static str {
        match self {
            PublishError::Resolution(_) => "RESOLUTION_ERROR",
            PublishError::Store(_) => "STORE_ERROR",
        }
    }
}

/// Rewrite failure for one destination, carrying the cause for logging
#[derive(Error, Debug, Clone, PartialEq)]
#[error("AI generation failed: {cause}")]
pub struct AiGenerationFailed {
    pub destination: String,
    pub cause: String,
}

pub const NO_USER_MAPPING_MESSAGE: &str = "No valid portal user mapping found.";
pub const CANCELLED_MESSAGE: &str = "Publish cancelled before completion";

/// Per-target failures, persisted as a FAILED record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TargetFailure {
    #[error(transparent)]
    AiGeneration(#[from] AiGenerationFailed),

    #[error("No valid portal user mapping found.")]
    IdentityMappingMissing,

    /// Destination response body or transport error text, verbatim
    #[error("{0}")]
    Delivery(String),

    #[error("Publish cancelled before completion")]
    Cancelled,
}

impl TargetFailure {
    pub fn outcome(&self) -> TargetOutcome {
        match self {
            TargetFailure::AiGeneration(_) => TargetOutcome::AiFailed,
            TargetFailure::IdentityMappingMissing => TargetOutcome::NoUserMapping,
            TargetFailure::Delivery(_) => TargetOutcome::SentFailed,
            TargetFailure::Cancelled => TargetOutcome::Cancelled,
        }
    }
}
