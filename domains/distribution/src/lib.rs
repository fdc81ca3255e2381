//! Distribution domain: publish targets, content variations, distribution records

pub mod domain;
pub mod error;
pub mod repository;
pub mod service;

// Re-export domain types at the crate root for convenience
pub use domain::entities::*;
pub use domain::state::{
    DistributionEvent, DistributionState, DistributionStateMachine, StateError,
};
pub use error::{AiGenerationFailed, PublishError, TargetFailure};
pub use repository::{CatalogStore, DistributionRepositories, DistributionStore};
pub use service::{
    DistributionPublisher, PublishReport, PublishRequest, PublisherSettings, TargetOutcome,
    TargetReport,
};
