//! Publish services: target resolution, content variation and the orchestrator

pub mod publisher;
pub mod report;
pub mod targets;
pub mod variation;

pub use publisher::{DistributionPublisher, PublishRequest, PublisherSettings};
pub use report::{PublishReport, TargetOutcome, TargetReport};
pub use targets::TargetResolver;
pub use variation::ContentVariationResolver;
