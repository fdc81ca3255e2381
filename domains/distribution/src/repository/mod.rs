//! Repositories for the distribution domain
//!
//! [`DistributionStore`] is the durable per-(content, destination) ledger and
//! the only shared mutable resource of a publish. [`CatalogStore`] is the
//! read side over content, mappings, prompts and identity mappings.

pub mod catalog;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod records;

use async_trait::async_trait;
use chrono::Duration;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use newsrelay_common::Result;

use crate::domain::entities::{
    CategoryAssignment, CategoryMapping, ContentItem, DestinationUser, DistributionRecord,
    NewDistribution, PublishTarget, RewritePrompt, TargetScope,
};

pub use catalog::CatalogRepository;
pub use records::DistributionRecordRepository;

/// Durable distribution ledger
#[async_trait]
pub trait DistributionStore: Send + Sync {
    /// Insert a PENDING record or fetch the existing one for (content, destination).
    ///
    /// Atomic against concurrent callers. The flag is true when this call created the record.
    async fn get_or_create(&self, new: &NewDistribution) -> Result<(DistributionRecord, bool)>;

    /// FAILED → PENDING with `retry_count + 1`, atomically.
    ///
    /// Returns `None` when the record is no longer FAILED.
    async fn begin_retry(&self, id: Uuid) -> Result<Option<DistributionRecord>>;

    /// Take over a PENDING record whose attempt lease is missing or older than `lease`.
    ///
    /// Renews the lease atomically. Returns `None` when the record is not
    /// PENDING or another attempt still holds a fresh lease.
    async fn claim_pending(
        &self,
        id: Uuid,
        lease: Duration,
    ) -> Result<Option<DistributionRecord>>;

    /// Persist status, message, snapshot and timings. A SUCCESS record is never overwritten.
    async fn update_status(&self, record: &DistributionRecord) -> Result<DistributionRecord>;

    async fn find(&self, id: Uuid) -> Result<Option<DistributionRecord>>;

    /// All records of one content item, oldest first
    async fn list_by_content(&self, content_id: Uuid) -> Result<Vec<DistributionRecord>>;
}

/// Read-only catalog lookups
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn find_content_item(&self, id: Uuid) -> Result<Option<ContentItem>>;

    /// Assignment of `user_id` covering `scope`. A category is covered directly or through a group.
    async fn find_assignment(
        &self,
        user_id: Uuid,
        scope: &TargetScope,
    ) -> Result<Option<CategoryAssignment>>;

    /// Targets mapped from one canonical category, ordered by destination then category name
    async fn mappings_for_category(&self, category_id: Uuid) -> Result<Vec<PublishTarget>>;

    /// Member categories of a group in membership order
    async fn group_categories(&self, group_id: Uuid) -> Result<Vec<Uuid>>;

    /// Active prompt for a destination, or the active global prompt when `destination_id` is `None`
    async fn active_prompt(&self, destination_id: Option<Uuid>) -> Result<Option<RewritePrompt>>;

    /// MATCHED identity of `user_id` at a destination
    async fn destination_user(
        &self,
        user_id: Uuid,
        destination_id: Uuid,
    ) -> Result<Option<DestinationUser>>;

    /// Make one mapping the destination's default, clearing its siblings
    async fn set_default_mapping(&self, mapping_id: Uuid) -> Result<CategoryMapping>;
}

/// Combined repository access for the distribution domain
#[derive(Clone)]
pub struct DistributionRepositories {
    pool: PgPool,
    pub records: DistributionRecordRepository,
    pub catalog: CatalogRepository,
}

impl DistributionRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            records: DistributionRecordRepository::new(pool.clone()),
            catalog: CatalogRepository::new(pool.clone()),
            pool,
        }
    }

    /// Begin a new database transaction.
    pub async fn begin(&self) -> std::result::Result<Transaction<'static, Postgres>, sqlx::Error> {
        self.pool.begin().await
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
