//! Postgres distribution ledger

use async_trait::async_trait;
use chrono::Duration;
use sqlx::PgPool;
use uuid::Uuid;

use newsrelay_common::{Error, Result};

use super::DistributionStore;
use crate::domain::entities::{DistributionRecord, NewDistribution};

/// Column list for SELECT/RETURNING on distribution_records
pub(crate) const RECORD_COLUMNS: &str = "\
    id, content_id, destination_id, destination_category_id, category_id, status, \
    response_message, retry_count, ai_title, ai_short_description, ai_content, \
    ai_meta_title, ai_slug, time_taken_ms, started_at, completed_at, attempt_started_at, \
    created_at, updated_at";

#[derive(Clone)]
pub struct DistributionRecordRepository {
    pool: PgPool,
}

impl DistributionRecordRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn find_by_pair(
        &self,
        content_id: Uuid,
        destination_id: Uuid,
    ) -> Result<Option<DistributionRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM distribution_records \
             WHERE content_id = $1 AND destination_id = $2"
        );
        let row = sqlx::query_as::<_, DistributionRecord>(&query)
            .bind(content_id)
            .bind(destination_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }
}

#[async_trait]
impl DistributionStore for DistributionRecordRepository {
    async fn get_or_create(&self, new: &NewDistribution) -> Result<(DistributionRecord, bool)> {
        let record = DistributionRecord::new(new);
        let query = format!(
            "INSERT INTO distribution_records \
                (id, content_id, destination_id, destination_category_id, category_id, status, \
                 response_message, retry_count, started_at, attempt_started_at, created_at, \
                 updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             ON CONFLICT (content_id, destination_id) DO NOTHING \
             RETURNING {RECORD_COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, DistributionRecord>(&query)
            .bind(record.id)
            .bind(record.content_id)
            .bind(record.destination_id)
            .bind(record.destination_category_id)
            .bind(record.category_id)
            .bind(record.status)
            .bind(&record.response_message)
            .bind(record.retry_count)
            .bind(record.started_at)
            .bind(record.attempt_started_at)
            .bind(record.created_at)
            .bind(record.updated_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = inserted {
            return Ok((row, true));
        }

        self.find_by_pair(new.content_id, new.destination_id)
            .await?
            .map(|row| (row, false))
            .ok_or_else(|| {
                Error::Internal(format!(
                    "Distribution for content {} and destination {} vanished after conflict",
                    new.content_id, new.destination_id
                ))
            })
    }

    async fn begin_retry(&self, id: Uuid) -> Result<Option<DistributionRecord>> {
        let query = format!(
            "UPDATE distribution_records SET \
                status = 'pending', retry_count = retry_count + 1, \
                response_message = $2, attempt_started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'failed' \
             RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DistributionRecord>(&query)
            .bind(id)
            .bind(crate::domain::entities::RETRYING_MESSAGE)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn claim_pending(
        &self,
        id: Uuid,
        lease: Duration,
    ) -> Result<Option<DistributionRecord>> {
        let query = format!(
            "UPDATE distribution_records SET \
                attempt_started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'pending' \
               AND (attempt_started_at IS NULL \
                    OR attempt_started_at < NOW() - make_interval(secs => $2)) \
             RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DistributionRecord>(&query)
            .bind(id)
            .bind(lease.num_milliseconds() as f64 / 1000.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn update_status(&self, record: &DistributionRecord) -> Result<DistributionRecord> {
        let query = format!(
            "UPDATE distribution_records SET \
                status = $2, response_message = $3, ai_title = $4, ai_short_description = $5, \
                ai_content = $6, ai_meta_title = $7, ai_slug = $8, time_taken_ms = $9, \
                started_at = $10, completed_at = $11, attempt_started_at = $12, \
                updated_at = NOW() \
             WHERE id = $1 AND status <> 'success' \
             RETURNING {RECORD_COLUMNS}"
        );
        let row = sqlx::query_as::<_, DistributionRecord>(&query)
            .bind(record.id)
            .bind(record.status)
            .bind(&record.response_message)
            .bind(&record.ai_title)
            .bind(&record.ai_short_description)
            .bind(&record.ai_content)
            .bind(&record.ai_meta_title)
            .bind(&record.ai_slug)
            .bind(record.time_taken_ms)
            .bind(record.started_at)
            .bind(record.completed_at)
            .bind(record.attempt_started_at)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| {
            Error::Conflict(format!(
                "Distribution {} is missing or already delivered",
                record.id
            ))
        })
    }

    async fn find(&self, id: Uuid) -> Result<Option<DistributionRecord>> {
        let query = format!("SELECT {RECORD_COLUMNS} FROM distribution_records WHERE id = $1");
        let row = sqlx::query_as::<_, DistributionRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list_by_content(&self, content_id: Uuid) -> Result<Vec<DistributionRecord>> {
        let query = format!(
            "SELECT {RECORD_COLUMNS} FROM distribution_records \
             WHERE content_id = $1 ORDER BY created_at, id"
        );
        let rows = sqlx::query_as::<_, DistributionRecord>(&query)
            .bind(content_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}
