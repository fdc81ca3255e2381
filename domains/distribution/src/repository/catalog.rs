//! Postgres catalog lookups

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use newsrelay_common::{Error, Result};

use super::CatalogStore;
use crate::domain::entities::{
    CategoryAssignment, CategoryMapping, ContentItem, Destination, DestinationCategory,
    DestinationUser, PublishTarget, RewritePrompt, TargetScope,
};

const CONTENT_COLUMNS: &str = "\
    id, title, short_description, body, meta_title, slug, post_tag, event_date, \
    event_end_date, schedule_date, media_path, latest_news, upcoming_event, head_lines, \
    articles, trending, breaking_news, counter, created_by, category_id, \
    excluded_destinations, created_at, updated_at";

const MAPPING_COLUMNS: &str =
    "id, category_id, destination_category_id, use_canonical_content, is_default";

/// Flat join row behind [`PublishTarget`]
#[derive(sqlx::FromRow)]
struct TargetRow {
    mapping_id: Uuid,
    category_id: Uuid,
    use_canonical_content: bool,
    is_default: bool,
    destination_category_id: Uuid,
    destination_category_name: String,
    external_id: String,
    destination_id: Uuid,
    destination_name: String,
    base_url: String,
}

impl From<TargetRow> for PublishTarget {
    fn from(row: TargetRow) -> Self {
        PublishTarget {
            destination: Destination {
                id: row.destination_id,
                name: row.destination_name,
                base_url: row.base_url,
            },
            destination_category: DestinationCategory {
                id: row.destination_category_id,
                destination_id: row.destination_id,
                name: row.destination_category_name,
                external_id: row.external_id,
            },
            mapping: CategoryMapping {
                id: row.mapping_id,
                category_id: row.category_id,
                destination_category_id: row.destination_category_id,
                use_canonical_content: row.use_canonical_content,
                is_default: row.is_default,
            },
        }
    }
}

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn find_content_item(&self, id: Uuid) -> Result<Option<ContentItem>> {
        let query = format!("SELECT {CONTENT_COLUMNS} FROM content_items WHERE id = $1");
        let row = sqlx::query_as::<_, ContentItem>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_assignment(
        &self,
        user_id: Uuid,
        scope: &TargetScope,
    ) -> Result<Option<CategoryAssignment>> {
        let row = match scope {
            TargetScope::Category(category_id) => {
                sqlx::query_as::<_, CategoryAssignment>(
                    r#"
                    SELECT a.id, a.user_id, a.category_id, a.group_id
                    FROM category_assignments a
                    WHERE a.user_id = $1
                      AND (a.category_id = $2
                           OR a.group_id IN (SELECT group_id FROM category_group_members
                                             WHERE category_id = $2))
                    ORDER BY (a.category_id = $2) DESC NULLS LAST, a.id
                    LIMIT 1
                    "#,
                )
                .bind(user_id)
                .bind(category_id)
                .fetch_optional(&self.pool)
                .await?
            }
            TargetScope::Group(group_id) => {
                sqlx::query_as::<_, CategoryAssignment>(
                    r#"
                    SELECT id, user_id, category_id, group_id
                    FROM category_assignments
                    WHERE user_id = $1 AND group_id = $2
                    ORDER BY id
                    LIMIT 1
                    "#,
                )
                .bind(user_id)
                .bind(group_id)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row)
    }

    async fn mappings_for_category(&self, category_id: Uuid) -> Result<Vec<PublishTarget>> {
        let rows = sqlx::query_as::<_, TargetRow>(
            r#"
            SELECT m.id AS mapping_id, m.category_id, m.use_canonical_content, m.is_default,
                   dc.id AS destination_category_id, dc.name AS destination_category_name,
                   dc.external_id, d.id AS destination_id, d.name AS destination_name, d.base_url
            FROM category_mappings m
            JOIN destination_categories dc ON dc.id = m.destination_category_id
            JOIN destinations d ON d.id = dc.destination_id
            WHERE m.category_id = $1
            ORDER BY d.name, dc.name, m.id
            "#,
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(PublishTarget::from).collect())
    }

    async fn group_categories(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query_scalar::<_, Uuid>(
            "SELECT category_id FROM category_group_members WHERE group_id = $1 ORDER BY position, category_id",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn active_prompt(&self, destination_id: Option<Uuid>) -> Result<Option<RewritePrompt>> {
        let row = sqlx::query_as::<_, RewritePrompt>(
            r#"
            SELECT id, destination_id, prompt_text, is_active
            FROM rewrite_prompts
            WHERE is_active AND destination_id IS NOT DISTINCT FROM $1
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(destination_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn destination_user(
        &self,
        user_id: Uuid,
        destination_id: Uuid,
    ) -> Result<Option<DestinationUser>> {
        let row = sqlx::query_as::<_, DestinationUser>(
            r#"
            SELECT user_id, destination_id, destination_user_id, status
            FROM destination_users
            WHERE user_id = $1 AND destination_id = $2 AND status = 'MATCHED'
            "#,
        )
        .bind(user_id)
        .bind(destination_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn set_default_mapping(&self, mapping_id: Uuid) -> Result<CategoryMapping> {
        let mut tx = self.pool.begin().await?;

        let destination_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT dc.destination_id
            FROM category_mappings m
            JOIN destination_categories dc ON dc.id = m.destination_category_id
            WHERE m.id = $1
            FOR UPDATE OF m
            "#,
        )
        .bind(mapping_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Category mapping {} not found", mapping_id)))?;

        // Serializes default changes across all mappings of one destination
        sqlx::query("SELECT 1 FROM destinations WHERE id = $1 FOR UPDATE")
            .bind(destination_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE category_mappings SET is_default = FALSE
            WHERE is_default AND id <> $1
              AND destination_category_id IN (SELECT id FROM destination_categories
                                              WHERE destination_id = $2)
            "#,
        )
        .bind(mapping_id)
        .bind(destination_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "UPDATE category_mappings SET is_default = TRUE WHERE id = $1 RETURNING {MAPPING_COLUMNS}"
        );
        let mapping = sqlx::query_as::<_, CategoryMapping>(&query)
            .bind(mapping_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(mapping)
    }
}
