//! In-memory stores for tests and local runs
//!
//! Same contracts as the Postgres repositories. Each store can be switched
//! to unavailable to exercise batch-fatal store errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use newsrelay_common::{Error, Result};

use super::{CatalogStore, DistributionStore};
use crate::domain::entities::{
    CategoryAssignment, CategoryMapping, ContentItem, Destination, DestinationCategory,
    DestinationUser, DistributionRecord, DistributionStatus, IdentityMatchStatus, NewDistribution,
    PublishTarget, RewritePrompt, TargetScope,
};

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| Error::Internal(format!("memory store lock poisoned: {}", e)))
}

fn unavailable() -> Error {
    Error::Internal("store unavailable".to_string())
}

// ============================================================================
// Distribution ledger
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct MemoryDistributionStore {
    records: Arc<Mutex<Vec<DistributionRecord>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryDistributionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent call
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a record as-is, e.g. a prior SUCCESS or FAILED attempt
    pub fn insert(&self, record: DistributionRecord) -> Result<()> {
        lock(&self.records)?.push(record);
        Ok(())
    }

    pub fn records(&self) -> Vec<DistributionRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(unavailable())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DistributionStore for MemoryDistributionStore {
    async fn get_or_create(&self, new: &NewDistribution) -> Result<(DistributionRecord, bool)> {
        self.check()?;
        let mut records = lock(&self.records)?;
        if let Some(existing) = records
            .iter()
            .find(|r| r.content_id == new.content_id && r.destination_id == new.destination_id)
        {
            return Ok((existing.clone(), false));
        }
        let record = DistributionRecord::new(new);
        records.push(record.clone());
        Ok((record, true))
    }

    async fn begin_retry(&self, id: Uuid) -> Result<Option<DistributionRecord>> {
        self.check()?;
        let mut records = lock(&self.records)?;
        match records
            .iter_mut()
            .find(|r| r.id == id && r.status == DistributionStatus::Failed)
        {
            Some(record) => {
                record.prepare_retry()?;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn claim_pending(
        &self,
        id: Uuid,
        lease: Duration,
    ) -> Result<Option<DistributionRecord>> {
        self.check()?;
        let now = Utc::now();
        let mut records = lock(&self.records)?;
        match records.iter_mut().find(|r| {
            r.id == id && r.status == DistributionStatus::Pending && !r.is_leased(lease, now)
        }) {
            Some(record) => {
                record.attempt_started_at = Some(now);
                record.updated_at = now;
                Ok(Some(record.clone()))
            }
            None => Ok(None),
        }
    }

    async fn update_status(&self, record: &DistributionRecord) -> Result<DistributionRecord> {
        self.check()?;
        let mut records = lock(&self.records)?;
        let stored = records
            .iter_mut()
            .find(|r| r.id == record.id && r.status != DistributionStatus::Success)
            .ok_or_else(|| {
                Error::Conflict(format!(
                    "Distribution {} is missing or already delivered",
                    record.id
                ))
            })?;

        stored.status = record.status;
        stored.response_message = record.response_message.clone();
        stored.ai_title = record.ai_title.clone();
        stored.ai_short_description = record.ai_short_description.clone();
        stored.ai_content = record.ai_content.clone();
        stored.ai_meta_title = record.ai_meta_title.clone();
        stored.ai_slug = record.ai_slug.clone();
        stored.time_taken_ms = record.time_taken_ms;
        stored.started_at = record.started_at;
        stored.completed_at = record.completed_at;
        stored.attempt_started_at = record.attempt_started_at;
        stored.updated_at = Utc::now();
        Ok(stored.clone())
    }

    async fn find(&self, id: Uuid) -> Result<Option<DistributionRecord>> {
        self.check()?;
        Ok(lock(&self.records)?.iter().find(|r| r.id == id).cloned())
    }

    async fn list_by_content(&self, content_id: Uuid) -> Result<Vec<DistributionRecord>> {
        self.check()?;
        Ok(lock(&self.records)?
            .iter()
            .filter(|r| r.content_id == content_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Catalog
// ============================================================================

#[derive(Debug, Default)]
struct CatalogData {
    items: HashMap<Uuid, ContentItem>,
    destinations: HashMap<Uuid, Destination>,
    destination_categories: HashMap<Uuid, DestinationCategory>,
    mappings: Vec<CategoryMapping>,
    groups: HashMap<Uuid, Vec<Uuid>>,
    assignments: Vec<CategoryAssignment>,
    prompts: Vec<RewritePrompt>,
    users: Vec<DestinationUser>,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    data: Arc<Mutex<CatalogData>>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every subsequent call
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn data(&self) -> Result<MutexGuard<'_, CatalogData>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        lock(&self.data)
    }

    pub fn add_content_item(&self, item: ContentItem) -> Result<()> {
        lock(&self.data)?.items.insert(item.id, item);
        Ok(())
    }

    pub fn add_destination(&self, name: &str, base_url: &str) -> Result<Destination> {
        let destination = Destination {
            id: Uuid::new_v4(),
            name: name.to_string(),
            base_url: base_url.to_string(),
        };
        lock(&self.data)?
            .destinations
            .insert(destination.id, destination.clone());
        Ok(destination)
    }

    pub fn add_destination_category(
        &self,
        destination: &Destination,
        name: &str,
        external_id: &str,
    ) -> Result<DestinationCategory> {
        let category = DestinationCategory {
            id: Uuid::new_v4(),
            destination_id: destination.id,
            name: name.to_string(),
            external_id: external_id.to_string(),
        };
        lock(&self.data)?
            .destination_categories
            .insert(category.id, category.clone());
        Ok(category)
    }

    pub fn add_mapping(
        &self,
        category_id: Uuid,
        destination_category: &DestinationCategory,
        use_canonical_content: bool,
    ) -> Result<CategoryMapping> {
        let mapping = CategoryMapping {
            id: Uuid::new_v4(),
            category_id,
            destination_category_id: destination_category.id,
            use_canonical_content,
            is_default: false,
        };
        lock(&self.data)?.mappings.push(mapping.clone());
        Ok(mapping)
    }

    pub fn mapping(&self, id: Uuid) -> Option<CategoryMapping> {
        let data = self.data.lock().ok()?;
        data.mappings.iter().find(|m| m.id == id).cloned()
    }

    /// Create a group over `categories`, returning its id
    pub fn add_group(&self, categories: &[Uuid]) -> Result<Uuid> {
        let id = Uuid::new_v4();
        lock(&self.data)?.groups.insert(id, categories.to_vec());
        Ok(id)
    }

    pub fn assign_category(&self, user_id: Uuid, category_id: Uuid) -> Result<()> {
        lock(&self.data)?.assignments.push(CategoryAssignment {
            id: Uuid::new_v4(),
            user_id,
            category_id: Some(category_id),
            group_id: None,
        });
        Ok(())
    }

    pub fn assign_group(&self, user_id: Uuid, group_id: Uuid) -> Result<()> {
        lock(&self.data)?.assignments.push(CategoryAssignment {
            id: Uuid::new_v4(),
            user_id,
            category_id: None,
            group_id: Some(group_id),
        });
        Ok(())
    }

    pub fn add_prompt(
        &self,
        destination_id: Option<Uuid>,
        prompt_text: &str,
        is_active: bool,
    ) -> Result<()> {
        lock(&self.data)?.prompts.push(RewritePrompt {
            id: Uuid::new_v4(),
            destination_id,
            prompt_text: prompt_text.to_string(),
            is_active,
        });
        Ok(())
    }

    pub fn map_user(
        &self,
        user_id: Uuid,
        destination_id: Uuid,
        destination_user_id: &str,
        status: IdentityMatchStatus,
    ) -> Result<()> {
        lock(&self.data)?.users.push(DestinationUser {
            user_id,
            destination_id,
            destination_user_id: destination_user_id.to_string(),
            status,
        });
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for MemoryCatalog {
    async fn find_content_item(&self, id: Uuid) -> Result<Option<ContentItem>> {
        Ok(self.data()?.items.get(&id).cloned())
    }

    async fn find_assignment(
        &self,
        user_id: Uuid,
        scope: &TargetScope,
    ) -> Result<Option<CategoryAssignment>> {
        let data = self.data()?;
        let mine = data.assignments.iter().filter(|a| a.user_id == user_id);
        let found = match scope {
            TargetScope::Category(category_id) => {
                let direct = mine.clone().find(|a| a.category_id == Some(*category_id));
                direct.or_else(|| {
                    mine.clone().find(|a| {
                        a.group_id
                            .and_then(|g| data.groups.get(&g))
                            .is_some_and(|members| members.contains(category_id))
                    })
                })
            }
            TargetScope::Group(group_id) => mine.clone().find(|a| a.group_id == Some(*group_id)),
        };
        Ok(found.cloned())
    }

    async fn mappings_for_category(&self, category_id: Uuid) -> Result<Vec<PublishTarget>> {
        let data = self.data()?;
        let mut targets = Vec::new();
        for mapping in data.mappings.iter().filter(|m| m.category_id == category_id) {
            let destination_category = data
                .destination_categories
                .get(&mapping.destination_category_id)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "Mapping {} points at unknown destination category",
                        mapping.id
                    ))
                })?;
            let destination = data
                .destinations
                .get(&destination_category.destination_id)
                .ok_or_else(|| {
                    Error::Internal(format!(
                        "Destination category {} points at unknown destination",
                        destination_category.id
                    ))
                })?;
            targets.push(PublishTarget {
                destination: destination.clone(),
                destination_category: destination_category.clone(),
                mapping: mapping.clone(),
            });
        }
        targets.sort_by(|a, b| {
            (&a.destination.name, &a.destination_category.name, a.mapping.id).cmp(&(
                &b.destination.name,
                &b.destination_category.name,
                b.mapping.id,
            ))
        });
        Ok(targets)
    }

    async fn group_categories(&self, group_id: Uuid) -> Result<Vec<Uuid>> {
        Ok(self.data()?.groups.get(&group_id).cloned().unwrap_or_default())
    }

    async fn active_prompt(&self, destination_id: Option<Uuid>) -> Result<Option<RewritePrompt>> {
        Ok(self
            .data()?
            .prompts
            .iter()
            .find(|p| p.is_active && p.destination_id == destination_id)
            .cloned())
    }

    async fn destination_user(
        &self,
        user_id: Uuid,
        destination_id: Uuid,
    ) -> Result<Option<DestinationUser>> {
        Ok(self
            .data()?
            .users
            .iter()
            .find(|u| {
                u.user_id == user_id
                    && u.destination_id == destination_id
                    && u.status == IdentityMatchStatus::Matched
            })
            .cloned())
    }

    async fn set_default_mapping(&self, mapping_id: Uuid) -> Result<CategoryMapping> {
        let mut data = self.data()?;
        let destination_of = |data: &CatalogData, m: &CategoryMapping| {
            data.destination_categories
                .get(&m.destination_category_id)
                .map(|dc| dc.destination_id)
        };

        let target = data
            .mappings
            .iter()
            .find(|m| m.id == mapping_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Category mapping {} not found", mapping_id)))?;
        let destination_id = destination_of(&*data, &target);

        let siblings: Vec<Uuid> = data
            .mappings
            .iter()
            .filter(|m| destination_of(&*data, m) == destination_id)
            .map(|m| m.id)
            .collect();

        let mut updated = target;
        for mapping in data.mappings.iter_mut() {
            if siblings.contains(&mapping.id) {
                mapping.is_default = mapping.id == mapping_id;
                if mapping.id == mapping_id {
                    updated = mapping.clone();
                }
            }
        }
        Ok(updated)
    }
}
