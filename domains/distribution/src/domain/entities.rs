//! Distribution domain entities
//!
//! Catalog entities (content items, destinations, mappings, prompts, identity
//! mappings) are read-only from the engine's point of view. The
//! [`DistributionRecord`] is the one entity this crate mutates, always through
//! the state machine.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;

use newsrelay_common::{Error, Result};

use crate::domain::state::{
    DistributionEvent, DistributionState, DistributionStateMachine, StateError,
};

// ============================================================================
// Catalog
// ============================================================================

/// Canonical, destination-agnostic news item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ContentItem {
    pub id: Uuid,
    pub title: String,
    pub short_description: String,
    /// Rich text / HTML body
    pub body: String,
    pub meta_title: Option<String>,
    pub slug: Option<String>,
    pub post_tag: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_end_date: Option<NaiveDate>,
    pub schedule_date: Option<DateTime<Utc>>,
    /// Media reference, relative to the configured media root
    pub media_path: Option<String>,
    pub latest_news: bool,
    pub upcoming_event: bool,
    pub head_lines: bool,
    pub articles: bool,
    pub trending: bool,
    pub breaking_news: bool,
    pub counter: Option<i32>,
    pub created_by: Uuid,
    /// Canonical category
    pub category_id: Option<Uuid>,
    pub excluded_destinations: Json<Vec<Exclusion>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Minimal item with every optional field unset
    pub fn new(
        title: impl Into<String>,
        short_description: impl Into<String>,
        body: impl Into<String>,
        created_by: Uuid,
        category_id: Option<Uuid>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            short_description: short_description.into(),
            body: body.into(),
            meta_title: None,
            slug: None,
            post_tag: None,
            event_date: None,
            event_end_date: None,
            schedule_date: None,
            media_path: None,
            latest_news: false,
            upcoming_event: false,
            head_lines: false,
            articles: false,
            trending: false,
            breaking_news: false,
            counter: None,
            created_by,
            category_id,
            excluded_destinations: Json(Vec::new()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Meta title, falling back to the title when absent or empty
    pub fn effective_meta_title(&self) -> &str {
        match self.meta_title.as_deref() {
            Some(meta) if !meta.is_empty() => meta,
            _ => &self.title,
        }
    }

    /// Slug, falling back to a slugified meta title when absent or empty
    pub fn effective_slug(&self) -> String {
        match self.slug.as_deref() {
            Some(slug) if !slug.is_empty() => slug.to_string(),
            _ => crate::domain::slug::slugify(self.effective_meta_title()),
        }
    }
}

/// One entry of an exclusion list: a destination id or a destination name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Exclusion {
    Id(Uuid),
    Name(String),
}

impl Exclusion {
    pub fn matches(&self, destination: &Destination) -> bool {
        match self {
            Exclusion::Id(id) => *id == destination.id,
            Exclusion::Name(name) => *name == destination.name,
        }
    }
}

impl From<Uuid> for Exclusion {
    fn from(id: Uuid) -> Self {
        Exclusion::Id(id)
    }
}

impl From<&str> for Exclusion {
    fn from(name: &str) -> Self {
        Exclusion::Name(name.to_string())
    }
}

/// Target portal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Destination {
    pub id: Uuid,
    pub name: String,
    /// Base address of the ingestion API
    pub base_url: String,
}

/// Destination-scoped category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DestinationCategory {
    pub id: Uuid,
    pub destination_id: Uuid,
    pub name: String,
    /// Identifier the destination's API expects as `post_cat`
    pub external_id: String,
}

/// Canonical category → destination category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryMapping {
    pub id: Uuid,
    pub category_id: Uuid,
    pub destination_category_id: Uuid,
    /// Send the canonical text verbatim, skipping the rewrite
    pub use_canonical_content: bool,
    pub is_default: bool,
}

/// One resolved (destination, destination category) pair with the mapping that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishTarget {
    pub destination: Destination,
    pub destination_category: DestinationCategory,
    pub mapping: CategoryMapping,
}

/// What a publish fans out over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetScope {
    /// One canonical category
    Category(Uuid),
    /// Every category of a category group
    Group(Uuid),
}

/// A user's right to publish into a category or a group of categories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CategoryAssignment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub category_id: Option<Uuid>,
    pub group_id: Option<Uuid>,
}

/// Rewrite instruction, per destination or global when `destination_id` is `None`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RewritePrompt {
    pub id: Uuid,
    pub destination_id: Option<Uuid>,
    pub prompt_text: String,
    pub is_active: bool,
}

/// Identity-mapping status of a user at a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "identity_match_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentityMatchStatus {
    Matched,
    Unmatched,
}

/// The publishing user's author identity at a destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DestinationUser {
    pub user_id: Uuid,
    pub destination_id: Uuid,
    pub destination_user_id: String,
    pub status: IdentityMatchStatus,
}

// ============================================================================
// Distribution record
// ============================================================================

/// Distribution record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "distribution_status", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum DistributionStatus {
    #[default]
    Pending,
    Success,
    Failed,
}

impl DistributionStatus {
    pub fn to_state(self) -> DistributionState {
        match self {
            DistributionStatus::Pending => DistributionState::Pending,
            DistributionStatus::Success => DistributionState::Success,
            DistributionStatus::Failed => DistributionState::Failed,
        }
    }

    pub fn from_state(state: DistributionState) -> Self {
        match state {
            DistributionState::Pending => DistributionStatus::Pending,
            DistributionState::Success => DistributionStatus::Success,
            DistributionState::Failed => DistributionStatus::Failed,
        }
    }

    #[mutants::skip] // Delegates to DistributionState::is_terminal(), covered by state tests
    pub fn is_terminal(self) -> bool {
        self.to_state().is_terminal()
    }
}

/// Final (title, short description, body, meta title, slug) sent to one destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewrittenContent {
    pub title: String,
    pub short_description: String,
    pub description: String,
    pub meta_title: String,
    pub slug: String,
}

impl RewrittenContent {
    /// Canonical fields verbatim, with meta title and slug defaulted
    pub fn canonical(item: &ContentItem) -> Self {
        Self {
            title: item.title.clone(),
            short_description: item.short_description.clone(),
            description: item.body.clone(),
            meta_title: item.effective_meta_title().to_string(),
            slug: item.effective_slug(),
        }
    }
}

/// Insert request for a fresh distribution record
#[derive(Debug, Clone, PartialEq)]
pub struct NewDistribution {
    pub content_id: Uuid,
    pub destination_id: Uuid,
    pub destination_category_id: Uuid,
    /// Canonical category the publish ran under
    pub category_id: Uuid,
}

pub const QUEUED_MESSAGE: &str = "Queued for publishing";
pub const RETRYING_MESSAGE: &str = "Retrying...";

/// Durable outcome of publishing one content item to one destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DistributionRecord {
    pub id: Uuid,
    pub content_id: Uuid,
    pub destination_id: Uuid,
    pub destination_category_id: Uuid,
    pub category_id: Uuid,
    pub status: DistributionStatus,
    pub response_message: String,
    pub retry_count: i32,
    pub ai_title: Option<String>,
    pub ai_short_description: Option<String>,
    pub ai_content: Option<String>,
    pub ai_meta_title: Option<String>,
    pub ai_slug: Option<String>,
    pub time_taken_ms: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Lease of the attempt in flight; `None` once the attempt finished
    pub attempt_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DistributionRecord {
    /// New PENDING record
    pub fn new(new: &NewDistribution) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            content_id: new.content_id,
            destination_id: new.destination_id,
            destination_category_id: new.destination_category_id,
            category_id: new.category_id,
            status: DistributionStatus::Pending,
            response_message: QUEUED_MESSAGE.to_string(),
            retry_count: 0,
            ai_title: None,
            ai_short_description: None,
            ai_content: None,
            ai_meta_title: None,
            ai_slug: None,
            time_taken_ms: None,
            started_at: Some(now),
            completed_at: None,
            attempt_started_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    /// FAILED → PENDING, counting the retry
    pub fn prepare_retry(&mut self) -> Result<()> {
        let next = self.apply_transition(DistributionEvent::Retry)?;
        self.status = DistributionStatus::from_state(next);
        self.retry_count += 1;
        self.response_message = RETRYING_MESSAGE.to_string();
        self.updated_at = Utc::now();
        self.attempt_started_at = Some(self.updated_at);
        Ok(())
    }

    /// PENDING → FAILED without a delivery attempt
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        let next = self.apply_transition(DistributionEvent::Fail)?;
        self.status = DistributionStatus::from_state(next);
        self.response_message = message.into();
        self.completed_at = Some(now);
        self.attempt_started_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Record the delivery outcome with the content snapshot and timings.
    ///
    /// `started_at` is synthesized as `now - elapsed`.
    pub fn complete(
        &mut self,
        delivered: bool,
        message: impl Into<String>,
        content: &RewrittenContent,
        elapsed_ms: u64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let event = if delivered {
            DistributionEvent::Delivered
        } else {
            DistributionEvent::Fail
        };
        let next = self.apply_transition(event)?;
        let elapsed_ms = i64::try_from(elapsed_ms).unwrap_or(i64::MAX);

        self.status = DistributionStatus::from_state(next);
        self.response_message = message.into();
        self.ai_title = Some(content.title.clone());
        self.ai_short_description = Some(content.short_description.clone());
        self.ai_content = Some(content.description.clone());
        self.ai_meta_title = Some(content.meta_title.clone());
        self.ai_slug = Some(content.slug.clone());
        self.time_taken_ms = Some(elapsed_ms);
        self.started_at = Some(now - Duration::milliseconds(elapsed_ms));
        self.completed_at = Some(now);
        self.attempt_started_at = None;
        self.updated_at = now;
        Ok(())
    }

    /// Whether another attempt holds this PENDING record and its lease is still fresh
    pub fn is_leased(&self, lease: Duration, now: DateTime<Utc>) -> bool {
        self.status == DistributionStatus::Pending
            && self
                .attempt_started_at
                .is_some_and(|started| started > now - lease)
    }

    /// Check if a transition is valid without applying it
    pub fn can_transition(&self, event: &DistributionEvent) -> bool {
        DistributionStateMachine::can_transition(self.status.to_state(), event)
    }

    fn apply_transition(&self, event: DistributionEvent) -> Result<DistributionState> {
        DistributionStateMachine::transition(self.status.to_state(), event).map_err(|e| match e {
            StateError::InvalidTransition { from, event } => Error::Validation(format!(
                "Invalid distribution transition: cannot apply '{}' event from '{}' state",
                event, from
            )),
            StateError::TerminalState(state) => Error::Validation(format!(
                "Distribution is in terminal state '{}' and cannot transition",
                state
            )),
            StateError::GuardFailed(msg) => Error::Validation(msg),
        })
    }
}
