//! Distribution orchestrator
//!
//! Fans a content item out to every resolved target with bounded
//! concurrency. Per target: exclusion check, get-or-create of the
//! distribution record, skip/retry/lease policy, content variation, identity
//! lookup, delivery and the final record update. A target's failure is
//! recorded on its own record; only resolution and store errors abort the
//! batch.
//!
//! Targets that share a destination share one record, so they run one after
//! another inside a single lane. Lanes run concurrently.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use newsrelay_common::Error;
use newsrelay_llm::LlmService;
use newsrelay_portal::{MediaFile, PortalService};

use crate::domain::entities::{
    ContentItem, DistributionRecord, DistributionStatus, Exclusion, NewDistribution,
    PublishTarget, TargetScope,
};
use crate::domain::payload::build_payload;
use crate::error::{PublishError, TargetFailure};
use crate::repository::{CatalogStore, DistributionStore};
use crate::service::report::{PublishReport, TargetOutcome, TargetReport};
use crate::service::targets::TargetResolver;
use crate::service::variation::ContentVariationResolver;

pub const SKIPPED_EXCLUDED_MESSAGE: &str = "Skipped manually by user";
pub const ALREADY_SUCCESS_MESSAGE: &str = "Already published successfully, skipped.";
pub const IN_PROGRESS_MESSAGE: &str = "Publish already in progress, skipped.";

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_ATTEMPT_LEASE: Duration = Duration::from_secs(15 * 60);

/// One publish invocation
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRequest {
    pub content_id: Uuid,
    pub caller_user_id: Uuid,
    /// Replaces the item's stored exclusions when non-empty
    pub exclusions: Option<Vec<Exclusion>>,
    /// Overrides the item's canonical category
    pub category_id: Option<Uuid>,
    /// Publish across a whole category group instead of one category
    pub group_id: Option<Uuid>,
}

impl PublishRequest {
    pub fn new(content_id: Uuid, caller_user_id: Uuid) -> Self {
        Self {
            content_id,
            caller_user_id,
            exclusions: None,
            category_id: None,
            group_id: None,
        }
    }

    pub fn with_exclusions(mut self, exclusions: Vec<Exclusion>) -> Self {
        self.exclusions = Some(exclusions);
        self
    }

    pub fn with_category(mut self, category_id: Uuid) -> Self {
        self.category_id = Some(category_id);
        self
    }

    pub fn with_group(mut self, group_id: Uuid) -> Self {
        self.group_id = Some(group_id);
        self
    }
}

/// Orchestrator tuning
#[derive(Debug, Clone)]
pub struct PublisherSettings {
    /// Maximum destinations in flight at once
    pub concurrency: usize,
    /// Bound on the whole batch
    pub deadline: Option<Duration>,
    /// Directory media references resolve against
    pub media_root: PathBuf,
    /// How long a PENDING record stays owned by the attempt that claimed it
    pub attempt_lease: Duration,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            deadline: None,
            media_root: PathBuf::from("media"),
            attempt_lease: DEFAULT_ATTEMPT_LEASE,
        }
    }
}

/// State shared by every target of one batch
struct Batch {
    item: ContentItem,
    caller_user_id: Uuid,
    exclusions: Vec<Exclusion>,
    /// Loaded once per batch; `Err` carries the load failure text
    media: Option<Result<MediaFile, String>>,
    cancel: CancellationToken,
}

/// How a target's record stands after the skip/retry policy
enum Claim {
    Proceed(DistributionRecord),
    AlreadyDelivered,
    InProgress,
}

pub struct DistributionPublisher {
    catalog: Arc<dyn CatalogStore>,
    records: Arc<dyn DistributionStore>,
    targets: TargetResolver,
    variations: ContentVariationResolver,
    portal: Arc<dyn PortalService>,
    settings: PublisherSettings,
}

impl DistributionPublisher {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        records: Arc<dyn DistributionStore>,
        llm: Arc<dyn LlmService>,
        portal: Arc<dyn PortalService>,
        settings: PublisherSettings,
    ) -> Self {
        Self {
            targets: TargetResolver::new(catalog.clone()),
            variations: ContentVariationResolver::new(llm, catalog.clone()),
            catalog,
            records,
            portal,
            settings,
        }
    }

    /// Publish one content item to every destination its category (or group) maps to.
    ///
    /// Returns one report entry per resolved target, in resolution order,
    /// however many targets failed.
    pub async fn publish(
        &self,
        request: PublishRequest,
        cancel: CancellationToken,
    ) -> Result<PublishReport, PublishError> {
        let content_id = request.content_id;
        let result = self.run(request, cancel).await;
        if let Err(e) = &result {
            tracing::error!(content_id = %content_id, error_code = e.error_code(), error = %e, "Publish aborted");
        }
        result
    }

    async fn run(
        &self,
        request: PublishRequest,
        cancel: CancellationToken,
    ) -> Result<PublishReport, PublishError> {
        let item = self
            .catalog
            .find_content_item(request.content_id)
            .await?
            .ok_or_else(|| {
                PublishError::Resolution(format!("Content item {} not found", request.content_id))
            })?;

        let scope = match request.group_id {
            Some(group_id) => TargetScope::Group(group_id),
            None => TargetScope::Category(request.category_id.or(item.category_id).ok_or_else(
                || {
                    PublishError::Resolution(
                        "Category is missing and not saved on the content item".to_string(),
                    )
                },
            )?),
        };

        if self
            .catalog
            .find_assignment(request.caller_user_id, &scope)
            .await?
            .is_none()
        {
            let what = match scope {
                TargetScope::Category(_) => "category",
                TargetScope::Group(_) => "category group",
            };
            return Err(PublishError::Resolution(format!(
                "User is not assigned to this {}",
                what
            )));
        }

        let targets = self.targets.resolve(&scope).await?;
        if targets.is_empty() {
            return Err(PublishError::Resolution(
                "No destinations mapped for this category".to_string(),
            ));
        }

        let exclusions = match request.exclusions {
            Some(explicit) if !explicit.is_empty() => explicit,
            _ => item.excluded_destinations.0.clone(),
        };
        let media = self.load_media(&item).await;

        let batch_cancel = cancel.child_token();
        let deadline_timer = self.settings.deadline.map(|deadline| {
            let token = batch_cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                tracing::warn!(deadline_ms = deadline.as_millis() as u64, "Publish deadline reached");
                token.cancel();
            })
        });

        let batch = Batch {
            item,
            caller_user_id: request.caller_user_id,
            exclusions,
            media,
            cancel: batch_cancel,
        };

        tracing::info!(
            content_id = %batch.item.id,
            targets = targets.len(),
            concurrency = self.settings.concurrency.max(1),
            "Publish started"
        );

        let total = targets.len();
        let lanes = lanes_by_destination(targets);
        let outcome: Result<Vec<Vec<(usize, TargetReport)>>, PublishError> =
            stream::iter(lanes.into_iter().map(|lane| self.run_lane(&batch, lane)))
                .buffer_unordered(self.settings.concurrency.max(1))
                .try_collect()
                .await;

        if let Some(timer) = deadline_timer {
            timer.abort();
        }

        let mut slots: Vec<Option<TargetReport>> = vec![None; total];
        for (index, report) in outcome?.into_iter().flatten() {
            slots[index] = Some(report);
        }
        let results: Vec<TargetReport> = slots.into_iter().flatten().collect();

        let succeeded = results.iter().filter(|r| r.success).count();
        tracing::info!(
            content_id = %batch.item.id,
            targets = results.len(),
            succeeded,
            failed = results.len() - succeeded,
            "Publish finished"
        );

        Ok(PublishReport {
            content_id: batch.item.id,
            results,
        })
    }

    async fn load_media(&self, item: &ContentItem) -> Option<Result<MediaFile, String>> {
        let reference = item.media_path.as_deref()?;
        let loaded = MediaFile::load(&self.settings.media_root, reference)
            .await
            .map_err(|e| e.to_string());
        if let Err(e) = &loaded {
            tracing::warn!(content_id = %item.id, error = %e, "Media could not be loaded");
        }
        Some(loaded)
    }

    async fn run_lane(
        &self,
        batch: &Batch,
        lane: Vec<(usize, PublishTarget)>,
    ) -> Result<Vec<(usize, TargetReport)>, PublishError> {
        let mut reports = Vec::with_capacity(lane.len());
        for (index, target) in lane {
            let report = self.run_target(batch, &target).await?;
            reports.push((index, report));
        }
        Ok(reports)
    }

    async fn run_target(
        &self,
        batch: &Batch,
        target: &PublishTarget,
    ) -> Result<TargetReport, PublishError> {
        let destination = &target.destination;
        let report = |outcome: TargetOutcome, message: String, elapsed_ms: Option<u64>| {
            TargetReport::new(
                destination.name.clone(),
                target.destination_category.name.clone(),
                outcome,
                message,
                elapsed_ms,
            )
        };

        if batch.exclusions.iter().any(|e| e.matches(destination)) {
            tracing::info!(destination = %destination.name, "Destination excluded, skipping");
            return Ok(report(
                TargetOutcome::SkippedExcluded,
                SKIPPED_EXCLUDED_MESSAGE.to_string(),
                None,
            ));
        }

        if batch.cancel.is_cancelled() {
            return Ok(report(
                TargetOutcome::Cancelled,
                TargetFailure::Cancelled.to_string(),
                None,
            ));
        }

        let new = NewDistribution {
            content_id: batch.item.id,
            destination_id: destination.id,
            destination_category_id: target.destination_category.id,
            category_id: target.mapping.category_id,
        };
        let (record, created) = self.records.get_or_create(&new).await?;
        let record = match self.claim(record, created).await? {
            Claim::Proceed(record) => record,
            Claim::AlreadyDelivered => {
                tracing::info!(destination = %destination.name, "Already delivered, skipping");
                return Ok(already_delivered(target));
            }
            Claim::InProgress => {
                tracing::info!(destination = %destination.name, "Another publish holds this destination, skipping");
                return Ok(report(
                    TargetOutcome::SkippedInProgress,
                    IN_PROGRESS_MESSAGE.to_string(),
                    None,
                ));
            }
        };
        tracing::debug!(
            destination = %destination.name,
            distribution_id = %record.id,
            created,
            retry_count = record.retry_count,
            "Distribution claimed"
        );

        let started = Instant::now();

        let content = tokio::select! {
            biased;
            _ = batch.cancel.cancelled() => {
                return self.fail_target(record, target, TargetFailure::Cancelled).await;
            }
            resolved = self.variations.resolve(&batch.item, &target.mapping, destination) => {
                match resolved {
                    Ok(content) => content,
                    Err(e) => {
                        return self
                            .fail_target(record, target, TargetFailure::AiGeneration(e))
                            .await;
                    }
                }
            }
        };

        let author = match self
            .catalog
            .destination_user(batch.caller_user_id, destination.id)
            .await?
        {
            Some(user) => user.destination_user_id,
            None => {
                return self
                    .fail_target(record, target, TargetFailure::IdentityMappingMissing)
                    .await;
            }
        };

        let media = match &batch.media {
            Some(Ok(media)) => Some(media),
            Some(Err(e)) => {
                return self
                    .fail_target(record, target, TargetFailure::Delivery(e.clone()))
                    .await;
            }
            None => None,
        };

        let payload = build_payload(
            &batch.item,
            &content,
            &target.destination_category,
            &author,
            Utc::now(),
        );

        let delivery = tokio::select! {
            biased;
            _ = batch.cancel.cancelled() => {
                return self.fail_target(record, target, TargetFailure::Cancelled).await;
            }
            delivery = self.portal.send(&destination.base_url, &payload, media) => delivery,
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let mut record = record;
        record.complete(
            delivery.success,
            delivery.message.clone(),
            &content,
            elapsed_ms,
            Utc::now(),
        )?;
        if !self.persist(&record).await? {
            return Ok(already_delivered(target));
        }

        let outcome = if delivery.success {
            tracing::info!(
                destination = %destination.name,
                status = ?delivery.status_code,
                elapsed_ms,
                "Delivered"
            );
            TargetOutcome::SentSuccess
        } else {
            tracing::warn!(
                destination = %destination.name,
                status = ?delivery.status_code,
                elapsed_ms,
                message = %delivery.message,
                "Delivery failed"
            );
            TargetOutcome::SentFailed
        };

        Ok(report(outcome, delivery.message, Some(elapsed_ms)))
    }

    /// Own the record for one attempt.
    ///
    /// A record this call created is already owned. Otherwise a delivered
    /// record is skipped, a failed one is retried and a pending one is taken
    /// over only once its attempt lease has lapsed.
    async fn claim(
        &self,
        mut record: DistributionRecord,
        created: bool,
    ) -> Result<Claim, PublishError> {
        if created {
            return Ok(Claim::Proceed(record));
        }
        let lease = chrono::Duration::from_std(self.settings.attempt_lease)
            .map_err(|e| Error::Configuration(format!("Invalid attempt lease: {}", e)))?;
        loop {
            match record.status {
                DistributionStatus::Success => return Ok(Claim::AlreadyDelivered),
                DistributionStatus::Pending => {
                    return match self.records.claim_pending(record.id, lease).await? {
                        Some(claimed) => {
                            tracing::info!(
                                distribution_id = %claimed.id,
                                "Resuming abandoned distribution"
                            );
                            Ok(Claim::Proceed(claimed))
                        }
                        None => Ok(Claim::InProgress),
                    };
                }
                DistributionStatus::Failed => {
                    if let Some(retried) = self.records.begin_retry(record.id).await? {
                        tracing::info!(
                            distribution_id = %retried.id,
                            retry_count = retried.retry_count,
                            "Retrying failed distribution"
                        );
                        return Ok(Claim::Proceed(retried));
                    }
                    // Someone else moved it first; re-read and decide again
                    let id = record.id;
                    record = self.records.find(id).await?.ok_or_else(|| {
                        Error::NotFound(format!("Distribution {} not found", id))
                    })?;
                }
            }
        }
    }

    /// Write a finished attempt. `false` when another attempt took over after the lease lapsed and delivered first.
    async fn persist(&self, record: &DistributionRecord) -> Result<bool, PublishError> {
        match self.records.update_status(record).await {
            Ok(_) => Ok(true),
            Err(Error::Conflict(message)) => {
                tracing::info!(distribution_id = %record.id, reason = %message, "Record delivered concurrently, result discarded");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist FAILED for a per-target failure and report it
    async fn fail_target(
        &self,
        mut record: DistributionRecord,
        target: &PublishTarget,
        failure: TargetFailure,
    ) -> Result<TargetReport, PublishError> {
        let message = failure.to_string();
        record.fail(message.clone(), Utc::now())?;
        if !self.persist(&record).await? {
            return Ok(already_delivered(target));
        }

        tracing::warn!(
            destination = %target.destination.name,
            distribution_id = %record.id,
            outcome = ?failure.outcome(),
            message = %message,
            "Target failed"
        );

        Ok(TargetReport::new(
            target.destination.name.clone(),
            target.destination_category.name.clone(),
            failure.outcome(),
            message,
            None,
        ))
    }
}

fn already_delivered(target: &PublishTarget) -> TargetReport {
    TargetReport::new(
        target.destination.name.clone(),
        target.destination_category.name.clone(),
        TargetOutcome::SkippedAlreadySuccess,
        ALREADY_SUCCESS_MESSAGE.to_string(),
        None,
    )
}

/// Group targets by destination, keeping first-appearance order and each target's report index
fn lanes_by_destination(targets: Vec<PublishTarget>) -> Vec<Vec<(usize, PublishTarget)>> {
    let mut lanes: Vec<Vec<(usize, PublishTarget)>> = Vec::new();
    let mut lane_of: HashMap<Uuid, usize> = HashMap::new();
    for (index, target) in targets.into_iter().enumerate() {
        match lane_of.get(&target.destination.id) {
            Some(&lane) => lanes[lane].push((index, target)),
            None => {
                lane_of.insert(target.destination.id, lanes.len());
                lanes.push(vec![(index, target)]);
            }
        }
    }
    lanes
}
