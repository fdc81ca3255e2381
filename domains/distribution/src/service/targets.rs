//! Target resolution: category or group → ordered, deduplicated targets

use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use newsrelay_common::Result;

use crate::domain::entities::{PublishTarget, TargetScope};
use crate::repository::CatalogStore;

/// Turns a publish scope into concrete (destination, destination category) pairs
#[derive(Clone)]
pub struct TargetResolver {
    catalog: Arc<dyn CatalogStore>,
}

impl TargetResolver {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// Resolve a scope. Order follows group membership, then the catalog's mapping order.
    /// Pairs reached through more than one category are kept once, at first sight.
    pub async fn resolve(&self, scope: &TargetScope) -> Result<Vec<PublishTarget>> {
        let categories = match scope {
            TargetScope::Category(id) => vec![*id],
            TargetScope::Group(id) => self.catalog.group_categories(*id).await?,
        };

        let mut seen: HashSet<(Uuid, Uuid)> = HashSet::new();
        let mut targets = Vec::new();
        for category_id in categories {
            for target in self.catalog.mappings_for_category(category_id).await? {
                if seen.insert((target.destination.id, target.destination_category.id)) {
                    targets.push(target);
                }
            }
        }

        tracing::debug!(scope = ?scope, targets = targets.len(), "Resolved publish targets");
        Ok(targets)
    }
}
