//! Cache reconciler — commits a settled batch to the cache and the selection.
//!
//! DESIGN
//! ======
//! Runs only after every dispatch call has settled and the visual sequence
//! has reached `settling`. Every item in the batch counts as processed for
//! the UI, whatever its individual outcome: it has already faded out, and a
//! per-item backend error is not actionable by the user.
//!
//! Data for the destination collection is never reconstructed locally.
//! Deletes bump the deleted collection's logical count and mark it stale;
//! restores mark the active collection stale. Board listings are always
//! invalidated because board membership is a derived join.

use std::collections::HashSet;

use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::cache::{ContextKeys, ItemCache};
use crate::dispatch::{DispatchResult, Tally};
use crate::item::{HostContext, ItemId, Operation, Scope};
use crate::planner::BatchPlan;
use crate::selection::SelectionStore;

/// What one bulk action did, as reported to the UI and logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub scope: Scope,
    pub context: HostContext,
    pub operation: Operation,
    /// Ids removed from view by this batch, in display order.
    pub processed: Vec<ItemId>,
    /// Ids left checked for the next pass.
    pub deferred: Vec<ItemId>,
    pub tally: Tally,
    pub results: Vec<DispatchResult>,
}

impl BatchReport {
    #[must_use]
    pub fn is_capped(&self) -> bool {
        !self.deferred.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    keys: ContextKeys,
}

impl Reconciler {
    #[must_use]
    pub fn new(keys: ContextKeys) -> Self {
        Self { keys }
    }

    /// Apply a settled batch. `results` must cover every id in `plan.immediate`.
    pub fn apply(
        &self,
        cache: &dyn ItemCache,
        selection: &mut SelectionStore,
        scope: &Scope,
        plan: &BatchPlan,
        results: &[DispatchResult],
    ) -> Tally {
        let tally = Tally::of(results);
        let processed: HashSet<ItemId> = plan.immediate.iter().cloned().collect();

        match plan.operation {
            Operation::Delete => {
                let removed = cache.remove(&self.keys.active(), &processed);
                if self.keys.board().is_some() {
                    cache.remove(&self.keys.owner_active(), &processed);
                }
                cache.adjust_count(&self.keys.deleted(), isize::try_from(tally.succeeded).unwrap_or(isize::MAX));
                cache.invalidate(&self.keys.deleted());
                info!(%scope, removed, succeeded = tally.succeeded, "delete batch reconciled");
            }
            Operation::Restore => {
                let removed = cache.remove(&self.keys.deleted(), &processed);
                cache.invalidate(&self.keys.owner_active());
                info!(%scope, removed, succeeded = tally.succeeded, "restore batch reconciled");
            }
        }

        if let Some(board) = self.keys.board() {
            cache.invalidate(&board);
        }

        if plan.is_capped() {
            selection.remove(scope, &plan.immediate);
        } else {
            selection.clear(scope);
        }

        tally
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
