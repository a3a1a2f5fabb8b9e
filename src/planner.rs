//! Batch planner — splits a display-ordered selection against the per-batch cap.
//!
//! DESIGN
//! ======
//! The planner is pure: it takes ids already sorted in on-screen order so a
//! capped batch removes a contiguous top-down run of items, and it never
//! queries rendered positions itself. An empty request yields a no-op plan
//! that callers must not open a prompt for.

use std::collections::HashSet;

use serde::Serialize;

use crate::config::{BulkConfig, RESTORE_CONFIRM_THRESHOLD};
use crate::item::{ItemId, ItemKind, Operation};

// =============================================================================
// TYPES
// =============================================================================

/// User-facing confirmation request for a planned batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmPrompt {
    pub operation: Operation,
    pub kind: ItemKind,
    /// Items that will be processed if the user confirms.
    pub count: usize,
    pub total_requested: usize,
    pub limit: usize,
    pub capped: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub operation: Operation,
    pub immediate: Vec<ItemId>,
    pub deferred: Vec<ItemId>,
    pub total_requested: usize,
    pub prompt: Option<ConfirmPrompt>,
}

impl BatchPlan {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.immediate.is_empty()
    }

    #[must_use]
    pub fn is_capped(&self) -> bool {
        !self.deferred.is_empty()
    }

    #[must_use]
    pub fn requires_confirmation(&self) -> bool {
        self.prompt.is_some()
    }

    /// Count still checked after this batch completes.
    #[must_use]
    pub fn remaining_after(&self) -> usize {
        self.deferred.len()
    }
}

// =============================================================================
// PLANNING
// =============================================================================

#[derive(Debug, Clone, Copy)]
pub struct BatchPlanner {
    limit: usize,
    delete_confirm_threshold: usize,
}

impl BatchPlanner {
    #[must_use]
    pub fn new(config: &BulkConfig) -> Self {
        Self { limit: config.batch_limit.max(1), delete_confirm_threshold: config.delete_confirm_threshold }
    }

    fn confirm_threshold(&self, operation: Operation) -> usize {
        match operation {
            Operation::Delete => self.delete_confirm_threshold,
            Operation::Restore => RESTORE_CONFIRM_THRESHOLD,
        }
    }

    /// Plan a batch over `ordered_ids`, which must reflect on-screen order.
    /// Duplicate ids keep their first position.
    #[must_use]
    pub fn plan(&self, operation: Operation, kind: ItemKind, ordered_ids: &[ItemId]) -> BatchPlan {
        let mut seen = HashSet::with_capacity(ordered_ids.len());
        let mut ids: Vec<ItemId> = ordered_ids
            .iter()
            .filter(|id| seen.insert(*id))
            .cloned()
            .collect();
        let total_requested = ids.len();

        if total_requested == 0 {
            return BatchPlan { operation, immediate: Vec::new(), deferred: Vec::new(), total_requested, prompt: None };
        }

        let deferred = if total_requested > self.limit { ids.split_off(self.limit) } else { Vec::new() };
        let immediate = ids;
        let capped = !deferred.is_empty();

        let prompt = (capped || immediate.len() >= self.confirm_threshold(operation)).then(|| {
            let message = if capped {
                capped_message(operation, kind, total_requested, self.limit)
            } else {
                ordinary_message(operation, kind, immediate.len())
            };
            ConfirmPrompt {
                operation,
                kind,
                count: immediate.len(),
                total_requested,
                limit: self.limit,
                capped,
                message,
            }
        });

        BatchPlan { operation, immediate, deferred, total_requested, prompt }
    }
}

fn capitalized(verb: &str) -> String {
    let mut chars = verb.chars();
    chars
        .next()
        .map(|c| c.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

fn ordinary_message(operation: Operation, kind: ItemKind, count: usize) -> String {
    format!("{} {count} {}?", capitalized(operation.verb()), kind.noun(count))
}

fn capped_message(operation: Operation, kind: ItemKind, total: usize, limit: usize) -> String {
    let remaining = total - limit;
    format!(
        "{total} selected / cap {limit}: {} the first {limit} {} now? The remaining {remaining} stay selected.",
        operation.verb(),
        kind.noun(limit),
    )
}

#[cfg(test)]
#[path = "planner_test.rs"]
mod tests;
