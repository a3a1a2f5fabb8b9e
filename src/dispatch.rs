//! Dispatch engine — one backend call per item, fanned out with bounded concurrency.
//!
//! DESIGN
//! ======
//! Calls are independent; completion order is irrelevant and results are
//! returned in input order. The engine never retries and never aborts
//! siblings: a not-found is a benign no-op, anything else is logged and
//! recorded as `Error`. What "done" means for the UI is decided by the
//! reconciler, not here.
//!
//! Restores are keyed by `original_id`, since the local row id may already
//! be invalid once an item has moved between collections.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{BackendError, ItemBackend};
use crate::config::BulkConfig;
use crate::error::ErrorCode;
use crate::item::{Item, ItemId, Operation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DispatchOutcome {
    Success,
    NotFound,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchResult {
    pub id: ItemId,
    pub outcome: DispatchOutcome,
}

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub succeeded: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl Tally {
    #[must_use]
    pub fn of(results: &[DispatchResult]) -> Self {
        results.iter().fold(Self::default(), |mut tally, r| {
            match r.outcome {
                DispatchOutcome::Success => tally.succeeded += 1,
                DispatchOutcome::NotFound => tally.not_found += 1,
                DispatchOutcome::Error => tally.failed += 1,
            }
            tally
        })
    }
}

#[derive(Clone)]
pub struct DispatchEngine {
    backend: Arc<dyn ItemBackend>,
    concurrency: usize,
    call_timeout: Duration,
}

impl DispatchEngine {
    #[must_use]
    pub fn new(backend: Arc<dyn ItemBackend>, config: &BulkConfig) -> Self {
        Self { backend, concurrency: config.dispatch_concurrency, call_timeout: config.call_timeout }
    }

    /// Issue `operation` for every item and wait for all calls to settle.
    pub async fn run(&self, items: &[Item], operation: Operation, token: &str) -> Vec<DispatchResult> {
        if items.is_empty() {
            return Vec::new();
        }
        let limit = if self.concurrency == 0 { items.len() } else { self.concurrency };

        let mut settled: Vec<(usize, DispatchResult)> = futures::stream::iter(items.iter().cloned().enumerate())
            .map(move |(index, item)| async move { (index, self.dispatch_one(&item, operation, token).await) })
            .buffer_unordered(limit)
            .collect()
            .await;

        settled.sort_by_key(|(index, _)| *index);
        settled.into_iter().map(|(_, result)| result).collect()
    }

    async fn dispatch_one(&self, item: &Item, operation: Operation, token: &str) -> DispatchResult {
        let call = async {
            match operation {
                Operation::Delete => self.backend.delete(&item.id, token).await,
                Operation::Restore => self.backend.restore(&item.original_id, token).await.map(|_| ()),
            }
        };

        let result = tokio::time::timeout(self.call_timeout, call)
            .await
            .unwrap_or_else(|_| Err(BackendError::Timeout { ms: self.call_timeout.as_millis() }));

        let outcome = match result {
            Ok(()) => DispatchOutcome::Success,
            Err(BackendError::NotFound) => {
                debug!(id = %item.id, %operation, "item already gone; skipping");
                DispatchOutcome::NotFound
            }
            Err(e) => {
                warn!(id = %item.id, %operation, code = e.error_code(), error = %e, "bulk item call failed");
                DispatchOutcome::Error
            }
        };

        DispatchResult { id: item.id.clone(), outcome }
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
