//! Bulk orchestrator — one generic pipeline for every host context.
//!
//! ARCHITECTURE
//! ============
//! A `BulkOrchestrator` is built per screen from a `ContextKeys` (personal,
//! team or board; memo or task), an `ItemBackend` adapter, a cache and a
//! token source. It owns the selection store and one render-state channel
//! per scope, and drives:
//!
//! ```text
//! idle -> confirming -> running -> settling -> idle
//!            \-> idle (cancel)
//! ```
//!
//! DESIGN
//! ======
//! - The phase check and the `idle -> confirming` transition happen under
//!   one lock, so a second trigger for a busy scope is a no-op and never
//!   reaches the dispatcher.
//! - Once confirmed, the batch runs on its own task: dropping the caller's
//!   future cannot strand half-faded items.
//! - Fades and the countdown are timer-driven. Dispatch runs alongside, and
//!   the reconciler commits only when both the visual sequence has settled
//!   and every call has settled. The lid closes on its own grace timer.
//! - Selected ids missing from the source collection are dropped from the
//!   selection before planning, so stale ids are never dispatched and never
//!   linger next to a capped batch's remainder.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{ItemBackend, TokenSource};
use crate::cache::{ContextKeys, ItemCache};
use crate::choreographer::{AnimationState, Choreographer, Phase, Timeline};
use crate::config::BulkConfig;
use crate::dispatch::{DispatchEngine, Tally};
use crate::error::BulkError;
use crate::events::{BulkEvent, EventBus};
use crate::item::{Collection, Item, ItemId, Operation, Scope};
use crate::planner::{BatchPlan, BatchPlanner};
use crate::reconcile::{BatchReport, Reconciler};
use crate::selection::{SelectionMode, SelectionStore};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Nothing selected (or every selected id is gone from the collection).
    EmptySelection,
    /// A bulk action is already in flight for this scope.
    Busy(Phase),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BulkOutcome {
    Rejected(RejectReason),
    Cancelled,
    Completed(BatchReport),
}

struct ScopeSlot {
    state: Arc<watch::Sender<AnimationState>>,
    pending: Option<oneshot::Sender<bool>>,
}

impl ScopeSlot {
    fn new() -> Self {
        let (tx, _) = watch::channel(AnimationState::default());
        Self { state: Arc::new(tx), pending: None }
    }

    fn phase(&self) -> Phase {
        self.state.borrow().phase
    }
}

#[derive(Default)]
struct Shared {
    selection: SelectionStore,
    scopes: HashMap<Scope, ScopeSlot>,
}

impl Shared {
    fn slot(&mut self, scope: &Scope) -> &mut ScopeSlot {
        self.scopes.entry(scope.clone()).or_insert_with(ScopeSlot::new)
    }
}

/// Everything needed to run a batch once the user has confirmed.
struct Staged {
    plan: BatchPlan,
    targets: Vec<Item>,
    timeline: Timeline,
    state: Arc<watch::Sender<AnimationState>>,
    answer: Option<oneshot::Receiver<bool>>,
}

struct Inner {
    keys: ContextKeys,
    backend: Arc<dyn ItemBackend>,
    cache: Arc<dyn ItemCache>,
    tokens: Arc<dyn TokenSource>,
    config: BulkConfig,
    planner: BatchPlanner,
    choreographer: Choreographer,
    dispatcher: DispatchEngine,
    reconciler: Reconciler,
    events: EventBus,
    shared: Mutex<Shared>,
}

#[derive(Clone)]
pub struct BulkOrchestrator {
    inner: Arc<Inner>,
}

// =============================================================================
// CONSTRUCTION AND OBSERVATION
// =============================================================================

impl BulkOrchestrator {
    #[must_use]
    pub fn new(
        keys: ContextKeys,
        backend: Arc<dyn ItemBackend>,
        cache: Arc<dyn ItemCache>,
        tokens: Arc<dyn TokenSource>,
        config: BulkConfig,
    ) -> Self {
        let inner = Inner {
            planner: BatchPlanner::new(&config),
            choreographer: Choreographer::new(&config),
            dispatcher: DispatchEngine::new(backend.clone(), &config),
            reconciler: Reconciler::new(keys.clone()),
            events: EventBus::new(),
            shared: Mutex::new(Shared::default()),
            keys,
            backend,
            cache,
            tokens,
            config,
        };
        Self { inner: Arc::new(inner) }
    }

    fn shared(&self) -> MutexGuard<'_, Shared> {
        self.inner.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn config(&self) -> &BulkConfig {
        &self.inner.config
    }

    /// Live `{ phase, display_count, lid_open }` for one scope.
    #[must_use]
    pub fn watch(&self, scope: &Scope) -> watch::Receiver<AnimationState> {
        self.shared().slot(scope).state.subscribe()
    }

    #[must_use]
    pub fn state(&self, scope: &Scope) -> AnimationState {
        self.shared()
            .scopes
            .get(scope)
            .map_or_else(AnimationState::default, |slot| *slot.state.borrow())
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BulkEvent> {
        self.inner.events.subscribe()
    }

    /// Load a collection from the backend into the cache. Returns the item count.
    ///
    /// # Errors
    ///
    /// Returns `MissingToken` without a session, or `Collection` if the fetch fails.
    pub async fn refresh(&self, collection: Collection) -> Result<usize, BulkError> {
        let token = self.inner.tokens.token().await.ok_or(BulkError::MissingToken)?;
        let items = self.inner.backend.fetch_collection(collection, &token).await?;
        let count = items.len();
        self.inner.cache.put(&self.inner.keys.collection(collection), items);
        debug!(?collection, count, "collection refreshed");
        Ok(count)
    }
}

// =============================================================================
// SELECTION
// =============================================================================

impl BulkOrchestrator {
    #[must_use]
    pub fn selection_mode(&self) -> SelectionMode {
        self.shared().selection.mode()
    }

    pub fn set_selection_mode(&self, mode: SelectionMode) {
        self.shared().selection.set_mode(mode);
    }

    pub fn toggle(&self, scope: &Scope, id: ItemId) -> bool {
        self.shared().selection.toggle(scope, id)
    }

    pub fn select_all(&self, scope: &Scope, ids_in_view: &[ItemId]) {
        self.shared().selection.select_all(scope, ids_in_view.iter().cloned());
    }

    pub fn toggle_all(&self, scope: &Scope, ids_in_view: &[ItemId]) {
        self.shared().selection.toggle_all(scope, ids_in_view);
    }

    pub fn clear_selection(&self, scope: &Scope) {
        self.shared().selection.clear(scope);
    }

    /// Checked ids for rendering checkboxes.
    #[must_use]
    pub fn selection(&self, scope: &Scope) -> HashSet<ItemId> {
        self.shared().selection.selected(scope)
    }

    /// The scope's source collection changed for reasons unrelated to a bulk
    /// action. Prunes vanished ids while in check mode and idle; a scope with
    /// a batch in flight keeps its selection untouched. Returns ids pruned.
    pub fn sync_collection(&self, scope: &Scope, current_ids: &HashSet<ItemId>) -> usize {
        let mut shared = self.shared();
        if shared.selection.mode() != SelectionMode::Check {
            return 0;
        }
        if shared.scopes.get(scope).is_some_and(|slot| slot.phase().is_busy()) {
            return 0;
        }
        let pruned = shared.selection.prune(scope, current_ids);
        if pruned > 0 {
            debug!(%scope, pruned, "pruned stale selection");
        }
        pruned
    }
}

// =============================================================================
// BULK PIPELINE
// =============================================================================

impl BulkOrchestrator {
    /// Run the full confirm, animate, dispatch, reconcile pipeline for the
    /// scope's selection. `display_order` is the on-screen order of the ids
    /// in view; capped batches take the topmost ones.
    ///
    /// # Errors
    ///
    /// Returns `MissingToken` when a non-empty batch cannot start without a
    /// session. Individual item failures never surface as errors.
    pub async fn begin_bulk_operation(
        &self,
        scope: &Scope,
        operation: Operation,
        display_order: &[ItemId],
    ) -> Result<BulkOutcome, BulkError> {
        let phase = self.state(scope).phase;
        if phase.is_busy() {
            debug!(%scope, ?phase, "bulk action ignored; scope busy");
            return Ok(BulkOutcome::Rejected(RejectReason::Busy(phase)));
        }

        let token = self.inner.tokens.token().await;

        let mut staged = match self.stage(scope, operation, display_order, token.is_some()) {
            Ok(Ok(staged)) => staged,
            Ok(Err(reason)) => {
                debug!(%scope, ?reason, "bulk action rejected");
                return Ok(BulkOutcome::Rejected(reason));
            }
            Err(e) => {
                warn!(%scope, %operation, error = %e, "bulk action could not start");
                return Err(e);
            }
        };
        let Some(token) = token else {
            return Err(BulkError::MissingToken);
        };

        if let Some(answer) = staged.answer.take() {
            let guard = ConfirmGuard { orchestrator: self, scope, armed: true };
            let confirmed = answer.await.unwrap_or(false);
            guard.disarm();
            if !confirmed {
                Choreographer::reset(&staged.state);
                self.inner.events.publish(BulkEvent::Cancelled { scope: scope.clone() });
                info!(%scope, %operation, "bulk action cancelled");
                return Ok(BulkOutcome::Cancelled);
            }
        }

        let batch = tokio::spawn(self.clone().run_batch(scope.clone(), token, staged));
        match batch.await {
            Ok(report) => Ok(BulkOutcome::Completed(report)),
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => Err(BulkError::Aborted(e.to_string())),
        }
    }

    /// Commit the pending confirmation for `scope`. Returns false if none is pending.
    pub fn confirm(&self, scope: &Scope) -> bool {
        self.answer(scope, true)
    }

    /// Dismiss the pending confirmation: the scope returns to idle untouched.
    pub fn cancel_confirmation(&self, scope: &Scope) -> bool {
        self.answer(scope, false)
    }

    fn answer(&self, scope: &Scope, confirmed: bool) -> bool {
        let pending = self.shared().scopes.get_mut(scope).and_then(|slot| slot.pending.take());
        pending.is_some_and(|tx| tx.send(confirmed).is_ok())
    }

    /// Claim the scope and plan the batch under a single lock.
    fn stage(
        &self,
        scope: &Scope,
        operation: Operation,
        display_order: &[ItemId],
        has_token: bool,
    ) -> Result<Result<Staged, RejectReason>, BulkError> {
        let inner = &self.inner;
        let source = inner.cache.items(&inner.keys.collection(operation.source()));
        let mut by_id: HashMap<ItemId, Item> = source.into_iter().map(|item| (item.id.clone(), item)).collect();

        let mut shared = self.shared();
        let phase = shared.slot(scope).phase();
        if phase.is_busy() {
            return Ok(Err(RejectReason::Busy(phase)));
        }

        let stale: Vec<ItemId> = shared
            .selection
            .selected(scope)
            .into_iter()
            .filter(|id| !by_id.contains_key(id))
            .collect();
        let ordered: Vec<ItemId> = shared
            .selection
            .in_display_order(scope, display_order)
            .into_iter()
            .filter(|id| by_id.contains_key(id))
            .collect();
        let plan = inner.planner.plan(operation, inner.keys.kind, &ordered);
        if plan.is_noop() {
            return Ok(Err(RejectReason::EmptySelection));
        }
        if !has_token {
            return Err(BulkError::MissingToken);
        }
        if !stale.is_empty() {
            // Checked ids must stay a subset of the source collection.
            shared.selection.remove(scope, &stale);
            debug!(%scope, stale = stale.len(), "dropped selected ids missing from the collection");
        }

        let targets: Vec<Item> = plan.immediate.iter().filter_map(|id| by_id.remove(id)).collect();
        let dom_keys: Vec<String> = targets.iter().map(|item| item.dom_key(inner.keys.kind)).collect();
        let timeline = Timeline::build(&dom_keys, plan.total_requested, plan.remaining_after(), &inner.config);

        let slot = shared.slot(scope);
        Choreographer::begin_confirming(&slot.state, timeline.start_count);
        let state = slot.state.clone();
        let answer = plan.prompt.clone().map(|prompt| {
            let (tx, rx) = oneshot::channel();
            slot.pending = Some(tx);
            inner.events.publish(BulkEvent::ConfirmRequested { scope: scope.clone(), prompt });
            rx
        });

        Ok(Ok(Staged { plan, targets, timeline, state, answer }))
    }

    async fn run_batch(self, scope: Scope, token: String, staged: Staged) -> BatchReport {
        let inner = &self.inner;
        let Staged { plan, targets, timeline, state, .. } = staged;
        let batch_id = Uuid::new_v4();
        info!(
            %batch_id,
            %scope,
            context = %inner.keys.context,
            operation = %plan.operation,
            count = targets.len(),
            deferred = plan.deferred.len(),
            "bulk batch started"
        );

        let (settled_tx, settled_rx) = oneshot::channel::<()>();
        let visual = async {
            let settled_at = inner.choreographer.play(&timeline, &scope, &state, &inner.events).await;
            let _ = settled_tx.send(());
            inner.choreographer.close_lid(settled_at, &scope, &state, &inner.events).await;
        };
        let commit = async {
            let results = inner.dispatcher.run(&targets, plan.operation, &token).await;
            let _ = settled_rx.await;
            let tally = self.reconcile(&scope, &plan, &results);
            (results, tally)
        };
        let ((), (results, tally)) = tokio::join!(visual, commit);

        Choreographer::reset(&state);

        let report = BatchReport {
            batch_id,
            scope: scope.clone(),
            context: inner.keys.context.clone(),
            operation: plan.operation,
            processed: plan.immediate,
            deferred: plan.deferred,
            tally,
            results,
        };
        info!(
            %batch_id,
            %scope,
            succeeded = tally.succeeded,
            not_found = tally.not_found,
            failed = tally.failed,
            "bulk batch finished"
        );
        inner.events.publish(BulkEvent::Completed { scope, report: report.clone() });
        report
    }

    fn reconcile(&self, scope: &Scope, plan: &BatchPlan, results: &[crate::dispatch::DispatchResult]) -> Tally {
        let mut shared = self.shared();
        self.inner
            .reconciler
            .apply(self.inner.cache.as_ref(), &mut shared.selection, scope, plan, results)
    }
}

/// Returns the scope to idle if the caller stops waiting while confirming.
struct ConfirmGuard<'a> {
    orchestrator: &'a BulkOrchestrator,
    scope: &'a Scope,
    armed: bool,
}

impl ConfirmGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ConfirmGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut shared = self.orchestrator.shared();
        if let Some(slot) = shared.scopes.get_mut(self.scope) {
            slot.pending = None;
            if slot.phase() == Phase::Confirming {
                Choreographer::reset(&slot.state);
            }
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
