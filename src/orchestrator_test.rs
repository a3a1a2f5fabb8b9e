use super::*;
use crate::backend::test_helpers::{MockBackend, items};
use crate::backend::StaticToken;
use crate::cache::MemoryCache;
use crate::dispatch::DispatchOutcome;
use crate::item::{HostContext, ItemKind};
use crate::planner::ConfirmPrompt;
use std::time::Duration;

struct Harness {
    orchestrator: BulkOrchestrator,
    backend: Arc<MockBackend>,
    cache: Arc<MemoryCache>,
    keys: ContextKeys,
}

fn harness_with(backend: MockBackend, token: Option<&str>, active: Vec<Item>, deleted: Vec<Item>) -> Harness {
    let keys = ContextKeys::new(HostContext::Personal, ItemKind::Memo);
    let backend = Arc::new(backend);
    let cache = Arc::new(MemoryCache::new());
    cache.put(&keys.active(), active);
    cache.put(&keys.deleted(), deleted);
    let orchestrator = BulkOrchestrator::new(
        keys.clone(),
        backend.clone(),
        cache.clone(),
        Arc::new(StaticToken(token.map(str::to_owned))),
        BulkConfig::default(),
    );
    Harness { orchestrator, backend, cache, keys }
}

fn harness(active: Vec<Item>, deleted: Vec<Item>) -> Harness {
    harness_with(MockBackend::new(), Some("secret"), active, deleted)
}

fn ids(range: std::ops::Range<i64>) -> Vec<ItemId> {
    range.map(ItemId::Num).collect()
}

async fn next_prompt(events: &mut broadcast::Receiver<BulkEvent>) -> ConfirmPrompt {
    loop {
        if let BulkEvent::ConfirmRequested { prompt, .. } = events.recv().await.unwrap() {
            return prompt;
        }
    }
}

fn begin(
    h: &Harness,
    scope: &Scope,
    operation: Operation,
    order: &[ItemId],
) -> tokio::task::JoinHandle<Result<BulkOutcome, BulkError>> {
    let orchestrator = h.orchestrator.clone();
    let scope = scope.clone();
    let order = order.to_vec();
    tokio::spawn(async move { orchestrator.begin_bulk_operation(&scope, operation, &order).await })
}

/// Start a batch, wait for its prompt, confirm, and return the outcome with the prompt.
async fn run_confirmed(h: &Harness, scope: &Scope, operation: Operation, order: &[ItemId]) -> (ConfirmPrompt, BulkOutcome) {
    let mut events = h.orchestrator.subscribe();
    let task = begin(h, scope, operation, order);
    let prompt = next_prompt(&mut events).await;
    assert!(h.orchestrator.confirm(scope));
    (prompt, task.await.unwrap().unwrap())
}

fn completed(outcome: BulkOutcome) -> BatchReport {
    match outcome {
        BulkOutcome::Completed(report) => report,
        other => panic!("expected completed batch, got {other:?}"),
    }
}

/// Records every published state of `scope` until it returns to idle after settling.
fn record(h: &Harness, scope: &Scope) -> tokio::task::JoinHandle<Vec<AnimationState>> {
    let mut rx = h.orchestrator.watch(scope);
    tokio::spawn(async move {
        let mut seen = vec![*rx.borrow_and_update()];
        let mut settled = false;
        while rx.changed().await.is_ok() {
            let state = *rx.borrow_and_update();
            seen.push(state);
            settled |= state.phase == Phase::Settling;
            if settled && state.phase == Phase::Idle {
                break;
            }
        }
        seen
    })
}

// =============================================================================
// SCENARIOS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn small_delete_runs_to_completion() {
    let h = harness(items(0..5), Vec::new());
    let scope = Scope::from("normal");
    let order = ids(0..5);
    h.orchestrator.select_all(&scope, &order[..3]);

    let recorder = record(&h, &scope);
    let started = tokio::time::Instant::now();
    let (prompt, outcome) = run_confirmed(&h, &scope, Operation::Delete, &order).await;
    let report = completed(outcome);

    assert_eq!(prompt.message, "Delete 3 memos?");
    assert!(!prompt.capped);
    assert_eq!(report.processed, ids(0..3));
    assert!(report.deferred.is_empty());
    assert_eq!(report.tally, Tally { succeeded: 3, not_found: 0, failed: 0 });

    let mut calls = h.backend.calls();
    calls.sort();
    assert_eq!(calls, vec!["0", "1", "2"]);

    assert_eq!(h.cache.count(&h.keys.active()), 2);
    assert_eq!(h.cache.count(&h.keys.deleted()), 3);
    assert!(h.orchestrator.selection(&scope).is_empty());
    assert_eq!(h.orchestrator.state(&scope), AnimationState::default());

    // Three fades plus the lid grace period.
    assert!(started.elapsed() >= Duration::from_millis(3 * 80 + 500));

    let states = recorder.await.unwrap();
    assert!(states.iter().any(|s| s.phase == Phase::Running && s.lid_open));
    assert!(states.iter().any(|s| s.phase == Phase::Settling && s.display_count == 0));
}

#[tokio::test(start_paused = true)]
async fn capped_delete_takes_topmost_hundred_and_keeps_the_rest() {
    let h = harness(items(0..150), Vec::new());
    let scope = Scope::from("normal");
    // Newest first on screen.
    let order: Vec<ItemId> = ids(0..150).into_iter().rev().collect();
    h.orchestrator.select_all(&scope, &order);

    let recorder = record(&h, &scope);
    let (prompt, outcome) = run_confirmed(&h, &scope, Operation::Delete, &order).await;
    let report = completed(outcome);

    assert!(prompt.capped);
    assert_eq!(
        prompt.message,
        "150 selected / cap 100: delete the first 100 memos now? The remaining 50 stay selected."
    );
    assert_eq!(report.processed, order[..100].to_vec());
    assert_eq!(h.backend.calls().len(), 100);

    let remaining: HashSet<ItemId> = order[100..].iter().cloned().collect();
    assert_eq!(h.orchestrator.selection(&scope), remaining);
    assert_eq!(h.cache.count(&h.keys.active()), 50);

    let states = recorder.await.unwrap();
    let running: Vec<u32> = states
        .iter()
        .filter(|s| matches!(s.phase, Phase::Running | Phase::Settling))
        .map(|s| s.display_count)
        .collect();
    assert_eq!(running.first(), Some(&100));
    assert_eq!(running.last(), Some(&50));
    assert!(running.windows(2).all(|w| w[1] <= w[0]), "countdown never climbs: {running:?}");
}

#[tokio::test(start_paused = true)]
async fn restore_with_missing_item_completes_without_error() {
    let h = harness(Vec::new(), items(0..3));
    h.backend.mark_not_found("orig-1");
    let scope = Scope::from("deleted");
    let order = ids(0..3);
    h.orchestrator.select_all(&scope, &order);

    let (prompt, outcome) = run_confirmed(&h, &scope, Operation::Restore, &order).await;
    let report = completed(outcome);

    assert_eq!(prompt.message, "Restore 3 memos?");
    assert_eq!(report.tally, Tally { succeeded: 2, not_found: 1, failed: 0 });
    assert_eq!(report.results[1].outcome, DispatchOutcome::NotFound);

    let mut calls = h.backend.calls();
    calls.sort();
    assert_eq!(calls, vec!["orig-0", "orig-1", "orig-2"]);

    assert!(h.cache.items(&h.keys.deleted()).is_empty());
    assert!(h.cache.is_stale(&h.keys.active()));
    assert!(h.orchestrator.selection(&scope).is_empty());
}

#[tokio::test(start_paused = true)]
async fn delete_with_one_item_already_gone_clears_all_five() {
    let h = harness(items(0..5), Vec::new());
    h.backend.mark_not_found("3");
    let scope = Scope::from("normal");
    let order = ids(0..5);
    h.orchestrator.select_all(&scope, &order);

    let recorder = record(&h, &scope);
    let (_, outcome) = run_confirmed(&h, &scope, Operation::Delete, &order).await;
    let report = completed(outcome);

    assert_eq!(report.processed, order);
    assert_eq!(report.tally, Tally { succeeded: 4, not_found: 1, failed: 0 });
    assert!(h.cache.items(&h.keys.active()).is_empty());
    assert_eq!(h.cache.count(&h.keys.deleted()), 4);
    assert!(h.orchestrator.selection(&scope).is_empty());

    let states = recorder.await.unwrap();
    assert!(states.iter().any(|s| s.phase == Phase::Settling && s.display_count == 0));
}

#[tokio::test(start_paused = true)]
async fn capped_delete_drops_selected_ids_missing_from_the_collection() {
    let h = harness(items(0..150), Vec::new());
    let scope = Scope::from("normal");
    // Id 150 is still checked on screen but no longer in the cached collection.
    let order = ids(0..151);
    h.orchestrator.select_all(&scope, &order);

    let (prompt, outcome) = run_confirmed(&h, &scope, Operation::Delete, &order).await;
    let report = completed(outcome);

    assert_eq!(prompt.total_requested, 150);
    assert_eq!(report.deferred.len(), 50);
    let deferred: HashSet<ItemId> = report.deferred.iter().cloned().collect();
    assert_eq!(h.orchestrator.selection(&scope), deferred);
    assert!(!h.backend.calls().contains(&"150".to_owned()));
}

#[tokio::test(start_paused = true)]
async fn lid_closes_after_grace_while_calls_are_still_pending() {
    let h = harness_with(MockBackend::with_delay(Duration::from_secs(5)), Some("secret"), items(0..3), Vec::new());
    let scope = Scope::from("normal");
    let order = ids(0..3);
    h.orchestrator.select_all(&scope, &order);

    let mut events = h.orchestrator.subscribe();
    let task = begin(&h, &scope, Operation::Delete, &order);
    next_prompt(&mut events).await;
    let confirmed_at = tokio::time::Instant::now();
    assert!(h.orchestrator.confirm(&scope));

    let mut state = h.orchestrator.watch(&scope);
    state.wait_for(|s| s.phase == Phase::Running && s.lid_open).await.unwrap();
    state.wait_for(|s| !s.lid_open).await.unwrap();

    // Three fades plus the grace period, long before the 5 s calls settle.
    let closed_after = confirmed_at.elapsed();
    assert!(closed_after >= Duration::from_millis(3 * 80 + 500));
    assert!(closed_after < Duration::from_secs(5));
    assert_eq!(h.orchestrator.state(&scope).phase, Phase::Settling);
    assert_eq!(h.orchestrator.selection(&scope).len(), 3, "reconcile waits for dispatch");

    let report = completed(task.await.unwrap().unwrap());
    assert!(confirmed_at.elapsed() >= Duration::from_secs(5));
    assert_eq!(report.tally.succeeded, 3);
    assert!(h.orchestrator.selection(&scope).is_empty());
    assert_eq!(h.orchestrator.state(&scope), AnimationState::default());
}

// =============================================================================
// GUARDS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn second_trigger_while_busy_is_ignored() {
    let h = harness_with(MockBackend::with_delay(Duration::from_secs(2)), Some("secret"), items(0..4), Vec::new());
    let scope = Scope::from("normal");
    let order = ids(0..4);
    h.orchestrator.select_all(&scope, &order);

    let mut events = h.orchestrator.subscribe();
    let task = begin(&h, &scope, Operation::Delete, &order);
    next_prompt(&mut events).await;

    let again = h.orchestrator.begin_bulk_operation(&scope, Operation::Delete, &order).await.unwrap();
    assert_eq!(again, BulkOutcome::Rejected(RejectReason::Busy(Phase::Confirming)));

    assert!(h.orchestrator.confirm(&scope));
    let mut state = h.orchestrator.watch(&scope);
    state.wait_for(|s| s.phase == Phase::Running).await.unwrap();

    let again = h.orchestrator.begin_bulk_operation(&scope, Operation::Delete, &order).await.unwrap();
    assert_eq!(again, BulkOutcome::Rejected(RejectReason::Busy(Phase::Running)));

    completed(task.await.unwrap().unwrap());
    assert_eq!(h.backend.calls().len(), 4, "no second dispatch");
}

#[tokio::test(start_paused = true)]
async fn cancel_leaves_everything_untouched() {
    let h = harness(items(0..3), Vec::new());
    let scope = Scope::from("normal");
    let order = ids(0..3);
    h.orchestrator.select_all(&scope, &order);

    let mut events = h.orchestrator.subscribe();
    let task = begin(&h, &scope, Operation::Delete, &order);
    next_prompt(&mut events).await;
    assert_eq!(h.orchestrator.state(&scope).phase, Phase::Confirming);

    assert!(h.orchestrator.cancel_confirmation(&scope));
    assert_eq!(task.await.unwrap().unwrap(), BulkOutcome::Cancelled);

    assert!(h.backend.calls().is_empty());
    assert_eq!(h.orchestrator.selection(&scope).len(), 3);
    assert_eq!(h.cache.count(&h.keys.active()), 3);
    assert_eq!(h.orchestrator.state(&scope), AnimationState::default());
    assert!(!h.orchestrator.cancel_confirmation(&scope), "nothing left to cancel");
}

#[tokio::test(start_paused = true)]
async fn dropped_caller_during_confirmation_returns_scope_to_idle() {
    let h = harness(items(0..2), Vec::new());
    let scope = Scope::from("normal");
    let order = ids(0..2);
    h.orchestrator.select_all(&scope, &order);

    let mut events = h.orchestrator.subscribe();
    let task = begin(&h, &scope, Operation::Delete, &order);
    next_prompt(&mut events).await;

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    assert_eq!(h.orchestrator.state(&scope).phase, Phase::Idle);
    assert!(!h.orchestrator.confirm(&scope));
}

#[tokio::test]
async fn empty_selection_is_a_no_op() {
    let h = harness(items(0..3), Vec::new());
    let scope = Scope::from("normal");

    let outcome = h.orchestrator.begin_bulk_operation(&scope, Operation::Delete, &ids(0..3)).await.unwrap();

    assert_eq!(outcome, BulkOutcome::Rejected(RejectReason::EmptySelection));
    assert_eq!(h.orchestrator.state(&scope).phase, Phase::Idle);
}

#[tokio::test]
async fn missing_token_stops_before_any_phase_change() {
    let h = harness_with(MockBackend::new(), None, items(0..3), Vec::new());
    let scope = Scope::from("normal");
    h.orchestrator.select_all(&scope, &ids(0..3));

    let err = h.orchestrator.begin_bulk_operation(&scope, Operation::Delete, &ids(0..3)).await.unwrap_err();

    assert!(matches!(err, BulkError::MissingToken));
    assert_eq!(h.orchestrator.state(&scope).phase, Phase::Idle);
    assert_eq!(h.orchestrator.selection(&scope).len(), 3);
}

#[tokio::test(start_paused = true)]
async fn ids_missing_from_the_collection_are_not_dispatched() {
    let h = harness(items(0..2), Vec::new());
    let scope = Scope::from("normal");
    let order = ids(0..3);
    h.orchestrator.select_all(&scope, &order);

    let (prompt, outcome) = run_confirmed(&h, &scope, Operation::Delete, &order).await;
    let report = completed(outcome);

    assert_eq!(prompt.count, 2);
    assert_eq!(report.processed, ids(0..2));
    assert!(!h.backend.calls().contains(&"2".to_owned()));
}

// =============================================================================
// SELECTION SYNC AND REFRESH
// =============================================================================

#[test]
fn sync_collection_prunes_only_in_check_mode() {
    let h = harness(items(0..3), Vec::new());
    let scope = Scope::from("normal");
    let current: HashSet<ItemId> = ids(0..1).into_iter().collect();

    h.orchestrator.select_all(&scope, &ids(0..3));
    assert_eq!(h.orchestrator.sync_collection(&scope, &current), 0);

    h.orchestrator.set_selection_mode(SelectionMode::Check);
    h.orchestrator.select_all(&scope, &ids(0..3));
    assert_eq!(h.orchestrator.sync_collection(&scope, &current), 2);
    assert_eq!(h.orchestrator.selection(&scope), current);
}

#[tokio::test(start_paused = true)]
async fn sync_collection_waits_while_a_batch_is_pending() {
    let h = harness(items(0..3), Vec::new());
    let scope = Scope::from("normal");
    h.orchestrator.set_selection_mode(SelectionMode::Check);
    h.orchestrator.select_all(&scope, &ids(0..3));

    let mut events = h.orchestrator.subscribe();
    let task = begin(&h, &scope, Operation::Delete, &ids(0..3));
    next_prompt(&mut events).await;

    assert_eq!(h.orchestrator.sync_collection(&scope, &HashSet::new()), 0);
    assert_eq!(h.orchestrator.selection(&scope).len(), 3);

    h.orchestrator.cancel_confirmation(&scope);
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn refresh_loads_the_collection_into_the_cache() {
    let h = harness(Vec::new(), Vec::new());
    h.backend.seed(Collection::Deleted, items(0..4));

    assert_eq!(h.orchestrator.refresh(Collection::Deleted).await.unwrap(), 4);
    assert_eq!(h.cache.count(&h.keys.deleted()), 4);
    assert!(!h.cache.is_stale(&h.keys.deleted()));
}
