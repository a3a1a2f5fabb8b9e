//! Feature-scoped publish/subscribe channel for bulk-operation signals.
//!
//! Replaces ad-hoc global callbacks: the orchestrator owns one bus, and the
//! rendering layer subscribes to the events it cares about (prompt requests,
//! fade targets, lid open/close, batch completion).

use tokio::sync::broadcast;

use crate::item::Scope;
use crate::planner::ConfirmPrompt;
use crate::reconcile::BatchReport;

const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug, Clone)]
pub enum BulkEvent {
    /// A plan needs the user's go-ahead. Answer with `confirm` or `cancel_confirmation`.
    ConfirmRequested { scope: Scope, prompt: ConfirmPrompt },
    LidChanged { scope: Scope, open: bool },
    /// Fade the element carrying `dom_key` out of the list.
    FadeOut { scope: Scope, index: usize, dom_key: String },
    Cancelled { scope: Scope },
    Completed { scope: Scope, report: BatchReport },
}

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BulkEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BulkEvent> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers. Having none is not an error.
    pub fn publish(&self, event: BulkEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
