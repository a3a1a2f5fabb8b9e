//! Selection store — checked item ids, one independent set per scope.
//!
//! DESIGN
//! ======
//! `toggle` always succeeds on the in-memory set; it does not check that the
//! id exists. Staleness is handled separately by `prune`, which callers run
//! when the backing collection changes outside of a bulk action. The bulk
//! action's own aftermath uses `remove`/`clear` driven by the batch plan, so
//! ids whose deletion is still in flight are never blindly dropped.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::item::{ItemId, Scope};

/// Global list interaction mode. Checkboxes only exist in `Check` mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionMode {
    #[default]
    Select,
    Check,
}

#[derive(Debug, Clone, Default)]
pub struct SelectionStore {
    mode: SelectionMode,
    scopes: HashMap<Scope, HashSet<ItemId>>,
}

impl SelectionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Switch the global mode. Leaving check mode clears every scope.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        if self.mode == SelectionMode::Check && mode == SelectionMode::Select {
            self.scopes.clear();
        }
        self.mode = mode;
    }

    /// Flip membership of `id`. Returns whether it is selected afterwards.
    pub fn toggle(&mut self, scope: &Scope, id: ItemId) -> bool {
        let set = self.scopes.entry(scope.clone()).or_default();
        if set.remove(&id) {
            false
        } else {
            set.insert(id);
            true
        }
    }

    /// Replace the scope's selection with everything currently in view.
    pub fn select_all<I>(&mut self, scope: &Scope, ids_in_view: I)
    where
        I: IntoIterator<Item = ItemId>,
    {
        self.scopes.insert(scope.clone(), ids_in_view.into_iter().collect());
    }

    /// Header checkbox: clear if everything in view is already checked, else select all.
    pub fn toggle_all(&mut self, scope: &Scope, ids_in_view: &[ItemId]) {
        let all_checked = !ids_in_view.is_empty()
            && self
                .scopes
                .get(scope)
                .is_some_and(|set| ids_in_view.iter().all(|id| set.contains(id)));
        if all_checked {
            self.clear(scope);
        } else {
            self.select_all(scope, ids_in_view.iter().cloned());
        }
    }

    pub fn clear(&mut self, scope: &Scope) {
        self.scopes.remove(scope);
    }

    /// Remove exactly `ids` from the scope, leaving any other selection intact.
    pub fn remove<'a, I>(&mut self, scope: &Scope, ids: I)
    where
        I: IntoIterator<Item = &'a ItemId>,
    {
        let Some(set) = self.scopes.get_mut(scope) else {
            return;
        };
        for id in ids {
            set.remove(id);
        }
        if set.is_empty() {
            self.scopes.remove(scope);
        }
    }

    /// Drop selected ids that no longer exist in the scope's collection.
    /// Returns the number of ids removed.
    pub fn prune(&mut self, scope: &Scope, current_ids: &HashSet<ItemId>) -> usize {
        let Some(set) = self.scopes.get_mut(scope) else {
            return 0;
        };
        let before = set.len();
        set.retain(|id| current_ids.contains(id));
        let removed = before - set.len();
        if set.is_empty() {
            self.scopes.remove(scope);
        }
        removed
    }

    #[must_use]
    pub fn is_selected(&self, scope: &Scope, id: &ItemId) -> bool {
        self.scopes.get(scope).is_some_and(|set| set.contains(id))
    }

    #[must_use]
    pub fn count(&self, scope: &Scope) -> usize {
        self.scopes.get(scope).map_or(0, HashSet::len)
    }

    /// Snapshot of the scope's selection for rendering.
    #[must_use]
    pub fn selected(&self, scope: &Scope) -> HashSet<ItemId> {
        self.scopes.get(scope).cloned().unwrap_or_default()
    }

    /// Selected ids of `scope` in the caller's display order. Ids that are
    /// selected but not on screen are not included.
    #[must_use]
    pub fn in_display_order(&self, scope: &Scope, display_order: &[ItemId]) -> Vec<ItemId> {
        let Some(set) = self.scopes.get(scope) else {
            return Vec::new();
        };
        let mut seen = HashSet::with_capacity(set.len());
        display_order
            .iter()
            .filter(|id| set.contains(*id) && seen.insert(*id))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
#[path = "selection_test.rs"]
mod tests;
