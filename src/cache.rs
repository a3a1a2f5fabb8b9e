//! Client-side query cache — the collaborator the reconciler writes into.
//!
//! DESIGN
//! ======
//! Keys mirror the query keys the list screens read: one per collection per
//! host context and item kind, plus the board item listing. Each entry
//! carries its items, a logical count (which may run ahead of the items
//! when the reconciler bumps it without reconstructing data) and a stale
//! flag that tells the view to refetch lazily.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crate::item::{Collection, HostContext, Item, ItemId, ItemKind};

// =============================================================================
// KEYS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The active or deleted collection of one context.
    Items { context: HostContext, kind: ItemKind, collection: Collection },
    /// Items attached to a board. Membership is a derived join.
    BoardItems { board_id: i64, kind: ItemKind },
}

impl CacheKey {
    #[must_use]
    pub fn items(context: &HostContext, kind: ItemKind, collection: Collection) -> Self {
        // Board views share the owner's collections; only the board listing is board-specific.
        let context = match context {
            HostContext::Board { team: Some(team), .. } => HostContext::Team { team: team.clone() },
            HostContext::Board { team: None, .. } => HostContext::Personal,
            other => other.clone(),
        };
        Self::Items { context, kind, collection }
    }
}

/// The cache keys one host context's screens read, derived in one place so
/// personal, team and board screens cannot drift apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKeys {
    pub context: HostContext,
    pub kind: ItemKind,
}

impl ContextKeys {
    #[must_use]
    pub fn new(context: HostContext, kind: ItemKind) -> Self {
        Self { context, kind }
    }

    /// Listing the active items are shown from: the board listing on a board screen.
    #[must_use]
    pub fn active(&self) -> CacheKey {
        self.board().unwrap_or_else(|| self.owner_active())
    }

    /// The owner's full active collection, regardless of board.
    #[must_use]
    pub fn owner_active(&self) -> CacheKey {
        CacheKey::items(&self.context, self.kind, Collection::Active)
    }

    #[must_use]
    pub fn deleted(&self) -> CacheKey {
        CacheKey::items(&self.context, self.kind, Collection::Deleted)
    }

    #[must_use]
    pub fn board(&self) -> Option<CacheKey> {
        self.context
            .board_id()
            .map(|board_id| CacheKey::BoardItems { board_id, kind: self.kind })
    }

    #[must_use]
    pub fn collection(&self, collection: Collection) -> CacheKey {
        match collection {
            Collection::Active => self.active(),
            Collection::Deleted => self.deleted(),
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Minimal cache surface needed by bulk operations.
pub trait ItemCache: Send + Sync {
    /// Current cached items for `key` (empty if never loaded).
    fn items(&self, key: &CacheKey) -> Vec<Item>;

    /// Replace the entry with fresh server data and clear its stale flag.
    fn put(&self, key: &CacheKey, items: Vec<Item>);

    /// Remove items by local id. Returns how many were present.
    fn remove(&self, key: &CacheKey, ids: &HashSet<ItemId>) -> usize;

    /// Shift the logical count without touching the cached items.
    fn adjust_count(&self, key: &CacheKey, delta: isize);

    /// Mark `key` for refetch on next read.
    fn invalidate(&self, key: &CacheKey);
}

// =============================================================================
// IN-MEMORY IMPLEMENTATION
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheEntry {
    pub items: Vec<Item>,
    pub count: usize,
    pub stale: bool,
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.lock().get(key).cloned()
    }

    #[must_use]
    pub fn count(&self, key: &CacheKey) -> usize {
        self.lock().get(key).map_or(0, |e| e.count)
    }

    #[must_use]
    pub fn is_stale(&self, key: &CacheKey) -> bool {
        self.lock().get(key).is_some_and(|e| e.stale)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<CacheKey, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ItemCache for MemoryCache {
    fn items(&self, key: &CacheKey) -> Vec<Item> {
        self.lock().get(key).map(|e| e.items.clone()).unwrap_or_default()
    }

    fn put(&self, key: &CacheKey, items: Vec<Item>) {
        let count = items.len();
        self.lock().insert(key.clone(), CacheEntry { items, count, stale: false });
    }

    fn remove(&self, key: &CacheKey, ids: &HashSet<ItemId>) -> usize {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(key) else {
            return 0;
        };
        let before = entry.items.len();
        entry.items.retain(|item| !ids.contains(&item.id));
        let removed = before - entry.items.len();
        entry.count = entry.count.saturating_sub(removed);
        removed
    }

    fn adjust_count(&self, key: &CacheKey, delta: isize) {
        let mut entries = self.lock();
        let entry = entries.entry(key.clone()).or_default();
        entry.count = entry.count.saturating_add_signed(delta);
    }

    fn invalidate(&self, key: &CacheKey) {
        self.lock().entry(key.clone()).or_default().stale = true;
    }
}

#[cfg(test)]
#[path = "cache_test.rs"]
mod tests;
