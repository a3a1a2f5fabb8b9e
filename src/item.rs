//! Item identity and the vocabulary shared by every bulk-operation component.
//!
//! SYSTEM CONTEXT
//! ==============
//! Items (memos and tasks) live in an `Active` and a `Deleted` collection per
//! host context. A row's local `ItemId` is only valid inside the collection
//! it was read from; `original_id` survives moves between collections and is
//! what restore calls and fade targeting key on.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Local item identifier. Numeric row ids and string ids both occur depending
/// on the collection the item was read from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Num(i64),
    Str(String),
}

impl ItemId {
    /// Parse a CLI/user supplied id. Only canonical integers (no leading
    /// zeros or `+`) are numeric, so string ids like `"007"` survive intact.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => Self::Num(n),
            _ => Self::Str(raw.to_owned()),
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        Self::Num(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        Self::Str(value.to_owned())
    }
}

/// A named selection context: a tab ("normal", "deleted") or a task status column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scope(String);

impl Scope {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Scope {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// KINDS AND OPERATIONS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Memo,
    Task,
}

impl ItemKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memo => "memo",
            Self::Task => "task",
        }
    }

    /// REST path segment and user-facing plural.
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Memo => "memos",
            Self::Task => "tasks",
        }
    }

    #[must_use]
    pub fn noun(self, count: usize) -> &'static str {
        if count == 1 { self.as_str() } else { self.plural() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Delete,
    Restore,
}

impl Operation {
    #[must_use]
    pub fn verb(self) -> &'static str {
        match self {
            Self::Delete => "delete",
            Self::Restore => "restore",
        }
    }

    /// Collection the targets are read from.
    #[must_use]
    pub fn source(self) -> Collection {
        match self {
            Self::Delete => Collection::Active,
            Self::Restore => Collection::Deleted,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.verb())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Active,
    Deleted,
}

// =============================================================================
// HOST CONTEXT
// =============================================================================

/// Where the items live. Each context has its own endpoints and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum HostContext {
    Personal,
    Team { team: String },
    Board { board_id: i64, team: Option<String> },
}

impl HostContext {
    #[must_use]
    pub fn team(&self) -> Option<&str> {
        match self {
            Self::Personal => None,
            Self::Team { team } => Some(team),
            Self::Board { team, .. } => team.as_deref(),
        }
    }

    #[must_use]
    pub fn board_id(&self) -> Option<i64> {
        match self {
            Self::Board { board_id, .. } => Some(*board_id),
            Self::Personal | Self::Team { .. } => None,
        }
    }
}

impl fmt::Display for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Personal => f.write_str("personal"),
            Self::Team { team } => write!(f, "team:{team}"),
            Self::Board { board_id, team: None } => write!(f, "board:{board_id}"),
            Self::Board { board_id, team: Some(team) } => write!(f, "team:{team}/board:{board_id}"),
        }
    }
}

// =============================================================================
// ITEM
// =============================================================================

/// The slice of a memo/task the bulk subsystem needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(rename = "originalId")]
    pub original_id: String,
    #[serde(default)]
    pub title: String,
}

impl Item {
    /// Stable per-item DOM attribute used to target the fade-out.
    #[must_use]
    pub fn dom_key(&self, kind: ItemKind) -> String {
        format!("{}-{}", kind.as_str(), self.original_id)
    }
}
