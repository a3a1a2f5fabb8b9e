//! Persistence collaborator — the per-item REST operations bulk actions call.
//!
//! DESIGN
//! ======
//! `ItemBackend` is the adapter seam: one implementation per hosting
//! strategy (the HTTP client here, mocks in tests). The server processes
//! every item independently, so the trait only exposes single-item calls
//! plus a collection read used to hydrate the cache.

pub mod http;

use crate::error::ErrorCode;
use crate::item::{Collection, Item, ItemId};

pub use http::HttpBackend;

// =============================================================================
// ERROR
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The item no longer exists (e.g. deleted from another session).
    #[error("item not found")]
    NotFound,
    #[error("unauthorized: status {status}")]
    Unauthorized { status: u16 },
    #[error("unexpected response status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("request failed: {0}")]
    Request(String),
    #[error("response parse failed: {0}")]
    Parse(String),
    #[error("request timed out after {ms}ms")]
    Timeout { ms: u128 },
    /// The base URL or an id cannot form a route without escaping it.
    #[error("invalid request URL: {0}")]
    InvalidUrl(String),
}

impl ErrorCode for BackendError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound => "E_NOT_FOUND",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::Status { .. } => "E_STATUS",
            Self::Request(_) => "E_REQUEST",
            Self::Parse(_) => "E_PARSE",
            Self::Timeout { .. } => "E_TIMEOUT",
            Self::InvalidUrl(_) => "E_INVALID_URL",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Request(_) | Self::Timeout { .. } | Self::Status { status: 429 | 500..=599, .. })
    }
}

// =============================================================================
// TRAITS
// =============================================================================

/// Single-item persistence operations for one host context and item kind.
#[async_trait::async_trait]
pub trait ItemBackend: Send + Sync {
    /// Read the current contents of a collection.
    ///
    /// # Errors
    ///
    /// Returns a [`BackendError`] if the request fails or the body is malformed.
    async fn fetch_collection(&self, collection: Collection, token: &str) -> Result<Vec<Item>, BackendError>;

    /// Move one item from the active to the deleted collection.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the item is already gone.
    async fn delete(&self, id: &ItemId, token: &str) -> Result<(), BackendError>;

    /// Restore one deleted item by its stable external id.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::NotFound`] if the deleted item no longer exists.
    async fn restore(&self, original_id: &str, token: &str) -> Result<Item, BackendError>;
}

/// Supplies the session token for backend calls.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Option<String>;
}

/// Fixed token, typically read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(pub Option<String>);

#[async_trait::async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
