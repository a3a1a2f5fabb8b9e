//! Error taxonomy for bulk operations.
//!
//! DESIGN
//! ======
//! Per-item failures never surface as `Err`: they are folded into
//! `DispatchOutcome` values by the dispatch engine. Only failures that stop
//! a bulk action from starting at all are modeled here, so a caller can
//! render them as a banner.

/// Grepable error code and retryable flag for structured error reporting.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BulkError {
    /// No session token is available, so no backend call can be issued.
    #[error("not signed in: no session token available")]
    MissingToken,
    /// The source collection could not be loaded for the host context.
    #[error("failed to load collection: {0}")]
    Collection(#[from] crate::backend::BackendError),
    /// The runtime shut down before a confirmed batch finished.
    #[error("bulk batch aborted: {0}")]
    Aborted(String),
}

impl ErrorCode for BulkError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::MissingToken => "E_MISSING_TOKEN",
            Self::Collection(_) => "E_COLLECTION",
            Self::Aborted(_) => "E_ABORTED",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::MissingToken | Self::Aborted(_) => false,
            Self::Collection(e) => e.retryable(),
        }
    }
}
