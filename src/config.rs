//! Bulk-operation tuning knobs and API settings, parsed from environment variables.

use std::time::Duration;

use crate::error::ErrorCode;

pub const DEFAULT_BATCH_LIMIT: usize = 100;
pub const DEFAULT_STEP_MS: u64 = 80;
pub const DEFAULT_DISPLAY_CAP: u32 = 99;
pub const DEFAULT_LID_GRACE_MS: u64 = 500;
pub const DEFAULT_DISPATCH_CONCURRENCY: usize = 8;
pub const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_DELETE_CONFIRM_THRESHOLD: usize = 1;
pub const RESTORE_CONFIRM_THRESHOLD: usize = 1;
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

impl ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Zero { .. } => "E_CONFIG_ZERO",
            Self::InvalidBaseUrl(_) => "E_CONFIG_BASE_URL",
        }
    }
}

// =============================================================================
// BULK CONFIG
// =============================================================================

/// Timing and batching parameters shared by planner, choreographer and dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkConfig {
    /// Hard cap on items processed per batch.
    pub batch_limit: usize,
    /// Per-item fade stagger and countdown tick interval.
    pub step: Duration,
    /// Largest count shown literally on the badge; above it the badge reads "99+".
    pub display_cap: u32,
    /// How long the trash lid stays open after the last fade.
    pub lid_grace: Duration,
    /// Maximum in-flight backend calls. `0` fans out every call at once.
    pub dispatch_concurrency: usize,
    /// Per-call timeout. A call that exceeds it counts as an error.
    pub call_timeout: Duration,
    /// Minimum batch size that asks for confirmation before deleting.
    pub delete_confirm_threshold: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            batch_limit: DEFAULT_BATCH_LIMIT,
            step: Duration::from_millis(DEFAULT_STEP_MS),
            display_cap: DEFAULT_DISPLAY_CAP,
            lid_grace: Duration::from_millis(DEFAULT_LID_GRACE_MS),
            dispatch_concurrency: DEFAULT_DISPATCH_CONCURRENCY,
            call_timeout: Duration::from_millis(DEFAULT_CALL_TIMEOUT_MS),
            delete_confirm_threshold: DEFAULT_DELETE_CONFIRM_THRESHOLD,
        }
    }
}

impl BulkConfig {
    /// Build config from environment variables, falling back to defaults.
    ///
    /// - `NOTEBOARD_BATCH_LIMIT`: default 100
    /// - `NOTEBOARD_STEP_MS`: default 80
    /// - `NOTEBOARD_DISPLAY_CAP`: default 99
    /// - `NOTEBOARD_LID_GRACE_MS`: default 500
    /// - `NOTEBOARD_DISPATCH_CONCURRENCY`: default 8
    /// - `NOTEBOARD_CALL_TIMEOUT_MS`: default 10000
    /// - `NOTEBOARD_DELETE_CONFIRM_THRESHOLD`: default 1
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Zero` if the batch limit or call timeout is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            batch_limit: env_parse("NOTEBOARD_BATCH_LIMIT", DEFAULT_BATCH_LIMIT),
            step: Duration::from_millis(env_parse("NOTEBOARD_STEP_MS", DEFAULT_STEP_MS)),
            display_cap: env_parse("NOTEBOARD_DISPLAY_CAP", DEFAULT_DISPLAY_CAP),
            lid_grace: Duration::from_millis(env_parse("NOTEBOARD_LID_GRACE_MS", DEFAULT_LID_GRACE_MS)),
            dispatch_concurrency: env_parse("NOTEBOARD_DISPATCH_CONCURRENCY", DEFAULT_DISPATCH_CONCURRENCY),
            call_timeout: Duration::from_millis(env_parse("NOTEBOARD_CALL_TIMEOUT_MS", DEFAULT_CALL_TIMEOUT_MS)),
            delete_confirm_threshold: env_parse(
                "NOTEBOARD_DELETE_CONFIRM_THRESHOLD",
                DEFAULT_DELETE_CONFIRM_THRESHOLD,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::Zero` if the batch limit or call timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_limit == 0 {
            return Err(ConfigError::Zero { var: "NOTEBOARD_BATCH_LIMIT" });
        }
        if self.call_timeout.is_zero() {
            return Err(ConfigError::Zero { var: "NOTEBOARD_CALL_TIMEOUT_MS" });
        }
        Ok(())
    }

    /// Sentinel badge value meaning "more than `display_cap`".
    #[must_use]
    pub fn display_sentinel(&self) -> u32 {
        self.display_cap.saturating_add(1)
    }
}

// =============================================================================
// API CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub base_url: String,
    pub session_token: Option<String>,
}

impl ApiConfig {
    /// - `NOTEBOARD_BASE_URL`: default `http://127.0.0.1:3000`
    /// - `NOTEBOARD_SESSION_TOKEN`: optional
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL is not http(s).
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("NOTEBOARD_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_owned());
        let session_token = std::env::var("NOTEBOARD_SESSION_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());
        Self::new(base_url, session_token)
    }

    /// # Errors
    ///
    /// Returns `ConfigError::InvalidBaseUrl` if the URL is not http(s).
    pub fn new(base_url: impl Into<String>, session_token: Option<String>) -> Result<Self, ConfigError> {
        let base_url = base_url.into();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidBaseUrl(base_url));
        }
        Ok(Self { base_url: base_url.trim_end_matches('/').to_owned(), session_token })
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
