use bluechip_core::BluechipError;
use bluechip_db::DatabaseError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while ingesting companies.
///
/// [`IngestError::is_retryable`] separates transient failures (retried under
/// the retry policy) from everything else.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("request to {provider} timed out")]
    Timeout { provider: String },

    #[error("network error ({provider}): {message}")]
    Network { provider: String, message: String },

    #[error("API error ({provider}): status {status}, {message}")]
    Api {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("failed to parse response from {provider}: {message}")]
    Parse { provider: String, message: String },

    #[error("unexpected input: {0}")]
    InputContract(String),

    #[error("invalid value: {0}")]
    Invalid(#[from] BluechipError),

    #[error("validation cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("store error: {0}")]
    Store(#[from] DatabaseError),

    #[error("operation cancelled")]
    Cancelled,
}

impl IngestError {
    /// Transient failures: rate limiting, timeouts, connection problems and
    /// server-side 5xx responses.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::Network { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Failures that only concern the item being processed. The item is
    /// skipped and the run continues; anything else aborts the run.
    ///
    /// 401 and 403 reject the credentials, not the item, so they abort.
    #[must_use]
    pub fn is_item_scoped(&self) -> bool {
        match self {
            Self::Api { status, .. } => !self.is_retryable() && !matches!(status, 401 | 403),
            Self::Parse { .. } | Self::Invalid(_) => true,
            _ => false,
        }
    }

    /// Classify a `reqwest` failure for `provider`.
    pub(crate) fn from_reqwest(provider: &str, err: &reqwest::Error) -> Self {
        let provider = provider.to_string();
        if err.is_timeout() {
            return Self::Timeout { provider };
        }
        if let Some(status) = err.status() {
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Self::RateLimited { provider };
            }
            return Self::Api {
                provider,
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        if err.is_decode() {
            return Self::Parse {
                provider,
                message: err.to_string(),
            };
        }
        Self::Network {
            provider,
            message: err.to_string(),
        }
    }
}

/// Errors from the on-disk validation cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("malformed cache file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
