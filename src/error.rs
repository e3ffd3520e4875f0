//! Error types for the intelligence sync layer
//!
//! Errors are classified by where they stop:
//! - GatewayError: raised by the remote store, recovered at the collection boundary
//! - MutationError: returned to the caller of an action, after rollback
//! - ConfigError: configuration loading, reported once at startup

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::Collection;

/// Errors raised by an `IntelligenceGateway`
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    // Retryable errors
    #[error("Network error: {0}")]
    Network(String),

    #[error("Remote store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    // Non-retryable errors
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Operation not supported by this gateway: {0}")]
    Unsupported(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Returns true if repeating the same request could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Network(_) => true,
            GatewayError::Rejected { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::Rejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            GatewayError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Decode(err.to_string())
    }
}

/// Errors returned from the action dispatcher
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MutationError {
    #[error("Intelligence session is closed")]
    SessionClosed,

    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// Errors loading `SyncConfig`
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not find home directory")]
    HomeDirNotFound,

    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid gateway url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Serializable record of the last failed fetch for one collection.
///
/// Held in the store's per-collection error map; cleared by the next
/// successful fetch of the same collection.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionError {
    pub collection: Collection,
    pub message: String,
    pub can_retry: bool,
    pub occurred_at: DateTime<Utc>,
}

impl CollectionError {
    pub fn new(collection: Collection, err: &GatewayError) -> Self {
        Self {
            collection,
            message: err.to_string(),
            can_retry: err.is_retryable(),
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(GatewayError::Network("reset".into()).is_retryable());
        assert!(GatewayError::Rejected {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(GatewayError::Rejected {
            status: 429,
            message: "slow down".into()
        }
        .is_retryable());
        assert!(!GatewayError::Rejected {
            status: 403,
            message: "rls".into()
        }
        .is_retryable());
        assert!(!GatewayError::NotFound("n-1".into()).is_retryable());
    }

    #[test]
    fn test_collection_error_carries_message() {
        let err = GatewayError::Network("connection refused".into());
        let record = CollectionError::new(Collection::Analytics, &err);
        assert_eq!(record.collection, Collection::Analytics);
        assert_eq!(record.message, "Network error: connection refused");
        assert!(record.can_retry);
    }
}
