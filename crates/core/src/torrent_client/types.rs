//! Types for torrent client operations.

use async_trait::async_trait;
use thiserror::Error;

use crate::sync::{BatchAction, Rid, Snapshot, SnapshotError};

/// Errors that can occur during torrent client operations.
#[derive(Debug, Error)]
pub enum TorrentClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(#[from] SnapshotError),

    #[error("Request timeout")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TorrentClientError {
    /// Whether the daemon could not be reached at all.
    ///
    /// Only these count toward degraded connectivity; a daemon that answers
    /// with garbage or an error status is reachable.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TorrentClientError::ConnectionFailed(_) | TorrentClientError::Timeout
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TorrentClientError::ConnectionFailed(_) => "connection_failed",
            TorrentClientError::AuthenticationFailed(_) => "authentication_failed",
            TorrentClientError::ApiError(_) => "api_error",
            TorrentClientError::MalformedSnapshot(_) => "malformed_snapshot",
            TorrentClientError::Timeout => "timeout",
            TorrentClientError::Internal(_) => "internal",
        }
    }
}

/// Trait for torrent client backends.
#[async_trait]
pub trait TorrentClient: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Fetch the changes since `cursor`, or a full snapshot when `cursor` is
    /// `None`. The returned snapshot has already been validated.
    async fn fetch_snapshot(&self, cursor: Option<Rid>) -> Result<Snapshot, TorrentClientError>;

    /// Apply `action` to every hash in one remote call.
    async fn apply_action(
        &self,
        action: &BatchAction,
        hashes: &[String],
    ) -> Result<(), TorrentClientError>;

    /// Whether `action` can be sent for many hashes in one call. When false
    /// the executor issues one concurrent call per hash instead.
    fn supports_batch(&self, _action: &BatchAction) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors() {
        assert!(TorrentClientError::Timeout.is_transport());
        assert!(TorrentClientError::ConnectionFailed("refused".to_string()).is_transport());
        assert!(!TorrentClientError::ApiError("HTTP 500".to_string()).is_transport());
        assert!(!TorrentClientError::AuthenticationFailed("bad".to_string()).is_transport());

        let malformed: TorrentClientError = SnapshotError::EmptyHash.into();
        assert!(!malformed.is_transport());
        assert_eq!(malformed.kind(), "malformed_snapshot");
    }

    #[test]
    fn test_error_display() {
        let err = TorrentClientError::ApiError("HTTP 409".to_string());
        assert_eq!(err.to_string(), "API error: HTTP 409");
        assert_eq!(TorrentClientError::Timeout.to_string(), "Request timeout");
    }
}
