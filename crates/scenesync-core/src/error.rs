//! Error types for SceneSync

use thiserror::Error;

/// Core SceneSync errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    // Protocol errors
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Malformed {kind} message: {reason}")]
    MalformedMessage { kind: String, reason: String },

    // Transport errors
    #[error("Not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection lost")]
    ConnectionLost,

    // Reconciliation errors
    #[error("Unknown scene item: {0}")]
    UnknownItem(String),

    #[error("No placeable scene item available")]
    NoPlaceableItem,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Protocol errors are dropped without touching the connection
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            SyncError::Protocol(_) | SyncError::MalformedMessage { .. }
        )
    }
}

/// Result type for SceneSync operations
pub type SyncResult<T> = Result<T, SyncError>;
