//! Sync error handling
//!
//! Transport failures are kept apart from application-level rejections so
//! callers can tell "retry next tick" from "the server said no".

use thiserror::Error;

use crate::models::{FileId, WorkspaceId};

/// Errors raised by a [`Transport`](super::Transport)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, reset, DNS failure and the like
    #[error("Network error calling {endpoint}: {message}")]
    Network {
        endpoint: &'static str,
        message: String,
    },

    /// No response within the configured timeout
    #[error("Request to {endpoint} timed out")]
    Timeout { endpoint: &'static str },

    /// Non-success HTTP status
    #[error("Server returned HTTP {status} for {endpoint}")]
    Status { endpoint: &'static str, status: u16 },

    /// Request body could not be serialized
    #[error("Failed to encode request for {endpoint}: {message}")]
    Encode {
        endpoint: &'static str,
        message: String,
    },

    /// Response body did not match the expected shape
    #[error("Failed to decode response from {endpoint}: {message}")]
    Decode {
        endpoint: &'static str,
        message: String,
    },
}

impl TransportError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            TransportError::Network { .. } | TransportError::Timeout { .. } => true,
            TransportError::Status { status, .. } => *status >= 500 || *status == 429,
            TransportError::Encode { .. } | TransportError::Decode { .. } => false,
        }
    }
}

/// Errors raised by sync rounds and entity operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// The request never got a usable response
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server answered with `success: false`
    #[error("Server rejected {endpoint}: {message}")]
    Rejected {
        endpoint: &'static str,
        message: String,
    },

    /// Operation needs a logged-in user
    #[error("No user is logged in")]
    NoSession,

    #[error("Workspace {0} not found")]
    WorkspaceNotFound(WorkspaceId),

    #[error("File {0} not found")]
    FileNotFound(FileId),

    /// The parent workspace has not been created on the server yet
    #[error("Workspace {0} has not been created on the server yet")]
    WorkspaceNotCreated(WorkspaceId),

    #[error("File {0} has not been created on the server yet")]
    FileNotCreated(FileId),

    /// Beacon payload could not be serialized
    #[error("Failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}

impl SyncError {
    /// Whether the next scheduled round may succeed without intervention
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport(e) => e.is_transient(),
            SyncError::Rejected { .. } => true,
            _ => false,
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
