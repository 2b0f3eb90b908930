//! Error types for task list operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for task list operations.
pub type Result<T> = std::result::Result<T, EvtError>;

/// Errors surfaced to the caller.
///
/// Malformed, cyclic and dangling parent references are never errors; the
/// hierarchy builder recovers from them locally.
#[derive(Debug, Error)]
pub enum EvtError {
    /// No task with this id in the current list.
    #[error("task {id} not found")]
    TaskNotFound { id: u64 },

    /// Completion refused because some direct children are not completed.
    #[error("task {id} cannot be completed: subtasks {} are not completed", join_ids(.blocking))]
    IncompleteChildren { id: u64, blocking: Vec<u64> },

    /// A requested parent assignment is not allowed.
    #[error("invalid parent for task {id}: {reason}")]
    InvalidParent { id: u64, reason: String },

    /// Bad user input.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// A data file could not be read or parsed.
    #[error("failed to read {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EvtError {
    /// Create an invalid input error
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an invalid parent error
    pub fn invalid_parent(id: u64, reason: impl Into<String>) -> Self {
        Self::InvalidParent {
            id,
            reason: reason.into(),
        }
    }

    /// Whether this error is a refused precondition rather than a failure.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::IncompleteChildren { .. } | Self::InvalidParent { .. }
        )
    }
}

fn join_ids(ids: &[u64]) -> String {
    ids.iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ")
}
