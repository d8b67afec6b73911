use thiserror::Error;

use crate::remote::RemoteError;

/// Everything the table core can surface to a view.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableError {
    /// Backend unreachable, timed out or answered with a failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Uniqueness violation on insert or update.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The target row no longer exists.
    #[error("not found: {0}")]
    NotFound(String),
    /// Local pre-submit check failed; never reaches the network.
    #[error("{0}")]
    Validation(String),
    /// Another operation holds the controller or dialog.
    #[error("busy: {0}")]
    Busy(&'static str),
}

impl From<RemoteError> for TableError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Transport(message) => TableError::Transport(message),
            RemoteError::Conflict(message) => TableError::Conflict(message),
            RemoteError::NotFound(id) => TableError::NotFound(format!("row {id}")),
        }
    }
}
