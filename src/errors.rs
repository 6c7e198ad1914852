//! Typed error definitions for treesync.
//! Operations return `anyhow::Result`; these variants are raised inside it so
//! callers and logs can classify failures with `downcast_ref::<TreeSyncError>()`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeSyncError {
    #[error("Source path not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("Destination already exists and overwrite is disabled: {0}")]
    DestinationConflict(PathBuf),

    #[error("Source and destination are the same entity: {0}")]
    SameEntity(PathBuf),

    #[error("Gave up waiting for {path} after {waited:?}")]
    WaitTimeout { path: PathBuf, waited: Duration },

    #[error("Operation interrupted by user")]
    Interrupted,
}

impl TreeSyncError {
    /// Stable numeric code for structured logs and exit statuses.
    pub fn code(&self) -> u16 {
        match self {
            TreeSyncError::SourceNotFound(_) => 10,
            TreeSyncError::DestinationConflict(_) => 20,
            TreeSyncError::SameEntity(_) => 21,
            TreeSyncError::WaitTimeout { .. } => 30,
            TreeSyncError::Interrupted => 130,
        }
    }

    /// True for the conflict family (existing destination or self-move).
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            TreeSyncError::DestinationConflict(_) | TreeSyncError::SameEntity(_)
        )
    }
}

/// Classify an `anyhow::Error` produced by this crate, if it carries a typed cause.
pub fn classify(err: &anyhow::Error) -> Option<&TreeSyncError> {
    err.downcast_ref::<TreeSyncError>()
}
