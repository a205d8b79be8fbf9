//! Error types for rdsbackup.

use std::time::Duration;

use thiserror::Error;

/// A specialized `Result` type for rdsbackup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by a backup run.
///
/// Every variant is fatal for the run. Conditions that are only worth a
/// warning (a tag lookup failing mid-scan, a deletion reporting an odd status)
/// never become an `Error`.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid arguments, credentials or config file.
    #[error("configuration error: {0}")]
    Config(String),

    /// The identity descriptor could not be turned into an account id.
    #[error("could not resolve AWS account id: {0}")]
    AccountResolution(String),

    /// No usable source snapshot exists.
    #[error("{0}")]
    NotFound(String),

    /// The provider did not accept the copy request.
    #[error("error creating snapshot {snapshot_id} - unexpected status: {status}")]
    CopyInitiation { snapshot_id: String, status: String },

    /// Polling the copy returned zero or several snapshots.
    #[error("new snapshot {snapshot_id} missing: describe returned {count} snapshots")]
    SnapshotVanished { snapshot_id: String, count: usize },

    /// The copy was still in progress when the configured maximum wait ran out.
    #[error("gave up waiting for snapshot {snapshot_id} after {waited:?}")]
    CopyTimeout { snapshot_id: String, waited: Duration },

    /// Purging an old snapshot failed. Remaining purges are skipped.
    #[error("failed to delete snapshot {snapshot_id}: {message}")]
    Deletion { snapshot_id: String, message: String },

    /// Any other failed call to the provider API.
    #[error("{operation} failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn provider(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Provider {
            operation,
            message: message.into(),
        }
    }

    /// Whether the error was raised before any remote call was made.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
