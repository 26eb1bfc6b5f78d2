//! Error types for the directory watcher.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watcher operations.
///
/// Only startup problems surface as errors. Shutdown (close, directory
/// removed, channel disconnected) ends `observe` with `Ok(())`.
#[derive(Error, Debug)]
pub enum NotifierError {
    #[error("Cannot observe {path}: not a directory")]
    NotADirectory { path: PathBuf },

    #[error("Cannot observe {path}: {source}")]
    InvalidDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to subscribe to changes in {path}: {reason}")]
    SubscriptionFailed { path: PathBuf, reason: String },

    #[error("Watcher is already observing a directory")]
    AlreadyObserving,
}

impl From<notify::Error> for NotifierError {
    fn from(e: notify::Error) -> Self {
        NotifierError::SubscriptionFailed {
            path: e.paths.first().cloned().unwrap_or_default(),
            reason: e.to_string(),
        }
    }
}
