//! Error types for dashsync-sync.

use thiserror::Error;

use dashsync_core::{DocumentError, StoreError};

/// All errors that abort a push or pull phase.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A path filter that does not compile as a regular expression.
    #[error("invalid filter pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Live-store or VCS failure.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A versioned file that is not a dashboard model.
    #[error("malformed dashboard at {path}: {source}")]
    MalformedDocument {
        path: String,
        #[source]
        source: DocumentError,
    },

    /// The job could not be turned into a session (bad config, client setup).
    #[error("cannot start job '{job}': {reason}")]
    Connect { job: String, reason: String },
}

/// Convenience constructor for [`SyncError::MalformedDocument`].
pub(crate) fn malformed(path: impl Into<String>, source: DocumentError) -> SyncError {
    SyncError::MalformedDocument {
        path: path.into(),
        source,
    }
}
