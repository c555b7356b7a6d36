//! Error types for dashsync-core.

use std::path::PathBuf;

use thiserror::Error;

/// A dashboard payload that could not be turned into a [`DashboardDocument`].
///
/// [`DashboardDocument`]: crate::types::DashboardDocument
#[derive(Debug, Error)]
pub enum DocumentError {
    /// The bytes are not valid JSON.
    #[error("invalid dashboard JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The JSON parsed, but the top level is not an object.
    #[error("dashboard model must be a JSON object, found {found}")]
    NotAnObject { found: &'static str },
}

/// Failures reported by the live-store and version-control collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Transport or API failure on the remote side.
    #[error("{service} request failed: {message}")]
    Remote {
        service: &'static str,
        message: String,
    },

    /// The requested object does not exist (e.g. a branch without commits).
    #[error("{0} not found")]
    NotFound(String),

    /// A commit was requested but the staged tree equals the current one.
    #[error("nothing staged to commit")]
    NoChanges,

    /// A working-tree path that is not a plain `folder/file` pair.
    #[error("invalid tree path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

impl StoreError {
    /// Convenience constructor for [`StoreError::Remote`].
    pub fn remote(service: &'static str, message: impl Into<String>) -> Self {
        StoreError::Remote {
            service,
            message: message.into(),
        }
    }
}

/// All errors that can arise while loading or validating job configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error on load: includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration file did not exist at the expected path.
    #[error("configuration not found at {path}")]
    NotFound { path: PathBuf },

    /// A job entry is structurally valid YAML but unusable.
    #[error("job '{job}' is invalid: {reason}")]
    Invalid { job: String, reason: String },
}
