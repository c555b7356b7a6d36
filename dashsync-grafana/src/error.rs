//! Error types for dashsync-grafana.

use thiserror::Error;

/// Failures while building a [`crate::GrafanaClient`] from a job.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Neither a token nor a user/password pair is configured.
    #[error("job '{job}' has no Grafana credentials")]
    MissingCredentials { job: String },

    #[error("invalid Grafana URL '{url}': expected http:// or https://")]
    InvalidUrl { url: String },
}
