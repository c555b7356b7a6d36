//! # dashsync-grafana
//!
//! [`GrafanaClient`] implements [`dashsync_core::LiveStore`] over the Grafana
//! HTTP API.

pub mod client;
pub mod error;

pub use client::GrafanaClient;
pub use error::ClientError;
