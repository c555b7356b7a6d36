//! # dashsync-git
//!
//! [`GitClient`] implements [`dashsync_core::VersionStore`] on a private clone
//! of the job's repository, kept in a temporary directory for the lifetime of
//! the client.

pub mod client;

pub use client::GitClient;
