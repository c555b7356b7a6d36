//! dashsync core library: dashboard model, store interfaces, job configuration.
//!
//! - [`types`]: dashboard document, folder, job configuration structs
//! - [`store`]: [`LiveStore`] / [`VersionStore`] collaborator traits
//! - [`config`]: load / validate the job list
//! - [`error`]: [`DocumentError`], [`StoreError`], [`ConfigError`]

pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use error::{ConfigError, DocumentError, StoreError};
pub use store::{check_tree_path, LiveStore, TreeListing, VersionStore};
pub use types::{
    CommitId, DashboardDocument, DashboardHit, FolderRef, GitAuth, LiveAuth, PullConfig,
    PushConfig, RepoHandle, Secret, SyncJob, WriteStatus, GENERAL_FOLDER,
};
