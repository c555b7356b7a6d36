//! # dashsync-sync
//!
//! Reconciliation engine between a live dashboard store and a git tree.
//!
//! Call [`push_dashboards`] / [`pull_dashboards`] for a single phase, or
//! [`run_all`] to process every configured job. [`memory`] holds in-process
//! stores for tests and dry experiments.

pub mod error;
pub mod filter;
pub mod memory;
pub mod normalize;
pub mod pipeline;
pub mod pull;
pub mod push;
pub mod session;

pub use error::SyncError;
pub use filter::PathFilter;
pub use normalize::{documents_equal, normalize, unified_diff};
pub use pipeline::{run_all, run_job, JobOutcome, JobReport};
pub use pull::{pull_dashboards, resolve_folder, DashboardChange, FolderTarget, ImportResult, PullReport};
pub use push::{push_dashboards, CommitOutcome, ExportResult, PushReport};
pub use session::Session;
