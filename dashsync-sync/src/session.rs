//! Per-job session: the job name plus the two authenticated collaborators.

use dashsync_core::{LiveStore, VersionStore};

/// Everything a reconciler needs to talk to both stores for one job.
///
/// Sessions are built fresh for every job and never shared between jobs.
#[derive(Debug)]
pub struct Session<L, V> {
    pub job_name: String,
    pub live: L,
    pub vcs: V,
}

impl<L: LiveStore, V: VersionStore> Session<L, V> {
    pub fn new(job_name: impl Into<String>, live: L, vcs: V) -> Self {
        Self {
            job_name: job_name.into(),
            live,
            vcs,
        }
    }
}
