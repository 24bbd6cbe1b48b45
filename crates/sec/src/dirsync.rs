//! Trust directory scanning and polling.
//!
//! Trusted and supported identities are administered as directories of
//! files whose names start with a hex global id. Each watch re-scans its
//! directory into a snapshot and reconciles the trust graph with it;
//! without native change notification the scan is re-armed on a fixed
//! poll interval, and an unreadable directory is retried quickly once,
//! then slowly.

use crate::config::DEF_TRUST_DIR_POLL_MS;
use crate::context::{SecTask, SecurityContext};
use crate::error::Result;
use crate::registry::ClaimedKeyTable;
use crate::trust::{SyncOutcome, TrustGraph, TrustSetKind};
use filament_core::{GlobalId, Scheduler};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Retry delay after the first failed scan of a directory.
const RETRY_FIRST_MS: u64 = 5;
/// Retry delay after repeated failures.
const RETRY_LATER_MS: u64 = 5_000;

/// Reads a trust directory into a snapshot of global ids.
///
/// File names must start with a full hex id; anything after it (such as
/// a human-readable suffix) is ignored. Unparseable names are skipped
/// with a warning rather than failing the scan.
pub fn scan_dir(path: &Path) -> std::io::Result<BTreeSet<GlobalId>> {
    let mut out = BTreeSet::new();
    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        match GlobalId::from_hex(&name) {
            Ok(id) => {
                out.insert(id);
            }
            Err(e) => {
                warn!(dir = %path.display(), file = %name, error = %e,
                      "ignoring file with illegal id name");
            }
        }
    }
    Ok(out)
}

/// One watched trust directory, owning its poll/retry scheduling.
#[derive(Debug)]
pub struct DirWatch {
    kind: TrustSetKind,
    path: PathBuf,
    /// True when an external change notifier re-triggers scans, in which
    /// case no poll timer is armed after a successful scan.
    notified: bool,
    failed_before: bool,
}

impl DirWatch {
    pub fn new(kind: TrustSetKind, path: PathBuf, notified: bool) -> Self {
        DirWatch {
            kind,
            path,
            notified,
            failed_before: false,
        }
    }

    pub fn kind(&self) -> TrustSetKind {
        self.kind
    }

    pub fn task(&self) -> SecTask {
        match self.kind {
            TrustSetKind::Trusted => SecTask::RescanTrusted,
            TrustSetKind::Supported => SecTask::RescanSupported,
        }
    }

    /// Scans the directory and reconciles the trust graph. Always leaves
    /// exactly one timer armed unless notification is external and the
    /// scan succeeded.
    pub fn rescan(
        &mut self,
        now_ms: u64,
        graph: &mut TrustGraph,
        ctx: &mut SecurityContext,
        registry: &mut ClaimedKeyTable,
        sched: &mut Scheduler<SecTask>,
    ) -> Result<SyncOutcome> {
        sched.cancel(self.task());
        match scan_dir(&self.path) {
            Ok(snapshot) => {
                self.failed_before = false;
                let outcome = graph.sync_directory(self.kind, &snapshot, ctx, registry);
                if outcome.changed() {
                    debug!(dir = %self.path.display(), added = outcome.added,
                           removed = outcome.removed, "trust directory reconciled");
                }
                if !self.notified {
                    sched.schedule(now_ms + DEF_TRUST_DIR_POLL_MS, self.task());
                }
                Ok(outcome)
            }
            Err(e) => {
                let delay = if self.failed_before {
                    RETRY_LATER_MS
                } else {
                    RETRY_FIRST_MS
                };
                self.failed_before = true;
                warn!(dir = %self.path.display(), error = %e, retry_ms = delay,
                      "trust directory unreadable");
                sched.schedule(now_ms + delay, self.task());
                Err(e.into())
            }
        }
    }
}
