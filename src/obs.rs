//! Structured tracing events for the ledger lifecycle.
//!
//! Lifecycle events are emitted at `info!`, per-artifact decisions at
//! `debug!`. The binary controls the filter via `SWAP_LEDGER_LOG` and the
//! output format via `SWAP_LEDGER_LOG_FORMAT=json`.

use std::path::Path;

use swap_policy::PatchingPolicy;
use tracing::{debug, info, warn};

use crate::build::FileKind;
use crate::codec::PersistenceMode;
use crate::ledger::PurgeSummary;

/// RAII guard that enters a span tagged with the build id.
pub struct BuildSpan {
    _span: tracing::span::EnteredSpan,
}

impl BuildSpan {
    pub fn enter(build_id: u64) -> Self {
        let span = tracing::info_span!("swap_ledger.build", build_id = build_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_policy_resolved(policy: PatchingPolicy, platform_version: u32, abi: Option<&str>) {
    info!(
        event = "ledger.policy_resolved",
        policy = %policy,
        platform_version = platform_version,
        abi = abi.unwrap_or("-"),
    );
}

pub fn emit_artifact_recorded(kind: FileKind, location: &Path) {
    debug!(event = "ledger.artifact_recorded", kind = %kind, location = %location.display());
}

pub fn emit_artifact_dropped(kind: FileKind, location: &Path, reason: &'static str) {
    debug!(
        event = "ledger.artifact_dropped",
        kind = %kind,
        location = %location.display(),
        reason = reason,
    );
}

pub fn emit_history_loaded(builds: usize) {
    info!(event = "ledger.history_loaded", builds = builds);
}

pub fn emit_snapshot_merged(artifacts: usize) {
    info!(event = "ledger.snapshot_merged", artifacts = artifacts);
}

pub fn emit_aborted_build_discarded(build_id: u64, artifacts: usize) {
    warn!(
        event = "ledger.aborted_build_discarded",
        build_id = build_id,
        artifacts = artifacts,
    );
}

pub fn emit_closed(build_id: u64, mode: PersistenceMode, summary: &PurgeSummary) {
    info!(
        event = "ledger.closed",
        build_id = build_id,
        mode = %mode,
        scanned = summary.scanned,
        removed_builds = summary.removed_builds.len(),
        removed_artifacts = summary.removed_artifacts,
    );
}

pub fn emit_written(path: &Path, mode: PersistenceMode, builds: usize) {
    info!(
        event = "ledger.written",
        path = %path.display(),
        mode = %mode,
        builds = builds,
    );
}
