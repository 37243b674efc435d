//! Retention pass over the build history
//!
//! Keeps the persisted ledger bounded by dropping builds and artifacts made
//! obsolete by newer ones:
//! - hot-patch builds older than the most recent cold restart are dropped
//! - for accumulative kinds only the newest artifact per location survives
//! - resources older than a cold restart are dropped under the split policy
//! - builds left without artifacts are dropped, except the current build
//!
//! The oldest build is the initial full build and is never touched.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use swap_policy::PatchingPolicy;

use crate::build::{Build, FileKind};

/// Result of a purge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeSummary {
    /// Number of builds scanned
    pub scanned: usize,
    /// Ids of builds removed, newest first
    pub removed_builds: Vec<u64>,
    /// Number of artifacts removed from retained builds
    pub removed_artifacts: usize,
}

/// Purge obsolete builds and artifacts in place.
///
/// `current_id` is the id of the build being finalized; it survives even
/// when it ends up empty.
pub fn purge(
    builds: &mut BTreeMap<u64, Build>,
    current_id: u64,
    policy: Option<PatchingPolicy>,
) -> PurgeSummary {
    let mut summary = PurgeSummary {
        scanned: builds.len(),
        ..PurgeSummary::default()
    };

    let Some(initial_full_build) = builds.keys().next().copied() else {
        return summary;
    };

    let mut found_cold_restart = false;
    let mut seen_locations: HashSet<PathBuf> = HashSet::new();

    // newest to oldest
    let ids: Vec<u64> = builds.keys().rev().copied().collect();
    for id in ids {
        if id == initial_full_build {
            continue;
        }
        let Some(build) = builds.get_mut(&id) else {
            continue;
        };

        match build.verifier_status() {
            Some(status) if status.is_compatible() => {
                if found_cold_restart {
                    builds.remove(&id);
                    summary.removed_builds.push(id);
                    continue;
                }
            }
            Some(_) => found_cold_restart = true,
            // full build or no code change
            None => found_cold_restart = build.has_code_artifact(),
        }

        // resources are redelivered inside the main split after a cold restart
        if found_cold_restart
            && policy == Some(PatchingPolicy::MultiSplit)
            && build.remove_kind(FileKind::Resources).is_some()
        {
            summary.removed_artifacts += 1;
        }

        let before = build.len();
        build.retain_artifacts(|artifact| {
            if !artifact.is_accumulative() {
                return true;
            }
            seen_locations.insert(artifact.location().to_path_buf())
        });
        summary.removed_artifacts += before - build.len();
    }

    let empty: Vec<u64> = builds
        .iter()
        .rev()
        .filter(|(id, build)| {
            **id != current_id && **id != initial_full_build && build.is_empty()
        })
        .map(|(id, _)| *id)
        .collect();
    for id in empty {
        builds.remove(&id);
        summary.removed_builds.push(id);
    }

    summary
}
