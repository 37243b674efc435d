//! The build ledger
//!
//! One [`Ledger`] lives for one build invocation. It owns the build being
//! recorded, the history of previous builds, the cached patching policy and
//! the task timers. Build tasks run concurrently and share the ledger through
//! an `Arc`: every mutation of the recorded state happens under a single
//! mutex, task timers are lock-free per kind, and `abort` is a plain atomic
//! flag.
//!
//! Lifecycle of an invocation:
//! 1. [`Ledger::set_platform_version`] resolves and caches the policy
//! 2. [`Ledger::load_previous_from_file`] brings in the durable history
//! 3. tasks call [`Ledger::add_changed_file`]; each accepted artifact flushes
//!    a temporary snapshot when a snapshot path is set
//! 4. [`Ledger::close`] finalizes the current build and purges the history
//! 5. [`Ledger::write_to_file`] persists the durable ledger

mod purge;

pub use purge::{purge, PurgeSummary};

use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use swap_policy::{ColdswapMode, PatchingPolicy, PlatformVersion};

use crate::build::{Artifact, Build, FileKind, VerifierStatus};
use crate::codec::{LedgerDocument, PersistenceMode, TaskRecord};
use crate::error::LedgerError;
use crate::obs;
use crate::timing::{TaskKind, TaskTimers};

/// Recorded state guarded by the ledger mutex
#[derive(Debug)]
struct LedgerState {
    current: Build,
    previous: BTreeMap<u64, Build>,
    policy: Option<PatchingPolicy>,
    platform_version: Option<PlatformVersion>,
    density: Option<String>,
    abi: Option<String>,
    snapshot_path: Option<PathBuf>,
    patching_enabled: bool,
}

/// Process-lifetime record of what the build pipeline produced
#[derive(Debug)]
pub struct Ledger {
    state: Mutex<LedgerState>,
    timers: TaskTimers,
    aborted: AtomicBool,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

fn clock_build_id() -> u64 {
    Utc::now()
        .timestamp_nanos_opt()
        .map(|nanos| nanos.max(0) as u64)
        .unwrap_or(0)
}

/// Most recent previous build artifact of the given kind
fn newest_artifact_for_kind(previous: &BTreeMap<u64, Build>, kind: FileKind) -> Option<&Artifact> {
    previous
        .values()
        .rev()
        .find_map(|build| build.artifact_for_kind(kind))
}

impl Ledger {
    /// Create a ledger whose current build id is the current time
    pub fn new() -> Self {
        Self::with_build_id(clock_build_id())
    }

    /// Create a ledger with an explicit current build id
    pub fn with_build_id(build_id: u64) -> Self {
        Self {
            state: Mutex::new(LedgerState {
                current: Build::new(build_id),
                previous: BTreeMap::new(),
                policy: None,
                platform_version: None,
                density: None,
                abi: None,
                snapshot_path: None,
                patching_enabled: false,
            }),
            timers: TaskTimers::new(),
            aborted: AtomicBool::new(false),
        }
    }

    // Every critical section leaves the state consistent, so a panic in
    // another recording thread does not invalidate it.
    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // After `close` the current build also lives in the history; changes
    // made to it afterwards must reach both copies.
    fn sync_history_entry(state: &mut LedgerState) {
        let id = state.current.id();
        if let Some(entry) = state.previous.get_mut(&id) {
            *entry = state.current.clone();
        }
    }

    pub fn build_id(&self) -> u64 {
        self.lock().current.id()
    }

    pub fn set_patching_enabled(&self, enabled: bool) {
        self.lock().patching_enabled = enabled;
    }

    pub fn is_patching_enabled(&self) -> bool {
        self.lock().patching_enabled
    }

    /// Where to flush the temporary snapshot after each recorded artifact
    pub fn set_snapshot_path(&self, path: impl Into<PathBuf>) {
        self.lock().snapshot_path = Some(path.into());
    }

    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.lock().snapshot_path.clone()
    }

    // ---------------------------------------------------------------------
    // Task timing
    // ---------------------------------------------------------------------

    pub fn start_recording(&self, kind: TaskKind) {
        self.timers.start(kind);
    }

    /// Stop the timer for `kind` and return the elapsed milliseconds
    pub fn stop_recording(&self, kind: TaskKind) -> u64 {
        self.timers.stop(kind)
    }

    pub fn task_duration(&self, kind: TaskKind) -> u64 {
        self.timers.duration(kind)
    }

    pub fn timers(&self) -> &TaskTimers {
        &self.timers
    }

    // ---------------------------------------------------------------------
    // Target and policy
    // ---------------------------------------------------------------------

    /// Record the target platform and cache the resulting patching policy.
    ///
    /// Until this is called the ledger tracks nothing.
    pub fn set_platform_version(
        &self,
        version: PlatformVersion,
        coldswap_mode: Option<ColdswapMode>,
        target_abi: Option<&str>,
    ) -> PatchingPolicy {
        let policy = PatchingPolicy::resolve(version, coldswap_mode, target_abi);
        let mut state = self.lock();
        state.platform_version = Some(version);
        state.policy = Some(policy);
        state.abi = target_abi.map(str::to_string);
        obs::emit_policy_resolved(policy, version.level(), target_abi);
        policy
    }

    /// Same as [`Ledger::set_platform_version`] with the coldswap mode given by name
    pub fn set_platform_version_named(
        &self,
        version: PlatformVersion,
        coldswap_mode: Option<&str>,
        target_abi: Option<&str>,
    ) -> Result<PatchingPolicy, LedgerError> {
        let mode = coldswap_mode.map(str::parse::<ColdswapMode>).transpose()?;
        Ok(self.set_platform_version(version, mode, target_abi))
    }

    pub fn platform_version(&self) -> Option<PlatformVersion> {
        self.lock().platform_version
    }

    pub fn patching_policy(&self) -> Option<PatchingPolicy> {
        self.lock().policy
    }

    pub fn abi(&self) -> Option<String> {
        self.lock().abi.clone()
    }

    pub fn density(&self) -> Option<String> {
        self.lock().density.clone()
    }

    pub fn set_density(&self, density: Option<String>) {
        self.lock().density = density;
    }

    // ---------------------------------------------------------------------
    // Verification
    // ---------------------------------------------------------------------

    /// Record the verifier outcome; an incompatible outcome is never replaced
    /// by a later compatible one.
    pub fn set_verifier_result(&self, status: VerifierStatus) {
        let mut state = self.lock();
        state.current.record_verifier_status(status);
        Self::sync_history_entry(&mut state);
    }

    pub fn verifier_status(&self) -> Option<VerifierStatus> {
        self.lock().current.verifier_status()
    }

    /// True when the verifier did not run or found nothing incompatible
    pub fn has_passed_verification(&self) -> bool {
        self.verifier_status()
            .map(|status| status.is_compatible())
            .unwrap_or(true)
    }

    // ---------------------------------------------------------------------
    // Recording
    // ---------------------------------------------------------------------

    /// Record a file produced by the current invocation.
    ///
    /// Returns `Ok(true)` when the artifact was recorded and `Ok(false)` when
    /// it was dropped: no policy is cached, the same (kind, location) is
    /// already recorded, or the active policy does not track `kind`. Each
    /// recorded artifact flushes the temporary snapshot; a failed flush is
    /// returned to the caller.
    pub fn add_changed_file(
        &self,
        kind: FileKind,
        location: impl AsRef<Path>,
    ) -> Result<bool, LedgerError> {
        let location = location.as_ref();
        let mut guard = self.lock();
        let state = &mut *guard;
        let _span = obs::BuildSpan::enter(state.current.id());

        let Some(policy) = state.policy else {
            obs::emit_artifact_dropped(kind, location, "no patching policy");
            return Ok(false);
        };

        if state.current.contains(kind, location) {
            return Ok(false);
        }

        let mut kind = kind;
        if !kind.is_always_tracked() {
            let tracked = match policy {
                PatchingPolicy::PreLivePatch => FileKind::RestartPatch,
                PatchingPolicy::MultiShard => FileKind::Shard,
                PatchingPolicy::MultiSplit => FileKind::Split,
            };
            if kind != tracked {
                obs::emit_artifact_dropped(kind, location, "not tracked by policy");
                return Ok(false);
            }

            // a split cannot be deployed without its main package
            if policy == PatchingPolicy::MultiSplit
                && state.current.artifact_for_kind(FileKind::SplitMain).is_none()
            {
                if let Some(split_main) =
                    newest_artifact_for_kind(&state.previous, FileKind::SplitMain).cloned()
                {
                    state.current.push(split_main);
                }
            }
        }

        if kind == FileKind::Main {
            if policy == PatchingPolicy::MultiSplit {
                kind = FileKind::SplitMain;
            }

            // packaging and signing can report the main package several
            // times, last one wins
            state.current.remove_kind(kind);

            // shards are packaged inside the main package
            if policy == PatchingPolicy::MultiShard {
                state.current.clear_artifacts();
            }

            state.current.remove_kind(FileKind::Resources);
        }

        state.current.push(Artifact::new(kind, location));
        obs::emit_artifact_recorded(kind, location);
        Self::sync_history_entry(state);

        self.flush_snapshot(state)?;
        Ok(true)
    }

    fn flush_snapshot(&self, state: &mut LedgerState) -> Result<(), LedgerError> {
        let Some(path) = state.snapshot_path.clone() else {
            return Ok(());
        };
        self.document_locked(state, PersistenceMode::Temporary)
            .write_to_file(&path)
    }

    /// Mark the invocation as failed; only affects the next [`Ledger::close`]
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    // ---------------------------------------------------------------------
    // History
    // ---------------------------------------------------------------------

    /// Snapshot of the build being recorded
    pub fn current_build(&self) -> Build {
        self.lock().current.clone()
    }

    /// Previous builds in ascending id order
    pub fn previous_builds(&self) -> Vec<Build> {
        self.lock().previous.values().cloned().collect()
    }

    /// The most recent previous build
    pub fn last_build(&self) -> Option<Build> {
        self.lock().previous.values().next_back().cloned()
    }

    /// Artifact of `kind` from the most recent previous build holding one
    pub fn past_artifact_for_kind(&self, kind: FileKind) -> Option<Artifact> {
        newest_artifact_for_kind(&self.lock().previous, kind).cloned()
    }

    /// Load a previously persisted ledger into the build history.
    ///
    /// The inline build of the document and every historical build become
    /// entries of the history. If the history holds an id at or above the
    /// current build id, the current build moves past it so that it stays the
    /// newest build.
    pub fn load_previous(&self, persisted: &str) -> Result<(), LedgerError> {
        let document = LedgerDocument::from_json(persisted)?;
        let mut guard = self.lock();
        let state = &mut *guard;

        let LedgerDocument {
            current, builds, ..
        } = document;
        for build in std::iter::once(current).chain(builds) {
            state.previous.insert(build.id(), build);
        }

        if let Some(newest) = state.previous.keys().next_back().copied() {
            if newest >= state.current.id() {
                state.current.set_id(newest + 1);
            }
        }

        obs::emit_history_loaded(state.previous.len());
        Ok(())
    }

    /// File variant of [`Ledger::load_previous`]; a missing file is no prior state
    pub fn load_previous_from_file(&self, path: &Path) -> Result<(), LedgerError> {
        match std::fs::read_to_string(path) {
            Ok(json) => self.load_previous(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LedgerError::io(path, e)),
        }
    }

    /// Merge the artifacts of a temporary snapshot into the current build.
    ///
    /// Used when an invocation resumes after a crash between task executions.
    /// Artifacts already recorded in the current build are skipped.
    pub fn merge_temporary(&self, snapshot: &str) -> Result<usize, LedgerError> {
        let document = LedgerDocument::from_json(snapshot)?;
        let mut state = self.lock();
        let merged = document
            .current
            .artifacts()
            .iter()
            .filter(|artifact| state.current.push((*artifact).clone()))
            .count();
        Self::sync_history_entry(&mut state);
        obs::emit_snapshot_merged(merged);
        Ok(merged)
    }

    /// File variant of [`Ledger::merge_temporary`]; a missing file merges nothing
    pub fn merge_temporary_from_file(&self, path: &Path) -> Result<usize, LedgerError> {
        match std::fs::read_to_string(path) {
            Ok(json) => self.merge_temporary(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(LedgerError::io(path, e)),
        }
    }

    // ---------------------------------------------------------------------
    // Finalize and persist
    // ---------------------------------------------------------------------

    /// Finalize the invocation: fold the current build into the history and
    /// purge obsolete builds and artifacts.
    ///
    /// An aborted invocation keeps nothing, unless it failed on a binary
    /// manifest change while producing a full build.
    ///
    /// Recording after `close` keeps updating the current build's history
    /// entry; the purge is not rerun.
    pub fn close(&self, mode: PersistenceMode) -> PurgeSummary {
        let mut guard = self.lock();
        let state = &mut *guard;
        let build_id = state.current.id();
        let _span = obs::BuildSpan::enter(build_id);

        if self.is_aborted() {
            let recovers = state.current.verifier_status()
                == Some(VerifierStatus::BinaryManifestFileChanged)
                && mode == PersistenceMode::FullBuild;
            if !recovers {
                obs::emit_aborted_build_discarded(build_id, state.current.len());
                state.current.clear_artifacts();
            }
        }

        state.previous.insert(build_id, state.current.clone());
        let summary = purge(&mut state.previous, build_id, state.policy);

        // keep the current build in step with its purged history entry
        if let Some(purged) = state.previous.get(&build_id) {
            state.current = purged.clone();
        }

        obs::emit_closed(build_id, mode, &summary);
        summary
    }

    fn document_locked(&self, state: &mut LedgerState, mode: PersistenceMode) -> LedgerDocument {
        // a full build obviates the incremental verification result
        if mode == PersistenceMode::FullBuild {
            state.current.clear_verifier_status();
            let id = state.current.id();
            if let Some(entry) = state.previous.get_mut(&id) {
                entry.clear_verifier_status();
            }
        }

        let mut document = LedgerDocument::new(state.current.clone());
        document.platform_version = state.platform_version;
        document.density = state.density.clone();
        document.abi = state.abi.clone();
        document.tasks = self
            .timers
            .durations()
            .into_iter()
            .map(|(kind, duration)| TaskRecord {
                name: kind.as_str().to_string(),
                duration,
            })
            .collect();
        document.builds = match mode {
            PersistenceMode::FullBuild => {
                state.previous.values().next_back().cloned().into_iter().collect()
            }
            PersistenceMode::IncrementalBuild => state.previous.values().cloned().collect(),
            PersistenceMode::Temporary => Vec::new(),
        };
        document
    }

    /// Build the persisted form of the ledger for `mode`.
    ///
    /// In [`PersistenceMode::FullBuild`] the current build's verifier status
    /// is cleared as a side effect.
    pub fn to_document(&self, mode: PersistenceMode) -> LedgerDocument {
        let mut state = self.lock();
        self.document_locked(&mut state, mode)
    }

    pub fn to_json(&self, mode: PersistenceMode) -> Result<String, LedgerError> {
        self.to_document(mode).to_json()
    }

    /// Write the persisted form to `path`, creating parent directories
    pub fn write_to_file(&self, path: &Path, mode: PersistenceMode) -> Result<(), LedgerError> {
        let document = self.to_document(mode);
        document.write_to_file(path)?;
        obs::emit_written(path, mode, document.builds.len() + 1);
        Ok(())
    }
}
