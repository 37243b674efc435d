//! Ledger lifecycle across successive invocations
//!
//! Each invocation is a fresh `Ledger` that loads the durable file written by
//! the previous one, records artifacts, closes and writes it back.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use swap_ledger::{
    ColdswapMode, FileKind, Ledger, PatchingPolicy, PersistenceMode, PlatformVersion,
    VerifierStatus,
};
use tempfile::TempDir;

fn start_invocation(build_info: &Path, build_id: u64, mode: ColdswapMode) -> Ledger {
    let ledger = Ledger::with_build_id(build_id);
    ledger.set_platform_version(PlatformVersion::new(24), Some(mode), Some("arm64-v8a"));
    ledger.load_previous_from_file(build_info).unwrap();
    ledger
}

fn finish_invocation(ledger: &Ledger, build_info: &Path) {
    ledger.close(PersistenceMode::IncrementalBuild);
    ledger
        .write_to_file(build_info, PersistenceMode::IncrementalBuild)
        .unwrap();
}

fn artifacts(ledger: &Ledger, id: u64) -> Vec<(FileKind, PathBuf)> {
    ledger
        .previous_builds()
        .into_iter()
        .find(|build| build.id() == id)
        .map(|build| {
            build
                .artifacts()
                .iter()
                .map(|a| (a.kind(), a.location().to_path_buf()))
                .collect()
        })
        .unwrap_or_default()
}

fn ids(ledger: &Ledger) -> Vec<u64> {
    ledger.previous_builds().iter().map(|b| b.id()).collect()
}

// === Split policy ===

#[test]
fn test_split_workflow_across_invocations() {
    let dir = TempDir::new().unwrap();
    let build_info = dir.path().join("build-info.json");

    // Full build: the main package is recorded as the split main
    let first = start_invocation(&build_info, 100, ColdswapMode::MultiSplit);
    assert_eq!(first.patching_policy(), Some(PatchingPolicy::MultiSplit));
    assert!(first.add_changed_file(FileKind::Main, "app.apk").unwrap());
    assert!(first.add_changed_file(FileKind::Resources, "res.ap_").unwrap());
    finish_invocation(&first, &build_info);

    // Hot patch: the split pulls in the existing main split
    let second = start_invocation(&build_info, 0, ColdswapMode::MultiSplit);
    assert_eq!(second.build_id(), 101);
    assert!(second.add_changed_file(FileKind::Split, "split_1.apk").unwrap());
    second.set_verifier_result(VerifierStatus::Compatible);
    finish_invocation(&second, &build_info);
    assert_eq!(
        artifacts(&second, 101),
        vec![
            (FileKind::SplitMain, PathBuf::from("app.apk")),
            (FileKind::Split, PathBuf::from("split_1.apk")),
        ]
    );

    // Same split rebuilt: the older copy is superseded
    let third = start_invocation(&build_info, 0, ColdswapMode::MultiSplit);
    assert_eq!(third.build_id(), 102);
    third.add_changed_file(FileKind::Split, "split_1.apk").unwrap();
    third.set_verifier_result(VerifierStatus::Compatible);
    let summary = third.close(PersistenceMode::IncrementalBuild);
    third
        .write_to_file(&build_info, PersistenceMode::IncrementalBuild)
        .unwrap();
    assert!(summary.removed_builds.is_empty());
    assert_eq!(summary.removed_artifacts, 1);
    assert_eq!(
        artifacts(&third, 101),
        vec![(FileKind::SplitMain, PathBuf::from("app.apk"))]
    );

    // Incompatible change: hot-patch builds before it are forgotten
    let fourth = start_invocation(&build_info, 0, ColdswapMode::MultiSplit);
    fourth.add_changed_file(FileKind::Split, "split_2.apk").unwrap();
    fourth.set_verifier_result(VerifierStatus::MethodAdded);
    fourth.set_verifier_result(VerifierStatus::Compatible);
    assert!(!fourth.has_passed_verification());
    let summary = fourth.close(PersistenceMode::IncrementalBuild);

    assert_eq!(summary.removed_builds, vec![102, 101]);
    assert_eq!(ids(&fourth), vec![100, 103]);
    assert_eq!(
        artifacts(&fourth, 100),
        vec![
            (FileKind::SplitMain, PathBuf::from("app.apk")),
            (FileKind::Resources, PathBuf::from("res.ap_")),
        ]
    );
    assert_eq!(
        fourth.current_build().verifier_status(),
        Some(VerifierStatus::MethodAdded)
    );
}

#[test]
fn test_split_dropped_without_split_policy() {
    let dir = TempDir::new().unwrap();
    let build_info = dir.path().join("build-info.json");

    // no ABI: auto mode stays on shards
    let ledger = Ledger::with_build_id(1);
    let policy =
        ledger.set_platform_version(PlatformVersion::new(24), Some(ColdswapMode::Auto), None);
    assert_eq!(policy, PatchingPolicy::MultiShard);
    assert!(!ledger.add_changed_file(FileKind::Split, "split.apk").unwrap());
    assert!(ledger.add_changed_file(FileKind::Shard, "shard.dex").unwrap());
    finish_invocation(&ledger, &build_info);

    assert_eq!(
        artifacts(&ledger, 1),
        vec![(FileKind::Shard, PathBuf::from("shard.dex"))]
    );
}

// === Aborted invocations ===

#[test]
fn test_aborted_invocation_leaves_empty_build_that_is_purged_later() {
    let dir = TempDir::new().unwrap();
    let build_info = dir.path().join("build-info.json");

    let first = start_invocation(&build_info, 100, ColdswapMode::MultiShard);
    first.add_changed_file(FileKind::Main, "app.apk").unwrap();
    finish_invocation(&first, &build_info);

    let failed = start_invocation(&build_info, 0, ColdswapMode::MultiShard);
    failed.add_changed_file(FileKind::Shard, "s1.dex").unwrap();
    failed.abort();
    assert!(failed.is_aborted());
    finish_invocation(&failed, &build_info);
    assert!(failed.current_build().is_empty());
    assert_eq!(ids(&failed), vec![100, 101]);

    let next = start_invocation(&build_info, 0, ColdswapMode::MultiShard);
    next.add_changed_file(FileKind::Shard, "s2.dex").unwrap();
    next.set_verifier_result(VerifierStatus::Compatible);
    let summary = next.close(PersistenceMode::IncrementalBuild);

    assert_eq!(summary.removed_builds, vec![101]);
    assert_eq!(ids(&next), vec![100, 102]);
}

#[test]
fn test_empty_initial_build_survives() {
    let dir = TempDir::new().unwrap();
    let build_info = dir.path().join("build-info.json");

    // first invocation produced nothing
    let first = start_invocation(&build_info, 100, ColdswapMode::MultiShard);
    finish_invocation(&first, &build_info);

    let second = start_invocation(&build_info, 0, ColdswapMode::MultiShard);
    second.add_changed_file(FileKind::Shard, "s.dex").unwrap();
    second.set_verifier_result(VerifierStatus::FieldAdded);
    second.close(PersistenceMode::IncrementalBuild);

    assert_eq!(ids(&second), vec![100, 101]);
}

// === Concurrency ===

#[test]
fn test_concurrent_recording() {
    let ledger = Arc::new(Ledger::with_build_id(1));
    ledger.set_platform_version(
        PlatformVersion::new(24),
        Some(ColdswapMode::MultiShard),
        None,
    );

    let handles: Vec<_> = (0..8)
        .map(|t| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let mut recorded = 0;
                for i in 0..25 {
                    if ledger
                        .add_changed_file(FileKind::Shard, format!("shard-{}-{}.dex", t, i))
                        .unwrap()
                    {
                        recorded += 1;
                    }
                }
                if ledger
                    .add_changed_file(FileKind::ReloadPatch, "reload.dex")
                    .unwrap()
                {
                    recorded += 1;
                }
                recorded
            })
        })
        .collect();

    let total: usize = handles
        .into_iter()
        .map(|h| h.join().expect("recording thread panicked"))
        .sum();

    assert_eq!(total, 8 * 25 + 1);
    assert_eq!(ledger.current_build().len(), 8 * 25 + 1);
}

#[test]
fn test_concurrent_task_timers() {
    use swap_ledger::TaskKind;

    let ledger = Arc::new(Ledger::with_build_id(1));
    let handles: Vec<_> = TaskKind::ALL
        .iter()
        .map(|kind| {
            let ledger = Arc::clone(&ledger);
            let kind = *kind;
            thread::spawn(move || {
                ledger.start_recording(kind);
                ledger.stop_recording(kind)
            })
        })
        .collect();

    for handle in handles {
        // started and stopped within the test
        assert!(handle.join().unwrap() < 60_000);
    }

    let doc = ledger.to_document(PersistenceMode::Temporary);
    let names: Vec<&str> = doc.tasks.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["compile", "shard-patch", "transform", "verifier"]);
}

// === Crash recovery ===

#[test]
fn test_snapshot_recovery_after_crash() {
    let dir = TempDir::new().unwrap();
    let snapshot = dir.path().join("tmp/build-info-temp.json");

    {
        let crashed = Ledger::with_build_id(7);
        crashed.set_platform_version(
            PlatformVersion::new(24),
            Some(ColdswapMode::MultiShard),
            None,
        );
        crashed.set_snapshot_path(&snapshot);
        crashed.add_changed_file(FileKind::Shard, "a.dex").unwrap();
        crashed.add_changed_file(FileKind::Shard, "b.dex").unwrap();
    }
    assert!(snapshot.exists());

    let resumed = Ledger::with_build_id(8);
    resumed.set_platform_version(
        PlatformVersion::new(24),
        Some(ColdswapMode::MultiShard),
        None,
    );
    assert_eq!(resumed.merge_temporary_from_file(&snapshot).unwrap(), 2);
    assert!(!resumed.add_changed_file(FileKind::Shard, "a.dex").unwrap());
    assert!(resumed.add_changed_file(FileKind::Shard, "c.dex").unwrap());

    resumed.close(PersistenceMode::IncrementalBuild);
    assert_eq!(resumed.current_build().len(), 3);
    assert_eq!(resumed.build_id(), 8);
}

#[test]
fn test_missing_snapshot_merges_nothing() {
    let dir = TempDir::new().unwrap();
    let ledger = Ledger::with_build_id(1);
    assert_eq!(
        ledger
            .merge_temporary_from_file(&dir.path().join("absent.json"))
            .unwrap(),
        0
    );
}
