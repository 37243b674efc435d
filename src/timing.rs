//! Per-task timing counters
//!
//! Each task kind owns one fixed slot. Slots are atomics so that tasks of
//! different kinds can start and stop concurrently without a lock; two
//! threads timing the same kind race on the slot and the last writer wins.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Build tasks whose duration is reported in the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    Compile,
    ShardPatch,
    Transform,
    Verifier,
}

impl TaskKind {
    pub const COUNT: usize = 4;

    pub const ALL: [TaskKind; TaskKind::COUNT] = [
        TaskKind::Compile,
        TaskKind::ShardPatch,
        TaskKind::Transform,
        TaskKind::Verifier,
    ];

    fn slot(&self) -> usize {
        *self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Compile => "compile",
            TaskKind::ShardPatch => "shard-patch",
            TaskKind::Transform => "transform",
            TaskKind::Verifier => "verifier",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        TaskKind::ALL.iter().copied().find(|k| k.as_str() == name)
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Default)]
struct TaskSlot {
    started_at_ms: AtomicI64,
    duration_ms: AtomicU64,
}

/// Fixed table of task timers indexed by [`TaskKind`]
#[derive(Debug, Default)]
pub struct TaskTimers {
    slots: [TaskSlot; TaskKind::COUNT],
}

impl TaskTimers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the start time of a task
    pub fn start(&self, kind: TaskKind) {
        self.start_at(kind, Utc::now().timestamp_millis());
    }

    /// Record the elapsed time since the matching start and return it.
    ///
    /// Without a matching start the duration is measured from the epoch.
    pub fn stop(&self, kind: TaskKind) -> u64 {
        self.stop_at(kind, Utc::now().timestamp_millis())
    }

    pub(crate) fn start_at(&self, kind: TaskKind, now_ms: i64) {
        self.slots[kind.slot()]
            .started_at_ms
            .store(now_ms, Ordering::SeqCst);
    }

    pub(crate) fn stop_at(&self, kind: TaskKind, now_ms: i64) -> u64 {
        let slot = &self.slots[kind.slot()];
        let started = slot.started_at_ms.load(Ordering::SeqCst);
        let duration = now_ms.saturating_sub(started).max(0) as u64;
        slot.duration_ms.store(duration, Ordering::SeqCst);
        duration
    }

    /// Last recorded duration for a task (0 if never stopped)
    pub fn duration(&self, kind: TaskKind) -> u64 {
        self.slots[kind.slot()].duration_ms.load(Ordering::SeqCst)
    }

    /// All durations in declaration order
    pub fn durations(&self) -> Vec<(TaskKind, u64)> {
        TaskKind::ALL
            .iter()
            .map(|kind| (*kind, self.duration(*kind)))
            .collect()
    }
}
