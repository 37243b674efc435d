//! Build artifacts: one produced file tagged with how it is deployed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Kind of file produced by a patching-enabled build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileKind {
    /// Main package for shard-based and pre-live-patch deployments
    Main,
    /// Main package when code is delivered as split packages
    SplitMain,
    /// Patch that can be applied to a live process
    ReloadPatch,
    /// Minimal patch applied on restart by platforms without live patching
    RestartPatch,
    /// Replacement for one originally installed code shard
    Shard,
    /// Code-only split package, installable on its own next to the main one
    Split,
    /// Packaged resources
    Resources,
}

impl FileKind {
    pub const ALL: [FileKind; 7] = [
        FileKind::Main,
        FileKind::SplitMain,
        FileKind::ReloadPatch,
        FileKind::RestartPatch,
        FileKind::Shard,
        FileKind::Split,
        FileKind::Resources,
    ];

    /// Whether a newer artifact of this kind replaces the older one at the
    /// same location instead of stacking on top of it.
    pub fn is_accumulative(&self) -> bool {
        matches!(
            self,
            FileKind::Shard | FileKind::Split | FileKind::Main | FileKind::Resources
        )
    }

    /// Whether this kind carries code that forces a restart when deployed.
    pub fn is_code(&self) -> bool {
        matches!(
            self,
            FileKind::Shard | FileKind::Split | FileKind::Main | FileKind::RestartPatch
        )
    }

    /// Kinds recorded whatever the active patching policy is.
    pub fn is_always_tracked(&self) -> bool {
        matches!(
            self,
            FileKind::ReloadPatch | FileKind::Main | FileKind::Resources
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Main => "MAIN",
            FileKind::SplitMain => "SPLIT_MAIN",
            FileKind::ReloadPatch => "RELOAD_PATCH",
            FileKind::RestartPatch => "RESTART_PATCH",
            FileKind::Shard => "SHARD",
            FileKind::Split => "SPLIT",
            FileKind::Resources => "RESOURCES",
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a file kind name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown file kind '{0}'")]
pub struct UnknownFileKind(pub String);

impl FromStr for FileKind {
    type Err = UnknownFileKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        FileKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| UnknownFileKind(s.to_string()))
    }
}

/// A build artifact defined by its kind and location
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(rename = "type")]
    kind: FileKind,
    location: PathBuf,
}

impl Artifact {
    pub fn new(kind: FileKind, location: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn is_accumulative(&self) -> bool {
        self.kind.is_accumulative()
    }

    /// Whether this artifact matches the given kind and location exactly
    pub fn matches(&self, kind: FileKind, location: &Path) -> bool {
        self.kind == kind && self.location == location
    }
}
