//! Builds and their artifacts
//!
//! A [`Build`] is the recorded outcome of one invocation: a generation-ordered
//! id, the verifier result (if any) and the artifacts it produced, in
//! production order.

mod artifact;
mod verifier;

pub use artifact::{Artifact, FileKind, UnknownFileKind};
pub use verifier::{UnknownVerifierStatus, VerifierStatus};

use serde::{Deserialize, Serialize};
use std::path::Path;

/// The result of one patching-enabled build invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Unique, generation-ordered build id
    #[serde(rename = "timestamp")]
    id: u64,

    /// Verifier outcome; absent for full builds and builds without code changes
    #[serde(rename = "verifier", default, skip_serializing_if = "Option::is_none")]
    verifier_status: Option<VerifierStatus>,

    /// Produced artifacts, at most one per (kind, location)
    #[serde(default)]
    artifacts: Vec<Artifact>,
}

impl Build {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            verifier_status: None,
            artifacts: Vec::new(),
        }
    }

    /// Create a build with a recorded verifier status
    pub fn with_status(id: u64, status: VerifierStatus) -> Self {
        Self {
            id,
            verifier_status: Some(status),
            artifacts: Vec::new(),
        }
    }

    /// Builder-style artifact insertion, mostly for fixtures
    pub fn with_artifact(mut self, kind: FileKind, location: impl AsRef<Path>) -> Self {
        self.push(Artifact::new(kind, location.as_ref()));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    pub fn verifier_status(&self) -> Option<VerifierStatus> {
        self.verifier_status
    }

    pub(crate) fn record_verifier_status(&mut self, reported: VerifierStatus) {
        self.verifier_status = Some(VerifierStatus::merge_into(self.verifier_status, reported));
    }

    pub(crate) fn clear_verifier_status(&mut self) {
        self.verifier_status = None;
    }

    pub fn artifacts(&self) -> &[Artifact] {
        &self.artifacts
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// First artifact of the given kind
    pub fn artifact_for_kind(&self, kind: FileKind) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.kind() == kind)
    }

    pub fn contains(&self, kind: FileKind, location: &Path) -> bool {
        self.artifacts.iter().any(|a| a.matches(kind, location))
    }

    /// Whether any artifact carries code that requires a restart
    pub fn has_code_artifact(&self) -> bool {
        self.artifacts.iter().any(|a| a.kind().is_code())
    }

    /// Append an artifact unless the same (kind, location) is already present.
    ///
    /// Returns `true` when the artifact was added.
    pub(crate) fn push(&mut self, artifact: Artifact) -> bool {
        if self.contains(artifact.kind(), artifact.location()) {
            return false;
        }
        self.artifacts.push(artifact);
        true
    }

    /// Remove the first artifact of the given kind
    pub(crate) fn remove_kind(&mut self, kind: FileKind) -> Option<Artifact> {
        let index = self.artifacts.iter().position(|a| a.kind() == kind)?;
        Some(self.artifacts.remove(index))
    }

    pub(crate) fn clear_artifacts(&mut self) {
        self.artifacts.clear();
    }

    pub(crate) fn retain_artifacts(&mut self, keep: impl FnMut(&Artifact) -> bool) {
        self.artifacts.retain(keep);
    }
}
