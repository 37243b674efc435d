//! Verification outcome of a build's code changes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result reported by the change verifier for one invocation.
///
/// Only [`VerifierStatus::Compatible`] allows the change to be hot-patched;
/// every other status means the target needs a cold restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerifierStatus {
    Compatible,
    NotRun,
    PatchingDisabled,
    VerifierFailure,
    MethodAdded,
    MethodDeleted,
    FieldAdded,
    FieldRemoved,
    FieldTypeChanged,
    SignatureChanged,
    ParentTypeChanged,
    InterfacesChanged,
    StaticInitializerChanged,
    ReflectionUsed,
    DependencyChanged,
    ManifestFileChanged,
    BinaryManifestFileChanged,
}

impl VerifierStatus {
    pub const ALL: [VerifierStatus; 17] = [
        VerifierStatus::Compatible,
        VerifierStatus::NotRun,
        VerifierStatus::PatchingDisabled,
        VerifierStatus::VerifierFailure,
        VerifierStatus::MethodAdded,
        VerifierStatus::MethodDeleted,
        VerifierStatus::FieldAdded,
        VerifierStatus::FieldRemoved,
        VerifierStatus::FieldTypeChanged,
        VerifierStatus::SignatureChanged,
        VerifierStatus::ParentTypeChanged,
        VerifierStatus::InterfacesChanged,
        VerifierStatus::StaticInitializerChanged,
        VerifierStatus::ReflectionUsed,
        VerifierStatus::DependencyChanged,
        VerifierStatus::ManifestFileChanged,
        VerifierStatus::BinaryManifestFileChanged,
    ];

    pub fn is_compatible(&self) -> bool {
        matches!(self, VerifierStatus::Compatible)
    }

    /// Apply a newly reported status on top of the recorded one.
    ///
    /// An incompatible status sticks for the rest of the invocation: once
    /// recorded, a later `Compatible` report does not overwrite it.
    pub fn merge_into(current: Option<VerifierStatus>, reported: VerifierStatus) -> VerifierStatus {
        match current {
            Some(recorded) if !recorded.is_compatible() => recorded,
            _ => reported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerifierStatus::Compatible => "COMPATIBLE",
            VerifierStatus::NotRun => "NOT_RUN",
            VerifierStatus::PatchingDisabled => "PATCHING_DISABLED",
            VerifierStatus::VerifierFailure => "VERIFIER_FAILURE",
            VerifierStatus::MethodAdded => "METHOD_ADDED",
            VerifierStatus::MethodDeleted => "METHOD_DELETED",
            VerifierStatus::FieldAdded => "FIELD_ADDED",
            VerifierStatus::FieldRemoved => "FIELD_REMOVED",
            VerifierStatus::FieldTypeChanged => "FIELD_TYPE_CHANGED",
            VerifierStatus::SignatureChanged => "SIGNATURE_CHANGED",
            VerifierStatus::ParentTypeChanged => "PARENT_TYPE_CHANGED",
            VerifierStatus::InterfacesChanged => "INTERFACES_CHANGED",
            VerifierStatus::StaticInitializerChanged => "STATIC_INITIALIZER_CHANGED",
            VerifierStatus::ReflectionUsed => "REFLECTION_USED",
            VerifierStatus::DependencyChanged => "DEPENDENCY_CHANGED",
            VerifierStatus::ManifestFileChanged => "MANIFEST_FILE_CHANGED",
            VerifierStatus::BinaryManifestFileChanged => "BINARY_MANIFEST_FILE_CHANGED",
        }
    }
}

impl fmt::Display for VerifierStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a verifier status name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verifier status '{0}'")]
pub struct UnknownVerifierStatus(pub String);

impl FromStr for VerifierStatus {
    type Err = UnknownVerifierStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        VerifierStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownVerifierStatus(s.to_string()))
    }
}
