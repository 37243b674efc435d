//! Persisted ledger document (build-info.json)
//!
//! Layout of the document root:
//! - `format` / `schema_id`: the compatibility gate (see [`schema`])
//! - `platform_version`, `density`, `abi`: target attributes, when known
//! - `tasks`: one `{name, duration}` entry per tracked task kind
//! - `timestamp`, `verifier`, `artifacts`: the newest build, inline
//! - `builds`: historical builds, same shape as the inline one
//!
//! Which historical builds are emitted depends on the [`PersistenceMode`].

mod schema;

pub use schema::{
    check_format, validate_schema_compatibility, SchemaError, SchemaId, FORMAT_VERSION, SCHEMA_ID,
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::ffi::OsString;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use swap_policy::PlatformVersion;

use crate::build::Build;
use crate::error::LedgerError;

/// Which builds a serialized ledger carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistenceMode {
    /// Final full build: current build plus only the most recent historical
    /// build; the current verifier status is cleared first
    #[default]
    FullBuild,
    /// Final incremental build: current build plus every historical build
    IncrementalBuild,
    /// Crash-recovery snapshot: current build only
    Temporary,
}

impl PersistenceMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersistenceMode::FullBuild => "full-build",
            PersistenceMode::IncrementalBuild => "incremental-build",
            PersistenceMode::Temporary => "temporary",
        }
    }
}

impl fmt::Display for PersistenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a persistence mode name is not recognized
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown persistence mode '{0}' (expected full-build, incremental-build or temporary)")]
pub struct UnknownPersistenceMode(pub String);

impl FromStr for PersistenceMode {
    type Err = UnknownPersistenceMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "full-build" | "full" => Ok(PersistenceMode::FullBuild),
            "incremental-build" | "incremental" => Ok(PersistenceMode::IncrementalBuild),
            "temporary" | "temp" | "temp-build" => Ok(PersistenceMode::Temporary),
            _ => Err(UnknownPersistenceMode(s.to_string())),
        }
    }
}

/// Duration of one task kind during the invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub name: String,
    /// Duration in milliseconds
    pub duration: u64,
}

/// Serialized form of a ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerDocument {
    /// Format version (compatibility gate)
    pub format: u32,

    /// Schema identifier
    #[serde(default = "default_schema_id")]
    pub schema_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform_version: Option<PlatformVersion>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub density: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abi: Option<String>,

    /// Task timings; invocation-local
    #[serde(default)]
    pub tasks: Vec<TaskRecord>,

    /// The newest build, serialized inline in the root
    #[serde(flatten)]
    pub current: Build,

    /// Historical builds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub builds: Vec<Build>,
}

fn default_schema_id() -> String {
    SCHEMA_ID.to_string()
}

impl LedgerDocument {
    /// Create a document for the current build with no history
    pub fn new(current: Build) -> Self {
        Self {
            format: FORMAT_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            platform_version: None,
            density: None,
            abi: None,
            tasks: Vec::new(),
            current,
            builds: Vec::new(),
        }
    }

    /// Every build in the document: the inline one, then the historical ones
    pub fn all_builds(&self) -> impl Iterator<Item = &Build> {
        std::iter::once(&self.current).chain(self.builds.iter())
    }

    /// Historical builds other than the inline one.
    ///
    /// A closed ledger also carries its newest build in `builds`.
    pub fn history(&self) -> impl Iterator<Item = &Build> {
        let current_id = self.current.id();
        self.builds.iter().filter(move |build| build.id() != current_id)
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String, LedgerError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a document, enforcing the format gate first
    pub fn from_json(json: &str) -> Result<Self, LedgerError> {
        let root: Value = serde_json::from_str(json)?;
        check_format(&root)?;
        Ok(serde_json::from_value(root)?)
    }

    /// Load a document from a file; a missing file yields `None`
    pub fn from_file(path: &Path) -> Result<Option<Self>, LedgerError> {
        let json = match fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LedgerError::io(path, e)),
        };
        Self::from_json(&json).map(Some)
    }

    /// Write to file (write-then-rename), creating parent directories
    pub fn write_to_file(&self, path: &Path) -> Result<(), LedgerError> {
        write_atomically(path, &self.to_json()?)
    }
}

pub(crate) fn write_atomically(path: &Path, contents: &str) -> Result<(), LedgerError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| LedgerError::io(parent, e))?;
    }

    let temp_path = temp_path_for(path);
    fs::write(&temp_path, contents).map_err(|e| LedgerError::io(&temp_path, e))?;
    fs::rename(&temp_path, path).map_err(|e| LedgerError::io(path, e))?;

    Ok(())
}

/// Sibling of `path` with `.tmp` appended to the full file name
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::{FileKind, VerifierStatus};
    use serde_json::json;
    use tempfile::TempDir;

    fn sample() -> LedgerDocument {
        let mut doc = LedgerDocument::new(
            Build::with_status(300, VerifierStatus::Compatible)
                .with_artifact(FileKind::ReloadPatch, "reload.dex"),
        );
        doc.platform_version = Some(PlatformVersion::new(24));
        doc.abi = Some("arm64-v8a".to_string());
        doc.tasks.push(TaskRecord {
            name: "compile".to_string(),
            duration: 12,
        });
        doc.builds
            .push(Build::new(100).with_artifact(FileKind::Main, "app.apk"));
        doc
    }

    #[test]
    fn test_root_layout() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["format"], FORMAT_VERSION);
        assert_eq!(value["schema_id"], SCHEMA_ID);
        assert_eq!(value["platform_version"], 24);
        assert_eq!(value["timestamp"], 300);
        assert_eq!(value["verifier"], "COMPATIBLE");
        assert_eq!(value["artifacts"][0]["type"], "RELOAD_PATCH");
        assert_eq!(value["builds"][0]["timestamp"], 100);
        assert_eq!(value["tasks"][0]["name"], "compile");
        assert!(value.get("density").is_none());
    }

    #[test]
    fn test_parse_written_document() {
        let doc = sample();
        let parsed = LedgerDocument::from_json(&doc.to_json().unwrap()).unwrap();
        assert_eq!(parsed, doc);
        assert_eq!(parsed.all_builds().count(), 2);
    }

    #[test]
    fn test_parse_minimal_document() {
        let json = json!({"format": FORMAT_VERSION, "timestamp": 5}).to_string();
        let doc = LedgerDocument::from_json(&json).unwrap();
        assert_eq!(doc.current.id(), 5);
        assert!(doc.current.is_empty());
        assert!(doc.builds.is_empty());
        assert_eq!(doc.schema_id, SCHEMA_ID);
    }

    #[test]
    fn test_parse_rejects_unknown_format() {
        let json = json!({"format": 2, "timestamp": 5}).to_string();
        assert!(matches!(
            LedgerDocument::from_json(&json),
            Err(LedgerError::UnsupportedFormat { found: 2, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(matches!(
            LedgerDocument::from_json("<instant-run/>"),
            Err(LedgerError::Json(_))
        ));
        let bad_kind = json!({
            "format": FORMAT_VERSION,
            "timestamp": 5,
            "artifacts": [{"type": "DEX", "location": "a"}]
        })
        .to_string();
        assert!(matches!(
            LedgerDocument::from_json(&bad_kind),
            Err(LedgerError::Json(_))
        ));
    }

    #[test]
    fn test_file_roundtrip_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out/build-info.json");
        let doc = sample();
        doc.write_to_file(&path).unwrap();
        assert!(!dir.path().join("nested/out/build-info.json.tmp").exists());

        let loaded = LedgerDocument::from_file(&path).unwrap().unwrap();
        assert_eq!(loaded, doc);
    }

    #[test]
    fn test_history_skips_inline_build() {
        let mut doc = sample();
        doc.builds.push(doc.current.clone());
        let ids: Vec<u64> = doc.history().map(|b| b.id()).collect();
        assert_eq!(ids, vec![100]);
        assert_eq!(doc.all_builds().count(), 3);
    }

    #[test]
    fn test_write_leaves_stem_tmp_sibling_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build-info.json");
        let snapshot = dir.path().join("build-info.tmp");
        fs::write(&snapshot, "snapshot").unwrap();

        sample().write_to_file(&path).unwrap();

        assert_eq!(fs::read_to_string(&snapshot).unwrap(), "snapshot");
        assert_eq!(
            temp_path_for(&path),
            dir.path().join("build-info.json.tmp")
        );
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(LedgerDocument::from_file(&dir.path().join("absent.json"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_persistence_mode_names() {
        assert_eq!(
            "incremental_build".parse::<PersistenceMode>().unwrap(),
            PersistenceMode::IncrementalBuild
        );
        assert_eq!(PersistenceMode::default(), PersistenceMode::FullBuild);
        assert_eq!(
            serde_json::to_string(&PersistenceMode::Temporary).unwrap(),
            "\"temporary\""
        );
        assert!("partial".parse::<PersistenceMode>().is_err());
    }
}
