//! Effective configuration with full provenance
//!
//! The effective config captures the merged configuration plus
//! information about where each value came from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use swap_policy::{ColdswapMode, PatchingPolicy, PlatformVersion};

use super::defaults::BuiltinDefaults;
use super::merge::merge_layers;
use crate::codec::PersistenceMode;
use crate::ledger::Ledger;

/// Schema version for effective_config
pub const SCHEMA_VERSION: u32 = 1;

/// Schema identifier
pub const SCHEMA_ID: &str = "swap-ledger/effective_config@1";

/// Origin of a configuration source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    Host,
    Repo,
    Cli,
}

/// A contributing config source with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    /// Origin of this source
    pub origin: ConfigOrigin,

    /// File path (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// SHA-256 digest of raw file bytes (None for builtin/cli)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Effective configuration with full provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When this config was computed
    pub created_at: DateTime<Utc>,

    /// The merged configuration object
    pub config: Value,

    /// Contributing sources in precedence order
    pub sources: Vec<ConfigSource>,
}

/// Target attributes used to resolve the patching policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSettings {
    pub platform_version: Option<PlatformVersion>,
    pub coldswap_mode: ColdswapMode,
    pub abi: Option<String>,
    pub density: Option<String>,
}

/// Typed view of the effective configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSettings {
    /// Durable ledger file
    pub build_info: PathBuf,
    /// Temporary snapshot file
    pub snapshot: PathBuf,
    /// Mode used when writing the durable ledger
    pub persistence: PersistenceMode,
    pub target: TargetSettings,
}

impl LedgerSettings {
    /// Configure a fresh ledger: snapshot path, density, and the patching
    /// policy when a platform version is known.
    ///
    /// Returns the resolved policy, if any. Without a platform version the
    /// ledger stays policy-less and records nothing.
    pub fn apply_to(&self, ledger: &Ledger) -> Option<PatchingPolicy> {
        ledger.set_snapshot_path(&self.snapshot);
        ledger.set_density(self.target.density.clone());
        let version = self.target.platform_version?;
        ledger.set_patching_enabled(true);
        Some(ledger.set_platform_version(
            version,
            Some(self.target.coldswap_mode),
            self.target.abi.as_deref(),
        ))
    }
}

impl EffectiveConfig {
    /// Build effective config from layers
    pub fn build(
        host_config_path: Option<&Path>,
        repo_config_path: Option<&Path>,
        cli_overrides: Option<Value>,
    ) -> Result<Self, ConfigError> {
        let mut layers = Vec::new();
        let mut sources = Vec::new();

        // Layer 1: Built-in defaults
        layers.push(BuiltinDefaults::default().to_value());
        sources.push(ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        });

        // Layers 2 and 3: host and repo files, skipped when absent
        for (origin, path) in [
            (ConfigOrigin::Host, host_config_path),
            (ConfigOrigin::Repo, repo_config_path),
        ] {
            if let Some(path) = path.filter(|p| p.exists()) {
                let (value, digest) = Self::load_toml_file(path)?;
                layers.push(value);
                sources.push(ConfigSource {
                    origin,
                    path: Some(path.to_string_lossy().to_string()),
                    digest: Some(digest),
                });
            }
        }

        // Layer 4: CLI overrides
        if let Some(cli) = cli_overrides {
            layers.push(cli);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let config = Self {
            schema_version: SCHEMA_VERSION,
            schema_id: SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            config: merge_layers(layers),
            sources,
        };

        config.settings()?;
        Ok(config)
    }

    /// Load and parse a TOML file, returning the value and digest
    fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = hex::encode(hasher.finalize());

        let contents = String::from_utf8(bytes)
            .map_err(|e| ConfigError::ParseError(format!("Invalid UTF-8: {}", e)))?;

        let toml_value: toml::Value = toml::from_str(&contents)
            .map_err(|e| ConfigError::ParseError(format!("TOML parse error: {}", e)))?;

        Ok((Self::toml_to_json(toml_value), digest))
    }

    /// Convert TOML Value to JSON Value
    fn toml_to_json(toml: toml::Value) -> Value {
        match toml {
            toml::Value::String(s) => Value::String(s),
            toml::Value::Integer(i) => Value::Number(i.into()),
            toml::Value::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            toml::Value::Boolean(b) => Value::Bool(b),
            toml::Value::Datetime(dt) => Value::String(dt.to_string()),
            toml::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Self::toml_to_json).collect())
            }
            toml::Value::Table(table) => Value::Object(
                table
                    .into_iter()
                    .map(|(k, v)| (k, Self::toml_to_json(v)))
                    .collect(),
            ),
        }
    }

    /// Extract and validate the typed settings
    pub fn settings(&self) -> Result<LedgerSettings, ConfigError> {
        let required_path = |key: &str| {
            self.get_str(key)
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .ok_or_else(|| ConfigError::ValidationError(format!("'{}' must be a non-empty path", key)))
        };

        let persistence: PersistenceMode = self
            .get_str("persistence")
            .unwrap_or_default()
            .parse()
            .map_err(|e| ConfigError::ValidationError(format!("{}", e)))?;
        if persistence == PersistenceMode::Temporary {
            return Err(ConfigError::ValidationError(
                "persistence 'temporary' is reserved for crash-recovery snapshots".to_string(),
            ));
        }

        let platform_version = match self.get("target.platform_version") {
            None => None,
            Some(value) => {
                let level = value
                    .as_u64()
                    .filter(|level| *level > 0 && *level <= u64::from(u32::MAX))
                    .ok_or_else(|| {
                        ConfigError::ValidationError(
                            "target.platform_version must be a positive integer".to_string(),
                        )
                    })?;
                Some(PlatformVersion::new(level as u32))
            }
        };

        let coldswap_mode = match self.get_str("target.coldswap_mode") {
            Some(mode) => mode
                .parse()
                .map_err(|e| ConfigError::ValidationError(format!("{}", e)))?,
            None => ColdswapMode::default(),
        };

        Ok(LedgerSettings {
            build_info: required_path("build_info")?,
            snapshot: required_path("snapshot")?,
            persistence,
            target: TargetSettings {
                platform_version,
                coldswap_mode,
                abi: self.get_str("target.abi").map(str::to_string),
                density: self.get_str("target.density").map(str::to_string),
            },
        })
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Get a config value by path (dot-separated)
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut current = &self.config;
        for part in path.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    /// Get a config value as u64
    pub fn get_u64(&self, path: &str) -> Option<u64> {
        self.get(path).and_then(|v| v.as_u64())
    }

    /// Get a config value as string
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(|v| v.as_str())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_build_with_defaults_only() {
        let config = EffectiveConfig::build(None, None, None).unwrap();
        let settings = config.settings().unwrap();

        assert_eq!(config.schema_id, SCHEMA_ID);
        assert_eq!(settings.build_info, PathBuf::from("build/swap/build-info.json"));
        assert_eq!(settings.persistence, PersistenceMode::IncrementalBuild);
        assert_eq!(settings.target.coldswap_mode, ColdswapMode::Auto);
        assert!(settings.target.platform_version.is_none());
    }

    #[test]
    fn test_repo_file_and_cli_override() {
        let mut repo = NamedTempFile::new().unwrap();
        writeln!(repo, "persistence = \"full-build\"").unwrap();
        writeln!(repo, "[target]").unwrap();
        writeln!(repo, "platform_version = 23").unwrap();
        writeln!(repo, "abi = \"x86_64\"").unwrap();

        let cli = serde_json::json!({"target": {"platform_version": 25, "density": null}});
        let config = EffectiveConfig::build(None, Some(repo.path()), Some(cli)).unwrap();
        let settings = config.settings().unwrap();

        assert_eq!(settings.persistence, PersistenceMode::FullBuild);
        assert_eq!(settings.target.platform_version, Some(PlatformVersion::new(25)));
        assert_eq!(settings.target.abi.as_deref(), Some("x86_64"));
        assert!(settings.target.density.is_none());

        assert_eq!(config.sources.len(), 3);
        assert_eq!(config.sources[1].origin, ConfigOrigin::Repo);
        assert_eq!(config.sources[1].digest.as_ref().map(|d| d.len()), Some(64));
    }

    #[test]
    fn test_missing_files_are_skipped() {
        let config = EffectiveConfig::build(
            Some(Path::new("/nonexistent/host.toml")),
            Some(Path::new("/nonexistent/repo.toml")),
            None,
        )
        .unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].origin, ConfigOrigin::Builtin);
    }

    #[test]
    fn test_rejects_temporary_persistence() {
        let cli = serde_json::json!({"persistence": "temporary"});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("temporary"));
    }

    #[test]
    fn test_rejects_zero_platform_version() {
        let cli = serde_json::json!({"target": {"platform_version": 0}});
        let err = EffectiveConfig::build(None, None, Some(cli)).unwrap_err();
        assert!(err.to_string().contains("platform_version"));
    }

    #[test]
    fn test_rejects_unknown_coldswap_mode() {
        let cli = serde_json::json!({"target": {"coldswap_mode": "multi-apk"}});
        assert!(EffectiveConfig::build(None, None, Some(cli)).is_err());
    }

    #[test]
    fn test_invalid_toml() {
        let mut repo = NamedTempFile::new().unwrap();
        writeln!(repo, "persistence = ").unwrap();
        let err = EffectiveConfig::build(None, Some(repo.path()), None).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_apply_to_ledger() {
        let cli = serde_json::json!({
            "snapshot": "out/snap.json",
            "target": {"platform_version": 24, "abi": "arm64-v8a", "density": "xxhdpi"}
        });
        let settings = EffectiveConfig::build(None, None, Some(cli))
            .unwrap()
            .settings()
            .unwrap();

        let ledger = Ledger::with_build_id(1);
        assert_eq!(settings.apply_to(&ledger), Some(PatchingPolicy::MultiSplit));
        assert_eq!(ledger.snapshot_path(), Some(PathBuf::from("out/snap.json")));
        assert_eq!(ledger.density().as_deref(), Some("xxhdpi"));
        assert!(ledger.is_patching_enabled());
    }

    #[test]
    fn test_apply_without_platform_version_leaves_ledger_inert() {
        let settings = EffectiveConfig::build(None, None, None)
            .unwrap()
            .settings()
            .unwrap();
        let ledger = Ledger::with_build_id(1);
        assert_eq!(settings.apply_to(&ledger), None);
        assert!(ledger.patching_policy().is_none());
        assert!(!ledger.is_patching_enabled());
    }
}
