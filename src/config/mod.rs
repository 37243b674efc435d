//! Configuration merge system
//!
//! Implements the 4-layer configuration merge:
//! 1. Built-in defaults
//! 2. Host/user config (~/.config/swap/ledger.toml)
//! 3. Repo config (.swap/ledger.toml)
//! 4. CLI flags

mod defaults;
mod effective;
mod merge;

pub use defaults::BuiltinDefaults;
pub use effective::{
    ConfigError, ConfigOrigin, ConfigSource, EffectiveConfig, LedgerSettings, TargetSettings,
};
pub use merge::{deep_merge, merge_layers};

use std::path::PathBuf;

/// Default repo config location, relative to the project root
pub const REPO_CONFIG_PATH: &str = ".swap/ledger.toml";

/// Default host config location (`~/.config/swap/ledger.toml`)
pub fn default_host_config_path() -> Option<PathBuf> {
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/swap/ledger.toml"))
}
