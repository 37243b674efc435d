//! Coldswap mode requested by the build configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::PolicyError;

/// How code changes that cannot be hot-patched are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColdswapMode {
    /// Let the resolver pick based on platform version and target ABI.
    #[default]
    Auto,
    /// Replace individual code shards of the installed application.
    MultiShard,
    /// Install code-only split packages next to the main package.
    MultiSplit,
}

impl ColdswapMode {
    /// Stable configuration name of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColdswapMode::Auto => "auto",
            ColdswapMode::MultiShard => "multi-shard",
            ColdswapMode::MultiSplit => "multi-split",
        }
    }
}

impl fmt::Display for ColdswapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColdswapMode {
    type Err = PolicyError;

    /// Parse a mode name. Case and `_`/`-` separators are not significant,
    /// and the legacy `default` spelling maps to [`ColdswapMode::Auto`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('_', "-");
        match normalized.as_str() {
            "auto" | "default" => Ok(ColdswapMode::Auto),
            "multi-shard" | "multishard" => Ok(ColdswapMode::MultiShard),
            "multi-split" | "multisplit" => Ok(ColdswapMode::MultiSplit),
            _ => Err(PolicyError::UnknownColdswapMode(s.to_string())),
        }
    }
}
