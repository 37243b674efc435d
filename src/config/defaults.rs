//! Built-in ledger defaults (layer 1)
//!
//! Hardcoded defaults for all configuration values.

use serde::{Deserialize, Serialize};

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Durable ledger path (default: "build/swap/build-info.json")
    pub build_info: String,

    /// Temporary snapshot path (default: "build/swap/build-info.tmp.json")
    pub snapshot: String,

    /// Persistence mode for the durable ledger (default: "incremental-build")
    pub persistence: String,

    /// Coldswap mode (default: "auto")
    pub coldswap_mode: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            build_info: "build/swap/build-info.json".to_string(),
            snapshot: "build/swap/build-info.tmp.json".to_string(),
            persistence: "incremental-build".to_string(),
            coldswap_mode: "auto".to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "build_info": self.build_info,
            "snapshot": self.snapshot,
            "persistence": self.persistence,
            "target": {
                "coldswap_mode": self.coldswap_mode
            }
        })
    }
}
