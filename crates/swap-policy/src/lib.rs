//! Patching policy resolution for hot-swap deployments.
//!
//! The policy decides which artifact kinds a build tracks and how they are
//! pushed to a running target. It is a pure function of the target platform
//! version, the requested coldswap mode and whether a single target ABI is
//! known for the invocation.

mod mode;

pub use mode::ColdswapMode;

use serde::{Deserialize, Serialize};
use std::fmt;

/// First platform version able to apply live patches.
pub const LIVE_PATCH_MIN_VERSION: u32 = 21;

/// First platform version able to install code-only split packages.
pub const SPLIT_MIN_VERSION: u32 = 23;

/// First platform version where splits are preferred when the mode is `auto`.
pub const AUTO_SPLIT_MIN_VERSION: u32 = 24;

/// Errors for policy resolution inputs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    #[error("unknown coldswap mode '{0}' (expected auto, multi-shard or multi-split)")]
    UnknownColdswapMode(String),
}

/// Platform version (API level) of the deployment target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformVersion(pub u32);

impl PlatformVersion {
    pub fn new(level: u32) -> Self {
        Self(level)
    }

    pub fn level(&self) -> u32 {
        self.0
    }

    /// Whether the platform can apply patches to a live process at all.
    pub fn supports_live_patching(&self) -> bool {
        self.0 >= LIVE_PATCH_MIN_VERSION
    }
}

impl Default for PlatformVersion {
    fn default() -> Self {
        Self(1)
    }
}

impl fmt::Display for PlatformVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for PlatformVersion {
    fn from(level: u32) -> Self {
        Self(level)
    }
}

/// Strategy used to deliver code changes to a running target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PatchingPolicy {
    /// Platform predates live patching; only restart patches are tracked.
    PreLivePatch,
    /// Code is delivered as replacement shards of the installed package.
    MultiShard,
    /// Code is delivered as split packages installed next to the main one.
    MultiSplit,
}

impl PatchingPolicy {
    /// Resolve the policy for an invocation.
    ///
    /// Resolution table:
    /// - version below [`LIVE_PATCH_MIN_VERSION`]: `PreLivePatch`
    /// - `multi-shard`: `MultiShard`
    /// - `multi-split`: `MultiSplit` from [`SPLIT_MIN_VERSION`], else `MultiShard`
    /// - `auto`: `MultiSplit` from [`AUTO_SPLIT_MIN_VERSION`] when a single
    ///   target ABI is known, else `MultiShard`
    ///
    /// A multi-ABI build (no target ABI) cannot produce per-ABI splits, so it
    /// never lands on `MultiSplit` through `auto`.
    pub fn resolve(
        version: PlatformVersion,
        mode: Option<ColdswapMode>,
        target_abi: Option<&str>,
    ) -> Self {
        if !version.supports_live_patching() {
            return PatchingPolicy::PreLivePatch;
        }

        let has_target_abi = target_abi.map(|abi| !abi.trim().is_empty()).unwrap_or(false);

        match mode.unwrap_or_default() {
            ColdswapMode::MultiShard => PatchingPolicy::MultiShard,
            ColdswapMode::MultiSplit => {
                if version.level() >= SPLIT_MIN_VERSION {
                    PatchingPolicy::MultiSplit
                } else {
                    PatchingPolicy::MultiShard
                }
            }
            ColdswapMode::Auto => {
                if version.level() >= AUTO_SPLIT_MIN_VERSION && has_target_abi {
                    PatchingPolicy::MultiSplit
                } else {
                    PatchingPolicy::MultiShard
                }
            }
        }
    }

    /// Same as [`PatchingPolicy::resolve`] with the mode given by name.
    pub fn resolve_named(
        version: PlatformVersion,
        mode: Option<&str>,
        target_abi: Option<&str>,
    ) -> Result<Self, PolicyError> {
        let mode = mode.map(str::parse::<ColdswapMode>).transpose()?;
        Ok(Self::resolve(version, mode, target_abi))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatchingPolicy::PreLivePatch => "PRE_LIVE_PATCH",
            PatchingPolicy::MultiShard => "MULTI_SHARD",
            PatchingPolicy::MultiSplit => "MULTI_SPLIT",
        }
    }
}

impl fmt::Display for PatchingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(level: u32) -> PlatformVersion {
        PlatformVersion::new(level)
    }

    #[test]
    fn test_old_platform_is_pre_live_patch() {
        for mode in [None, Some(ColdswapMode::MultiSplit), Some(ColdswapMode::MultiShard)] {
            assert_eq!(
                PatchingPolicy::resolve(v(19), mode, Some("arm64-v8a")),
                PatchingPolicy::PreLivePatch
            );
        }
    }

    #[test]
    fn test_explicit_multi_shard() {
        assert_eq!(
            PatchingPolicy::resolve(v(26), Some(ColdswapMode::MultiShard), Some("x86")),
            PatchingPolicy::MultiShard
        );
    }

    #[test]
    fn test_explicit_multi_split_needs_split_support() {
        assert_eq!(
            PatchingPolicy::resolve(v(22), Some(ColdswapMode::MultiSplit), None),
            PatchingPolicy::MultiShard
        );
        assert_eq!(
            PatchingPolicy::resolve(v(23), Some(ColdswapMode::MultiSplit), None),
            PatchingPolicy::MultiSplit
        );
    }

    #[test]
    fn test_auto_requires_target_abi_for_splits() {
        assert_eq!(
            PatchingPolicy::resolve(v(24), None, Some("arm64-v8a")),
            PatchingPolicy::MultiSplit
        );
        assert_eq!(PatchingPolicy::resolve(v(24), None, None), PatchingPolicy::MultiShard);
        assert_eq!(
            PatchingPolicy::resolve(v(24), Some(ColdswapMode::Auto), Some("  ")),
            PatchingPolicy::MultiShard
        );
        assert_eq!(
            PatchingPolicy::resolve(v(23), None, Some("arm64-v8a")),
            PatchingPolicy::MultiShard
        );
    }

    #[test]
    fn test_resolve_named() {
        assert_eq!(
            PatchingPolicy::resolve_named(v(25), Some("multi_split"), None).unwrap(),
            PatchingPolicy::MultiSplit
        );
        assert!(PatchingPolicy::resolve_named(v(25), Some("bogus"), None).is_err());
    }

    #[test]
    fn test_default_platform_version() {
        assert_eq!(PlatformVersion::default().level(), 1);
        assert!(!PlatformVersion::default().supports_live_patching());
    }

    #[test]
    fn test_policy_serde_name() {
        let json = serde_json::to_string(&PatchingPolicy::MultiSplit).unwrap();
        assert_eq!(json, "\"MULTI_SPLIT\"");
        assert_eq!(PatchingPolicy::MultiSplit.to_string(), "MULTI_SPLIT");
    }
}
