//! Swap Ledger - incremental build artifact ledger for hot-swap deployments
//!
//! This crate records what a build pipeline produced across successive
//! invocations of a hot-patch workflow, so that a deployer can decide which
//! files to push to a running target and which stale files to forget.

pub mod build;
pub mod codec;
pub mod config;
pub mod error;
pub mod ledger;
pub mod obs;
pub mod timing;

pub use build::{Artifact, Build, FileKind, VerifierStatus};
pub use codec::{LedgerDocument, PersistenceMode, FORMAT_VERSION};
pub use config::{EffectiveConfig, LedgerSettings};
pub use error::LedgerError;
pub use ledger::{Ledger, PurgeSummary};
pub use swap_policy::{ColdswapMode, PatchingPolicy, PlatformVersion};
pub use timing::TaskKind;
