//! Ledger error types

use std::io;
use std::path::PathBuf;

use swap_policy::PolicyError;

use crate::codec::SchemaError;

/// Errors raised while recording, loading or persisting the ledger
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("ledger JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported ledger format: expected {expected}, found {found}")]
    UnsupportedFormat { expected: u32, found: u64 },

    #[error("ledger document has no format version")]
    MissingFormat,

    #[error("ledger document root must be an object")]
    NotAnObject,

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

impl LedgerError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        LedgerError::Io {
            path: path.into(),
            source,
        }
    }
}
