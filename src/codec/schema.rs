//! Format gate for persisted ledgers
//!
//! Every ledger document carries an integer `format` and a `schema_id` of the
//! form `<prefix>@<format>`. The format is a hard compatibility gate: a reader
//! rejects any document whose format differs from [`FORMAT_VERSION`] instead of
//! attempting a best-effort parse. Bump the version whenever a field is
//! removed, renamed or changes meaning; adding an optional field does not
//! require a bump.

use serde_json::Value;

use crate::error::LedgerError;

/// Current ledger format version
pub const FORMAT_VERSION: u32 = 1;

/// Schema identifier written next to the format version
pub const SCHEMA_ID: &str = "swap-ledger/build_info@1";

/// Error type for schema identifier validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("invalid schema_id '{schema_id}': {reason}")]
    InvalidFormat { schema_id: String, reason: String },

    #[error("schema type mismatch: expected prefix '{expected_prefix}', got '{actual_prefix}' in schema_id '{schema_id}'")]
    TypeMismatch {
        expected_prefix: String,
        actual_prefix: String,
        schema_id: String,
    },

    #[error("schema major version mismatch: expected {expected}, got {actual}")]
    MajorVersionMismatch { expected: u32, actual: u32 },
}

/// Parsed schema identifier components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaId {
    /// Prefix/type portion (e.g., "swap-ledger/build_info")
    pub prefix: String,
    /// Major version number extracted from the @N suffix
    pub major_version: u32,
}

impl SchemaId {
    /// Parse `<prefix>@<major-version>`.
    pub fn parse(schema_id: &str) -> Result<Self, SchemaError> {
        let invalid = |reason: String| SchemaError::InvalidFormat {
            schema_id: schema_id.to_string(),
            reason,
        };

        let at_pos = schema_id
            .rfind('@')
            .ok_or_else(|| invalid("missing '@' delimiter before version number".to_string()))?;

        let prefix = &schema_id[..at_pos];
        let version_str = &schema_id[at_pos + 1..];

        if prefix.is_empty() {
            return Err(invalid("empty prefix before '@'".to_string()));
        }

        let major_version: u32 = version_str.parse().map_err(|_| {
            invalid(format!(
                "invalid major version '{}', expected integer",
                version_str
            ))
        })?;

        Ok(Self {
            prefix: prefix.to_string(),
            major_version,
        })
    }
}

/// Check that `actual` names the same document type and major version as `expected`.
pub fn validate_schema_compatibility(expected: &str, actual: &str) -> Result<(), SchemaError> {
    let expected_id = SchemaId::parse(expected)?;
    let actual_id = SchemaId::parse(actual)?;

    if expected_id.prefix != actual_id.prefix {
        return Err(SchemaError::TypeMismatch {
            expected_prefix: expected_id.prefix,
            actual_prefix: actual_id.prefix,
            schema_id: actual.to_string(),
        });
    }

    if expected_id.major_version != actual_id.major_version {
        return Err(SchemaError::MajorVersionMismatch {
            expected: expected_id.major_version,
            actual: actual_id.major_version,
        });
    }

    Ok(())
}

/// Run the format gate on a parsed document root.
///
/// This runs before full deserialization so that an unknown format is
/// reported as such rather than as a shape mismatch.
pub fn check_format(root: &Value) -> Result<(), LedgerError> {
    let object = root.as_object().ok_or(LedgerError::NotAnObject)?;

    let found = object
        .get("format")
        .and_then(Value::as_u64)
        .ok_or(LedgerError::MissingFormat)?;

    if found != u64::from(FORMAT_VERSION) {
        return Err(LedgerError::UnsupportedFormat {
            expected: FORMAT_VERSION,
            found,
        });
    }

    if let Some(schema_id) = object.get("schema_id").and_then(Value::as_str) {
        validate_schema_compatibility(SCHEMA_ID, schema_id)?;
    }

    Ok(())
}
