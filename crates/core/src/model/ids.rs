//! Batch identifier generation and validation.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::error::BatchError;

static IDENTIFIER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,127}$").expect("identifier pattern is valid")
});

/// Generates a new batch id, e.g. `batch-20260101-3f9a0c1d2b4e`.
pub fn generate_batch_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("batch-{}-{}", Utc::now().format("%Y%m%d"), &uuid[..12])
}

/// Batch ids name directories on disk, so only a safe character set is allowed.
pub fn validate_batch_id(batch_id: &str) -> Result<(), BatchError> {
    validate_identifier("batch id", batch_id)
}

/// Checks that `value` is usable as a single path component.
pub fn validate_identifier(kind: &str, value: &str) -> Result<(), BatchError> {
    if value.contains("..") || !IDENTIFIER_PATTERN.is_match(value) {
        return Err(BatchError::Configuration(format!(
            "invalid {}: {:?}",
            kind, value
        )));
    }
    Ok(())
}
