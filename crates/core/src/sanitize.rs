//! Error message sanitizing for persisted job failures.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// Longest error message stored on a job, in characters.
pub const MAX_ERROR_LENGTH: usize = 500;

const REDACTED: &str = "[REDACTED]";

static BEARER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(bearer\s+)[^\s&"']+"#).expect("bearer pattern is valid")
});

static KEY_VALUE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(api_key|password|secret|token)=[^\s&"']+"#)
        .expect("key/value pattern is valid")
});

/// Reduces an executor error to a bounded, secret-free summary.
///
/// Keeps the first non-empty line, redacts credentials, and caps the result
/// at [`MAX_ERROR_LENGTH`] characters. Returns an empty string for blank input.
pub fn sanitize_error(message: &str) -> String {
    let first_line = message
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    let redacted = redact_secrets(first_line);
    truncate_chars(&redacted, MAX_ERROR_LENGTH)
}

/// Replaces bearer tokens and `key=value` credentials.
pub fn redact_secrets(text: &str) -> String {
    let text = BEARER_PATTERN.replace_all(text, format!("${{1}}{}", REDACTED).as_str());
    KEY_VALUE_PATTERN
        .replace_all(&text, format!("${{1}}={}", REDACTED).as_str())
        .into_owned()
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        None => text.to_string(),
        Some((cut, _)) => {
            let keep = text[..cut]
                .char_indices()
                .nth(max.saturating_sub(3))
                .map(|(i, _)| i)
                .unwrap_or(cut);
            format!("{}...", &text[..keep])
        }
    }
}
