//! Question validation and sanitisation

use crate::error::ValidationError;
use lazy_static::lazy_static;
use regex::Regex;

pub const MIN_QUESTION_CHARS: usize = 5;
pub const MAX_QUESTION_CHARS: usize = 1000;
pub const MIN_ALPHANUMERIC_CHARS: usize = 3;

lazy_static! {
    // `<script`, `javascript:`, inline event handlers (`onerror=`, `onload =`),
    // `<?php` and `eval(`. Handler names are listed so words like `one` or
    // `onde` followed by `=` still pass.
    static ref SUSPICIOUS_RE: Regex = Regex::new(
        r"(?i)<\s*script|javascript\s*:|\bon(?:error|load|click|dblclick|mouse[a-z]*|focus|blur|key[a-z]*|submit|change|input)\s*=|<\?php|\beval\s*\("
    )
    .unwrap();
}

/// Validate a raw question, returning the trimmed text on success.
///
/// Lengths are counted in characters, not bytes.
pub fn validate_question(raw: &str) -> Result<String, ValidationError> {
    let sanitized = raw.trim();
    if sanitized.is_empty() {
        return Err(ValidationError::Empty);
    }

    let chars = sanitized.chars().count();
    if chars < MIN_QUESTION_CHARS {
        return Err(ValidationError::TooShort {
            min: MIN_QUESTION_CHARS,
        });
    }
    if chars > MAX_QUESTION_CHARS {
        return Err(ValidationError::TooLong {
            max: MAX_QUESTION_CHARS,
        });
    }

    let alphanumeric = sanitized.chars().filter(|c| c.is_alphanumeric()).count();
    if alphanumeric < MIN_ALPHANUMERIC_CHARS {
        return Err(ValidationError::InsufficientAlphanumeric {
            min: MIN_ALPHANUMERIC_CHARS,
        });
    }

    if SUSPICIOUS_RE.is_match(sanitized) {
        return Err(ValidationError::SuspiciousContent);
    }

    Ok(sanitized.to_string())
}
