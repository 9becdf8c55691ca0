//! Object key validation.

use crate::error::InitError;

/// Maximum object key length in bytes.
pub const MAX_KEY_BYTES: usize = 1023;

/// Validate a destination object key.
///
/// Rules:
/// - 1 to 1023 bytes of UTF-8
/// - must not start with `/` or `\`
/// - must not contain control characters
///
/// # Errors
///
/// Returns [`InitError::InvalidFileName`] describing the first violated rule.
///
/// # Examples
///
/// ```
/// use rustack_upload_core::validation::validate_object_key;
///
/// assert!(validate_object_key("videos/2026/launch.mp4").is_ok());
/// assert!(validate_object_key("/absolute.txt").is_err());
/// ```
pub fn validate_object_key(key: &str) -> Result<(), InitError> {
    let reject = |reason: &str| InitError::InvalidFileName {
        key: key.to_owned(),
        reason: reason.to_owned(),
    };

    if key.is_empty() {
        return Err(reject("object key must not be empty"));
    }
    if key.len() > MAX_KEY_BYTES {
        return Err(reject("object key exceeds 1023 bytes"));
    }
    if key.starts_with('/') || key.starts_with('\\') {
        return Err(reject("object key must not start with a slash"));
    }
    if key.chars().any(char::is_control) {
        return Err(reject("object key must not contain control characters"));
    }

    Ok(())
}
