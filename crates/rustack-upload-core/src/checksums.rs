//! Integrity checksums.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use md5::Digest;

/// Base64-encoded MD5 digest, the value of a `Content-MD5` header.
///
/// # Examples
///
/// ```
/// use rustack_upload_core::checksums::content_md5;
///
/// assert_eq!(content_md5(b""), "1B2M2Y8AsgTpgAmY7PhCfg==");
/// ```
#[must_use]
pub fn content_md5(data: &[u8]) -> String {
    BASE64.encode(md5::Md5::digest(data))
}
