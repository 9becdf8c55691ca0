//! Content-Type resolution.
//!
//! An explicit content type wins; otherwise the type is sniffed from the
//! extension of the object key, then of the payload file name, falling back
//! to `application/octet-stream`.

use mime::Mime;

use crate::error::InitError;

/// Resolve the `Content-Type` sent with the object.
///
/// # Errors
///
/// Returns [`InitError::MissingParams`] if `explicit` is not a valid MIME type.
///
/// # Examples
///
/// ```
/// use rustack_upload_core::content_type::resolve_content_type;
///
/// assert_eq!(resolve_content_type(None, "photos/cat.JPG", None).unwrap(), "image/jpeg");
/// assert_eq!(
///     resolve_content_type(None, "blob", None).unwrap(),
///     "application/octet-stream"
/// );
/// ```
pub fn resolve_content_type(
    explicit: Option<&str>,
    key: &str,
    file_name: Option<&str>,
) -> Result<String, InitError> {
    if let Some(value) = explicit {
        let parsed: Mime = value.parse().map_err(|e| InitError::MissingParams {
            message: format!("invalid content type {value:?}: {e}"),
        })?;
        return Ok(parsed.to_string());
    }

    let sniffed = sniff(key)
        .or_else(|| file_name.and_then(sniff))
        .unwrap_or(mime::APPLICATION_OCTET_STREAM);
    Ok(sniffed.to_string())
}

/// Guess a MIME type from the extension of `name`.
fn sniff(name: &str) -> Option<Mime> {
    let (_, ext) = name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    let known = match ext.as_str() {
        "jpg" | "jpeg" => mime::IMAGE_JPEG,
        "png" => mime::IMAGE_PNG,
        "gif" => mime::IMAGE_GIF,
        "bmp" => mime::IMAGE_BMP,
        "svg" => mime::IMAGE_SVG,
        "txt" | "log" => mime::TEXT_PLAIN,
        "htm" | "html" => mime::TEXT_HTML,
        "css" => mime::TEXT_CSS,
        "csv" => mime::TEXT_CSV,
        "xml" => mime::TEXT_XML,
        "js" | "mjs" => mime::TEXT_JAVASCRIPT,
        "json" => mime::APPLICATION_JSON,
        "pdf" => mime::APPLICATION_PDF,
        "woff" => mime::FONT_WOFF,
        "woff2" => mime::FONT_WOFF2,
        other => return other_type(other).and_then(|t| t.parse().ok()),
    };
    Some(known)
}

fn other_type(ext: &str) -> Option<&'static str> {
    let essence = match ext {
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",
        "apk" => "application/vnd.android.package-archive",
        _ => return None,
    };
    Some(essence)
}
