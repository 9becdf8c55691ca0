//! Multipart upload wire shapes.
//!
//! These mirror the XML documents exchanged with the provider. The finalize
//! manifest additionally derives `serde` so it can be sent as JSON to
//! providers that accept a JSON completion body.

use serde::{Deserialize, Serialize};

/// One `(part number, ETag)` entry of a finalize manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedPart {
    /// 1-based part number.
    pub part_number: u32,
    /// ETag returned by the provider for this part, quotes included.
    pub etag: String,
}

/// The finalize manifest (`<CompleteMultipartUpload>`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteMultipartUpload {
    /// Parts in the order they are written; callers sort by part number.
    pub parts: Vec<CompletedPart>,
}

impl CompleteMultipartUpload {
    /// Render the manifest as the JSON completion body.
    ///
    /// # Errors
    ///
    /// Returns [`serde_json::Error`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Response body of `POST /{key}?uploads`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitiateMultipartUploadResult {
    /// Bucket the upload was created in.
    pub bucket: Option<String>,
    /// Object key of the upload.
    pub key: Option<String>,
    /// Provider-assigned upload ID.
    pub upload_id: Option<String>,
}

/// Response body of `POST /{key}?uploadId=...`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompleteMultipartUploadResult {
    /// Public location of the finalized object.
    pub location: Option<String>,
    /// Bucket of the finalized object.
    pub bucket: Option<String>,
    /// Key of the finalized object.
    pub key: Option<String>,
    /// Final object ETag.
    pub etag: Option<String>,
}

/// A provider `<Error>` body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorResponse {
    /// Provider error code, e.g. `SecurityTokenExpired`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Provider request ID, useful in support tickets.
    pub request_id: Option<String>,
    /// Host ID of the serving node.
    pub host_id: Option<String>,
}
