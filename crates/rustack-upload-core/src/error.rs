//! The closed error taxonomy of the upload engine.
//!
//! Every failure a transfer can end with is an [`ErrorKind`], grouped by the
//! phase that produced it. Callers match on the phase enums exhaustively
//! instead of inspecting error types at runtime.
//!
//! # Usage
//!
//! ```
//! use rustack_upload_core::error::{ErrorKind, UploadError, error_code};
//!
//! let err = ErrorKind::from(UploadError::MultipartPartFailed {
//!     message: "503 Service Unavailable".to_owned(),
//!     part_number: 4,
//! });
//! assert_eq!(error_code(&err), "MultipartPartFailed");
//! assert!(!err.is_retryable());
//! ```

use serde::{Deserialize, Serialize};

use rustack_upload_auth::AuthError;

/// Any error a transfer, download, or client call can produce.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Planning or validation failed before any request was sent.
    #[error(transparent)]
    Init(#[from] InitError),

    /// The transport could not deliver a request.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The upload protocol failed or was interrupted.
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// A download failed.
    #[error(transparent)]
    Download(#[from] DownloadError),
}

// ---------------------------------------------------------------------------
// Init phase
// ---------------------------------------------------------------------------

/// Errors raised while validating inputs and planning a transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum InitError {
    /// A required parameter is missing or inconsistent.
    #[error("Missing or invalid parameters: {message}")]
    MissingParams {
        /// What is missing.
        message: String,
    },

    /// The requested part size is outside the provider's limits.
    #[error("Invalid part size {part_size}: must be between {min} and {max} bytes")]
    InvalidPartSize {
        /// The requested part size.
        part_size: u64,
        /// Smallest acceptable part size for this payload.
        min: u64,
        /// Largest acceptable part size.
        max: u64,
    },

    /// The payload exceeds the provider's maximum object size.
    #[error("File of {size} bytes exceeds the maximum object size of {max} bytes")]
    FileTooLarge {
        /// Payload size in bytes.
        size: u64,
        /// Provider maximum in bytes.
        max: u64,
    },

    /// The payload cannot be read as a sized byte source.
    #[error("Unsupported payload type: {message}")]
    UnsupportedPayloadType {
        /// Why the payload was rejected.
        message: String,
    },

    /// The provider answered an upload without an `ETag` header, usually
    /// because CORS does not expose it.
    #[error("Upload response does not expose the ETag header")]
    MissingEtagExposure,

    /// The destination object key is not acceptable.
    #[error("Invalid object key {key:?}: {reason}")]
    InvalidFileName {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Transport phase
// ---------------------------------------------------------------------------

/// Errors raised by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum HttpError {
    /// No HTTP client could be constructed.
    #[error("No transport available: {message}")]
    NoTransportAvailable {
        /// The construction failure.
        message: String,
    },

    /// The request failed, either on the wire or with an error status.
    #[error("Request failed{}: {message}", status_suffix(*.status))]
    RequestFailed {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Failure description.
        message: String,
    },

    /// The request was not sent because the transfer was canceled.
    #[error("Request canceled")]
    RequestCanceled,

    /// The request was not sent because the transfer was paused.
    #[error("Request paused")]
    RequestPaused,
}

// ---------------------------------------------------------------------------
// Upload phase
// ---------------------------------------------------------------------------

/// Errors raised while running the multipart protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum UploadError {
    /// The transfer was canceled by the caller.
    #[error("Upload canceled")]
    Canceled,

    /// The transfer is paused.
    #[error("Upload paused")]
    Paused,

    /// The credential expired or was rejected; supply a new one and resume.
    #[error("Credential expired: {message}")]
    CredentialExpired {
        /// Provider error code and message, when available.
        message: String,
    },

    /// A part could not be uploaded after bounded retries.
    #[error("Part {part_number} failed: {message}")]
    MultipartPartFailed {
        /// The last failure seen for this part.
        message: String,
        /// The failing part.
        part_number: u32,
    },

    /// The finalize request failed.
    #[error("Completion failed: {message}")]
    CompletionFailed {
        /// Failure description.
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Download phase
// ---------------------------------------------------------------------------

/// Errors raised on the read path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum DownloadError {
    /// The provider answered with a non-success status.
    #[error("Unexpected response code {status}: {message}")]
    UnexpectedResponseCode {
        /// HTTP status.
        status: u16,
        /// Provider error code and message.
        message: String,
    },

    /// The request could not be delivered.
    #[error("Download request failed: {message}")]
    RequestFailed {
        /// HTTP status, if a response was received.
        status: Option<u16>,
        /// Failure description.
        message: String,
    },
}

impl ErrorKind {
    /// Whether re-sending the same request may succeed.
    ///
    /// Only transport failures without a status or with a 5xx status qualify.
    /// Credential expiry is never retryable with the same credential.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(HttpError::RequestFailed { status, .. })
            | Self::Download(DownloadError::RequestFailed { status, .. }) => {
                status.is_none_or(|s| s >= 500)
            }
            _ => false,
        }
    }

    /// Whether the caller can continue this transfer after supplying a fresh
    /// credential.
    #[must_use]
    pub fn is_credential_expired(&self) -> bool {
        matches!(self, Self::Upload(UploadError::CredentialExpired { .. }))
    }
}

impl From<AuthError> for ErrorKind {
    fn from(err: AuthError) -> Self {
        InitError::MissingParams {
            message: err.to_string(),
        }
        .into()
    }
}

fn status_suffix(status: Option<u16>) -> String {
    status.map(|s| format!(" with status {s}")).unwrap_or_default()
}

/// Stable code for an error, suitable for logs and metrics labels.
///
/// Together with the `Display` message this yields the `(code, message)` pair
/// callers surface to users.
#[must_use]
pub fn error_code(err: &ErrorKind) -> &'static str {
    match err {
        ErrorKind::Init(e) => match e {
            InitError::MissingParams { .. } => "MissingParams",
            InitError::InvalidPartSize { .. } => "InvalidPartSize",
            InitError::FileTooLarge { .. } => "FileTooLarge",
            InitError::UnsupportedPayloadType { .. } => "UnsupportedPayloadType",
            InitError::MissingEtagExposure => "MissingEtagExposure",
            InitError::InvalidFileName { .. } => "InvalidFileName",
        },
        ErrorKind::Http(e) => match e {
            HttpError::NoTransportAvailable { .. } => "NoTransportAvailable",
            HttpError::RequestFailed { .. } => "RequestFailed",
            HttpError::RequestCanceled => "RequestCanceled",
            HttpError::RequestPaused => "RequestPaused",
        },
        ErrorKind::Upload(e) => match e {
            UploadError::Canceled => "Canceled",
            UploadError::Paused => "Paused",
            UploadError::CredentialExpired { .. } => "CredentialExpired",
            UploadError::MultipartPartFailed { .. } => "MultipartPartFailed",
            UploadError::CompletionFailed { .. } => "CompletionFailed",
        },
        ErrorKind::Download(e) => match e {
            DownloadError::UnexpectedResponseCode { .. } => "UnexpectedResponseCode",
            DownloadError::RequestFailed { .. } => "DownloadRequestFailed",
        },
    }
}
