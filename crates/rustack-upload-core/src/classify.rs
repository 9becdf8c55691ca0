//! Response classification.
//!
//! Maps a transport outcome onto what the engine should do next: accept it,
//! retry it, stop for a new credential, or give up.

use http::StatusCode;
use http::header::ETAG;

use rustack_upload_xml::{ErrorResponse, from_xml};

use crate::error::InitError;
use crate::transport::{TransportError, TransportResponse};

/// What a single attempt produced.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// 2xx response.
    Success(TransportResponse),
    /// 403: the credential is expired or was rejected.
    CredentialExpired(String),
    /// Worth another attempt: timeout, connection failure, 5xx, 408, 429.
    Transient {
        status: Option<u16>,
        message: String,
    },
    /// Any other error status.
    Fatal { status: u16, message: String },
}

/// Classify the result of one attempt.
pub(crate) fn classify(result: Result<TransportResponse, TransportError>) -> Outcome {
    let response = match result {
        Ok(response) => response,
        Err(err) => {
            return Outcome::Transient {
                status: None,
                message: err.to_string(),
            };
        }
    };

    let status = response.status;
    if status.is_success() {
        return Outcome::Success(response);
    }

    let message = describe_failure(&response);
    match status {
        StatusCode::FORBIDDEN => Outcome::CredentialExpired(message),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => Outcome::Transient {
            status: Some(status.as_u16()),
            message,
        },
        s if s.is_server_error() => Outcome::Transient {
            status: Some(s.as_u16()),
            message,
        },
        s => Outcome::Fatal {
            status: s.as_u16(),
            message,
        },
    }
}

/// Human-readable failure text: the provider `<Error>` code and message when
/// the body carries one, otherwise the status line.
pub(crate) fn describe_failure(response: &TransportResponse) -> String {
    match parse_error_body(response) {
        Some(err) if err.request_id.is_some() => format!(
            "{}: {} (request id {})",
            err.code,
            err.message,
            err.request_id.as_deref().unwrap_or_default()
        ),
        Some(err) => format!("{}: {}", err.code, err.message),
        None => response.status.to_string(),
    }
}

pub(crate) fn parse_error_body(response: &TransportResponse) -> Option<ErrorResponse> {
    if response.body.is_empty() {
        return None;
    }
    from_xml::<ErrorResponse>(&response.body)
        .ok()
        .filter(|e| !e.code.is_empty())
}

/// The `ETag` header of a successful upload.
pub(crate) fn etag(response: &TransportResponse) -> Result<String, InitError> {
    response
        .headers
        .get(ETAG)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
        .ok_or(InitError::MissingEtagExposure)
}
