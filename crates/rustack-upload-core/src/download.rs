//! Signed object reads.

use std::ops::RangeInclusive;

use bytes::Bytes;
use http::Method;
use http::header::RANGE;
use tracing::debug;

use rustack_upload_auth::ProviderRequest;

use crate::dispatch::{CredentialSlot, Dispatcher, RetryPolicy, SendError};
use crate::error::{DownloadError, ErrorKind};

/// `GET` the object, or the inclusive byte `range` of it.
///
/// Transient failures are retried like part uploads.
pub(crate) async fn get_object(
    dispatcher: &Dispatcher,
    credentials: &CredentialSlot,
    bucket: &str,
    key: &str,
    range: Option<RangeInclusive<u64>>,
) -> Result<Bytes, ErrorKind> {
    let mut request = ProviderRequest::new(Method::GET, bucket, key);
    if let Some(range) = &range {
        request.header(
            RANGE.as_str(),
            &format!("bytes={}-{}", range.start(), range.end()),
        )?;
    }

    let policy = RetryPolicy {
        attempts: dispatcher.config().part_retry_attempts.saturating_add(1),
        timeout: dispatcher.config().request_timeout(),
    };
    let response = dispatcher
        .send(credentials, &request, Bytes::new(), policy, None)
        .await
        .map_err(|err| match err {
            err @ (SendError::CredentialExpired(_) | SendError::CredentialRejected) => {
                err.into_error(|status, message| DownloadError::RequestFailed { status, message }.into())
            }
            SendError::Failed {
                status: Some(status),
                message,
            } => DownloadError::UnexpectedResponseCode { status, message }.into(),
            SendError::Failed {
                status: None,
                message,
            } => DownloadError::RequestFailed {
                status: None,
                message,
            }
            .into(),
            SendError::Interrupted(err) => DownloadError::RequestFailed {
                status: None,
                message: err.to_string(),
            }
            .into(),
            SendError::Invalid(err) => err,
        })?;

    debug!(key, bytes = response.body.len(), range = ?range, "Object downloaded");
    Ok(response.body)
}
