//! Finalization and abort.
//!
//! [`complete`] sends the sorted part manifest and checks that the provider
//! finalized the object we asked for. [`abort`] releases an upload ID and the
//! parts stored under it.

use bytes::Bytes;
use http::Method;
use http::header::{CONTENT_TYPE, ETAG};
use tracing::{debug, info, warn};

use rustack_upload_auth::ProviderRequest;
use rustack_upload_xml::{CompleteMultipartUploadResult, from_xml, to_xml};

use crate::checksums::content_md5;
use crate::classify::parse_error_body;
use crate::config::ManifestFormat;
use crate::dispatch::{CredentialSlot, Dispatcher, RetryPolicy};
use crate::error::{ErrorKind, HttpError, InitError, UploadError};
use crate::task::ObjectRef;
use crate::transfer::TransferContext;

/// Finalize the multipart upload in `ctx`.
///
/// The request is sent once: a finalize that times out may still have
/// succeeded on the provider side.
pub(crate) async fn complete(ctx: &TransferContext) -> Result<ObjectRef, ErrorKind> {
    let (upload_id, manifest) = {
        let task = ctx.task.lock();
        let upload_id = task
            .upload_id()
            .map(ToOwned::to_owned)
            .ok_or_else(|| InitError::MissingParams {
                message: "multipart upload has no upload id".to_owned(),
            })?;
        (upload_id, task.manifest())
    };

    let config = ctx.dispatcher.config();
    let provider = ctx.dispatcher.provider();
    let encode_failed = |e: String| UploadError::CompletionFailed {
        message: format!("cannot encode manifest: {e}"),
    };
    let (body, content_type) = match config.manifest_format {
        ManifestFormat::Xml => (
            to_xml("CompleteMultipartUpload", provider.xml_namespace(), &manifest)
                .map_err(|e| encode_failed(e.to_string()))?,
            "application/xml",
        ),
        ManifestFormat::Json => (
            manifest.to_json().map_err(|e| encode_failed(e.to_string()))?,
            "application/json",
        ),
    };

    let mut request = ctx.request(Method::POST);
    request.sub_resource("uploadId", Some(&upload_id));
    request.header(CONTENT_TYPE.as_str(), content_type)?;
    if config.content_md5 {
        request.header("content-md5", &content_md5(&body))?;
    }
    ctx.apply_callback(&mut request)?;

    info!(
        key = %ctx.key,
        upload_id = %upload_id,
        parts = manifest.parts.len(),
        format = %config.manifest_format,
        "Completing multipart upload"
    );

    let response = ctx
        .dispatcher
        .send(
            &ctx.credentials,
            &request,
            Bytes::from(body),
            RetryPolicy::once(config.request_timeout()),
            Some(&ctx.control),
        )
        .await
        .map_err(|err| {
            err.into_error(|status, message| {
                UploadError::CompletionFailed {
                    message: match status {
                        Some(status) => format!("{status}: {message}"),
                        None => message,
                    },
                }
                .into()
            })
        })?;

    // Some providers report a failed finalize in a 200 body.
    if let Some(err) = parse_error_body(&response) {
        return Err(UploadError::CompletionFailed {
            message: format!("{}: {}", err.code, err.message),
        }
        .into());
    }

    let header_etag = response.header(ETAG.as_str()).map(ToOwned::to_owned);
    // With a callback the body is the callback server's answer.
    let result = if ctx.settings.callback.is_some() || response.body.is_empty() {
        None
    } else {
        match from_xml::<CompleteMultipartUploadResult>(&response.body) {
            Ok(result) => Some(result),
            Err(e) => {
                debug!(error = %e, "Finalize response is not a completion result");
                None
            }
        }
    };

    let location_fallback = ctx.dispatcher.endpoint().object_url(&request);
    let object = match result {
        Some(result) => verify(ctx, result, header_etag, location_fallback)?,
        None => ObjectRef {
            bucket: ctx.bucket.clone(),
            key: ctx.key.clone(),
            etag: header_etag,
            location: Some(location_fallback),
        },
    };

    info!(key = %object.key, etag = ?object.etag, "Multipart upload completed");
    Ok(object)
}

fn verify(
    ctx: &TransferContext,
    result: CompleteMultipartUploadResult,
    header_etag: Option<String>,
    location_fallback: String,
) -> Result<ObjectRef, ErrorKind> {
    if let Some(key) = result.key.as_deref() {
        if key != ctx.key {
            return Err(UploadError::CompletionFailed {
                message: format!("provider finalized key {key:?}, expected {:?}", ctx.key),
            }
            .into());
        }
    }
    if let Some(bucket) = result.bucket.as_deref() {
        if bucket != ctx.bucket {
            return Err(UploadError::CompletionFailed {
                message: format!(
                    "provider finalized bucket {bucket:?}, expected {:?}",
                    ctx.bucket
                ),
            }
            .into());
        }
    }

    Ok(ObjectRef {
        bucket: ctx.bucket.clone(),
        key: ctx.key.clone(),
        etag: result.etag.or(header_etag),
        location: result.location.or(Some(location_fallback)),
    })
}

/// Abort `upload_id`, discarding its stored parts. Sent once.
pub(crate) async fn abort(
    dispatcher: &Dispatcher,
    credentials: &CredentialSlot,
    bucket: &str,
    key: &str,
    upload_id: &str,
) -> Result<(), ErrorKind> {
    let mut request = ProviderRequest::new(Method::DELETE, bucket, key);
    request.sub_resource("uploadId", Some(upload_id));

    dispatcher
        .send(
            credentials,
            &request,
            Bytes::new(),
            RetryPolicy::once(dispatcher.config().request_timeout()),
            None,
        )
        .await
        .map_err(|err| {
            err.into_error(|status, message| HttpError::RequestFailed { status, message }.into())
        })?;

    info!(key, upload_id, "Multipart upload aborted");
    Ok(())
}

/// Abort without surfacing failures; the upload ID simply expires on the
/// provider side.
pub(crate) async fn abort_quietly(
    dispatcher: &Dispatcher,
    credentials: &CredentialSlot,
    bucket: &str,
    key: &str,
    upload_id: &str,
) {
    if let Err(err) = abort(dispatcher, credentials, bucket, key, upload_id).await {
        warn!(key, upload_id, error = %err, "Failed to abort multipart upload");
    }
}
