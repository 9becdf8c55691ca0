//! Part upload coordination.
//!
//! Dispatches the pending parts of a multipart upload with at most
//! `concurrency` requests in flight. Results are recorded by the dispatch
//! loop itself, so the task has a single writer no matter how many uploads
//! run at once.
//!
//! Dispatch stops when the transfer is paused or canceled, or after the
//! first fatal part failure. Parts already in flight always drain before the
//! coordinator returns. A rejected credential fails the task as soon as the
//! rejecting part is joined; the parts still draining make no further
//! attempts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use http::Method;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::checksums::content_md5;
use crate::classify;
use crate::dispatch::SendError;
use crate::error::{ErrorKind, InitError, UploadError};
use crate::state::TransferEvent;
use crate::planner::PartDescriptor;
use crate::task::PartResult;
use crate::transfer::TransferContext;

/// How a dispatch round ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DispatchOutcome {
    /// Every planned part has a result.
    Finished,
    /// Dispatch stopped for a pause; some parts are still pending.
    Halted,
}

#[derive(Debug)]
enum PartError {
    /// Not sent because the transfer was paused or canceled, or its
    /// credential was already rejected. The part stays pending.
    Interrupted,
    Failed(ErrorKind),
}

/// Upload every pending part of the task in `ctx`.
///
/// # Errors
///
/// Returns the first fatal part failure (a credential expiry wins over other
/// failures), or [`UploadError::Canceled`] if the transfer was canceled.
pub(crate) async fn upload_parts(ctx: &Arc<TransferContext>) -> Result<DispatchOutcome, ErrorKind> {
    let (upload_id, mut queue) = {
        let task = ctx.task.lock();
        let upload_id = task
            .upload_id()
            .map(Arc::<str>::from)
            .ok_or_else(|| InitError::MissingParams {
                message: "multipart upload has no upload id".to_owned(),
            })?;
        (upload_id, VecDeque::from(task.pending_parts()))
    };

    let limit = ctx.settings.concurrency.max(1);
    info!(
        key = %ctx.key,
        upload_id = %upload_id,
        pending = queue.len(),
        concurrency = limit,
        "Dispatching parts"
    );

    let mut in_flight = JoinSet::new();
    let mut parts_by_task = HashMap::new();
    let mut failure: Option<ErrorKind> = None;

    loop {
        while failure.is_none() && !ctx.control.is_halted() && in_flight.len() < limit {
            let Some(part) = queue.pop_front() else {
                break;
            };
            let task_ctx = Arc::clone(ctx);
            let task_upload_id = Arc::clone(&upload_id);
            let handle =
                in_flight.spawn(async move { upload_part(&task_ctx, &task_upload_id, part).await });
            parts_by_task.insert(handle.id(), part.part_number);
        }

        let Some(joined) = in_flight.join_next_with_id().await else {
            break;
        };

        let (part_number, result) = match joined {
            Ok((id, result)) => (parts_by_task.remove(&id).unwrap_or_default(), result),
            Err(err) => {
                let part_number = parts_by_task.remove(&err.id()).unwrap_or_default();
                let message = if err.is_panic() {
                    "part upload panicked".to_owned()
                } else {
                    "part upload was aborted".to_owned()
                };
                (
                    part_number,
                    Err(PartError::Failed(
                        UploadError::MultipartPartFailed {
                            message,
                            part_number,
                        }
                        .into(),
                    )),
                )
            }
        };

        match result {
            Ok(part) => {
                let length = part.byte_length;
                if ctx.task.lock().record(part) {
                    debug!(part_number, length, "Recorded part");
                }
            }
            Err(PartError::Interrupted) => {
                debug!(part_number, "Part left pending");
            }
            Err(PartError::Failed(err)) => {
                warn!(part_number, error = %err, "Part failed, stopping dispatch");
                if err.is_credential_expired() {
                    fail_now(ctx, &err);
                }
                failure = Some(match failure.take() {
                    Some(first) if first.is_credential_expired() || !err.is_credential_expired() => {
                        first
                    }
                    _ => err,
                });
            }
        }
    }

    if let Some(err) = failure {
        return Err(err);
    }
    if ctx.control.is_canceled() {
        return Err(UploadError::Canceled.into());
    }
    if ctx.task.lock().is_complete() {
        Ok(DispatchOutcome::Finished)
    } else {
        Ok(DispatchOutcome::Halted)
    }
}

/// Move the task to `Failed` without waiting for in-flight parts.
fn fail_now(ctx: &TransferContext, err: &ErrorKind) {
    let mut task = ctx.task.lock();
    if !task.state().is_terminal() && task.apply(TransferEvent::Fail(err.clone())).is_ok() {
        warn!(key = %ctx.key, error = %err, "Transfer failed, draining in-flight parts");
    }
}

async fn upload_part(
    ctx: &TransferContext,
    upload_id: &str,
    part: PartDescriptor,
) -> Result<PartResult, PartError> {
    let part_number = part.part_number;
    let part_failed = |message: String| -> ErrorKind {
        UploadError::MultipartPartFailed {
            message,
            part_number,
        }
        .into()
    };

    let body = ctx
        .payload
        .read_range(part.offset, part.length)
        .await
        .map_err(|e| PartError::Failed(part_failed(format!("cannot read part: {e}"))))?;

    let mut request = ctx.request(Method::PUT);
    request.sub_resource("partNumber", Some(&part_number.to_string()));
    request.sub_resource("uploadId", Some(upload_id));
    if ctx.dispatcher.config().content_md5 {
        request
            .header("content-md5", &content_md5(&body))
            .map_err(|e| PartError::Failed(e.into()))?;
    }

    debug!(
        key = %ctx.key,
        part_number,
        offset = part.offset,
        length = part.length,
        "Uploading part"
    );

    let response = ctx
        .dispatcher
        .send(
            &ctx.credentials,
            &request,
            body,
            ctx.dispatcher.part_policy(),
            Some(&ctx.control),
        )
        .await
        .map_err(|err| match err {
            SendError::Interrupted(reason) => {
                debug!(part_number, reason = %reason, "Part not sent");
                PartError::Interrupted
            }
            SendError::CredentialRejected => {
                debug!(part_number, "Part not sent, credential already rejected");
                PartError::Interrupted
            }
            other => PartError::Failed(other.into_error(|_, message| part_failed(message))),
        })?;

    let etag = classify::etag(&response).map_err(|e| PartError::Failed(e.into()))?;
    debug!(part_number, etag = %etag, "Part uploaded");

    Ok(PartResult {
        part_number,
        etag,
        byte_length: part.length,
    })
}
