//! A running transfer and its control handle.
//!
//! [`TransferHandle`] is returned by the client when a transfer starts. The
//! transfer itself runs on a spawned task that walks the state machine:
//! initiate (multipart only), dispatch parts, finalize. Pause, resume, and
//! cancel are applied to the shared task state first and then signalled to
//! the dispatch loop.
//!
//! Dropping a handle before its result is taken cancels the transfer, which
//! aborts an allocated upload ID. A cancel that lands while the finalizing
//! request is already in flight cannot take the object back: the transfer
//! still ends `Canceled`, but the object stays in place and no abort is sent.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use http::header::CONTENT_TYPE;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::DropGuard;
use tracing::{debug, error, info, warn};

use rustack_upload_auth::{Credential, ProviderRequest};
use rustack_upload_xml::{InitiateMultipartUploadResult, from_xml};

use crate::callback::Callback;
use crate::checksums::content_md5;
use crate::classify;
use crate::completion;
use crate::coordinator::{DispatchOutcome, upload_parts};
use crate::dispatch::{CredentialSlot, Dispatcher, RetryPolicy, TransferControl};
use crate::error::{ErrorKind, HttpError, InitError, UploadError};
use crate::payload::PayloadSource;
use crate::planner::UploadMode;
use crate::state::{InvalidTransition, TransferEvent, TransferState};
use crate::task::{ObjectRef, PartResult, UploadTask};

/// Per-transfer settings resolved from the config and upload options.
#[derive(Debug, Clone)]
pub(crate) struct TransferSettings {
    pub(crate) concurrency: usize,
    pub(crate) content_type: String,
    pub(crate) metadata: BTreeMap<String, String>,
    pub(crate) callback: Option<Callback>,
}

/// Everything a running transfer shares between its driver, its part
/// uploads, and its handle.
#[derive(Debug)]
pub(crate) struct TransferContext {
    pub(crate) dispatcher: Dispatcher,
    pub(crate) payload: Arc<dyn PayloadSource>,
    pub(crate) bucket: String,
    pub(crate) key: String,
    pub(crate) settings: TransferSettings,
    pub(crate) task: Mutex<UploadTask>,
    pub(crate) credentials: CredentialSlot,
    pub(crate) control: TransferControl,
}

impl TransferContext {
    /// A bare request against the destination object.
    pub(crate) fn request(&self, method: Method) -> ProviderRequest {
        ProviderRequest::new(method, &self.bucket, &self.key)
    }

    /// `Content-Type` and user metadata headers for object-creating requests.
    fn apply_object_headers(&self, request: &mut ProviderRequest) -> Result<(), ErrorKind> {
        request.header(CONTENT_TYPE.as_str(), &self.settings.content_type)?;
        let prefix = self.dispatcher.provider().meta_prefix();
        for (name, value) in &self.settings.metadata {
            request.header(&format!("{prefix}{}", name.to_ascii_lowercase()), value)?;
        }
        Ok(())
    }

    /// Callback headers for finalizing requests.
    pub(crate) fn apply_callback(&self, request: &mut ProviderRequest) -> Result<(), ErrorKind> {
        let Some(callback) = &self.settings.callback else {
            return Ok(());
        };
        let headers = callback
            .headers(self.dispatcher.provider())
            .map_err(|e| InitError::MissingParams {
                message: format!("invalid callback: {e}"),
            })?;
        for (name, value) in headers {
            request.header(&name, &value)?;
        }
        Ok(())
    }

    /// Apply `event`, turning a rejected transition into the error that
    /// explains it.
    fn advance(&self, event: TransferEvent) -> Result<(), ErrorKind> {
        let mut task = self.task.lock();
        let applied = task.apply(event).map(|_| ());
        match applied {
            Ok(()) => Ok(()),
            Err(invalid) => Err(match task.state() {
                TransferState::Canceled => UploadError::Canceled.into(),
                TransferState::Paused => UploadError::Paused.into(),
                _ => InitError::MissingParams {
                    message: invalid.to_string(),
                }
                .into(),
            }),
        }
    }

    fn mode(&self) -> UploadMode {
        self.task.lock().mode()
    }

    fn upload_id(&self) -> Option<String> {
        self.task.lock().upload_id().map(ToOwned::to_owned)
    }
}

/// Handle to a running transfer.
///
/// Dropping the handle, or the future returned by
/// [`await_result`](Self::await_result) before it resolves, cancels the
/// transfer.
#[derive(Debug)]
pub struct TransferHandle {
    ctx: Arc<TransferContext>,
    join: JoinHandle<Result<ObjectRef, ErrorKind>>,
    cancel_on_drop: DropGuard,
}

impl TransferHandle {
    /// Spawn the transfer described by `ctx` on the current runtime.
    pub(crate) fn spawn(ctx: TransferContext) -> Self {
        let ctx = Arc::new(ctx);
        let cancel_on_drop = ctx.control.cancel.clone().drop_guard();
        let join = tokio::spawn(run(Arc::clone(&ctx)));
        Self {
            ctx,
            join,
            cancel_on_drop,
        }
    }

    /// Destination key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.ctx.key
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TransferState {
        self.ctx.task.lock().state().clone()
    }

    /// `(bytes_done, bytes_total)`. Only parts with a recorded result count.
    #[must_use]
    pub fn progress(&self) -> (u64, u64) {
        let task = self.ctx.task.lock();
        (task.bytes_done(), task.total_size())
    }

    /// Snapshot of the task, suitable for persisting and passing to
    /// [`UploadClient::resume_upload`](crate::client::UploadClient::resume_upload).
    #[must_use]
    pub fn checkpoint(&self) -> UploadTask {
        self.ctx.task.lock().clone()
    }

    /// Stop dispatching new parts. In-flight parts finish and are recorded.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] unless the transfer is uploading parts.
    pub fn pause(&self) -> Result<(), InvalidTransition> {
        let mut task = self.ctx.task.lock();
        task.apply(TransferEvent::Pause)?;
        self.ctx.control.set_paused(true);
        info!(key = %self.ctx.key, "Transfer paused");
        Ok(())
    }

    /// Continue a paused transfer with the parts still pending.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] unless the transfer is paused.
    pub fn resume(&self) -> Result<(), InvalidTransition> {
        let mut task = self.ctx.task.lock();
        task.apply(TransferEvent::Resume)?;
        self.ctx.control.set_paused(false);
        info!(key = %self.ctx.key, "Transfer resumed");
        Ok(())
    }

    /// Cancel the transfer. An allocated upload ID is aborted.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransition`] if the transfer already ended.
    pub fn cancel(&self) -> Result<(), InvalidTransition> {
        let mut task = self.ctx.task.lock();
        task.apply(TransferEvent::Cancel)?;
        self.ctx.control.cancel.cancel();
        info!(key = %self.ctx.key, "Transfer canceled");
        Ok(())
    }

    /// Use `credential` for every request signed from now on.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingParams`] if the credential is incomplete.
    pub fn replace_credential(&self, credential: Credential) -> Result<(), ErrorKind> {
        credential.validate()?;
        debug!(
            key = %self.ctx.key,
            expires_at = %credential.expires_at(),
            "Replacing credential"
        );
        self.ctx.credentials.replace(credential);
        Ok(())
    }

    /// Wait for the transfer to reach a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the error the transfer failed with, or
    /// [`UploadError::Canceled`].
    pub async fn await_result(self) -> Result<ObjectRef, ErrorKind> {
        let Self {
            join,
            cancel_on_drop,
            ..
        } = self;
        let joined = join.await;
        let _ = cancel_on_drop.disarm();
        match joined {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Err(UploadError::Canceled.into()),
        }
    }
}

async fn run(ctx: Arc<TransferContext>) -> Result<ObjectRef, ErrorKind> {
    match drive(&ctx).await {
        Ok(object) => {
            info!(key = %object.key, etag = ?object.etag, "Transfer completed");
            Ok(object)
        }
        Err(err) if ctx.control.is_canceled() => {
            debug!(key = %ctx.key, error = %err, "Transfer interrupted by cancel");
            {
                // A dropped handle cancels through the token alone.
                let mut task = ctx.task.lock();
                if !task.state().is_terminal() {
                    let _ = task.apply(TransferEvent::Cancel);
                }
            }
            if ctx.control.is_object_stored() {
                warn!(key = %ctx.key, "Object was stored before the cancel took effect");
            } else if let Some(upload_id) = ctx.upload_id() {
                completion::abort_quietly(
                    &ctx.dispatcher,
                    &ctx.credentials,
                    &ctx.bucket,
                    &ctx.key,
                    &upload_id,
                )
                .await;
            }
            info!(key = %ctx.key, "Transfer stopped after cancel");
            Err(UploadError::Canceled.into())
        }
        Err(err) => {
            {
                let mut task = ctx.task.lock();
                if !task.state().is_terminal() {
                    let _ = task.apply(TransferEvent::Fail(err.clone()));
                }
            }
            error!(key = %ctx.key, error = %err, "Transfer failed");
            Err(err)
        }
    }
}

async fn drive(ctx: &Arc<TransferContext>) -> Result<ObjectRef, ErrorKind> {
    ctx.advance(TransferEvent::Start)?;

    match ctx.mode() {
        UploadMode::SingleShot => {
            ctx.advance(TransferEvent::ProviderAck)?;
            let object = put_object(ctx).await?;
            ctx.control.mark_object_stored();
            enter_completing(ctx).await?;
            ctx.advance(TransferEvent::FinalizeAck)?;
            Ok(object)
        }
        UploadMode::Multipart => {
            match ctx.upload_id() {
                Some(upload_id) => {
                    info!(key = %ctx.key, upload_id = %upload_id, "Resuming multipart upload");
                }
                None => {
                    let upload_id = initiate(ctx).await?;
                    ctx.task.lock().set_upload_id(upload_id);
                }
            }
            ctx.advance(TransferEvent::ProviderAck)?;

            loop {
                match upload_parts(ctx).await? {
                    DispatchOutcome::Finished => break,
                    DispatchOutcome::Halted => {
                        if !ctx.control.wait_for_resume().await {
                            return Err(UploadError::Canceled.into());
                        }
                    }
                }
            }

            enter_completing(ctx).await?;
            let object = completion::complete(ctx).await?;
            ctx.control.mark_object_stored();
            ctx.advance(TransferEvent::FinalizeAck)?;
            Ok(object)
        }
    }
}

/// Move to `Completing`, waiting out a pause that arrived after the last
/// part was dispatched.
async fn enter_completing(ctx: &TransferContext) -> Result<(), ErrorKind> {
    loop {
        match ctx.advance(TransferEvent::AllPartsDone) {
            Err(ErrorKind::Upload(UploadError::Paused)) => {
                if !ctx.control.wait_for_resume().await {
                    return Err(UploadError::Canceled.into());
                }
            }
            other => return other,
        }
    }
}

async fn initiate(ctx: &TransferContext) -> Result<String, ErrorKind> {
    let mut request = ctx.request(Method::POST);
    request.sub_resource("uploads", None);
    ctx.apply_object_headers(&mut request)?;

    let response = ctx
        .dispatcher
        .send(
            &ctx.credentials,
            &request,
            Bytes::new(),
            RetryPolicy::once(ctx.dispatcher.config().request_timeout()),
            Some(&ctx.control),
        )
        .await
        .map_err(|err| {
            err.into_error(|status, message| HttpError::RequestFailed { status, message }.into())
        })?;

    let status = Some(response.status.as_u16());
    let result: InitiateMultipartUploadResult =
        from_xml(&response.body).map_err(|e| HttpError::RequestFailed {
            status,
            message: format!("malformed initiate response: {e}"),
        })?;
    let upload_id = result
        .upload_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| HttpError::RequestFailed {
            status,
            message: "initiate response has no UploadId".to_owned(),
        })?;

    info!(key = %ctx.key, upload_id = %upload_id, "Multipart upload initiated");
    Ok(upload_id)
}

async fn put_object(ctx: &TransferContext) -> Result<ObjectRef, ErrorKind> {
    let total = ctx.payload.len();
    let body = ctx
        .payload
        .read_range(0, total)
        .await
        .map_err(|e| InitError::UnsupportedPayloadType {
            message: format!("cannot read payload: {e}"),
        })?;

    let mut request = ctx.request(Method::PUT);
    ctx.apply_object_headers(&mut request)?;
    if ctx.dispatcher.config().content_md5 {
        request.header("content-md5", &content_md5(&body))?;
    }
    ctx.apply_callback(&mut request)?;

    debug!(key = %ctx.key, size = total, "Uploading object in one request");
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
        .map_err(|err| {
            err.into_error(|status, message| HttpError::RequestFailed { status, message }.into())
        })?;

    let etag = classify::etag(&response)?;
    ctx.task.lock().record(PartResult {
        part_number: 1,
        etag: etag.clone(),
        byte_length: total,
    });

    Ok(ObjectRef {
        bucket: ctx.bucket.clone(),
        key: ctx.key.clone(),
        etag: Some(etag),
        location: Some(ctx.dispatcher.endpoint().object_url(&request)),
    })
}
