//! Upload client.
//!
//! [`UploadClient`] is the entry point: it validates inputs, plans the
//! transfer, and spawns it. Every call takes the credential to use, since
//! temporary credentials are issued per bucket and expire independently of
//! the client.

use std::ops::RangeInclusive;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use http::Method;
use tracing::{debug, info};

use rustack_upload_auth::{Credential, ProviderRequest, presign};

use crate::completion;
use crate::config::{UploadConfig, UploadOptions};
use crate::content_type::resolve_content_type;
use crate::dispatch::{CredentialSlot, Dispatcher, TransferControl};
use crate::download::get_object;
use crate::error::{ErrorKind, InitError, UploadError};
use crate::payload::PayloadSource;
use crate::planner::plan;
use crate::request::Endpoint;
use crate::state::TransferState;
use crate::task::UploadTask;
use crate::transfer::{TransferContext, TransferHandle, TransferSettings};
use crate::transport::{HttpTransport, Transport};
use crate::validation::validate_object_key;

/// Starts uploads and issues one-off requests against a provider.
#[derive(Debug, Clone)]
pub struct UploadClient {
    config: Arc<UploadConfig>,
    transport: Arc<dyn Transport>,
}

impl UploadClient {
    /// Create a client using the `reqwest` transport.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::NoTransportAvailable`](crate::error::HttpError::NoTransportAvailable)
    /// if the HTTP client cannot be built.
    pub fn new(config: UploadConfig) -> Result<Self, ErrorKind> {
        let transport = HttpTransport::new()?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a client sending through `transport`.
    #[must_use]
    pub fn with_transport(config: UploadConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// The client configuration.
    #[must_use]
    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Start uploading `payload` to `key` in the credential's bucket.
    ///
    /// Validation and planning happen before this returns; nothing is sent
    /// if they fail. The transfer runs on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an [`InitError`] for an invalid key, credential, content type,
    /// or part plan, and [`UploadError::CredentialExpired`] for a credential
    /// that is already expired.
    pub fn start_upload(
        &self,
        payload: Arc<dyn PayloadSource>,
        key: &str,
        credential: Credential,
        options: UploadOptions,
    ) -> Result<TransferHandle, ErrorKind> {
        let (dispatcher, settings) = self.prepare(&*payload, key, &credential, &options)?;

        let part_size = options.part_size.unwrap_or(self.config.part_size);
        let part_plan = plan(payload.len(), part_size, &self.config.provider.limits())?;
        info!(
            key,
            size = payload.len(),
            part_size,
            parts = part_plan.parts.len(),
            mode = ?part_plan.mode,
            "Starting upload"
        );

        let task = UploadTask::new(credential.bucket(), key, payload.len(), part_plan);
        Ok(self.spawn(dispatcher, settings, payload, task, credential))
    }

    /// Continue the upload recorded in `checkpoint`.
    ///
    /// The upload ID and every recorded part are reused; only the missing
    /// parts are sent. Use this after a transfer failed with
    /// [`UploadError::CredentialExpired`], with a fresh credential.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingParams`] if the checkpoint is finished,
    /// belongs to another bucket, or does not describe `payload`, plus every
    /// error [`start_upload`](Self::start_upload) can return.
    pub fn resume_upload(
        &self,
        payload: Arc<dyn PayloadSource>,
        mut checkpoint: UploadTask,
        credential: Credential,
        options: UploadOptions,
    ) -> Result<TransferHandle, ErrorKind> {
        let reject = |message: String| -> ErrorKind { InitError::MissingParams { message }.into() };

        if matches!(
            checkpoint.state(),
            TransferState::Completed | TransferState::Canceled
        ) {
            return Err(reject(format!(
                "checkpoint for {:?} is already {}",
                checkpoint.key(),
                checkpoint.state().name()
            )));
        }
        if checkpoint.bucket() != credential.bucket() {
            return Err(reject(format!(
                "checkpoint bucket {:?} does not match credential bucket {:?}",
                checkpoint.bucket(),
                credential.bucket()
            )));
        }
        if !checkpoint.matches_payload(payload.len()) {
            return Err(reject(format!(
                "checkpoint for {:?} does not match a payload of {} bytes",
                checkpoint.key(),
                payload.len()
            )));
        }

        let key = checkpoint.key().to_owned();
        let (dispatcher, settings) = self.prepare(&*payload, &key, &credential, &options)?;

        checkpoint.restart();
        info!(
            key = %key,
            upload_id = ?checkpoint.upload_id(),
            recorded = checkpoint.completed().len(),
            pending = checkpoint.pending_parts().len(),
            "Resuming upload from checkpoint"
        );
        Ok(self.spawn(dispatcher, settings, payload, checkpoint, credential))
    }

    /// Abort a multipart upload, discarding its stored parts.
    ///
    /// # Errors
    ///
    /// Returns the transport or credential error of the `DELETE` request.
    pub async fn abort(
        &self,
        key: &str,
        upload_id: &str,
        credential: Credential,
    ) -> Result<(), ErrorKind> {
        let dispatcher = self.dispatcher(&credential)?;
        let bucket = credential.bucket().to_owned();
        let credentials = CredentialSlot::new(credential);
        completion::abort(&dispatcher, &credentials, &bucket, key, upload_id).await
    }

    /// Read an object, or the inclusive byte `range` of it.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError`](crate::error::DownloadError) for error
    /// responses and transport failures.
    pub async fn download(
        &self,
        key: &str,
        range: Option<RangeInclusive<u64>>,
        credential: Credential,
    ) -> Result<Bytes, ErrorKind> {
        validate_object_key(key)?;
        let dispatcher = self.dispatcher(&credential)?;
        let bucket = credential.bucket().to_owned();
        let credentials = CredentialSlot::new(credential);
        get_object(&dispatcher, &credentials, &bucket, key, range).await
    }

    /// A `GET` URL for `key` that is valid for `ttl`.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::InvalidFileName`] for an invalid key and
    /// [`InitError::MissingParams`] for an incomplete credential.
    pub fn presigned_url(
        &self,
        key: &str,
        ttl: chrono::Duration,
        credential: &Credential,
    ) -> Result<String, ErrorKind> {
        validate_object_key(key)?;
        credential.validate()?;
        let endpoint = self.endpoint(credential)?;
        let request = ProviderRequest::new(Method::GET, credential.bucket(), key);
        let query = presign(&request, credential, self.config.provider, Utc::now() + ttl)?;
        Ok(format!("{}?{query}", endpoint.object_url(&request)))
    }

    /// Checks shared by starting and resuming.
    fn prepare(
        &self,
        payload: &dyn PayloadSource,
        key: &str,
        credential: &Credential,
        options: &UploadOptions,
    ) -> Result<(Dispatcher, TransferSettings), ErrorKind> {
        validate_object_key(key)?;
        credential.validate()?;
        if credential.is_expired_at(Utc::now(), self.config.credential_skew()) {
            return Err(UploadError::CredentialExpired {
                message: format!("credential expired at {}", credential.expires_at()),
            }
            .into());
        }

        let content_type =
            resolve_content_type(options.content_type.as_deref(), key, payload.file_name())?;
        let concurrency = options.concurrency.unwrap_or(self.config.concurrency);
        if concurrency == 0 {
            return Err(InitError::MissingParams {
                message: "concurrency must be at least 1".to_owned(),
            }
            .into());
        }

        let dispatcher = self.dispatcher(credential)?;
        debug!(key, content_type = %content_type, concurrency, "Prepared transfer");
        Ok((
            dispatcher,
            TransferSettings {
                concurrency,
                content_type,
                metadata: options.metadata.clone(),
                callback: options.callback.clone(),
            },
        ))
    }

    fn spawn(
        &self,
        dispatcher: Dispatcher,
        settings: TransferSettings,
        payload: Arc<dyn PayloadSource>,
        task: UploadTask,
        credential: Credential,
    ) -> TransferHandle {
        TransferHandle::spawn(TransferContext {
            dispatcher,
            payload,
            bucket: task.bucket().to_owned(),
            key: task.key().to_owned(),
            settings,
            task: parking_lot::Mutex::new(task),
            credentials: CredentialSlot::new(credential),
            control: TransferControl::new(),
        })
    }

    fn endpoint(&self, credential: &Credential) -> Result<Endpoint, InitError> {
        Endpoint::resolve(
            self.config.endpoint.as_deref(),
            self.config.provider,
            credential.region(),
            self.config.path_style,
        )
    }

    fn dispatcher(&self, credential: &Credential) -> Result<Dispatcher, ErrorKind> {
        Ok(Dispatcher::new(
            Arc::clone(&self.config),
            Arc::clone(&self.transport),
            self.endpoint(credential)?,
        ))
    }
}
