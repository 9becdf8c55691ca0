//! Request dispatch with per-attempt signing and bounded retry.
//!
//! Every attempt re-reads the current credential, signs afresh, and runs
//! under a timeout. Transient failures back off and retry up to the policy
//! limit; a 403 stops immediately.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use rustack_upload_auth::{Credential, Provider, ProviderRequest};

use crate::classify::{Outcome, classify};
use crate::config::UploadConfig;
use crate::error::{ErrorKind, HttpError, UploadError};
use crate::request::{Endpoint, sign};
use crate::transport::{Transport, TransportError, TransportResponse};

/// The credential used for the next attempt. Replaced atomically; requests
/// already signed keep the credential they were signed with.
#[derive(Debug)]
pub(crate) struct CredentialSlot(RwLock<Arc<Credential>>);

impl CredentialSlot {
    pub(crate) fn new(credential: Credential) -> Self {
        Self(RwLock::new(Arc::new(credential)))
    }

    pub(crate) fn current(&self) -> Arc<Credential> {
        Arc::clone(&self.0.read())
    }

    pub(crate) fn replace(&self, credential: Credential) {
        *self.0.write() = Arc::new(credential);
    }
}

/// Cooperative pause, cancel, and credential signals of one transfer.
#[derive(Debug)]
pub(crate) struct TransferControl {
    pub(crate) cancel: CancellationToken,
    /// Fired once the provider rejects the transfer's credential. Nothing
    /// signed afterwards by this transfer is sent.
    credential_rejected: CancellationToken,
    paused: watch::Sender<bool>,
    /// Set once the provider accepted the finalizing request.
    object_stored: AtomicBool,
}

impl TransferControl {
    pub(crate) fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            credential_rejected: CancellationToken::new(),
            paused: watch::Sender::new(false),
            object_stored: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_canceled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub(crate) fn is_credential_rejected(&self) -> bool {
        self.credential_rejected.is_cancelled()
    }

    pub(crate) fn reject_credential(&self) {
        self.credential_rejected.cancel();
    }

    pub(crate) fn mark_object_stored(&self) {
        self.object_stored.store(true, Ordering::Release);
    }

    pub(crate) fn is_object_stored(&self) -> bool {
        self.object_stored.load(Ordering::Acquire)
    }

    /// Whether new work must not be dispatched.
    pub(crate) fn is_halted(&self) -> bool {
        self.is_canceled() || self.is_paused() || self.is_credential_rejected()
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    /// Wait until the transfer is resumed.
    ///
    /// Returns `false` if it was canceled instead.
    pub(crate) async fn wait_for_resume(&self) -> bool {
        let mut rx = self.paused.subscribe();
        loop {
            if self.is_canceled() {
                return false;
            }
            if !*rx.borrow_and_update() {
                return true;
            }
            tokio::select! {
                () = self.cancel.cancelled() => return false,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

/// How many attempts a request gets and how long each may take.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) attempts: u32,
    pub(crate) timeout: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub(crate) fn once(timeout: Duration) -> Self {
        Self {
            attempts: 1,
            timeout,
        }
    }
}

/// Why a dispatch did not produce a 2xx response.
#[derive(Debug)]
pub(crate) enum SendError {
    /// 403 or a locally expired credential.
    CredentialExpired(String),
    /// The last attempt failed.
    Failed {
        status: Option<u16>,
        message: String,
    },
    /// Not sent because the transfer was paused or canceled.
    Interrupted(HttpError),
    /// Not sent because another request of the transfer already had its
    /// credential rejected.
    CredentialRejected,
    /// The request could not be built.
    Invalid(ErrorKind),
}

impl SendError {
    /// Convert to the taxonomy, using `failed` for the final-attempt failure
    /// of the calling phase.
    pub(crate) fn into_error(self, failed: impl FnOnce(Option<u16>, String) -> ErrorKind) -> ErrorKind {
        match self {
            Self::CredentialExpired(message) => UploadError::CredentialExpired { message }.into(),
            Self::CredentialRejected => UploadError::CredentialExpired {
                message: "credential already rejected by the provider".to_owned(),
            }
            .into(),
            Self::Failed { status, message } => failed(status, message),
            Self::Interrupted(HttpError::RequestCanceled) => UploadError::Canceled.into(),
            Self::Interrupted(HttpError::RequestPaused) => UploadError::Paused.into(),
            Self::Interrupted(other) => other.into(),
            Self::Invalid(err) => err,
        }
    }
}

/// Sends provider requests for one endpoint.
#[derive(Debug, Clone)]
pub(crate) struct Dispatcher {
    config: Arc<UploadConfig>,
    transport: Arc<dyn Transport>,
    endpoint: Endpoint,
}

impl Dispatcher {
    pub(crate) fn new(
        config: Arc<UploadConfig>,
        transport: Arc<dyn Transport>,
        endpoint: Endpoint,
    ) -> Self {
        Self {
            config,
            transport,
            endpoint,
        }
    }

    pub(crate) fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub(crate) fn provider(&self) -> Provider {
        self.config.provider
    }

    pub(crate) fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Policy for part uploads: configured retries and part timeout.
    pub(crate) fn part_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.config.part_retry_attempts.saturating_add(1),
            timeout: self.config.part_timeout(),
        }
    }

    /// Send `request`, retrying transient failures per `policy`.
    ///
    /// With `control`, a canceled transfer stops before any attempt and a
    /// paused one stops before a retry. A credential rejection, seen here or
    /// by a concurrent request of the same transfer, is signalled through
    /// `control` and ends every later attempt and backoff.
    pub(crate) async fn send(
        &self,
        credentials: &CredentialSlot,
        request: &ProviderRequest,
        body: Bytes,
        policy: RetryPolicy,
        control: Option<&TransferControl>,
    ) -> Result<TransportResponse, SendError> {
        let mut attempt: u32 = 0;
        loop {
            if let Some(control) = control {
                if control.is_canceled() {
                    return Err(SendError::Interrupted(HttpError::RequestCanceled));
                }
                if control.is_credential_rejected() {
                    return Err(SendError::CredentialRejected);
                }
                if attempt > 0 && control.is_paused() {
                    return Err(SendError::Interrupted(HttpError::RequestPaused));
                }
            }

            let credential = credentials.current();
            if credential.is_expired_at(Utc::now(), self.config.credential_skew()) {
                warn!(
                    key = %request.key(),
                    expires_at = %credential.expires_at(),
                    "Credential expired, not sending request"
                );
                if let Some(control) = control {
                    control.reject_credential();
                }
                return Err(SendError::CredentialExpired(format!(
                    "credential expired at {}",
                    credential.expires_at()
                )));
            }

            let signed = sign(
                &self.endpoint,
                self.config.provider,
                &credential,
                request,
                body.clone(),
            )
            .map_err(SendError::Invalid)?;

            let result = match tokio::time::timeout(policy.timeout, self.transport.send(signed)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout),
            };

            match classify(result) {
                Outcome::Success(response) => return Ok(response),
                Outcome::CredentialExpired(message) => {
                    warn!(
                        method = %request.method(),
                        key = %request.key(),
                        reason = %message,
                        "Provider rejected credential"
                    );
                    if let Some(control) = control {
                        control.reject_credential();
                    }
                    return Err(SendError::CredentialExpired(message));
                }
                Outcome::Fatal { status, message } => {
                    return Err(SendError::Failed {
                        status: Some(status),
                        message,
                    });
                }
                Outcome::Transient { status, message } => {
                    attempt += 1;
                    if attempt >= policy.attempts {
                        return Err(SendError::Failed { status, message });
                    }
                    let backoff = self.config.retry_backoff(attempt - 1);
                    warn!(
                        method = %request.method(),
                        key = %request.key(),
                        attempt,
                        backoff = ?backoff,
                        reason = %message,
                        "Retrying request"
                    );
                    match control {
                        Some(control) => {
                            tokio::select! {
                                () = control.cancel.cancelled() => {
                                    return Err(SendError::Interrupted(HttpError::RequestCanceled));
                                }
                                () = control.credential_rejected.cancelled() => {
                                    return Err(SendError::CredentialRejected);
                                }
                                () = tokio::time::sleep(backoff) => {}
                            }
                        }
                        None => tokio::time::sleep(backoff).await,
                    }
                    debug!(attempt, "Backoff elapsed");
                }
            }
        }
    }
}
