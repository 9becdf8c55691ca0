//! Resumable multipart upload engine for OSS/S3-compatible object stores.
//!
//! The engine uploads a payload of known size directly to a bucket using
//! short-lived credentials. Payloads larger than one part are split into
//! contiguous parts that are uploaded concurrently under a provider upload
//! ID and then finalized with a sorted part manifest; smaller payloads go up
//! in a single `PUT`.
//!
//! # Architecture
//!
//! ```text
//! UploadClient::start_upload
//!        |
//!        v
//!   planner::plan ---> UploadTask (state machine + recorded parts)
//!        |
//!        v
//!   TransferHandle (spawned driver)
//!        |  initiate -> coordinator (bounded, retried part PUTs) -> complete
//!        v
//!   Dispatcher: sign per attempt -> Transport -> classify
//! ```
//!
//! # Key components
//!
//! - [`client::UploadClient`] - entry point: start, resume, abort, download, presign
//! - [`transfer::TransferHandle`] - pause, resume, cancel, progress, checkpoint
//! - [`planner`] - part planning against provider limits
//! - [`state`] - the transfer lifecycle state machine
//! - [`error`] - the closed error taxonomy
//! - [`transport`] - the HTTP seam and its `reqwest` implementation
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use rustack_upload_auth::Credential;
//! use rustack_upload_core::{FilePayload, UploadClient, UploadConfig, UploadOptions};
//!
//! # async fn example(credential: Credential) -> Result<(), Box<dyn std::error::Error>> {
//! let client = UploadClient::new(UploadConfig::from_env())?;
//! let payload = Arc::new(FilePayload::open("video.mp4").await?);
//!
//! let handle = client.start_upload(payload, "videos/video.mp4", credential, UploadOptions::default())?;
//! let object = handle.await_result().await?;
//! println!("uploaded {} ({:?})", object.key, object.etag);
//! # Ok(())
//! # }
//! ```

pub mod callback;
pub mod checksums;
mod classify;
pub mod client;
mod completion;
pub mod config;
pub mod content_type;
mod coordinator;
mod dispatch;
mod download;
pub mod error;
pub mod payload;
pub mod planner;
pub mod request;
pub mod state;
pub mod task;
#[cfg(test)]
mod testing;
pub mod transfer;
pub mod transport;
pub mod validation;

pub use callback::Callback;
pub use client::UploadClient;
pub use config::{ManifestFormat, UploadConfig, UploadOptions};
pub use error::{DownloadError, ErrorKind, HttpError, InitError, UploadError, error_code};
pub use payload::{FilePayload, PayloadSource};
pub use planner::{PartDescriptor, PartPlan, UploadMode, plan};
pub use state::{InvalidTransition, TransferEvent, TransferState};
pub use task::{ObjectRef, PartResult, UploadTask};
pub use transfer::TransferHandle;
pub use transport::{HttpTransport, Transport, TransportError, TransportResponse};
