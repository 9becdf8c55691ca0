//! XML wire codec for multipart uploads.
//!
//! This crate converts between the multipart upload wire shapes and the XML
//! bodies exchanged with OSS/S3-compatible providers:
//!
//! - `InitiateMultipartUploadResult` (response to `POST /{key}?uploads`)
//! - `CompleteMultipartUpload` (the finalize manifest, also available as JSON)
//! - `CompleteMultipartUploadResult` (response to the finalize request)
//! - `Error` (provider error bodies)
//!
//! # Key components
//!
//! - [`XmlSerialize`] trait and [`to_xml`] function for writing XML bodies
//! - [`XmlDeserialize`] trait and [`from_xml`] function for parsing XML bodies
//! - [`XmlError`] for codec failures
//!
//! # Conventions
//!
//! - XML declaration: `<?xml version="1.0" encoding="UTF-8"?>`
//! - Namespace: provider dependent (S3 uses `http://s3.amazonaws.com/doc/2006-03-01/`,
//!   OSS uses none)
//! - ETags are carried verbatim, including their surrounding quotes

pub mod deserialize;
pub mod error;
pub mod model;
pub mod serialize;

pub use deserialize::{XmlDeserialize, from_xml};
pub use error::XmlError;
pub use model::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, CompletedPart, ErrorResponse,
    InitiateMultipartUploadResult,
};
pub use serialize::{XmlSerialize, to_xml};
