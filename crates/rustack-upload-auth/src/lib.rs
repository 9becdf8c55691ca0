//! Credential model and request signing for OSS/S3-compatible object stores.
//!
//! This crate implements the client side of the header-based HMAC-SHA1
//! signature scheme shared by Alibaba OSS (`OSS AKID:sig`) and the legacy
//! Amazon S3 SigV2 protocol (`AWS AKID:sig`). It produces the exact
//! canonical string the provider recomputes, so every byte matters.
//!
//! # Overview
//!
//! ```text
//! Signature = Base64(HMAC-SHA1(AccessKeySecret, StringToSign))
//!
//! StringToSign = VERB + "\n" +
//!                Content-MD5 + "\n" +
//!                Content-Type + "\n" +
//!                Date + "\n" +
//!                CanonicalizedProviderHeaders +
//!                CanonicalizedResource
//! ```
//!
//! A [`ProviderRequest`] is the single source of truth for both the signed
//! canonical string and the outgoing request line and headers, so the two
//! cannot drift apart.
//!
//! # Usage
//!
//! ```rust
//! use chrono::{TimeZone, Utc};
//! use rustack_upload_auth::{Credential, Provider, ProviderRequest, sign_request};
//!
//! let credential = Credential::builder()
//!     .access_key_id("AKIDEXAMPLE")
//!     .access_key_secret("secret")
//!     .expires_at(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
//!     .region("cn-hangzhou")
//!     .bucket("examplebucket")
//!     .build();
//!
//! let mut request = ProviderRequest::new(http::Method::PUT, "examplebucket", "big.bin");
//! request.sub_resource("partNumber", Some("1"));
//! request.sub_resource("uploadId", Some("0004B9894A22E5B1888A1E29F823****"));
//!
//! let date = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
//! let signed = sign_request(&request, &credential, Provider::Oss, date).unwrap();
//! assert!(signed.authorization.starts_with("OSS AKIDEXAMPLE:"));
//! ```
//!
//! # Modules
//!
//! - [`canonical`] - Request builder and canonical string construction
//! - [`credentials`] - Immutable temporary credential value
//! - [`error`] - Authentication error types
//! - [`presigned`] - Query-string (presigned URL) authentication
//! - [`provider`] - Provider profile (header prefixes, limits, schemes)
//! - [`signer`] - Signature computation and verification

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod presigned;
pub mod provider;
pub mod signer;

pub use canonical::ProviderRequest;
pub use credentials::Credential;
pub use error::AuthError;
pub use presigned::presign;
pub use provider::{Provider, ProviderLimits};
pub use signer::{SignedHeaders, compute_signature, format_http_date, sign_request, verify_signature};
