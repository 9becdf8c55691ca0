//! Error types for request signing and signature verification.
//!
//! Signing itself is infallible for well-formed input; the variants below
//! cover header values that cannot be represented on the wire, incomplete
//! credentials, and the verification failures seen by a receiving endpoint.

/// Errors that can occur while signing or verifying a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing from the request.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header could not be parsed.
    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    /// The access key ID in the header does not match the expected one.
    #[error("Access key not found: {0}")]
    AccessKeyNotFound(String),

    /// The computed signature does not match the provided signature.
    #[error("Signature does not match")]
    SignatureDoesNotMatch,

    /// A credential field required for signing is empty.
    #[error("Credential field must not be empty: {0}")]
    MissingCredentialField(&'static str),

    /// A header value contains bytes that cannot be sent over HTTP.
    #[error("Invalid header value for {name}")]
    InvalidHeaderValue {
        /// The header name.
        name: String,
    },
}
