//! Temporary credential model.
//!
//! A [`Credential`] is issued by an external service (typically an STS-style
//! "credential by organization" endpoint) and handed to the upload engine as an
//! immutable value. The engine never refreshes it; it only detects expiry.
//! Replacing a credential means constructing a new value and swapping it in
//! whole.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use typed_builder::TypedBuilder;

use crate::error::AuthError;

/// An immutable set of (usually temporary) access keys scoped to one bucket.
///
/// # Examples
///
/// ```
/// use chrono::{Duration, Utc};
/// use rustack_upload_auth::Credential;
///
/// let credential = Credential::builder()
///     .access_key_id("STS.AKID")
///     .access_key_secret("secret")
///     .session_token("token")
///     .expires_at(Utc::now() + Duration::hours(1))
///     .region("cn-hangzhou")
///     .bucket("uploads")
///     .build();
///
/// assert_eq!(credential.bucket(), "uploads");
/// assert!(!credential.is_expired_at(Utc::now(), Duration::zero()));
/// ```
#[derive(Clone, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    #[builder(setter(into))]
    access_key_id: String,

    #[builder(setter(into))]
    access_key_secret: String,

    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    session_token: Option<String>,

    #[builder(default = Utc::now())]
    #[serde(default = "Utc::now")]
    issued_at: DateTime<Utc>,

    expires_at: DateTime<Utc>,

    #[builder(setter(into))]
    region: String,

    #[builder(setter(into))]
    bucket: String,
}

impl Credential {
    /// The access key ID placed in the `Authorization` header.
    #[must_use]
    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    /// The secret used as the HMAC key.
    #[must_use]
    pub fn access_key_secret(&self) -> &str {
        &self.access_key_secret
    }

    /// The session token of temporary credentials, if any.
    #[must_use]
    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// When the issuer created this credential.
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When this credential stops being accepted by the provider.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Region the credential (and its bucket) belongs to.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Bucket the credential grants access to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Whether the credential is expired at `now`, treating anything within
    /// `skew` of the expiry as already expired.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        now + skew >= self.expires_at
    }

    /// Check that every field needed for signing is present.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCredentialField`] naming the first empty field.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_key_id.is_empty() {
            return Err(AuthError::MissingCredentialField("access_key_id"));
        }
        if self.access_key_secret.is_empty() {
            return Err(AuthError::MissingCredentialField("access_key_secret"));
        }
        if self.bucket.is_empty() {
            return Err(AuthError::MissingCredentialField("bucket"));
        }
        if self.region.is_empty() {
            return Err(AuthError::MissingCredentialField("region"));
        }
        if self.session_token.as_deref().is_some_and(str::is_empty) {
            return Err(AuthError::MissingCredentialField("session_token"));
        }
        Ok(())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "<redacted>"),
            )
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .finish()
    }
}
