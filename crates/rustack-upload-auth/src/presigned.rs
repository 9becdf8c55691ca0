//! Query-string authentication (presigned URLs).
//!
//! A presigned URL carries the signature in query parameters instead of the
//! `Authorization` header. The canonical string is built exactly as for
//! header signing except that the `Date` line holds the `Expires` Unix
//! timestamp:
//!
//! ```text
//! ?OSSAccessKeyId=<AKID>&Expires=<unix-seconds>&Signature=<url-encoded signature>
//! ```
//!
//! With temporary credentials OSS signs the token as a `security-token`
//! sub-resource, while S3 signs it as the `x-amz-security-token` header.

use chrono::{DateTime, Utc};
use http::HeaderMap;
use http::header::{HeaderName, HeaderValue};
use percent_encoding::utf8_percent_encode;

use crate::canonical::ProviderRequest;
use crate::credentials::Credential;
use crate::error::AuthError;
use crate::provider::{Provider, QUERY_ENCODE_SET};
use crate::signer::compute_signature;

/// OSS sub-resource carrying the session token in presigned URLs.
const OSS_TOKEN_PARAM: &str = "security-token";

/// Build the query string of a presigned URL for `request`, valid until
/// `expires_at`.
///
/// The returned string includes the request's own sub-resources and has no
/// leading `?`.
///
/// # Errors
///
/// Returns [`AuthError::InvalidHeaderValue`] if the session token cannot be
/// represented as a header value.
pub fn presign(
    request: &ProviderRequest,
    credential: &Credential,
    provider: Provider,
    expires_at: DateTime<Utc>,
) -> Result<String, AuthError> {
    let expires = expires_at.timestamp().to_string();
    let mut signed = request.clone();
    let mut headers: HeaderMap = request.headers().clone();
    let mut extra_params: Vec<(&str, String)> = Vec::new();

    if let Some(token) = credential.session_token() {
        match provider {
            Provider::Oss => {
                signed.sub_resource(OSS_TOKEN_PARAM, Some(token));
            }
            Provider::S3 => {
                let name = provider.security_token_header();
                let value = HeaderValue::from_str(token).map_err(|_| {
                    AuthError::InvalidHeaderValue {
                        name: name.to_owned(),
                    }
                })?;
                headers.insert(HeaderName::from_static(name), value);
                extra_params.push((name, token.to_owned()));
            }
        }
    }

    let string_to_sign = signed.string_to_sign(provider, &headers, Some(&expires));
    let signature = compute_signature(credential.access_key_secret(), &string_to_sign);

    let mut query = signed.query_string();
    let auth_params = [
        (
            provider.presign_access_key_param(),
            credential.access_key_id().to_owned(),
        ),
        ("Expires", expires),
        ("Signature", signature),
    ];

    for (name, value) in auth_params.into_iter().chain(extra_params) {
        if !query.is_empty() {
            query.push('&');
        }
        query.push_str(name);
        query.push('=');
        query.push_str(&utf8_percent_encode(&value, QUERY_ENCODE_SET).to_string());
    }

    Ok(query)
}
