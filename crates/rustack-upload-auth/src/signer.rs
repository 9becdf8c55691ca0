//! HMAC-SHA1 header signing.
//!
//! The `Authorization` header has the format:
//!
//! ```text
//! OSS <AccessKeyId>:<Signature>      (Alibaba OSS)
//! AWS <AccessKeyId>:<Signature>      (S3 SigV2)
//! ```
//!
//! Where `Signature = Base64(HMAC-SHA1(AccessKeySecret, StringToSign))`. The
//! `Date` header is part of the signed content, so every attempt (including
//! retries) must be signed afresh with the date that is actually sent.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, KeyInit, Mac};
use http::HeaderMap;
use http::header::{AUTHORIZATION, DATE, HeaderName, HeaderValue};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::canonical::ProviderRequest;
use crate::credentials::Credential;
use crate::error::AuthError;
use crate::provider::Provider;

type HmacSha1 = Hmac<Sha1>;

/// The outcome of signing: the authorization value and the complete header
/// set to send (request headers plus `Date`, security token, and
/// `Authorization`).
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    /// The `Authorization` header value.
    pub authorization: String,
    /// All headers that must accompany the request.
    pub headers: HeaderMap,
}

/// Format a timestamp as an RFC 1123 HTTP date in GMT.
///
/// # Examples
///
/// ```
/// use chrono::{TimeZone, Utc};
/// use rustack_upload_auth::format_http_date;
///
/// let date = Utc.with_ymd_and_hms(2026, 2, 28, 12, 0, 0).unwrap();
/// assert_eq!(format_http_date(date), "Sat, 28 Feb 2026 12:00:00 GMT");
/// ```
#[must_use]
pub fn format_http_date(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Sign `request` with `credential` as of `date`.
///
/// Inserts the `Date` header and, for temporary credentials, the provider's
/// security-token header before computing the string to sign, then returns
/// the full header set including `Authorization`. The request itself is not
/// modified.
///
/// # Errors
///
/// Returns [`AuthError::InvalidHeaderValue`] if the session token or access
/// key cannot be carried in a header.
pub fn sign_request(
    request: &ProviderRequest,
    credential: &Credential,
    provider: Provider,
    date: DateTime<Utc>,
) -> Result<SignedHeaders, AuthError> {
    let mut headers = request.headers().clone();

    headers.insert(DATE, to_header_value("date", &format_http_date(date))?);

    if let Some(token) = credential.session_token() {
        let name = HeaderName::from_static(provider.security_token_header());
        headers.insert(name, to_header_value(provider.security_token_header(), token)?);
    }

    let string_to_sign = request.string_to_sign(provider, &headers, None);

    debug!(string_to_sign = ?string_to_sign, "Built string to sign");

    let signature = compute_signature(credential.access_key_secret(), &string_to_sign);
    let authorization = authorization_value(provider, credential.access_key_id(), &signature);

    headers.insert(
        AUTHORIZATION,
        to_header_value(AUTHORIZATION.as_str(), &authorization)?,
    );

    Ok(SignedHeaders {
        authorization,
        headers,
    })
}

/// Verify the `Authorization` header of a received request.
///
/// `request` must carry the headers as received. Returns the access key ID
/// on success.
///
/// # Errors
///
/// Returns an [`AuthError`] if the header is missing or malformed, names an
/// unexpected access key, or the signature does not match.
pub fn verify_signature(
    request: &ProviderRequest,
    provider: Provider,
    access_key_id: &str,
    secret_key: &str,
) -> Result<String, AuthError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let (provided_key, provided_signature) = parse_authorization(provider, auth_header)?;

    if provided_key != access_key_id {
        return Err(AuthError::AccessKeyNotFound(provided_key));
    }

    let string_to_sign = request.string_to_sign(provider, request.headers(), None);
    let expected_signature = compute_signature(secret_key, &string_to_sign);

    if provided_signature
        .as_bytes()
        .ct_eq(expected_signature.as_bytes())
        .into()
    {
        Ok(provided_key)
    } else {
        debug!(
            expected = %expected_signature,
            provided = %provided_signature,
            "Signature mismatch"
        );
        Err(AuthError::SignatureDoesNotMatch)
    }
}

/// Parse an `Authorization` header: `SCHEME AKID:Signature`.
pub(crate) fn parse_authorization(
    provider: Provider,
    header: &str,
) -> Result<(String, String), AuthError> {
    let rest = header
        .strip_prefix(provider.auth_scheme())
        .and_then(|r| r.strip_prefix(' '))
        .ok_or(AuthError::InvalidAuthHeader)?;

    let (access_key_id, signature) = rest.split_once(':').ok_or(AuthError::InvalidAuthHeader)?;

    if access_key_id.is_empty() || signature.is_empty() {
        return Err(AuthError::InvalidAuthHeader);
    }

    Ok((access_key_id.to_owned(), signature.to_owned()))
}

/// Render `SCHEME AKID:Signature`.
fn authorization_value(provider: Provider, access_key_id: &str, signature: &str) -> String {
    format!("{} {access_key_id}:{signature}", provider.auth_scheme())
}

/// Compute the signature: Base64(HMAC-SHA1(secret, string_to_sign)).
#[must_use]
pub fn compute_signature(secret_key: &str, string_to_sign: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret_key.as_bytes()).expect("HMAC can accept any key length");
    mac.update(string_to_sign.as_bytes());
    let result = mac.finalize().into_bytes();
    BASE64.encode(result)
}

fn to_header_value(name: &str, value: &str) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(value).map_err(|_| AuthError::InvalidHeaderValue {
        name: name.to_owned(),
    })
}
