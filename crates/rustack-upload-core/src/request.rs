//! Outgoing request construction.
//!
//! A [`ProviderRequest`] is turned into a [`SignedRequest`] right before it is
//! sent, so every attempt carries a fresh `Date` and signature.

use bytes::Bytes;
use chrono::Utc;
use http::{HeaderMap, Method};

use rustack_upload_auth::{Credential, Provider, ProviderRequest, sign_request};

use crate::error::{ErrorKind, InitError};

/// A signed, ready-to-send request. Never persisted.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL including the query string.
    pub url: String,
    /// Headers, including `Date` and `Authorization`.
    pub headers: HeaderMap,
    /// Request body.
    pub body: Bytes,
}

/// Where requests for a bucket are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
    path_style: bool,
}

impl Endpoint {
    /// Parse an endpoint such as `https://oss-cn-hangzhou.aliyuncs.com`.
    ///
    /// A missing scheme defaults to `https`.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingParams`] if the host is empty.
    pub fn parse(endpoint: &str, path_style: bool) -> Result<Self, InitError> {
        let (scheme, rest) = endpoint
            .split_once("://")
            .unwrap_or(("https", endpoint));
        let host = rest.trim_end_matches('/');
        if host.is_empty() || scheme.is_empty() {
            return Err(InitError::MissingParams {
                message: format!("invalid endpoint {endpoint:?}"),
            });
        }
        Ok(Self {
            scheme: scheme.to_ascii_lowercase(),
            host: host.to_owned(),
            path_style,
        })
    }

    /// The configured endpoint, or the provider default for `region`.
    ///
    /// # Errors
    ///
    /// Returns [`InitError::MissingParams`] if the endpoint is malformed.
    pub fn resolve(
        endpoint: Option<&str>,
        provider: Provider,
        region: &str,
        path_style: bool,
    ) -> Result<Self, InitError> {
        match endpoint {
            Some(e) => Self::parse(e, path_style),
            None => Self::parse(&provider.default_endpoint(region), path_style),
        }
    }

    /// URL of `request` without a query string.
    #[must_use]
    pub fn object_url(&self, request: &ProviderRequest) -> String {
        let path = request.encoded_key_path();
        if self.path_style {
            format!("{}://{}/{}{path}", self.scheme, self.host, request.bucket())
        } else {
            format!("{}://{}.{}{path}", self.scheme, request.bucket(), self.host)
        }
    }

    /// Full URL of `request`, sub-resources included.
    #[must_use]
    pub fn url(&self, request: &ProviderRequest) -> String {
        let base = self.object_url(request);
        let query = request.query_string();
        if query.is_empty() {
            base
        } else {
            format!("{base}?{query}")
        }
    }
}

/// Sign `request` as of now and attach `body`.
///
/// # Errors
///
/// Returns [`InitError::MissingParams`] if a header cannot be represented.
pub fn sign(
    endpoint: &Endpoint,
    provider: Provider,
    credential: &Credential,
    request: &ProviderRequest,
    body: Bytes,
) -> Result<SignedRequest, ErrorKind> {
    let signed = sign_request(request, credential, provider, Utc::now())?;
    Ok(SignedRequest {
        method: request.method().clone(),
        url: endpoint.url(request),
        headers: signed.headers,
        body,
    })
}
