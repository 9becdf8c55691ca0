//! Canonical request construction.
//!
//! [`ProviderRequest`] collects everything that participates in a signature:
//! method, bucket, key, sub-resources, and headers. The same value renders the
//! canonical string that is signed and the request line and headers that are
//! sent, so the two views can never disagree.
//!
//! ```text
//! StringToSign = VERB + "\n" +
//!                Content-MD5 + "\n" +
//!                Content-Type + "\n" +
//!                Date + "\n" +
//!                CanonicalizedProviderHeaders +
//!                CanonicalizedResource
//! ```

use std::collections::BTreeMap;

use http::header::{CONTENT_TYPE, DATE, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use percent_encoding::utf8_percent_encode;

use crate::error::AuthError;
use crate::provider::{KEY_ENCODE_SET, Provider, QUERY_ENCODE_SET};

/// `Content-MD5` header name (not provided as a constant by the `http` crate).
const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

/// A provider request under construction.
///
/// Sub-resources are kept sorted by key, which is exactly the order the
/// canonical resource requires.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    method: Method,
    bucket: String,
    key: String,
    sub_resources: BTreeMap<String, Option<String>>,
    headers: HeaderMap,
}

impl ProviderRequest {
    /// Start a request against `/{bucket}/{key}`.
    pub fn new(method: Method, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            method,
            bucket: bucket.into(),
            key: key.into(),
            sub_resources: BTreeMap::new(),
            headers: HeaderMap::new(),
        }
    }

    /// Add a sub-resource (signed query parameter). `None` renders the bare key,
    /// e.g. `?uploads`.
    pub fn sub_resource(&mut self, key: impl Into<String>, value: Option<&str>) -> &mut Self {
        self.sub_resources
            .insert(key.into(), value.map(ToOwned::to_owned));
        self
    }

    /// Set a header, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidHeaderValue`] if the name or value cannot be
    /// represented as an HTTP header.
    pub fn header(&mut self, name: &str, value: &str) -> Result<&mut Self, AuthError> {
        let invalid = || AuthError::InvalidHeaderValue {
            name: name.to_owned(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    /// The HTTP method.
    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The target bucket.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// The target object key (unencoded).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Headers set so far (without `Date` or `Authorization`).
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Sub-resources in canonical (sorted) order.
    pub fn sub_resources(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.sub_resources
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// URI-encoded object path, `/{key}`.
    #[must_use]
    pub fn encoded_key_path(&self) -> String {
        format!("/{}", utf8_percent_encode(&self.key, KEY_ENCODE_SET))
    }

    /// URL query string for the sub-resources, without the leading `?`.
    #[must_use]
    pub fn query_string(&self) -> String {
        self.sub_resources
            .iter()
            .map(|(k, v)| {
                let key = utf8_percent_encode(k, QUERY_ENCODE_SET);
                match v {
                    Some(value) => format!("{key}={}", utf8_percent_encode(value, QUERY_ENCODE_SET)),
                    None => key.to_string(),
                }
            })
            .collect::<Vec<_>>()
            .join("&")
    }

    /// Build the CanonicalizedResource string.
    ///
    /// `/{bucket}/{key}` followed, when sub-resources are present, by `?` and
    /// the sub-resources sorted by key and joined with `&`. Parameters without
    /// a value render as the bare key.
    #[must_use]
    pub fn canonical_resource(&self, provider: Provider) -> String {
        let mut resource = if self.bucket.is_empty() {
            "/".to_owned()
        } else {
            format!("/{}/{}", self.bucket, provider.canonical_key(&self.key))
        };

        if !self.sub_resources.is_empty() {
            let params: Vec<String> = self
                .sub_resources
                .iter()
                .map(|(k, v)| match v {
                    Some(val) if !val.is_empty() => format!("{k}={val}"),
                    _ => k.clone(),
                })
                .collect();
            resource.push('?');
            resource.push_str(&params.join("&"));
        }

        resource
    }

    /// Build the string to sign over `headers`, which must already carry the
    /// `Date` header (or the date override) and any provider headers.
    ///
    /// When `date_line` is given it replaces the `Date` header value; presigned
    /// URLs use it to sign the `Expires` timestamp.
    #[must_use]
    pub fn string_to_sign(
        &self,
        provider: Provider,
        headers: &HeaderMap,
        date_line: Option<&str>,
    ) -> String {
        let method = self.method.as_str();
        let content_md5 = header_value(headers, CONTENT_MD5.as_str());
        let content_type = header_value(headers, CONTENT_TYPE.as_str());

        let date = match date_line {
            Some(line) => line.to_owned(),
            None => match provider.date_override_header() {
                Some(name) if headers.contains_key(name) => String::new(),
                _ => header_value(headers, DATE.as_str()),
            },
        };

        let provider_headers = canonicalized_provider_headers(provider, headers);
        let resource = self.canonical_resource(provider);

        format!("{method}\n{content_md5}\n{content_type}\n{date}\n{provider_headers}{resource}")
    }
}

/// Build the CanonicalizedProviderHeaders string.
///
/// Headers with the provider prefix are lowercased, sorted, and rendered as
/// `name:value\n` with surrounding whitespace trimmed. Repeated headers are
/// joined with commas.
fn canonicalized_provider_headers(provider: Provider, headers: &HeaderMap) -> String {
    let prefix = provider.header_prefix();
    let mut selected: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for (name, value) in headers {
        let name_str = name.as_str().to_ascii_lowercase();
        if name_str.starts_with(prefix) {
            let val = value.to_str().unwrap_or("").trim().to_owned();
            selected.entry(name_str).or_default().push(val);
        }
    }

    let mut result = String::new();
    for (name, values) in &selected {
        result.push_str(name);
        result.push(':');
        result.push_str(&values.join(","));
        result.push('\n');
    }

    result
}

/// Extract a header value as a string, returning empty string if missing.
fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_owned()
}
