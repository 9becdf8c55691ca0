//! Upload engine configuration.
//!
//! Provides [`UploadConfig`] for client-wide settings and [`UploadOptions`]
//! for per-transfer overrides. Configuration values can be loaded from
//! `UPLOAD_*` environment variables.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use rustack_upload_auth::Provider;

use crate::callback::Callback;

/// Default part size: 5 MiB.
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of parts in flight.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Body format of the finalize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestFormat {
    /// `<CompleteMultipartUpload>` XML document.
    #[default]
    Xml,
    /// `{"parts":[{"partNumber":1,"etag":"..."}]}`.
    Json,
}

impl fmt::Display for ManifestFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml => f.write_str("xml"),
            Self::Json => f.write_str("json"),
        }
    }
}

impl FromStr for ManifestFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown manifest format: {other}")),
        }
    }
}

/// Client-wide upload configuration.
///
/// # Examples
///
/// ```
/// use rustack_upload_core::config::UploadConfig;
///
/// let config = UploadConfig::default();
/// assert_eq!(config.part_size, 5 * 1024 * 1024);
/// assert_eq!(config.concurrency, 3);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct UploadConfig {
    /// Storage provider dialect.
    #[builder(default)]
    pub provider: Provider,

    /// Service endpoint such as `https://oss-cn-hangzhou.aliyuncs.com`.
    /// Derived from the credential's region when unset.
    #[builder(default, setter(strip_option, into))]
    pub endpoint: Option<String>,

    /// Address buckets as `/{bucket}/{key}` instead of `{bucket}.{host}`.
    #[builder(default = false)]
    pub path_style: bool,

    /// Default part size in bytes.
    #[builder(default = DEFAULT_PART_SIZE)]
    pub part_size: u64,

    /// Default number of concurrent part uploads.
    #[builder(default = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Retries after the first attempt for a transient part failure.
    #[builder(default = 2)]
    pub part_retry_attempts: u32,

    /// Base backoff between part retries; doubled per attempt.
    #[builder(default = 200)]
    pub retry_backoff_ms: u64,

    /// Timeout for a single part request.
    #[builder(default = 120)]
    pub part_timeout_secs: u64,

    /// Timeout for initiate, complete, abort, and download requests.
    #[builder(default = 60)]
    pub request_timeout_secs: u64,

    /// Credentials expiring within this window are treated as expired.
    #[builder(default = 30)]
    pub credential_expiry_skew_secs: i64,

    /// Body format of the finalize request.
    #[builder(default)]
    pub manifest_format: ManifestFormat,

    /// Send `Content-MD5` with every part and single-shot upload.
    #[builder(default = false)]
    pub content_md5: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            endpoint: None,
            path_style: false,
            part_size: DEFAULT_PART_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
            part_retry_attempts: 2,
            retry_backoff_ms: 200,
            part_timeout_secs: 120,
            request_timeout_secs: 60,
            credential_expiry_skew_secs: 30,
            manifest_format: ManifestFormat::default(),
            content_md5: false,
        }
    }
}

impl UploadConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables (falling back to defaults):
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `UPLOAD_PROVIDER` | `oss` |
    /// | `UPLOAD_ENDPOINT` | derived from region |
    /// | `UPLOAD_PATH_STYLE` | `false` |
    /// | `UPLOAD_PART_SIZE` | `5242880` |
    /// | `UPLOAD_CONCURRENCY` | `3` |
    /// | `UPLOAD_PART_RETRIES` | `2` |
    /// | `UPLOAD_RETRY_BACKOFF_MS` | `200` |
    /// | `UPLOAD_PART_TIMEOUT_SECS` | `120` |
    /// | `UPLOAD_REQUEST_TIMEOUT_SECS` | `60` |
    /// | `UPLOAD_CREDENTIAL_SKEW_SECS` | `30` |
    /// | `UPLOAD_MANIFEST_FORMAT` | `xml` |
    /// | `UPLOAD_CONTENT_MD5` | `false` |
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("UPLOAD_PROVIDER") {
            if let Ok(p) = v.parse() {
                config.provider = p;
            }
        }
        if let Ok(v) = std::env::var("UPLOAD_ENDPOINT") {
            if !v.is_empty() {
                config.endpoint = Some(v);
            }
        }
        if let Ok(v) = std::env::var("UPLOAD_PATH_STYLE") {
            config.path_style = parse_bool(&v);
        }
        parse_env("UPLOAD_PART_SIZE", &mut config.part_size);
        parse_env("UPLOAD_CONCURRENCY", &mut config.concurrency);
        parse_env("UPLOAD_PART_RETRIES", &mut config.part_retry_attempts);
        parse_env("UPLOAD_RETRY_BACKOFF_MS", &mut config.retry_backoff_ms);
        parse_env("UPLOAD_PART_TIMEOUT_SECS", &mut config.part_timeout_secs);
        parse_env("UPLOAD_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);
        parse_env(
            "UPLOAD_CREDENTIAL_SKEW_SECS",
            &mut config.credential_expiry_skew_secs,
        );
        parse_env("UPLOAD_MANIFEST_FORMAT", &mut config.manifest_format);
        if let Ok(v) = std::env::var("UPLOAD_CONTENT_MD5") {
            config.content_md5 = parse_bool(&v);
        }

        config
    }

    /// Timeout for a single part request.
    #[must_use]
    pub fn part_timeout(&self) -> Duration {
        Duration::from_secs(self.part_timeout_secs)
    }

    /// Timeout for control requests.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff before retry number `attempt` (0-based).
    #[must_use]
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(1 << attempt.min(10)))
    }

    /// Expiry skew as a `chrono` duration.
    #[must_use]
    pub fn credential_skew(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.credential_expiry_skew_secs)
    }
}

/// Per-transfer options.
///
/// # Examples
///
/// ```
/// use rustack_upload_core::config::UploadOptions;
///
/// let options = UploadOptions::builder()
///     .content_type("video/mp4")
///     .concurrency(5)
///     .build();
/// assert_eq!(options.concurrency, Some(5));
/// assert!(options.part_size.is_none());
/// ```
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct UploadOptions {
    /// Explicit `Content-Type`; sniffed from the key when unset.
    #[builder(default, setter(strip_option, into))]
    pub content_type: Option<String>,

    /// Part size override.
    #[builder(default, setter(strip_option))]
    pub part_size: Option<u64>,

    /// Concurrency override.
    #[builder(default, setter(strip_option))]
    pub concurrency: Option<usize>,

    /// Server-side callback invoked by the provider after the object is
    /// finalized.
    #[builder(default, setter(strip_option))]
    pub callback: Option<Callback>,

    /// User metadata sent as `{prefix}meta-{name}` headers.
    #[builder(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn parse_env<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(v) = std::env::var(name) {
        if let Ok(parsed) = v.parse::<T>() {
            *target = parsed;
        }
    }
}
