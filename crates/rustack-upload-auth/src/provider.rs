//! Provider profile.
//!
//! OSS and S3 share the HMAC-SHA1 header signature scheme but differ in the
//! authorization scheme name, the reserved header prefix, how the object key
//! appears in the canonical resource, and their multipart size limits.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};

/// Characters left unescaped in an object key path (RFC 3986 unreserved + `/`).
pub(crate) const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Characters left unescaped in a query component (RFC 3986 unreserved).
pub(crate) const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;
const GIB: u64 = 1024 * MIB;
const TIB: u64 = 1024 * GIB;

/// A storage provider speaking the HMAC-SHA1 header signature protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Alibaba Cloud OSS and OSS-compatible gateways.
    #[default]
    Oss,
    /// Amazon S3 and S3-compatible stores accepting SigV2.
    S3,
}

/// Multipart size limits enforced by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderLimits {
    /// Smallest allowed size for every part except the last.
    pub min_part_size: u64,
    /// Largest allowed size for a single part.
    pub max_part_size: u64,
    /// Highest part number the provider accepts.
    pub max_parts: u32,
    /// Largest object the provider stores.
    pub max_object_size: u64,
}

impl Provider {
    /// Scheme name placed before the credential in the `Authorization` header.
    #[must_use]
    pub fn auth_scheme(self) -> &'static str {
        match self {
            Self::Oss => "OSS",
            Self::S3 => "AWS",
        }
    }

    /// Reserved lowercase prefix for provider-specific headers.
    #[must_use]
    pub fn header_prefix(self) -> &'static str {
        match self {
            Self::Oss => "x-oss-",
            Self::S3 => "x-amz-",
        }
    }

    /// Header carrying the session token of temporary credentials.
    #[must_use]
    pub fn security_token_header(self) -> &'static str {
        match self {
            Self::Oss => "x-oss-security-token",
            Self::S3 => "x-amz-security-token",
        }
    }

    /// Header carrying the base64-encoded server-side callback description.
    #[must_use]
    pub fn callback_header(self) -> &'static str {
        match self {
            Self::Oss => "x-oss-callback",
            Self::S3 => "x-amz-callback",
        }
    }

    /// Prefix for user-defined object metadata headers.
    #[must_use]
    pub fn meta_prefix(self) -> &'static str {
        match self {
            Self::Oss => "x-oss-meta-",
            Self::S3 => "x-amz-meta-",
        }
    }

    /// Header that, when present, replaces `Date` in the canonical string.
    #[must_use]
    pub fn date_override_header(self) -> Option<&'static str> {
        match self {
            Self::Oss => None,
            Self::S3 => Some("x-amz-date"),
        }
    }

    /// Query parameter naming the access key in a presigned URL.
    #[must_use]
    pub fn presign_access_key_param(self) -> &'static str {
        match self {
            Self::Oss => "OSSAccessKeyId",
            Self::S3 => "AWSAccessKeyId",
        }
    }

    /// XML namespace of the completion manifest, if the provider uses one.
    #[must_use]
    pub fn xml_namespace(self) -> Option<&'static str> {
        match self {
            Self::Oss => None,
            Self::S3 => Some("http://s3.amazonaws.com/doc/2006-03-01/"),
        }
    }

    /// Default service endpoint for a region.
    #[must_use]
    pub fn default_endpoint(self, region: &str) -> String {
        match self {
            Self::Oss => format!("https://oss-{region}.aliyuncs.com"),
            Self::S3 => format!("https://s3.{region}.amazonaws.com"),
        }
    }

    /// The object key as it appears in the canonical resource.
    ///
    /// OSS signs the raw key while S3 signs the URI-encoded path.
    #[must_use]
    pub fn canonical_key(self, key: &str) -> Cow<'_, str> {
        match self {
            Self::Oss => Cow::Borrowed(key),
            Self::S3 => Cow::from(utf8_percent_encode(key, KEY_ENCODE_SET)),
        }
    }

    /// Multipart size limits for this provider.
    #[must_use]
    pub fn limits(self) -> ProviderLimits {
        match self {
            Self::Oss => ProviderLimits {
                min_part_size: 100 * KIB,
                max_part_size: 5 * GIB,
                max_parts: 10_000,
                // 48.8 TiB
                max_object_size: 48 * TIB + 800 * GIB,
            },
            Self::S3 => ProviderLimits {
                min_part_size: 5 * MIB,
                max_part_size: 5 * GIB,
                max_parts: 10_000,
                max_object_size: 5 * TIB,
            },
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oss => f.write_str("oss"),
            Self::S3 => f.write_str("s3"),
        }
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "oss" | "aliyun" => Ok(Self::Oss),
            "s3" | "aws" => Ok(Self::S3),
            other => Err(format!("unknown provider: {other}")),
        }
    }
}
