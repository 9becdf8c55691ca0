//! Server-side upload callbacks.
//!
//! The provider POSTs `body` to `url` once the object is finalized and relays
//! the callback server's answer as the finalize response. The description
//! travels base64-encoded JSON in the provider callback header; custom
//! variables travel the same way in the `-var` companion header.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};

use rustack_upload_auth::Provider;

/// A server-side callback description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Callback {
    /// Callback server URL.
    #[serde(rename = "callbackUrl")]
    pub url: String,

    /// Body template, e.g. `bucket=${bucket}&object=${object}`.
    #[serde(rename = "callbackBody")]
    pub body: String,

    /// MIME type of the callback body.
    #[serde(rename = "callbackBodyType", skip_serializing_if = "Option::is_none")]
    pub body_type: Option<String>,

    /// `Host` header the provider sends to the callback server.
    #[serde(rename = "callbackHost", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Custom `x:` variables substituted into the body.
    #[serde(skip)]
    pub variables: BTreeMap<String, String>,
}

impl Callback {
    /// Create a callback with the default body type.
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            body_type: None,
            host: None,
            variables: BTreeMap::new(),
        }
    }

    /// Headers carrying this callback, as `(name, value)` pairs.
    pub(crate) fn headers(&self, provider: Provider) -> Result<Vec<(String, String)>, serde_json::Error> {
        let name = provider.callback_header();
        let mut headers = vec![(name.to_owned(), BASE64.encode(serde_json::to_vec(self)?))];
        if !self.variables.is_empty() {
            headers.push((
                format!("{name}-var"),
                BASE64.encode(serde_json::to_vec(&self.variables)?),
            ));
        }
        Ok(headers)
    }
}
