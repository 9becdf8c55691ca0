//! Scripted transport and fixtures for unit tests.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{TimeZone, Utc};
use http::header::ETAG;
use http::{HeaderValue, Method, StatusCode};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use rustack_upload_auth::Credential;
use rustack_upload_xml::{CompleteMultipartUploadResult, InitiateMultipartUploadResult, to_xml};

use crate::request::SignedRequest;
use crate::transport::{Transport, TransportError, TransportResponse};

pub(crate) const ENDPOINT: &str = "http://127.0.0.1:9000";
pub(crate) const BUCKET: &str = "bucket";
pub(crate) const UPLOAD_ID: &str = "upload-1";

/// A long-lived test credential.
pub(crate) fn credential() -> Credential {
    Credential::builder()
        .access_key_id("AKIDTEST")
        .access_key_secret("secret")
        .session_token("token")
        .expires_at(Utc.with_ymd_and_hms(2099, 1, 1, 0, 0, 0).unwrap())
        .region("local")
        .bucket(BUCKET)
        .build()
}

/// What the mock answers.
#[derive(Debug, Clone)]
pub(crate) enum MockReply {
    Respond(TransportResponse),
    Fail(TransportError),
    /// Never answers.
    Hang,
}

impl MockReply {
    pub(crate) fn status(status: StatusCode) -> Self {
        Self::Respond(TransportResponse::new(status))
    }

    pub(crate) fn error(err: TransportError) -> Self {
        Self::Fail(err)
    }

    fn ok_with_etag(etag: &str) -> Self {
        let mut response = TransportResponse::new(StatusCode::OK);
        response
            .headers
            .insert(ETAG, HeaderValue::from_str(etag).unwrap());
        Self::Respond(response)
    }

    fn xml(body: Vec<u8>) -> Self {
        let mut response = TransportResponse::new(StatusCode::OK);
        response.body = Bytes::from(body);
        Self::Respond(response)
    }
}

type Handler = Box<dyn Fn(&SignedRequest) -> MockReply + Send + Sync>;
type Hold = Box<dyn Fn(&SignedRequest) -> bool + Send + Sync>;

/// A transport answering from a script and recording every request.
pub(crate) struct MockTransport {
    handler: Handler,
    requests: Mutex<Vec<SignedRequest>>,
    gate: Option<(Arc<Semaphore>, Hold)>,
}

impl fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockTransport")
            .field("requests", &self.requests.lock().len())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    pub(crate) fn new(handler: impl Fn(&SignedRequest) -> MockReply + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    pub(crate) fn always(reply: MockReply) -> Self {
        Self::new(move |_| reply.clone())
    }

    /// Answer with `replies` in order, then with 500.
    pub(crate) fn sequence(replies: Vec<MockReply>) -> Self {
        let replies = Mutex::new(VecDeque::from(replies));
        Self::new(move |_| {
            replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| MockReply::status(StatusCode::INTERNAL_SERVER_ERROR))
        })
    }

    /// A well-behaved object store; `fault` may override any answer.
    pub(crate) fn object_store(
        fault: impl Fn(&SignedRequest) -> Option<MockReply> + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |request| fault(request).unwrap_or_else(|| store_reply(request)))
    }

    /// Hold every part upload until a permit is added to `gate`.
    pub(crate) fn with_gate(self, gate: Arc<Semaphore>) -> Self {
        self.with_gate_on(gate, |request| {
            request.method == Method::PUT && part_number(request).is_some()
        })
    }

    /// Hold every request matching `hold` until a permit is added to `gate`.
    pub(crate) fn with_gate_on(
        mut self,
        gate: Arc<Semaphore>,
        hold: impl Fn(&SignedRequest) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.gate = Some((gate, Box::new(hold)));
        self
    }

    pub(crate) fn requests(&self) -> Vec<SignedRequest> {
        self.requests.lock().clone()
    }

    /// Part numbers of every part upload sent so far.
    pub(crate) fn part_uploads(&self) -> Vec<u32> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.method == Method::PUT)
            .filter_map(part_number)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: SignedRequest) -> Result<TransportResponse, TransportError> {
        self.requests.lock().push(request.clone());

        if let Some((gate, hold)) = &self.gate {
            if hold(&request) {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }
        }

        match (self.handler)(&request) {
            MockReply::Respond(response) => Ok(response),
            MockReply::Fail(err) => Err(err),
            MockReply::Hang => std::future::pending().await,
        }
    }
}

/// Value of query parameter `name` in the request URL.
pub(crate) fn query_param(request: &SignedRequest, name: &str) -> Option<String> {
    let (_, query) = request.url.split_once('?')?;
    query.split('&').find_map(|pair| match pair.split_once('=') {
        Some((k, v)) if k == name => Some(v.to_owned()),
        None if pair == name => Some(String::new()),
        _ => None,
    })
}

pub(crate) fn part_number(request: &SignedRequest) -> Option<u32> {
    query_param(request, "partNumber").and_then(|n| n.parse().ok())
}

/// Object key of a path-style request URL.
pub(crate) fn object_key(request: &SignedRequest) -> String {
    let path = request.url.split_once('?').map_or(request.url.as_str(), |(p, _)| p);
    let prefix = format!("{ENDPOINT}/{BUCKET}/");
    path.strip_prefix(&prefix).unwrap_or(path).to_owned()
}

fn store_reply(request: &SignedRequest) -> MockReply {
    let key = object_key(request);
    match request.method {
        Method::POST if query_param(request, "uploads").is_some() => {
            let result = InitiateMultipartUploadResult {
                bucket: Some(BUCKET.to_owned()),
                key: Some(key),
                upload_id: Some(UPLOAD_ID.to_owned()),
            };
            MockReply::xml(to_xml("InitiateMultipartUploadResult", None, &result).unwrap())
        }
        Method::POST => {
            let result = CompleteMultipartUploadResult {
                location: Some(format!("{ENDPOINT}/{BUCKET}/{key}")),
                bucket: Some(BUCKET.to_owned()),
                key: Some(key),
                etag: Some("\"final-etag\"".to_owned()),
            };
            MockReply::xml(to_xml("CompleteMultipartUploadResult", None, &result).unwrap())
        }
        Method::PUT => match part_number(request) {
            Some(n) => MockReply::ok_with_etag(&format!("\"etag-{n}\"")),
            None => MockReply::ok_with_etag("\"single-etag\""),
        },
        Method::DELETE => MockReply::status(StatusCode::NO_CONTENT),
        _ => {
            let mut response = TransportResponse::new(StatusCode::OK);
            response.body = Bytes::from_static(b"hello world");
            MockReply::Respond(response)
        }
    }
}
