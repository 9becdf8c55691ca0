//! End-to-end tests for the multipart upload engine.
//!
//! [`MockProvider`] is an in-process OSS-style object store served by hyper
//! on an ephemeral port. It verifies the signature of every request with the
//! same signer the client uses, keeps objects and multipart uploads in
//! memory, checks finalize manifests the way a real provider does, and can
//! be told to fail selected requests.
//!
//! ```text
//! cargo test -p rustack-upload-integration
//! ```

use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Once};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::Utc;
use http::header::{AUTHORIZATION, CONTENT_TYPE, ETAG, HeaderName, HeaderValue, RANGE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use md5::{Digest, Md5};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use rustack_upload_auth::{
    Credential, Provider, ProviderRequest, compute_signature, verify_signature,
};
use rustack_upload_core::UploadConfig;
use rustack_upload_xml::{
    CompleteMultipartUpload, CompleteMultipartUploadResult, ErrorResponse,
    InitiateMultipartUploadResult, from_xml, to_xml,
};

/// Access key the mock provider accepts.
pub const ACCESS_KEY_ID: &str = "AKIDINTEGRATION";
/// Secret matching [`ACCESS_KEY_ID`].
pub const ACCESS_KEY_SECRET: &str = "integration-secret";
/// The only bucket the credentials grant access to.
pub const BUCKET: &str = "uploads";

/// Query parameters of presigned URLs that are not sub-resources.
/// `Content-MD5` header name (not provided as a constant by the `http` crate).
const CONTENT_MD5: HeaderName = HeaderName::from_static("content-md5");

const PRESIGN_PARAMS: [&str; 3] = ["OSSAccessKeyId", "Expires", "Signature"];

static INIT: Once = Once::new();

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A temporary credential valid for an hour.
#[must_use]
pub fn credential() -> Credential {
    credential_with_secret(ACCESS_KEY_SECRET)
}

/// Like [`credential`], signing with `secret`.
#[must_use]
pub fn credential_with_secret(secret: &str) -> Credential {
    Credential::builder()
        .access_key_id(ACCESS_KEY_ID)
        .access_key_secret(secret)
        .session_token("integration-token")
        .expires_at(Utc::now() + chrono::Duration::hours(1))
        .region("local")
        .bucket(BUCKET)
        .build()
}

/// Deterministic payload bytes.
#[must_use]
pub fn payload_bytes(len: usize) -> Bytes {
    (0..len).map(|i| (i % 251) as u8).collect::<Vec<u8>>().into()
}

/// A request as the mock provider received it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method.
    pub method: Method,
    /// Decoded object key.
    pub key: String,
    /// Decoded query parameters.
    pub query: BTreeMap<String, String>,
    /// Received headers.
    pub headers: HeaderMap,
}

impl RecordedRequest {
    /// Part number of a part upload.
    #[must_use]
    pub fn part_number(&self) -> Option<u32> {
        self.query.get("partNumber").and_then(|n| n.parse().ok())
    }

    /// Whether this is a finalize request.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.method == Method::POST && self.query.contains_key("uploadId")
    }
}

/// An injected failure.
#[derive(Debug, Clone)]
pub struct Fault {
    /// Method the fault applies to.
    pub method: Method,
    /// Part number the fault applies to; `None` matches any request.
    pub part_number: Option<u32>,
    /// Status to answer with.
    pub status: StatusCode,
    /// Provider error code in the body.
    pub code: &'static str,
    /// How many matching requests fail.
    pub times: u32,
}

impl Fault {
    /// Fail uploads of `part_number` with `status` `times` times.
    #[must_use]
    pub fn part(part_number: u32, status: StatusCode, code: &'static str, times: u32) -> Self {
        Self {
            method: Method::PUT,
            part_number: Some(part_number),
            status,
            code,
            times,
        }
    }
}

#[derive(Debug)]
struct MultipartUpload {
    key: String,
    parts: BTreeMap<u32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct Store {
    objects: HashMap<String, Bytes>,
    uploads: HashMap<String, MultipartUpload>,
    next_upload: u64,
    requests: Vec<RecordedRequest>,
    faults: Vec<Fault>,
}

impl Store {
    fn take_fault(&mut self, method: &Method, part_number: Option<u32>) -> Option<Fault> {
        let fault = self.faults.iter_mut().find(|f| {
            f.times > 0
                && f.method == *method
                && (f.part_number.is_none() || f.part_number == part_number)
        })?;
        fault.times -= 1;
        Some(fault.clone())
    }
}

/// An in-process object store speaking the OSS wire protocol.
#[derive(Debug)]
pub struct MockProvider {
    addr: SocketAddr,
    store: Arc<Mutex<Store>>,
    shutdown: CancellationToken,
}

impl MockProvider {
    /// Bind an ephemeral port and start serving.
    pub async fn start() -> Self {
        init_tracing();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .unwrap_or_else(|e| panic!("failed to bind mock provider: {e}"));
        let addr = listener
            .local_addr()
            .unwrap_or_else(|e| panic!("failed to read local address: {e}"));
        let store = Arc::new(Mutex::new(Store::default()));
        let shutdown = CancellationToken::new();

        tokio::spawn(accept_loop(listener, Arc::clone(&store), shutdown.clone()));
        info!(addr = %addr, "mock provider listening");

        Self {
            addr,
            store,
            shutdown,
        }
    }

    /// Base URL of the provider.
    #[must_use]
    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Client configuration pointing at this provider.
    #[must_use]
    pub fn config(&self) -> UploadConfig {
        UploadConfig::builder()
            .endpoint(self.endpoint())
            .path_style(true)
            .retry_backoff_ms(10)
            .build()
    }

    /// Make matching requests fail.
    pub fn inject(&self, fault: Fault) {
        self.store.lock().faults.push(fault);
    }

    /// Store an object directly.
    pub fn put_object(&self, key: &str, data: Bytes) {
        self.store.lock().objects.insert(key.to_owned(), data);
    }

    /// A stored object.
    #[must_use]
    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.store.lock().objects.get(key).cloned()
    }

    /// Number of multipart uploads neither completed nor aborted.
    #[must_use]
    pub fn open_uploads(&self) -> usize {
        self.store.lock().uploads.len()
    }

    /// Every authenticated request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.store.lock().requests.clone()
    }

    /// Part numbers of every part upload received so far, in arrival order.
    #[must_use]
    pub fn part_uploads(&self) -> Vec<u32> {
        self.store
            .lock()
            .requests
            .iter()
            .filter(|r| r.method == Method::PUT)
            .filter_map(RecordedRequest::part_number)
            .collect()
    }
}

impl Drop for MockProvider {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn accept_loop(listener: TcpListener, store: Arc<Mutex<Store>>, shutdown: CancellationToken) {
    let http = HttpConnBuilder::new(TokioExecutor::new());

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let store = Arc::clone(&store);
                let svc = service_fn(move |req| serve_request(Arc::clone(&store), req));
                let conn = http.serve_connection(TokioIo::new(stream), svc).into_owned();

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        debug!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = shutdown.cancelled() => break,
        }
    }
}

async fn serve_request(
    store: Arc<Mutex<Store>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => return Ok(error(StatusCode::BAD_REQUEST, "IncompleteBody", &e.to_string())),
    };

    let response = handle(
        &store,
        &parts.method,
        parts.uri.path(),
        parts.uri.query().unwrap_or_default(),
        &parts.headers,
        body,
    );
    debug!(
        method = %parts.method,
        uri = %parts.uri,
        status = %response.status(),
        "mock provider answered"
    );
    Ok(response)
}

fn handle(
    store: &Mutex<Store>,
    method: &Method,
    path: &str,
    query: &str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let Some((bucket, key)) = split_path(path) else {
        return error(StatusCode::BAD_REQUEST, "InvalidURI", path);
    };
    if bucket != BUCKET {
        return error(StatusCode::NOT_FOUND, "NoSuchBucket", &bucket);
    }
    let query = parse_query(query);

    let mut request = ProviderRequest::new(method.clone(), &bucket, &key);
    for (name, value) in &query {
        if !PRESIGN_PARAMS.contains(&name.as_str()) {
            request.sub_resource(name.clone(), value.as_deref());
        }
    }
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            let _ = request.header(name.as_str(), value);
        }
    }

    if let Err(response) = authenticate(&request, &query) {
        return response;
    }
    if let Err(response) = check_content_md5(headers, &body) {
        return response;
    }

    let param = |name: &str| {
        query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone().unwrap_or_default())
    };
    let part_number = param("partNumber").and_then(|n| n.parse::<u32>().ok());

    let mut store = store.lock();
    store.requests.push(RecordedRequest {
        method: method.clone(),
        key: key.clone(),
        query: query
            .iter()
            .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
            .collect(),
        headers: headers.clone(),
    });

    if let Some(fault) = store.take_fault(method, part_number) {
        return error(fault.status, fault.code, "injected fault");
    }

    match (method, param("uploads"), param("uploadId")) {
        (&Method::POST, Some(_), _) => initiate(&mut store, &key),
        (&Method::PUT, _, Some(upload_id)) => match part_number {
            Some(n) => upload_part(&mut store, &key, &upload_id, n, body),
            None => error(StatusCode::BAD_REQUEST, "InvalidArgument", "missing partNumber"),
        },
        (&Method::PUT, _, None) => {
            let etag = etag_of(&body);
            store.objects.insert(key, body);
            respond(StatusCode::OK, &[(ETAG.as_str(), etag)], Bytes::new())
        }
        (&Method::POST, _, Some(upload_id)) => complete(&mut store, &key, &upload_id, headers, &body),
        (&Method::DELETE, _, Some(upload_id)) => match store.uploads.remove(&upload_id) {
            Some(_) => respond(StatusCode::NO_CONTENT, &[], Bytes::new()),
            None => error(StatusCode::NOT_FOUND, "NoSuchUpload", &upload_id),
        },
        (&Method::GET, _, _) => get_object(&store, &key, headers),
        _ => error(StatusCode::METHOD_NOT_ALLOWED, "MethodNotAllowed", method.as_str()),
    }
}

/// `/bucket/key` with the key percent-decoded.
fn split_path(path: &str) -> Option<(String, String)> {
    let (bucket, key) = path.strip_prefix('/')?.split_once('/')?;
    let key = percent_decode_str(key).decode_utf8().ok()?.into_owned();
    if key.is_empty() {
        return None;
    }
    Some((bucket.to_owned(), key))
}

fn parse_query(query: &str) -> Vec<(String, Option<String>)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
            match pair.split_once('=') {
                Some((k, v)) => (decode(k), Some(decode(v))),
                None => (decode(pair), None),
            }
        })
        .collect()
}

fn authenticate(
    request: &ProviderRequest,
    query: &[(String, Option<String>)],
) -> Result<(), Response<Full<Bytes>>> {
    if request.headers().contains_key(AUTHORIZATION) {
        return verify_signature(request, Provider::Oss, ACCESS_KEY_ID, ACCESS_KEY_SECRET)
            .map(|_| ())
            .map_err(|e| error(StatusCode::FORBIDDEN, "SignatureDoesNotMatch", &e.to_string()));
    }

    let param = |name: &str| {
        query
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.clone())
    };
    let (Some(access_key_id), Some(expires), Some(signature)) = (
        param("OSSAccessKeyId"),
        param("Expires"),
        param("Signature"),
    ) else {
        return Err(error(StatusCode::FORBIDDEN, "AccessDenied", "missing authentication"));
    };

    if access_key_id != ACCESS_KEY_ID {
        return Err(error(StatusCode::FORBIDDEN, "InvalidAccessKeyId", &access_key_id));
    }
    match expires.parse::<i64>() {
        Ok(at) if at >= Utc::now().timestamp() => {}
        _ => return Err(error(StatusCode::FORBIDDEN, "AccessDenied", "Request has expired")),
    }

    let string_to_sign = request.string_to_sign(Provider::Oss, request.headers(), Some(&expires));
    if compute_signature(ACCESS_KEY_SECRET, &string_to_sign) == signature {
        Ok(())
    } else {
        Err(error(StatusCode::FORBIDDEN, "SignatureDoesNotMatch", "presigned signature mismatch"))
    }
}

fn check_content_md5(headers: &HeaderMap, body: &[u8]) -> Result<(), Response<Full<Bytes>>> {
    let Some(expected) = headers.get(CONTENT_MD5).and_then(|v| v.to_str().ok()) else {
        return Ok(());
    };
    if BASE64.encode(Md5::digest(body)) == expected {
        Ok(())
    } else {
        Err(error(StatusCode::BAD_REQUEST, "InvalidDigest", expected))
    }
}

fn initiate(store: &mut Store, key: &str) -> Response<Full<Bytes>> {
    store.next_upload += 1;
    let upload_id = format!("upload-{:04}", store.next_upload);
    store.uploads.insert(
        upload_id.clone(),
        MultipartUpload {
            key: key.to_owned(),
            parts: BTreeMap::new(),
        },
    );

    let result = InitiateMultipartUploadResult {
        bucket: Some(BUCKET.to_owned()),
        key: Some(key.to_owned()),
        upload_id: Some(upload_id),
    };
    xml_response(to_xml("InitiateMultipartUploadResult", None, &result))
}

fn upload_part(
    store: &mut Store,
    key: &str,
    upload_id: &str,
    part_number: u32,
    body: Bytes,
) -> Response<Full<Bytes>> {
    let Some(upload) = store.uploads.get_mut(upload_id).filter(|u| u.key == key) else {
        return error(StatusCode::NOT_FOUND, "NoSuchUpload", upload_id);
    };
    let etag = etag_of(&body);
    upload.parts.insert(part_number, (etag.clone(), body));
    respond(StatusCode::OK, &[(ETAG.as_str(), etag)], Bytes::new())
}

fn complete(
    store: &mut Store,
    key: &str,
    upload_id: &str,
    headers: &HeaderMap,
    body: &[u8],
) -> Response<Full<Bytes>> {
    let is_json = headers
        .get(CONTENT_TYPE)
        .is_some_and(|v| v.as_bytes().starts_with(b"application/json"));
    let manifest: CompleteMultipartUpload = if is_json {
        match serde_json::from_slice(body) {
            Ok(m) => m,
            Err(e) => return error(StatusCode::BAD_REQUEST, "MalformedJSON", &e.to_string()),
        }
    } else {
        match from_xml(body) {
            Ok(m) => m,
            Err(e) => return error(StatusCode::BAD_REQUEST, "MalformedXML", &e.to_string()),
        }
    };

    let Some(upload) = store.uploads.get(upload_id).filter(|u| u.key == key) else {
        return error(StatusCode::NOT_FOUND, "NoSuchUpload", upload_id);
    };
    if manifest.parts.is_empty() {
        return error(StatusCode::BAD_REQUEST, "MalformedXML", "no parts");
    }
    if !manifest
        .parts
        .windows(2)
        .all(|w| w[0].part_number < w[1].part_number)
    {
        return error(StatusCode::BAD_REQUEST, "InvalidPartOrder", "parts out of order");
    }

    let mut data = Vec::new();
    for part in &manifest.parts {
        match upload.parts.get(&part.part_number) {
            Some((etag, bytes)) if *etag == part.etag => data.extend_from_slice(bytes),
            _ => {
                return error(
                    StatusCode::BAD_REQUEST,
                    "InvalidPart",
                    &format!("part {} does not match", part.part_number),
                );
            }
        }
    }

    let etag = format!(
        "\"{}-{}\"",
        hex::encode_upper(Md5::digest(&data)),
        manifest.parts.len()
    );
    store.uploads.remove(upload_id);
    store.objects.insert(key.to_owned(), Bytes::from(data));

    // With a callback the provider relays the callback server's answer.
    if let Some(callback) = headers.get("x-oss-callback") {
        let valid = BASE64
            .decode(callback.as_bytes())
            .ok()
            .and_then(|raw| serde_json::from_slice::<serde_json::Value>(&raw).ok())
            .is_some_and(|v| v.get("callbackUrl").is_some());
        if !valid {
            return error(StatusCode::BAD_REQUEST, "InvalidArgument", "malformed callback");
        }
        return respond(
            StatusCode::OK,
            &[(ETAG.as_str(), etag), (CONTENT_TYPE.as_str(), "application/json".to_owned())],
            Bytes::from_static(br#"{"Status":"OK"}"#),
        );
    }

    let result = CompleteMultipartUploadResult {
        location: Some(format!("/{BUCKET}/{key}")),
        bucket: Some(BUCKET.to_owned()),
        key: Some(key.to_owned()),
        etag: Some(etag),
    };
    xml_response(to_xml("CompleteMultipartUploadResult", None, &result))
}

fn get_object(store: &Store, key: &str, headers: &HeaderMap) -> Response<Full<Bytes>> {
    let Some(data) = store.objects.get(key) else {
        return error(StatusCode::NOT_FOUND, "NoSuchKey", key);
    };
    let etag = etag_of(data);

    let range = headers
        .get(RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("bytes="))
        .and_then(|v| v.split_once('-'))
        .and_then(|(start, end)| Some((start.parse::<usize>().ok()?, end.parse::<usize>().ok()?)));

    match range {
        Some((start, end)) if start <= end && start < data.len() => {
            let end = end.min(data.len() - 1);
            respond(
                StatusCode::PARTIAL_CONTENT,
                &[(ETAG.as_str(), etag)],
                data.slice(start..=end),
            )
        }
        Some(_) => error(StatusCode::RANGE_NOT_SATISFIABLE, "InvalidRange", key),
        None => respond(StatusCode::OK, &[(ETAG.as_str(), etag)], data.clone()),
    }
}

fn etag_of(data: &[u8]) -> String {
    format!("\"{}\"", hex::encode_upper(Md5::digest(data)))
}

fn xml_response<E: std::fmt::Display>(xml: Result<Vec<u8>, E>) -> Response<Full<Bytes>> {
    match xml {
        Ok(body) => respond(
            StatusCode::OK,
            &[(CONTENT_TYPE.as_str(), "application/xml".to_owned())],
            Bytes::from(body),
        ),
        Err(e) => error(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", &e.to_string()),
    }
}

fn error(status: StatusCode, code: &str, message: &str) -> Response<Full<Bytes>> {
    let body = ErrorResponse {
        code: code.to_owned(),
        message: message.to_owned(),
        request_id: Some("mock-request".to_owned()),
        host_id: None,
    };
    let xml = to_xml("Error", None, &body).unwrap_or_default();
    respond(
        status,
        &[(CONTENT_TYPE.as_str(), "application/xml".to_owned())],
        Bytes::from(xml),
    )
}

fn respond(status: StatusCode, headers: &[(&str, String)], body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    for (name, value) in headers {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

mod test_download;
mod test_resume;
