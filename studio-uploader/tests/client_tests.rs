//! Upload client tests against a local relay stand-in
//!
//! Each test binds an axum server on 127.0.0.1:0. Retry tests use a 10ms
//! base delay so the backoff schedule stays short.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::{HeaderMap, StatusCode},
    routing::{post, put},
    Json, Router,
};
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use studio_uploader::progress::{noop, ProgressFn};
use studio_uploader::{
    chunked, direct, presigned, RetryPolicy, UploadClient, UploadError, UploaderConfig,
};

const FAST_RETRY: RetryPolicy = RetryPolicy {
    max_retries: 3,
    base_delay: Duration::from_millis(10),
};

#[derive(Clone, Default)]
struct Relay {
    hits: Arc<Mutex<u32>>,
    /// Requests answered with `fail_status` before the server starts succeeding
    fail_first: u32,
    fail_status: Option<StatusCode>,
    /// Multipart parts of each successful request: (field, file name, data)
    requests: Arc<Mutex<Vec<Vec<(String, Option<String>, Vec<u8>)>>>>,
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
}

impl Relay {
    fn failing(fail_first: u32, status: StatusCode) -> Self {
        Self {
            fail_first,
            fail_status: Some(status),
            ..Self::default()
        }
    }

    fn hits(&self) -> u32 {
        *self.hits.lock().unwrap()
    }

    /// Count a hit; `Some(status)` when this hit should fail
    fn should_fail(&self) -> Option<StatusCode> {
        let mut hits = self.hits.lock().unwrap();
        *hits += 1;
        match self.fail_status {
            Some(status) if *hits <= self.fail_first => Some(status),
            _ => None,
        }
    }
}

async fn collect_parts(mut multipart: Multipart) -> Vec<(String, Option<String>, Vec<u8>)> {
    let mut parts = Vec::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let data = field.bytes().await.unwrap().to_vec();
        parts.push((name, file_name, data));
    }
    parts
}

fn text_field(parts: &[(String, Option<String>, Vec<u8>)], name: &str) -> Option<String> {
    parts
        .iter()
        .find(|(field, _, _)| field == name)
        .map(|(_, _, data)| String::from_utf8(data.clone()).unwrap())
}

async fn whole_file(
    State(relay): State<Relay>,
    headers: HeaderMap,
    multipart: Multipart,
) -> (StatusCode, Json<Value>) {
    let parts = collect_parts(multipart).await;
    if let Some(status) = relay.should_fail() {
        return (status, Json(json!({ "error": { "code": "X", "message": "nope" } })));
    }
    relay.auth_headers.lock().unwrap().push(
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    );
    let key = text_field(&parts, "key").unwrap_or_else(|| "derived".to_string());
    relay.requests.lock().unwrap().push(parts);
    (
        StatusCode::OK,
        Json(json!({
            "status": "complete",
            "uploadId": "u-direct",
            "url": format!("https://cdn.test/{}", key)
        })),
    )
}

async fn chunk(State(relay): State<Relay>, multipart: Multipart) -> (StatusCode, Json<Value>) {
    let parts = collect_parts(multipart).await;
    if let Some(status) = relay.should_fail() {
        return (status, Json(json!({ "error": { "code": "X", "message": "busy" } })));
    }
    let upload_id = text_field(&parts, "uploadId").unwrap();
    let total: u32 = text_field(&parts, "totalChunks").unwrap().parse().unwrap();

    let received = {
        let mut requests = relay.requests.lock().unwrap();
        requests.push(parts);
        requests.len() as u32
    };

    let body = if received == total {
        json!({ "status": "complete", "uploadId": upload_id, "url": "https://cdn.test/assembled" })
    } else {
        json!({ "status": "pending", "uploadId": upload_id, "received": received, "total": total })
    };
    (StatusCode::OK, Json(body))
}

async fn presigned_put(State(relay): State<Relay>, headers: HeaderMap, body: Bytes) -> StatusCode {
    if let Some(status) = relay.should_fail() {
        return status;
    }
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    relay
        .requests
        .lock()
        .unwrap()
        .push(vec![("body".to_string(), content_type, body.to_vec())]);
    StatusCode::OK
}

async fn spawn_relay(relay: Relay) -> String {
    let router = Router::new()
        .route("/api/upload", post(whole_file))
        .route("/api/upload/chunk", post(chunk))
        .route("/bucket/object", put(presigned_put))
        .with_state(relay);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client(base_url: &str, token: Option<&str>, chunk_size: usize) -> UploadClient {
    let config = UploaderConfig {
        base_url: Some(base_url.to_string()),
        token: token.map(str::to_string),
        chunk_size,
        timeout_secs: 10,
        ..UploaderConfig::default()
    };
    UploadClient::new(&config)
        .unwrap()
        .with_retry_policy(FAST_RETRY)
}

fn fixture(content: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".mp4")
        .tempfile()
        .unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

fn recorder() -> (ProgressFn, Arc<Mutex<Vec<u8>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (Arc::new(move |p| sink.lock().unwrap().push(p)), seen)
}

// =============================================================================
// Direct upload
// =============================================================================

#[tokio::test]
async fn test_direct_upload_sends_file_and_token() {
    let relay = Relay::default();
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, Some("tok-1"), 1024);
    let file = fixture(b"frame data");
    let (progress, seen) = recorder();

    let receipt = direct::upload_file(&client, file.path(), &client.upload_url(), None, progress)
        .await
        .unwrap();

    assert!(receipt.is_complete());
    assert_eq!(receipt.url.as_deref(), Some("https://cdn.test/derived"));
    assert_eq!(relay.hits(), 1);

    let requests = relay.requests.lock().unwrap().clone();
    let (field, file_name, data) = &requests[0][0];
    assert_eq!(field, "file");
    assert!(file_name.as_deref().unwrap().ends_with(".mp4"));
    assert_eq!(data, b"frame data");

    assert_eq!(
        relay.auth_headers.lock().unwrap()[0].as_deref(),
        Some("Bearer tok-1")
    );
    assert_eq!(seen.lock().unwrap().last(), Some(&100));
}

#[tokio::test]
async fn test_direct_upload_forwards_key() {
    let relay = Relay::default();
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, None, 1024);
    let file = fixture(b"abc");

    let receipt = direct::upload_file(
        &client,
        file.path(),
        &client.upload_url(),
        Some("clips/intro.mp4"),
        noop(),
    )
    .await
    .unwrap();

    assert_eq!(receipt.url.as_deref(), Some("https://cdn.test/clips/intro.mp4"));
    assert_eq!(relay.auth_headers.lock().unwrap()[0], None);
}

#[tokio::test]
async fn test_direct_upload_retries_three_times_on_5xx() {
    let relay = Relay::failing(u32::MAX, StatusCode::SERVICE_UNAVAILABLE);
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, None, 1024);
    let file = fixture(b"abc");

    let err = direct::upload_file(&client, file.path(), &client.upload_url(), None, noop())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Server { status: 503, .. }), "got {:?}", err);
    assert_eq!(relay.hits(), 4);
}

#[tokio::test]
async fn test_direct_upload_does_not_retry_4xx() {
    let relay = Relay::failing(u32::MAX, StatusCode::UNAUTHORIZED);
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, Some("expired"), 1024);
    let file = fixture(b"abc");

    let err = direct::upload_file(&client, file.path(), &client.upload_url(), None, noop())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Client { status: 401, .. }), "got {:?}", err);
    assert_eq!(relay.hits(), 1);
}

#[tokio::test]
async fn test_direct_upload_recovers_after_transient_failures() {
    let relay = Relay::failing(2, StatusCode::BAD_GATEWAY);
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, None, 1024);
    let file = fixture(b"abc");

    let receipt = direct::upload_file(&client, file.path(), &client.upload_url(), None, noop())
        .await
        .unwrap();

    assert!(receipt.is_complete());
    assert_eq!(relay.hits(), 3);
    assert_eq!(relay.requests.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_direct_upload_connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = client(&format!("http://{}", addr), None, 1024);
    let file = fixture(b"abc");

    let err = direct::upload_file(&client, file.path(), &client.upload_url(), None, noop())
        .await
        .unwrap_err();

    assert!(matches!(err, UploadError::Transport(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_direct_upload_missing_file_is_io_error() {
    let client = client("http://127.0.0.1:9", None, 1024);

    let err = direct::upload_file(
        &client,
        std::path::Path::new("/nonexistent/clip.mp4"),
        &client.upload_url(),
        None,
        noop(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, UploadError::Io(_)));
}

// =============================================================================
// Chunked upload
// =============================================================================

#[tokio::test]
async fn test_chunked_upload_sends_indexed_chunks() {
    let relay = Relay::default();
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, None, 4);
    let file = fixture(b"0123456789");
    let (progress, seen) = recorder();

    let receipt = chunked::upload_chunked(&client, file.path(), Some("video/mp4"), progress)
        .await
        .unwrap();

    assert!(receipt.is_complete());
    assert_eq!(receipt.url.as_deref(), Some("https://cdn.test/assembled"));

    let requests = relay.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 3);

    let upload_id = text_field(&requests[0], "uploadId").unwrap();
    assert_eq!(upload_id.len(), 36);

    let mut assembled = Vec::new();
    for (index, parts) in requests.iter().enumerate() {
        assert_eq!(text_field(parts, "uploadId").unwrap(), upload_id);
        assert_eq!(text_field(parts, "chunkIndex").unwrap(), index.to_string());
        assert_eq!(text_field(parts, "totalChunks").unwrap(), "3");
        assert_eq!(text_field(parts, "fileSize").unwrap(), "10");
        assert_eq!(text_field(parts, "contentType").unwrap(), "video/mp4");
        let (_, _, data) = parts.iter().find(|(field, _, _)| field == "chunk").unwrap();
        assembled.extend_from_slice(data);
    }
    assert_eq!(assembled, b"0123456789");

    assert_eq!(*seen.lock().unwrap(), vec![40, 80, 100]);
}

#[tokio::test]
async fn test_chunked_upload_retries_single_chunk() {
    let relay = Relay::failing(1, StatusCode::INTERNAL_SERVER_ERROR);
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, None, 5);
    let file = fixture(b"0123456789");

    let receipt = chunked::upload_chunked(&client, file.path(), None, noop())
        .await
        .unwrap();

    assert!(receipt.is_complete());
    assert_eq!(relay.hits(), 3);
    assert_eq!(relay.requests.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn test_chunked_upload_empty_file_sends_one_chunk() {
    let relay = Relay::default();
    let base = spawn_relay(relay.clone()).await;
    let client = client(&base, None, 4);
    let file = fixture(b"");

    let receipt = chunked::upload_chunked(&client, file.path(), None, noop())
        .await
        .unwrap();

    assert!(receipt.is_complete());
    let requests = relay.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(text_field(&requests[0], "totalChunks").unwrap(), "1");
}

// =============================================================================
// Pre-signed URL transfer
// =============================================================================

#[tokio::test]
async fn test_presigned_put_with_retry() {
    let relay = Relay::failing(1, StatusCode::SERVICE_UNAVAILABLE);
    let base = spawn_relay(relay.clone()).await;
    let http = reqwest::Client::new();
    let file = fixture(b"signed payload");
    let (progress, seen) = recorder();

    presigned::upload_presigned(
        &http,
        &FAST_RETRY,
        file.path(),
        &format!("{}/bucket/object?X-Amz-Signature=abc", base),
        Some("video/mp4"),
        progress,
    )
    .await
    .unwrap();

    assert_eq!(relay.hits(), 2);
    let requests = relay.requests.lock().unwrap().clone();
    let (_, content_type, body) = &requests[0][0];
    assert_eq!(content_type.as_deref(), Some("video/mp4"));
    assert_eq!(body, b"signed payload");
    assert_eq!(seen.lock().unwrap().last(), Some(&100));
}

#[tokio::test]
async fn test_presigned_forbidden_not_retried() {
    let relay = Relay::failing(u32::MAX, StatusCode::FORBIDDEN);
    let base = spawn_relay(relay.clone()).await;
    let file = fixture(b"x");

    let err = presigned::upload_presigned(
        &reqwest::Client::new(),
        &FAST_RETRY,
        file.path(),
        &format!("{}/bucket/object", base),
        None,
        noop(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, UploadError::Client { status: 403, .. }));
    assert_eq!(relay.hits(), 1);
}
