//! HTTP API integration tests
//!
//! Exercises the OCR routes end to end against a mock engine factory, so
//! they run without a Tesseract installation. The factory counts engine
//! constructions, which lets the tests assert that invalid requests are
//! rejected before the pool is ever touched.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use axum_test::TestServer;
use base64::Engine as _;
use serde_json::Value;

use ocr_server::config::Config;
use ocr_server::ocr::{
    EngineBackend, EngineFactory, LanguageKey, OcrError, RawBlock, RawLine, RawParagraph,
    RawRecognition, RawWord,
};
use ocr_server::routes::ocr::MAX_FILE_SIZE;
use ocr_server::state::AppState;

struct MockBackend {
    raw: RawRecognition,
}

impl EngineBackend for MockBackend {
    fn recognize(&mut self, _image: &[u8]) -> Result<RawRecognition, OcrError> {
        Ok(self.raw.clone())
    }
}

struct MockFactory {
    created: AtomicUsize,
    raw: RawRecognition,
    fail_init: bool,
}

impl MockFactory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
            raw: hello_raw(),
            fail_init: false,
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            created: AtomicUsize::new(0),
            raw: hello_raw(),
            fail_init: true,
        })
    }

    fn engines_created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl EngineFactory for MockFactory {
    fn create(&self, key: &LanguageKey) -> Result<Box<dyn EngineBackend>, OcrError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        if self.fail_init {
            return Err(OcrError::EngineInit(format!("no model data for {key}")));
        }
        Ok(Box::new(MockBackend {
            raw: self.raw.clone(),
        }))
    }
}

fn hello_raw() -> RawRecognition {
    RawRecognition {
        text: "  HELLO  \n".to_string(),
        confidence: 93.4567,
        blocks: vec![RawBlock {
            paragraphs: vec![RawParagraph {
                lines: vec![RawLine {
                    words: vec![RawWord {
                        text: "HELLO".to_string(),
                        confidence: 93.4567,
                    }],
                }],
            }],
        }],
    }
}

fn test_server(factory: Arc<MockFactory>) -> TestServer {
    let state = AppState::new(Config::default(), factory);
    let app = Router::new()
        .nest("/ocr", ocr_server::routes::ocr::router())
        .with_state(state);
    TestServer::new(app).expect("failed to start test server")
}

const BOUNDARY: &str = "ocr-test-boundary";

/// Build a multipart/form-data body from (field, file name, mime, bytes)
/// file parts.
fn multipart_body(parts: &[(&str, &str, &str, &[u8])]) -> Bytes {
    let mut body = Vec::new();
    for (field, file_name, mime, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {mime}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Bytes::from(body)
}

fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

// ============================================================================
// Upload
// ============================================================================

#[tokio::test]
async fn test_upload_returns_recognized_text() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[("file", "test.png", "image/png", &[1, 2, 3, 4])]);
    let response = server
        .post("/ocr/upload")
        .add_query_param("lang", "eng")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["text"], "HELLO");
    assert_eq!(body["data"]["confidence"], 93.46);
    assert_eq!(body["data"]["fileName"], "test.png");
    assert_eq!(body["data"]["fileSize"], 4);
    assert_eq!(body["data"]["language"], "eng");
    assert_eq!(factory.engines_created(), 1);
}

#[tokio::test]
async fn test_upload_defaults_to_dual_language() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[("file", "scan.png", "image/png", &[1, 2, 3])]);
    let response = server
        .post("/ocr/upload")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["language"], "tha+eng");
}

#[tokio::test]
async fn test_upload_rejects_oversized_file_before_engine() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    // One byte over 10 MiB.
    let oversized = vec![0u8; MAX_FILE_SIZE + 1];
    let body = multipart_body(&[("file", "huge.png", "image/png", &oversized)]);
    let response = server
        .post("/ocr/upload")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["statusCode"], 400);
    assert_eq!(body["path"], "/ocr/upload");
    assert!(body["timestamp"].as_str().is_some());
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test]
async fn test_upload_rejects_unsupported_mime() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[("file", "notes.txt", "text/plain", b"hello")]);
    let response = server
        .post("/ocr/upload")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test]
async fn test_upload_requires_file_field() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[("document", "a.png", "image/png", &[1, 2])]);
    let response = server
        .post("/ocr/upload")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test]
async fn test_upload_rejects_invalid_language() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[("file", "a.png", "image/png", &[1, 2])]);
    let response = server
        .post("/ocr/upload")
        .add_query_param("lang", "klingon")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test]
async fn test_equivalent_language_specs_share_one_engine() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    for lang in ["tha + eng", "tha+eng", " tha+eng "] {
        let body = multipart_body(&[("file", "a.png", "image/png", &[1])]);
        let response = server
            .post("/ocr/upload")
            .add_query_param("lang", lang)
            .content_type(&multipart_content_type())
            .bytes(body)
            .await;
        response.assert_status(StatusCode::OK);
    }

    assert_eq!(factory.engines_created(), 1);
}

// ============================================================================
// Upload multiple
// ============================================================================

#[tokio::test]
async fn test_upload_multiple_returns_per_file_results() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[
        ("files", "one.png", "image/png", &[1, 2]),
        ("files", "two.png", "image/png", &[3, 4]),
    ]);
    let response = server
        .post("/ocr/upload-multiple")
        .add_query_param("lang", "jpn")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["success"], true);
    let data = body["data"].as_array().expect("data should be an array");
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["fileName"], "one.png");
    assert_eq!(data[0]["text"], "HELLO");
    assert_eq!(data[1]["fileName"], "two.png");
    // One language key, one pooled engine for both files.
    assert_eq!(factory.engines_created(), 1);
}

#[tokio::test]
async fn test_upload_multiple_rejects_too_many_files() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    const PIXEL: &[u8] = &[1u8];
    let names: Vec<String> = (0..11).map(|i| format!("f{i}.png")).collect();
    let parts: Vec<(&str, &str, &str, &[u8])> = names
        .iter()
        .map(|name| ("files", name.as_str(), "image/png", PIXEL))
        .collect();
    let response = server
        .post("/ocr/upload-multiple")
        .content_type(&multipart_content_type())
        .bytes(multipart_body(&parts))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test]
async fn test_upload_multiple_requires_at_least_one_file() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[("other", "a.png", "image/png", &[1])]);
    let response = server
        .post("/ocr/upload-multiple")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

// ============================================================================
// Base64
// ============================================================================

#[tokio::test]
async fn test_base64_with_data_uri_prefix() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let encoded = base64::engine::general_purpose::STANDARD.encode(b"fake jpeg bytes");
    let response = server
        .post("/ocr/base64")
        .json(&serde_json::json!({
            "image": format!("data:image/jpeg;base64,{encoded}"),
            "language": "tha+eng",
        }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["text"], "HELLO");
    assert_eq!(body["data"]["language"], "tha+eng");
    assert!(body["data"].get("fileName").is_none());
    assert!(body["data"].get("fileSize").is_none());
}

#[tokio::test]
async fn test_base64_without_prefix() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let encoded = base64::engine::general_purpose::STANDARD.encode(b"raw image");
    let response = server
        .post("/ocr/base64")
        .json(&serde_json::json!({ "image": encoded }))
        .await;

    response.assert_status(StatusCode::OK);
}

#[tokio::test]
async fn test_base64_rejects_malformed_payload() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let response = server
        .post("/ocr/base64")
        .json(&serde_json::json!({ "image": "!!!not-base64!!!" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test]
async fn test_base64_rejects_invalid_language() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let encoded = base64::engine::general_purpose::STANDARD.encode(b"img");
    let response = server
        .post("/ocr/base64")
        .json(&serde_json::json!({ "image": encoded, "language": "elvish" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

// ============================================================================
// URL
// ============================================================================

#[tokio::test]
async fn test_url_rejects_unparseable_url() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let response = server
        .post("/ocr/url")
        .json(&serde_json::json!({ "url": "not a url" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test]
async fn test_url_rejects_non_http_scheme() {
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let response = server
        .post("/ocr/url")
        .json(&serde_json::json!({ "url": "ftp://example.com/scan.png" }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(factory.engines_created(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_url_fetches_and_recognizes_image() {
    // Serve a fake image over loopback HTTP for the service to fetch.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind image server");
    let addr = listener.local_addr().expect("missing local addr");
    let image_app = Router::new().route("/scan.png", get(|| async { vec![1u8, 2, 3, 4] }));
    tokio::spawn(async move {
        axum::serve(listener, image_app)
            .await
            .expect("image server error");
    });

    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let url = format!("http://{addr}/scan.png");
    let response = server
        .post("/ocr/url")
        .json(&serde_json::json!({ "url": url, "language": "eng" }))
        .await;

    response.assert_status(StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["data"]["text"], "HELLO");
    assert_eq!(body["data"]["url"], url);
    assert_eq!(body["data"]["language"], "eng");
    assert_eq!(factory.engines_created(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_url_fetch_failure_is_a_generic_server_error() {
    // Nothing is listening on this port; the fetch fails.
    let factory = MockFactory::new();
    let server = test_server(Arc::clone(&factory));

    let response = server
        .post("/ocr/url")
        .json(&serde_json::json!({ "url": "http://127.0.0.1:9/scan.png" }))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["message"], "Failed to process image");
    assert_eq!(factory.engines_created(), 0);
}

// ============================================================================
// Engine failures
// ============================================================================

#[tokio::test]
async fn test_engine_init_failure_is_a_generic_server_error() {
    let factory = MockFactory::failing();
    let server = test_server(Arc::clone(&factory));

    let body = multipart_body(&[("file", "a.png", "image/png", &[1, 2])]);
    let response = server
        .post("/ocr/upload")
        .content_type(&multipart_content_type())
        .bytes(body)
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(
        body["message"],
        "Failed to initialize OCR engine for the requested language"
    );
    // The failure message must not leak the factory's diagnostic detail.
    assert!(!body["message"].as_str().unwrap_or("").contains("model data"));
}
