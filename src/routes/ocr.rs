//! OCR Routes
//!
//! HTTP endpoints for text recognition.
//!
//! Endpoints:
//! - POST /ocr/upload - OCR a single uploaded file (multipart field `file`)
//! - POST /ocr/upload-multiple - OCR up to 10 files (multipart field `files`)
//! - POST /ocr/base64 - OCR a base64-encoded image (optionally data-URI prefixed)
//! - POST /ocr/url - OCR an image fetched from a remote URL
//!
//! All request validation (MIME type, file size, language spec, base64 and
//! URL shape) happens here, before the engine pool is ever touched.

use axum::{
    extract::{DefaultBodyLimit, Multipart, OriginalUri, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::ocr::{LanguageKey, OcrError, SUPPORTED_LANGUAGES};
use crate::state::AppState;

/// Maximum size per uploaded file
pub const MAX_FILE_SIZE: usize = 10 * 1024 * 1024;
/// Maximum number of files in one upload-multiple request
pub const MAX_FILES: usize = 10;

const ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/jpg",
    "image/webp",
    "application/pdf",
];

// ============================================================================
// Error Response
// ============================================================================

/// Error mapped to the uniform envelope
/// `{success, statusCode, message, timestamp, path}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
    path: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>, path: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            path: path.to_string(),
        }
    }

    /// Map a core error onto the envelope. Server-side failures keep their
    /// diagnostic detail in the logs and cross the boundary as generic
    /// messages.
    fn from_ocr(err: OcrError, path: &str) -> Self {
        let message = match &err {
            OcrError::Validation(msg) => msg.clone(),
            OcrError::EngineInit(_) => {
                tracing::error!(error = %err, path = %path, "engine initialization failed");
                "Failed to initialize OCR engine for the requested language".to_string()
            }
            OcrError::Recognition(_) => {
                tracing::error!(error = %err, path = %path, "recognition failed");
                "Failed to process image".to_string()
            }
            OcrError::PoolClosed => err.to_string(),
        };

        Self {
            status: err.status_code(),
            message,
            path: path.to_string(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    status_code: u16,
    message: String,
    timestamp: String,
    path: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = Json(ErrorBody {
            success: false,
            status_code: self.status.as_u16(),
            message: self.message,
            timestamp: chrono::Utc::now().to_rfc3339(),
            path: self.path,
        });

        (self.status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

/// Create the OCR router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/upload-multiple", post(upload_multiple))
        .route("/base64", post(process_base64))
        .route("/url", post(process_url))
        // Room for MAX_FILES maximum-size files plus multipart framing.
        .layer(DefaultBodyLimit::max(MAX_FILES * MAX_FILE_SIZE + 1024 * 1024))
}

// ============================================================================
// Request / Response DTOs
// ============================================================================

#[derive(Deserialize)]
struct LangQuery {
    lang: Option<String>,
}

#[derive(Deserialize)]
struct Base64Request {
    image: String,
    language: Option<String>,
}

#[derive(Deserialize)]
struct UrlRequest {
    url: String,
    language: Option<String>,
}

#[derive(Serialize)]
struct OcrResponse<T: Serialize> {
    success: bool,
    message: String,
    data: T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadData {
    text: String,
    confidence: f64,
    file_name: String,
    file_size: usize,
    language: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MultiUploadData {
    file_name: String,
    text: String,
    confidence: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Base64Data {
    text: String,
    confidence: f64,
    language: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UrlData {
    text: String,
    confidence: f64,
    url: String,
    language: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /ocr/upload?lang=
async fn upload(
    State(state): State<AppState>,
    uri: OriginalUri,
    Query(query): Query<LangQuery>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse<UploadData>>, ApiError> {
    let path = uri.path().to_string();
    let language = validate_language(query.lang.as_deref(), &state, &path)?;

    let files = read_files(&mut multipart, "file", &path).await?;
    let file = files
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::bad_request("Please upload a file", &path))?;
    validate_file(&file, &path)?;

    let result = state
        .ocr()
        .recognize_buffer(&file.data, Some(&language))
        .await
        .map_err(|e| ApiError::from_ocr(e, &path))?;

    Ok(Json(OcrResponse {
        success: true,
        message: "Processed successfully".to_string(),
        data: UploadData {
            text: result.text,
            confidence: result.confidence,
            file_name: file.name,
            file_size: file.data.len(),
            language,
        },
    }))
}

/// POST /ocr/upload-multiple?lang=
async fn upload_multiple(
    State(state): State<AppState>,
    uri: OriginalUri,
    Query(query): Query<LangQuery>,
    mut multipart: Multipart,
) -> Result<Json<OcrResponse<Vec<MultiUploadData>>>, ApiError> {
    let path = uri.path().to_string();
    let language = validate_language(query.lang.as_deref(), &state, &path)?;

    let files = read_files(&mut multipart, "files", &path).await?;
    if files.is_empty() {
        return Err(ApiError::bad_request("Please upload at least one file", &path));
    }
    if files.len() > MAX_FILES {
        return Err(ApiError::bad_request(
            format!("At most {MAX_FILES} files per request"),
            &path,
        ));
    }
    for file in &files {
        validate_file(file, &path)?;
    }

    let results = futures::future::try_join_all(files.iter().map(|file| {
        let language = language.clone();
        let path = path.clone();
        let state = state.clone();
        async move {
            let result = state
                .ocr()
                .recognize_buffer(&file.data, Some(&language))
                .await
                .map_err(|e| ApiError::from_ocr(e, &path))?;
            Ok::<_, ApiError>(MultiUploadData {
                file_name: file.name.clone(),
                text: result.text,
                confidence: result.confidence,
            })
        }
    }))
    .await?;

    Ok(Json(OcrResponse {
        success: true,
        message: format!("Processed {} files successfully", results.len()),
        data: results,
    }))
}

/// POST /ocr/base64
async fn process_base64(
    State(state): State<AppState>,
    uri: OriginalUri,
    Json(request): Json<Base64Request>,
) -> Result<Json<OcrResponse<Base64Data>>, ApiError> {
    let path = uri.path().to_string();
    let language = validate_language(request.language.as_deref(), &state, &path)?;

    if request.image.trim().is_empty() {
        return Err(ApiError::bad_request("Image payload is required", &path));
    }

    let encoded = strip_data_uri(request.image.trim());
    let data = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|_| ApiError::bad_request("Invalid base64 image data", &path))?;

    let result = state
        .ocr()
        .recognize_buffer(&data, Some(&language))
        .await
        .map_err(|e| ApiError::from_ocr(e, &path))?;

    Ok(Json(OcrResponse {
        success: true,
        message: "Processed successfully".to_string(),
        data: Base64Data {
            text: result.text,
            confidence: result.confidence,
            language,
        },
    }))
}

/// POST /ocr/url?lang=
async fn process_url(
    State(state): State<AppState>,
    uri: OriginalUri,
    Query(query): Query<LangQuery>,
    Json(request): Json<UrlRequest>,
) -> Result<Json<OcrResponse<UrlData>>, ApiError> {
    let path = uri.path().to_string();
    let spec = request.language.as_deref().or(query.lang.as_deref());
    let language = validate_language(spec, &state, &path)?;

    if request.url.trim().is_empty() {
        return Err(ApiError::bad_request("Image URL is required", &path));
    }
    validate_url(&request.url, &path)?;

    let result = state
        .ocr()
        .recognize_url(&request.url, Some(&language))
        .await
        .map_err(|e| ApiError::from_ocr(e, &path))?;

    Ok(Json(OcrResponse {
        success: true,
        message: "Processed successfully".to_string(),
        data: UrlData {
            text: result.text,
            confidence: result.confidence,
            url: request.url,
            language,
        },
    }))
}

// ============================================================================
// Helpers
// ============================================================================

struct UploadedFile {
    name: String,
    mime_type: String,
    data: Vec<u8>,
}

/// Read every part with the given field name into memory.
async fn read_files(
    multipart: &mut Multipart,
    field_name: &str,
    path: &str,
) -> Result<Vec<UploadedFile>, ApiError> {
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart payload: {e}"), path))?
    {
        if field.name() != Some(field_name) {
            continue;
        }

        let name = field.file_name().unwrap_or("upload").to_string();
        let mime_type = field.content_type().unwrap_or("").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {e}"), path))?
            .to_vec();

        files.push(UploadedFile {
            name,
            mime_type,
            data,
        });
    }

    Ok(files)
}

/// Enforce MIME and size limits. Runs before any engine is acquired.
fn validate_file(file: &UploadedFile, path: &str) -> Result<(), ApiError> {
    if !ALLOWED_MIME_TYPES.contains(&file.mime_type.as_str()) {
        return Err(ApiError::bad_request(
            "Only JPEG, PNG, WEBP and PDF files are supported",
            path,
        ));
    }

    if file.data.len() > MAX_FILE_SIZE {
        return Err(ApiError::bad_request(
            format!(
                "File '{}' exceeds the {} MiB size limit",
                file.name,
                MAX_FILE_SIZE / (1024 * 1024)
            ),
            path,
        ));
    }

    Ok(())
}

/// Validate the language specifier and return the canonical key the pool
/// will be asked for (also echoed in the response).
fn validate_language(
    spec: Option<&str>,
    state: &AppState,
    path: &str,
) -> Result<String, ApiError> {
    let spec = spec.unwrap_or_else(|| state.ocr().default_language());
    let key = LanguageKey::normalize(spec);

    if !key.is_supported() {
        return Err(ApiError::bad_request(
            format!(
                "Invalid language. Supported: {} (combine with '+')",
                SUPPORTED_LANGUAGES.join(", ")
            ),
            path,
        ));
    }

    Ok(key.as_str().to_string())
}

fn validate_url(url: &str, path: &str) -> Result<(), ApiError> {
    let parsed = reqwest::Url::parse(url)
        .map_err(|_| ApiError::bad_request("Invalid image URL", path))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ApiError::bad_request(
            "Image URL must use http or https",
            path,
        ));
    }

    Ok(())
}

/// Strip an optional `data:<mime>;base64,` prefix.
fn strip_data_uri(input: &str) -> &str {
    match input.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => input,
    }
}
