//! OCR Types
//!
//! Result shapes produced by the recognition service and the raw
//! hierarchical output returned by engine backends.

use serde::Serialize;

/// Normalized recognition output returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct RecognitionResult {
    /// Full recognized text, trimmed of leading/trailing whitespace
    pub text: String,
    /// Overall confidence (0-100, rounded to 2 decimal places)
    pub confidence: f64,
    /// Word-level results flattened from the engine's block hierarchy,
    /// in reading order. Empty when the engine found no text.
    pub words: Vec<OcrWord>,
}

/// Single word result
#[derive(Debug, Clone, Serialize)]
pub struct OcrWord {
    pub text: String,
    /// Confidence for this word (0-100, rounded to 2 decimal places)
    pub confidence: f64,
}

/// Raw engine output before normalization.
///
/// Tesseract structures a page as blocks containing paragraphs containing
/// lines containing words; any level may be absent on a blank page.
#[derive(Debug, Clone, Default)]
pub struct RawRecognition {
    pub text: String,
    pub confidence: f64,
    pub blocks: Vec<RawBlock>,
}

#[derive(Debug, Clone, Default)]
pub struct RawBlock {
    pub paragraphs: Vec<RawParagraph>,
}

#[derive(Debug, Clone, Default)]
pub struct RawParagraph {
    pub lines: Vec<RawLine>,
}

#[derive(Debug, Clone, Default)]
pub struct RawLine {
    pub words: Vec<RawWord>,
}

#[derive(Debug, Clone)]
pub struct RawWord {
    pub text: String,
    pub confidence: f64,
}

/// OCR error types
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    /// Request rejected before reaching the engine (bad MIME, oversized
    /// file, malformed base64, invalid URL or language spec).
    #[error("{0}")]
    Validation(String),

    /// Engine construction failed (e.g. missing language model data).
    /// The failing key is not cached, so a later request can retry.
    #[error("Failed to initialize OCR engine: {0}")]
    EngineInit(String),

    /// Engine failed mid-recognition. The message carries internal
    /// diagnostic detail for logging; callers see a generic message.
    #[error("OCR processing failed: {0}")]
    Recognition(String),

    /// The pool no longer admits work because shutdown has begun.
    #[error("OCR service is shutting down")]
    PoolClosed,
}

impl OcrError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::PoolClosed => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
