//! Recognition Service
//!
//! Translates an image source (byte buffer or remote URL) plus a language
//! specifier into a normalized `RecognitionResult`, using the engine pool.

use std::time::Instant;

use super::pool::EnginePool;
use super::types::{OcrError, OcrWord, RawRecognition, RecognitionResult};

/// Default language combination when a request does not specify one.
pub const DEFAULT_LANGUAGE: &str = "tha+eng";

pub struct OcrService {
    pool: EnginePool,
    http: reqwest::Client,
    default_language: String,
}

impl OcrService {
    /// The pool is constructed by the composition root and injected here;
    /// the service never owns engine lifecycle decisions beyond acquire.
    pub fn new(pool: EnginePool, default_language: impl Into<String>) -> Self {
        Self {
            pool,
            http: reqwest::Client::new(),
            default_language: default_language.into(),
        }
    }

    pub fn default_language(&self) -> &str {
        &self.default_language
    }

    pub fn pool(&self) -> &EnginePool {
        &self.pool
    }

    /// Recognize text in an in-memory image.
    ///
    /// The first call for a language pays engine construction latency;
    /// the pool logs that cost rather than hiding it.
    pub async fn recognize_buffer(
        &self,
        image: &[u8],
        language: Option<&str>,
    ) -> Result<RecognitionResult, OcrError> {
        let spec = language.unwrap_or(&self.default_language);
        let started = Instant::now();

        let engine = self.pool.acquire(spec).await?;
        let raw = engine.recognize(image.to_vec()).await.map_err(|e| {
            tracing::error!(key = %engine.key(), error = %e, "recognition failed");
            e
        })?;

        tracing::info!(
            key = %engine.key(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            bytes = image.len(),
            "image processed"
        );

        Ok(normalize(raw))
    }

    /// Recognize text in an image fetched from a URL.
    ///
    /// Same contract as `recognize_buffer`; fetch failures surface as
    /// `Recognition` (the transport detail is logged, not exposed).
    pub async fn recognize_url(
        &self,
        url: &str,
        language: Option<&str>,
    ) -> Result<RecognitionResult, OcrError> {
        tracing::info!(url = %url, "fetching image from URL");

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| OcrError::Recognition(format!("failed to fetch image from URL: {e}")))?;

        if !response.status().is_success() {
            return Err(OcrError::Recognition(format!(
                "image URL returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OcrError::Recognition(format!("failed to read image body: {e}")))?;

        self.recognize_buffer(&bytes, language).await
    }
}

/// Flatten the engine's block → paragraph → line → word hierarchy into an
/// ordered word sequence, trimming the text and rounding confidences to
/// two decimals. A missing level at any depth degrades to an empty word
/// list, never an error.
fn normalize(raw: RawRecognition) -> RecognitionResult {
    let words: Vec<OcrWord> = raw
        .blocks
        .iter()
        .flat_map(|block| &block.paragraphs)
        .flat_map(|para| &para.lines)
        .flat_map(|line| &line.words)
        .map(|word| OcrWord {
            text: word.text.clone(),
            confidence: round2(word.confidence.clamp(0.0, 100.0)),
        })
        .collect();

    RecognitionResult {
        text: raw.text.trim().to_string(),
        confidence: round2(raw.confidence.clamp(0.0, 100.0)),
        words,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
