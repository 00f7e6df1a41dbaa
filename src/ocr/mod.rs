//! OCR Module
//!
//! Pooled OCR engines keyed by language, plus the recognition service that
//! drives them.
//!
//! The pool guarantees one live engine per normalized language key, created
//! lazily and disposed at shutdown. Each engine runs on its own worker
//! thread; requests queue into it and await the reply.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ocr_server::ocr::{EnginePool, OcrService, TesseractEngineFactory};
//!
//! let factory = Arc::new(TesseractEngineFactory::new(None));
//! let pool = EnginePool::new(factory, Duration::from_secs(10));
//! let service = OcrService::new(pool, "tha+eng");
//!
//! let result = service.recognize_buffer(&image_bytes, Some("eng")).await?;
//! println!("{} ({:.2}%)", result.text, result.confidence);
//! ```

mod engine;
mod language;
mod pool;
mod service;
mod types;

pub use engine::{EngineBackend, EngineFactory, EngineHandle, UnavailableEngineFactory};
pub use language::{LanguageKey, SUPPORTED_LANGUAGES};
pub use pool::EnginePool;
pub use service::{OcrService, DEFAULT_LANGUAGE};
pub use types::{
    OcrError, OcrWord, RawBlock, RawLine, RawParagraph, RawRecognition, RawWord, RecognitionResult,
};

#[cfg(feature = "ocr-tesseract")]
pub use engine::TesseractEngineFactory;
