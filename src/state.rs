//! Application state management

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::ocr::{EngineFactory, EnginePool, OcrService};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    pub config: Config,
    pub ocr: OcrService,
}

impl AppState {
    /// Create the application state.
    ///
    /// The engine factory is chosen by the composition root (Tesseract in
    /// the server binary, mocks in tests) and injected here; the pool and
    /// service are built around it.
    pub fn new(config: Config, factory: Arc<dyn EngineFactory>) -> Self {
        let pool = EnginePool::new(
            factory,
            Duration::from_secs(config.ocr.shutdown_grace_secs),
        );
        let ocr = OcrService::new(pool, config.ocr.default_language.clone());

        Self {
            inner: Arc::new(AppStateInner { config, ocr }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the OCR service
    pub fn ocr(&self) -> &OcrService {
        &self.inner.ocr
    }

    /// Shut down the engine pool gracefully.
    ///
    /// Must be called before process exit so every pooled engine gets a
    /// disposal attempt.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        self.inner.ocr.pool().shutdown().await;
    }
}
