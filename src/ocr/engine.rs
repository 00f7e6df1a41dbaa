//! OCR engine instances
//!
//! A Tesseract handle is expensive to create (it loads language model data
//! at init) and is not safe to share between threads, so each engine
//! instance lives on its own dedicated worker thread. Requests submit jobs
//! over a bounded channel and await the reply; the channel doubles as a
//! per-instance queue that serializes access to the underlying engine.
//!
//! The Tesseract backend itself is gated behind the `ocr-tesseract` feature
//! so the server builds and tests without a system Tesseract installation.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use super::language::LanguageKey;
use super::types::{OcrError, RawRecognition};

/// Jobs queued ahead of an engine before senders start waiting.
const ENGINE_QUEUE_DEPTH: usize = 32;

/// A recognition backend. Runs on the engine's worker thread, so
/// implementations do not need to be `Send`.
pub trait EngineBackend {
    fn recognize(&mut self, image: &[u8]) -> Result<RawRecognition, OcrError>;
}

/// Creates backends. Invoked on the worker thread itself, which is what
/// keeps non-`Send` engine handles from ever crossing threads.
pub trait EngineFactory: Send + Sync + 'static {
    fn create(&self, key: &LanguageKey) -> Result<Box<dyn EngineBackend>, OcrError>;
}

struct EngineJob {
    image: Vec<u8>,
    reply: oneshot::Sender<Result<RawRecognition, OcrError>>,
}

/// Handle to one live engine instance, owned by the pool.
///
/// Cloning the `Arc` keeps the instance's job queue open, so a request that
/// is mid-recognition during shutdown drains before the worker exits.
pub struct EngineHandle {
    key: LanguageKey,
    created_at: Instant,
    tx: Mutex<Option<mpsc::Sender<EngineJob>>>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl EngineHandle {
    /// Spawn a worker thread and wait for the backend to initialize.
    ///
    /// Initialization failure joins the thread and returns `EngineInit`,
    /// leaving nothing behind for the pool to cache.
    pub(crate) async fn spawn(
        key: LanguageKey,
        factory: Arc<dyn EngineFactory>,
    ) -> Result<Arc<Self>, OcrError> {
        let (tx, rx) = mpsc::channel(ENGINE_QUEUE_DEPTH);
        let (init_tx, init_rx) = oneshot::channel();

        let worker_key = key.clone();
        let thread = std::thread::Builder::new()
            .name(format!("ocr-{}", key))
            .spawn(move || worker_loop(worker_key, factory, rx, init_tx))
            .map_err(|e| OcrError::EngineInit(format!("failed to spawn worker thread: {e}")))?;

        match init_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                // Worker exits right after reporting the failure.
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(OcrError::EngineInit(
                    "engine worker exited before initialization completed".to_string(),
                ));
            }
        }

        Ok(Arc::new(Self {
            key,
            created_at: Instant::now(),
            tx: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        }))
    }

    pub fn key(&self) -> &LanguageKey {
        &self.key
    }

    /// How long this instance has been alive. Observability only.
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Queue an image for recognition and wait for the result.
    pub async fn recognize(&self, image: Vec<u8>) -> Result<RawRecognition, OcrError> {
        let tx = self
            .tx
            .lock()
            .map_err(|_| OcrError::Recognition("engine handle lock poisoned".to_string()))?
            .clone()
            .ok_or(OcrError::PoolClosed)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(EngineJob {
            image,
            reply: reply_tx,
        })
        .await
        .map_err(|_| OcrError::PoolClosed)?;

        reply_rx
            .await
            .map_err(|_| OcrError::Recognition("engine worker exited unexpectedly".to_string()))?
    }

    /// Close the queue and join the worker, waiting at most `grace` for
    /// in-flight jobs to drain. A worker that overruns the grace period is
    /// left to finish in the background.
    pub(crate) async fn dispose(&self, grace: Duration) -> Result<(), OcrError> {
        // Dropping the pool-side sender closes the queue once any senders
        // cloned by in-flight requests are gone too.
        self.tx
            .lock()
            .map_err(|_| OcrError::Recognition("engine handle lock poisoned".to_string()))?
            .take();

        let thread = self
            .thread
            .lock()
            .map_err(|_| OcrError::Recognition("engine handle lock poisoned".to_string()))?
            .take();

        let Some(thread) = thread else {
            return Ok(()); // already disposed
        };

        let join = tokio::task::spawn_blocking(move || thread.join());
        match tokio::time::timeout(grace, join).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(_))) => Err(OcrError::Recognition(
                "engine worker panicked during shutdown".to_string(),
            )),
            Ok(Err(e)) => Err(OcrError::Recognition(format!("task join error: {e}"))),
            Err(_) => Err(OcrError::Recognition(format!(
                "engine did not drain within {}s grace period",
                grace.as_secs()
            ))),
        }
    }
}

fn worker_loop(
    key: LanguageKey,
    factory: Arc<dyn EngineFactory>,
    mut rx: mpsc::Receiver<EngineJob>,
    init_tx: oneshot::Sender<Result<(), OcrError>>,
) {
    let mut backend = match factory.create(&key) {
        Ok(backend) => {
            let _ = init_tx.send(Ok(()));
            backend
        }
        Err(e) => {
            let _ = init_tx.send(Err(e));
            return;
        }
    };

    while let Some(job) = rx.blocking_recv() {
        let result = backend.recognize(&job.image);
        // The caller may have disconnected; its result is discarded.
        let _ = job.reply.send(result);
    }

    tracing::debug!(key = %key, "engine worker exiting");
}

/// Fallback factory used when the server is built without Tesseract
/// support. Every acquire fails with `EngineInit`, which keeps the HTTP
/// surface functional (requests get a clean 500 instead of a build error).
pub struct UnavailableEngineFactory;

impl EngineFactory for UnavailableEngineFactory {
    fn create(&self, key: &LanguageKey) -> Result<Box<dyn EngineBackend>, OcrError> {
        Err(OcrError::EngineInit(format!(
            "tesseract support is not compiled in (enable the `ocr-tesseract` feature); \
             cannot create engine for '{key}'"
        )))
    }
}

#[cfg(feature = "ocr-tesseract")]
pub use tesseract_backend::TesseractEngineFactory;

#[cfg(feature = "ocr-tesseract")]
mod tesseract_backend {
    use tesseract::Tesseract;

    use super::{EngineBackend, EngineFactory};
    use crate::ocr::language::LanguageKey;
    use crate::ocr::types::{OcrError, RawBlock, RawLine, RawParagraph, RawRecognition, RawWord};

    /// Builds engines backed by a local Tesseract installation.
    pub struct TesseractEngineFactory {
        tessdata_path: Option<String>,
    }

    impl TesseractEngineFactory {
        /// `tessdata_path` points at the directory holding `.traineddata`
        /// files; `None` uses Tesseract's compiled-in default.
        pub fn new(tessdata_path: Option<String>) -> Self {
            Self { tessdata_path }
        }
    }

    impl EngineFactory for TesseractEngineFactory {
        fn create(&self, key: &LanguageKey) -> Result<Box<dyn EngineBackend>, OcrError> {
            // Initialize eagerly so unsupported languages or missing model
            // data fail the acquire, not the first recognition.
            let instance = init_tesseract(self.tessdata_path.as_deref(), key.as_str())?;
            Ok(Box::new(TesseractBackend {
                tessdata_path: self.tessdata_path.clone(),
                language: key.as_str().to_string(),
                instance: Some(instance),
            }))
        }
    }

    fn init_tesseract(datapath: Option<&str>, language: &str) -> Result<Tesseract, OcrError> {
        Tesseract::new(datapath, Some(language))
            .map_err(|e| OcrError::EngineInit(format!("language '{language}': {e}")))
    }

    struct TesseractBackend {
        tessdata_path: Option<String>,
        language: String,
        instance: Option<Tesseract>,
    }

    impl EngineBackend for TesseractBackend {
        fn recognize(&mut self, image: &[u8]) -> Result<RawRecognition, OcrError> {
            // The builder-style API consumes the handle on failure, so take
            // it out and only put it back after a successful pass; a failed
            // pass re-initializes on the next call.
            let tess = match self.instance.take() {
                Some(tess) => tess,
                None => init_tesseract(self.tessdata_path.as_deref(), &self.language)
                    .map_err(|e| OcrError::Recognition(e.to_string()))?,
            };

            let mut tess = tess
                .set_image_from_mem(image)
                .map_err(|e| OcrError::Recognition(format!("failed to load image: {e}")))?
                .recognize()
                .map_err(|e| OcrError::Recognition(format!("recognition failed: {e}")))?;

            let text = tess
                .get_text()
                .map_err(|e| OcrError::Recognition(format!("failed to read text: {e}")))?;
            let confidence = tess.mean_text_conf() as f64;
            let tsv = tess
                .get_tsv_text(0)
                .map_err(|e| OcrError::Recognition(format!("failed to read tsv: {e}")))?;

            self.instance = Some(tess);

            Ok(RawRecognition {
                text,
                confidence,
                blocks: parse_tsv(&tsv),
            })
        }
    }

    /// Rebuild the block/paragraph/line/word hierarchy from Tesseract's TSV
    /// output. Columns: level, page, block, par, line, word, left, top,
    /// width, height, conf, text; level 5 rows are words. Structural rows
    /// without words are skipped, so a blank page yields no blocks.
    fn parse_tsv(tsv: &str) -> Vec<RawBlock> {
        let mut blocks: Vec<RawBlock> = Vec::new();
        let mut last: Option<(i32, i32, i32)> = None;

        for row in tsv.lines() {
            let cols: Vec<&str> = row.split('\t').collect();
            if cols.len() < 12 || cols[0] != "5" {
                continue;
            }
            let (Ok(block), Ok(par), Ok(line), Ok(conf)) = (
                cols[2].parse::<i32>(),
                cols[3].parse::<i32>(),
                cols[4].parse::<i32>(),
                cols[10].parse::<f64>(),
            ) else {
                continue;
            };
            let word = cols[11].trim();
            if word.is_empty() {
                continue;
            }

            match last {
                Some((b, p, l)) => {
                    if block != b {
                        blocks.push(RawBlock {
                            paragraphs: vec![RawParagraph {
                                lines: vec![RawLine { words: vec![] }],
                            }],
                        });
                    } else if par != p {
                        if let Some(blk) = blocks.last_mut() {
                            blk.paragraphs.push(RawParagraph {
                                lines: vec![RawLine { words: vec![] }],
                            });
                        }
                    } else if line != l {
                        if let Some(para) =
                            blocks.last_mut().and_then(|blk| blk.paragraphs.last_mut())
                        {
                            para.lines.push(RawLine { words: vec![] });
                        }
                    }
                }
                None => {
                    blocks.push(RawBlock {
                        paragraphs: vec![RawParagraph {
                            lines: vec![RawLine { words: vec![] }],
                        }],
                    });
                }
            }
            last = Some((block, par, line));

            if let Some(cur) = blocks
                .last_mut()
                .and_then(|blk| blk.paragraphs.last_mut())
                .and_then(|para| para.lines.last_mut())
            {
                cur.words.push(RawWord {
                    text: word.to_string(),
                    confidence: conf,
                });
            }
        }

        blocks
    }

}
