//! Engine Pool
//!
//! Guarantees exactly one live engine instance per normalized language key:
//! created lazily on first use, reused for every later request with that
//! key, and disposed exactly once at shutdown.
//!
//! Concurrent first requests for the same key must not both pay the
//! (expensive) construction cost, so the map stores a per-key `OnceCell`
//! slot: the slot is inserted first, then populated, and the loser of a
//! race awaits the winner's instance. A failed construction leaves the
//! slot empty so a later request can retry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OnceCell, RwLock};

use super::engine::{EngineFactory, EngineHandle};
use super::language::LanguageKey;
use super::types::OcrError;

type EngineSlot = Arc<OnceCell<Arc<EngineHandle>>>;

/// Process-wide mapping from language key to engine instance.
///
/// Cheap to clone; constructed once by the composition root and injected
/// into the recognition service.
#[derive(Clone)]
pub struct EnginePool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    factory: Arc<dyn EngineFactory>,
    engines: RwLock<HashMap<LanguageKey, EngineSlot>>,
    closed: AtomicBool,
    shutdown_grace: Duration,
}

impl EnginePool {
    pub fn new(factory: Arc<dyn EngineFactory>, shutdown_grace: Duration) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                factory,
                engines: RwLock::new(HashMap::new()),
                closed: AtomicBool::new(false),
                shutdown_grace,
            }),
        }
    }

    /// Get the engine for a language specifier, constructing it on first
    /// use. Fails with `EngineInit` when construction fails and with
    /// `PoolClosed` once shutdown has begun.
    pub async fn acquire(&self, spec: &str) -> Result<Arc<EngineHandle>, OcrError> {
        let key = LanguageKey::normalize(spec);
        self.acquire_key(key).await
    }

    async fn acquire_key(&self, key: LanguageKey) -> Result<Arc<EngineHandle>, OcrError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(OcrError::PoolClosed);
        }

        let slot = self.slot_for(&key).await;

        let handle = slot
            .get_or_try_init(|| async {
                tracing::info!(key = %key, "creating OCR engine");
                let started = std::time::Instant::now();
                let handle = EngineHandle::spawn(key.clone(), Arc::clone(&self.inner.factory)).await?;
                tracing::info!(
                    key = %key,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "OCR engine ready"
                );
                Ok::<_, OcrError>(handle)
            })
            .await?;

        Ok(Arc::clone(handle))
    }

    /// Look up the key's slot, inserting an empty one on first sight.
    async fn slot_for(&self, key: &LanguageKey) -> EngineSlot {
        {
            let engines = self.inner.engines.read().await;
            if let Some(slot) = engines.get(key) {
                return Arc::clone(slot);
            }
        }

        let mut engines = self.inner.engines.write().await;
        Arc::clone(engines.entry(key.clone()).or_default())
    }

    /// Dispose every pooled instance and clear the map.
    ///
    /// Idempotent: the first call flips the closed flag and drains the map,
    /// later calls are no-ops. Each disposal failure is logged and skipped
    /// so every instance gets a disposal attempt.
    pub async fn shutdown(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        let engines = {
            let mut engines = self.inner.engines.write().await;
            std::mem::take(&mut *engines)
        };

        tracing::info!(count = engines.len(), "shutting down engine pool");

        for (key, slot) in engines {
            let Some(handle) = slot.get() else {
                continue; // never finished construction
            };
            match handle.dispose(self.inner.shutdown_grace).await {
                Ok(()) => {
                    tracing::info!(key = %key, uptime_s = handle.uptime().as_secs(), "engine disposed");
                }
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "failed to dispose engine");
                }
            }
        }
    }

    /// Number of pooled keys (including ones still constructing).
    pub async fn len(&self) -> usize {
        self.inner.engines.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.engines.read().await.is_empty()
    }
}
