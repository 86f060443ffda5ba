// src/engine/pool.rs

//! Bounded-concurrency front of the adapter. Two configurations with one
//! contract: a fixed pool of engine workers, or a single engine behind a
//! FIFO queue.

use tokio::sync::{mpsc, Mutex};
use tracing::info;

use super::{AnalysisResult, EngineError, UciEngine};

pub struct EnginePool {
    slots: mpsc::Sender<UciEngine>,
    free: Mutex<mpsc::Receiver<UciEngine>>,
    size: usize,
}

impl EnginePool {
    async fn checkout(&self) -> Option<UciEngine> {
        self.free.lock().await.recv().await
    }

    fn checkin(&self, engine: UciEngine) {
        // The channel is sized to the pool; a send can only fail if the
        // pool is being torn down, in which case the engine is dropped
        // and its process reaped by kill_on_drop.
        let _ = self.slots.try_send(engine);
    }
}

pub enum EngineHandle {
    Pool(EnginePool),
    Queue(Mutex<UciEngine>),
}

impl EngineHandle {
    /// Spawn `size` engine workers; `analyze` picks any idle one.
    pub async fn spawn_pool(path: &str, size: usize) -> Result<Self, EngineError> {
        let size = size.max(1);
        let (tx, rx) = mpsc::channel(size);
        for i in 0..size {
            let engine = UciEngine::spawn(path, &format!("pool-{i}")).await?;
            tx.try_send(engine)
                .map_err(|_| EngineError::Protocol("pool channel full at startup".into()))?;
        }
        info!(size, path, "engine pool ready");
        Ok(EngineHandle::Pool(EnginePool {
            slots: tx,
            free: Mutex::new(rx),
            size,
        }))
    }

    /// Spawn a single engine; all `analyze` calls serialize behind it.
    pub async fn spawn_queue(path: &str) -> Result<Self, EngineError> {
        let engine = UciEngine::spawn(path, "queue").await?;
        info!(path, "engine queue ready");
        Ok(EngineHandle::Queue(Mutex::new(engine)))
    }

    pub fn worker_count(&self) -> usize {
        match self {
            EngineHandle::Pool(pool) => pool.size,
            EngineHandle::Queue(_) => 1,
        }
    }

    /// The one operation of the adapter. Never returns an error: failures
    /// degrade to an empty result inside the engine itself.
    pub async fn analyze(&self, fen: &str, depth: u32, multipv: u32) -> AnalysisResult {
        match self {
            EngineHandle::Pool(pool) => {
                let Some(mut engine) = pool.checkout().await else {
                    return AnalysisResult::empty(fen, depth, multipv);
                };
                let result = engine.analyze(fen, depth, multipv).await;
                pool.checkin(engine);
                result
            }
            EngineHandle::Queue(slot) => {
                let mut engine = slot.lock().await;
                engine.analyze(fen, depth, multipv).await
            }
        }
    }

    pub async fn shutdown(self) {
        match self {
            EngineHandle::Pool(pool) => {
                let mut rx = pool.free.into_inner();
                drop(pool.slots);
                while let Some(engine) = rx.recv().await {
                    engine.shutdown().await;
                }
            }
            EngineHandle::Queue(slot) => {
                slot.into_inner().shutdown().await;
            }
        }
    }
}
