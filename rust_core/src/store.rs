//! Prediction persistence.
//!
//! Per game the engine keeps an append-only timeline of `PredictionRecord`s
//! (the durable history) plus a single overwritten "latest" record (a
//! read-optimized cache the smoother also reads back). Storage failures here
//! are fatal to the prediction call and propagate; there is no silent
//! fallback for persistence.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::models::PredictionRecord;

/// Typed fatal errors for the prediction and config stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("config version not found: {0}")]
    VersionNotFound(String),
    #[error("config version {0} is not marked rollback-safe")]
    VersionNotSafe(String),
}

/// Per-game timeline plus latest-record store.
#[async_trait]
pub trait PredictionStore: Send + Sync {
    /// Append to the game's timeline and overwrite its latest record.
    async fn append(&self, record: &PredictionRecord) -> Result<(), StoreError>;

    /// The most recently persisted record for a game, if any.
    async fn latest(&self, game_id: &str) -> Result<Option<PredictionRecord>, StoreError>;
}

/// In-memory store used by tests and embedded runs.
#[derive(Default)]
pub struct MemoryPredictionStore {
    timelines: RwLock<FxHashMap<String, Vec<PredictionRecord>>>,
}

impl MemoryPredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeline(&self, game_id: &str) -> Vec<PredictionRecord> {
        self.timelines
            .read()
            .get(game_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl PredictionStore for MemoryPredictionStore {
    async fn append(&self, record: &PredictionRecord) -> Result<(), StoreError> {
        self.timelines
            .write()
            .entry(record.game_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn latest(&self, game_id: &str) -> Result<Option<PredictionRecord>, StoreError> {
        Ok(self
            .timelines
            .read()
            .get(game_id)
            .and_then(|timeline| timeline.last().cloned()))
    }
}
