//! Prediction Service
//!
//! Live win-probability engine for in-progress games.
//!
//! This service:
//! - Consumes game-state updates from the live-state tracker via Redis
//! - Runs the prediction pipeline (table lookup, bounded adjustments,
//!   pregame/live mixing, smoothing, calibration) once per update
//! - Persists the per-game prediction timeline and latest record
//! - Publishes each prediction for the event-stream layer
//! - Runs the guardrail loop that disables features or rolls back the
//!   engine config on sustained quality degradation

mod config;
mod engine;

use anyhow::Result;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;
use std::time::Duration;

use config::ServiceConfig;
use engine::PredictionEngine;
use winprob_core::clients::HttpSignalSource;
use winprob_core::config_store::{ConfigVersionManager, FsConfigStore};
use winprob_core::db::{self, DbPoolConfig, PgPredictionStore};
use winprob_core::guardrail::GuardrailController;
use winprob_core::observability::{init_metrics, init_tracing};
use winprob_core::quality::PromQualitySource;
use winprob_core::redis::RedisBus;
use winprob_core::reload::config_channel;
use winprob_core::{EngineConfig, LivePredictor, WinExpectancyTable};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing("prediction_service");

    let cfg = ServiceConfig::from_env()?;
    init_metrics(cfg.metrics_listen)?;

    info!("Starting Prediction Service ({})...", cfg.engine_id);

    // Versioned engine config with an atomic current pointer. First boot
    // seeds the default tuning as the initial rollback-safe baseline.
    let config_store = Arc::new(FsConfigStore::new(cfg.config_dir.clone(), &cfg.config_name));
    let manager = ConfigVersionManager::new(config_store);
    let initial = match manager.current().await? {
        Some(version) => version.config,
        None => {
            let default = EngineConfig::default();
            let id = manager.save(&default, true).await?;
            info!("Seeded default engine config as {}", id);
            default
        }
    };
    manager.cleanup(cfg.keep_versions).await?;
    let (reload, handle) = config_channel(initial, manager.clone());
    let reload = Arc::new(reload);

    // Prediction pipeline wiring.
    let table = Arc::new(WinExpectancyTable::build());
    let signals = Arc::new(HttpSignalSource::new(&cfg.signal_base_url, cfg.fetch_timeout));
    let pool = db::connect_pool(None, &DbPoolConfig::default()).await?;
    let prediction_store = Arc::new(PgPredictionStore::new(pool));
    let predictor = Arc::new(
        LivePredictor::new(table, handle, signals, prediction_store)
            .with_fetch_timeout(cfg.fetch_timeout),
    );

    let redis = RedisBus::new().await?;
    let engine = PredictionEngine::new(
        cfg.engine_id.clone(),
        redis,
        predictor,
        reload.clone(),
        cfg.heartbeat_interval,
        cfg.queue_depth,
    );
    engine.start().await?;

    // Guardrail loop: independent cadence, coupled to the engine only
    // through the config store and the reload handle.
    let quality = Arc::new(PromQualitySource::new(
        &cfg.quality_endpoint,
        Duration::from_secs(5),
    ));
    let controller = GuardrailController::new(quality, manager, reload, cfg.guardrail.clone());
    tokio::spawn(controller.run());

    // Keep running
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
