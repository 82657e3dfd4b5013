//! Prediction engine service loops.
//!
//! Subscribes to the live-state tracker's `game:*:state` channels and runs
//! the prediction pipeline once per update. Each game gets a dedicated
//! worker task fed by an mpsc queue — the per-game serialization point the
//! smoothing history requires — while distinct games predict fully
//! concurrently. Also runs the operator reload listener and the heartbeat.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use winprob_core::models::{channels, BaseState, GameContext, GameSituation, Half};
use winprob_core::reload::ReloadHandle;
use winprob_core::LivePredictor;
use winprob_core::redis::RedisBus;

#[derive(Clone)]
pub struct PredictionEngine {
    engine_id: String,
    redis: RedisBus,
    predictor: Arc<LivePredictor>,
    reload: Arc<ReloadHandle>,
    games: Arc<Mutex<FxHashMap<String, GameWorker>>>,
    heartbeat_interval: Duration,
    queue_depth: usize,
}

struct GameWorker {
    tx: mpsc::Sender<GameSituation>,
    task: tokio::task::JoinHandle<()>,
}

/// Wire format published by the live-state tracker.
#[derive(Debug, Deserialize)]
struct IncomingGameState {
    game_id: String,
    home_team: String,
    away_team: String,
    game_date: NaiveDate,
    inning: u8,
    half: Half,
    outs: u8,
    bases: u8,
    home_score: u16,
    away_score: u16,
    #[serde(default)]
    pregame_home_prob: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
}

impl PredictionEngine {
    pub fn new(
        engine_id: String,
        redis: RedisBus,
        predictor: Arc<LivePredictor>,
        reload: Arc<ReloadHandle>,
        heartbeat_interval: Duration,
        queue_depth: usize,
    ) -> Self {
        Self {
            engine_id,
            redis,
            predictor,
            reload,
            games: Arc::new(Mutex::new(FxHashMap::default())),
            heartbeat_interval,
            queue_depth,
        }
    }

    pub async fn start(&self) -> Result<()> {
        info!("Starting prediction engine {}", self.engine_id);

        let intake = self.clone();
        tokio::spawn(async move {
            if let Err(e) = intake.intake_loop().await {
                error!("Intake loop exited: {}", e);
            }
        });

        let reload_listener = self.clone();
        tokio::spawn(async move {
            reload_listener.reload_listener_loop().await;
        });

        let heartbeat = self.clone();
        tokio::spawn(async move {
            if let Err(e) = heartbeat.heartbeat_loop().await {
                error!("Heartbeat loop exited: {}", e);
            }
        });

        Ok(())
    }

    /// Consume the situation stream and route each update to its game
    /// worker.
    async fn intake_loop(&self) -> Result<()> {
        let mut pubsub = self.redis.psubscribe(channels::GAME_STATE_PATTERN).await?;
        info!("Subscribed to {}", channels::GAME_STATE_PATTERN);

        let mut stream = pubsub.on_message();
        while let Some(msg) = stream.next().await {
            let payload: Vec<u8> = match msg.get_payload::<Vec<u8>>() {
                Ok(p) => p,
                Err(e) => {
                    warn!("State payload read error: {}", e);
                    continue;
                }
            };

            let incoming: IncomingGameState = match serde_json::from_slice(&payload) {
                Ok(state) => state,
                Err(e) => {
                    warn!("State JSON parse error: {}", e);
                    continue;
                }
            };

            self.route(incoming).await;
        }

        Ok(())
    }

    async fn route(&self, incoming: IncomingGameState) {
        let game_id = incoming.game_id.clone();
        let finished = incoming
            .status
            .as_deref()
            .map(|s| s.eq_ignore_ascii_case("final"))
            .unwrap_or(false);

        if finished {
            self.remove_game(&game_id).await;
            return;
        }

        let situation = GameSituation {
            game_id: game_id.clone(),
            inning: incoming.inning,
            half: incoming.half,
            outs: incoming.outs,
            bases: BaseState::from_bits(incoming.bases),
            home_score: incoming.home_score,
            away_score: incoming.away_score,
            fetched_at: incoming.timestamp.unwrap_or_else(Utc::now),
        };

        let mut games = self.games.lock().await;
        if !games.contains_key(&game_id) {
            let ctx = GameContext {
                game_id: game_id.clone(),
                home_team: incoming.home_team.clone(),
                away_team: incoming.away_team.clone(),
                game_date: incoming.game_date,
                pregame_home_prob: incoming.pregame_home_prob,
            };
            games.insert(game_id.clone(), self.spawn_worker(ctx));
            info!(
                "Tracking game {} ({} @ {})",
                game_id, incoming.away_team, incoming.home_team
            );
        }

        if let Some(worker) = games.get(&game_id) {
            // The queue preserves per-game ordering; a full queue means the
            // worker is behind, so the oldest update loses.
            if let Err(e) = worker.tx.try_send(situation) {
                warn!("Dropping update for {}: {}", game_id, e);
            }
        }
    }

    fn spawn_worker(&self, ctx: GameContext) -> GameWorker {
        let (tx, rx) = mpsc::channel(self.queue_depth);
        let predictor = self.predictor.clone();
        let redis = self.redis.clone();
        let task = tokio::spawn(async move {
            run_game_worker(predictor, redis, ctx, rx).await;
        });
        GameWorker { tx, task }
    }

    async fn remove_game(&self, game_id: &str) {
        let mut games = self.games.lock().await;
        if let Some(worker) = games.remove(game_id) {
            // Dropping the sender lets the worker drain its queue and exit.
            drop(worker.tx);
            let _ = worker.task;
            info!("Stopped tracking game {}", game_id);
        }
    }

    /// Operator and guardrail reload surface: any message on the reload
    /// channel re-reads the current config version. Safe to call with no
    /// pending change.
    async fn reload_listener_loop(&self) {
        loop {
            match self.redis.subscribe(channels::ENGINE_RELOAD).await {
                Ok(mut pubsub) => {
                    info!("Reload listener on {}", channels::ENGINE_RELOAD);
                    let mut stream = pubsub.on_message();
                    while let Some(_msg) = stream.next().await {
                        match self.reload.reload().await {
                            Ok(true) => info!("Configuration reloaded"),
                            Ok(false) => debug!("Reload requested, no change pending"),
                            Err(e) => error!("Reload failed: {}", e),
                        }
                    }
                }
                Err(e) => {
                    error!("Failed to subscribe to reload channel: {}", e);
                }
            }

            // Reconnect delay
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    }

    async fn heartbeat_loop(&self) -> Result<()> {
        loop {
            let (game_ids, count) = {
                let games = self.games.lock().await;
                (games.keys().cloned().collect::<Vec<_>>(), games.len())
            };

            let payload = json!({
                "engine_id": self.engine_id,
                "game_count": count,
                "games": game_ids,
                "timestamp": Utc::now().to_rfc3339(),
            });

            if let Err(e) = self.redis.publish(channels::ENGINE_HEARTBEAT, &payload).await {
                warn!("Heartbeat publish error: {}", e);
            }

            tokio::time::sleep(self.heartbeat_interval).await;
        }
    }
}

async fn run_game_worker(
    predictor: Arc<LivePredictor>,
    redis: RedisBus,
    ctx: GameContext,
    mut rx: mpsc::Receiver<GameSituation>,
) {
    while let Some(situation) = rx.recv().await {
        match predictor.predict(&ctx, &situation).await {
            Ok(record) => {
                debug!(
                    "{}: inning {} {:?} -> home {:.1}%",
                    ctx.game_id,
                    record.inning,
                    record.half,
                    record.final_home_prob * 100.0
                );
                let channel = channels::game_prediction(&ctx.game_id);
                if let Err(e) = redis.publish(&channel, &record).await {
                    warn!("Prediction publish error for {}: {}", ctx.game_id, e);
                }
            }
            Err(e) => {
                // Persistence failures are fatal per prediction, not per
                // game: keep the worker alive for the next update.
                error!("Prediction failed for {}: {}", ctx.game_id, e);
            }
        }
    }
    debug!("Worker for {} drained", ctx.game_id);
}
