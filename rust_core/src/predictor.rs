//! Live prediction pipeline.
//!
//! One invocation per observed game-state change: table lookup → bounded
//! adjustments (bullpen, fatigue, lineup) → pregame/live mix → smoothing →
//! calibration → confidence → persist. Signal fetches run concurrently and
//! are individually fail-soft; only persistence failures abort a prediction.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::adjust::{
    bullpen_adjustment, fatigue_adjustment, lineup_prior_adjustment, lineup_weight_delta,
};
use crate::clients::SignalSource;
use crate::config::LineupMode;
use crate::mixing::{calibrate, confidence, mix, smooth, GamePhase};
use crate::models::{
    AdjustmentOutcome, AdjustmentResult, BullpenRating, FatigueSignal, GameContext, GameSituation,
    LineupSignal, PitcherRef, PredictionRecord,
};
use crate::reload::ConfigHandle;
use crate::store::{PredictionStore, StoreError};
use crate::table::WinExpectancyTable;

pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_millis(750);

/// Result of one attempted signal fetch, before the adjustment is applied.
enum FetchOutcome<T> {
    Disabled,
    Failed(String),
    Ready(T),
}

/// Uniform attempt-with-fallback wrapper for a signal fetch: disabled
/// features short-circuit, and both errors and timeouts degrade to a tagged
/// failure instead of aborting the prediction.
async fn attempt_fetch<T, F>(
    feature: &'static str,
    enabled: bool,
    timeout: Duration,
    fut: F,
) -> FetchOutcome<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    if !enabled {
        return FetchOutcome::Disabled;
    }
    match tokio::time::timeout(timeout, fut).await {
        Err(_) => {
            warn!(feature, "signal fetch timed out");
            metrics::counter!("winprob_adjustment_skipped_total", "feature" => feature)
                .increment(1);
            FetchOutcome::Failed("signal fetch timed out".to_string())
        }
        Ok(Err(e)) => {
            warn!(feature, error = %e, "signal fetch failed");
            metrics::counter!("winprob_adjustment_skipped_total", "feature" => feature)
                .increment(1);
            FetchOutcome::Failed(e.to_string())
        }
        Ok(Ok(value)) => FetchOutcome::Ready(value),
    }
}

/// Turn a fetch outcome into (next probability, tagged outcome), applying
/// the adjustment only when the signal actually arrived.
fn resolve<T>(
    fetched: FetchOutcome<T>,
    feature: &'static str,
    prob: f64,
    apply: impl FnOnce(T) -> AdjustmentResult,
) -> (f64, AdjustmentOutcome) {
    match fetched {
        FetchOutcome::Disabled => (
            prob,
            AdjustmentOutcome::Skipped {
                reason: "feature disabled".to_string(),
            },
        ),
        FetchOutcome::Failed(reason) => (prob, AdjustmentOutcome::Skipped { reason }),
        FetchOutcome::Ready(value) => {
            let result = apply(value);
            metrics::counter!("winprob_adjustment_applied_total", "feature" => feature)
                .increment(1);
            metrics::histogram!("winprob_adjustment_shift", "feature" => feature)
                .record(result.shift.abs());
            (prob + result.shift, AdjustmentOutcome::Applied(result))
        }
    }
}

/// The per-call prediction pipeline. Stateless between invocations except
/// through the prediction store's latest record.
pub struct LivePredictor {
    table: Arc<WinExpectancyTable>,
    config: ConfigHandle,
    signals: Arc<dyn SignalSource>,
    store: Arc<dyn PredictionStore>,
    fetch_timeout: Duration,
}

impl LivePredictor {
    pub fn new(
        table: Arc<WinExpectancyTable>,
        config: ConfigHandle,
        signals: Arc<dyn SignalSource>,
        store: Arc<dyn PredictionStore>,
    ) -> Self {
        Self {
            table,
            config,
            signals,
            store,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Run the full pipeline for one observed situation.
    ///
    /// Callers must serialize invocations per game (the service gives each
    /// game a single worker); distinct games may run fully concurrently.
    pub async fn predict(
        &self,
        ctx: &GameContext,
        situation: &GameSituation,
    ) -> Result<PredictionRecord, StoreError> {
        let cfg = self.config.current();
        let sit = situation.sanitized();
        let pregame_prior = ctx.pregame_home_prob.unwrap_or(0.5).clamp(0.01, 0.99);

        // Step 1: live-state baseline.
        let entry = self.table.lookup(&sit);
        let state_prob = entry.home_win_prob;

        // Steps 2-4: the three signal fetches have no cross-dependency and
        // run concurrently; each one is independently timed out and
        // fail-soft.
        let timeout = self.fetch_timeout;
        let (bullpen_fetch, fatigue_fetch, lineup_fetch) = tokio::join!(
            attempt_fetch("bullpen", cfg.bullpen.enabled, timeout, async {
                let (home, away) = tokio::try_join!(
                    self.signals
                        .bullpen_rating(ctx.game_date, &ctx.home_team, &ctx.game_id),
                    self.signals
                        .bullpen_rating(ctx.game_date, &ctx.away_team, &ctx.game_id),
                )?;
                Ok::<(BullpenRating, BullpenRating), anyhow::Error>((home, away))
            }),
            attempt_fetch("fatigue", cfg.fatigue.enabled, timeout, async {
                let pitcher = self.signals.current_pitcher(&ctx.game_id).await?;
                let signal = self
                    .signals
                    .pitcher_fatigue(ctx.game_date, &pitcher.player_id, &ctx.game_id)
                    .await?;
                Ok::<(PitcherRef, FatigueSignal), anyhow::Error>((pitcher, signal))
            }),
            attempt_fetch("lineup", cfg.lineup.enabled, timeout, async {
                let (home, away) = tokio::try_join!(
                    self.signals
                        .lineup_confirmation(ctx.game_date, &ctx.home_team, &ctx.game_id),
                    self.signals
                        .lineup_confirmation(ctx.game_date, &ctx.away_team, &ctx.game_id),
                )?;
                Ok::<(LineupSignal, LineupSignal), anyhow::Error>((home, away))
            }),
        );

        let (state_after_bullpen, bullpen_outcome) =
            resolve(bullpen_fetch, "bullpen", state_prob, |(home, away)| {
                bullpen_adjustment(state_prob, home.z_score, away.z_score, sit.inning, &cfg.bullpen)
            });

        let (state_after_fatigue, fatigue_outcome) =
            resolve(fatigue_fetch, "fatigue", state_after_bullpen, |(pitcher, signal)| {
                let mut result = fatigue_adjustment(
                    state_after_bullpen,
                    signal.index,
                    sit.half.pitching_side(),
                    sit.inning,
                    &cfg.fatigue,
                );
                result.reason = format!("{} pitcher={}", result.reason, pitcher.player_id);
                result
            });

        // Lineup has two independent modes: a prior-mode logit shift and a
        // weight-mode nudge consumed by the mixer below.
        let mut weight_override = 0.0;
        let (pregame_adjusted, lineup_outcome) = match lineup_fetch {
            FetchOutcome::Disabled => (
                pregame_prior,
                AdjustmentOutcome::Skipped {
                    reason: "feature disabled".to_string(),
                },
            ),
            FetchOutcome::Failed(reason) => {
                (pregame_prior, AdjustmentOutcome::Skipped { reason })
            }
            FetchOutcome::Ready((home, away)) => {
                if matches!(cfg.lineup.mode, LineupMode::Weight | LineupMode::Both) {
                    weight_override = lineup_weight_delta(sit.inning, &home, &away, &cfg.lineup);
                }
                if matches!(cfg.lineup.mode, LineupMode::Prior | LineupMode::Both) {
                    let result = lineup_prior_adjustment(pregame_prior, &home, &away, &cfg.lineup);
                    metrics::counter!("winprob_adjustment_applied_total", "feature" => "lineup")
                        .increment(1);
                    metrics::histogram!("winprob_adjustment_shift", "feature" => "lineup")
                        .record(result.shift.abs());
                    (pregame_prior + result.shift, AdjustmentOutcome::Applied(result))
                } else {
                    (
                        pregame_prior,
                        AdjustmentOutcome::Applied(AdjustmentResult {
                            shift: 0.0,
                            raw_shift: 0.0,
                            reason: format!("weight-mode delta {:+.3}", weight_override),
                        }),
                    )
                }
            }
        };

        // Steps 5-8: mix, smooth against the last persisted value, calibrate
        // and grade confidence.
        let (mixed_prob, mix_weight) = mix(
            pregame_adjusted,
            state_after_fatigue,
            &sit,
            weight_override,
            &cfg.mix,
        );

        let previous = self
            .store
            .latest(&ctx.game_id)
            .await?
            .map(|r| r.final_home_prob);
        let smoothed = smooth(previous, mixed_prob, &cfg.smoothing);

        let final_home_prob = calibrate(
            smoothed.value,
            GamePhase::from_inning(sit.inning),
            &cfg.calibration,
        )
        .clamp(cfg.smoothing.clamp_lo, cfg.smoothing.clamp_hi);

        let total_shift = bullpen_outcome.applied_shift().abs()
            + fatigue_outcome.applied_shift().abs()
            + lineup_outcome.applied_shift().abs();
        let tier = confidence(entry.confidence, total_shift);

        // Step 9: assemble and persist. This is the only fatal path.
        let record = PredictionRecord {
            record_id: Uuid::new_v4().to_string(),
            game_id: ctx.game_id.clone(),
            created_at: Utc::now(),
            inning: sit.inning,
            half: sit.half,
            outs: sit.outs,
            bases: sit.bases,
            home_score: sit.home_score,
            away_score: sit.away_score,
            pregame_prior,
            pregame_adjusted,
            state_prob,
            state_after_bullpen,
            state_after_fatigue,
            mix_weight,
            mixed_prob,
            final_home_prob,
            final_away_prob: 1.0 - final_home_prob,
            score_event: smoothed.score_event,
            confidence: tier,
            bullpen: bullpen_outcome,
            fatigue: fatigue_outcome,
            lineup: lineup_outcome,
        };

        match self.store.append(&record).await {
            Ok(()) => {
                metrics::counter!("winprob_predictions_total").increment(1);
                Ok(record)
            }
            Err(e) => {
                metrics::counter!("winprob_prediction_failures_total").increment(1);
                error!(game_id = %ctx.game_id, error = %e, "failed to persist prediction");
                Err(e)
            }
        }
    }
}
