//! Pregame/live mixing, smoothing and calibration.
//!
//! This is the single place where pregame information is progressively
//! replaced by in-game evidence: a progress-driven weight blends the two
//! probabilities in logit space, exponential smoothing suppresses jitter
//! while reacting quickly to real scoring plays, and a configurable
//! calibration curve corrects systematic phase bias.

use crate::config::{CalibrationConfig, CalibrationMode, MixConfig, SmoothingConfig};
use crate::logit::{logistic, prob_to_log_odds};
use crate::models::{ConfidenceTier, GameSituation, Half};

/// Mix weight overrides may not push the live weight outside this band.
const WEIGHT_FLOOR: f64 = 0.05;
const WEIGHT_CEIL: f64 = 0.95;

/// Total applied adjustment above which the confidence tier drops.
const CONFIDENCE_DOWNGRADE_SHIFT: f64 = 0.04;

/// Game phase derived from the inning, used to select calibration params.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GamePhase {
    Early,
    Mid,
    Late,
}

impl GamePhase {
    pub fn from_inning(inning: u8) -> GamePhase {
        match inning {
            0..=3 => GamePhase::Early,
            4..=6 => GamePhase::Mid,
            _ => GamePhase::Late,
        }
    }
}

/// Fraction of regulation completed: 0 at first pitch, 1 at the end of the
/// ninth. Extra innings saturate at 1.
pub fn game_progress(situation: &GameSituation) -> f64 {
    let completed_outs = (situation.inning.max(1) as f64 - 1.0) * 6.0
        + match situation.half {
            Half::Top => 0.0,
            Half::Bottom => 3.0,
        }
        + situation.outs.min(2) as f64;
    (completed_outs / 54.0).clamp(0.0, 1.0)
}

/// Blend the pregame prior and the live-state probability.
///
/// `weight_override` is the lineup weight-mode delta; it is added after the
/// curve and the final weight is clamped so it can never fully silence
/// either source. Returns `(mixed_probability, weight_used)` where the
/// weight is the share given to the live estimate.
pub fn mix(
    pregame: f64,
    live: f64,
    situation: &GameSituation,
    weight_override: f64,
    cfg: &MixConfig,
) -> (f64, f64) {
    let progress = game_progress(situation);
    let curved = cfg.curve.apply(progress);
    let weight = (cfg.min_weight + (cfg.max_weight - cfg.min_weight) * curved + weight_override)
        .clamp(WEIGHT_FLOOR, WEIGHT_CEIL);

    let blended_log_odds =
        weight * prob_to_log_odds(live) + (1.0 - weight) * prob_to_log_odds(pregame);
    (logistic(blended_log_odds), weight)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothOutcome {
    pub value: f64,
    pub score_event: bool,
}

/// Exponential smoothing with score-event acceleration.
///
/// The first observation for a game passes through unsmoothed. A jump larger
/// than the score-event threshold switches to the fast coefficient so the
/// estimate tracks actual scoring plays instead of lagging them. Output is
/// always clamped into `[clamp_lo, clamp_hi]` to keep downstream logit math
/// away from 0/1 degeneracy.
pub fn smooth(previous: Option<f64>, mixed: f64, cfg: &SmoothingConfig) -> SmoothOutcome {
    let outcome = match previous {
        None => SmoothOutcome {
            value: mixed,
            score_event: false,
        },
        Some(prev) => {
            let jump = mixed - prev;
            let score_event = jump.abs() > cfg.score_event_threshold;
            let alpha = if score_event {
                cfg.score_event_alpha
            } else {
                cfg.base_alpha
            };
            SmoothOutcome {
                value: prev + alpha * jump,
                score_event,
            }
        }
    };
    SmoothOutcome {
        value: outcome.value.clamp(cfg.clamp_lo, cfg.clamp_hi),
        score_event: outcome.score_event,
    }
}

/// Final systematic-bias correction, selected by mode and game phase.
pub fn calibrate(prob: f64, phase: GamePhase, cfg: &CalibrationConfig) -> f64 {
    match cfg.mode {
        CalibrationMode::Identity => prob,
        CalibrationMode::PhaseLogit => {
            let params = match phase {
                GamePhase::Early => cfg.early,
                GamePhase::Mid => cfg.mid,
                GamePhase::Late => cfg.late,
            };
            logistic(params.scale * prob_to_log_odds(prob) + params.offset)
        }
    }
}

/// Combine the table's confidence tier with the magnitude of the total
/// adjustment applied: large adjustments mean the output leans harder on
/// thin signals, so the tier drops.
pub fn confidence(source: ConfidenceTier, total_adjustment_magnitude: f64) -> ConfidenceTier {
    if total_adjustment_magnitude > CONFIDENCE_DOWNGRADE_SHIFT {
        source.downgrade()
    } else {
        source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BaseState;
    use chrono::Utc;

    fn situation(inning: u8, half: Half, outs: u8) -> GameSituation {
        GameSituation {
            game_id: "test".to_string(),
            inning,
            half,
            outs,
            bases: BaseState::EMPTY,
            home_score: 0,
            away_score: 0,
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn test_progress_spans_regulation() {
        assert_eq!(game_progress(&situation(1, Half::Top, 0)), 0.0);
        let end = game_progress(&situation(9, Half::Bottom, 2));
        assert!(end > 0.98 && end <= 1.0);
        assert_eq!(game_progress(&situation(14, Half::Bottom, 2)), 1.0);
    }

    #[test]
    fn test_mix_weight_monotone_in_progress() {
        let cfg = MixConfig::default();
        let mut prev_weight = 0.0;
        for inning in 1..=9 {
            for (half, outs) in [(Half::Top, 0), (Half::Top, 2), (Half::Bottom, 1)] {
                let (_, weight) = mix(0.6, 0.4, &situation(inning, half, outs), 0.0, &cfg);
                assert!(
                    weight >= prev_weight,
                    "weight regressed at inning {}: {} < {}",
                    inning,
                    weight,
                    prev_weight
                );
                prev_weight = weight;
            }
        }
    }

    #[test]
    fn test_mix_converges_to_live_late() {
        let cfg = MixConfig::default();
        let pregame = 0.70;
        let live = 0.30;
        let (early, _) = mix(pregame, live, &situation(1, Half::Top, 0), 0.0, &cfg);
        let (late, _) = mix(pregame, live, &situation(9, Half::Bottom, 2), 0.0, &cfg);
        assert!(early > late, "early={:.3} late={:.3}", early, late);
        assert!((late - live).abs() < (early - live).abs());
    }

    #[test]
    fn test_mix_override_clamped() {
        let cfg = MixConfig::default();
        let (_, weight) = mix(0.5, 0.5, &situation(9, Half::Bottom, 2), 1.0, &cfg);
        assert!(weight <= WEIGHT_CEIL);
        let (_, weight) = mix(0.5, 0.5, &situation(1, Half::Top, 0), -1.0, &cfg);
        assert!(weight >= WEIGHT_FLOOR);
    }

    #[test]
    fn test_smooth_first_call_passthrough() {
        let cfg = SmoothingConfig::default();
        for x in [0.1, 0.37, 0.5, 0.93] {
            let out = smooth(None, x, &cfg);
            assert_eq!(out.value, x);
            assert!(!out.score_event);
        }
    }

    #[test]
    fn test_smooth_clamp_invariant() {
        let cfg = SmoothingConfig::default();
        for prev in [None, Some(0.0), Some(1.0), Some(0.5)] {
            for mixed in [-0.5, 0.0, 0.005, 0.5, 0.999, 1.5] {
                let out = smooth(prev, mixed, &cfg);
                assert!(
                    out.value >= cfg.clamp_lo && out.value <= cfg.clamp_hi,
                    "smooth({:?}, {}) = {} outside clamp",
                    prev,
                    mixed,
                    out.value
                );
            }
        }
    }

    #[test]
    fn test_smooth_score_event_reacts_fast() {
        let cfg = SmoothingConfig::default();
        // Small drift: slow coefficient, no event.
        let drift = smooth(Some(0.50), 0.53, &cfg);
        assert!(!drift.score_event);
        assert!((drift.value - (0.50 + cfg.base_alpha * 0.03)).abs() < 1e-12);

        // Scoring play: fast coefficient, flagged as an event.
        let jump = smooth(Some(0.50), 0.70, &cfg);
        assert!(jump.score_event);
        assert!((jump.value - (0.50 + cfg.score_event_alpha * 0.20)).abs() < 1e-12);
        assert!(jump.value > drift.value);
    }

    #[test]
    fn test_calibrate_identity() {
        let cfg = CalibrationConfig::default();
        for p in [0.1, 0.5, 0.8] {
            assert_eq!(calibrate(p, GamePhase::Late, &cfg), p);
        }
    }

    #[test]
    fn test_calibrate_phase_logit_offset() {
        let mut cfg = CalibrationConfig::default();
        cfg.mode = CalibrationMode::PhaseLogit;
        cfg.late.offset = 0.2;

        // Late phase gets the offset, early phase stays neutral.
        assert!(calibrate(0.5, GamePhase::Late, &cfg) > 0.5);
        assert_eq!(calibrate(0.5, GamePhase::Early, &cfg), 0.5);
    }

    #[test]
    fn test_phase_boundaries() {
        assert_eq!(GamePhase::from_inning(3), GamePhase::Early);
        assert_eq!(GamePhase::from_inning(4), GamePhase::Mid);
        assert_eq!(GamePhase::from_inning(6), GamePhase::Mid);
        assert_eq!(GamePhase::from_inning(7), GamePhase::Late);
        assert_eq!(GamePhase::from_inning(12), GamePhase::Late);
    }

    #[test]
    fn test_confidence_downgrades_on_large_adjustment() {
        assert_eq!(confidence(ConfidenceTier::High, 0.01), ConfidenceTier::High);
        assert_eq!(confidence(ConfidenceTier::High, 0.06), ConfidenceTier::Medium);
        assert_eq!(confidence(ConfidenceTier::Low, 0.06), ConfidenceTier::Low);
    }
}
