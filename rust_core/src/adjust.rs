//! Bounded probability adjustments.
//!
//! Each adjustment nudges a probability in logit space by a small amount
//! derived from an external signal (bullpen strength, pitcher fatigue,
//! lineup confirmation), gated by an inning ramp so adjustments are inert
//! early and strongest late. The binding safety guarantee is the final hard
//! clamp: the adjusted probability never moves more than `max_shift` from
//! the original, regardless of what the logit math produced.

use crate::config::{CurveShape, FeatureConfig, LineupConfig};
use crate::logit::{logistic, prob_to_log_odds};
use crate::models::{AdjustmentResult, LineupSignal, LineupStatus, Side};

/// Inning ramp: 0 before `start_inning`, 1 at inning 9, monotone between.
pub fn inning_weight(inning: u8, start_inning: u8, curve: CurveShape) -> f64 {
    if inning < start_inning {
        return 0.0;
    }
    if start_inning >= 9 || inning >= 9 {
        return 1.0;
    }
    let frac = (inning - start_inning + 1) as f64 / (10 - start_inning) as f64;
    curve.apply(frac)
}

/// Shift `prob` by `logit_delta` in log-odds space, then clamp the result to
/// within `max_shift` of the original probability. The clamp is applied last
/// and unconditionally.
fn bounded_logit_shift(prob: f64, logit_delta: f64, max_shift: f64, reason: String) -> AdjustmentResult {
    let unclamped = logistic(prob_to_log_odds(prob) + logit_delta);
    let raw_shift = unclamped - prob;
    let bounded = unclamped.clamp(prob - max_shift, prob + max_shift);
    AdjustmentResult {
        shift: bounded - prob,
        raw_shift,
        reason,
    }
}

/// Bullpen strength adjustment.
///
/// Signal is the difference of the two bullpens' z-scores; a stronger home
/// bullpen pushes the home probability up. Contributes from `start_inning`
/// (default 7) onward.
pub fn bullpen_adjustment(
    prob: f64,
    home_z: f64,
    away_z: f64,
    inning: u8,
    cfg: &FeatureConfig,
) -> AdjustmentResult {
    let weight = inning_weight(inning, cfg.start_inning, cfg.curve);
    let signal = home_z - away_z;
    let logit_delta = cfg.coefficient * weight * signal;
    bounded_logit_shift(
        prob,
        logit_delta,
        cfg.max_shift,
        format!(
            "bullpen z_home={:.2} z_away={:.2} weight={:.2}",
            home_z, away_z, weight
        ),
    )
}

/// Pitcher fatigue adjustment.
///
/// Fatigue hurts the pitching team: a tiring home pitcher lowers the home
/// probability, a tiring away pitcher raises it. Contributes from
/// `start_inning` (default 4) onward.
pub fn fatigue_adjustment(
    prob: f64,
    fatigue_index: f64,
    pitching: Side,
    inning: u8,
    cfg: &FeatureConfig,
) -> AdjustmentResult {
    let weight = inning_weight(inning, cfg.start_inning, cfg.curve);
    let direction = match pitching {
        Side::Home => -1.0,
        Side::Away => 1.0,
    };
    let signal = fatigue_index.clamp(0.0, 1.0);
    let logit_delta = direction * cfg.coefficient * weight * signal;
    bounded_logit_shift(
        prob,
        logit_delta,
        cfg.max_shift,
        format!(
            "fatigue index={:.2} pitching={:?} weight={:.2}",
            signal, pitching, weight
        ),
    )
}

/// Lineup prior-mode adjustment: shifts the pregame prior by an amount
/// proportional to the net count of missing key players, scaled by how much
/// of each lineup is actually confirmed, and hard-capped.
pub fn lineup_prior_adjustment(
    pregame_prob: f64,
    home: &LineupSignal,
    away: &LineupSignal,
    cfg: &LineupConfig,
) -> AdjustmentResult {
    // A missing-player count is only as trustworthy as the confirmation it
    // came from.
    let home_penalty = home.missing_key_players as f64 * home.completeness.clamp(0.0, 1.0);
    let away_penalty = away.missing_key_players as f64 * away.completeness.clamp(0.0, 1.0);
    let logit_delta = cfg.prior_coefficient * (away_penalty - home_penalty);
    bounded_logit_shift(
        pregame_prob,
        logit_delta,
        cfg.prior_max_shift,
        format!(
            "lineup missing home={} away={} completeness home={:.2} away={:.2}",
            home.missing_key_players, away.missing_key_players, home.completeness, away.completeness
        ),
    )
}

/// Lineup weight-mode nudge: while lineups are unconfirmed in the early
/// innings the pregame prior is less trustworthy, so the mixing weight moves
/// toward the live estimate. Returns the delta to add to the mix weight;
/// zero outside the early-inning window.
pub fn lineup_weight_delta(
    inning: u8,
    home: &LineupSignal,
    away: &LineupSignal,
    cfg: &LineupConfig,
) -> f64 {
    if inning > cfg.early_inning_threshold {
        return 0.0;
    }
    let per_side = |signal: &LineupSignal| match signal.status {
        LineupStatus::Confirmed => 0.0,
        LineupStatus::Partial => cfg.weight_delta_partial,
        LineupStatus::Unknown => cfg.weight_delta_unknown,
    };
    per_side(home) + per_side(away)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    const EPS: f64 = 1e-6;

    fn lineup_signal(status: LineupStatus, completeness: f64, missing: u8) -> LineupSignal {
        LineupSignal {
            status,
            completeness,
            missing_key_players: missing,
        }
    }

    #[test]
    fn test_inning_weight_zero_before_start() {
        for inning in 1..7 {
            assert_eq!(inning_weight(inning, 7, CurveShape::Linear), 0.0);
        }
    }

    #[test]
    fn test_inning_weight_one_at_ninth() {
        assert_eq!(inning_weight(9, 7, CurveShape::Linear), 1.0);
        assert_eq!(inning_weight(11, 7, CurveShape::Cubic), 1.0);
        assert_eq!(inning_weight(9, 4, CurveShape::Quadratic), 1.0);
    }

    #[test]
    fn test_inning_weight_monotone() {
        for curve in [CurveShape::Linear, CurveShape::Quadratic, CurveShape::Cubic] {
            let mut prev = 0.0;
            for inning in 1..=9 {
                let w = inning_weight(inning, 4, curve);
                assert!(
                    w >= prev,
                    "weight must not decrease: inning={} w={} prev={}",
                    inning,
                    w,
                    prev
                );
                prev = w;
            }
        }
    }

    #[test]
    fn test_bullpen_saturates_bound_exactly() {
        // z_home=+2, z_away=-2 in the ninth produces a logit shift far past
        // the cap, so the applied shift is exactly +max_shift.
        let cfg = EngineConfig::default().bullpen;
        let prob = 0.5;
        let result = bullpen_adjustment(prob, 2.0, -2.0, 9, &cfg);
        assert!(result.raw_shift > cfg.max_shift);
        assert!((result.shift - cfg.max_shift).abs() < EPS, "shift={}", result.shift);
    }

    #[test]
    fn test_bullpen_direction_follows_sign() {
        let cfg = EngineConfig::default().bullpen;
        let up = bullpen_adjustment(0.5, 1.0, -1.0, 8, &cfg);
        let down = bullpen_adjustment(0.5, -1.0, 1.0, 8, &cfg);
        assert!(up.shift > 0.0);
        assert!(down.shift < 0.0);
    }

    #[test]
    fn test_bullpen_inert_before_seventh() {
        let cfg = EngineConfig::default().bullpen;
        let result = bullpen_adjustment(0.6, 3.0, -3.0, 5, &cfg);
        assert_eq!(result.shift, 0.0);
        assert_eq!(result.raw_shift, 0.0);
    }

    #[test]
    fn test_fatigue_hurts_pitching_team() {
        let cfg = EngineConfig::default().fatigue;
        let home_pitching = fatigue_adjustment(0.5, 0.8, Side::Home, 8, &cfg);
        let away_pitching = fatigue_adjustment(0.5, 0.8, Side::Away, 8, &cfg);
        assert!(home_pitching.shift < 0.0);
        assert!(away_pitching.shift > 0.0);
    }

    #[test]
    fn test_fatigue_inert_before_fourth() {
        let cfg = EngineConfig::default().fatigue;
        let result = fatigue_adjustment(0.5, 1.0, Side::Home, 3, &cfg);
        assert_eq!(result.shift, 0.0);
    }

    #[test]
    fn test_adjustments_bounded_for_all_inputs() {
        // The binding safety guarantee: no input combination may move a
        // probability further than max_shift from where it started.
        let engine = EngineConfig::default();
        let probs = [0.05, 0.2, 0.5, 0.8, 0.95];
        let signals = [-4.0, -1.0, 0.0, 0.5, 1.0, 4.0];

        for &prob in &probs {
            for inning in 1..=12u8 {
                for &s in &signals {
                    let b = bullpen_adjustment(prob, s, -s, inning, &engine.bullpen);
                    assert!(
                        b.shift.abs() <= engine.bullpen.max_shift + EPS,
                        "bullpen shift {} exceeds bound at prob={} inning={} signal={}",
                        b.shift,
                        prob,
                        inning,
                        s
                    );

                    let f = fatigue_adjustment(prob, s.abs().min(1.0), Side::Home, inning, &engine.fatigue);
                    assert!(f.shift.abs() <= engine.fatigue.max_shift + EPS);
                }
            }
        }

        for &prob in &probs {
            for missing in 0..6u8 {
                let home = lineup_signal(LineupStatus::Partial, 0.9, missing);
                let away = lineup_signal(LineupStatus::Confirmed, 1.0, 5 - missing);
                let l = lineup_prior_adjustment(prob, &home, &away, &engine.lineup);
                assert!(
                    l.shift.abs() <= engine.lineup.prior_max_shift + EPS,
                    "lineup shift {} exceeds bound",
                    l.shift
                );
            }
        }
    }

    #[test]
    fn test_lineup_prior_direction() {
        let cfg = EngineConfig::default().lineup;
        let healthy = lineup_signal(LineupStatus::Confirmed, 1.0, 0);
        let shorthanded = lineup_signal(LineupStatus::Confirmed, 1.0, 3);

        // Away missing key players favors home.
        let favors_home = lineup_prior_adjustment(0.55, &healthy, &shorthanded, &cfg);
        assert!(favors_home.shift > 0.0);

        // Home missing key players hurts home.
        let hurts_home = lineup_prior_adjustment(0.55, &shorthanded, &healthy, &cfg);
        assert!(hurts_home.shift < 0.0);
    }

    #[test]
    fn test_lineup_prior_scales_with_completeness() {
        let cfg = EngineConfig::default().lineup;
        let healthy = lineup_signal(LineupStatus::Confirmed, 1.0, 0);
        let confirmed_out = lineup_signal(LineupStatus::Confirmed, 1.0, 2);
        let rumored_out = lineup_signal(LineupStatus::Partial, 0.3, 2);

        let strong = lineup_prior_adjustment(0.5, &healthy, &confirmed_out, &cfg);
        let weak = lineup_prior_adjustment(0.5, &healthy, &rumored_out, &cfg);
        assert!(strong.shift > weak.shift);
    }

    #[test]
    fn test_lineup_weight_delta_early_only() {
        let cfg = EngineConfig::default().lineup;
        let unknown = lineup_signal(LineupStatus::Unknown, 0.0, 0);
        let confirmed = lineup_signal(LineupStatus::Confirmed, 1.0, 0);

        let early = lineup_weight_delta(2, &unknown, &confirmed, &cfg);
        assert_eq!(early, cfg.weight_delta_unknown);

        let late = lineup_weight_delta(cfg.early_inning_threshold + 1, &unknown, &confirmed, &cfg);
        assert_eq!(late, 0.0);

        let both_confirmed = lineup_weight_delta(1, &confirmed, &confirmed, &cfg);
        assert_eq!(both_confirmed, 0.0);
    }
}
