//! Precomputed win-expectancy table.
//!
//! Maps a quantized game situation (inning, half, outs, baserunners, score
//! differential) to a baseline home-win probability, a run-expectancy value
//! and a confidence tier. Built once at startup; read-only afterwards.
//!
//! The lookup is total: situations outside the precomputed domain are clamped
//! into range first, and a logistic fallback covers any residual miss, so no
//! error path exists here.

use crate::logit::logistic;
use crate::models::{BaseState, ConfidenceTier, GameSituation, Half, Side};

/// Expected runs scored in the remainder of a half inning, indexed by
/// baserunner bits (0..=7) and outs (0..=2).
///
/// Values decrease with outs and increase with runner count.
const RUN_EXPECTANCY: [[f64; 3]; 8] = [
    [0.481, 0.254, 0.098], // bases empty
    [0.859, 0.509, 0.224], // runner on first
    [1.100, 0.664, 0.319], // runner on second
    [1.437, 0.884, 0.429], // first and second
    [1.350, 0.950, 0.353], // runner on third
    [1.784, 1.130, 0.478], // first and third
    [1.964, 1.376, 0.580], // second and third
    [2.292, 1.541, 0.752], // bases loaded
];

/// Fraction of the batting team's run expectancy credited as an immediate
/// score-differential equivalent.
const RE_WEIGHT: f64 = 0.6;

/// Home advantage expressed in runs at game start; decays with progress.
const HOME_EDGE_RUNS: f64 = 0.4;

/// Extra edge for the home side batting last in the ninth or later.
const WALKOFF_EDGE_RUNS: f64 = 0.1;

/// Expected runs per remaining out (≈4.5 runs over 54 outs).
const RUNS_PER_OUT: f64 = 0.5 / 6.0;

/// Lower bound on volatility so late-game log-odds stay finite.
const MIN_VOLATILITY: f64 = 0.4;

const MAX_INNING: u8 = 9;
const MAX_ABS_DIFF: i32 = 10;
const PROB_FLOOR: f64 = 0.05;
const PROB_CEIL: f64 = 0.95;

const DIFF_SPAN: usize = (2 * MAX_ABS_DIFF + 1) as usize;
const TABLE_LEN: usize = MAX_INNING as usize * 2 * 3 * 8 * DIFF_SPAN;

/// One precomputed table cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WinExpectancyEntry {
    pub home_win_prob: f64,
    pub run_expectancy: f64,
    pub confidence: ConfidenceTier,
    pub sample_size: u32,
}

/// Magnitude classification of a win-probability transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactTier {
    Major,
    Moderate,
    Minor,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbabilityDelta {
    pub delta: f64,
    pub impact: ImpactTier,
}

/// Precomputed (inning, half, outs, bases, score diff) → entry mapping.
pub struct WinExpectancyTable {
    entries: Vec<WinExpectancyEntry>,
}

impl WinExpectancyTable {
    /// Build the full table. Runs once at startup.
    pub fn build() -> Self {
        let mut entries = Vec::with_capacity(TABLE_LEN);
        for inning in 1..=MAX_INNING {
            for half in [Half::Top, Half::Bottom] {
                for outs in 0..3u8 {
                    for bases in 0..8u8 {
                        for diff in -MAX_ABS_DIFF..=MAX_ABS_DIFF {
                            entries.push(Self::compute_entry(
                                inning,
                                half,
                                outs,
                                BaseState::from_bits(bases),
                                diff,
                            ));
                        }
                    }
                }
            }
        }
        debug_assert_eq!(entries.len(), TABLE_LEN);
        Self { entries }
    }

    /// Deterministic, total lookup. The situation is quantized into the
    /// table domain first (inning capped at 9, score differential clamped to
    /// ±10); outs and bases are expected pre-sanitized but re-clamped anyway.
    pub fn lookup(&self, situation: &GameSituation) -> WinExpectancyEntry {
        let inning = situation.inning.clamp(1, MAX_INNING);
        let outs = situation.outs.min(2);
        let bases = BaseState::from_bits(situation.bases.bits());
        let diff = situation.score_diff().clamp(-MAX_ABS_DIFF, MAX_ABS_DIFF);

        let idx = Self::index(inning, situation.half, outs, bases, diff);
        match self.entries.get(idx) {
            Some(entry) => *entry,
            // Unreachable after clamping, but the contract is "never fails".
            None => Self::compute_entry(inning, situation.half, outs, bases, diff),
        }
    }

    /// Classify a probability transition for situational-impact reporting.
    pub fn probability_delta(before: f64, after: f64) -> ProbabilityDelta {
        let delta = after - before;
        let impact = if delta.abs() >= 0.15 {
            ImpactTier::Major
        } else if delta.abs() >= 0.05 {
            ImpactTier::Moderate
        } else {
            ImpactTier::Minor
        };
        ProbabilityDelta { delta, impact }
    }

    fn index(inning: u8, half: Half, outs: u8, bases: BaseState, diff: i32) -> usize {
        let half_idx = match half {
            Half::Top => 0usize,
            Half::Bottom => 1usize,
        };
        ((((inning as usize - 1) * 2 + half_idx) * 3 + outs as usize) * 8 + bases.bits() as usize)
            * DIFF_SPAN
            + (diff + MAX_ABS_DIFF) as usize
    }

    /// Closed-form entry used both to populate the table and as the fallback
    /// for a hypothetical table miss: a logistic over the score differential,
    /// steepened as outs run down, with a run-expectancy credit for the
    /// batting side.
    fn compute_entry(inning: u8, half: Half, outs: u8, bases: BaseState, diff: i32) -> WinExpectancyEntry {
        let completed_outs = (inning as f64 - 1.0) * 6.0
            + match half {
                Half::Top => 0.0,
                Half::Bottom => 3.0,
            }
            + outs as f64;
        let remaining_outs = (54.0 - completed_outs).max(0.0);
        let progress_remaining = remaining_outs / 54.0;

        // Volatility shrinks as the supply of remaining runs does.
        let expected_runs_remaining = remaining_outs * RUNS_PER_OUT;
        let volatility = (expected_runs_remaining * 2.0).max(MIN_VOLATILITY);

        // Run expectancy relative to a fresh half inning: a team with the
        // bases loaded and nobody out is ahead of schedule, a team with two
        // outs and empty bases has nearly burnt its inning.
        let run_expectancy = RUN_EXPECTANCY[bases.bits() as usize][outs as usize];
        let re_above_baseline = run_expectancy - RUN_EXPECTANCY[0][0];
        let batting_sign = match half.batting_side() {
            Side::Home => 1.0,
            Side::Away => -1.0,
        };

        // Home advantage decays with progress; batting last in the ninth or
        // later adds the walk-off edge.
        let mut home_edge = HOME_EDGE_RUNS * progress_remaining;
        if inning >= MAX_INNING {
            home_edge += WALKOFF_EDGE_RUNS;
        }

        let effective_diff = diff as f64 + batting_sign * re_above_baseline * RE_WEIGHT + home_edge;
        let home_win_prob = logistic(effective_diff / volatility).clamp(PROB_FLOOR, PROB_CEIL);

        let (confidence, sample_size) = Self::estimate_support(inning, bases, diff);

        WinExpectancyEntry {
            home_win_prob,
            run_expectancy,
            confidence,
            sample_size,
        }
    }

    /// Estimated historical support for a cell. Common situations (small
    /// differentials, early innings, empty bases) are well sampled; extreme
    /// cells are thin and get a lower tier.
    fn estimate_support(inning: u8, bases: BaseState, diff: i32) -> (ConfidenceTier, u32) {
        let diff_decay = (-(diff.abs() as f64) / 2.5).exp();
        let inning_decay = (-(inning as f64 - 1.0) / 9.0).exp();
        let base_decay = 0.5f64.powi(bases.runner_count() as i32);
        let sample = (5000.0 * diff_decay * inning_decay * base_decay) as u32;

        let tier = if sample >= 500 {
            ConfidenceTier::High
        } else if sample >= 50 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        };
        (tier, sample)
    }
}
