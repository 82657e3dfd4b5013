// Shared models for the win-probability engine and its services
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Game Situation
// ============================================================================

/// Which half of the inning is being played.
///
/// The batting side follows from this: the away team bats in the top half,
/// the home team in the bottom half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Half {
    Top,
    Bottom,
}

impl Half {
    /// The team currently pitching in this half.
    pub fn pitching_side(&self) -> Side {
        match self {
            Half::Top => Side::Home,
            Half::Bottom => Side::Away,
        }
    }

    pub fn batting_side(&self) -> Side {
        match self {
            Half::Top => Side::Away,
            Half::Bottom => Side::Home,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Home,
    Away,
}

/// Baserunner occupation as a 3-bit set: bit 0 = first, bit 1 = second,
/// bit 2 = third.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaseState(u8);

impl BaseState {
    pub const EMPTY: BaseState = BaseState(0);
    pub const LOADED: BaseState = BaseState(7);

    /// Construct from raw bits, clamping anything above 7 into range.
    pub fn from_bits(bits: u8) -> Self {
        BaseState(bits & 0x7)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn first_occupied(&self) -> bool {
        self.0 & 0b001 != 0
    }

    pub fn second_occupied(&self) -> bool {
        self.0 & 0b010 != 0
    }

    pub fn third_occupied(&self) -> bool {
        self.0 & 0b100 != 0
    }

    pub fn runner_count(&self) -> u32 {
        self.0.count_ones()
    }
}

/// A single observed game state, produced by the live-state tracker once per
/// change. Immutable once constructed; `sanitized` is the only way fields are
/// ever brought back into range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSituation {
    pub game_id: String,
    pub inning: u8,
    pub half: Half,
    pub outs: u8,
    pub bases: BaseState,
    pub home_score: u16,
    pub away_score: u16,
    pub fetched_at: DateTime<Utc>,
}

impl GameSituation {
    /// Home score minus away score.
    pub fn score_diff(&self) -> i32 {
        self.home_score as i32 - self.away_score as i32
    }

    /// Returns a copy with every field clamped into its valid range.
    ///
    /// The engine is total: malformed situations are repaired, not rejected.
    /// A clamp is logged as a warning and counted so upstream data problems
    /// stay visible.
    pub fn sanitized(&self) -> GameSituation {
        let mut fixed = self.clone();
        let mut clamped = false;

        if fixed.inning < 1 {
            fixed.inning = 1;
            clamped = true;
        }
        if fixed.outs > 2 {
            fixed.outs = 2;
            clamped = true;
        }
        if fixed.bases.bits() > 7 {
            fixed.bases = BaseState::from_bits(fixed.bases.bits());
            clamped = true;
        }

        if clamped {
            tracing::warn!(
                game_id = %self.game_id,
                inning = self.inning,
                outs = self.outs,
                bases = self.bases.bits(),
                "game situation out of range, clamped"
            );
            metrics::counter!("winprob_situation_clamps_total").increment(1);
        }

        fixed
    }
}

/// Per-game identity and pregame context, established when a game is first
/// seen and held for the game's lifetime. The situation stream itself only
/// carries state; signal lookups are keyed by (date, team-or-player, game).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameContext {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub game_date: chrono::NaiveDate,
    /// Pregame home-win prior from the odds pipeline; 0.5 when absent.
    pub pregame_home_prob: Option<f64>,
}

// ============================================================================
// Confidence
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn rank(&self) -> u8 {
        match self {
            ConfidenceTier::High => 2,
            ConfidenceTier::Medium => 1,
            ConfidenceTier::Low => 0,
        }
    }

    /// One tier lower; Low stays Low.
    pub fn downgrade(&self) -> ConfidenceTier {
        match self {
            ConfidenceTier::High => ConfidenceTier::Medium,
            ConfidenceTier::Medium | ConfidenceTier::Low => ConfidenceTier::Low,
        }
    }
}

// ============================================================================
// External Signal Values
// ============================================================================

/// Relative bullpen strength for one team, expressed as a z-score against the
/// league distribution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BullpenRating {
    pub z_score: f64,
    pub confidence: f64,
}

/// Fatigue index for the currently pitching player, 0 = fresh, 1 = gassed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FatigueSignal {
    pub index: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineupStatus {
    Confirmed,
    Partial,
    Unknown,
}

/// Lineup-confirmation state for one team ahead of / early in a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LineupSignal {
    pub status: LineupStatus,
    /// Fraction of the expected lineup that has been confirmed, 0..=1.
    pub completeness: f64,
    /// Count of expected key players missing from the confirmed lineup.
    pub missing_key_players: u8,
}

/// Identity of the player currently on the mound, resolved by the lineup
/// tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PitcherRef {
    pub player_id: String,
    pub team: Side,
}

// ============================================================================
// Adjustment Results
// ============================================================================

/// The effect of one adjustment function on a probability.
///
/// `shift` is the bounded value actually applied; `raw_shift` is what the
/// logit math produced before the hard clamp, kept for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentResult {
    pub shift: f64,
    pub raw_shift: f64,
    pub reason: String,
}

/// Uniform tagged outcome of an attempted adjustment step.
///
/// Every adjustment in the prediction pipeline resolves to one of these; a
/// failed signal fetch or computation becomes `Skipped`, never an error that
/// aborts the prediction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AdjustmentOutcome {
    Applied(AdjustmentResult),
    Skipped { reason: String },
}

impl AdjustmentOutcome {
    pub fn applied_shift(&self) -> f64 {
        match self {
            AdjustmentOutcome::Applied(r) => r.shift,
            AdjustmentOutcome::Skipped { .. } => 0.0,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, AdjustmentOutcome::Applied(_))
    }
}

// ============================================================================
// Prediction Record
// ============================================================================

/// The full provenance chain for one prediction.
///
/// Appended to the per-game timeline and written to the per-game "latest"
/// slot on every predictor invocation. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub record_id: String,
    pub game_id: String,
    pub created_at: DateTime<Utc>,

    // Situation snapshot
    pub inning: u8,
    pub half: Half,
    pub outs: u8,
    pub bases: BaseState,
    pub home_score: u16,
    pub away_score: u16,

    // Probability provenance, in pipeline order
    pub pregame_prior: f64,
    pub pregame_adjusted: f64,
    pub state_prob: f64,
    pub state_after_bullpen: f64,
    pub state_after_fatigue: f64,
    pub mix_weight: f64,
    pub mixed_prob: f64,
    pub final_home_prob: f64,
    pub final_away_prob: f64,

    pub score_event: bool,
    pub confidence: ConfidenceTier,

    // Per-step adjustment metadata
    pub bullpen: AdjustmentOutcome,
    pub fatigue: AdjustmentOutcome,
    pub lineup: AdjustmentOutcome,
}

impl PredictionRecord {
    /// Sum of the adjustment magnitudes that were actually applied.
    pub fn total_adjustment_magnitude(&self) -> f64 {
        self.bullpen.applied_shift().abs()
            + self.fatigue.applied_shift().abs()
            + self.lineup.applied_shift().abs()
    }
}

// ============================================================================
// Redis Channel Names
// ============================================================================

pub mod channels {
    pub const GAME_STATE_PATTERN: &str = "game:*:state";
    pub const ENGINE_RELOAD: &str = "engine:reload";
    pub const ENGINE_HEARTBEAT: &str = "engine:heartbeat";

    pub fn game_state(game_id: &str) -> String {
        format!("game:{}:state", game_id)
    }

    pub fn game_prediction(game_id: &str) -> String {
        format!("game:{}:prediction", game_id)
    }
}
