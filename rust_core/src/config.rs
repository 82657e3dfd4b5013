//! Engine tuning parameters.
//!
//! `EngineConfig` is the complete tunable surface of the prediction pipeline:
//! mix-weight curve, smoothing coefficients, calibration, and the three
//! adjustment features. It is never mutated in place at runtime — the config
//! version manager persists immutable snapshots and the running engine swaps
//! whole `Arc<EngineConfig>` values on reload.

use serde::{Deserialize, Serialize};

/// Shape of a monotonic 0..=1 ramp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurveShape {
    Linear,
    Quadratic,
    Cubic,
}

impl CurveShape {
    /// Map a progress fraction in [0, 1] through the curve.
    pub fn apply(&self, frac: f64) -> f64 {
        let f = frac.clamp(0.0, 1.0);
        match self {
            CurveShape::Linear => f,
            CurveShape::Quadratic => f * f,
            CurveShape::Cubic => f * f * f,
        }
    }
}

/// Pregame/live mixing weight bounds and curve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixConfig {
    pub curve: CurveShape,
    /// Live-state weight at game start.
    pub min_weight: f64,
    /// Live-state weight at the end of regulation.
    pub max_weight: f64,
}

impl Default for MixConfig {
    fn default() -> Self {
        Self {
            curve: CurveShape::Quadratic,
            min_weight: 0.50,
            max_weight: 0.95,
        }
    }
}

/// Exponential smoothing coefficients and output clamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Coefficient for ordinary updates.
    pub base_alpha: f64,
    /// Coefficient when the unsmoothed jump exceeds `score_event_threshold`.
    pub score_event_alpha: f64,
    pub score_event_threshold: f64,
    pub clamp_lo: f64,
    pub clamp_hi: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            base_alpha: 0.35,
            score_event_alpha: 0.85,
            score_event_threshold: 0.05,
            clamp_lo: 0.01,
            clamp_hi: 0.99,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMode {
    Identity,
    /// Per-phase affine correction in logit space.
    PhaseLogit,
}

/// Affine logit correction: `logit' = scale * logit + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseParams {
    pub scale: f64,
    pub offset: f64,
}

impl Default for PhaseParams {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub mode: CalibrationMode,
    pub early: PhaseParams,
    pub mid: PhaseParams,
    pub late: PhaseParams,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            mode: CalibrationMode::Identity,
            early: PhaseParams::default(),
            mid: PhaseParams::default(),
            late: PhaseParams::default(),
        }
    }
}

/// One logit-shift adjustment feature (bullpen, fatigue).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureConfig {
    pub enabled: bool,
    pub coefficient: f64,
    /// Hard bound on |adjusted - original| in probability space.
    pub max_shift: f64,
    /// Inning before which the adjustment is inert.
    pub start_inning: u8,
    pub curve: CurveShape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineupMode {
    /// Nudge the pregame/live mixing weight during early innings only.
    Weight,
    /// Shift the pregame prior in logit space.
    Prior,
    Both,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineupConfig {
    pub enabled: bool,
    pub mode: LineupMode,
    /// Weight-mode nudges apply only while `inning <= early_inning_threshold`.
    pub early_inning_threshold: u8,
    pub weight_delta_partial: f64,
    pub weight_delta_unknown: f64,
    pub prior_coefficient: f64,
    pub prior_max_shift: f64,
}

impl Default for LineupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mode: LineupMode::Both,
            early_inning_threshold: 3,
            weight_delta_partial: 0.02,
            weight_delta_unknown: 0.05,
            prior_coefficient: 0.06,
            prior_max_shift: 0.04,
        }
    }
}

/// The adjustment features the guardrail may disable, in remediation
/// priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Fatigue,
    Bullpen,
    Lineup,
}

impl Feature {
    /// Fixed guardrail remediation order: least-trusted signal first.
    pub const PRIORITY: [Feature; 3] = [Feature::Fatigue, Feature::Bullpen, Feature::Lineup];

    pub fn as_str(&self) -> &'static str {
        match self {
            Feature::Fatigue => "fatigue",
            Feature::Bullpen => "bullpen",
            Feature::Lineup => "lineup",
        }
    }
}

/// Complete tunable parameter set for the prediction pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub mix: MixConfig,
    pub smoothing: SmoothingConfig,
    pub calibration: CalibrationConfig,
    pub bullpen: FeatureConfig,
    pub fatigue: FeatureConfig,
    pub lineup: LineupConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mix: MixConfig::default(),
            smoothing: SmoothingConfig::default(),
            calibration: CalibrationConfig::default(),
            bullpen: FeatureConfig {
                enabled: true,
                coefficient: 0.12,
                max_shift: 0.03,
                start_inning: 7,
                curve: CurveShape::Linear,
            },
            fatigue: FeatureConfig {
                enabled: true,
                coefficient: 0.15,
                max_shift: 0.02,
                start_inning: 4,
                curve: CurveShape::Quadratic,
            },
            lineup: LineupConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        match feature {
            Feature::Fatigue => self.fatigue.enabled,
            Feature::Bullpen => self.bullpen.enabled,
            Feature::Lineup => self.lineup.enabled,
        }
    }

    /// Flip one feature off. Returns false when it was already disabled.
    pub fn disable(&mut self, feature: Feature) -> bool {
        let flag = match feature {
            Feature::Fatigue => &mut self.fatigue.enabled,
            Feature::Bullpen => &mut self.bullpen.enabled,
            Feature::Lineup => &mut self.lineup.enabled,
        };
        let was_enabled = *flag;
        *flag = false;
        was_enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_curve_shapes_ordered_at_midpoint() {
        // At frac 0.5 the steeper curves sit below the linear ramp.
        assert_eq!(CurveShape::Linear.apply(0.5), 0.5);
        assert_eq!(CurveShape::Quadratic.apply(0.5), 0.25);
        assert_eq!(CurveShape::Cubic.apply(0.5), 0.125);
    }

    #[test]
    fn test_curve_clamps_input() {
        assert_eq!(CurveShape::Cubic.apply(-0.5), 0.0);
        assert_eq!(CurveShape::Cubic.apply(1.5), 1.0);
    }

    #[test]
    fn test_default_bounds_match_design() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.bullpen.max_shift, 0.03);
        assert_eq!(cfg.bullpen.start_inning, 7);
        assert_eq!(cfg.fatigue.max_shift, 0.02);
        assert_eq!(cfg.fatigue.start_inning, 4);
        assert_eq!(cfg.smoothing.score_event_threshold, 0.05);
    }

    #[test]
    fn test_disable_is_idempotent() {
        let mut cfg = EngineConfig::default();
        assert!(cfg.disable(Feature::Fatigue));
        assert!(!cfg.fatigue.enabled);
        assert!(!cfg.disable(Feature::Fatigue));
    }

    #[test]
    fn test_config_json_round_trip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
