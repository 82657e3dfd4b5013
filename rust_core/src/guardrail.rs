//! Guardrail control loop.
//!
//! A single background loop polls rolling prediction quality on a fixed
//! cadence and counts consecutive threshold violations. When the streak
//! reaches the trip threshold it executes exactly one step of the
//! remediation ladder — disable the next adjustment feature, else roll the
//! config back to the latest rollback-safe version — then hot-reloads the
//! engine and resets the counter. The ladder running dry with no safe
//! version to fall back to is the one condition that escalates to a human.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::config::Feature;
use crate::config_store::ConfigVersionManager;
use crate::quality::{QualityMetricsSource, QualityThresholds};
use crate::reload::ReloadHandle;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_TRIP_THRESHOLD: u32 = 3;

#[derive(Debug, Clone)]
pub struct GuardrailConfig {
    pub check_interval: Duration,
    /// Consecutive violations that trigger one remediation step.
    pub trip_threshold: u32,
    pub thresholds: QualityThresholds,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            check_interval: DEFAULT_CHECK_INTERVAL,
            trip_threshold: DEFAULT_TRIP_THRESHOLD,
            thresholds: QualityThresholds::default(),
        }
    }
}

/// Process-lifetime supervisory state. Not persisted: a restart resumes
/// with a clean counter and relies on the persisted config for any prior
/// feature-disable or rollback.
#[derive(Debug, Default)]
pub struct GuardrailState {
    pub consecutive_failures: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub disabled_features: Vec<Feature>,
    pub last_rollback_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemediationAction {
    FeatureDisabled(Feature),
    RolledBack(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Both metrics within bounds; counter reset.
    Healthy,
    /// Violation observed, streak below the trip threshold.
    Degrading(u32),
    Remediated(RemediationAction),
    /// Ladder exhausted: everything disabled and no safe version exists.
    Escalated,
    /// Quality metrics could not be fetched; counter left untouched.
    MetricsUnavailable,
    /// A remediation step hit a config-store failure.
    RemediationFailed(String),
}

pub struct GuardrailController {
    quality: Arc<dyn QualityMetricsSource>,
    versions: ConfigVersionManager,
    reload: Arc<ReloadHandle>,
    config: GuardrailConfig,
    state: GuardrailState,
}

impl GuardrailController {
    pub fn new(
        quality: Arc<dyn QualityMetricsSource>,
        versions: ConfigVersionManager,
        reload: Arc<ReloadHandle>,
        config: GuardrailConfig,
    ) -> Self {
        Self {
            quality,
            versions,
            reload,
            config,
            state: GuardrailState::default(),
        }
    }

    pub fn state(&self) -> &GuardrailState {
        &self.state
    }

    /// Run the loop forever. Checks never overlap: a tick arriving while a
    /// check is still in flight is skipped, not queued.
    pub async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            interval_secs = self.config.check_interval.as_secs(),
            trip_threshold = self.config.trip_threshold,
            "guardrail loop started"
        );
        loop {
            ticker.tick().await;
            self.check_once().await;
        }
    }

    /// One supervision cycle: fetch quality, compare, count, remediate.
    pub async fn check_once(&mut self) -> CheckOutcome {
        self.state.last_check = Some(Utc::now());
        metrics::counter!("winprob_guardrail_checks_total").increment(1);

        let quality = match self.quality.fetch().await {
            Ok(q) => q,
            Err(e) => {
                // Missing observability is not model degradation: leave the
                // streak as it is and try again next tick.
                warn!(error = %e, "quality metrics unavailable, skipping check");
                return CheckOutcome::MetricsUnavailable;
            }
        };

        if !self.config.thresholds.violated_by(&quality) {
            if self.state.consecutive_failures > 0 {
                info!(
                    streak = self.state.consecutive_failures,
                    "quality recovered, resetting failure counter"
                );
            }
            self.state.consecutive_failures = 0;
            return CheckOutcome::Healthy;
        }

        self.state.consecutive_failures += 1;
        metrics::counter!("winprob_guardrail_violations_total").increment(1);
        warn!(
            log_loss = quality.log_loss,
            brier = quality.brier,
            streak = self.state.consecutive_failures,
            "rolling quality over threshold"
        );

        if self.state.consecutive_failures < self.config.trip_threshold {
            return CheckOutcome::Degrading(self.state.consecutive_failures);
        }

        // Tripped: one remediation step, then start a fresh streak.
        self.state.consecutive_failures = 0;
        self.remediate().await
    }

    /// Apply the next rung of the remediation ladder.
    async fn remediate(&mut self) -> CheckOutcome {
        let current = match self.versions.current().await {
            Ok(version) => version.map(|v| v.config),
            Err(e) => {
                error!(error = %e, "remediation aborted: cannot read current config");
                return CheckOutcome::RemediationFailed(e.to_string());
            }
        };

        // Rung 1: disable the next still-enabled feature, in fixed order.
        if let Some(config) = current {
            for feature in Feature::PRIORITY {
                if !config.is_enabled(feature) {
                    continue;
                }
                let mut next = config.clone();
                next.disable(feature);
                // Remediation output is an untested config; never mark it as
                // a rollback target.
                if let Err(e) = self.versions.save(&next, false).await {
                    error!(error = %e, feature = feature.as_str(), "failed to persist feature disable");
                    return CheckOutcome::RemediationFailed(e.to_string());
                }
                if !self.state.disabled_features.contains(&feature) {
                    self.state.disabled_features.push(feature);
                }
                metrics::counter!(
                    "winprob_guardrail_feature_disabled_total",
                    "feature" => feature.as_str()
                )
                .increment(1);
                warn!(feature = feature.as_str(), "guardrail disabled adjustment feature");
                self.trigger_reload().await;
                return CheckOutcome::Remediated(RemediationAction::FeatureDisabled(feature));
            }
        }

        // Rung 2: nothing left to disable, roll back to the latest safe
        // version.
        match self.versions.rollback_to_latest_safe().await {
            Ok(Some(version_id)) => {
                self.state.last_rollback_version = Some(version_id.clone());
                metrics::counter!("winprob_guardrail_rollbacks_total").increment(1);
                warn!(version = %version_id, "guardrail rolled back engine config");
                self.trigger_reload().await;
                CheckOutcome::Remediated(RemediationAction::RolledBack(version_id))
            }
            Ok(None) => {
                // The one path the controller cannot self-heal. The alert
                // channel is an external collaborator; our responsibility
                // ends at a distinguishable event.
                metrics::counter!("winprob_guardrail_escalations_total").increment(1);
                error!(
                    event = "guardrail_escalation",
                    "remediation ladder exhausted: all features disabled and no rollback-safe config exists"
                );
                CheckOutcome::Escalated
            }
            Err(e) => {
                error!(error = %e, "rollback failed");
                CheckOutcome::RemediationFailed(e.to_string())
            }
        }
    }

    async fn trigger_reload(&self) {
        if let Err(e) = self.reload.reload().await {
            error!(error = %e, "hot reload after remediation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::config_store::MemoryConfigStore;
    use crate::quality::RollingQuality;
    use crate::reload::{config_channel, ConfigHandle};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    const GOOD: RollingQuality = RollingQuality {
        log_loss: 0.55,
        brier: 0.20,
    };
    const BAD: RollingQuality = RollingQuality {
        log_loss: 0.90,
        brier: 0.20,
    };

    /// Scripted source: pops one reading per check; `None` entries simulate
    /// an unreachable aggregator.
    struct ScriptedQuality {
        readings: Mutex<VecDeque<Option<RollingQuality>>>,
    }

    impl ScriptedQuality {
        fn new(readings: impl IntoIterator<Item = Option<RollingQuality>>) -> Arc<Self> {
            Arc::new(Self {
                readings: Mutex::new(readings.into_iter().collect()),
            })
        }
    }

    #[async_trait]
    impl QualityMetricsSource for ScriptedQuality {
        async fn fetch(&self) -> anyhow::Result<RollingQuality> {
            match self.readings.lock().pop_front() {
                Some(Some(quality)) => Ok(quality),
                Some(None) => anyhow::bail!("aggregator unreachable"),
                None => Ok(GOOD),
            }
        }
    }

    async fn controller_with(
        initial: EngineConfig,
        mark_safe: bool,
        readings: Vec<Option<RollingQuality>>,
    ) -> (GuardrailController, ConfigVersionManager, ConfigHandle) {
        let manager = ConfigVersionManager::new(Arc::new(MemoryConfigStore::new()));
        manager.save(&initial, mark_safe).await.unwrap();
        let (reload, handle) = config_channel(initial, manager.clone());
        let controller = GuardrailController::new(
            ScriptedQuality::new(readings),
            manager.clone(),
            Arc::new(reload),
            GuardrailConfig {
                check_interval: Duration::from_secs(60),
                trip_threshold: 3,
                thresholds: QualityThresholds::default(),
            },
        );
        (controller, manager, handle)
    }

    #[tokio::test]
    async fn test_single_pass_resets_counter() {
        let (mut controller, _, _) = controller_with(
            EngineConfig::default(),
            true,
            vec![Some(BAD), Some(BAD), Some(GOOD), Some(BAD)],
        )
        .await;

        assert_eq!(controller.check_once().await, CheckOutcome::Degrading(1));
        assert_eq!(controller.check_once().await, CheckOutcome::Degrading(2));
        assert_eq!(controller.check_once().await, CheckOutcome::Healthy);
        assert_eq!(controller.state().consecutive_failures, 0);
        // The streak starts over; no remediation fires on the next bad check.
        assert_eq!(controller.check_once().await, CheckOutcome::Degrading(1));
    }

    #[tokio::test]
    async fn test_three_violations_disable_fatigue_only() {
        let (mut controller, manager, handle) = controller_with(
            EngineConfig::default(),
            true,
            vec![Some(BAD); 3],
        )
        .await;

        controller.check_once().await;
        controller.check_once().await;
        assert_eq!(
            controller.check_once().await,
            CheckOutcome::Remediated(RemediationAction::FeatureDisabled(Feature::Fatigue))
        );

        // Exactly one feature off, counter back to zero, change is live.
        assert_eq!(controller.state().consecutive_failures, 0);
        let current = manager.current().await.unwrap().unwrap();
        assert!(!current.config.fatigue.enabled);
        assert!(current.config.bullpen.enabled);
        assert!(current.config.lineup.enabled);
        assert!(!current.rollback_safe);
        assert!(!handle.current().fatigue.enabled);
    }

    #[tokio::test]
    async fn test_remediation_ladder_order() {
        let (mut controller, _, handle) = controller_with(
            EngineConfig::default(),
            true,
            vec![Some(BAD); 9],
        )
        .await;

        let mut actions = Vec::new();
        for _ in 0..9 {
            if let CheckOutcome::Remediated(action) = controller.check_once().await {
                actions.push(action);
            }
        }

        assert_eq!(
            actions,
            vec![
                RemediationAction::FeatureDisabled(Feature::Fatigue),
                RemediationAction::FeatureDisabled(Feature::Bullpen),
                RemediationAction::FeatureDisabled(Feature::Lineup),
            ]
        );
        assert_eq!(
            controller.state().disabled_features,
            vec![Feature::Fatigue, Feature::Bullpen, Feature::Lineup]
        );

        let live = handle.current();
        assert!(!live.fatigue.enabled && !live.bullpen.enabled && !live.lineup.enabled);
    }

    #[tokio::test]
    async fn test_rollback_after_flags_exhausted() {
        let (mut controller, manager, handle) = controller_with(
            EngineConfig::default(),
            true,
            vec![Some(BAD); 12],
        )
        .await;
        let baseline = manager.current().await.unwrap().unwrap().id;

        // Trips 1-3 burn through the three features; trip 4 rolls back to
        // the safe baseline, re-validating the full feature set.
        let mut last = CheckOutcome::Healthy;
        for _ in 0..12 {
            last = controller.check_once().await;
        }

        assert_eq!(
            last,
            CheckOutcome::Remediated(RemediationAction::RolledBack(baseline.clone()))
        );
        assert_eq!(controller.state().last_rollback_version, Some(baseline));
        assert!(handle.current().fatigue.enabled);
    }

    #[tokio::test]
    async fn test_escalation_when_no_safe_version_exists() {
        let mut everything_off = EngineConfig::default();
        for feature in Feature::PRIORITY {
            everything_off.disable(feature);
        }
        // The only stored version is unsafe, so the ladder has nowhere to go.
        let (mut controller, _, _) = controller_with(
            everything_off,
            false,
            vec![Some(BAD); 3],
        )
        .await;

        controller.check_once().await;
        controller.check_once().await;
        assert_eq!(controller.check_once().await, CheckOutcome::Escalated);
        assert_eq!(controller.state().consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_metrics_outage_leaves_streak_untouched() {
        let (mut controller, _, _) = controller_with(
            EngineConfig::default(),
            true,
            vec![Some(BAD), Some(BAD), None, Some(BAD)],
        )
        .await;

        controller.check_once().await;
        controller.check_once().await;
        assert_eq!(controller.state().consecutive_failures, 2);

        assert_eq!(controller.check_once().await, CheckOutcome::MetricsUnavailable);
        assert_eq!(controller.state().consecutive_failures, 2);

        // The outage neither broke nor extended the streak: the next real
        // violation trips.
        assert!(matches!(
            controller.check_once().await,
            CheckOutcome::Remediated(_)
        ));
    }
}
