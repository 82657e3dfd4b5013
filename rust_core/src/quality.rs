//! Rolling prediction-quality metrics.
//!
//! The guardrail loop does not compute log-loss or Brier score itself; an
//! external aggregator maintains both over a trailing window and exposes
//! them as gauges on a Prometheus-format endpoint. This module is the
//! polling client plus the threshold comparison.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};

pub const DEFAULT_LOG_LOSS_GAUGE: &str = "winprob_rolling_log_loss";
pub const DEFAULT_BRIER_GAUGE: &str = "winprob_rolling_brier";

/// Rolling quality over the aggregator's trailing window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RollingQuality {
    pub log_loss: f64,
    pub brier: f64,
}

/// Upper bounds on acceptable rolling quality.
#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    pub max_log_loss: f64,
    pub max_brier: f64,
}

impl QualityThresholds {
    /// True when either metric is out of bounds.
    pub fn violated_by(&self, quality: &RollingQuality) -> bool {
        quality.log_loss > self.max_log_loss || quality.brier > self.max_brier
    }
}

impl Default for QualityThresholds {
    fn default() -> Self {
        // A coin flip scores ln 2 log-loss and 0.25 Brier; sustained worse
        // than that means the model is actively harmful.
        Self {
            max_log_loss: 0.693,
            max_brier: 0.25,
        }
    }
}

/// Source of rolling quality metrics for the guardrail loop.
#[async_trait]
pub trait QualityMetricsSource: Send + Sync {
    async fn fetch(&self) -> Result<RollingQuality>;
}

/// Polls a Prometheus-format exposition endpoint for the two quality gauges.
pub struct PromQualitySource {
    client: Client,
    endpoint: String,
    log_loss_gauge: String,
    brier_gauge: String,
    breaker: CircuitBreaker,
}

impl PromQualitySource {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            endpoint: endpoint.to_string(),
            log_loss_gauge: DEFAULT_LOG_LOSS_GAUGE.to_string(),
            brier_gauge: DEFAULT_BRIER_GAUGE.to_string(),
            breaker: CircuitBreaker::new("quality_metrics", CircuitBreakerConfig::default()),
        }
    }

    pub fn with_gauges(mut self, log_loss_gauge: &str, brier_gauge: &str) -> Self {
        self.log_loss_gauge = log_loss_gauge.to_string();
        self.brier_gauge = brier_gauge.to_string();
        self
    }
}

#[async_trait]
impl QualityMetricsSource for PromQualitySource {
    async fn fetch(&self) -> Result<RollingQuality> {
        if !self.breaker.is_available() {
            return Err(anyhow!("quality metrics circuit breaker open"));
        }

        let result = async {
            let body = self
                .client
                .get(&self.endpoint)
                .send()
                .await?
                .error_for_status()?
                .text()
                .await?;

            let log_loss = parse_gauge(&body, &self.log_loss_gauge)
                .with_context(|| format!("gauge {} missing", self.log_loss_gauge))?;
            let brier = parse_gauge(&body, &self.brier_gauge)
                .with_context(|| format!("gauge {} missing", self.brier_gauge))?;
            Ok(RollingQuality { log_loss, brier })
        }
        .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }
}

/// Extract a gauge value from Prometheus text exposition. Matches the bare
/// metric name or the name followed by a label set; the sample value is the
/// last whitespace-separated token.
pub fn parse_gauge(body: &str, name: &str) -> Result<f64> {
    for line in body.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let matches_name = line
            .strip_prefix(name)
            .map(|rest| rest.starts_with(' ') || rest.starts_with('{') || rest.starts_with('\t'))
            .unwrap_or(false);
        if !matches_name {
            continue;
        }
        let value = line
            .split_whitespace()
            .last()
            .ok_or_else(|| anyhow!("malformed sample line: {}", line))?;
        return value
            .parse::<f64>()
            .with_context(|| format!("unparseable sample value in: {}", line));
    }
    Err(anyhow!("gauge {} not found in exposition", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# HELP winprob_rolling_log_loss Rolling log loss over the trailing window
# TYPE winprob_rolling_log_loss gauge
winprob_rolling_log_loss 0.612
# TYPE winprob_rolling_brier gauge
winprob_rolling_brier{window=\"200\"} 0.21
other_metric_total 42
";

    #[test]
    fn test_parse_bare_gauge() {
        assert_eq!(parse_gauge(SAMPLE, "winprob_rolling_log_loss").unwrap(), 0.612);
    }

    #[test]
    fn test_parse_labeled_gauge() {
        assert_eq!(parse_gauge(SAMPLE, "winprob_rolling_brier").unwrap(), 0.21);
    }

    #[test]
    fn test_parse_missing_gauge() {
        assert!(parse_gauge(SAMPLE, "winprob_rolling_ece").is_err());
    }

    #[test]
    fn test_name_prefix_does_not_match() {
        // "winprob_rolling_log" must not match the longer metric name.
        assert!(parse_gauge(SAMPLE, "winprob_rolling_log").is_err());
    }

    #[test]
    fn test_thresholds() {
        let thresholds = QualityThresholds::default();
        assert!(!thresholds.violated_by(&RollingQuality {
            log_loss: 0.55,
            brier: 0.20,
        }));
        assert!(thresholds.violated_by(&RollingQuality {
            log_loss: 0.80,
            brier: 0.20,
        }));
        assert!(thresholds.violated_by(&RollingQuality {
            log_loss: 0.55,
            brier: 0.30,
        }));
    }
}
