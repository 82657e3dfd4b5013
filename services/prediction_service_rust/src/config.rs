//! Configuration constants and environment loading for the prediction
//! service:
//! - signal source endpoint and fetch timeouts
//! - config store location and retention
//! - guardrail cadence and quality thresholds
//! - metrics listener and heartbeat interval

use anyhow::Result;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use winprob_core::guardrail::{GuardrailConfig, DEFAULT_CHECK_INTERVAL, DEFAULT_TRIP_THRESHOLD};
use winprob_core::quality::QualityThresholds;

/// Default base URL of the signal aggregator (bullpen/fatigue/lineup).
pub const DEFAULT_SIGNAL_BASE_URL: &str = "http://signal_aggregator:8200";

/// Default endpoint exposing the rolling quality gauges.
pub const DEFAULT_QUALITY_ENDPOINT: &str = "http://quality_aggregator:9600/metrics";

/// Default directory for versioned engine configs.
pub const DEFAULT_CONFIG_DIR: &str = "/var/lib/winprob/configs";

/// Default per-signal fetch timeout in milliseconds.
pub const DEFAULT_FETCH_TIMEOUT_MS: u64 = 750;

/// Default Prometheus scrape listener.
pub const DEFAULT_METRICS_LISTEN: &str = "0.0.0.0:9500";

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 10;

/// Default number of retained config versions.
pub const DEFAULT_KEEP_VERSIONS: usize = 50;

/// Default per-game update queue depth.
pub const DEFAULT_QUEUE_DEPTH: usize = 32;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub engine_id: String,
    pub config_dir: String,
    pub config_name: String,
    pub signal_base_url: String,
    pub fetch_timeout: Duration,
    pub quality_endpoint: String,
    pub metrics_listen: SocketAddr,
    pub heartbeat_interval: Duration,
    pub keep_versions: usize,
    pub queue_depth: usize,
    pub guardrail: GuardrailConfig,
}

impl ServiceConfig {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> Result<Self> {
        let engine_id = env::var("ENGINE_ID").unwrap_or_else(|_| {
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "winprob_engine".to_string())
        });

        let config_dir =
            env::var("CONFIG_DIR").unwrap_or_else(|_| DEFAULT_CONFIG_DIR.to_string());
        let config_name = env::var("CONFIG_NAME").unwrap_or_else(|_| "engine".to_string());

        let signal_base_url =
            env::var("SIGNAL_BASE_URL").unwrap_or_else(|_| DEFAULT_SIGNAL_BASE_URL.to_string());

        let fetch_timeout = Duration::from_millis(
            parse_env("SIGNAL_FETCH_TIMEOUT_MS", DEFAULT_FETCH_TIMEOUT_MS).clamp(50, 5_000),
        );

        let quality_endpoint =
            env::var("QUALITY_ENDPOINT").unwrap_or_else(|_| DEFAULT_QUALITY_ENDPOINT.to_string());

        let metrics_listen: SocketAddr = env::var("METRICS_LISTEN")
            .unwrap_or_else(|_| DEFAULT_METRICS_LISTEN.to_string())
            .parse()?;

        let heartbeat_interval = Duration::from_secs(parse_env(
            "HEARTBEAT_INTERVAL_SECS",
            DEFAULT_HEARTBEAT_INTERVAL_SECS,
        ));

        let guardrail = GuardrailConfig {
            check_interval: Duration::from_secs(
                parse_env("GUARDRAIL_INTERVAL_SECS", DEFAULT_CHECK_INTERVAL.as_secs()).max(5),
            ),
            trip_threshold: parse_env("GUARDRAIL_TRIP_THRESHOLD", DEFAULT_TRIP_THRESHOLD).max(1),
            thresholds: QualityThresholds {
                max_log_loss: parse_env(
                    "GUARDRAIL_MAX_LOG_LOSS",
                    QualityThresholds::default().max_log_loss,
                ),
                max_brier: parse_env(
                    "GUARDRAIL_MAX_BRIER",
                    QualityThresholds::default().max_brier,
                ),
            },
        };

        Ok(Self {
            engine_id,
            config_dir,
            config_name,
            signal_base_url,
            fetch_timeout,
            quality_endpoint,
            metrics_listen,
            heartbeat_interval,
            keep_versions: parse_env("CONFIG_KEEP_VERSIONS", DEFAULT_KEEP_VERSIONS),
            queue_depth: parse_env("GAME_QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH).max(1),
            guardrail,
        })
    }
}

fn parse_env<T: std::str::FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}
