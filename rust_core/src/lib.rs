//! Winprob Core - live win-probability engine and guardrail control loop.
//!
//! This crate provides:
//! - Precomputed win-expectancy table over quantized game situations
//! - Bounded logit-space adjustments (bullpen, fatigue, lineup)
//! - Pregame/live mixing, smoothing and phase calibration
//! - The live prediction pipeline with fail-soft signal fetches
//! - Versioned engine configuration with atomic current-pointer swap
//! - The guardrail controller: feature-disable and rollback remediation
//! - Circuit breakers for external signal and metrics endpoints
//! - Redis bus and Postgres persistence plumbing for the services

pub mod adjust;
pub mod circuit_breaker;
pub mod clients;
pub mod config;
pub mod config_store;
pub mod db;
pub mod guardrail;
pub mod logit;
pub mod mixing;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod quality;
pub mod redis;
pub mod reload;
pub mod store;
pub mod table;

pub use config::EngineConfig;
pub use models::{GameContext, GameSituation, PredictionRecord};
pub use predictor::LivePredictor;
pub use table::WinExpectancyTable;
