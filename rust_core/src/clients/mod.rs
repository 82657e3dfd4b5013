//! External signal sources.
//!
//! Bullpen strength, the identity of the current pitcher, pitcher fatigue
//! and lineup confirmation all come from read-only upstream services. Every
//! query is bounded by the caller's timeout and any failure is soft: the
//! prediction pipeline records the step as skipped and continues.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreaker;
use crate::models::{BullpenRating, FatigueSignal, LineupSignal, PitcherRef};

/// Read-only queries against the signal services, keyed by
/// (date, team-or-player, game id).
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn bullpen_rating(
        &self,
        date: NaiveDate,
        team: &str,
        game_id: &str,
    ) -> Result<BullpenRating>;

    /// Resolve who is on the mound right now. A required collaborator call,
    /// not an inference: fatigue is meaningless without it.
    async fn current_pitcher(&self, game_id: &str) -> Result<PitcherRef>;

    async fn pitcher_fatigue(
        &self,
        date: NaiveDate,
        player_id: &str,
        game_id: &str,
    ) -> Result<FatigueSignal>;

    async fn lineup_confirmation(
        &self,
        date: NaiveDate,
        team: &str,
        game_id: &str,
    ) -> Result<LineupSignal>;
}

/// HTTP implementation against the signal aggregator service.
pub struct HttpSignalSource {
    client: Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl HttpSignalSource {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: base_url.trim_end_matches('/').to_string(),
            breaker: CircuitBreaker::with_defaults("signal_source"),
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        if !self.breaker.is_available() {
            return Err(anyhow!("signal source circuit breaker open"));
        }

        let url = format!("{}{}", self.base_url, path);
        let result = async {
            let value = self
                .client
                .get(&url)
                .send()
                .await?
                .error_for_status()?
                .json::<T>()
                .await?;
            Ok(value)
        }
        .await;

        match &result {
            Ok(_) => self.breaker.record_success(),
            Err(_) => self.breaker.record_failure(),
        }
        result
    }
}

#[async_trait]
impl SignalSource for HttpSignalSource {
    async fn bullpen_rating(
        &self,
        date: NaiveDate,
        team: &str,
        game_id: &str,
    ) -> Result<BullpenRating> {
        self.get_json(&format!(
            "/bullpen/{}/{}?game_id={}",
            date.format("%Y-%m-%d"),
            team,
            game_id
        ))
        .await
    }

    async fn current_pitcher(&self, game_id: &str) -> Result<PitcherRef> {
        self.get_json(&format!("/games/{}/current-pitcher", game_id))
            .await
    }

    async fn pitcher_fatigue(
        &self,
        date: NaiveDate,
        player_id: &str,
        game_id: &str,
    ) -> Result<FatigueSignal> {
        self.get_json(&format!(
            "/fatigue/{}/{}?game_id={}",
            date.format("%Y-%m-%d"),
            player_id,
            game_id
        ))
        .await
    }

    async fn lineup_confirmation(
        &self,
        date: NaiveDate,
        team: &str,
        game_id: &str,
    ) -> Result<LineupSignal> {
        self.get_json(&format!(
            "/lineup/{}/{}?game_id={}",
            date.format("%Y-%m-%d"),
            team,
            game_id
        ))
        .await
    }
}
