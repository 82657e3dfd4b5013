//! Postgres persistence for prediction records.
//!
//! Two tables: `prediction_timeline` is the per-game append-only history,
//! `prediction_latest` holds one upserted row per game for cheap reads. The
//! full record travels as a JSONB payload with a few indexed columns
//! alongside.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

use crate::models::PredictionRecord;
use crate::store::{PredictionStore, StoreError};

pub struct PgPredictionStore {
    pool: PgPool,
}

impl PgPredictionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PredictionStore for PgPredictionStore {
    async fn append(&self, record: &PredictionRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(record)?;

        debug!(
            game_id = %record.game_id,
            inning = record.inning,
            prob = record.final_home_prob,
            "persisting prediction record"
        );

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO prediction_timeline (
                record_id, game_id, created_at, inning, home_win_prob, payload
            )
            VALUES ($1, $2, $3, $4, $5, $6::jsonb)
            "#,
        )
        .bind(&record.record_id)
        .bind(&record.game_id)
        .bind(record.created_at)
        .bind(record.inning as i32)
        .bind(record.final_home_prob)
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO prediction_latest (game_id, record_id, created_at, payload)
            VALUES ($1, $2, $3, $4::jsonb)
            ON CONFLICT (game_id) DO UPDATE SET
                record_id = EXCLUDED.record_id,
                created_at = EXCLUDED.created_at,
                payload = EXCLUDED.payload
            "#,
        )
        .bind(&record.game_id)
        .bind(&record.record_id)
        .bind(record.created_at)
        .bind(&payload)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn latest(&self, game_id: &str) -> Result<Option<PredictionRecord>, StoreError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT payload::text FROM prediction_latest WHERE game_id = $1")
                .bind(game_id)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((payload,)) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }
}
