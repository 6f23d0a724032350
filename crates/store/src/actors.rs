use crate::Store;
use chrono::{DateTime, Utc};
use irm_core::error::Result;

impl Store {
    /// Write the freshly computed risk score onto the actor row, creating it
    /// if scoring somehow ran ahead of ingestion. Last writer wins on
    /// `last_seen`.
    pub async fn upsert_actor_risk_score(
        &self,
        actor_id: &str,
        score: i32,
        seen_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO actors (actor_id, actor_type, first_seen, last_seen, current_risk_score)
             VALUES ($1, 'employee', $2, $2, $3)
             ON CONFLICT (actor_id) DO UPDATE
             SET current_risk_score = EXCLUDED.current_risk_score,
                 last_seen = EXCLUDED.last_seen",
        )
        .bind(actor_id)
        .bind(seen_at)
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
