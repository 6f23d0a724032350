use crate::models::RiskScore;
use crate::Store;
use irm_core::error::Result;

impl Store {
    /// Risk scores are append-only evidence; one row per scoring pass.
    pub async fn insert_risk_score(&self, score: &RiskScore) -> Result<()> {
        sqlx::query(
            "INSERT INTO risk_scores (id, actor_id, total_score, computed_at, rule_contributions,
                                      triggering_event_ids)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(score.id)
        .bind(&score.actor_id)
        .bind(score.total_score)
        .bind(score.computed_at)
        .bind(&score.rule_contributions)
        .bind(&score.triggering_event_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
