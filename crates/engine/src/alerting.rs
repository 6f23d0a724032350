//! Alert gating, severity mapping, deduplication, and triage transitions.
//!
//! [`create_alert_from_score`] is the pure gate: a score below the
//! threshold produces nothing, anything else becomes an open alert with its
//! severity bucket and the full evidentiary snapshot. The stateful
//! [`AlertingEngine`] adds deduplication against open alerts and persists
//! in the required order (actor first, then alert).

use chrono::{DateTime, Duration, Utc};
use irm_core::error::{Error, Result};
use irm_core::{AlertSeverity, AlertStatus};
use irm_store::{Alert, Store};
use sqlx::types::Json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::scoring::RiskScoreResult;

#[derive(Debug, Clone)]
pub struct AlertingOptions {
    pub threshold: u32,
    pub deduplication_window_minutes: i64,
    pub skip_deduplication: bool,
}

impl Default for AlertingOptions {
    fn default() -> Self {
        Self {
            threshold: 60,
            deduplication_window_minutes: 60,
            skip_deduplication: false,
        }
    }
}

/// Why no alert was raised, or the alert that was.
#[derive(Debug, Clone)]
pub enum AlertOutcome {
    Created(Alert),
    BelowThreshold { score: u32, threshold: u32 },
    Duplicate { existing_alert_id: Uuid },
}

impl AlertOutcome {
    pub fn alert_created(&self) -> bool {
        matches!(self, AlertOutcome::Created(_))
    }
}

/// Turn a scoring result into alert data, or nothing when the score is
/// below the threshold. Pure; `now` stamps the alert's creation time.
pub fn create_alert_from_score(
    result: &RiskScoreResult,
    threshold: u32,
    now: DateTime<Utc>,
) -> Option<Alert> {
    if result.total_score < threshold {
        return None;
    }

    Some(Alert {
        id: Uuid::new_v4(),
        actor_id: result.actor_id.clone(),
        score: result.total_score as i32,
        severity: AlertSeverity::for_score(result.total_score),
        status: AlertStatus::Open,
        rule_contributions: Json(result.contributions.clone()),
        baseline_comparison: Json(result.comparison.clone()),
        triggering_event_ids: result.triggering_event_ids.clone(),
        created_at: now,
        updated_at: now,
        acknowledged_by: None,
        acknowledged_at: None,
        resolved_by: None,
        resolved_at: None,
    })
}

/// Apply one triage transition. Resolving or false-positiving an alert
/// that was never acknowledged backfills the acknowledgment with the
/// resolver's identity and timestamp.
pub fn apply_status_transition(
    alert: &mut Alert,
    next: AlertStatus,
    by: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    if !alert.status.can_transition_to(next) {
        return Err(Error::validation(format!(
            "illegal alert status transition {} -> {}",
            alert.status, next
        )));
    }

    match next {
        AlertStatus::Acknowledged => {
            alert.acknowledged_by = Some(by.to_string());
            alert.acknowledged_at = Some(at);
        }
        AlertStatus::Resolved | AlertStatus::FalsePositive => {
            alert.resolved_by = Some(by.to_string());
            alert.resolved_at = Some(at);
            if alert.acknowledged_by.is_none() {
                alert.acknowledged_by = Some(by.to_string());
                alert.acknowledged_at = Some(at);
            }
        }
        AlertStatus::Open => unreachable!("no transition leads back to open"),
    }

    alert.status = next;
    alert.updated_at = at;

    Ok(())
}

#[derive(Clone)]
pub struct AlertingEngine {
    store: Store,
}

impl AlertingEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Threshold gate, dedup probe, actor upsert, alert insert, in that
    /// order.
    pub async fn evaluate_and_alert(
        &self,
        result: &RiskScoreResult,
        options: &AlertingOptions,
    ) -> Result<AlertOutcome> {
        if result.total_score < options.threshold {
            debug!(
                actor_id = %result.actor_id,
                score = result.total_score,
                threshold = options.threshold,
                "Score below alert threshold"
            );
            return Ok(AlertOutcome::BelowThreshold {
                score: result.total_score,
                threshold: options.threshold,
            });
        }

        let now = Utc::now();

        if !options.skip_deduplication {
            let since = now - Duration::minutes(options.deduplication_window_minutes);
            if let Some(existing) = self
                .store
                .find_open_alert_since(&result.actor_id, since)
                .await?
            {
                debug!(
                    actor_id = %result.actor_id,
                    existing_alert_id = %existing.id,
                    "Open alert already covers this actor; deduplicating"
                );
                return Ok(AlertOutcome::Duplicate {
                    existing_alert_id: existing.id,
                });
            }
        }

        self.store
            .upsert_actor_risk_score(&result.actor_id, result.total_score as i32, now)
            .await?;

        let alert = create_alert_from_score(result, options.threshold, now)
            .ok_or_else(|| Error::internal("alert gating disagreed with threshold check"))?;
        let created = self.store.insert_alert(&alert).await?;

        info!(
            alert_id = %created.id,
            actor_id = %created.actor_id,
            score = created.score,
            severity = %created.severity,
            "Alert created"
        );

        Ok(AlertOutcome::Created(created))
    }

    /// Triage transition with persistence.
    pub async fn transition(
        &self,
        alert_id: Uuid,
        next: AlertStatus,
        by: &str,
    ) -> Result<Alert> {
        let mut alert = self
            .store
            .get_alert(alert_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("alert {} not found", alert_id)))?;

        apply_status_transition(&mut alert, next, by, Utc::now())?;

        self.store.save_alert_triage(&alert).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use irm_store::BaselineComparison;

    fn result_with_score(score: u32) -> RiskScoreResult {
        RiskScoreResult {
            actor_id: "bob@corp".to_string(),
            total_score: score,
            computed_at: now(),
            contributions: Vec::new(),
            triggering_event_ids: vec![Uuid::new_v4()],
            comparison: BaselineComparison::default(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn gating_is_exact_at_threshold() {
        assert!(create_alert_from_score(&result_with_score(59), 60, now()).is_none());
        assert!(create_alert_from_score(&result_with_score(60), 60, now()).is_some());
        assert!(create_alert_from_score(&result_with_score(100), 60, now()).is_some());

        // A lowered threshold admits lower scores
        assert!(create_alert_from_score(&result_with_score(30), 30, now()).is_some());
        assert!(create_alert_from_score(&result_with_score(29), 30, now()).is_none());
    }

    #[test]
    fn new_alerts_open_with_matching_severity() {
        let alert = create_alert_from_score(&result_with_score(64), 60, now()).unwrap();
        assert_eq!(alert.status, AlertStatus::Open);
        assert_eq!(alert.severity, AlertSeverity::Low);
        assert_eq!(alert.score, 64);
        assert_eq!(alert.created_at, now());
        assert_eq!(alert.updated_at, now());
        assert!(alert.acknowledged_by.is_none());
        assert!(alert.resolved_by.is_none());

        assert_eq!(
            create_alert_from_score(&result_with_score(75), 60, now()).unwrap().severity,
            AlertSeverity::Medium
        );
        assert_eq!(
            create_alert_from_score(&result_with_score(85), 60, now()).unwrap().severity,
            AlertSeverity::High
        );
        assert_eq!(
            create_alert_from_score(&result_with_score(95), 60, now()).unwrap().severity,
            AlertSeverity::Critical
        );
    }

    #[test]
    fn acknowledge_then_resolve() {
        let mut alert = create_alert_from_score(&result_with_score(80), 60, now()).unwrap();

        let t1 = now() + Duration::minutes(5);
        apply_status_transition(&mut alert, AlertStatus::Acknowledged, "analyst@corp", t1).unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert_eq!(alert.acknowledged_by.as_deref(), Some("analyst@corp"));
        assert_eq!(alert.acknowledged_at, Some(t1));
        assert_eq!(alert.updated_at, t1);

        let t2 = now() + Duration::minutes(30);
        apply_status_transition(&mut alert, AlertStatus::Resolved, "lead@corp", t2).unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolved_by.as_deref(), Some("lead@corp"));
        assert_eq!(alert.resolved_at, Some(t2));
        // The original acknowledgment is untouched
        assert_eq!(alert.acknowledged_by.as_deref(), Some("analyst@corp"));
        assert_eq!(alert.acknowledged_at, Some(t1));
    }

    #[test]
    fn direct_resolution_backfills_acknowledgment() {
        let mut alert = create_alert_from_score(&result_with_score(80), 60, now()).unwrap();

        let t1 = now() + Duration::minutes(10);
        apply_status_transition(&mut alert, AlertStatus::FalsePositive, "analyst@corp", t1).unwrap();

        assert_eq!(alert.status, AlertStatus::FalsePositive);
        assert_eq!(alert.resolved_by.as_deref(), Some("analyst@corp"));
        assert_eq!(alert.resolved_at, Some(t1));
        assert_eq!(alert.acknowledged_by.as_deref(), Some("analyst@corp"));
        assert_eq!(alert.acknowledged_at, Some(t1));
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut alert = create_alert_from_score(&result_with_score(80), 60, now()).unwrap();
        apply_status_transition(&mut alert, AlertStatus::Resolved, "analyst@corp", now()).unwrap();

        for next in [
            AlertStatus::Open,
            AlertStatus::Acknowledged,
            AlertStatus::Resolved,
            AlertStatus::FalsePositive,
        ] {
            let mut copy = alert.clone();
            assert!(apply_status_transition(&mut copy, next, "x@corp", now()).is_err());
        }
    }

    #[test]
    fn alert_carries_full_evidence() {
        let result = result_with_score(72);
        let alert = create_alert_from_score(&result, 60, now()).unwrap();

        assert_eq!(alert.actor_id, "bob@corp");
        assert_eq!(alert.triggering_event_ids, result.triggering_event_ids);
        assert_eq!(alert.baseline_comparison.0, result.comparison);
    }
}
