//! Explainable risk scoring.
//!
//! [`score_actor`] is pure and deterministic: the same actor, baseline,
//! events, rules, and reference time always produce byte-identical
//! contributions in the canonical rule order, and the result is invariant
//! to permutations of the events input. All time arithmetic is relative to
//! the caller-supplied reference time; nothing here reads the clock.

pub mod rules;

use chrono::{DateTime, Duration, Timelike, Utc};
use irm_core::error::Result;
use irm_core::{EventOutcome, RuleKey};
use irm_store::{Baseline, BaselineComparison, Event, RiskScore, RuleContribution, ScoringRule, Store};
use sqlx::types::Json;
use std::collections::BTreeSet;
use tracing::warn;
use uuid::Uuid;

pub use rules::{default_rules, defaults_for};

/// Maximum total score.
const SCORE_CAP: u32 = 100;

/// Output of one scoring pass for one actor.
#[derive(Debug, Clone, PartialEq)]
pub struct RiskScoreResult {
    pub actor_id: String,
    pub total_score: u32,
    pub computed_at: DateTime<Utc>,
    pub contributions: Vec<RuleContribution>,
    pub triggering_event_ids: Vec<Uuid>,
    pub comparison: BaselineComparison,
}

/// Evaluate every enabled rule against the actor's recent events.
///
/// Rules are taken in the canonical [`RuleKey::ORDER`] regardless of their
/// order in `rules`. A rule evaluator failure is logged and skips that rule
/// only. The total score is the clamped sum of contribution points.
pub fn score_actor(
    actor_id: &str,
    baseline: &Baseline,
    events: &[Event],
    rules: &[ScoringRule],
    reference_time: DateTime<Utc>,
) -> RiskScoreResult {
    let mut contributions: Vec<RuleContribution> = Vec::new();
    let mut max_triggered_window: Option<i64> = None;

    for key in RuleKey::ORDER {
        let Some(rule) = rules.iter().find(|r| r.rule_key == key) else {
            continue;
        };
        if !rule.enabled {
            continue;
        }

        let window_minutes = rules::effective_window_minutes(rule);
        let cutoff = reference_time - Duration::minutes(window_minutes);
        let window_events: Vec<&Event> =
            events.iter().filter(|e| e.occurred_at >= cutoff).collect();

        match rules::evaluate(rule, baseline, &window_events) {
            Ok(Some(signal)) => {
                contributions.push(RuleContribution {
                    rule_id: rule.id,
                    rule_key: key,
                    rule_name: rule.name.clone(),
                    points: signal.points,
                    reason: signal.reason,
                    current_value: signal.current_value,
                    baseline_value: signal.baseline_value,
                });
                max_triggered_window = Some(
                    max_triggered_window.map_or(window_minutes, |w| w.max(window_minutes)),
                );
            }
            Ok(None) => {}
            Err(e) => {
                // One broken rule never takes down the whole score.
                warn!(rule_key = %key, actor_id = %actor_id, error = %e, "Rule evaluation failed; skipping rule");
            }
        }
    }

    let raw_total: u32 = contributions.iter().map(|c| c.points).sum();
    let total_score = raw_total.min(SCORE_CAP);

    let triggering_event_ids = match max_triggered_window {
        None => Vec::new(),
        Some(window_minutes) => {
            let cutoff = reference_time - Duration::minutes(window_minutes);
            let mut triggering: Vec<(DateTime<Utc>, Uuid)> = events
                .iter()
                .filter(|e| e.occurred_at >= cutoff)
                .map(|e| (e.occurred_at, e.id))
                .collect();
            triggering.sort();
            triggering.dedup();
            triggering.into_iter().map(|(_, id)| id).collect()
        }
    };

    RiskScoreResult {
        actor_id: actor_id.to_string(),
        total_score,
        computed_at: reference_time,
        contributions,
        triggering_event_ids,
        comparison: build_comparison(baseline, events),
    }
}

/// Pair the baseline profile with the window aggregates for display on
/// alerts.
fn build_comparison(baseline: &Baseline, events: &[Event]) -> BaselineComparison {
    let current_hours: Vec<i32> = events
        .iter()
        .map(|e| e.occurred_at.hour() as i32)
        .collect::<BTreeSet<i32>>()
        .into_iter()
        .collect();

    let current_bytes: i64 = events.iter().filter_map(|e| e.bytes).sum();

    let current_scope = events
        .iter()
        .filter_map(|e| e.resource_id.as_deref())
        .collect::<BTreeSet<&str>>()
        .len();

    let current_failure_rate = if events.is_empty() {
        0.0
    } else {
        events
            .iter()
            .filter(|e| e.outcome == EventOutcome::Failure)
            .count() as f64
            / events.len() as f64
    };

    BaselineComparison {
        typical_hours: baseline.typical_active_hours.clone(),
        current_hours,
        avg_bytes: baseline.avg_bytes_per_day,
        current_bytes: current_bytes as f64,
        normal_scope: baseline.typical_resource_scope as f64,
        current_scope: current_scope as f64,
        normal_failure_rate: baseline.normal_failure_rate,
        current_failure_rate,
    }
}

/// Store-backed persistence of a scoring pass: the append-only RiskScore
/// row first, then the actor's current score. Alert evaluation follows in
/// the alerting engine.
#[derive(Clone)]
pub struct ScoringEngine {
    store: Store,
}

impl ScoringEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    pub async fn persist(&self, result: &RiskScoreResult) -> Result<RiskScore> {
        let record = RiskScore {
            id: Uuid::new_v4(),
            actor_id: result.actor_id.clone(),
            total_score: result.total_score as i32,
            computed_at: result.computed_at,
            rule_contributions: Json(result.contributions.clone()),
            triggering_event_ids: result.triggering_event_ids.clone(),
        };

        self.store.insert_risk_score(&record).await?;
        self.store
            .upsert_actor_risk_score(&result.actor_id, result.total_score as i32, result.computed_at)
            .await?;

        Ok(record)
    }
}
