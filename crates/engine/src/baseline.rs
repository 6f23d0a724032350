//! Per-actor behavioral baselines.
//!
//! [`compute_from_events`] is the pure core: it folds an actor's event
//! history into the profile the scoring rules compare against. The
//! [`BaselineEngine`] wraps it with store access, falls back to system
//! defaults for new or sparse actors, and runs the periodic batch pass.

use chrono::{DateTime, Duration, Timelike, Utc};
use irm_core::error::Result;
use irm_core::EventOutcome;
use irm_store::{Baseline, Event, Store};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{info, warn};
use uuid::Uuid;

/// Actors with fewer events than this in the window get system defaults
/// instead of a profile fitted to noise.
pub const MIN_EVENTS_FOR_BASELINE: usize = 5;

/// Default daily byte volume assumed for unknown actors (10 MiB). Also the
/// floor the volume-spike rule divides by.
pub const DEFAULT_AVG_BYTES_PER_DAY: f64 = (10u64 * 1024 * 1024) as f64;

const DEFAULT_AVG_EVENTS_PER_DAY: f64 = 50.0;
const DEFAULT_RESOURCE_SCOPE: i32 = 20;
const DEFAULT_FAILURE_RATE: f64 = 0.05;

/// An hour must account for at least this share of events to count as
/// typical.
const TYPICAL_HOUR_SHARE: f64 = 0.1;

/// System-default profile for new or sparse actors: business hours, modest
/// volume, small resource scope.
pub fn default_baseline(actor_id: &str, window_days: i32, computed_at: DateTime<Utc>) -> Baseline {
    Baseline {
        id: Uuid::new_v4(),
        actor_id: actor_id.to_string(),
        computed_at,
        window_days,
        typical_active_hours: (9..=17).collect(),
        known_ip_addresses: Vec::new(),
        known_user_agents: Vec::new(),
        avg_bytes_per_day: DEFAULT_AVG_BYTES_PER_DAY,
        avg_events_per_day: DEFAULT_AVG_EVENTS_PER_DAY,
        typical_resource_scope: DEFAULT_RESOURCE_SCOPE,
        normal_failure_rate: DEFAULT_FAILURE_RATE,
        event_count: 0,
        first_seen: None,
        last_seen: None,
    }
}

/// Fold an event history into a baseline. Pure; the caller supplies the
/// computation timestamp so results are reproducible.
pub fn compute_from_events(
    actor_id: &str,
    events: &[Event],
    window_days: i32,
    computed_at: DateTime<Utc>,
) -> Baseline {
    let days = window_days.max(1) as f64;

    let mut hour_counts: BTreeMap<i32, usize> = BTreeMap::new();
    let mut ips: BTreeSet<String> = BTreeSet::new();
    let mut user_agents: BTreeSet<String> = BTreeSet::new();
    let mut resources: BTreeSet<&str> = BTreeSet::new();
    let mut total_bytes: i64 = 0;
    let mut failures: usize = 0;
    let mut first_seen: Option<DateTime<Utc>> = None;
    let mut last_seen: Option<DateTime<Utc>> = None;

    for event in events {
        *hour_counts.entry(event.occurred_at.hour() as i32).or_insert(0) += 1;

        if let Some(ip) = &event.ip {
            ips.insert(ip.clone());
        }
        if let Some(ua) = &event.user_agent {
            user_agents.insert(ua.clone());
        }
        if let Some(resource) = &event.resource_id {
            resources.insert(resource);
        }

        total_bytes += event.bytes.unwrap_or(0);
        if event.outcome == EventOutcome::Failure {
            failures += 1;
        }

        first_seen = Some(match first_seen {
            Some(seen) => seen.min(event.occurred_at),
            None => event.occurred_at,
        });
        last_seen = Some(match last_seen {
            Some(seen) => seen.max(event.occurred_at),
            None => event.occurred_at,
        });
    }

    let hour_threshold =
        (((events.len() as f64) * TYPICAL_HOUR_SHARE).floor() as usize).max(1);
    let typical_active_hours: Vec<i32> = hour_counts
        .iter()
        .filter(|(_, count)| **count >= hour_threshold)
        .map(|(hour, _)| *hour)
        .collect();

    let normal_failure_rate = if events.is_empty() {
        0.0
    } else {
        failures as f64 / events.len() as f64
    };

    Baseline {
        id: Uuid::new_v4(),
        actor_id: actor_id.to_string(),
        computed_at,
        window_days,
        typical_active_hours,
        known_ip_addresses: ips.into_iter().collect(),
        known_user_agents: user_agents.into_iter().collect(),
        avg_bytes_per_day: total_bytes as f64 / days,
        avg_events_per_day: events.len() as f64 / days,
        typical_resource_scope: resources.len() as i32,
        normal_failure_rate,
        event_count: events.len() as i32,
        first_seen,
        last_seen,
    }
}

/// Outcome of one `compute_all` batch pass. Individual actor failures never
/// abort the batch; they are counted and a bounded sample of messages is
/// kept.
#[derive(Debug, Default)]
pub struct BaselineBatchReport {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

const MAX_REPORTED_ERRORS: usize = 25;

#[derive(Clone)]
pub struct BaselineEngine {
    store: Store,
    window_days: i32,
}

impl BaselineEngine {
    pub fn new(store: Store, window_days: i32) -> Self {
        Self {
            store,
            window_days: window_days.max(1),
        }
    }

    /// Compute and persist a fresh baseline for one actor. Sparse actors
    /// (< [`MIN_EVENTS_FOR_BASELINE`] events in the window) get system
    /// defaults with the observed event count.
    pub async fn compute(&self, actor_id: &str) -> Result<Baseline> {
        let now = Utc::now();
        let since = now - Duration::days(self.window_days as i64);
        let events = self.store.events_for_actor_since(actor_id, since).await?;

        let baseline = if events.len() < MIN_EVENTS_FOR_BASELINE {
            let mut defaults = default_baseline(actor_id, self.window_days, now);
            defaults.event_count = events.len() as i32;
            defaults
        } else {
            compute_from_events(actor_id, &events, self.window_days, now)
        };

        self.store.insert_baseline(&baseline).await?;

        Ok(baseline)
    }

    /// Recompute baselines for every actor with events in the window.
    pub async fn compute_all(&self) -> BaselineBatchReport {
        let now = Utc::now();
        let since = now - Duration::days(self.window_days as i64);

        let actor_ids = match self.store.actor_ids_with_events_since(since).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "Baseline batch could not enumerate actors");
                return BaselineBatchReport {
                    processed: 0,
                    succeeded: 0,
                    failed: 0,
                    errors: vec![e.to_string()],
                };
            }
        };

        let mut report = BaselineBatchReport::default();

        for actor_id in actor_ids {
            report.processed += 1;
            match self.compute(&actor_id).await {
                Ok(_) => report.succeeded += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(actor_id = %actor_id, error = %e, "Baseline computation failed");
                    if report.errors.len() < MAX_REPORTED_ERRORS {
                        report.errors.push(format!("{}: {}", actor_id, e));
                    }
                }
            }
        }

        info!(
            processed = report.processed,
            succeeded = report.succeeded,
            failed = report.failed,
            "Baseline batch completed"
        );

        report
    }

    /// Latest persisted baseline, or a freshly computed one (which itself
    /// falls back to defaults for sparse actors).
    pub async fn get_or_compute(&self, actor_id: &str) -> Result<Baseline> {
        if let Some(baseline) = self.store.latest_baseline_for_actor(actor_id).await? {
            return Ok(baseline);
        }
        self.compute(actor_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use irm_core::ActorType;
    use serde_json::json;

    fn event_at(hour: u32, minute: u32) -> Event {
        Event {
            id: Uuid::new_v4(),
            occurred_at: Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 0).unwrap(),
            ingested_at: Utc.with_ymd_and_hms(2024, 6, 10, hour, minute, 5).unwrap(),
            actor_id: "alice@corp".to_string(),
            actor_type: ActorType::Employee,
            source_id: Uuid::new_v4(),
            action_type: "login".to_string(),
            resource_type: None,
            resource_id: None,
            outcome: EventOutcome::Success,
            ip: None,
            user_agent: None,
            bytes: None,
            metadata: json!({}),
        }
    }

    fn computed_at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 11, 0, 0, 0).unwrap()
    }

    #[test]
    fn empty_history_yields_zeroed_profile() {
        let baseline = compute_from_events("alice@corp", &[], 14, computed_at());
        assert_eq!(baseline.event_count, 0);
        assert_eq!(baseline.normal_failure_rate, 0.0);
        assert_eq!(baseline.avg_bytes_per_day, 0.0);
        assert!(baseline.typical_active_hours.is_empty());
        assert!(baseline.first_seen.is_none());
        assert!(baseline.last_seen.is_none());
    }

    #[test]
    fn typical_hours_need_a_tenth_of_events() {
        // 20 events at hour 9, 1 stray event at hour 23: threshold is
        // max(1, floor(21 * 0.1)) = 2, so hour 23 does not qualify.
        let mut events: Vec<Event> = (0..20).map(|i| event_at(9, i)).collect();
        events.push(event_at(23, 0));

        let baseline = compute_from_events("alice@corp", &events, 14, computed_at());
        assert_eq!(baseline.typical_active_hours, vec![9]);
    }

    #[test]
    fn single_event_still_has_a_typical_hour() {
        let events = vec![event_at(14, 0)];
        let baseline = compute_from_events("alice@corp", &events, 14, computed_at());
        assert_eq!(baseline.typical_active_hours, vec![14]);
    }

    #[test]
    fn aggregates_are_computed_over_the_window() {
        let mut e1 = event_at(9, 0);
        e1.ip = Some("10.0.0.1".to_string());
        e1.user_agent = Some("agent/1".to_string());
        e1.resource_id = Some("doc-1".to_string());
        e1.bytes = Some(700);

        let mut e2 = event_at(9, 30);
        e2.ip = Some("10.0.0.1".to_string());
        e2.resource_id = Some("doc-2".to_string());
        e2.outcome = EventOutcome::Failure;

        let mut e3 = event_at(10, 0);
        e3.ip = Some("10.0.0.2".to_string());
        e3.resource_id = Some("doc-1".to_string());
        e3.bytes = Some(700);

        let events = vec![e1, e2, e3];
        let baseline = compute_from_events("alice@corp", &events, 7, computed_at());

        assert_eq!(baseline.known_ip_addresses, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(baseline.known_user_agents, vec!["agent/1"]);
        assert_eq!(baseline.typical_resource_scope, 2);
        assert_eq!(baseline.avg_bytes_per_day, 1400.0 / 7.0);
        assert_eq!(baseline.avg_events_per_day, 3.0 / 7.0);
        assert!((baseline.normal_failure_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(baseline.event_count, 3);
        assert_eq!(baseline.first_seen.unwrap().hour(), 9);
        assert_eq!(baseline.last_seen.unwrap().hour(), 10);
    }

    #[test]
    fn defaults_describe_a_business_hours_actor() {
        let baseline = default_baseline("new@corp", 14, computed_at());
        assert_eq!(baseline.typical_active_hours, (9..=17).collect::<Vec<i32>>());
        assert!(baseline.known_ip_addresses.is_empty());
        assert!(baseline.known_user_agents.is_empty());
        assert_eq!(baseline.avg_bytes_per_day, 10.0 * 1024.0 * 1024.0);
        assert_eq!(baseline.avg_events_per_day, 50.0);
        assert_eq!(baseline.typical_resource_scope, 20);
        assert_eq!(baseline.normal_failure_rate, 0.05);
    }
}
