//! The fixed rule set and its evaluators.
//!
//! Each evaluator is a pure function of (rule config, baseline, events in
//! the rule's window). A rule that does not trigger contributes nothing; a
//! triggered rule awards its full weight and explains itself with a human
//! reason plus paired current/baseline values for display.

use chrono::{Timelike, Utc};
use irm_core::error::Result;
use irm_core::{EventOutcome, RuleKey};
use irm_store::{Baseline, Event, ScoringRule};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::baseline::DEFAULT_AVG_BYTES_PER_DAY;

/// Floor for the resource-scope denominator; keeps tiny baselines from
/// turning routine access into a spike.
const SCOPE_DENOMINATOR_FLOOR: f64 = 10.0;

/// A triggered rule's output before it becomes a contribution.
#[derive(Debug, Clone)]
pub(crate) struct RuleSignal {
    pub points: u32,
    pub reason: String,
    pub current_value: Value,
    pub baseline_value: Value,
}

/// (weight, threshold, window_minutes) fallbacks per rule, used when a
/// stored rule row carries non-positive values.
pub fn defaults_for(key: RuleKey) -> (i32, f64, i32) {
    match key {
        RuleKey::OffHours => (15, 2.0, 60),
        RuleKey::NewIp => (15, 1.0, 60),
        RuleKey::VolumeSpike => (25, 3.0, 1440),
        RuleKey::ScopeExpansion => (20, 2.0, 1440),
        RuleKey::FailureBurst => (25, 5.0, 10),
    }
}

pub fn effective_weight(rule: &ScoringRule) -> u32 {
    if rule.weight > 0 {
        rule.weight as u32
    } else {
        defaults_for(rule.rule_key).0 as u32
    }
}

pub fn effective_threshold(rule: &ScoringRule) -> f64 {
    if rule.threshold > 0.0 {
        rule.threshold
    } else {
        defaults_for(rule.rule_key).1
    }
}

pub fn effective_window_minutes(rule: &ScoringRule) -> i64 {
    if rule.window_minutes > 0 {
        rule.window_minutes as i64
    } else {
        defaults_for(rule.rule_key).2 as i64
    }
}

/// The rule rows installed on first boot.
pub fn default_rules() -> Vec<ScoringRule> {
    let now = Utc::now();

    RuleKey::ORDER
        .iter()
        .map(|&key| {
            let (weight, threshold, window_minutes) = defaults_for(key);
            let (name, description) = match key {
                RuleKey::OffHours => (
                    "Off-hours activity",
                    "Activity outside the actor's typical active hours",
                ),
                RuleKey::NewIp => (
                    "New IP address",
                    "Activity from addresses the actor has not used before",
                ),
                RuleKey::VolumeSpike => (
                    "Volume spike",
                    "Data volume far above the actor's daily baseline",
                ),
                RuleKey::ScopeExpansion => (
                    "Resource scope expansion",
                    "Access to many more distinct resources than usual",
                ),
                RuleKey::FailureBurst => (
                    "Failure burst",
                    "A burst of failed actions in a short window",
                ),
            };

            ScoringRule {
                id: Uuid::new_v4(),
                rule_key: key,
                name: name.to_string(),
                description: Some(description.to_string()),
                enabled: true,
                weight,
                threshold,
                window_minutes,
                config: json!({}),
                created_at: now,
                updated_at: now,
            }
        })
        .collect()
}

/// Evaluate one rule against the events inside its window.
pub(crate) fn evaluate(
    rule: &ScoringRule,
    baseline: &Baseline,
    window_events: &[&Event],
) -> Result<Option<RuleSignal>> {
    match rule.rule_key {
        RuleKey::OffHours => eval_off_hours(rule, baseline, window_events),
        RuleKey::NewIp => eval_new_ip(rule, baseline, window_events),
        RuleKey::VolumeSpike => eval_volume_spike(rule, baseline, window_events),
        RuleKey::ScopeExpansion => eval_scope_expansion(rule, baseline, window_events),
        RuleKey::FailureBurst => eval_failure_burst(rule, baseline, window_events),
    }
}

fn eval_off_hours(
    rule: &ScoringRule,
    baseline: &Baseline,
    window_events: &[&Event],
) -> Result<Option<RuleSignal>> {
    let typical: BTreeSet<i32> = if baseline.typical_active_hours.is_empty() {
        (9..=17).collect()
    } else {
        baseline.typical_active_hours.iter().copied().collect()
    };

    let off_hours: Vec<i32> = window_events
        .iter()
        .map(|e| e.occurred_at.hour() as i32)
        .filter(|hour| !typical.contains(hour))
        .collect();
    let count = off_hours.len();

    if (count as f64) < effective_threshold(rule) {
        return Ok(None);
    }

    let typical_hours: Vec<i32> = typical.into_iter().collect();

    Ok(Some(RuleSignal {
        points: effective_weight(rule),
        reason: format!(
            "{} events outside typical active hours {:?}",
            count, typical_hours
        ),
        current_value: json!(count),
        baseline_value: json!(typical_hours),
    }))
}

fn eval_new_ip(
    rule: &ScoringRule,
    baseline: &Baseline,
    window_events: &[&Event],
) -> Result<Option<RuleSignal>> {
    let known: BTreeSet<&str> = baseline.known_ip_addresses.iter().map(String::as_str).collect();

    let new_ips: BTreeSet<&str> = window_events
        .iter()
        .filter_map(|e| e.ip.as_deref())
        .filter(|ip| !known.contains(ip))
        .collect();

    if (new_ips.len() as f64) < effective_threshold(rule) {
        return Ok(None);
    }

    let new_ips: Vec<&str> = new_ips.into_iter().collect();

    Ok(Some(RuleSignal {
        points: effective_weight(rule),
        reason: format!(
            "{} previously unseen IP address(es): {}",
            new_ips.len(),
            new_ips.join(", ")
        ),
        current_value: json!(new_ips),
        baseline_value: json!(baseline.known_ip_addresses),
    }))
}

fn eval_volume_spike(
    rule: &ScoringRule,
    baseline: &Baseline,
    window_events: &[&Event],
) -> Result<Option<RuleSignal>> {
    let total_bytes: i64 = window_events.iter().filter_map(|e| e.bytes).sum();
    let floor = baseline.avg_bytes_per_day.max(DEFAULT_AVG_BYTES_PER_DAY);
    let multiplier = total_bytes as f64 / floor;

    if multiplier < effective_threshold(rule) {
        return Ok(None);
    }

    Ok(Some(RuleSignal {
        points: effective_weight(rule),
        reason: format!(
            "{} bytes transferred, {:.1}x the daily baseline of {:.0} bytes",
            total_bytes, multiplier, baseline.avg_bytes_per_day
        ),
        current_value: json!(total_bytes),
        baseline_value: json!(baseline.avg_bytes_per_day),
    }))
}

fn eval_scope_expansion(
    rule: &ScoringRule,
    baseline: &Baseline,
    window_events: &[&Event],
) -> Result<Option<RuleSignal>> {
    let distinct: BTreeSet<&str> = window_events
        .iter()
        .filter_map(|e| e.resource_id.as_deref())
        .collect();
    let floor = (baseline.typical_resource_scope as f64).max(SCOPE_DENOMINATOR_FLOOR);
    let multiplier = distinct.len() as f64 / floor;

    if multiplier < effective_threshold(rule) {
        return Ok(None);
    }

    Ok(Some(RuleSignal {
        points: effective_weight(rule),
        reason: format!(
            "{} distinct resources touched, {:.1}x the typical scope of {}",
            distinct.len(),
            multiplier,
            baseline.typical_resource_scope
        ),
        current_value: json!(distinct.len()),
        baseline_value: json!(baseline.typical_resource_scope),
    }))
}

fn eval_failure_burst(
    rule: &ScoringRule,
    baseline: &Baseline,
    window_events: &[&Event],
) -> Result<Option<RuleSignal>> {
    let failures = window_events
        .iter()
        .filter(|e| e.outcome == EventOutcome::Failure)
        .count();

    if (failures as f64) < effective_threshold(rule) {
        return Ok(None);
    }

    Ok(Some(RuleSignal {
        points: effective_weight(rule),
        reason: format!(
            "{} failed actions within {} minutes",
            failures,
            effective_window_minutes(rule)
        ),
        current_value: json!(failures),
        baseline_value: json!(baseline.normal_failure_rate),
    }))
}
