//! # Status Conditions
//!
//! Builds the status written at the end of a reconciliation.

use crate::crd::{Condition, ManagedStatus};
use chrono::Utc;
use std::time::Duration;

/// Status after a successful reconciliation
///
/// The generation the controller acted on becomes `observedGeneration`, and
/// `nextReconcileTime` records when the poll requeue is due.
pub fn succeeded(
    previous: Option<&ManagedStatus>,
    generation: Option<i64>,
    phase: &str,
    condition: Condition,
    poll_interval: Duration,
) -> ManagedStatus {
    let now = Utc::now();
    let next = chrono::Duration::from_std(poll_interval)
        .ok()
        .and_then(|d| now.checked_add_signed(d));
    ManagedStatus {
        phase: Some(phase.to_string()),
        conditions: vec![keep_transition_time(previous, condition)],
        observed_generation: generation,
        last_reconcile_time: Some(now.to_rfc3339()),
        next_reconcile_time: next.map(|t| t.to_rfc3339()),
    }
}

/// Status after a failed reconciliation
///
/// `nextReconcileTime` is set to when the backoff requeue fires, so the
/// status write itself does not trigger an early retry.
pub fn failed(
    previous: Option<&ManagedStatus>,
    generation: Option<i64>,
    phase: &str,
    condition: Condition,
    retry_in: Duration,
) -> ManagedStatus {
    let now = Utc::now();
    let next = chrono::Duration::from_std(retry_in)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(now);
    ManagedStatus {
        phase: Some(phase.to_string()),
        conditions: vec![keep_transition_time(previous, condition)],
        observed_generation: generation,
        last_reconcile_time: Some(now.to_rfc3339()),
        next_reconcile_time: Some(next.to_rfc3339()),
    }
}

/// An unchanged condition keeps the time of its last transition
fn keep_transition_time(previous: Option<&ManagedStatus>, mut condition: Condition) -> Condition {
    if let Some(existing) = previous.and_then(ManagedStatus::ready_condition) {
        if existing.same_state(&condition) {
            condition
                .last_transition_time
                .clone_from(&existing.last_transition_time);
        }
    }
    condition
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Readiness;

    #[test]
    fn test_succeeded_schedules_next_poll() {
        let status = succeeded(
            None,
            Some(3),
            "Present",
            Condition::ready(Readiness::Available, "Available", "user exists"),
            Duration::from_secs(60),
        );
        assert_eq!(status.observed_generation, Some(3));
        assert_eq!(status.readiness(), Readiness::Available);

        let last = chrono::DateTime::parse_from_rfc3339(status.last_reconcile_time.as_deref().unwrap())
            .unwrap();
        let next = chrono::DateTime::parse_from_rfc3339(status.next_reconcile_time.as_deref().unwrap())
            .unwrap();
        assert_eq!((next - last).num_seconds(), 60);
    }

    #[test]
    fn test_failed_schedules_backoff_retry() {
        let status = failed(
            None,
            Some(2),
            "Unknown",
            Condition::ready(Readiness::Error, "Transient", "connection refused"),
            Duration::from_secs(120),
        );
        assert_eq!(status.observed_generation, Some(2));
        assert_eq!(status.readiness(), Readiness::Error);

        let last = chrono::DateTime::parse_from_rfc3339(status.last_reconcile_time.as_deref().unwrap())
            .unwrap();
        let next = chrono::DateTime::parse_from_rfc3339(status.next_reconcile_time.as_deref().unwrap())
            .unwrap();
        assert_eq!((next - last).num_seconds(), 120);
    }

    #[test]
    fn test_unchanged_condition_keeps_transition_time() {
        let mut original = Condition::ready(Readiness::Available, "Available", "user exists");
        original.last_transition_time = Some("2020-01-01T00:00:00+00:00".to_string());
        let previous = ManagedStatus {
            conditions: vec![original],
            ..ManagedStatus::default()
        };

        let same = succeeded(
            Some(&previous),
            Some(1),
            "Present",
            Condition::ready(Readiness::Available, "Available", "user exists"),
            Duration::from_secs(60),
        );
        assert_eq!(
            same.conditions[0].last_transition_time.as_deref(),
            Some("2020-01-01T00:00:00+00:00")
        );

        let changed = failed(
            Some(&previous),
            Some(1),
            "Unknown",
            Condition::ready(Readiness::Error, "Transient", "timeout"),
            Duration::from_secs(60),
        );
        assert_ne!(
            changed.conditions[0].last_transition_time.as_deref(),
            Some("2020-01-01T00:00:00+00:00")
        );
    }
}
