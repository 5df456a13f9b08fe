//! # Status
//!
//! Status and condition types shared by CephUser and Bucket.

use serde::{Deserialize, Serialize};

/// Condition type carrying the tri-state readiness of a managed resource
pub const READY_CONDITION: &str = "Ready";

/// Status of a managed resource (CephUser or Bucket)
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagedStatus {
    /// Current phase of reconciliation
    /// Values: Unknown, Absent, Creating, Present, Removing
    #[serde(default)]
    pub phase: Option<String>,
    /// Conditions represent the latest available observations
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Observed generation
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last reconciliation time (RFC3339)
    #[serde(default)]
    pub last_reconcile_time: Option<String>,
    /// Next scheduled reconciliation time (RFC3339)
    /// Used to persist the poll schedule across watch restarts
    #[serde(default)]
    pub next_reconcile_time: Option<String>,
}

impl ManagedStatus {
    /// The `Ready` condition, if one has been recorded
    #[must_use]
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == READY_CONDITION)
    }

    /// Readiness as recorded on the `Ready` condition
    #[must_use]
    pub fn readiness(&self) -> Readiness {
        match self.ready_condition().map(|c| c.status.as_str()) {
            Some("True") => Readiness::Available,
            Some("False") => Readiness::Error,
            _ => Readiness::Unknown,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl Condition {
    /// Build a `Ready` condition for the given readiness
    #[must_use]
    pub fn ready(readiness: Readiness, reason: &str, message: impl Into<String>) -> Self {
        Self {
            r#type: READY_CONDITION.to_string(),
            status: readiness.condition_status().to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
        }
    }

    /// True when both conditions carry the same status, reason and message
    ///
    /// Transition time is ignored so that an unchanged condition does not
    /// produce a status write on every reconcile.
    #[must_use]
    pub fn same_state(&self, other: &Self) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Tri-state readiness of a managed resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Unknown,
    Available,
    Error,
}

impl Readiness {
    #[must_use]
    pub fn condition_status(self) -> &'static str {
        match self {
            Readiness::Unknown => "Unknown",
            Readiness::Available => "True",
            Readiness::Error => "False",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_defaults_to_unknown() {
        let status = ManagedStatus::default();
        assert_eq!(status.readiness(), Readiness::Unknown);
    }

    #[test]
    fn test_readiness_from_condition() {
        let mut status = ManagedStatus::default();
        status
            .conditions
            .push(Condition::ready(Readiness::Available, "Available", "user exists"));
        assert_eq!(status.readiness(), Readiness::Available);

        status.conditions[0] = Condition::ready(Readiness::Error, "Transient", "timeout");
        assert_eq!(status.readiness(), Readiness::Error);
    }

    #[test]
    fn test_same_state_ignores_transition_time() {
        let a = Condition::ready(Readiness::Available, "Available", "ok");
        let mut b = a.clone();
        b.last_transition_time = Some("2020-01-01T00:00:00Z".to_string());
        assert!(a.same_state(&b));

        b.message = Some("different".to_string());
        assert!(!a.same_state(&b));
    }

    #[test]
    fn test_status_serializes_camel_case() {
        let status = ManagedStatus {
            observed_generation: Some(3),
            next_reconcile_time: Some("2026-01-01T00:00:00Z".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(&status).unwrap();
        assert_eq!(value["observedGeneration"], 3);
        assert!(value.get("nextReconcileTime").is_some());
    }
}
