//! Structured audit logging for QoS configuration changes.
//!
//! Every mutating transaction emits an [`AuditRecord`] — a timestamped,
//! JSON-serializable description of what was attempted, against which
//! object, and with what outcome. Records flow through the `log` facade
//! under the `audit` target so deployments can route them separately from
//! operational logging.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Audit event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    /// Resource creation events.
    ResourceCreate,
    /// Resource modification events.
    ResourceModify,
    /// Resource deletion events.
    ResourceDelete,
    /// Rollback of a previously-applied transaction.
    Rollback,
    /// Error and failure events.
    ErrorCondition,
}

impl fmt::Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditCategory::ResourceCreate => write!(f, "RESOURCE_CREATE"),
            AuditCategory::ResourceModify => write!(f, "RESOURCE_MODIFY"),
            AuditCategory::ResourceDelete => write!(f, "RESOURCE_DELETE"),
            AuditCategory::Rollback => write!(f, "ROLLBACK"),
            AuditCategory::ErrorCondition => write!(f, "ERROR_CONDITION"),
        }
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    Success,
    Failure,
}

/// One audit record, built with the builder methods and emitted via
/// [`audit_log!`](crate::audit_log).
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// UTC timestamp of the event.
    pub timestamp: DateTime<Utc>,
    pub category: AuditCategory,
    /// Component that performed the action (e.g. "PolicerOrch").
    pub component: String,
    /// Action performed (e.g. "create").
    pub action: String,
    pub outcome: AuditOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AuditRecord {
    /// Creates a record with outcome `Success`; override with
    /// [`with_outcome`](Self::with_outcome).
    pub fn new(
        category: AuditCategory,
        component: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            category,
            component: component.into(),
            action: action.into(),
            outcome: AuditOutcome::Success,
            object_type: None,
            object_id: None,
            error: None,
            details: None,
        }
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn with_object_id(mut self, object_id: impl ToString) -> Self {
        self.object_id = Some(object_id.to_string());
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.outcome = AuditOutcome::Failure;
        self.error = Some(error.to_string());
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serializes the record as one JSON line.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                r#"{{"category":"{}","component":"{}","serialize_error":"{}"}}"#,
                self.category, self.component, e
            )
        })
    }
}

/// Emits an [`AuditRecord`] through the `log` facade under the `audit`
/// target.
#[macro_export]
macro_rules! audit_log {
    ($record:expr) => {
        log::info!(target: "audit", "{}", $record.to_json())
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_builder() {
        let record = AuditRecord::new(AuditCategory::ResourceCreate, "PolicerOrch", "create")
            .with_object_type("policer")
            .with_object_id(42);

        assert_eq!(record.outcome, AuditOutcome::Success);
        assert_eq!(record.object_id.as_deref(), Some("42"));
    }

    #[test]
    fn test_with_error_flips_outcome() {
        let record = AuditRecord::new(AuditCategory::ResourceDelete, "QueueOrch", "delete")
            .with_error("key not found");
        assert_eq!(record.outcome, AuditOutcome::Failure);
    }

    #[test]
    fn test_json_shape() {
        let record = AuditRecord::new(AuditCategory::Rollback, "SchedGroupOrch", "rollback")
            .with_object_id(7)
            .with_details(serde_json::json!({"children": 3}));
        let json = record.to_json();
        assert!(json.contains("\"ROLLBACK\""));
        assert!(json.contains("\"children\":3"));
        assert!(!json.contains("error"));
    }
}
