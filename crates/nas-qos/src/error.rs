//! QoS error taxonomy.
//!
//! Every failure surfaced by this subsystem is one of the variants below,
//! carrying enough context (object type, key, attribute) for the caller to
//! report it meaningfully. Validation errors are raised before any hardware
//! call; [`QosError::Hardware`] wraps a driver failure after validation
//! passed.

use nas_ndi::{NdiError, NpuId};
use thiserror::Error;

/// Error type for QoS transactions.
#[derive(Debug, Clone, Error)]
pub enum QosError {
    /// A required key attribute is absent from the request. Raised by the
    /// request-decode layer in front of the typed handler APIs, where key
    /// fields can still be missing.
    #[error("{object}: missing key attribute: {what}")]
    MissingKey {
        object: &'static str,
        what: &'static str,
    },

    /// A mandatory create-time attribute is absent.
    #[error("{object}: missing mandatory attribute: {what}")]
    MissingAttribute {
        object: &'static str,
        what: &'static str,
    },

    /// Create request for a key that already exists.
    #[error("{object} {key} already exists")]
    DuplicateKey { object: &'static str, key: String },

    /// Attribute value outside the allowed enumeration or range.
    #[error("{object}: bad value for {attr}: {message}")]
    AttributeValue {
        object: &'static str,
        attr: &'static str,
        message: String,
    },

    /// Cross-attribute or cross-object constraint violated.
    #[error("{object} {key}: {message}")]
    Inconsistent {
        object: &'static str,
        key: String,
        message: String,
    },

    /// Attribute or operation not recognized by this object type.
    #[error("{object}: unsupported: {what}")]
    Unsupported { object: &'static str, what: String },

    /// Id pool or fan-out limit exceeded.
    #[error("{object}: resource exhausted: {what}")]
    ResourceExhausted { object: &'static str, what: String },

    /// The driver call itself failed.
    #[error("{object} {key}: hardware failure on npu {npu}: {source}")]
    Hardware {
        object: &'static str,
        key: String,
        npu: NpuId,
        #[source]
        source: NdiError,
    },

    /// Modify/delete/read referencing a nonexistent key.
    #[error("{object} {key} not found")]
    KeyNotFound { object: &'static str, key: String },
}

impl QosError {
    pub fn missing_key(object: &'static str, what: &'static str) -> Self {
        QosError::MissingKey { object, what }
    }

    pub fn missing_attribute(object: &'static str, what: &'static str) -> Self {
        QosError::MissingAttribute { object, what }
    }

    pub fn duplicate(object: &'static str, key: impl ToString) -> Self {
        QosError::DuplicateKey {
            object,
            key: key.to_string(),
        }
    }

    pub fn attribute_value(
        object: &'static str,
        attr: &'static str,
        message: impl Into<String>,
    ) -> Self {
        QosError::AttributeValue {
            object,
            attr,
            message: message.into(),
        }
    }

    pub fn inconsistent(
        object: &'static str,
        key: impl ToString,
        message: impl Into<String>,
    ) -> Self {
        QosError::Inconsistent {
            object,
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn unsupported(object: &'static str, what: impl Into<String>) -> Self {
        QosError::Unsupported {
            object,
            what: what.into(),
        }
    }

    pub fn exhausted(object: &'static str, what: impl Into<String>) -> Self {
        QosError::ResourceExhausted {
            object,
            what: what.into(),
        }
    }

    pub fn hardware(object: &'static str, key: impl ToString, npu: NpuId, source: NdiError) -> Self {
        QosError::Hardware {
            object,
            key: key.to_string(),
            npu,
            source,
        }
    }

    pub fn not_found(object: &'static str, key: impl ToString) -> Self {
        QosError::KeyNotFound {
            object,
            key: key.to_string(),
        }
    }

    /// Taxonomy kind as a stable string, for audit records.
    pub fn kind(&self) -> &'static str {
        match self {
            QosError::MissingKey { .. } => "MISSING_KEY",
            QosError::MissingAttribute { .. } => "MISSING_ATTRIBUTE",
            QosError::DuplicateKey { .. } => "DUPLICATE_KEY",
            QosError::AttributeValue { .. } => "ATTRIBUTE_VALUE",
            QosError::Inconsistent { .. } => "INCONSISTENT",
            QosError::Unsupported { .. } => "UNSUPPORTED",
            QosError::ResourceExhausted { .. } => "RESOURCE_EXHAUSTED",
            QosError::Hardware { .. } => "HARDWARE",
            QosError::KeyNotFound { .. } => "KEY_NOT_FOUND",
        }
    }

    /// Returns true if no state changed when this error was raised.
    ///
    /// Validation errors are detected before any hardware call, so the
    /// caller needs no rollback for them.
    pub fn is_validation(&self) -> bool {
        !matches!(self, QosError::Hardware { .. })
    }
}

/// Result type for QoS transactions.
pub type QosResult<T> = Result<T, QosError>;

#[cfg(test)]
mod tests {
    use super::*;
    use nas_ndi::NdiStatus;

    #[test]
    fn test_kind_strings() {
        assert_eq!(QosError::duplicate("policer", 5).kind(), "DUPLICATE_KEY");
        assert_eq!(QosError::not_found("queue", "1:2").kind(), "KEY_NOT_FOUND");
    }

    #[test]
    fn test_validation_classification() {
        assert!(QosError::missing_attribute("wred", "threshold").is_validation());
        let hw = QosError::hardware(
            "policer",
            1,
            0,
            NdiError::from_status(NdiStatus::TableFull),
        );
        assert!(!hw.is_validation());
    }

    #[test]
    fn test_display_carries_context() {
        let err = QosError::inconsistent("sched-group", 7, "still attached");
        let s = err.to_string();
        assert!(s.contains("sched-group"));
        assert!(s.contains('7'));
        assert!(s.contains("still attached"));
    }
}
