//! NDI error types and status handling.
//!
//! Converts the raw status codes a driver returns into Rust's `Result`
//! type so that failure paths are explicit at every call site.

use std::fmt;
use thiserror::Error;

/// NDI status codes as reported by the driver layer.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NdiStatus {
    Success = 0,
    Failure = -1,
    NotSupported = -2,
    NoMemory = -3,
    InsufficientResources = -4,
    InvalidParameter = -5,
    ItemAlreadyExists = -6,
    ItemNotFound = -7,
    InvalidPortNumber = -8,
    Uninitialized = -9,
    TableFull = -10,
    MandatoryAttributeMissing = -11,
    ObjectInUse = -12,
    InvalidObjectType = -13,
    InvalidObjectId = -14,
    InvalidAttribute = -15,
}

impl NdiStatus {
    /// Creates a status from a raw driver return code.
    pub fn from_raw(status: i32) -> Self {
        match status {
            0 => NdiStatus::Success,
            -2 => NdiStatus::NotSupported,
            -3 => NdiStatus::NoMemory,
            -4 => NdiStatus::InsufficientResources,
            -5 => NdiStatus::InvalidParameter,
            -6 => NdiStatus::ItemAlreadyExists,
            -7 => NdiStatus::ItemNotFound,
            -8 => NdiStatus::InvalidPortNumber,
            -9 => NdiStatus::Uninitialized,
            -10 => NdiStatus::TableFull,
            -11 => NdiStatus::MandatoryAttributeMissing,
            -12 => NdiStatus::ObjectInUse,
            -13 => NdiStatus::InvalidObjectType,
            -14 => NdiStatus::InvalidObjectId,
            -15 => NdiStatus::InvalidAttribute,
            _ => NdiStatus::Failure,
        }
    }

    /// Returns true if the status indicates success.
    pub fn is_success(&self) -> bool {
        *self == NdiStatus::Success
    }

    /// Converts to a Result, returning Ok(()) for success.
    pub fn into_result(self) -> NdiResult<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(NdiError::from_status(self))
        }
    }
}

impl fmt::Display for NdiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NdiStatus::Success => "NDI_STATUS_SUCCESS",
            NdiStatus::Failure => "NDI_STATUS_FAILURE",
            NdiStatus::NotSupported => "NDI_STATUS_NOT_SUPPORTED",
            NdiStatus::NoMemory => "NDI_STATUS_NO_MEMORY",
            NdiStatus::InsufficientResources => "NDI_STATUS_INSUFFICIENT_RESOURCES",
            NdiStatus::InvalidParameter => "NDI_STATUS_INVALID_PARAMETER",
            NdiStatus::ItemAlreadyExists => "NDI_STATUS_ITEM_ALREADY_EXISTS",
            NdiStatus::ItemNotFound => "NDI_STATUS_ITEM_NOT_FOUND",
            NdiStatus::InvalidPortNumber => "NDI_STATUS_INVALID_PORT_NUMBER",
            NdiStatus::Uninitialized => "NDI_STATUS_UNINITIALIZED",
            NdiStatus::TableFull => "NDI_STATUS_TABLE_FULL",
            NdiStatus::MandatoryAttributeMissing => "NDI_STATUS_MANDATORY_ATTRIBUTE_MISSING",
            NdiStatus::ObjectInUse => "NDI_STATUS_OBJECT_IN_USE",
            NdiStatus::InvalidObjectType => "NDI_STATUS_INVALID_OBJECT_TYPE",
            NdiStatus::InvalidObjectId => "NDI_STATUS_INVALID_OBJECT_ID",
            NdiStatus::InvalidAttribute => "NDI_STATUS_INVALID_ATTRIBUTE",
        };
        write!(f, "{}", s)
    }
}

/// Error type for NDI operations.
#[derive(Debug, Clone, Error)]
pub enum NdiError {
    /// The driver returned an error status.
    #[error("NDI operation failed: {status}")]
    Status { status: NdiStatus },

    /// The requested feature is not supported by this driver.
    #[error("Feature not supported: {feature}")]
    NotSupported { feature: String },

    /// Invalid parameter passed to the driver.
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    /// The requested item was not found on the NPU.
    #[error("Item not found: {item}")]
    NotFound { item: String },

    /// Hardware table is full.
    #[error("Table full: {table}")]
    TableFull { table: String },

    /// Object is in use and cannot be removed.
    #[error("Object in use: {object}")]
    ObjectInUse { object: String },

    /// Driver context is not initialized.
    #[error("NDI not initialized")]
    Uninitialized,

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NdiError {
    /// Creates an error from a driver status code.
    pub fn from_status(status: NdiStatus) -> Self {
        match status {
            NdiStatus::Success => NdiError::Internal {
                message: "from_status called with success status".to_string(),
            },
            NdiStatus::NotSupported => NdiError::NotSupported {
                feature: "unknown".to_string(),
            },
            NdiStatus::InvalidParameter
            | NdiStatus::InvalidPortNumber
            | NdiStatus::InvalidObjectType
            | NdiStatus::InvalidObjectId
            | NdiStatus::InvalidAttribute
            | NdiStatus::MandatoryAttributeMissing => NdiError::InvalidParameter {
                message: format!("driver returned {}", status),
            },
            NdiStatus::ItemNotFound => NdiError::NotFound {
                item: "unknown".to_string(),
            },
            NdiStatus::TableFull => NdiError::TableFull {
                table: "unknown".to_string(),
            },
            NdiStatus::ObjectInUse => NdiError::ObjectInUse {
                object: "unknown".to_string(),
            },
            NdiStatus::Uninitialized => NdiError::Uninitialized,
            _ => NdiError::Status { status },
        }
    }

    /// Creates a not supported error with a feature description.
    pub fn not_supported(feature: impl Into<String>) -> Self {
        NdiError::NotSupported {
            feature: feature.into(),
        }
    }

    /// Creates an invalid parameter error with a message.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        NdiError::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates a not found error with an item description.
    pub fn not_found(item: impl Into<String>) -> Self {
        NdiError::NotFound { item: item.into() }
    }

    /// Creates a table full error.
    pub fn table_full(table: impl Into<String>) -> Self {
        NdiError::TableFull {
            table: table.into(),
        }
    }

    /// Returns the underlying status if this is a Status error.
    pub fn status(&self) -> Option<NdiStatus> {
        match self {
            NdiError::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// Returns true if retrying the call later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NdiError::Status {
                status: NdiStatus::InsufficientResources | NdiStatus::NoMemory
            }
        )
    }
}

/// Result type for NDI operations.
pub type NdiResult<T> = Result<T, NdiError>;

/// Extension trait for converting raw driver status codes.
pub trait NdiStatusExt {
    /// Converts a raw status code to a Result.
    fn to_result(self) -> NdiResult<()>;
}

impl NdiStatusExt for i32 {
    fn to_result(self) -> NdiResult<()> {
        NdiStatus::from_raw(self).into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_success() {
        assert!(NdiStatus::Success.is_success());
        assert!(NdiStatus::Success.into_result().is_ok());
    }

    #[test]
    fn test_status_from_raw() {
        assert_eq!(NdiStatus::from_raw(0), NdiStatus::Success);
        assert_eq!(NdiStatus::from_raw(-7), NdiStatus::ItemNotFound);
        assert_eq!(NdiStatus::from_raw(-999), NdiStatus::Failure);
    }

    #[test]
    fn test_error_from_status() {
        let err = NdiError::from_status(NdiStatus::ItemNotFound);
        assert!(matches!(err, NdiError::NotFound { .. }));

        let err = NdiError::from_status(NdiStatus::TableFull);
        assert!(matches!(err, NdiError::TableFull { .. }));
    }

    #[test]
    fn test_raw_status_to_result() {
        assert!(0_i32.to_result().is_ok());
        assert!((-7_i32).to_result().is_err());
    }

    #[test]
    fn test_error_retryable() {
        assert!(NdiError::from_status(NdiStatus::InsufficientResources).is_retryable());
        assert!(!NdiError::from_status(NdiStatus::ItemNotFound).is_retryable());
    }
}
