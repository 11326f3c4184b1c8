//! Core Error Types
//!
//! Error definitions for punch validation, ledger storage and administration.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Reason a clock-in/out request was rejected by the validator.
///
/// All reasons are recoverable: the client may retry with corrected input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PunchRejection {
    /// Contract missing or not owned by the caller
    Unauthorized,
    /// Contract suspended or outside its validity period
    ContractInactive,
    /// Reported time precedes the last accepted punch
    NonMonotonicTime,
    /// Punch direction does not alternate with the previous punch
    WrongDirection,
    /// Reported location is outside every authorized site
    OutsideGeofence {
        /// Distance to the nearest site center, in meters
        distance_m: f64,
    },
}

impl PunchRejection {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED_CONTRACT",
            Self::ContractInactive => "CONTRACT_INACTIVE",
            Self::NonMonotonicTime => "NON_MONOTONIC_TIME",
            Self::WrongDirection => "WRONG_DIRECTION",
            Self::OutsideGeofence { .. } => "OUTSIDE_GEOFENCE",
        }
    }
}

impl fmt::Display for PunchRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "contract does not belong to the requesting user"),
            Self::ContractInactive => write!(f, "contract is not active at the reported time"),
            Self::NonMonotonicTime => {
                write!(f, "reported time is earlier than the last accepted punch")
            }
            Self::WrongDirection => write!(f, "punch direction does not follow the previous punch"),
            Self::OutsideGeofence { distance_m } => write!(
                f,
                "location is outside the authorized sites (nearest is {:.0} m away)",
                distance_m
            ),
        }
    }
}

/// Core Error
#[derive(Error, Debug)]
pub enum CoreError {
    /// Punch rejected by validation
    #[error("Punch rejected: {0}")]
    Rejected(PunchRejection),

    /// Ledger invariant broken at append time (validator bug)
    #[error("Ledger invariant violated: {0}")]
    InvariantViolation(String),

    /// Caller lacks the capability for this operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Uniqueness conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Address could not be resolved to coordinates
    #[error("Geocoding error: {0}")]
    Geocoding(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization failure
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Core Result type
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Create a forbidden error
    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the client can fix the request and try again
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvariantViolation(_) | Self::Storage(_) | Self::Serialization(_)
        )
    }
}

impl From<PunchRejection> for CoreError {
    fn from(reason: PunchRejection) -> Self {
        Self::Rejected(reason)
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<sled::Error> for CoreError {
    fn from(err: sled::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_codes() {
        assert_eq!(PunchRejection::WrongDirection.code(), "WRONG_DIRECTION");
        assert_eq!(
            PunchRejection::OutsideGeofence { distance_m: 12.0 }.code(),
            "OUTSIDE_GEOFENCE"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(CoreError::Rejected(PunchRejection::ContractInactive).is_recoverable());
        assert!(!CoreError::InvariantViolation("x".into()).is_recoverable());
    }

    #[test]
    fn test_rejection_serialization() {
        let json = serde_json::to_string(&PunchRejection::OutsideGeofence { distance_m: 5.0 }).unwrap();
        assert!(json.contains("outside_geofence"));
        assert!(json.contains("distance_m"));
    }
}
