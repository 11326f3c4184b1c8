//! Clock punches

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::common::{ContractId, LedgerKey, PunchId, SiteId, UserId};
use crate::error::PunchRejection;
use crate::geo::GeoPoint;

/// Clock-in or clock-out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    pub fn opposite(&self) -> Self {
        match self {
            Direction::In => Direction::Out,
            Direction::Out => Direction::In,
        }
    }

    /// Direction the next punch must have after `last`
    pub fn expected_after(last: Option<&Punch>) -> Self {
        match last {
            None => Direction::In,
            Some(p) => p.direction.opposite(),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::In => write!(f, "IN"),
            Direction::Out => write!(f, "OUT"),
        }
    }
}

/// Accepted punch. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Punch {
    pub id: PunchId,
    pub user_id: UserId,
    pub contract_id: ContractId,
    pub direction: Direction,
    pub timestamp: DateTime<Utc>,
    pub location: GeoPoint,
    /// Site whose geofence matched
    pub site_id: SiteId,
    /// Distance to the matched site's center, in meters
    pub distance_m: f64,
}

impl Punch {
    pub fn ledger_key(&self) -> LedgerKey {
        LedgerKey::new(self.user_id, self.contract_id)
    }
}

/// Clock-in/out request as reported by the client
#[derive(Debug, Clone, Copy)]
pub struct PunchRequest {
    pub contract_id: ContractId,
    pub direction: Direction,
    pub location: GeoPoint,
    /// Defaults to the clock's current time
    pub reported_at: Option<DateTime<Utc>>,
}

/// Result of validating a punch request
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PunchOutcome {
    Accepted { site_id: SiteId, distance_m: f64 },
    Rejected(PunchRejection),
}

impl PunchOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PunchOutcome::Accepted { .. })
    }

    pub fn rejection(&self) -> Option<PunchRejection> {
        match self {
            PunchOutcome::Rejected(reason) => Some(*reason),
            PunchOutcome::Accepted { .. } => None,
        }
    }
}
