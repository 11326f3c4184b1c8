//! Storage layer
//!
//! Persistence interfaces consumed by the attendance core, with an in-memory
//! implementation for tests and development and a sled-backed one for
//! deployments.
//!
//! # Invariants
//!
//! - A ledger only grows; punches are never updated or removed
//! - Within a ledger, directions alternate starting with IN and timestamps
//!   never decrease. `append` re-checks both under its own lock and reports
//!   `CoreError::InvariantViolation` when they do not hold
//! - A punch is either fully visible to readers or not at all

pub mod memory;
pub mod sled;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{CoreError, CoreResult};
use crate::types::{
    Contract, ContractId, Direction, LedgerKey, Punch, Role, Site, SiteId, User, UserId,
};

pub use self::memory::MemoryStore;
pub use self::sled::SledStore;

/// User/profile directory
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Insert a new user; `Conflict` if enrollment or e-mail is taken
    async fn create_user(&self, user: &User) -> CoreResult<()>;

    async fn get_user(&self, user_id: &UserId) -> CoreResult<Option<User>>;

    async fn find_by_enrollment(&self, enrollment: &str) -> CoreResult<Option<User>>;

    /// Users ordered by creation time, optionally filtered by role
    async fn list_users(&self, role: Option<Role>, skip: usize, limit: usize)
        -> CoreResult<Vec<User>>;
}

/// Filter for contract listings
#[derive(Debug, Clone, Copy, Default)]
pub struct ContractFilter {
    pub student_id: Option<UserId>,
    pub teacher_id: Option<UserId>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &Contract) -> bool {
        self.student_id.map_or(true, |s| contract.student_id == s)
            && self.teacher_id.map_or(true, |t| contract.teacher_id == t)
    }
}

/// Contract and site registry
#[async_trait]
pub trait ContractRegistry: Send + Sync {
    async fn save_site(&self, site: &Site) -> CoreResult<()>;

    async fn get_site(&self, site_id: &SiteId) -> CoreResult<Option<Site>>;

    /// Insert or replace a contract
    async fn save_contract(&self, contract: &Contract) -> CoreResult<()>;

    async fn get_contract(&self, contract_id: &ContractId) -> CoreResult<Option<Contract>>;

    /// Contracts ordered by creation time
    async fn list_contracts(
        &self,
        filter: ContractFilter,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<Contract>>;

    /// The student's contract that is active at `at`, if any
    async fn get_active_contract(
        &self,
        student_id: &UserId,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Contract>> {
        let filter = ContractFilter {
            student_id: Some(*student_id),
            teacher_id: None,
        };
        let contracts = self.list_contracts(filter, 0, usize::MAX).await?;
        Ok(contracts.into_iter().find(|c| c.is_active_at(at)))
    }

    /// Sites referenced by the contract; dangling references are skipped
    async fn get_sites(&self, contract: &Contract) -> CoreResult<Vec<Site>> {
        let mut sites = Vec::with_capacity(contract.site_ids.len());
        for site_id in &contract.site_ids {
            match self.get_site(site_id).await? {
                Some(site) => sites.push(site),
                None => tracing::warn!(
                    contract_id = %contract.id,
                    site_id = %site_id,
                    "Contract references a missing site"
                ),
            }
        }
        Ok(sites)
    }
}

/// Append-only attendance ledger
#[async_trait]
pub trait AttendanceLedger: Send + Sync {
    /// Append an already validated punch
    async fn append(&self, punch: &Punch) -> CoreResult<()>;

    /// Most recent punch of the ledger
    async fn last_punch(&self, key: &LedgerKey) -> CoreResult<Option<Punch>>;

    /// Punches with `from <= timestamp < to`, ascending
    async fn query_range(
        &self,
        key: &LedgerKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<Punch>>;

    /// Latest punch strictly before `at`
    async fn last_before(&self, key: &LedgerKey, at: DateTime<Utc>) -> CoreResult<Option<Punch>>;

    /// Earliest punch at or after `at`
    async fn first_at_or_after(
        &self,
        key: &LedgerKey,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Punch>>;

    /// Number of punches in the ledger
    async fn punch_count(&self, key: &LedgerKey) -> CoreResult<usize>;
}

/// Storage-side check of the ledger invariants for appending `punch` after `last`
pub(crate) fn check_append(last: Option<(Direction, DateTime<Utc>)>, punch: &Punch) -> CoreResult<()> {
    let expected = match last {
        None => Direction::In,
        Some((direction, _)) => direction.opposite(),
    };
    if punch.direction != expected {
        return Err(CoreError::InvariantViolation(format!(
            "ledger {} expected {} but got {}",
            punch.ledger_key(),
            expected,
            punch.direction
        )));
    }
    if let Some((_, last_at)) = last {
        if punch.timestamp < last_at {
            return Err(CoreError::InvariantViolation(format!(
                "ledger {} punch at {} precedes last punch at {}",
                punch.ledger_key(),
                punch.timestamp,
                last_at
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, TimeZone, Utc};

    use crate::geo::GeoPoint;
    use crate::types::{ContractId, Direction, Punch, PunchId, SiteId, UserId};

    pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, hour, minute, 0).unwrap()
    }

    pub fn punch(
        user_id: UserId,
        contract_id: ContractId,
        direction: Direction,
        timestamp: DateTime<Utc>,
    ) -> Punch {
        Punch {
            id: PunchId::new(),
            user_id,
            contract_id,
            direction,
            timestamp,
            location: GeoPoint::new(38.7223, -9.1393).unwrap(),
            site_id: SiteId::new(),
            distance_m: 0.0,
        }
    }
}
