//! In-memory store
//!
//! Thread-safe implementation behind tokio `RwLock`s, used for tests and
//! development.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{check_append, AttendanceLedger, ContractFilter, ContractRegistry, UserDirectory};
use crate::error::{CoreError, CoreResult};
use crate::types::{Contract, ContractId, LedgerKey, Punch, Role, Site, SiteId, User, UserId};

/// In-memory store implementing every storage trait
#[derive(Debug, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<UserId, User>>>,
    // Indexes
    enrollment_index: Arc<RwLock<HashMap<String, UserId>>>,
    email_index: Arc<RwLock<HashMap<String, UserId>>>,
    sites: Arc<RwLock<HashMap<SiteId, Site>>>,
    contracts: Arc<RwLock<HashMap<ContractId, Contract>>>,
    ledgers: Arc<RwLock<HashMap<LedgerKey, Vec<Punch>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserDirectory for MemoryStore {
    async fn create_user(&self, user: &User) -> CoreResult<()> {
        let mut users = self.users.write().await;
        let mut enrollment_index = self.enrollment_index.write().await;
        let mut email_index = self.email_index.write().await;

        let email = user.email.to_lowercase();
        if enrollment_index.contains_key(&user.enrollment) {
            return Err(CoreError::Conflict(format!(
                "enrollment {} already registered",
                user.enrollment
            )));
        }
        if email_index.contains_key(&email) {
            return Err(CoreError::Conflict(format!(
                "e-mail {} already registered",
                user.email
            )));
        }

        enrollment_index.insert(user.enrollment.clone(), user.id);
        email_index.insert(email, user.id);
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn get_user(&self, user_id: &UserId) -> CoreResult<Option<User>> {
        Ok(self.users.read().await.get(user_id).cloned())
    }

    async fn find_by_enrollment(&self, enrollment: &str) -> CoreResult<Option<User>> {
        let users = self.users.read().await;
        let enrollment_index = self.enrollment_index.read().await;
        Ok(enrollment_index
            .get(enrollment)
            .and_then(|id| users.get(id))
            .cloned())
    }

    async fn list_users(
        &self,
        role: Option<Role>,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<User>> {
        let users = self.users.read().await;
        let mut matching: Vec<User> = users
            .values()
            .filter(|u| role.map_or(true, |r| u.role == r))
            .cloned()
            .collect();
        matching.sort_by_key(|u| (u.created_at, u.id));
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }
}

#[async_trait]
impl ContractRegistry for MemoryStore {
    async fn save_site(&self, site: &Site) -> CoreResult<()> {
        self.sites.write().await.insert(site.id, site.clone());
        Ok(())
    }

    async fn get_site(&self, site_id: &SiteId) -> CoreResult<Option<Site>> {
        Ok(self.sites.read().await.get(site_id).cloned())
    }

    async fn save_contract(&self, contract: &Contract) -> CoreResult<()> {
        self.contracts
            .write()
            .await
            .insert(contract.id, contract.clone());
        Ok(())
    }

    async fn get_contract(&self, contract_id: &ContractId) -> CoreResult<Option<Contract>> {
        Ok(self.contracts.read().await.get(contract_id).cloned())
    }

    async fn list_contracts(
        &self,
        filter: ContractFilter,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<Contract>> {
        let contracts = self.contracts.read().await;
        let mut matching: Vec<Contract> = contracts
            .values()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        matching.sort_by_key(|c| (c.created_at, c.id));
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }
}

#[async_trait]
impl AttendanceLedger for MemoryStore {
    async fn append(&self, punch: &Punch) -> CoreResult<()> {
        let mut ledgers = self.ledgers.write().await;
        let ledger = ledgers.entry(punch.ledger_key()).or_default();

        check_append(ledger.last().map(|p| (p.direction, p.timestamp)), punch)?;

        ledger.push(punch.clone());
        Ok(())
    }

    async fn last_punch(&self, key: &LedgerKey) -> CoreResult<Option<Punch>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(key).and_then(|l| l.last()).cloned())
    }

    async fn query_range(
        &self,
        key: &LedgerKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<Punch>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers
            .get(key)
            .map(|l| {
                l.iter()
                    .filter(|p| p.timestamp >= from && p.timestamp < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn last_before(&self, key: &LedgerKey, at: DateTime<Utc>) -> CoreResult<Option<Punch>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers
            .get(key)
            .and_then(|l| l.iter().rev().find(|p| p.timestamp < at))
            .cloned())
    }

    async fn first_at_or_after(
        &self,
        key: &LedgerKey,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Punch>> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers
            .get(key)
            .and_then(|l| l.iter().find(|p| p.timestamp >= at))
            .cloned())
    }

    async fn punch_count(&self, key: &LedgerKey) -> CoreResult<usize> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(key).map(|l| l.len()).unwrap_or(0))
    }
}
