//! Sled persistent store
//!
//! Embedded persistent implementation. Punches live in a single tree keyed by
//! `user id (16) ++ contract id (16) ++ timestamp (8) ++ sequence (8)`, all
//! big endian, so a ledger is one contiguous key range ordered by time and
//! time-bounded reads are `range` scans. A per-ledger head record carries the
//! sequence and last direction/timestamp; appends update both in one
//! transaction. Timestamps never decrease within a ledger, so key order is
//! also append order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use std::path::Path;
use uuid::Uuid;

use super::{check_append, AttendanceLedger, ContractFilter, ContractRegistry, UserDirectory};
use crate::error::{CoreError, CoreResult};
use crate::types::{
    Contract, ContractId, Direction, LedgerKey, Punch, Role, Site, SiteId, User, UserId,
};

const USERS_TREE: &str = "users";
const ENROLLMENT_INDEX_TREE: &str = "users_by_enrollment";
const EMAIL_INDEX_TREE: &str = "users_by_email";
const SITES_TREE: &str = "sites";
const CONTRACTS_TREE: &str = "contracts";
const PUNCHES_TREE: &str = "punches";
const LEDGER_HEADS_TREE: &str = "ledger_heads";

/// Tail of a ledger, used to check appends inside a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerHead {
    seq: u64,
    direction: Direction,
    timestamp: DateTime<Utc>,
}

/// Sled-backed store implementing every storage trait
#[derive(Debug, Clone)]
pub struct SledStore {
    db: sled::Db,
    users: sled::Tree,
    enrollment_index: sled::Tree,
    email_index: sled::Tree,
    sites: sled::Tree,
    contracts: sled::Tree,
    punches: sled::Tree,
    ledger_heads: sled::Tree,
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let db = sled::open(path)
            .map_err(|e| CoreError::Storage(format!("Failed to open sled db: {}", e)))?;

        let open_tree = |name: &str| {
            db.open_tree(name)
                .map_err(|e| CoreError::Storage(format!("Failed to open {} tree: {}", name, e)))
        };

        Ok(Self {
            users: open_tree(USERS_TREE)?,
            enrollment_index: open_tree(ENROLLMENT_INDEX_TREE)?,
            email_index: open_tree(EMAIL_INDEX_TREE)?,
            sites: open_tree(SITES_TREE)?,
            contracts: open_tree(CONTRACTS_TREE)?,
            punches: open_tree(PUNCHES_TREE)?,
            ledger_heads: open_tree(LEDGER_HEADS_TREE)?,
            db,
        })
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> CoreResult<()> {
        self.db
            .flush_async()
            .await
            .map_err(|e| CoreError::Storage(format!("Failed to flush db: {}", e)))?;
        Ok(())
    }

    fn serialize<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn get_json<T: DeserializeOwned>(tree: &sled::Tree, key: &[u8]) -> CoreResult<Option<T>> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn punch_key(key: &LedgerKey, timestamp: DateTime<Utc>, seq: u64) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(48);
        bytes.extend_from_slice(&key.to_prefix());
        bytes.extend_from_slice(&encode_micros(timestamp));
        bytes.extend_from_slice(&seq.to_be_bytes());
        bytes
    }

    /// Smallest key of any punch in the same microsecond as `at`
    fn lower_bound(key: &LedgerKey, at: DateTime<Utc>) -> Vec<u8> {
        Self::punch_key(key, at, 0)
    }

    /// Largest key of any punch in the same microsecond as `at`
    fn upper_bound(key: &LedgerKey, at: DateTime<Utc>) -> Vec<u8> {
        Self::punch_key(key, at, u64::MAX)
    }

    fn ledger_start(key: &LedgerKey) -> Vec<u8> {
        key.to_prefix().to_vec()
    }

    fn ledger_end(key: &LedgerKey) -> Vec<u8> {
        let mut bytes = key.to_prefix().to_vec();
        bytes.extend_from_slice(&[0xFF; 16]);
        bytes
    }

    /// Punches whose keys fall in `range`, ascending
    fn scan_range<R>(&self, range: R) -> impl DoubleEndedIterator<Item = CoreResult<Punch>>
    where
        R: std::ops::RangeBounds<Vec<u8>>,
    {
        self.punches.range(range).map(|item| {
            let (_, value) = item?;
            Self::deserialize::<Punch>(&value)
        })
    }
}

/// Microseconds since the epoch with the sign bit flipped, so byte order
/// matches time order
fn encode_micros(at: DateTime<Utc>) -> [u8; 8] {
    ((at.timestamp_micros() as u64) ^ (1 << 63)).to_be_bytes()
}

fn map_tx_error(err: TransactionError<CoreError>) -> CoreError {
    match err {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => CoreError::Storage(e.to_string()),
    }
}

#[async_trait]
impl UserDirectory for SledStore {
    async fn create_user(&self, user: &User) -> CoreResult<()> {
        let user_bytes = Self::serialize(user)?;
        let id_bytes = user.id.as_bytes().to_vec();
        let enrollment = user.enrollment.as_bytes().to_vec();
        let email = user.email.to_lowercase().into_bytes();

        (&self.users, &self.enrollment_index, &self.email_index)
            .transaction(|(users, enrollments, emails)| {
                if enrollments.get(&enrollment)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(CoreError::Conflict(
                        format!("enrollment {} already registered", user.enrollment),
                    )));
                }
                if emails.get(&email)?.is_some() {
                    return Err(ConflictableTransactionError::Abort(CoreError::Conflict(
                        format!("e-mail {} already registered", user.email),
                    )));
                }
                enrollments.insert(enrollment.clone(), id_bytes.clone())?;
                emails.insert(email.clone(), id_bytes.clone())?;
                users.insert(id_bytes.clone(), user_bytes.clone())?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    async fn get_user(&self, user_id: &UserId) -> CoreResult<Option<User>> {
        Self::get_json(&self.users, user_id.as_bytes())
    }

    async fn find_by_enrollment(&self, enrollment: &str) -> CoreResult<Option<User>> {
        let Some(id_bytes) = self.enrollment_index.get(enrollment.as_bytes())? else {
            return Ok(None);
        };
        let id = Uuid::from_slice(&id_bytes)
            .map_err(|e| CoreError::Serialization(format!("corrupt user index: {}", e)))?;
        self.get_user(&UserId(id)).await
    }

    async fn list_users(
        &self,
        role: Option<Role>,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<User>> {
        let mut matching = Vec::new();
        for item in self.users.iter() {
            let (_, value) = item?;
            let user: User = Self::deserialize(&value)?;
            if role.map_or(true, |r| user.role == r) {
                matching.push(user);
            }
        }
        matching.sort_by_key(|u| (u.created_at, u.id));
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }
}

#[async_trait]
impl ContractRegistry for SledStore {
    async fn save_site(&self, site: &Site) -> CoreResult<()> {
        self.sites
            .insert(site.id.as_bytes(), Self::serialize(site)?)?;
        Ok(())
    }

    async fn get_site(&self, site_id: &SiteId) -> CoreResult<Option<Site>> {
        Self::get_json(&self.sites, site_id.as_bytes())
    }

    async fn save_contract(&self, contract: &Contract) -> CoreResult<()> {
        self.contracts
            .insert(contract.id.as_bytes(), Self::serialize(contract)?)?;
        Ok(())
    }

    async fn get_contract(&self, contract_id: &ContractId) -> CoreResult<Option<Contract>> {
        Self::get_json(&self.contracts, contract_id.as_bytes())
    }

    async fn list_contracts(
        &self,
        filter: ContractFilter,
        skip: usize,
        limit: usize,
    ) -> CoreResult<Vec<Contract>> {
        let mut matching = Vec::new();
        for item in self.contracts.iter() {
            let (_, value) = item?;
            let contract: Contract = Self::deserialize(&value)?;
            if filter.matches(&contract) {
                matching.push(contract);
            }
        }
        matching.sort_by_key(|c| (c.created_at, c.id));
        Ok(matching.into_iter().skip(skip).take(limit).collect())
    }
}

#[async_trait]
impl AttendanceLedger for SledStore {
    async fn append(&self, punch: &Punch) -> CoreResult<()> {
        let key = punch.ledger_key();
        let head_key = key.to_prefix().to_vec();
        let punch_bytes = Self::serialize(punch)?;

        (&self.punches, &self.ledger_heads)
            .transaction(|(punches, heads)| {
                let head: Option<LedgerHead> = match heads.get(&head_key)? {
                    Some(bytes) => Some(
                        serde_json::from_slice(&bytes)
                            .map_err(|e| ConflictableTransactionError::Abort(CoreError::from(e)))?,
                    ),
                    None => None,
                };

                check_append(head.as_ref().map(|h| (h.direction, h.timestamp)), punch)
                    .map_err(ConflictableTransactionError::Abort)?;

                let seq = head.map(|h| h.seq + 1).unwrap_or(0);
                let new_head = LedgerHead {
                    seq,
                    direction: punch.direction,
                    timestamp: punch.timestamp,
                };
                let head_bytes = serde_json::to_vec(&new_head)
                    .map_err(|e| ConflictableTransactionError::Abort(CoreError::from(e)))?;

                punches.insert(Self::punch_key(&key, punch.timestamp, seq), punch_bytes.clone())?;
                heads.insert(head_key.clone(), head_bytes)?;
                Ok(())
            })
            .map_err(map_tx_error)
    }

    async fn last_punch(&self, key: &LedgerKey) -> CoreResult<Option<Punch>> {
        self.scan_range(Self::ledger_start(key)..=Self::ledger_end(key))
            .next_back()
            .transpose()
    }

    async fn query_range(
        &self,
        key: &LedgerKey,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CoreResult<Vec<Punch>> {
        let mut punches = Vec::new();
        if from >= to {
            return Ok(punches);
        }
        // Bounds are microsecond-granular; exact comparison happens here
        let range = Self::lower_bound(key, from)..=Self::upper_bound(key, to);
        for punch in self.scan_range(range) {
            let punch = punch?;
            if punch.timestamp >= to {
                break;
            }
            if punch.timestamp >= from {
                punches.push(punch);
            }
        }
        Ok(punches)
    }

    async fn last_before(&self, key: &LedgerKey, at: DateTime<Utc>) -> CoreResult<Option<Punch>> {
        let range = Self::ledger_start(key)..=Self::upper_bound(key, at);
        for punch in self.scan_range(range).rev() {
            let punch = punch?;
            if punch.timestamp < at {
                return Ok(Some(punch));
            }
        }
        Ok(None)
    }

    async fn first_at_or_after(
        &self,
        key: &LedgerKey,
        at: DateTime<Utc>,
    ) -> CoreResult<Option<Punch>> {
        let range = Self::lower_bound(key, at)..=Self::ledger_end(key);
        for punch in self.scan_range(range) {
            let punch = punch?;
            if punch.timestamp >= at {
                return Ok(Some(punch));
            }
        }
        Ok(None)
    }

    async fn punch_count(&self, key: &LedgerKey) -> CoreResult<usize> {
        Ok(self.punches.scan_prefix(key.to_prefix()).count())
    }
}
