//! Shared identifier types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generate a fresh random id
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Raw bytes, used as storage keys
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

define_id!(
    /// User identifier
    UserId
);
define_id!(
    /// Contract identifier
    ContractId
);
define_id!(
    /// Work-site identifier
    SiteId
);
define_id!(
    /// Punch identifier
    PunchId
);

/// Identifies one attendance ledger: the punches of a user under a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerKey {
    pub user_id: UserId,
    pub contract_id: ContractId,
}

impl LedgerKey {
    pub fn new(user_id: UserId, contract_id: ContractId) -> Self {
        Self {
            user_id,
            contract_id,
        }
    }

    /// 32-byte prefix: user id bytes followed by contract id bytes
    pub fn to_prefix(&self) -> [u8; 32] {
        let mut prefix = [0u8; 32];
        prefix[..16].copy_from_slice(self.user_id.as_bytes());
        prefix[16..].copy_from_slice(self.contract_id.as_bytes());
        prefix
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.contract_id)
    }
}
