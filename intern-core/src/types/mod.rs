//! Domain types

pub mod common;
pub mod contract;
pub mod punch;
pub mod site;
pub mod user;

pub use common::{ContractId, LedgerKey, PunchId, SiteId, UserId};
pub use contract::{Contract, NewContract};
pub use punch::{Direction, Punch, PunchOutcome, PunchRequest};
pub use site::{NewSite, PostalAddress, Site, SiteLocation};
pub use user::{CallerContext, Capability, NewUser, Role, User};
