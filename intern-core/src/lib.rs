//! Internship Time-Clock Core
//!
//! Geofenced clock-in/out for internship contracts.
//!
//! # Components
//!
//! - **Geo**: `GeoPoint`, `Geofence` and haversine distance
//! - **Punch Validator**: accepts or rejects a punch request with a reason
//! - **Attendance Ledger**: append-only punches per (student, contract)
//! - **History Aggregator**: worked sessions and duration over a range
//! - **Administration**: users, sites and contracts
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use intern_core::{AttendanceService, MemoryStore, PolicyConfig, SystemClock};
//!
//! let store = Arc::new(MemoryStore::new());
//! let policy = PolicyConfig::default();
//! let attendance = AttendanceService::new(store.clone(), store, Arc::new(SystemClock), &policy);
//! let punch = attendance.punch(&ctx, request).await?;
//! ```

pub mod admin;
pub mod attendance;
pub mod clock;
pub mod config;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod history;
pub mod storage;
pub mod types;
pub mod validator;

pub use admin::AdminService;
pub use attendance::{can_view_contract, AttendanceService, LocationCheck};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::PolicyConfig;
pub use error::{CoreError, CoreResult, PunchRejection};
pub use geo::{GeoPoint, Geofence};
pub use geocode::{Geocoder, StaticGeocoder};
pub use history::{HistoryAggregator, WorkSession, WorkedHistory};
pub use storage::{
    AttendanceLedger, ContractFilter, ContractRegistry, MemoryStore, SledStore, UserDirectory,
};
pub use types::*;
pub use validator::{GeofenceMatch, PunchValidator};
