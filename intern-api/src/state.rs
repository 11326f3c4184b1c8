//! Application State
//!
//! Shared state for the time-clock API.

use std::sync::Arc;

use intern_core::{
    AdminService, AttendanceLedger, AttendanceService, Clock, ContractFilter, ContractRegistry,
    CoreResult, Geocoder, MemoryStore, PolicyConfig, SledStore, SystemClock, UserDirectory,
};

use crate::middleware::{AuthState, JwtConfig};
use crate::password::DEFAULT_ITERATIONS;
use crate::{ServerConfig, StorageBackend};

/// Application state
#[derive(Clone)]
pub struct AppState {
    /// Punch intake and attendance reads
    pub attendance: Arc<AttendanceService>,
    /// Users, sites and contracts
    pub admin: Arc<AdminService>,
    /// JWT settings shared with the auth middleware
    pub auth: AuthState,
    /// PBKDF2 iterations for new password hashes
    pub password_iterations: u32,
    registry: Arc<dyn ContractRegistry>,
}

impl AppState {
    /// Wire services over the given storage
    #[allow(clippy::too_many_arguments)]
    pub fn with_components(
        users: Arc<dyn UserDirectory>,
        registry: Arc<dyn ContractRegistry>,
        ledger: Arc<dyn AttendanceLedger>,
        geocoder: Arc<dyn Geocoder>,
        clock: Arc<dyn Clock>,
        policy: PolicyConfig,
        jwt: JwtConfig,
        password_iterations: u32,
    ) -> Self {
        let attendance = AttendanceService::new(registry.clone(), ledger, clock.clone(), &policy);
        let admin = AdminService::new(users, registry.clone(), geocoder, clock, policy);
        Self {
            attendance: Arc::new(attendance),
            admin: Arc::new(admin),
            auth: AuthState::new(jwt),
            password_iterations,
            registry,
        }
    }

    /// In-memory state on the system clock
    pub fn in_memory(jwt: JwtConfig, geocoder: Arc<dyn Geocoder>) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::with_components(
            store.clone(),
            store.clone(),
            store,
            geocoder,
            Arc::new(SystemClock),
            PolicyConfig::default(),
            jwt,
            DEFAULT_ITERATIONS,
        )
    }

    /// State for a server configuration
    pub fn from_config(
        config: &ServerConfig,
        jwt: JwtConfig,
        geocoder: Arc<dyn Geocoder>,
    ) -> CoreResult<Self> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let policy = PolicyConfig::from_env();

        let state = match config.storage {
            StorageBackend::Memory => {
                let store = Arc::new(MemoryStore::new());
                Self::with_components(
                    store.clone(),
                    store.clone(),
                    store,
                    geocoder,
                    clock,
                    policy,
                    jwt,
                    config.password_iterations,
                )
            }
            StorageBackend::Sled => {
                let store = Arc::new(SledStore::open(&config.data_dir)?);
                tracing::info!(path = %config.data_dir, "Opened sled store");
                Self::with_components(
                    store.clone(),
                    store.clone(),
                    store,
                    geocoder,
                    clock,
                    policy,
                    jwt,
                    config.password_iterations,
                )
            }
        };
        Ok(state)
    }

    /// Round-trip to storage for readiness probes
    pub async fn check_storage(&self) -> CoreResult<()> {
        self.registry
            .list_contracts(ContractFilter::default(), 0, 1)
            .await
            .map(|_| ())
    }
}
