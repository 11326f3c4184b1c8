//! Internship Time-Clock REST API
//!
//! HTTP surface over `intern-core`.
//!
//! # Endpoints
//!
//! ## Health
//! - `GET /health` - Health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//!
//! ## Auth
//! - `POST /api/v1/auth/register` - Student self-registration
//! - `POST /api/v1/auth/login` - Exchange enrollment and password for a token
//!
//! ## Users
//! - `POST /api/v1/users` - Create a user of any role (staff)
//! - `GET /api/v1/users?role=&skip=&limit=` - List users (staff)
//! - `GET /api/v1/users/me` - Caller's profile
//!
//! ## Sites
//! - `POST /api/v1/sites` - Register a site by coordinates or address
//! - `GET /api/v1/sites/:site_id` - Get a site
//!
//! ## Contracts
//! - `POST /api/v1/contracts` - Create a contract (staff)
//! - `GET /api/v1/contracts` - Contracts visible to the caller
//! - `GET /api/v1/contracts/:contract_id` - Get a contract
//! - `PUT /api/v1/contracts/:contract_id/status` - Activate or suspend
//!
//! ## Attendance
//! - `POST /api/v1/contracts/:contract_id/punches/in` - Clock in
//! - `POST /api/v1/contracts/:contract_id/punches/out` - Clock out
//! - `POST /api/v1/contracts/:contract_id/location-check` - Geofence dry run
//! - `GET /api/v1/contracts/:contract_id/punches?from=&to=` - Punches in range
//! - `GET /api/v1/contracts/:contract_id/history?from=&to=` - Worked hours
//!
//! Everything under `/api/v1` except `auth` requires `Authorization: Bearer <token>`.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod password;
pub mod router;
pub mod services;
pub mod state;
pub mod telemetry;

use std::sync::Arc;

use intern_core::{Geocoder, NewUser, Role};

pub use error::{ApiError, ApiResult};
pub use middleware::{AuthClaims, JwtConfig};
pub use router::{create_app, create_router};
pub use state::AppState;

/// API version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port
pub const DEFAULT_PORT: u16 = 8080;

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// Process memory; lost on restart
    Memory,
    /// Embedded sled database under `data_dir`
    Sled,
}

impl StorageBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Some(Self::Memory),
            "sled" => Some(Self::Sled),
            _ => None,
        }
    }
}

/// Configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address
    pub bind_addr: String,
    /// Port
    pub port: u16,
    /// Database directory for the sled backend
    pub data_dir: String,
    pub storage: StorageBackend,
    /// Allow any origin
    pub enable_cors: bool,
    /// Request timeout in seconds
    pub request_timeout_secs: u64,
    /// PBKDF2 iterations for new password hashes
    pub password_iterations: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            data_dir: "./data/intern".to_string(),
            storage: StorageBackend::Sled,
            enable_cors: true,
            request_timeout_secs: 30,
            password_iterations: password::DEFAULT_ITERATIONS,
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: std::env::var("INTERN_BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: std::env::var("INTERN_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            data_dir: std::env::var("INTERN_DATA_DIR").unwrap_or(defaults.data_dir),
            storage: std::env::var("INTERN_STORAGE")
                .ok()
                .and_then(|s| StorageBackend::parse(&s))
                .unwrap_or(defaults.storage),
            enable_cors: std::env::var("INTERN_ENABLE_CORS")
                .ok()
                .map(|v| v != "false" && v != "0")
                .unwrap_or(defaults.enable_cors),
            request_timeout_secs: std::env::var("INTERN_REQUEST_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.request_timeout_secs),
            password_iterations: std::env::var("INTERN_PASSWORD_ITERATIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|n: &u32| *n > 0)
                .unwrap_or(defaults.password_iterations),
        }
    }

    /// Get the full bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

/// Create the initial admin from `INTERN_ADMIN_ENROLLMENT`,
/// `INTERN_ADMIN_PASSWORD` and `INTERN_ADMIN_EMAIL` when all are set
pub async fn bootstrap_admin_from_env(state: &AppState) -> ApiResult<()> {
    let (Ok(enrollment), Ok(password), Ok(email)) = (
        std::env::var("INTERN_ADMIN_ENROLLMENT"),
        std::env::var("INTERN_ADMIN_PASSWORD"),
        std::env::var("INTERN_ADMIN_EMAIL"),
    ) else {
        return Ok(());
    };

    let password_hash =
        handlers::auth::hash_password(password, state.password_iterations).await?;
    let admin = state
        .admin
        .bootstrap_admin(NewUser {
            name: "Administrator".to_string(),
            enrollment,
            email,
            contact: None,
            class_group: None,
            role: Role::Admin,
            password_hash,
        })
        .await?;
    tracing::info!(user_id = %admin.id, enrollment = %admin.enrollment, "Admin account ready");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutting down");
}

/// Build state from `config` and serve until Ctrl-C
pub async fn start_server(
    config: ServerConfig,
    jwt: JwtConfig,
    geocoder: Arc<dyn Geocoder>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::from_config(&config, jwt, geocoder)?;
    bootstrap_admin_from_env(&state).await?;
    let app = create_app(state, &config);

    let listener = tokio::net::TcpListener::bind(config.bind_address()).await?;
    tracing::info!(
        addr = %config.bind_address(),
        storage = ?config.storage,
        version = VERSION,
        "Time-clock API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
