//! API Router
//!
//! Route definitions for the time-clock API.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::{handlers, state::AppState, ServerConfig};

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        // Health endpoints
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness))
        .route("/health/ready", get(handlers::readiness))
        // Auth endpoints
        .route("/api/v1/auth/register", post(handlers::register))
        .route("/api/v1/auth/login", post(handlers::login));

    let protected = Router::new()
        // User endpoints
        .route(
            "/api/v1/users",
            post(handlers::create_user).get(handlers::list_users),
        )
        .route("/api/v1/users/me", get(handlers::me))
        // Site endpoints
        .route("/api/v1/sites", post(handlers::create_site))
        .route("/api/v1/sites/:site_id", get(handlers::get_site))
        // Contract endpoints
        .route(
            "/api/v1/contracts",
            post(handlers::create_contract).get(handlers::list_contracts),
        )
        .route("/api/v1/contracts/:contract_id", get(handlers::get_contract))
        .route(
            "/api/v1/contracts/:contract_id/status",
            put(handlers::set_contract_status),
        )
        // Attendance endpoints
        .route(
            "/api/v1/contracts/:contract_id/punches",
            get(handlers::list_punches),
        )
        .route(
            "/api/v1/contracts/:contract_id/punches/in",
            post(handlers::clock_in),
        )
        .route(
            "/api/v1/contracts/:contract_id/punches/out",
            post(handlers::clock_out),
        )
        .route(
            "/api/v1/contracts/:contract_id/location-check",
            post(handlers::location_check),
        )
        .route(
            "/api/v1/contracts/:contract_id/history",
            get(handlers::worked_history),
        )
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_auth,
        ));

    public
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Router with the deployment layers from `config`
pub fn create_app(state: AppState, config: &ServerConfig) -> Router {
    let mut router = create_router(state).layer(TimeoutLayer::new(Duration::from_secs(
        config.request_timeout_secs,
    )));

    if config.enable_cors {
        router = router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    router
}
