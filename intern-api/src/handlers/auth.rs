//! Registration and login

use axum::{extract::State, http::StatusCode, Json};
use intern_core::NewUser;
use validator::Validate;

use crate::dto::{LoginRequest, RegisterRequest, TokenResponse, UserResponse};
use crate::error::{ApiError, ApiResult};
use crate::middleware::issue_token;
use crate::password;
use crate::state::AppState;

/// Hash off the async runtime; PBKDF2 is deliberately slow
pub(crate) async fn hash_password(password: String, iterations: u32) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || password::hash_password_with(&password, iterations))
        .await
        .map_err(|e| ApiError::internal(format!("hashing task failed: {}", e)))
}

pub(crate) async fn new_user(req: RegisterRequest, iterations: u32) -> ApiResult<NewUser> {
    req.validate()?;
    let role = req.role()?;
    let password_hash = hash_password(req.password, iterations).await?;
    Ok(NewUser {
        name: req.name,
        enrollment: req.enrollment,
        email: req.email,
        contact: req.contact,
        class_group: req.class_group,
        role,
        password_hash,
    })
}

/// Self-registration (students only)
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let new = new_user(req, state.password_iterations).await?;
    let user = state.admin.register_user(new).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

/// Exchange enrollment and password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    req.validate()?;

    let invalid = || ApiError::unauthorized("invalid enrollment or password");
    let user = state
        .admin
        .find_by_enrollment(&req.enrollment)
        .await?
        .ok_or_else(invalid)?;

    let stored = user.password_hash.clone();
    let password = req.password;
    let valid = tokio::task::spawn_blocking(move || password::verify_password(&password, &stored))
        .await
        .map_err(|e| ApiError::internal(format!("verification task failed: {}", e)))?;
    if !valid {
        tracing::info!(enrollment = %req.enrollment, "Login failed");
        return Err(invalid());
    }

    let config = &state.auth.config;
    let access_token =
        issue_token(&user, config).map_err(|e| ApiError::internal(e.to_string()))?;

    tracing::info!(user_id = %user.id, role = %user.role, "Login succeeded");
    Ok(Json(TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: config.ttl_secs,
    }))
}
