//! User administration

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};

use super::auth::new_user;
use crate::dto::{RegisterRequest, UserListQuery, UserResponse};
use crate::error::ApiResult;
use crate::middleware::Caller;
use crate::state::AppState;

/// Staff-only user creation, any role
pub async fn create_user(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    // Capability is checked before paying for the hash
    ctx.require(intern_core::Capability::ManageUsers)?;
    let new = new_user(req, state.password_iterations).await?;
    let user = state.admin.create_user(&ctx, new).await?;
    Ok((StatusCode::CREATED, Json(user.into())))
}

pub async fn list_users(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let role = query.role()?;
    let page = query.page();
    let users = state
        .admin
        .list_users(&ctx, role, page.skip(), page.limit())
        .await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// Caller's own profile
pub async fn me(State(state): State<AppState>, Caller(ctx): Caller) -> ApiResult<Json<UserResponse>> {
    let user = state.admin.get_user(&ctx, &ctx.user_id).await?;
    Ok(Json(user.into()))
}
