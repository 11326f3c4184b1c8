//! Site registration

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use intern_core::{Site, SiteId};
use validator::Validate;

use crate::dto::CreateSiteRequest;
use crate::error::ApiResult;
use crate::middleware::Caller;
use crate::state::AppState;

pub async fn create_site(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<CreateSiteRequest>,
) -> ApiResult<(StatusCode, Json<Site>)> {
    req.validate()?;
    let site = state.admin.register_site(&ctx, req.into_new_site()?).await?;
    Ok((StatusCode::CREATED, Json(site)))
}

pub async fn get_site(
    State(state): State<AppState>,
    Caller(_ctx): Caller,
    Path(site_id): Path<SiteId>,
) -> ApiResult<Json<Site>> {
    Ok(Json(state.admin.get_site(&site_id).await?))
}
