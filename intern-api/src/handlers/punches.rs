//! Clock-in/out and punch reads

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use intern_core::{CallerContext, ContractId, Direction, LocationCheck, Punch, PunchRequest};
use validator::Validate;

use crate::dto::{LocationCheckBody, PunchBody, PunchListResponse, RangeQuery};
use crate::error::ApiResult;
use crate::middleware::Caller;
use crate::state::AppState;

async fn submit(
    state: &AppState,
    ctx: &CallerContext,
    contract_id: ContractId,
    direction: Direction,
    body: PunchBody,
) -> ApiResult<(StatusCode, Json<Punch>)> {
    body.validate()?;
    let request = PunchRequest {
        contract_id,
        direction,
        location: body.location()?,
        reported_at: body.reported_at,
    };
    let punch = state.attendance.punch(ctx, request).await?;
    Ok((StatusCode::CREATED, Json(punch)))
}

pub async fn clock_in(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(contract_id): Path<ContractId>,
    Json(body): Json<PunchBody>,
) -> ApiResult<(StatusCode, Json<Punch>)> {
    submit(&state, &ctx, contract_id, Direction::In, body).await
}

pub async fn clock_out(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(contract_id): Path<ContractId>,
    Json(body): Json<PunchBody>,
) -> ApiResult<(StatusCode, Json<Punch>)> {
    submit(&state, &ctx, contract_id, Direction::Out, body).await
}

/// Geofence dry run; nothing is recorded
pub async fn location_check(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(contract_id): Path<ContractId>,
    Json(body): Json<LocationCheckBody>,
) -> ApiResult<Json<LocationCheck>> {
    body.validate()?;
    let location = intern_core::GeoPoint::new(body.latitude, body.longitude)?;
    let check = state
        .attendance
        .check_location(&ctx, &contract_id, location)
        .await?;
    Ok(Json(check))
}

pub async fn list_punches(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(contract_id): Path<ContractId>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<PunchListResponse>> {
    let punches = state
        .attendance
        .query_range(&ctx, &contract_id, range.from, range.to)
        .await?;
    Ok(Json(PunchListResponse {
        contract_id,
        from: range.from,
        to: range.to,
        punches,
    }))
}
