//! Worked-hours history

use axum::{
    extract::{Path, Query, State},
    Json,
};
use intern_core::{ContractId, WorkedHistory};

use crate::dto::RangeQuery;
use crate::error::ApiResult;
use crate::middleware::Caller;
use crate::state::AppState;

pub async fn worked_history(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(contract_id): Path<ContractId>,
    Query(range): Query<RangeQuery>,
) -> ApiResult<Json<WorkedHistory>> {
    let history = state
        .attendance
        .compute_worked_duration(&ctx, &contract_id, range.from, range.to)
        .await?;
    Ok(Json(history))
}
