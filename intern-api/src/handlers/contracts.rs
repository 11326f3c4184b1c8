//! Contract administration

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use intern_core::{Contract, ContractId};
use validator::Validate;

use crate::dto::{ContractStatusRequest, CreateContractRequest, Pagination};
use crate::error::ApiResult;
use crate::middleware::Caller;
use crate::state::AppState;

pub async fn create_contract(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Json(req): Json<CreateContractRequest>,
) -> ApiResult<(StatusCode, Json<Contract>)> {
    req.validate()?;
    let contract = state.admin.create_contract(&ctx, req.into()).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

/// Contracts visible to the caller
pub async fn list_contracts(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Contract>>> {
    let contracts = state
        .admin
        .list_contracts(&ctx, page.skip(), page.limit())
        .await?;
    Ok(Json(contracts))
}

pub async fn get_contract(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(contract_id): Path<ContractId>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(state.admin.get_contract(&ctx, &contract_id).await?))
}

/// Activate or suspend
pub async fn set_contract_status(
    State(state): State<AppState>,
    Caller(ctx): Caller,
    Path(contract_id): Path<ContractId>,
    Json(req): Json<ContractStatusRequest>,
) -> ApiResult<Json<Contract>> {
    let contract = state
        .admin
        .set_contract_status(&ctx, &contract_id, req.active)
        .await?;
    Ok(Json(contract))
}
