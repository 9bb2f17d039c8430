//! Account handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use core_kernel::AccountId;

use crate::dto::accounts::*;
use crate::extract::ValidatedJson;
use crate::middleware::Caller;
use crate::{error::ApiError, AppState};

/// Opens an account owned by the caller
pub async fn open_account(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    ValidatedJson(request): ValidatedJson<OpenAccountRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let account = state.engine.accounts.open_account(caller, request.kind).await?;
    Ok((StatusCode::CREATED, Json(AccountResponse::with_balance(account, 0))))
}

/// Lists the caller's active accounts with balances
pub async fn list_accounts(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
) -> Result<Json<Vec<AccountResponse>>, ApiError> {
    let accounts = state.engine.accounts.list_owned(&caller).await?;
    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

/// Gets one of the caller's accounts
pub async fn get_account(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<AccountId>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.engine.accounts.balance(id, &caller).await?;
    Ok(Json(account.into()))
}

/// Current balance of one of the caller's accounts
pub async fn get_balance(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<AccountId>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let account = state.engine.accounts.balance(id, &caller).await?;
    Ok(Json(BalanceResponse {
        account_id: account.account.id,
        balance: account.balance,
    }))
}

/// Recomputes the balance from the journal and compares it with the cached one
pub async fn audit_balance(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<AccountId>,
) -> Result<Json<BalanceAuditResponse>, ApiError> {
    let audit = state.engine.accounts.audit_owned(id, &caller).await?;
    Ok(Json(audit.into()))
}

/// Soft-closes an account; the balance must be zero
pub async fn close_account(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    Path(id): Path<AccountId>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.engine.accounts.close_account(id, &caller).await?;
    Ok(Json(account.into()))
}
