//! History handlers

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Extension, Json,
};

use domain_ledger::HistoryTypeFilter;

use crate::dto::history::{HistoryQuery, HistoryResponse};
use crate::middleware::Caller;
use crate::{error::ApiError, AppState};

/// One page of an account's payments and transfers, newest first
pub async fn get_history(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let cursor = query.cursor()?;
    let filter = query
        .kind
        .as_deref()
        .map(str::parse::<HistoryTypeFilter>)
        .transpose()?
        .unwrap_or_default();

    let page = state
        .engine
        .history
        .unified_history(query.account_id, &caller, query.size, filter, cursor)
        .await?;

    Ok(Json(page.into()))
}
