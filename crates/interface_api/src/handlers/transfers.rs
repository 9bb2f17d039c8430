//! Transfer handlers

use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::dto::operations::{CreateTransferRequest, TransferResponse};
use crate::extract::ValidatedJson;
use crate::middleware::Caller;
use crate::{error::ApiError, AppState};

/// Executes a transfer into an account
///
/// 201 for a fresh success, 200 when the key replays an earlier success.
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    ValidatedJson(body): ValidatedJson<CreateTransferRequest>,
) -> Result<(StatusCode, Json<TransferResponse>), ApiError> {
    let request = body.into_request(caller)?;
    let receipt = state.engine.transfers.execute_transfer(request).await?;

    let status = if receipt.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(receipt.into())))
}
