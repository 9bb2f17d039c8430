//! Payment handlers

use axum::{extract::State, http::StatusCode, Extension, Json};

use crate::dto::operations::{CreatePaymentRequest, PaymentResponse};
use crate::extract::ValidatedJson;
use crate::middleware::Caller;
use crate::{error::ApiError, AppState};

/// Pays from one of the caller's accounts
pub async fn create_payment(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    ValidatedJson(body): ValidatedJson<CreatePaymentRequest>,
) -> Result<(StatusCode, Json<PaymentResponse>), ApiError> {
    let request = body.into_request(caller)?;
    let receipt = state.engine.payments.execute_payment(request).await?;

    let status = if receipt.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(receipt.into())))
}
