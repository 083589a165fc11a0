use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{errors::ServiceError, handlers::identity::IdentityUser, ApiResponse, AppState};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BalanceResponse {
    pub balance: i64,
}

/// Current loyalty point balance for the caller
#[utoipa::path(
    get,
    path = "/api/v1/loyalty/balance",
    responses(
        (status = 200, description = "Balance retrieved", body = ApiResponse<BalanceResponse>),
        (status = 401, description = "Missing identity", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_balance(
    State(state): State<AppState>,
    identity: IdentityUser,
) -> Result<Json<ApiResponse<BalanceResponse>>, ServiceError> {
    let balance = state.services.loyalty.balance(&identity.user_id).await?;
    Ok(Json(ApiResponse::success(BalanceResponse { balance })))
}
