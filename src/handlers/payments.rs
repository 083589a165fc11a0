use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entities::order::{Model as OrderModel, OrderStatus, PaymentMethod},
    errors::ServiceError,
    gateway::types::VirtualAccountDetails,
    services::verification::PaymentVerificationResult,
    ApiResponse, AppState,
};

/// Payment completion callback. Redirect flows carry the merchant-facing id
/// (`payment_id`) and usually the canonical id (`tx_id`); an error `code`
/// means the gateway aborted before any money moved.
///
/// No identity header is required here: a mobile redirect can land without
/// the original session, and the verification itself trusts only the
/// gateway, never the caller.
#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct PaymentCompleteRequest {
    pub order_id: i64,
    #[serde(default)]
    pub payment_id: Option<String>,
    #[serde(default)]
    pub tx_id: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of applying a verification to an order.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentOutcomeResponse {
    pub order_id: i64,
    pub status: OrderStatus,
    pub payment_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub virtual_account: Option<VirtualAccountDetails>,
    pub message: Option<String>,
}

/// Verification result as reported by the gateway, without touching any
/// order. Used for diagnostics and virtual-account deposit polling.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerificationResponse {
    pub payment_id: String,
    pub status: String,
    pub payment_method: Option<PaymentMethod>,
    pub virtual_account: Option<VirtualAccountDetails>,
}

fn outcome_from_order(order: OrderModel, message: Option<String>) -> PaymentOutcomeResponse {
    let virtual_account = super::orders::merged_virtual_account(&order);

    PaymentOutcomeResponse {
        order_id: order.id,
        status: order.status,
        payment_id: order.payment_id,
        payment_method: order.payment_method,
        virtual_account,
        message,
    }
}

/// Complete a checkout: verify the payment with the gateway and apply the
/// result to the order
#[utoipa::path(
    post,
    path = "/api/v1/payments/complete",
    request_body = PaymentCompleteRequest,
    responses(
        (status = 200, description = "Verification applied", body = ApiResponse<PaymentOutcomeResponse>),
        (status = 400, description = "Missing or invalid identifier", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway lookup or verification failed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn complete_payment(
    State(state): State<AppState>,
    Json(request): Json<PaymentCompleteRequest>,
) -> Result<Json<ApiResponse<PaymentOutcomeResponse>>, ServiceError> {
    // Explicit gateway failure: the buyer cancelled or the gateway rejected
    // the attempt before verification was possible.
    if let Some(code) = &request.code {
        warn!(
            order_id = request.order_id,
            code = %code,
            message = request.message.as_deref().unwrap_or(""),
            "gateway reported payment failure on redirect"
        );
        let order = state.services.order_status.mark_failed(request.order_id).await?;
        return Ok(Json(ApiResponse::success(outcome_from_order(
            order,
            request.message.clone(),
        ))));
    }

    // The canonical id verifies without a search round-trip, so prefer it.
    let id_to_verify = [request.tx_id.as_deref(), request.payment_id.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .ok_or_else(|| {
            ServiceError::InvalidIdentifier("payment identifier is missing".to_string())
        })?;

    // A verification failure leaves the order untouched and retryable; only
    // an explicit gateway error code marks it failed.
    let result = state.services.verifier.verify(id_to_verify).await?;

    let order = state
        .services
        .order_status
        .apply_verification(request.order_id, &result)
        .await?;

    info!(
        order_id = order.id,
        status = order.status.as_str(),
        "payment completion processed"
    );

    Ok(Json(ApiResponse::success(outcome_from_order(order, None))))
}

/// Verify a payment against the gateway without applying it to any order
#[utoipa::path(
    get,
    path = "/api/v1/payments/{id}",
    params(("id" = String, Path, description = "Gateway canonical id or merchant-facing id")),
    responses(
        (status = 200, description = "Verification result", body = ApiResponse<VerificationResponse>),
        (status = 400, description = "Invalid identifier", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway lookup or verification failed", body = crate::errors::ErrorResponse),
    )
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<ApiResponse<VerificationResponse>>, ServiceError> {
    let result: PaymentVerificationResult = state.services.verifier.verify(&raw_id).await?;

    Ok(Json(ApiResponse::success(VerificationResponse {
        payment_id: result.payment_id,
        status: result.status.as_str().to_string(),
        payment_method: result.method,
        virtual_account: result.virtual_account,
    })))
}
