use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    entities::order::{Model as OrderModel, OrderStatus, PaymentMethod},
    entities::order_item::Model as OrderItemModel,
    errors::ServiceError,
    gateway::types::{self, VirtualAccountDetails},
    handlers::identity::IdentityUser,
    services::orders::CreateOrderRequest,
    ApiResponse, AppState,
};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: i64,
    pub product_id: i64,
    pub quantity: i32,
    pub price: i64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: i64,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub payment_id: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    pub virtual_account: Option<VirtualAccountDetails>,
    pub used_points: i64,
    pub items: Vec<OrderItemResponse>,
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_detail_address: Option<String>,
    pub shipping_zipcode: Option<String>,
    pub shipping_memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Merged virtual-account view: explicit columns take priority, with the raw
/// payment blob as fallback for rows written before the columns existed.
pub(crate) fn merged_virtual_account(order: &OrderModel) -> Option<VirtualAccountDetails> {
    let from_blob = order
        .payment_info
        .as_ref()
        .and_then(types::extract_virtual_account)
        .unwrap_or_default();

    let merged = VirtualAccountDetails {
        account_number: order.vbank_num.clone().or(from_blob.account_number),
        bank: order.vbank_name.clone().or(from_blob.bank),
        holder: order.vbank_holder.clone().or(from_blob.holder),
        expiry: order.vbank_expiry.clone().or(from_blob.expiry),
    };

    (!merged.is_empty()).then_some(merged)
}

pub(crate) fn map_order(order: OrderModel, items: Vec<OrderItemModel>) -> OrderResponse {
    let virtual_account = merged_virtual_account(&order);

    OrderResponse {
        id: order.id,
        status: order.status,
        total_amount: order.total_amount,
        payment_id: order.payment_id,
        payment_method: order.payment_method,
        virtual_account,
        used_points: order.used_points,
        items: items
            .into_iter()
            .map(|item| OrderItemResponse {
                id: item.id,
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            })
            .collect(),
        recipient_name: order.recipient_name,
        recipient_phone: order.recipient_phone,
        shipping_address: order.shipping_address,
        shipping_detail_address: order.shipping_detail_address,
        shipping_zipcode: order.shipping_zipcode,
        shipping_memo: order.shipping_memo,
        created_at: order.created_at,
        updated_at: order.updated_at,
    }
}

/// Create a new order with its items
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 401, description = "Missing identity", body = crate::errors::ErrorResponse),
    )
)]
pub async fn create_order(
    State(state): State<AppState>,
    identity: IdentityUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<OrderResponse>>), ServiceError> {
    let (order, items) = state
        .services
        .orders
        .create_order(&identity.user_id, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(map_order(order, items))),
    ))
}

/// List the caller's orders, newest first
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<Vec<OrderResponse>>),
        (status = 401, description = "Missing identity", body = crate::errors::ErrorResponse),
    )
)]
pub async fn list_orders(
    State(state): State<AppState>,
    identity: IdentityUser,
) -> Result<Json<ApiResponse<Vec<OrderResponse>>>, ServiceError> {
    let orders = state.services.orders.list_orders(&identity.user_id).await?;

    let mapped = orders
        .into_iter()
        .map(|(order, items)| map_order(order, items))
        .collect();

    Ok(Json(ApiResponse::success(mapped)))
}

/// Fetch one of the caller's orders
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn get_order(
    State(state): State<AppState>,
    identity: IdentityUser,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let (order, items) = state
        .services
        .orders
        .get_order(order_id, &identity.user_id)
        .await?;

    Ok(Json(ApiResponse::success(map_order(order, items))))
}

/// Cancel a non-terminal order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/cancel",
    params(("id" = i64, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order is not cancellable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    )
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    identity: IdentityUser,
    Path(order_id): Path<i64>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .order_status
        .cancel(order_id, &identity.user_id)
        .await?;

    let (order, items) = state
        .services
        .orders
        .get_order(order.id, &identity.user_id)
        .await?;

    Ok(Json(ApiResponse::success(map_order(order, items))))
}
