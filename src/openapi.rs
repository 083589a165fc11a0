use utoipa::OpenApi;

use crate::{
    entities::order::{OrderStatus, PaymentMethod},
    errors::ErrorResponse,
    gateway::types::VirtualAccountDetails,
    handlers,
    services::orders::{CreateOrderRequest, OrderItemInput},
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        description = "Order management, payment gateway reconciliation, and loyalty points"
    ),
    paths(
        handlers::orders::create_order,
        handlers::orders::list_orders,
        handlers::orders::get_order,
        handlers::orders::cancel_order,
        handlers::payments::complete_payment,
        handlers::payments::verify_payment,
        handlers::loyalty::get_balance,
    ),
    components(schemas(
        CreateOrderRequest,
        OrderItemInput,
        OrderStatus,
        PaymentMethod,
        VirtualAccountDetails,
        ErrorResponse,
        handlers::orders::OrderResponse,
        handlers::orders::OrderItemResponse,
        handlers::payments::PaymentCompleteRequest,
        handlers::payments::PaymentOutcomeResponse,
        handlers::payments::VerificationResponse,
        handlers::loyalty::BalanceResponse,
    ))
)]
pub struct ApiDoc;
