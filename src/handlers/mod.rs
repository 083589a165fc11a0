pub mod identity;
pub mod loyalty;
pub mod orders;
pub mod payments;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    audit::AuditExporter,
    db::DbPool,
    events::EventSender,
    gateway::client::PaymentGateway,
    services::{
        loyalty::LoyaltyService, order_status::OrderStatusService, orders::OrderService,
        verification::PaymentVerifier,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub loyalty: Arc<LoyaltyService>,
    pub verifier: Arc<PaymentVerifier>,
    pub order_status: Arc<OrderStatusService>,
}

impl AppServices {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        audit: Option<Arc<dyn AuditExporter>>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        let orders = Arc::new(OrderService::new(db.clone(), event_sender.clone()));
        let loyalty = Arc::new(LoyaltyService::new(db.clone()));
        let verifier = Arc::new(PaymentVerifier::new(gateway));
        let order_status = Arc::new(OrderStatusService::new(
            db,
            loyalty.clone(),
            audit,
            event_sender,
        ));

        Self {
            orders,
            loyalty,
            verifier,
            order_status,
        }
    }
}

/// Liveness check including a database ping.
async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({"status": "ok"}))),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "degraded", "database": e.to_string()})),
        ),
    }
}

/// Builds the application router with all routes and API documentation.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/orders",
            post(orders::create_order).get(orders::list_orders),
        )
        .route("/api/v1/orders/:id", get(orders::get_order))
        .route("/api/v1/orders/:id/cancel", post(orders::cancel_order))
        .route("/api/v1/payments/complete", post(payments::complete_payment))
        .route("/api/v1/payments/:id", get(payments::verify_payment))
        .route("/api/v1/loyalty/balance", get(loyalty::get_balance))
        .route("/health", get(health))
        .merge(SwaggerUi::new("/docs").url(
            "/api-docs/openapi.json",
            crate::openapi::ApiDoc::openapi(),
        ))
        .with_state(state)
}
