use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sea_orm::ConnectOptions;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use storefront_api::{
    audit::{AuditExporter, OrderAuditEntry},
    config::{AppConfig, AuditConfig, GatewayConfig},
    db,
    errors::ServiceError,
    events::{self, EventSender},
    gateway::client::PaymentGateway,
    handlers::AppServices,
    services::orders::{CreateOrderRequest, OrderItemInput},
    AppState,
};

/// Programmable in-process stand-in for the payment gateway.
#[derive(Default)]
pub struct FakeGateway {
    /// canonical id -> payment object
    pub payments: Mutex<HashMap<String, Value>>,
    /// merchant-facing id -> canonical id
    pub merchant_index: Mutex<HashMap<String, String>>,
    /// When set, every fetch fails with this (status, detail)
    pub fetch_failure: Mutex<Option<(Option<u16>, String)>>,
    pub fetch_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
}

impl FakeGateway {
    pub fn register_payment(&self, canonical_id: &str, merchant_id: Option<&str>, payment: Value) {
        self.payments
            .lock()
            .unwrap()
            .insert(canonical_id.to_string(), payment);
        if let Some(merchant_id) = merchant_id {
            self.merchant_index
                .lock()
                .unwrap()
                .insert(merchant_id.to_string(), canonical_id.to_string());
        }
    }

    pub fn fail_fetches(&self, status: Option<u16>, detail: &str) {
        *self.fetch_failure.lock().unwrap() = Some((status, detail.to_string()));
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn fetch_payment(&self, payment_id: &str) -> Result<Value, ServiceError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if let Some((status, detail)) = self.fetch_failure.lock().unwrap().clone() {
            return Err(ServiceError::verification_failed(status, detail));
        }

        self.payments
            .lock()
            .unwrap()
            .get(payment_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::verification_failed(Some(404), format!("unknown payment {payment_id}"))
            })
    }

    async fn search_by_merchant_id(&self, merchant_id: &str) -> Result<Vec<Value>, ServiceError> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);

        let canonical = self.merchant_index.lock().unwrap().get(merchant_id).cloned();
        Ok(match canonical {
            Some(id) => vec![json!({"id": id})],
            None => vec![],
        })
    }
}

/// Audit sink that captures entries instead of posting them anywhere.
#[derive(Default)]
pub struct CapturingExporter {
    pub entries: Mutex<Vec<OrderAuditEntry>>,
}

#[async_trait]
impl AuditExporter for CapturingExporter {
    async fn record(&self, entry: OrderAuditEntry) -> Result<(), ServiceError> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

/// Test environment backed by an in-memory SQLite database and a fake
/// gateway.
pub struct TestEnv {
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub audit: Arc<CapturingExporter>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestEnv {
    pub async fn new() -> Self {
        // A single connection keeps every query on the same in-memory
        // database.
        let mut opt = ConnectOptions::new("sqlite::memory:".to_string());
        opt.max_connections(1).min_connections(1);
        let pool = sea_orm::Database::connect(opt)
            .await
            .expect("failed to open in-memory database");
        db::ensure_schema(&pool).await.expect("schema bootstrap");
        let db = Arc::new(pool);

        let gateway = Arc::new(FakeGateway::default());
        let audit = Arc::new(CapturingExporter::default());

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(
            db.clone(),
            gateway.clone(),
            Some(audit.clone()),
            Some(event_sender),
        );

        let config = AppConfig {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 18_080,
            environment: "test".into(),
            log_level: "debug".into(),
            log_json: false,
            gateway: GatewayConfig {
                base_url: "http://gateway.invalid".into(),
                api_secret: "test-secret".into(),
                timeout_secs: 1,
            },
            audit: AuditConfig::default(),
        };

        let state = AppState {
            db,
            config,
            services,
        };

        Self {
            state,
            gateway,
            audit,
            _event_task: event_task,
        }
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }
}

/// A representative checkout request: total 50,000 KRW, one line of two
/// units at 25,000.
pub fn sample_order_request() -> CreateOrderRequest {
    CreateOrderRequest {
        total_amount: 50_000,
        items: vec![OrderItemInput {
            product_id: 1,
            quantity: 2,
            price: 25_000,
        }],
        payment_id: None,
        used_points: 0,
        recipient_name: Some("Hong Gildong".into()),
        recipient_phone: Some("010-1234-5678".into()),
        shipping_address: Some("12 Teheran-ro".into()),
        shipping_detail_address: Some("Apt 301".into()),
        shipping_zipcode: Some("06234".into()),
        shipping_memo: None,
    }
}
