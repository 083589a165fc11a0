use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tokio::{signal, sync::mpsc};
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use storefront_api as api;

use api::audit::{AuditExporter, WebhookAuditExporter};
use api::gateway::{PaymentGateway, PortOneClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Init DB
    let db_pool = api::db::establish_connection(&cfg.database_url)
        .await
        .context("failed to connect to database")?;
    api::db::ensure_schema(&db_pool)
        .await
        .context("failed ensuring database schema")?;
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = Arc::new(api::events::EventSender::new(event_tx));
    tokio::spawn(api::events::process_events(event_rx));

    // Outbound gateway client
    let gateway: Arc<dyn PaymentGateway> = Arc::new(PortOneClient::new(&cfg.gateway)?);

    // Audit exporter is optional; checkout never depends on it
    let audit: Option<Arc<dyn AuditExporter>> = match &cfg.audit.webhook_url {
        Some(url) => {
            info!("Audit export enabled: {}", url);
            Some(Arc::new(WebhookAuditExporter::new(
                url.clone(),
                cfg.audit.webhook_secret.clone(),
            )?))
        }
        None => {
            info!("Audit webhook URL not configured; order audit export disabled");
            None
        }
    };

    let services =
        api::handlers::AppServices::new(db_arc.clone(), gateway, audit, Some(event_sender));

    let state = api::AppState {
        db: db_arc,
        config: cfg.clone(),
        services,
    };

    let app = api::handlers::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = cfg.socket_addr()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to install shutdown signal handler: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
