use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

use crate::errors::ServiceError;

/// One row of the external order audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub payment_id: String,
    pub total: i64,
    pub item_summary: String,
    pub customer_contact: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub shipping_summary: String,
}

/// Best-effort sink for completed-order records. Failures are logged and
/// never propagated into the checkout response.
#[async_trait]
pub trait AuditExporter: Send + Sync {
    async fn record(&self, entry: OrderAuditEntry) -> Result<(), ServiceError>;
}

/// Fire-and-forget delivery; the caller does not wait for the sink.
pub fn record_async(exporter: Arc<dyn AuditExporter>, entry: OrderAuditEntry) {
    tokio::spawn(async move {
        if let Err(e) = exporter.record(entry).await {
            error!(error = %e, "Async audit export failed");
        }
    });
}

/// HMAC signature generator for audit webhook authentication
pub struct SignatureGenerator {
    secret: String,
}

impl SignatureGenerator {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    /// Generate HMAC signature for a webhook payload
    pub fn sign_payload(&self, timestamp: &str, body: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        type HmacSha256 = Hmac<Sha256>;

        let signed_payload = format!("{}.{}", timestamp, body);
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signed_payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Posts audit entries to a configured webhook with retry and optional
/// HMAC signing.
pub struct WebhookAuditExporter {
    client: reqwest::Client,
    webhook_url: String,
    signature_generator: Option<SignatureGenerator>,
    max_retries: u32,
}

impl WebhookAuditExporter {
    pub fn new(webhook_url: String, secret: Option<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            webhook_url,
            signature_generator: secret.map(SignatureGenerator::new),
            max_retries: 3,
        })
    }
}

#[async_trait]
impl AuditExporter for WebhookAuditExporter {
    #[instrument(skip(self, entry), fields(payment_id = %entry.payment_id))]
    async fn record(&self, entry: OrderAuditEntry) -> Result<(), ServiceError> {
        let body = serde_json::to_string(&entry)
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        let timestamp = Utc::now().to_rfc3339();

        let signature = self
            .signature_generator
            .as_ref()
            .map(|generator| generator.sign_payload(&timestamp, &body));

        for attempt in 1..=self.max_retries {
            let mut request = self
                .client
                .post(&self.webhook_url)
                .header("Content-Type", "application/json")
                .header("Timestamp", &timestamp)
                .body(body.clone());

            if let Some(ref sig) = signature {
                request = request.header("Audit-Signature", sig);
            }

            match request.send().await {
                Ok(response) => {
                    if response.status().is_success() {
                        info!("Audit record delivered");
                        return Ok(());
                    }
                    warn!(
                        "Audit delivery failed with status: {} (attempt {}/{})",
                        response.status(),
                        attempt,
                        self.max_retries
                    );
                }
                Err(e) => {
                    warn!(
                        "Audit delivery error: {} (attempt {}/{})",
                        e, attempt, self.max_retries
                    );
                }
            }

            // Exponential backoff: 1s, 2s, 4s
            if attempt < self.max_retries {
                let backoff = Duration::from_secs(2_u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
        }

        Err(ServiceError::ExternalServiceError(format!(
            "Failed to deliver audit record after {} retries",
            self.max_retries
        )))
    }
}
