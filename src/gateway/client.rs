use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::config::GatewayConfig;
use crate::errors::ServiceError;

/// Outbound interface to the payment gateway. Injected into the resolver and
/// verifier so tests can swap in a fake without a network.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetches the full payment object by the gateway's canonical id.
    /// Failures (transport, timeout, non-2xx) surface as `VerificationFailed`
    /// carrying the upstream status and body.
    async fn fetch_payment(&self, payment_id: &str) -> Result<Value, ServiceError>;

    /// Searches payments registered under a merchant-facing order id.
    /// Returns the raw result list; an empty list is not an error here.
    async fn search_by_merchant_id(&self, merchant_id: &str) -> Result<Vec<Value>, ServiceError>;
}

/// HTTP client for the PortOne payment API.
pub struct PortOneClient {
    client: reqwest::Client,
    base_url: String,
    api_secret: String,
}

impl PortOneClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn auth_header(&self) -> String {
        format!("PortOne {}", self.api_secret)
    }
}

#[async_trait]
impl PaymentGateway for PortOneClient {
    #[instrument(skip(self))]
    async fn fetch_payment(&self, payment_id: &str) -> Result<Value, ServiceError> {
        let url = format!("{}/payments/{}", self.base_url, payment_id);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::verification_failed(None, "gateway request timed out")
                } else {
                    ServiceError::verification_failed(None, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, payment_id, "gateway payment fetch failed");
            return Err(ServiceError::verification_failed(Some(status.as_u16()), body));
        }

        response.json::<Value>().await.map_err(|e| {
            ServiceError::verification_failed(
                Some(status.as_u16()),
                format!("invalid JSON in gateway response: {}", e),
            )
        })
    }

    #[instrument(skip(self))]
    async fn search_by_merchant_id(&self, merchant_id: &str) -> Result<Vec<Value>, ServiceError> {
        let url = format!("{}/payments", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("merchant_uid[]", merchant_id)])
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| ServiceError::GatewayLookupFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, body = %body, merchant_id, "gateway merchant-id search failed");
            return Err(ServiceError::GatewayLookupFailed(format!(
                "upstream status {}: {}",
                status, body
            )));
        }

        let payload: Value = response.json().await.map_err(|e| {
            ServiceError::GatewayLookupFailed(format!("invalid JSON in search response: {}", e))
        })?;

        // The search endpoint has returned both a bare array and {data: [...]}
        // depending on API version.
        let items = match payload {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("data") {
                Some(Value::Array(items)) => items,
                _ => {
                    return Err(ServiceError::GatewayLookupFailed(
                        "unrecognized search response shape".to_string(),
                    ))
                }
            },
            _ => {
                return Err(ServiceError::GatewayLookupFailed(
                    "unrecognized search response shape".to_string(),
                ))
            }
        };

        debug!(merchant_id, count = items.len(), "gateway search completed");
        Ok(items)
    }
}
