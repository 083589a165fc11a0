use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::errors::ServiceError;
use crate::gateway::client::PaymentGateway;

/// The gateway's canonical transaction ids are hyphenated UUIDs; anything
/// else is a merchant-facing id the storefront minted at checkout.
static CANONICAL_ID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
        .expect("canonical id pattern is valid")
});

/// Decides whether a caller-supplied identifier is already the gateway's
/// canonical transaction id, and resolves merchant-facing ids to canonical
/// ones via the gateway's search endpoint.
///
/// Lookup failures are NOT retried here: a retry costs an external API call
/// and the order may legitimately not be registered with the gateway yet, so
/// the retry policy belongs to the caller.
pub struct IdentifierResolver {
    gateway: Arc<dyn PaymentGateway>,
}

impl IdentifierResolver {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { gateway }
    }

    pub fn is_canonical_id(raw: &str) -> bool {
        CANONICAL_ID_RE.is_match(raw)
    }

    #[instrument(skip(self))]
    pub async fn resolve(&self, raw_id: &str) -> Result<String, ServiceError> {
        let raw = raw_id.trim();
        if raw.is_empty() {
            return Err(ServiceError::InvalidIdentifier(
                "payment identifier is missing".to_string(),
            ));
        }

        if Self::is_canonical_id(raw) {
            return Ok(raw.to_string());
        }

        debug!(merchant_id = raw, "identifier is not canonical; searching gateway");
        let results = self.gateway.search_by_merchant_id(raw).await?;

        let first = results.first().ok_or_else(|| {
            ServiceError::GatewayLookupFailed(format!(
                "no gateway payment found for merchant id '{}'",
                raw
            ))
        })?;

        first
            .get("id")
            .or_else(|| first.get("paymentId"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                ServiceError::GatewayLookupFailed(
                    "search result carries no payment id".to_string(),
                )
            })
    }
}
