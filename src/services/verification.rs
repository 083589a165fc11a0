use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::{
    entities::order::PaymentMethod,
    errors::ServiceError,
    gateway::{
        client::PaymentGateway,
        resolver::IdentifierResolver,
        types::{self, GatewayPaymentStatus, VirtualAccountDetails},
    },
};

/// Canonical view of one gateway payment, produced per verification call and
/// consumed immediately by the order state machine. Not persisted.
#[derive(Debug, Clone)]
pub struct PaymentVerificationResult {
    /// The gateway's canonical transaction id
    pub payment_id: String,
    pub status: GatewayPaymentStatus,
    pub method: Option<PaymentMethod>,
    /// Present for virtual-account payments; empty sub-fields mean the
    /// account was issued but the gateway has not exposed details yet
    pub virtual_account: Option<VirtualAccountDetails>,
    /// Buyer contact passed through from the gateway, when echoed back
    pub customer_email: Option<String>,
    /// The gateway response, verbatim, for the order's audit blob
    pub raw: Value,
}

impl PaymentVerificationResult {
    pub fn is_settled_payment(&self) -> bool {
        self.status == GatewayPaymentStatus::Paid
    }
}

/// Orchestrates identifier resolution and payment fetch, then normalizes the
/// gateway's heterogeneous response shapes into a `PaymentVerificationResult`.
pub struct PaymentVerifier {
    resolver: IdentifierResolver,
    gateway: Arc<dyn PaymentGateway>,
}

impl PaymentVerifier {
    pub fn new(gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            resolver: IdentifierResolver::new(gateway.clone()),
            gateway,
        }
    }

    /// Verifies a payment from any caller-supplied identifier (canonical or
    /// merchant-facing). Fetch failures surface as `VerificationFailed` with
    /// upstream diagnostics; a result is never fabricated.
    #[instrument(skip(self))]
    pub async fn verify(&self, raw_id: &str) -> Result<PaymentVerificationResult, ServiceError> {
        let canonical = self.resolver.resolve(raw_id).await?;
        let payment = self.gateway.fetch_payment(&canonical).await?;

        debug!(payment_id = %canonical, "gateway payment fetched");
        Ok(Self::interpret(canonical, payment))
    }

    fn interpret(canonical_id: String, payment: Value) -> PaymentVerificationResult {
        let status = payment
            .get("status")
            .and_then(Value::as_str)
            .map(GatewayPaymentStatus::parse)
            .unwrap_or_else(|| GatewayPaymentStatus::Other("UNKNOWN".to_string()));

        let tagged_virtual = types::is_virtual_account_method(&payment);
        let method = if tagged_virtual || status == GatewayPaymentStatus::VirtualAccountIssued {
            Some(PaymentMethod::VirtualAccount)
        } else if types::method_type_tag(&payment).is_some() {
            Some(PaymentMethod::Card)
        } else {
            None
        };

        let virtual_account = types::extract_virtual_account(&payment).or_else(|| {
            // Issued but details pending: keep the method fact, empty fields
            (method == Some(PaymentMethod::VirtualAccount))
                .then(VirtualAccountDetails::default)
        });

        let customer_email = types::customer_email(&payment).map(str::to_string);

        PaymentVerificationResult {
            payment_id: canonical_id,
            status,
            method,
            virtual_account,
            customer_email,
            raw: payment,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn interpret(payment: Value) -> PaymentVerificationResult {
        PaymentVerifier::interpret("pay-1".to_string(), payment)
    }

    #[test]
    fn card_payment_interprets_as_paid_card() {
        let result = interpret(json!({"status": "PAID", "method": {"type": "Card"}}));

        assert_eq!(result.status, GatewayPaymentStatus::Paid);
        assert_eq!(result.method, Some(PaymentMethod::Card));
        assert!(result.virtual_account.is_none());
    }

    #[test]
    fn issued_virtual_account_carries_details() {
        let result = interpret(json!({
            "status": "VIRTUAL_ACCOUNT_ISSUED",
            "method": {
                "type": "PaymentMethodVirtualAccount",
                "accountNumber": "123-456",
                "bank": "KOOKMIN_BANK",
                "holder": "Hong",
                "expiryDate": "2024-01-02T00:00:00Z",
            },
        }));

        assert_eq!(result.status, GatewayPaymentStatus::VirtualAccountIssued);
        assert_eq!(result.method, Some(PaymentMethod::VirtualAccount));
        let va = result.virtual_account.expect("details extracted");
        assert_eq!(va.account_number.as_deref(), Some("123-456"));
        assert_eq!(va.bank.as_deref(), Some("KOOKMIN_BANK"));
        assert_eq!(va.holder.as_deref(), Some("Hong"));
        assert_eq!(va.expiry.as_deref(), Some("2024-01-02T00:00:00Z"));
    }

    #[test]
    fn issued_without_details_yields_empty_sub_record() {
        let result = interpret(json!({"status": "VIRTUAL_ACCOUNT_ISSUED"}));

        assert_eq!(result.method, Some(PaymentMethod::VirtualAccount));
        let va = result.virtual_account.expect("empty details present");
        assert!(va.is_empty());
    }

    #[test]
    fn unknown_status_is_carried_verbatim() {
        let result = interpret(json!({"status": "PARTIAL_CANCELLED"}));
        assert_eq!(
            result.status,
            GatewayPaymentStatus::Other("PARTIAL_CANCELLED".into())
        );
        assert!(result.method.is_none());
    }

    #[test]
    fn customer_email_passes_through() {
        let result = interpret(json!({
            "status": "PAID",
            "method": {"type": "Card"},
            "customer": {"email": "buyer@example.com"},
        }));
        assert_eq!(result.customer_email.as_deref(), Some("buyer@example.com"));
    }
}
