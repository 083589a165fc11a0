use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Payment status as reported by the gateway. Unknown values are carried
/// verbatim rather than rejected, since the gateway adds statuses over time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayPaymentStatus {
    Paid,
    VirtualAccountIssued,
    Cancelled,
    Failed,
    Other(String),
}

impl GatewayPaymentStatus {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "PAID" => Self::Paid,
            "VIRTUAL_ACCOUNT_ISSUED" => Self::VirtualAccountIssued,
            "CANCELLED" => Self::Cancelled,
            "FAILED" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Paid => "PAID",
            Self::VirtualAccountIssued => "VIRTUAL_ACCOUNT_ISSUED",
            Self::Cancelled => "CANCELLED",
            Self::Failed => "FAILED",
            Self::Other(s) => s,
        }
    }
}

/// Virtual-account details extracted from a gateway payment response.
/// Fields stay `None` when the gateway has issued the account but not yet
/// exposed the detail ("issued but details pending").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VirtualAccountDetails {
    pub account_number: Option<String>,
    pub bank: Option<String>,
    pub holder: Option<String>,
    pub expiry: Option<String>,
}

impl VirtualAccountDetails {
    pub fn is_empty(&self) -> bool {
        self.account_number.is_none()
            && self.bank.is_none()
            && self.holder.is_none()
            && self.expiry.is_none()
    }
}

/// The gateway's method type tag, wherever the response shape put it.
/// New-style responses carry `method: {type: "..."}`, old ones a bare string.
pub fn method_type_tag(payment: &Value) -> Option<&str> {
    let method = payment.get("method")?;
    match method {
        Value::String(tag) => Some(tag.as_str()),
        _ => method.get("type")?.as_str(),
    }
}

/// Whether a method type tag names a virtual account. Tag spellings drift
/// across gateway SDK versions ("PaymentMethodVirtualAccount",
/// "VirtualAccount", ...), so match on the normalized token.
pub fn tag_is_virtual_account(tag: &str) -> bool {
    let normalized: String = tag
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_ascii_lowercase();
    normalized.contains("virtualaccount")
}

pub fn is_virtual_account_method(payment: &Value) -> bool {
    method_type_tag(payment).is_some_and(tag_is_virtual_account)
}

/// Locates the node carrying virtual-account data. The gateway's response
/// schema has drifted across SDK versions with no version marker, so the
/// known nesting paths are tried in order and the first non-null match wins.
fn virtual_account_node(payment: &Value) -> Option<&Value> {
    let rules: [fn(&Value) -> Option<&Value>; 4] = [
        |p| p.get("virtualAccount"),
        |p| p.get("payment")?.get("virtualAccount"),
        |p| p.get("method")?.get("virtualAccount"),
        |p| {
            let method = p.get("method")?;
            if tag_is_virtual_account(method.get("type")?.as_str()?) {
                Some(method)
            } else {
                None
            }
        },
    ];

    rules
        .iter()
        .find_map(|rule| rule(payment).filter(|node| !node.is_null()))
}

fn string_field(node: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| node.get(*key).and_then(Value::as_str))
        .map(str::to_string)
}

/// Extracts virtual-account details from whichever response shape the
/// gateway returned. Returns `None` when no known nesting path matches.
pub fn extract_virtual_account(payment: &Value) -> Option<VirtualAccountDetails> {
    let node = virtual_account_node(payment)?;

    Some(VirtualAccountDetails {
        account_number: string_field(node, &["accountNumber"]),
        bank: string_field(node, &["bank", "bankName"]),
        holder: string_field(node, &["holder", "remitteeName", "customerName"]),
        expiry: string_field(node, &["expiryDate", "dueDate", "expiredAt"]),
    })
}

/// Buyer contact email, when the gateway echoed it back.
pub fn customer_email(payment: &Value) -> Option<&str> {
    payment.get("customer")?.get("email")?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_known_and_unknown_statuses() {
        assert_eq!(GatewayPaymentStatus::parse("PAID"), GatewayPaymentStatus::Paid);
        assert_eq!(
            GatewayPaymentStatus::parse("VIRTUAL_ACCOUNT_ISSUED"),
            GatewayPaymentStatus::VirtualAccountIssued
        );
        assert_eq!(
            GatewayPaymentStatus::parse("PARTIAL_CANCELLED"),
            GatewayPaymentStatus::Other("PARTIAL_CANCELLED".into())
        );
    }

    // The same logical account number must come out of each documented shape.
    #[test]
    fn extraction_is_shape_independent() {
        let shapes = [
            json!({"virtualAccount": {"accountNumber": "123-456", "bank": "KOOKMIN_BANK"}}),
            json!({"payment": {"virtualAccount": {"accountNumber": "123-456", "bank": "KOOKMIN_BANK"}}}),
            json!({"method": {"virtualAccount": {"accountNumber": "123-456", "bank": "KOOKMIN_BANK"}}}),
            json!({"method": {"type": "PaymentMethodVirtualAccount", "accountNumber": "123-456", "bank": "KOOKMIN_BANK"}}),
        ];

        for shape in &shapes {
            let details = extract_virtual_account(shape).expect("extraction should match");
            assert_eq!(details.account_number.as_deref(), Some("123-456"));
            assert_eq!(details.bank.as_deref(), Some("KOOKMIN_BANK"));
        }
    }

    #[test]
    fn first_matching_rule_wins() {
        let payment = json!({
            "virtualAccount": {"accountNumber": "top-level"},
            "method": {"type": "PaymentMethodVirtualAccount", "accountNumber": "method-level"},
        });

        let details = extract_virtual_account(&payment).unwrap();
        assert_eq!(details.account_number.as_deref(), Some("top-level"));
    }

    #[test]
    fn field_aliases_are_tolerated() {
        let payment = json!({
            "virtualAccount": {
                "accountNumber": "777-888",
                "bankName": "TOSS_BANK",
                "remitteeName": "Hong",
                "dueDate": "2024-01-02T00:00:00Z",
            }
        });

        let details = extract_virtual_account(&payment).unwrap();
        assert_eq!(details.bank.as_deref(), Some("TOSS_BANK"));
        assert_eq!(details.holder.as_deref(), Some("Hong"));
        assert_eq!(details.expiry.as_deref(), Some("2024-01-02T00:00:00Z"));
    }

    #[test]
    fn card_payment_extracts_nothing() {
        let payment = json!({"status": "PAID", "method": {"type": "PaymentMethodCard"}});
        assert!(extract_virtual_account(&payment).is_none());
        assert!(!is_virtual_account_method(&payment));
    }

    #[test]
    fn method_tag_tolerates_bare_string() {
        let payment = json!({"method": "PaymentMethodVirtualAccount"});
        assert!(is_virtual_account_method(&payment));
    }
}
