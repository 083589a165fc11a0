use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of an order. `Paid` and `Cancelled` are terminal; a `Failed`
/// order may be retried back towards `Ready` or `Paid`.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "ready")]
    Ready,
    #[sea_orm(string_value = "paid")]
    Paid,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Ready => "ready",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    #[sea_orm(string_value = "CARD")]
    Card,
    #[sea_orm(string_value = "VIRTUAL_ACCOUNT")]
    VirtualAccount,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Opaque user id supplied by the external identity provider
    pub user_id: String,

    /// Whole-KRW total
    pub total_amount: i64,

    pub status: OrderStatus,

    /// Gateway canonical transaction id, set once checkout reaches the gateway
    pub payment_id: Option<String>,

    pub payment_method: Option<PaymentMethod>,

    /// Raw gateway response, captured verbatim for audit/debug
    pub payment_info: Option<Json>,

    // Virtual-account fields; populated only for VIRTUAL_ACCOUNT orders in
    // status ready/paid. The expiry is kept as the gateway's own string.
    pub vbank_num: Option<String>,
    pub vbank_name: Option<String>,
    pub vbank_holder: Option<String>,
    pub vbank_expiry: Option<String>,

    /// Points applied at checkout, debited on settlement
    pub used_points: i64,

    /// Settlement idempotency guard; flips to true on the edge into `paid`
    pub points_settled: bool,

    // Shipping snapshot, immutable after creation
    pub recipient_name: Option<String>,
    pub recipient_phone: Option<String>,
    pub shipping_address: Option<String>,
    pub shipping_detail_address: Option<String>,
    pub shipping_zipcode: Option<String>,
    pub shipping_memo: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItem,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
