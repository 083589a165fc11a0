use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemInput {
    pub product_id: i64,
    #[validate(range(min = 1, message = "Quantity must be positive"))]
    pub quantity: i32,
    #[validate(range(min = 0, message = "Price must not be negative"))]
    pub price: i64,
}

/// Checkout-initiation request. The shipping snapshot is captured here and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(range(min = 0, message = "Total amount must not be negative"))]
    pub total_amount: i64,

    #[validate(length(min = 1, message = "Order must contain at least one item"))]
    pub items: Vec<OrderItemInput>,

    /// Merchant-facing payment id minted at checkout initiation, if known
    #[serde(default)]
    pub payment_id: Option<String>,

    /// Loyalty points the buyer chose to apply; capped to the available
    /// balance by the checkout client before it gets here
    #[serde(default)]
    #[validate(range(min = 0, message = "Used points must not be negative"))]
    pub used_points: i64,

    #[serde(default)]
    pub recipient_name: Option<String>,
    #[serde(default)]
    pub recipient_phone: Option<String>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub shipping_detail_address: Option<String>,
    #[serde(default)]
    pub shipping_zipcode: Option<String>,
    #[serde(default)]
    pub shipping_memo: Option<String>,
}

/// Durable store of orders and their line items. Single writer of order
/// truth; the state machine goes through it for every mutation.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    /// Creates the order row and all item rows as one atomic unit.
    #[instrument(skip(self, request), fields(user_id = %user_id, items = request.items.len()))]
    pub async fn create_order(
        &self,
        user_id: &str,
        request: CreateOrderRequest,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }

        let db = &*self.db;
        let now = Utc::now();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order_active_model = order::ActiveModel {
            user_id: Set(user_id.to_string()),
            total_amount: Set(request.total_amount),
            status: Set(OrderStatus::Pending),
            payment_id: Set(request.payment_id),
            used_points: Set(request.used_points),
            points_settled: Set(false),
            recipient_name: Set(request.recipient_name),
            recipient_phone: Set(request.recipient_phone),
            shipping_address: Set(request.shipping_address),
            shipping_detail_address: Set(request.shipping_detail_address),
            shipping_zipcode: Set(request.shipping_zipcode),
            shipping_memo: Set(request.shipping_memo),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            ..Default::default()
        };

        let order_model = order_active_model.insert(&txn).await.map_err(|e| {
            error!(error = %e, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        let item_models: Vec<order_item::ActiveModel> = request
            .items
            .iter()
            .map(|item| order_item::ActiveModel {
                order_id: Set(order_model.id),
                product_id: Set(item.product_id),
                quantity: Set(item.quantity),
                price: Set(item.price),
                ..Default::default()
            })
            .collect();

        OrderItemEntity::insert_many(item_models)
            .exec(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = order_model.id, "Failed to create order items");
                ServiceError::DatabaseError(e)
            })?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = order_model.id, "Failed to commit order creation");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = order_model.id, user_id = %user_id, "Order created");

        if let Some(event_sender) = &self.event_sender {
            if let Err(e) = event_sender.send(Event::OrderCreated(order_model.id)).await {
                warn!(error = %e, order_id = order_model.id, "Failed to send order created event");
            }
        }

        let items = order_model
            .find_related(OrderItemEntity)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((order_model, items))
    }

    /// Ownership-enforced read: a user only sees their own orders.
    #[instrument(skip(self))]
    pub async fn get_order(
        &self,
        order_id: i64,
        user_id: &str,
    ) -> Result<(OrderModel, Vec<OrderItemModel>), ServiceError> {
        let db = &*self.db;

        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = order
            .find_related(OrderItemEntity)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((order, items))
    }

    /// The user's orders, newest first, with their items.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        user_id: &str,
    ) -> Result<Vec<(OrderModel, Vec<OrderItemModel>)>, ServiceError> {
        OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .find_with_related(OrderItemEntity)
            .all(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Applies a partial update. Fields left `NotSet` are untouched, so the
    /// caller can distinguish "absent" from "explicitly null" (`Set(None)`).
    #[instrument(skip(self, changes))]
    pub async fn update_order(
        &self,
        order_id: i64,
        mut changes: order::ActiveModel,
    ) -> Result<OrderModel, ServiceError> {
        changes.id = Set(order_id);

        changes.update(&*self.db).await.map_err(|e| match e {
            sea_orm::DbErr::RecordNotUpdated => {
                ServiceError::NotFound(format!("Order {} not found", order_id))
            }
            other => ServiceError::DatabaseError(other),
        })
    }
}
