use chrono::Utc;
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, ModelTrait, QueryFilter, Set,
};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::{
    audit::{self, AuditExporter, OrderAuditEntry},
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::order_item::{Entity as OrderItemEntity, Model as OrderItemModel},
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::types::GatewayPaymentStatus,
    services::loyalty::{self, LoyaltyService},
    services::verification::PaymentVerificationResult,
};

/// Applies verified payment facts to order records: the legal status
/// transition, persisted payment metadata, and the at-most-once loyalty
/// settlement tied to the edge into `paid`.
///
/// Concurrent applications for one order are serialized with conditional
/// updates keyed on the prior status, so unrelated orders never contend.
#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
    loyalty: Arc<LoyaltyService>,
    audit: Option<Arc<dyn AuditExporter>>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderStatusService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        loyalty: Arc<LoyaltyService>,
        audit: Option<Arc<dyn AuditExporter>>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            loyalty,
            audit,
            event_sender,
        }
    }

    /// Validates a status transition against the order lifecycle.
    fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        use OrderStatus::*;
        match (from, to) {
            (Pending, Ready | Paid | Cancelled | Failed) => true,
            (Ready, Paid | Cancelled | Failed) => true,
            // A failed verification may be retried with a fresh identifier
            (Failed, Ready | Paid | Cancelled) => true,
            // Re-applying the current status is a no-op
            _ if from == to => true,
            _ => false,
        }
    }

    /// Maps a gateway payment status to the order status it implies.
    /// `None` means "no transition": metadata is still recorded but the
    /// order stays where it is.
    fn target_status(status: &GatewayPaymentStatus) -> Option<OrderStatus> {
        match status {
            GatewayPaymentStatus::Paid => Some(OrderStatus::Paid),
            GatewayPaymentStatus::VirtualAccountIssued => Some(OrderStatus::Ready),
            GatewayPaymentStatus::Cancelled => Some(OrderStatus::Cancelled),
            GatewayPaymentStatus::Failed => Some(OrderStatus::Failed),
            GatewayPaymentStatus::Other(_) => None,
        }
    }

    async fn fetch(&self, order_id: i64) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(e) = sender.send(event).await {
                warn!(error = %e, "Failed to send order event");
            }
        }
    }

    /// Applies a verification result to an order.
    ///
    /// Persists status, payment method, canonical gateway id, the raw
    /// response blob, and any extracted virtual-account fields as one
    /// conditional partial update. Settlement and audit export fire only
    /// when this call wins the transition; a repeat application of the same
    /// fact is an idempotent no-op.
    #[instrument(skip(self, result), fields(gateway_status = result.status.as_str()))]
    pub async fn apply_verification(
        &self,
        order_id: i64,
        result: &PaymentVerificationResult,
    ) -> Result<OrderModel, ServiceError> {
        let order = self.fetch(order_id).await?;
        let target = Self::target_status(&result.status);

        if let Some(target) = target {
            if order.status == target {
                info!(order_id, status = target.as_str(), "verification already applied");
                return Ok(order);
            }
            if !Self::is_valid_transition(order.status, target) {
                return Err(ServiceError::InvalidStatus(format!(
                    "cannot transition order {} from '{}' to '{}'",
                    order_id,
                    order.status.as_str(),
                    target.as_str()
                )));
            }
        }

        let prior = order.status;
        let entering_paid = target == Some(OrderStatus::Paid);

        let mut changes = order::ActiveModel {
            payment_id: Set(Some(result.payment_id.clone())),
            payment_info: Set(Some(result.raw.clone())),
            updated_at: Set(Some(Utc::now())),
            ..Default::default()
        };
        if let Some(method) = result.method {
            changes.payment_method = Set(Some(method));
        }
        if let Some(target) = target {
            changes.status = Set(target);
        }
        if let Some(va) = &result.virtual_account {
            // Only fields the gateway actually exposed; a later sparse
            // response must not wipe details stored earlier.
            if let Some(num) = &va.account_number {
                changes.vbank_num = Set(Some(num.clone()));
            }
            if let Some(bank) = &va.bank {
                changes.vbank_name = Set(Some(bank.clone()));
            }
            if let Some(holder) = &va.holder {
                changes.vbank_holder = Set(Some(holder.clone()));
            }
            if let Some(expiry) = &va.expiry {
                changes.vbank_expiry = Set(Some(expiry.clone()));
            }
        }
        if entering_paid && !order.points_settled {
            changes.points_settled = Set(true);
        }

        let updated_rows = OrderEntity::update_many()
            .set(changes)
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.eq(prior))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .rows_affected;

        if updated_rows == 0 {
            // Lost the race against a concurrent verification for this order.
            let current = self.fetch(order_id).await?;
            if let Some(target) = target {
                if current.status == target {
                    info!(order_id, "concurrent verification applied the same result");
                    return Ok(current);
                }
            }
            return Err(ServiceError::ConcurrentModification(order_id));
        }

        let updated = self.fetch(order_id).await?;

        if let Some(target) = target {
            self.emit(Event::OrderStatusChanged {
                order_id,
                old_status: prior,
                new_status: target,
            })
            .await;
            info!(
                order_id,
                from = prior.as_str(),
                to = target.as_str(),
                "order status updated"
            );
        }

        if entering_paid {
            if order.points_settled {
                // Settlement already happened on an earlier edge into paid;
                // applying it again would double-credit.
                warn!(
                    order_id,
                    error = %ServiceError::SettlementConflict(order_id),
                    "skipping repeat settlement"
                );
            } else {
                self.settle_points(&updated, result).await;
            }
        }

        if matches!(target, Some(OrderStatus::Paid) | Some(OrderStatus::Ready)) {
            self.export_audit(&updated, result).await;
        }

        Ok(updated)
    }

    /// Marks an order failed after a verification error. Terminal orders are
    /// left untouched; the caller gets the current record either way.
    #[instrument(skip(self))]
    pub async fn mark_failed(&self, order_id: i64) -> Result<OrderModel, ServiceError> {
        let order = self.fetch(order_id).await?;

        match order.status {
            OrderStatus::Failed => Ok(order),
            OrderStatus::Paid | OrderStatus::Cancelled => {
                warn!(
                    order_id,
                    status = order.status.as_str(),
                    "not failing a terminal order"
                );
                Ok(order)
            }
            prior => {
                let changes = order::ActiveModel {
                    status: Set(OrderStatus::Failed),
                    updated_at: Set(Some(Utc::now())),
                    ..Default::default()
                };

                let updated_rows = OrderEntity::update_many()
                    .set(changes)
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(prior))
                    .exec(&*self.db)
                    .await
                    .map_err(ServiceError::DatabaseError)?
                    .rows_affected;

                if updated_rows == 0 {
                    return Err(ServiceError::ConcurrentModification(order_id));
                }

                self.emit(Event::OrderStatusChanged {
                    order_id,
                    old_status: prior,
                    new_status: OrderStatus::Failed,
                })
                .await;

                self.fetch(order_id).await
            }
        }
    }

    /// User-initiated cancellation of a non-terminal order.
    #[instrument(skip(self))]
    pub async fn cancel(&self, order_id: i64, user_id: &str) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        match order.status {
            OrderStatus::Cancelled => Ok(order),
            OrderStatus::Paid => Err(ServiceError::InvalidStatus(format!(
                "order {} is already paid and cannot be cancelled",
                order_id
            ))),
            prior => {
                let changes = order::ActiveModel {
                    status: Set(OrderStatus::Cancelled),
                    updated_at: Set(Some(Utc::now())),
                    ..Default::default()
                };

                let updated_rows = OrderEntity::update_many()
                    .set(changes)
                    .filter(order::Column::Id.eq(order_id))
                    .filter(order::Column::Status.eq(prior))
                    .exec(&*self.db)
                    .await
                    .map_err(ServiceError::DatabaseError)?
                    .rows_affected;

                if updated_rows == 0 {
                    return Err(ServiceError::ConcurrentModification(order_id));
                }

                self.emit(Event::OrderCancelled(order_id)).await;
                info!(order_id, "order cancelled");
                self.fetch(order_id).await
            }
        }
    }

    /// Debits used points and credits earned points for a freshly paid
    /// order. Payment is the source of truth: a ledger failure is logged for
    /// manual reconciliation, never unwound into the order state.
    async fn settle_points(&self, order: &OrderModel, result: &PaymentVerificationResult) {
        let earned = loyalty::earned_points(order.total_amount);

        match self
            .loyalty
            .settle(
                &order.user_id,
                result.customer_email.as_deref(),
                order.used_points,
                earned,
            )
            .await
        {
            Ok(balance) => {
                self.emit(Event::PointsSettled {
                    order_id: order.id,
                    user_id: order.user_id.clone(),
                    points_used: order.used_points,
                    points_earned: earned,
                    balance,
                })
                .await;
            }
            Err(e) => {
                error!(
                    order_id = order.id,
                    user_id = %order.user_id,
                    error = %e,
                    "point settlement failed after payment confirmation; manual reconciliation required"
                );
            }
        }
    }

    /// Best-effort audit export; item and shipping summaries are rebuilt from
    /// the order record so redirect flows with no client context still log.
    async fn export_audit(&self, order: &OrderModel, result: &PaymentVerificationResult) {
        let Some(exporter) = &self.audit else {
            return;
        };

        let items = match order.find_related(OrderItemEntity).all(&*self.db).await {
            Ok(items) => items,
            Err(e) => {
                warn!(order_id = order.id, error = %e, "could not load items for audit record");
                Vec::new()
            }
        };

        let entry = build_audit_entry(order, &items, result.customer_email.as_deref());
        audit::record_async(exporter.clone(), entry);
    }
}

fn build_audit_entry(
    order: &OrderModel,
    items: &[OrderItemModel],
    customer_email: Option<&str>,
) -> OrderAuditEntry {
    let item_summary = if items.is_empty() {
        "no items recorded".to_string()
    } else {
        items
            .iter()
            .map(|item| format!("#{} x{}", item.product_id, item.quantity))
            .collect::<Vec<_>>()
            .join(", ")
    };

    let shipping_summary = format!(
        "({}) {} {}",
        order.shipping_zipcode.as_deref().unwrap_or(""),
        order.shipping_address.as_deref().unwrap_or(""),
        order.shipping_detail_address.as_deref().unwrap_or(""),
    )
    .trim()
    .to_string();

    OrderAuditEntry {
        timestamp: Utc::now(),
        payment_id: order.payment_id.clone().unwrap_or_default(),
        total: order.total_amount,
        item_summary,
        customer_contact: customer_email.unwrap_or("unknown").to_string(),
        recipient_name: order.recipient_name.clone().unwrap_or_default(),
        recipient_phone: order.recipient_phone.clone().unwrap_or_default(),
        shipping_summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use OrderStatus::*;

    #[test]
    fn transition_table_matches_lifecycle() {
        // Forward edges
        assert!(OrderStatusService::is_valid_transition(Pending, Ready));
        assert!(OrderStatusService::is_valid_transition(Pending, Paid));
        assert!(OrderStatusService::is_valid_transition(Ready, Paid));

        // Abort edges
        assert!(OrderStatusService::is_valid_transition(Pending, Cancelled));
        assert!(OrderStatusService::is_valid_transition(Pending, Failed));
        assert!(OrderStatusService::is_valid_transition(Ready, Cancelled));
        assert!(OrderStatusService::is_valid_transition(Ready, Failed));

        // Retry edges out of failed
        assert!(OrderStatusService::is_valid_transition(Failed, Ready));
        assert!(OrderStatusService::is_valid_transition(Failed, Paid));

        // Terminal states stay terminal
        assert!(!OrderStatusService::is_valid_transition(Paid, Pending));
        assert!(!OrderStatusService::is_valid_transition(Paid, Ready));
        assert!(!OrderStatusService::is_valid_transition(Paid, Cancelled));
        assert!(!OrderStatusService::is_valid_transition(Cancelled, Paid));

        // No skipping back
        assert!(!OrderStatusService::is_valid_transition(Ready, Pending));

        // Re-applying the current status is allowed (no-op)
        assert!(OrderStatusService::is_valid_transition(Paid, Paid));
        assert!(OrderStatusService::is_valid_transition(Pending, Pending));
    }

    #[test]
    fn gateway_status_maps_to_order_status() {
        assert_eq!(
            OrderStatusService::target_status(&GatewayPaymentStatus::Paid),
            Some(Paid)
        );
        assert_eq!(
            OrderStatusService::target_status(&GatewayPaymentStatus::VirtualAccountIssued),
            Some(Ready)
        );
        assert_eq!(
            OrderStatusService::target_status(&GatewayPaymentStatus::Cancelled),
            Some(Cancelled)
        );
        assert_eq!(
            OrderStatusService::target_status(&GatewayPaymentStatus::Failed),
            Some(Failed)
        );
        assert_eq!(
            OrderStatusService::target_status(&GatewayPaymentStatus::Other("READY".into())),
            None
        );
    }
}
