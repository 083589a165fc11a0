use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::info;

use crate::entities::order::OrderStatus;

/// Events emitted by the order/payment services.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated(i64),
    OrderStatusChanged {
        order_id: i64,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    OrderCancelled(i64),
    PointsSettled {
        order_id: i64,
        user_id: String,
        points_used: i64,
        points_earned: i64,
        balance: i64,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }
}

/// Drains the event channel, logging each event. Runs until every sender
/// is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated(order_id) => {
                info!(order_id, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(
                    order_id,
                    from = old_status.as_str(),
                    to = new_status.as_str(),
                    "event: order status changed"
                );
            }
            Event::OrderCancelled(order_id) => {
                info!(order_id, "event: order cancelled");
            }
            Event::PointsSettled {
                order_id,
                user_id,
                points_used,
                points_earned,
                balance,
            } => {
                info!(
                    order_id,
                    user_id = %user_id,
                    points_used,
                    points_earned,
                    balance,
                    "event: loyalty points settled"
                );
            }
        }
    }
}
