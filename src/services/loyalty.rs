use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait,
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use crate::{
    entities::loyalty_account::{self, Entity as LoyaltyAccountEntity},
    errors::ServiceError,
};

/// Share of the order total credited back as points, in basis points.
pub const POINTS_EARN_RATE_BPS: i64 = 200;

/// Points earned for a paid order: 2% of the total, floor.
pub fn earned_points(total_amount: i64) -> i64 {
    total_amount * POINTS_EARN_RATE_BPS / 10_000
}

/// Applies a debit-then-credit to a balance. The debit clamps at zero; the
/// upstream caller is expected to have capped usage to the available balance
/// already, so the clamp is a safety net rather than the primary control.
fn apply_settlement(balance: i64, points_used: i64, points_earned: i64) -> i64 {
    (balance - points_used).max(0) + points_earned
}

/// Single writer of loyalty point balances.
#[derive(Clone)]
pub struct LoyaltyService {
    db: Arc<DatabaseConnection>,
}

impl LoyaltyService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Current balance; absent accounts read as zero.
    #[instrument(skip(self))]
    pub async fn balance(&self, user_id: &str) -> Result<i64, ServiceError> {
        let account = LoyaltyAccountEntity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(account.map(|a| a.balance).unwrap_or(0))
    }

    /// Debits `points_used` then credits `points_earned`, creating the
    /// account at balance zero when absent. Returns the new balance.
    ///
    /// Per-order idempotency lives with the caller (the order state machine
    /// guards the edge into `paid`); this call itself is a plain ledger
    /// mutation.
    #[instrument(skip(self, email))]
    pub async fn settle(
        &self,
        user_id: &str,
        email: Option<&str>,
        points_used: i64,
        points_earned: i64,
    ) -> Result<i64, ServiceError> {
        if user_id.is_empty() {
            return Err(ServiceError::ValidationError(
                "user id must not be empty".to_string(),
            ));
        }
        if points_used < 0 || points_earned < 0 {
            return Err(ServiceError::ValidationError(
                "point amounts must not be negative".to_string(),
            ));
        }

        let db = &*self.db;
        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start settlement transaction");
            ServiceError::DatabaseError(e)
        })?;

        let now = Utc::now();
        let existing = LoyaltyAccountEntity::find_by_id(user_id)
            .one(&txn)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let new_balance = match existing {
            Some(account) => {
                let new_balance = apply_settlement(account.balance, points_used, points_earned);
                let mut active: loyalty_account::ActiveModel = account.into();
                active.balance = Set(new_balance);
                if email.is_some() {
                    active.email = Set(email.map(str::to_string));
                }
                active.updated_at = Set(Some(now));
                active.update(&txn).await.map_err(ServiceError::DatabaseError)?;
                new_balance
            }
            None => {
                let new_balance = apply_settlement(0, points_used, points_earned);
                let active = loyalty_account::ActiveModel {
                    user_id: Set(user_id.to_string()),
                    balance: Set(new_balance),
                    email: Set(email.map(str::to_string)),
                    created_at: Set(now),
                    updated_at: Set(Some(now)),
                };
                active.insert(&txn).await.map_err(ServiceError::DatabaseError)?;
                new_balance
            }
        };

        txn.commit().await.map_err(|e| {
            error!(error = %e, user_id = %user_id, "Failed to commit settlement");
            ServiceError::DatabaseError(e)
        })?;

        info!(
            user_id = %user_id,
            points_used,
            points_earned,
            balance = new_balance,
            "Loyalty points settled"
        );

        Ok(new_balance)
    }
}
