//! Keyed store bridging the external payment redirect round trip. A record
//! is written when a deferred checkout is initiated and consumed exactly
//! once when the gateway confirms; records older than the TTL are invisible
//! to `take` and eagerly purged by the reclaimer tick.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::ShippingMethod;
use crate::entities::pending_payment::{self, Entity as PendingPayment};
use crate::errors::ServiceError;

/// One settled-price line inside an order intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub product_image: Option<String>,
    pub quantity: i32,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentPromotion {
    pub promotion_id: Uuid,
    pub discount_amount: Decimal,
}

/// The full order intent captured at initiation time. Prices and totals are
/// locked in here; confirmation replays this payload instead of re-reading
/// the catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub user_id: Uuid,
    pub shipping_address: String,
    pub shipping_method: ShippingMethod,
    pub note: Option<String>,
    pub lines: Vec<IntentLine>,
    pub promotion: Option<IntentPromotion>,
    pub sub_total: Decimal,
    pub discount_amount: Decimal,
    pub shipping_fee: Decimal,
    pub total_amount: Decimal,
}

impl OrderIntent {
    /// Defensive shape check before the intent drives a commit.
    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.lines.is_empty() {
            return Err(ServiceError::CorruptPendingState(
                "intent has no lines".to_string(),
            ));
        }
        if self.shipping_address.trim().is_empty() {
            return Err(ServiceError::CorruptPendingState(
                "intent has no shipping address".to_string(),
            ));
        }
        if self.lines.iter().any(|l| l.quantity <= 0) {
            return Err(ServiceError::CorruptPendingState(
                "intent line with non-positive quantity".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stores an intent under a caller-chosen unique reference. A live record
/// under the same reference is a conflict; an expired leftover is replaced.
pub async fn put<C: ConnectionTrait>(
    conn: &C,
    order_ref: &str,
    intent: &OrderIntent,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if let Some(existing) = PendingPayment::find_by_id(order_ref).one(conn).await? {
        if existing.created_at + ttl > now {
            return Err(ServiceError::DuplicateReference);
        }
        warn!(order_ref, "Replacing expired pending payment record");
        PendingPayment::delete_by_id(order_ref).exec(conn).await?;
    }

    let payload = serde_json::to_string(intent)
        .map_err(|e| ServiceError::InternalError(format!("intent serialization failed: {}", e)))?;

    pending_payment::ActiveModel {
        order_ref: Set(order_ref.to_string()),
        user_id: Set(intent.user_id),
        payload: Set(payload),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    info!(order_ref, "Pending payment stored");
    Ok(())
}

/// Consumes a record in one step: read, TTL check, delete. Runs inside the
/// caller's commit transaction so a rolled-back confirmation leaves the
/// record in place, while a second concurrent take loses the delete race and
/// deterministically reports the reference as gone.
pub async fn take<C: ConnectionTrait>(
    conn: &C,
    order_ref: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<OrderIntent, ServiceError> {
    let record = PendingPayment::find_by_id(order_ref)
        .one(conn)
        .await?
        .ok_or(ServiceError::ExpiredOrUnknownReference)?;

    if record.created_at + ttl <= now {
        PendingPayment::delete_by_id(order_ref).exec(conn).await?;
        return Err(ServiceError::ExpiredOrUnknownReference);
    }

    let deleted = PendingPayment::delete_by_id(order_ref).exec(conn).await?;
    if deleted.rows_affected == 0 {
        return Err(ServiceError::ExpiredOrUnknownReference);
    }

    let intent: OrderIntent = serde_json::from_str(&record.payload)
        .map_err(|e| ServiceError::CorruptPendingState(e.to_string()))?;
    intent.validate()?;
    Ok(intent)
}

/// Physically removes expired records. Hooked into the reclaimer tick.
pub async fn purge_expired<C: ConnectionTrait>(
    conn: &C,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<u64, ServiceError> {
    let cutoff = now - ttl;
    let result = PendingPayment::delete_many()
        .filter(pending_payment::Column::CreatedAt.lte(cutoff))
        .exec(conn)
        .await?;
    if result.rows_affected > 0 {
        info!(purged = result.rows_affected, "Expired pending payments purged");
    }
    Ok(result.rows_affected)
}
