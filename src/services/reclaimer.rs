//! Background sweep cancelling stale unpaid gateway orders and restoring
//! their stock. The conditional status flip is the idempotency mechanism:
//! once an order is cancelled it no longer matches the flip's predicate and
//! naturally drops out.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::order::{self, Entity as Order, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::{inventory, pending_payments};

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReclaimStats {
    pub reclaimed: usize,
    pub failed: usize,
}

/// One sweep pass. Each matching order is handled in its own transaction;
/// a failure on one is logged and never blocks the rest.
pub async fn run_once(
    db: &DbPool,
    grace: Duration,
    pending_ttl: Duration,
    event_sender: Option<&EventSender>,
) -> ReclaimStats {
    let now = Utc::now();
    let cutoff = now - grace;

    let candidates = match Order::find()
        .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .filter(order::Column::OrderStatus.eq(OrderStatus::Pending))
        .filter(order::Column::PaymentMethod.ne(PaymentMethod::Cod))
        .filter(order::Column::CreatedAt.lt(cutoff))
        .all(db)
        .await
    {
        Ok(orders) => orders,
        Err(e) => {
            error!("Reclaimer could not list stale unpaid orders: {}", e);
            return ReclaimStats::default();
        }
    };

    let mut stats = ReclaimStats::default();
    for candidate in candidates {
        let order_id = candidate.id;
        match reclaim_one(db, order_id, grace).await {
            Ok(true) => {
                info!(%order_id, "Unpaid order reclaimed");
                stats.reclaimed += 1;
                if let Some(sender) = event_sender {
                    if let Err(e) = sender.send(Event::UnpaidOrderReclaimed(order_id)).await {
                        warn!(%order_id, "Failed to send reclaim event: {}", e);
                    }
                }
            }
            Ok(false) => {}
            Err(e) => {
                error!(%order_id, "Failed to reclaim unpaid order: {}", e);
                stats.failed += 1;
            }
        }
    }

    if let Err(e) = pending_payments::purge_expired(db, pending_ttl, now).await {
        warn!("Failed to purge expired pending payments: {}", e);
    }

    stats
}

/// Marks the order failed/cancelled and restores stock in one transaction.
/// The status flip re-evaluates the selection predicate in the update
/// statement itself; zero rows means a concurrent sweep on another instance
/// or a late confirmation got the order first, and no stock moves.
async fn reclaim_one(db: &DbPool, order_id: Uuid, grace: Duration) -> Result<bool, ServiceError> {
    let txn = db.begin().await?;
    let cutoff = Utc::now() - grace;

    let flipped = Order::update_many()
        .set(order::ActiveModel {
            payment_status: Set(PaymentStatus::Failed),
            order_status: Set(OrderStatus::Cancelled),
            updated_at: Set(Utc::now()),
            ..Default::default()
        })
        .filter(order::Column::Id.eq(order_id))
        .filter(order::Column::PaymentStatus.eq(PaymentStatus::Pending))
        .filter(order::Column::OrderStatus.eq(OrderStatus::Pending))
        .filter(order::Column::PaymentMethod.ne(PaymentMethod::Cod))
        .filter(order::Column::CreatedAt.lt(cutoff))
        .exec(&txn)
        .await?;
    if flipped.rows_affected == 0 {
        return Ok(false);
    }

    let items = OrderItem::find()
        .filter(order_item::Column::OrderId.eq(order_id))
        .all(&txn)
        .await?;
    for item in &items {
        inventory::restore_stock(&txn, item.product_id, item.quantity).await?;
    }

    txn.commit().await?;
    Ok(true)
}

/// Spawns the recurring sweep. Ticks keep running for the lifetime of the
/// process.
pub fn spawn(
    db: Arc<DbPool>,
    interval_secs: u64,
    grace: Duration,
    pending_ttl: Duration,
    event_sender: EventSender,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_secs, "Unpaid-order reclaimer started");
        loop {
            ticker.tick().await;
            let stats = run_once(&db, grace, pending_ttl, Some(&event_sender)).await;
            if stats.reclaimed > 0 || stats.failed > 0 {
                info!(
                    reclaimed = stats.reclaimed,
                    failed = stats.failed,
                    "Reclaimer sweep finished"
                );
            }
        }
    })
}
