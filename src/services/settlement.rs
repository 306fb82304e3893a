//! Order settlement engine: the all-or-nothing creation of
//! Order + OrderItems + Shipment + PromotionUsage + stock decrement, for
//! both the immediate (cash-on-delivery) and the deferred (gateway) path.
//!
//! Everything between `begin` and `commit` is one bundle. A failed stock
//! guard, a lost promotion race or any storage error inside it rolls the
//! whole settlement back; no partial order is ever observable.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseTransaction, EntityTrait, ModelTrait, QueryFilter, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::config::ShippingConfig;
use crate::db::DbPool;
use crate::entities::cart::{self, Entity as Cart};
use crate::entities::cart_item::{self, Entity as CartItem};
use crate::entities::order::{
    self, Entity as Order, OrderStatus, PaymentMethod, PaymentStatus, ShippingMethod,
};
use crate::entities::order_item::{self, Entity as OrderItem};
use crate::entities::product::Entity as Product;
use crate::entities::shipment::{self, ShipmentStatus};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::pending_payments::{IntentLine, IntentPromotion, OrderIntent};
use crate::services::{inventory, pending_payments, promotions};

/// Checkout input shared by both settlement paths.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[validate(length(
        min = 1,
        max = 500,
        message = "Shipping address must be between 1 and 500 characters"
    ))]
    pub shipping_address: String,
    pub shipping_method: ShippingMethod,
    pub promotion_id: Option<Uuid>,
    #[validate(length(max = 1000, message = "Note must be at most 1000 characters"))]
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SettlementReceipt {
    pub order_id: Uuid,
    pub total_amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct DeferredCheckout {
    pub order_ref: String,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct SettlementService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    shipping: ShippingConfig,
    pending_ttl: Duration,
}

impl SettlementService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        shipping: ShippingConfig,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            db,
            event_sender,
            shipping,
            pending_ttl,
        }
    }

    /// Immediate settlement (cash on delivery): validates, prices the cart
    /// against the current catalog, then commits the full bundle and clears
    /// the cart in one transaction.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn settle_from_cart(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<SettlementReceipt, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

        let now = Utc::now();
        let intent = self.prepare_intent(user_id, &request, now).await?;

        let txn = self.db.begin().await?;
        let order_id = commit_bundle(
            &txn,
            &intent,
            PaymentMethod::Cod,
            PaymentStatus::Pending,
            OrderStatus::Pending,
            ShipmentStatus::Pending,
            None,
            now,
        )
        .await?;
        clear_cart(&txn, user_id).await?;
        txn.commit().await?;

        info!(%order_id, %user_id, "Order settled (cash on delivery)");
        self.emit(Event::OrderPlaced {
            order_id,
            user_id,
            total_amount: intent.total_amount,
        })
        .await;

        Ok(SettlementReceipt {
            order_id,
            total_amount: intent.total_amount,
        })
    }

    /// Deferred settlement, phase one: price the cart exactly like the
    /// immediate path but write a pending-payment record instead of
    /// committing. No stock is reserved; other shoppers still compete for
    /// it until the gateway confirms.
    #[instrument(skip(self, request), fields(user_id = %user_id))]
    pub async fn initiate_deferred(
        &self,
        user_id: Uuid,
        request: CheckoutRequest,
    ) -> Result<DeferredCheckout, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

        let now = Utc::now();
        let intent = self.prepare_intent(user_id, &request, now).await?;

        let order_ref = new_order_ref();
        pending_payments::put(&*self.db, &order_ref, &intent, self.pending_ttl, now).await?;

        info!(%user_id, order_ref, amount = %intent.total_amount, "Deferred settlement initiated");
        Ok(DeferredCheckout {
            order_ref,
            amount: intent.total_amount,
        })
    }

    /// Deferred settlement, phase two: the verified gateway callback.
    /// Consumes the pending record and commits the bundle in the same
    /// transaction, so a duplicate callback can never double-commit and a
    /// failed commit leaves the record in place for a retry.
    #[instrument(skip(self), fields(order_ref = %order_ref))]
    pub async fn confirm_deferred(
        &self,
        order_ref: &str,
        signature_valid: bool,
        gateway_txn_id: &str,
    ) -> Result<SettlementReceipt, ServiceError> {
        if !signature_valid {
            warn!(order_ref, "Rejecting gateway callback with bad signature");
            return Err(ServiceError::SignatureMismatch);
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let intent = pending_payments::take(&txn, order_ref, self.pending_ttl, now).await?;
        let order_id = commit_bundle(
            &txn,
            &intent,
            PaymentMethod::Vnpay,
            PaymentStatus::Paid,
            OrderStatus::Processing,
            ShipmentStatus::Shipping,
            Some(gateway_txn_id.to_string()),
            now,
        )
        .await?;

        // Time has passed since initiation; only the purchased lines leave
        // the cart, anything added meanwhile stays.
        let purchased: Vec<Uuid> = intent.lines.iter().map(|l| l.product_id).collect();
        remove_cart_lines(&txn, intent.user_id, &purchased).await?;

        txn.commit().await?;

        info!(%order_id, order_ref, gateway_txn_id, "Deferred settlement confirmed");
        self.emit(Event::PaymentConfirmed {
            order_id,
            gateway_txn_id: gateway_txn_id.to_string(),
        })
        .await;
        self.emit(Event::OrderPlaced {
            order_id,
            user_id: intent.user_id,
            total_amount: intent.total_amount,
        })
        .await;

        Ok(SettlementReceipt {
            order_id,
            total_amount: intent.total_amount,
        })
    }

    /// Cancels a still-pending order and restores its stock. Redeemed
    /// promotions stay spent; that is policy, not an oversight.
    #[instrument(skip(self), fields(order_id = %order_id, user_id = %user_id))]
    pub async fn cancel_order(&self, order_id: Uuid, user_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;

        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        if order.order_status != OrderStatus::Pending {
            return Err(ServiceError::InvalidOperation(format!(
                "order in status {} cannot be cancelled",
                order.order_status
            )));
        }

        // The status flip is the gate, conditional on the row still being
        // pending. Flipping before any stock write means a racing cancel or
        // reclaimer sweep hits zero rows here and never restores the same
        // stock twice.
        let flipped = Order::update_many()
            .set(order::ActiveModel {
                order_status: Set(OrderStatus::Cancelled),
                updated_at: Set(Utc::now()),
                ..Default::default()
            })
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::OrderStatus.eq(OrderStatus::Pending))
            .exec(&txn)
            .await?;
        if flipped.rows_affected == 0 {
            return Err(ServiceError::InvalidOperation(
                "order is no longer pending and cannot be cancelled".to_string(),
            ));
        }

        let items = order.find_related(OrderItem).all(&txn).await?;
        for item in &items {
            inventory::restore_stock(&txn, item.product_id, item.quantity).await?;
        }

        txn.commit().await?;

        info!(%order_id, "Order cancelled, stock restored");
        self.emit(Event::OrderCancelled(order_id)).await;
        Ok(())
    }

    /// Fetches one of the user's orders with its item snapshots.
    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(
        &self,
        order_id: Uuid,
        user_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let order = Order::find_by_id(order_id)
            .filter(order::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;

        let items = order.find_related(OrderItem).all(&*self.db).await?;
        Ok(OrderDetails { order, items })
    }

    /// Steps 2–7 of the checkout: load the cart, drop spoiled lines, price
    /// the survivors against the current catalog, gate the promotion and
    /// compute the totals. Read-only; shared by both paths.
    async fn prepare_intent(
        &self,
        user_id: Uuid,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> Result<OrderIntent, ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .find_also_related(Product)
            .all(&*self.db)
            .await?;
        if rows.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        // Spoiled lines (delisted product, vanished product, short stock)
        // are dropped silently rather than failing the whole checkout.
        let mut lines = Vec::new();
        for (line, product) in rows {
            let Some(product) = product else {
                warn!(product_id = %line.product_id, "Dropping cart line for vanished product");
                continue;
            };
            if !product.is_public || line.quantity <= 0 || product.stock < line.quantity {
                warn!(product_id = %product.id, "Dropping unpurchasable cart line");
                continue;
            }
            lines.push(IntentLine {
                product_id: product.id,
                product_name: product.name.clone(),
                product_image: product.image_url.clone(),
                quantity: line.quantity,
                // Price at settlement time, not the stale cart snapshot.
                unit_price: product.price,
            });
        }
        if lines.is_empty() {
            return Err(ServiceError::NoValidItems);
        }

        let sub_total: Decimal = lines
            .iter()
            .map(|l| l.unit_price * Decimal::from(l.quantity))
            .sum();

        let promotion = match request.promotion_id {
            Some(promotion_id) => {
                let (promo, discount) = promotions::validate_for_checkout(
                    &*self.db,
                    promotion_id,
                    user_id,
                    sub_total,
                    now,
                )
                .await?;
                Some(IntentPromotion {
                    promotion_id: promo.id,
                    discount_amount: discount,
                })
            }
            None => None,
        };
        let discount_amount = promotion
            .as_ref()
            .map(|p| p.discount_amount)
            .unwrap_or(Decimal::ZERO);

        let shipping_fee = match request.shipping_method {
            ShippingMethod::Standard => self.shipping.standard_fee,
            ShippingMethod::Express => self.shipping.express_fee,
        };

        let total_amount = (sub_total - discount_amount + shipping_fee).max(Decimal::ZERO);

        Ok(OrderIntent {
            user_id,
            shipping_address: request.shipping_address.clone(),
            shipping_method: request.shipping_method,
            note: request.note.clone(),
            lines,
            promotion,
            sub_total,
            discount_amount,
            shipping_fee,
            total_amount,
        })
    }

    async fn emit(&self, event: Event) {
        if let Err(e) = self.event_sender.send(event).await {
            warn!("Failed to send settlement event: {}", e);
        }
    }
}

/// The six-effect commit bundle. Must run inside an open transaction; every
/// guard that gates a write (stock floor, promotion limit, per-user
/// redemption) is evaluated in the same transaction as the write itself.
#[allow(clippy::too_many_arguments)]
async fn commit_bundle(
    txn: &DatabaseTransaction,
    intent: &OrderIntent,
    payment_method: PaymentMethod,
    payment_status: PaymentStatus,
    order_status: OrderStatus,
    shipment_status: ShipmentStatus,
    gateway_txn_id: Option<String>,
    now: DateTime<Utc>,
) -> Result<Uuid, ServiceError> {
    let order_id = Uuid::new_v4();

    order::ActiveModel {
        id: Set(order_id),
        user_id: Set(intent.user_id),
        sub_total: Set(intent.sub_total),
        discount_amount: Set(intent.discount_amount),
        shipping_fee: Set(intent.shipping_fee),
        total_amount: Set(intent.total_amount),
        order_status: Set(order_status),
        payment_status: Set(payment_status),
        payment_method: Set(payment_method),
        shipping_method: Set(intent.shipping_method),
        shipping_address: Set(intent.shipping_address.clone()),
        gateway_txn_id: Set(gateway_txn_id),
        note: Set(intent.note.clone()),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    for line in &intent.lines {
        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(line.product_id),
            product_name: Set(line.product_name.clone()),
            product_image: Set(line.product_image.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
        }
        .insert(txn)
        .await?;

        inventory::deduct_stock(txn, line.product_id, line.quantity).await?;
    }

    if let Some(promo) = &intent.promotion {
        promotions::record_usage(
            txn,
            promo.promotion_id,
            intent.user_id,
            order_id,
            promo.discount_amount,
            now,
        )
        .await?;
    }

    shipment::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(shipment_status),
        handled_by: Set(None),
        delivered_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(txn)
    .await?;

    Ok(order_id)
}

/// Deletes the user's cart and all its lines (immediate path).
async fn clear_cart(txn: &DatabaseTransaction, user_id: Uuid) -> Result<(), ServiceError> {
    let Some(cart) = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(txn)
        .await?
    else {
        return Ok(());
    };

    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .exec(txn)
        .await?;
    cart.delete(txn).await?;
    Ok(())
}

/// Removes only the given products from the user's cart; the cart itself is
/// deleted once it holds no more lines (deferred path).
async fn remove_cart_lines(
    txn: &DatabaseTransaction,
    user_id: Uuid,
    product_ids: &[Uuid],
) -> Result<(), ServiceError> {
    let Some(cart) = Cart::find()
        .filter(cart::Column::UserId.eq(user_id))
        .one(txn)
        .await?
    else {
        return Ok(());
    };

    CartItem::delete_many()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .filter(cart_item::Column::ProductId.is_in(product_ids.iter().copied()))
        .exec(txn)
        .await?;

    let remaining = CartItem::find()
        .filter(cart_item::Column::CartId.eq(cart.id))
        .one(txn)
        .await?;
    if remaining.is_none() {
        cart.delete(txn).await?;
    }
    Ok(())
}

fn new_order_ref() -> String {
    format!("GC{}", Uuid::new_v4().simple())
}
