//! Shared harness: application services over an in-memory SQLite database.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectOptions, Database, EntityTrait, QueryFilter, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use glowcart_api::config::ShippingConfig;
use glowcart_api::db::{self, DbPool};
use glowcart_api::entities::{
    cart, cart_item, order, order_item, product, promotion, promotion_usage, shipment,
};
use glowcart_api::events::{self, EventSender};
use glowcart_api::services::carts::CartService;
use glowcart_api::services::settlement::SettlementService;

pub const PENDING_TTL_MINS: i64 = 45;

pub struct TestApp {
    pub db: Arc<DbPool>,
    pub settlement: SettlementService,
    pub carts: CartService,
    pub event_sender: EventSender,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut opts = ConnectOptions::new("sqlite::memory:".to_string());
        opts.max_connections(1).min_connections(1);
        let db = Database::connect(opts)
            .await
            .expect("failed to open in-memory database");
        db::ensure_schema(&db).await.expect("schema bootstrap failed");
        let db = Arc::new(db);

        let (tx, rx) = mpsc::channel(64);
        let event_sender = EventSender::new(tx);
        tokio::spawn(events::process_events(rx));

        let settlement = SettlementService::new(
            db.clone(),
            event_sender.clone(),
            ShippingConfig::default(),
            Duration::minutes(PENDING_TTL_MINS),
        );
        let carts = CartService::new(db.clone());

        Self {
            db,
            settlement,
            carts,
            event_sender,
        }
    }

    pub async fn seed_product(&self, name: &str, price: Decimal, stock: i32, public: bool) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        product::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
            image_url: Set(None),
            price: Set(price),
            stock: Set(stock),
            is_public: Set(public),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed product");
        id
    }

    pub async fn seed_promotion(
        &self,
        code: &str,
        discount_type: promotion::DiscountType,
        discount_value: Decimal,
        minimum_order_amount: Decimal,
        usage_limit: Option<i32>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        promotion::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            name: Set(code.to_string()),
            is_public: Set(true),
            start_date: Set(now - Duration::days(1)),
            end_date: Set(now + Duration::days(30)),
            discount_type: Set(discount_type),
            discount_value: Set(discount_value),
            minimum_order_amount: Set(minimum_order_amount),
            usage_limit: Set(usage_limit),
            used_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed promotion");
        id
    }

    /// Seeds a 10%-off promotion with an explicit validity window.
    pub async fn seed_promotion_window(
        &self,
        code: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        promotion::ActiveModel {
            id: Set(id),
            code: Set(code.to_string()),
            name: Set(code.to_string()),
            is_public: Set(true),
            start_date: Set(start_date),
            end_date: Set(end_date),
            discount_type: Set(promotion::DiscountType::Percentage),
            discount_value: Set(Decimal::from(10)),
            minimum_order_amount: Set(Decimal::ZERO),
            usage_limit: Set(None),
            used_count: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .expect("failed to seed promotion");
        id
    }

    /// Inserts a cart line directly, bypassing the service's stock check;
    /// mirrors stock dropping after an item was added.
    pub async fn seed_cart_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
    ) {
        let now = Utc::now();
        let cart = match cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .unwrap()
        {
            Some(c) => c,
            None => cart::ActiveModel {
                id: Set(Uuid::new_v4()),
                user_id: Set(user_id),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(&*self.db)
            .await
            .unwrap(),
        };

        cart_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            cart_id: Set(cart.id),
            product_id: Set(product_id),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
            created_at: Set(now),
        }
        .insert(&*self.db)
        .await
        .unwrap();
    }

    /// Inserts an already-committed order with one item, used by reclaimer
    /// tests to model state left behind by a crashed or unpaid checkout.
    pub async fn seed_unpaid_order(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
        unit_price: Decimal,
        payment_method: order::PaymentMethod,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let order_id = Uuid::new_v4();
        let sub_total = unit_price * Decimal::from(quantity);
        order::ActiveModel {
            id: Set(order_id),
            user_id: Set(user_id),
            sub_total: Set(sub_total),
            discount_amount: Set(Decimal::ZERO),
            shipping_fee: Set(Decimal::ZERO),
            total_amount: Set(sub_total),
            order_status: Set(order::OrderStatus::Pending),
            payment_status: Set(order::PaymentStatus::Pending),
            payment_method: Set(payment_method),
            shipping_method: Set(order::ShippingMethod::Standard),
            shipping_address: Set("12 Hang Bai, Hanoi".to_string()),
            gateway_txn_id: Set(None),
            note: Set(None),
            created_at: Set(created_at),
            updated_at: Set(created_at),
        }
        .insert(&*self.db)
        .await
        .unwrap();

        order_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            product_id: Set(product_id),
            product_name: Set("seeded".to_string()),
            product_image: Set(None),
            quantity: Set(quantity),
            unit_price: Set(unit_price),
        }
        .insert(&*self.db)
        .await
        .unwrap();

        order_id
    }

    pub async fn stock_of(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .unwrap()
            .expect("product missing")
            .stock
    }

    pub async fn set_stock(&self, product_id: Uuid, stock: i32) {
        let p = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .unwrap()
            .expect("product missing");
        let mut active: product::ActiveModel = p.into();
        active.stock = Set(stock);
        active.update(&*self.db).await.unwrap();
    }

    pub async fn set_price(&self, product_id: Uuid, price: Decimal) {
        let p = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await
            .unwrap()
            .expect("product missing");
        let mut active: product::ActiveModel = p.into();
        active.price = Set(price);
        active.update(&*self.db).await.unwrap();
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .unwrap()
            .expect("order missing")
    }

    pub async fn order_count(&self) -> usize {
        order::Entity::find().all(&*self.db).await.unwrap().len()
    }

    pub async fn order_items(&self, order_id: Uuid) -> Vec<order_item::Model> {
        order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .unwrap()
    }

    pub async fn shipments_of(&self, order_id: Uuid) -> Vec<shipment::Model> {
        shipment::Entity::find()
            .filter(shipment::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await
            .unwrap()
    }

    pub async fn usages_of(&self, promotion_id: Uuid) -> Vec<promotion_usage::Model> {
        promotion_usage::Entity::find()
            .filter(promotion_usage::Column::PromotionId.eq(promotion_id))
            .all(&*self.db)
            .await
            .unwrap()
    }

    pub async fn promotion(&self, promotion_id: Uuid) -> promotion::Model {
        promotion::Entity::find_by_id(promotion_id)
            .one(&*self.db)
            .await
            .unwrap()
            .expect("promotion missing")
    }

    pub async fn cart_of(&self, user_id: Uuid) -> Option<cart::Model> {
        cart::Entity::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .unwrap()
    }

    pub async fn cart_lines_of(&self, user_id: Uuid) -> Vec<cart_item::Model> {
        match self.cart_of(user_id).await {
            Some(cart) => cart_item::Entity::find()
                .filter(cart_item::Column::CartId.eq(cart.id))
                .all(&*self.db)
                .await
                .unwrap(),
            None => Vec::new(),
        }
    }
}
