use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::cart::{self, Entity as Cart};
use crate::entities::cart_item::{self, Entity as CartItem};
use crate::entities::product::Entity as Product;
use crate::errors::ServiceError;

/// A cart line joined with its product's current listing state, as returned
/// to the storefront.
#[derive(Debug, Serialize)]
pub struct CartLine {
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub current_price: Decimal,
    pub available: bool,
}

/// Per-user cart store. Settlement reads lines through here but performs its
/// own deletes inside the commit transaction.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DbPool>,
}

impl CartService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Adds a product to the user's cart, snapshotting the current price.
    /// Quantities merge when the product is already in the cart.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "quantity must be positive".to_string(),
            ));
        }

        let product = Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .filter(|p| p.is_public)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        if product.stock < quantity {
            return Err(ServiceError::InsufficientStock(format!(
                "only {} left in stock for product {}",
                product.stock, product_id
            )));
        }

        let now = Utc::now();
        let cart = match Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        {
            Some(cart) => cart,
            None => {
                cart::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    created_at: Set(now),
                    updated_at: Set(now),
                }
                .insert(&*self.db)
                .await?
            }
        };

        let existing = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?;

        match existing {
            Some(line) => {
                let merged = line.quantity + quantity;
                let mut active: cart_item::ActiveModel = line.into();
                active.quantity = Set(merged);
                active.unit_price = Set(product.price);
                active.update(&*self.db).await?;
            }
            None => {
                cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    cart_id: Set(cart.id),
                    product_id: Set(product_id),
                    quantity: Set(quantity),
                    unit_price: Set(product.price),
                    created_at: Set(now),
                }
                .insert(&*self.db)
                .await?;
            }
        }

        info!(%user_id, %product_id, quantity, "Cart line added");
        Ok(())
    }

    /// Replaces a line's quantity; zero is rejected, use `remove_item`.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    ) -> Result<(), ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::InvalidInput(
                "quantity must be positive".to_string(),
            ));
        }

        let (cart, line) = self.find_line(user_id, product_id).await?;
        let mut active: cart_item::ActiveModel = line.into();
        active.quantity = Set(quantity);
        active.update(&*self.db).await?;

        touch_cart(&self.db, cart).await?;
        Ok(())
    }

    /// Removes one line; deletes the cart when it becomes empty.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: Uuid, product_id: Uuid) -> Result<(), ServiceError> {
        let (cart, line) = self.find_line(user_id, product_id).await?;
        line.delete(&*self.db).await?;

        let remaining = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .one(&*self.db)
            .await?;
        if remaining.is_none() {
            cart.delete(&*self.db).await?;
        }
        Ok(())
    }

    /// Reads the user's cart joined with the products' current listing
    /// state. Lines for delisted products are reported unavailable, not
    /// hidden; settlement is what drops them.
    #[instrument(skip(self))]
    pub async fn get_lines(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        let Some(cart) = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
        else {
            return Ok(Vec::new());
        };

        let rows = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .order_by_asc(cart_item::Column::CreatedAt)
            .find_also_related(Product)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .map(|(line, product)| match product {
                Some(p) => CartLine {
                    product_id: line.product_id,
                    product_name: p.name.clone(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    current_price: p.price,
                    available: p.is_public && p.stock >= line.quantity,
                },
                None => CartLine {
                    product_id: line.product_id,
                    product_name: String::new(),
                    quantity: line.quantity,
                    unit_price: line.unit_price,
                    current_price: line.unit_price,
                    available: false,
                },
            })
            .collect())
    }

    async fn find_line(
        &self,
        user_id: Uuid,
        product_id: Uuid,
    ) -> Result<(cart::Model, cart_item::Model), ServiceError> {
        let cart = Cart::find()
            .filter(cart::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or(ServiceError::EmptyCart)?;

        let line = CartItem::find()
            .filter(cart_item::Column::CartId.eq(cart.id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} is not in the cart", product_id))
            })?;

        Ok((cart, line))
    }
}

async fn touch_cart(db: &DbPool, cart: cart::Model) -> Result<(), ServiceError> {
    let mut active: cart::ActiveModel = cart.into();
    active.updated_at = Set(Utc::now());
    active.update(db).await?;
    Ok(())
}
