//! Stock ledger primitives. The "don't oversell" invariant is enforced at
//! the storage layer: the decrement carries its own floor check and fails
//! the caller's transaction when it would drive stock negative.

use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use tracing::debug;
use uuid::Uuid;

use crate::entities::product::{self, Entity as Product};
use crate::errors::ServiceError;

/// Conditionally decrements a product's stock inside the caller's
/// transaction. The guard (`stock >= quantity`) and the write are one
/// statement, so two competing settlements cannot both pass it.
pub async fn deduct_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    let result = Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        let remaining = Product::find_by_id(product_id)
            .one(conn)
            .await?
            .map(|p| p.stock)
            .unwrap_or(0);
        return Err(ServiceError::InsufficientStock(format!(
            "only {} left in stock for product {}",
            remaining, product_id
        )));
    }

    debug!(%product_id, quantity, "Stock deducted");
    Ok(())
}

/// Restores previously committed stock, used by cancellation and the
/// unpaid-order reclaimer.
pub async fn restore_stock<C: ConnectionTrait>(
    conn: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    Product::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(conn)
        .await?;

    debug!(%product_id, quantity, "Stock restored");
    Ok(())
}
