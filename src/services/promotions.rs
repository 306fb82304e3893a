use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter, Set,
};
use tracing::debug;
use uuid::Uuid;

use crate::entities::promotion::{self, DiscountType, Entity as Promotion, Model as PromotionModel};
use crate::entities::promotion_usage::{self, Entity as PromotionUsage};
use crate::errors::ServiceError;

/// Validates a promotion for a checkout and computes the discount it grants.
///
/// Gating: public, inside `[start_date, end_date]`, under its usage limit,
/// never redeemed by this user, and subtotal at or above the minimum order
/// amount. Every failure is reported as `PromotionInvalid` with a reason the
/// storefront can show.
pub async fn validate_for_checkout<C: ConnectionTrait>(
    conn: &C,
    promotion_id: Uuid,
    user_id: Uuid,
    sub_total: Decimal,
    now: DateTime<Utc>,
) -> Result<(PromotionModel, Decimal), ServiceError> {
    let promo = Promotion::find_by_id(promotion_id)
        .one(conn)
        .await?
        .filter(|p| p.is_public)
        .ok_or_else(|| ServiceError::PromotionInvalid("promotion not found".to_string()))?;

    if now < promo.start_date || now > promo.end_date {
        return Err(ServiceError::PromotionInvalid(
            "promotion is not currently active".to_string(),
        ));
    }

    if let Some(limit) = promo.usage_limit {
        if promo.used_count >= limit {
            return Err(ServiceError::PromotionInvalid(
                "promotion usage limit reached".to_string(),
            ));
        }
    }

    let already_used = PromotionUsage::find()
        .filter(promotion_usage::Column::PromotionId.eq(promotion_id))
        .filter(promotion_usage::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .is_some();
    if already_used {
        return Err(ServiceError::PromotionInvalid(
            "promotion already redeemed by this account".to_string(),
        ));
    }

    if sub_total < promo.minimum_order_amount {
        return Err(ServiceError::PromotionInvalid(format!(
            "order subtotal is below the promotion minimum of {}",
            promo.minimum_order_amount
        )));
    }

    let discount = calculate_discount(&promo, sub_total);
    Ok((promo, discount))
}

/// Computes the discount a promotion grants on a subtotal, capped at the
/// subtotal and floored at zero.
pub fn calculate_discount(promo: &PromotionModel, sub_total: Decimal) -> Decimal {
    let discount = match promo.discount_type {
        DiscountType::Percentage => sub_total * promo.discount_value / Decimal::from(100),
        DiscountType::FixedAmount => promo.discount_value,
    };
    discount.min(sub_total).max(Decimal::ZERO)
}

/// Records a redemption inside the settlement transaction: re-checks the
/// per-user uniqueness, inserts the usage row and advances `used_count`
/// through a conditional increment gated on the usage limit.
pub async fn record_usage<C: ConnectionTrait>(
    conn: &C,
    promotion_id: Uuid,
    user_id: Uuid,
    order_id: Uuid,
    discount_amount: Decimal,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let already_used = PromotionUsage::find()
        .filter(promotion_usage::Column::PromotionId.eq(promotion_id))
        .filter(promotion_usage::Column::UserId.eq(user_id))
        .one(conn)
        .await?
        .is_some();
    if already_used {
        return Err(ServiceError::PromotionInvalid(
            "promotion already redeemed by this account".to_string(),
        ));
    }

    let result = Promotion::update_many()
        .col_expr(
            promotion::Column::UsedCount,
            Expr::col(promotion::Column::UsedCount).add(1),
        )
        .filter(promotion::Column::Id.eq(promotion_id))
        .filter(
            Condition::any()
                .add(promotion::Column::UsageLimit.is_null())
                .add(
                    Expr::col(promotion::Column::UsedCount)
                        .lt(Expr::col(promotion::Column::UsageLimit)),
                ),
        )
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::PromotionInvalid(
            "promotion usage limit reached".to_string(),
        ));
    }

    promotion_usage::ActiveModel {
        id: Set(Uuid::new_v4()),
        promotion_id: Set(promotion_id),
        user_id: Set(user_id),
        order_id: Set(order_id),
        discount_amount: Set(discount_amount),
        created_at: Set(now),
    }
    .insert(conn)
    .await?;

    debug!(%promotion_id, %user_id, %order_id, "Promotion redeemed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn promo(discount_type: DiscountType, value: Decimal) -> PromotionModel {
        let now = Utc::now();
        PromotionModel {
            id: Uuid::new_v4(),
            code: "SAVE10".to_string(),
            name: "Ten percent off".to_string(),
            is_public: true,
            start_date: now - chrono::Duration::days(1),
            end_date: now + chrono::Duration::days(30),
            discount_type,
            discount_value: value,
            minimum_order_amount: dec!(50),
            usage_limit: Some(100),
            used_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn percentage_discount() {
        let p = promo(DiscountType::Percentage, dec!(10));
        assert_eq!(calculate_discount(&p, dec!(200)), dec!(20));
    }

    #[test]
    fn fixed_discount_is_capped_at_subtotal() {
        let p = promo(DiscountType::FixedAmount, dec!(500));
        assert_eq!(calculate_discount(&p, dec!(120)), dec!(120));
    }

    #[test]
    fn discount_never_goes_negative() {
        let p = promo(DiscountType::FixedAmount, dec!(-5));
        assert_eq!(calculate_discount(&p, dec!(100)), Decimal::ZERO);
    }
}
