//! Order placement, cancellation and filtered history.
//!
//! Placement recomputes everything server-side and commits as one
//! transaction: per-line stock re-check, stock decrement, order + line
//! snapshot, optional voucher redemption, cart clearing. Any failure rolls
//! the whole thing back; no partial order can exist.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cart;
use crate::config::Config;
use crate::domain::{Order, OrderStatus, PaymentMethod};
use crate::error::{is_unique_violation, Result, StoreError};
use crate::notify::{Notification, Notifier};
use crate::shipping;
use crate::voucher;

#[derive(Debug, Clone)]
pub struct PlacementDetails {
    pub address: String,
    pub phone_number: String,
    pub payment_method: PaymentMethod,
    pub note: Option<String>,
    pub voucher_id: Option<Uuid>,
}

/// Typed criteria for order-history queries; absent fields match anything.
#[derive(Debug, Default, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub placed_after: Option<DateTime<Utc>>,
    pub placed_before: Option<DateTime<Utc>>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if let Some(status) = self.status {
            if OrderStatus::parse(&order.status) != Some(status) {
                return false;
            }
        }
        if let Some(after) = self.placed_after {
            if order.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.placed_before {
            if order.created_at >= before {
                return false;
            }
        }
        true
    }
}

pub async fn place_order(
    db: &PgPool,
    config: &Config,
    notifier: &Notifier,
    user_id: Uuid,
    details: PlacementDetails,
) -> Result<Order> {
    if details.address.trim().is_empty() {
        return Err(StoreError::Validation("delivery address is required".into()));
    }

    // Never trust client-submitted totals: price the cart fresh.
    let snapshot = cart::compute_totals(db, config, user_id).await?;
    if snapshot.lines.is_empty() {
        return Err(StoreError::Conflict("cart is empty"));
    }

    // Shipping is tiered on the submitted delivery address, not the profile
    // default the cart preview used.
    let shipping_fee = shipping::shipping_fee(&details.address, config);

    let mut discount_amount = Decimal::ZERO;
    let mut voucher_row = None;
    if let Some(voucher_id) = details.voucher_id {
        let voucher = voucher::validate_for_user(db, user_id, voucher_id).await?;
        let categories = voucher::voucher_category_ids(db, voucher_id).await?;
        let (eligible, _) = voucher::partition_by_category(&snapshot.lines, &categories);
        if eligible < voucher.min_amount {
            return Err(StoreError::BelowMinimumAmount);
        }
        discount_amount = eligible * voucher.discount / Decimal::from(100);
        voucher_row = Some(voucher);
    }

    let total = snapshot.subtotal - discount_amount + shipping_fee;
    let status = OrderStatus::initial_for(details.payment_method);
    let expired_at = details
        .payment_method
        .is_prepaid()
        .then(|| Utc::now() + config.payment_grace);

    let mut tx = db.begin().await?;

    // Authoritative stock check: a variant may have been exhausted between
    // cart-add and checkout. Any oversold line fails the whole order.
    for line in &snapshot.lines {
        let remain = sqlx::query_scalar::<_, i32>(
            "SELECT remain_quantity FROM product_variants WHERE id = $1 FOR UPDATE",
        )
        .bind(line.variant_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound("product variant"))?;
        if line.quantity > remain {
            return Err(StoreError::StockExceeded);
        }
        sqlx::query(
            "UPDATE product_variants
             SET remain_quantity = remain_quantity - $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(line.variant_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE products SET sold_quantity = sold_quantity + $2, updated_at = NOW()
             WHERE id = $1",
        )
        .bind(line.product_id)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
    }

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, user_id, address, phone_number, voucher_id, status, note,
                             total, payment_method, expired_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(&details.address)
    .bind(&details.phone_number)
    .bind(details.voucher_id)
    .bind(status.as_str())
    .bind(&details.note)
    .bind(total)
    .bind(details.payment_method.as_str())
    .bind(expired_at)
    .fetch_one(&mut *tx)
    .await?;

    for line in &snapshot.lines {
        sqlx::query(
            "INSERT INTO order_lines (id, order_id, variant_id, quantity, unit_price)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id)
        .bind(line.variant_id)
        .bind(line.quantity)
        .bind(line.unit_price)
        .execute(&mut *tx)
        .await?;
    }

    if let Some(voucher) = &voucher_row {
        // Revalidation ran before the transaction; two concurrent placements
        // with the same voucher settle here, on the unique index.
        sqlx::query(
            "INSERT INTO voucher_redemptions (id, user_id, voucher_id) VALUES ($1, $2, $3)",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(voucher.id)
        .execute(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Validation("voucher already used".into())
            } else {
                err.into()
            }
        })?;
    }

    sqlx::query("DELETE FROM cart_lines WHERE cart_id = $1")
        .bind(snapshot.cart_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE carts SET total = 0, updated_at = NOW() WHERE id = $1")
        .bind(snapshot.cart_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    // Best effort, after the commit: a lost notification never unwinds an
    // order.
    let email = sqlx::query_scalar::<_, String>("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await
        .ok()
        .flatten()
        .unwrap_or_default();
    notifier
        .send(Notification::OrderConfirmed {
            order_id: order.id,
            user_id,
            email,
            total: order.total,
        })
        .await;

    Ok(order)
}

/// Cancels while the status still allows it; delivery, completion and prior
/// cancellation all make the order final.
pub async fn cancel_order(db: &PgPool, user_id: Uuid, order_id: Uuid) -> Result<Order> {
    let mut tx = db.begin().await?;
    let order = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE id = $1 AND user_id = $2 FOR UPDATE",
    )
    .bind(order_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("order"))?;

    let status = OrderStatus::parse(&order.status)
        .ok_or_else(|| StoreError::Validation("order has an unknown status".into()))?;
    if !status.can_cancel() {
        return Err(StoreError::Conflict("order can no longer be cancelled"));
    }

    let cancelled = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(order.id)
    .bind(OrderStatus::Cancelled.as_str())
    .fetch_one(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(cancelled)
}

/// The user's orders, newest first, narrowed by the typed criteria.
pub async fn list_orders(db: &PgPool, user_id: Uuid, filter: &OrderFilter) -> Result<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(orders.into_iter().filter(|o| filter.matches(o)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn order(status: OrderStatus, placed: DateTime<Utc>) -> Order {
        Order {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            address: "Hà Nội".into(),
            phone_number: "0123456789".into(),
            voucher_id: None,
            status: status.as_str().to_string(),
            note: None,
            total: Decimal::from(15_200),
            payment_method: PaymentMethod::Cash.as_str().to_string(),
            expired_at: None,
            created_at: placed,
            updated_at: placed,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = OrderFilter::default();
        assert!(filter.matches(&order(OrderStatus::Completed, Utc::now())));
        assert!(filter.matches(&order(OrderStatus::WaitForPay, Utc::now())));
    }

    #[test]
    fn filters_by_status() {
        let filter = OrderFilter {
            status: Some(OrderStatus::Cancelled),
            ..Default::default()
        };
        assert!(filter.matches(&order(OrderStatus::Cancelled, Utc::now())));
        assert!(!filter.matches(&order(OrderStatus::Completed, Utc::now())));
    }

    #[test]
    fn filters_by_date_window() {
        let now = Utc::now();
        let filter = OrderFilter {
            placed_after: Some(now - Duration::days(7)),
            placed_before: Some(now),
            ..Default::default()
        };
        assert!(filter.matches(&order(OrderStatus::Completed, now - Duration::days(1))));
        assert!(!filter.matches(&order(OrderStatus::Completed, now - Duration::days(30))));
        assert!(!filter.matches(&order(OrderStatus::Completed, now)));
    }
}
