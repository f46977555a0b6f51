//! Cart totals and line mutations.
//!
//! Every mutation runs inside one transaction: stock is validated against
//! the live variant, the line is written, then the cart's cached total is
//! recomputed from scratch. The cached total only ever holds the subtotal;
//! shipping and discounts are request-time values.

use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::{Cart, CartLine};
use crate::error::{is_fk_violation, Result, StoreError};
use crate::shipping;

/// One cart line joined with its variant and product, priced live.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LineSummary {
    pub line_id: Uuid,
    pub variant_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub category_id: Uuid,
    pub size: String,
    pub color: String,
    pub unit_price: Decimal,
    pub quantity: i32,
    pub line_total: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartSnapshot {
    pub cart_id: Uuid,
    pub lines: Vec<LineSummary>,
    pub subtotal: Decimal,
    pub shipping_fee: Decimal,
    pub total: Decimal,
}

/// Sum of line subtotals; zero for an empty cart.
pub fn subtotal(lines: &[LineSummary]) -> Decimal {
    lines.iter().map(|line| line.line_total).sum()
}

/// Fetches the user's cart, creating an empty one on first use. An unknown
/// user comes back as `NotFound`, not as a foreign-key failure.
pub async fn get_or_create_cart(db: &PgPool, user_id: Uuid) -> Result<Cart> {
    sqlx::query_as::<_, Cart>(
        "INSERT INTO carts (id, user_id) VALUES ($1, $2)
         ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .fetch_one(db)
    .await
    .map_err(|err| {
        if is_fk_violation(&err) {
            StoreError::NotFound("user")
        } else {
            err.into()
        }
    })
}

pub async fn load_lines(conn: &mut PgConnection, cart_id: Uuid) -> Result<Vec<LineSummary>> {
    sqlx::query_as::<_, LineSummary>(
        "SELECT cl.id AS line_id, v.id AS variant_id, p.id AS product_id,
                p.name AS product_name, p.category_id, v.size, v.color,
                v.price AS unit_price, cl.quantity,
                (v.price * cl.quantity) AS line_total
         FROM cart_lines cl
         JOIN product_variants v ON v.id = cl.variant_id
         JOIN products p ON p.id = v.product_id
         WHERE cl.cart_id = $1
         ORDER BY cl.created_at",
    )
    .bind(cart_id)
    .fetch_all(conn)
    .await
    .map_err(Into::into)
}

/// Prices the user's cart: live line totals, subtotal, address-tiered
/// shipping fee and the grand total. Persists `cart.total = subtotal` as a
/// side effect; shipping and discounts are never stored on the cart row.
pub async fn compute_totals(db: &PgPool, config: &Config, user_id: Uuid) -> Result<CartSnapshot> {
    let cart = get_or_create_cart(db, user_id).await?;
    let address = sqlx::query_scalar::<_, String>("SELECT default_address FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound("user"))?;

    let mut conn = db.acquire().await?;
    let lines = load_lines(&mut conn, cart.id).await?;
    let subtotal = subtotal(&lines);

    sqlx::query("UPDATE carts SET total = $2, updated_at = NOW() WHERE id = $1")
        .bind(cart.id)
        .bind(subtotal)
        .execute(db)
        .await?;

    let shipping_fee = shipping::shipping_fee(&address, config);
    Ok(CartSnapshot {
        cart_id: cart.id,
        lines,
        subtotal,
        shipping_fee,
        total: subtotal + shipping_fee,
    })
}

/// Adds a variant to the cart, merging with an existing line for the same
/// variant. Returns the number of distinct lines in the cart.
pub async fn add_line(db: &PgPool, user_id: Uuid, variant_id: Uuid, quantity: i32) -> Result<i64> {
    if quantity < 1 {
        return Err(StoreError::Validation("quantity must be at least 1".into()));
    }
    let cart = get_or_create_cart(db, user_id).await?;
    let mut tx = db.begin().await?;

    let remain = sqlx::query_scalar::<_, i32>(
        "SELECT remain_quantity FROM product_variants
         WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
    )
    .bind(variant_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("product variant"))?;

    let existing = sqlx::query_as::<_, CartLine>(
        "SELECT * FROM cart_lines WHERE cart_id = $1 AND variant_id = $2 FOR UPDATE",
    )
    .bind(cart.id)
    .bind(variant_id)
    .fetch_optional(&mut *tx)
    .await?;

    let requested = quantity + existing.as_ref().map_or(0, |line| line.quantity);
    if requested > remain {
        return Err(StoreError::StockExceeded);
    }

    match existing {
        Some(line) => {
            sqlx::query("UPDATE cart_lines SET quantity = $2, updated_at = NOW() WHERE id = $1")
                .bind(line.id)
                .bind(requested)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query(
                "INSERT INTO cart_lines (id, cart_id, variant_id, quantity) VALUES ($1, $2, $3, $4)",
            )
            .bind(Uuid::now_v7())
            .bind(cart.id)
            .bind(variant_id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
    }

    recompute_cart_total(&mut tx, cart.id).await?;
    let cart_length =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM cart_lines WHERE cart_id = $1")
            .bind(cart.id)
            .fetch_one(&mut *tx)
            .await?;
    tx.commit().await?;
    Ok(cart_length)
}

/// Updates a line's quantity and optionally switches it to a sibling
/// variant (size/color change). Merges into an existing line when the
/// switch lands on a variant already in the cart.
pub async fn update_line(
    db: &PgPool,
    user_id: Uuid,
    line_id: Uuid,
    quantity: i32,
    size: Option<&str>,
    color: Option<&str>,
) -> Result<()> {
    if quantity < 1 {
        return Err(StoreError::Validation("quantity must be at least 1".into()));
    }
    let mut tx = db.begin().await?;

    let line = sqlx::query_as::<_, CartLine>(
        "SELECT cl.* FROM cart_lines cl
         JOIN carts c ON c.id = cl.cart_id
         WHERE cl.id = $1 AND c.user_id = $2 FOR UPDATE OF cl",
    )
    .bind(line_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("cart line"))?;

    let current = sqlx::query_as::<_, crate::domain::ProductVariant>(
        "SELECT * FROM product_variants WHERE id = $1",
    )
    .bind(line.variant_id)
    .fetch_one(&mut *tx)
    .await?;

    let target = match (size, color) {
        (None, None) => current,
        (size, color) => sqlx::query_as::<_, crate::domain::ProductVariant>(
            "SELECT * FROM product_variants
             WHERE product_id = $1 AND size = $2 AND color = $3 AND deleted_at IS NULL
             FOR UPDATE",
        )
        .bind(current.product_id)
        .bind(size.unwrap_or(current.size.as_str()))
        .bind(color.unwrap_or(current.color.as_str()))
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound("product variant"))?,
    };

    // A switch may land on a variant that already has its own line; the two
    // lines merge and the combined quantity is checked against stock.
    let sibling = sqlx::query_as::<_, CartLine>(
        "SELECT * FROM cart_lines
         WHERE cart_id = $1 AND variant_id = $2 AND id <> $3 FOR UPDATE",
    )
    .bind(line.cart_id)
    .bind(target.id)
    .bind(line.id)
    .fetch_optional(&mut *tx)
    .await?;

    let merged = quantity + sibling.as_ref().map_or(0, |s| s.quantity);
    if merged > target.remain_quantity {
        return Err(StoreError::StockExceeded);
    }

    match sibling {
        Some(sibling) => {
            sqlx::query("DELETE FROM cart_lines WHERE id = $1")
                .bind(line.id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE cart_lines SET quantity = $2, updated_at = NOW() WHERE id = $1")
                .bind(sibling.id)
                .bind(merged)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            sqlx::query(
                "UPDATE cart_lines SET variant_id = $2, quantity = $3, updated_at = NOW()
                 WHERE id = $1",
            )
            .bind(line.id)
            .bind(target.id)
            .bind(quantity)
            .execute(&mut *tx)
            .await?;
        }
    }

    recompute_cart_total(&mut tx, line.cart_id).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn remove_line(db: &PgPool, user_id: Uuid, line_id: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;
    let cart_id = sqlx::query_scalar::<_, Uuid>(
        "DELETE FROM cart_lines cl
         USING carts c
         WHERE cl.id = $1 AND cl.cart_id = c.id AND c.user_id = $2
         RETURNING cl.cart_id",
    )
    .bind(line_id)
    .bind(user_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("cart line"))?;

    recompute_cart_total(&mut tx, cart_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Rewrites the cached total from the live lines. Never increments: drift
/// between the cache and the lines cannot survive a mutation.
async fn recompute_cart_total(tx: &mut PgConnection, cart_id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE carts SET total = COALESCE((
             SELECT SUM(v.price * cl.quantity)
             FROM cart_lines cl
             JOIN product_variants v ON v.id = cl.variant_id
             WHERE cl.cart_id = carts.id
         ), 0), updated_at = NOW()
         WHERE id = $1",
    )
    .bind(cart_id)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(price: i64, quantity: i32) -> LineSummary {
        LineSummary {
            line_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Test Product".into(),
            category_id: Uuid::new_v4(),
            size: "M".into(),
            color: "Red".into(),
            unit_price: Decimal::from(price),
            quantity,
            line_total: Decimal::from(price) * Decimal::from(quantity),
        }
    }

    #[test]
    fn subtotal_sums_line_totals() {
        let lines = vec![line(100, 2), line(150, 1)];
        assert_eq!(subtotal(&lines), Decimal::from(350));
    }

    #[test]
    fn empty_cart_has_zero_subtotal() {
        assert_eq!(subtotal(&[]), Decimal::ZERO);
    }

    #[test]
    fn worked_example_known_city() {
        // One line priced 100 x 2, address in a known city.
        let config = Config::default();
        let lines = vec![line(100, 2)];
        let subtotal = subtotal(&lines);
        let fee = shipping::shipping_fee("Hồ Chí Minh", &config);
        assert_eq!(subtotal, Decimal::from(200));
        assert_eq!(fee, Decimal::from(15_000));
        assert_eq!(subtotal + fee, Decimal::from(15_200));
    }
}
