//! Catalog reads plus variant writes with the derived-price hook.
//!
//! A product's `price` is not authored directly: it is the minimum price
//! over its live (non-deleted) variants, refreshed after every variant
//! write by an explicit call to [`recompute_price`].

use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::domain::{Product, ProductVariant};
use crate::error::{Result, StoreError};

/// Derived product price: minimum over live variants, `None` when the
/// product has no live variants (the stored price is then left untouched).
pub fn recompute_price(variants: &[ProductVariant]) -> Option<Decimal> {
    variants
        .iter()
        .filter(|v| v.deleted_at.is_none())
        .map(|v| v.price)
        .min()
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub category: Option<Uuid>,
    pub search: Option<String>,
}

pub async fn list_products(
    db: &PgPool,
    params: &ListParams,
) -> Result<(Vec<Product>, i64, u32)> {
    let page = params.page.unwrap_or(1).max(1);
    let per_page = params.per_page.unwrap_or(20).min(100);

    let mut query = sqlx::QueryBuilder::new("SELECT * FROM products WHERE deleted_at IS NULL");
    let mut count = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM products WHERE deleted_at IS NULL");
    for builder in [&mut query, &mut count] {
        if let Some(category) = params.category {
            builder.push(" AND category_id = ").push_bind(category);
        }
        if let Some(search) = &params.search {
            builder.push(" AND name ILIKE ").push_bind(format!("%{search}%"));
        }
    }
    query
        .push(" ORDER BY name LIMIT ")
        .push_bind(per_page as i64)
        .push(" OFFSET ")
        .push_bind((page as i64 - 1) * per_page as i64);

    let products = query.build_query_as::<Product>().fetch_all(db).await?;
    let total: (i64,) = count.build_query_as().fetch_one(db).await?;
    Ok((products, total.0, page))
}

pub async fn get_product(db: &PgPool, id: Uuid) -> Result<Product> {
    sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound("product"))
}

/// Looks up the live variant for a (product, size, color) combination.
pub async fn get_variant(
    db: &PgPool,
    product_id: Uuid,
    size: &str,
    color: &str,
) -> Result<ProductVariant> {
    sqlx::query_as::<_, ProductVariant>(
        "SELECT * FROM product_variants
         WHERE product_id = $1 AND size = $2 AND color = $3 AND deleted_at IS NULL",
    )
    .bind(product_id)
    .bind(size)
    .bind(color)
    .fetch_optional(db)
    .await?
    .ok_or(StoreError::NotFound("product variant"))
}

#[derive(Debug, Deserialize)]
pub struct VariantRequest {
    pub size: String,
    pub color: String,
    pub price: Decimal,
    pub remain_quantity: i32,
}

impl VariantRequest {
    fn check(&self) -> Result<()> {
        if self.price < Decimal::ZERO {
            return Err(StoreError::Validation("price must not be negative".into()));
        }
        if self.remain_quantity < 0 {
            return Err(StoreError::Validation(
                "remaining quantity must not be negative".into(),
            ));
        }
        Ok(())
    }
}

pub async fn create_variant(
    db: &PgPool,
    product_id: Uuid,
    req: &VariantRequest,
) -> Result<ProductVariant> {
    req.check()?;
    let mut tx = db.begin().await?;
    // Ensure the parent exists before inserting.
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM products WHERE id = $1 AND deleted_at IS NULL")
        .bind(product_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound("product"))?;

    let variant = sqlx::query_as::<_, ProductVariant>(
        "INSERT INTO product_variants (id, product_id, size, color, price, remain_quantity)
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(product_id)
    .bind(&req.size)
    .bind(&req.color)
    .bind(req.price)
    .bind(req.remain_quantity)
    .fetch_one(&mut *tx)
    .await?;

    refresh_product_price(&mut tx, product_id).await?;
    tx.commit().await?;
    Ok(variant)
}

pub async fn update_variant(db: &PgPool, id: Uuid, req: &VariantRequest) -> Result<ProductVariant> {
    req.check()?;
    let mut tx = db.begin().await?;
    let variant = sqlx::query_as::<_, ProductVariant>(
        "UPDATE product_variants
         SET size = $2, color = $3, price = $4, remain_quantity = $5, updated_at = NOW()
         WHERE id = $1 AND deleted_at IS NULL RETURNING *",
    )
    .bind(id)
    .bind(&req.size)
    .bind(&req.color)
    .bind(req.price)
    .bind(req.remain_quantity)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("product variant"))?;

    refresh_product_price(&mut tx, variant.product_id).await?;
    tx.commit().await?;
    Ok(variant)
}

/// Soft delete. The variant stays referenced by historical order lines.
pub async fn delete_variant(db: &PgPool, id: Uuid) -> Result<()> {
    let mut tx = db.begin().await?;
    let product_id = sqlx::query_scalar::<_, Uuid>(
        "UPDATE product_variants SET deleted_at = NOW(), updated_at = NOW()
         WHERE id = $1 AND deleted_at IS NULL RETURNING product_id",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(StoreError::NotFound("product variant"))?;

    refresh_product_price(&mut tx, product_id).await?;
    tx.commit().await?;
    Ok(())
}

/// Recomputes and persists the parent's derived price inside the caller's
/// transaction.
async fn refresh_product_price(tx: &mut PgConnection, product_id: Uuid) -> Result<()> {
    let variants = sqlx::query_as::<_, ProductVariant>(
        "SELECT * FROM product_variants WHERE product_id = $1",
    )
    .bind(product_id)
    .fetch_all(&mut *tx)
    .await?;

    if let Some(price) = recompute_price(&variants) {
        sqlx::query("UPDATE products SET price = $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(price)
            .execute(&mut *tx)
            .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn variant(price: i64, deleted: bool) -> ProductVariant {
        let now = Utc::now();
        ProductVariant {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            size: "M".into(),
            color: "Red".into(),
            price: Decimal::from(price),
            remain_quantity: 10,
            deleted_at: deleted.then_some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn price_is_minimum_over_live_variants() {
        let variants = vec![variant(150, false), variant(100, false), variant(120, false)];
        assert_eq!(recompute_price(&variants), Some(Decimal::from(100)));
    }

    #[test]
    fn deleted_variants_do_not_count() {
        let variants = vec![variant(50, true), variant(120, false)];
        assert_eq!(recompute_price(&variants), Some(Decimal::from(120)));
    }

    #[test]
    fn no_live_variants_yields_none() {
        assert_eq!(recompute_price(&[]), None);
        assert_eq!(recompute_price(&[variant(50, true)]), None);
    }
}
