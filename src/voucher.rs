//! Voucher eligibility and the percentage-discount preview.
//!
//! `apply` is a preview: it never writes a redemption record or touches the
//! cart. Redemptions are recorded once, inside the order-placement
//! transaction, which is what keeps "already used" out of future
//! eligibility queries.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::cart::{self, LineSummary};
use crate::domain::Voucher;
use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize)]
pub struct VoucherSummary {
    pub id: Uuid,
    pub discount: Decimal,
    pub min_amount: Decimal,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub is_global: bool,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountResult {
    pub voucher_id: Uuid,
    pub discount: Decimal,
    pub total_price_voucher: Decimal,
    pub total_price_other: Decimal,
    pub discount_amount: Decimal,
    pub final_price: Decimal,
}

/// Splits the cart value into the part the voucher's categories cover and
/// the rest.
pub fn partition_by_category(
    lines: &[LineSummary],
    voucher_categories: &HashSet<Uuid>,
) -> (Decimal, Decimal) {
    lines.iter().fold(
        (Decimal::ZERO, Decimal::ZERO),
        |(eligible, other), line| {
            if voucher_categories.contains(&line.category_id) {
                (eligible + line.line_total, other)
            } else {
                (eligible, other + line.line_total)
            }
        },
    )
}

/// `discount`% off the eligible part only; the rest passes through.
pub fn discount_breakdown(eligible: Decimal, other: Decimal, discount: Decimal) -> (Decimal, Decimal) {
    let discount_amount = eligible * discount / Decimal::from(100);
    (discount_amount, eligible - discount_amount + other)
}

/// The minimum applies to the cart value the voucher's categories cover,
/// never the whole cart: a cheap eligible basket cannot ride on expensive
/// unrelated lines. `list_available` and `apply` both enforce this.
pub fn meets_minimum(
    lines: &[LineSummary],
    voucher_categories: &HashSet<Uuid>,
    min_amount: Decimal,
) -> bool {
    let (eligible, _) = partition_by_category(lines, voucher_categories);
    min_amount <= eligible
}

/// Vouchers the user could apply to the current cart, best discount first.
pub async fn list_available(db: &PgPool, user_id: Uuid) -> Result<Vec<VoucherSummary>> {
    let cart = cart::get_or_create_cart(db, user_id).await?;
    let mut conn = db.acquire().await?;
    let lines = cart::load_lines(&mut conn, cart.id).await?;
    drop(conn);
    if lines.is_empty() {
        return Ok(vec![]);
    }

    let cart_categories: Vec<Uuid> = lines
        .iter()
        .map(|line| line.category_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();

    // Category intersection, active window, ownership and redemption history
    // are filtered in SQL; the min-amount rule needs the priced cart lines.
    let mut vouchers = sqlx::query_as::<_, Voucher>(
        "SELECT DISTINCT vo.* FROM vouchers vo
         JOIN voucher_categories vc ON vc.voucher_id = vo.id
         WHERE vc.category_id = ANY($1)
           AND vo.started_at <= NOW() AND NOW() < vo.ended_at
           AND (vo.is_global OR vo.user_id = $2)
           AND NOT EXISTS (
               SELECT 1 FROM voucher_redemptions r
               WHERE r.voucher_id = vo.id AND r.user_id = $2
           )",
    )
    .bind(&cart_categories)
    .bind(user_id)
    .fetch_all(db)
    .await?;

    let ids: Vec<Uuid> = vouchers.iter().map(|v| v.id).collect();
    let categories = category_index(db, &ids).await?;

    vouchers.retain(|voucher| {
        categories
            .get(&voucher.id)
            .is_some_and(|c| meets_minimum(&lines, &c.ids, voucher.min_amount))
    });
    vouchers.sort_by(|a, b| b.discount.cmp(&a.discount));

    Ok(vouchers
        .into_iter()
        .map(|voucher| VoucherSummary {
            id: voucher.id,
            discount: voucher.discount,
            min_amount: voucher.min_amount,
            started_at: voucher.started_at,
            ended_at: voucher.ended_at,
            is_global: voucher.is_global,
            categories: categories
                .get(&voucher.id)
                .map(|c| c.names.clone())
                .unwrap_or_default(),
        })
        .collect())
}

#[derive(Default)]
struct VoucherCategories {
    ids: HashSet<Uuid>,
    names: Vec<String>,
}

async fn category_index(
    db: &PgPool,
    voucher_ids: &[Uuid],
) -> Result<HashMap<Uuid, VoucherCategories>> {
    let rows = sqlx::query_as::<_, (Uuid, Uuid, String)>(
        "SELECT vc.voucher_id, vc.category_id, c.name
         FROM voucher_categories vc
         JOIN categories c ON c.id = vc.category_id
         WHERE vc.voucher_id = ANY($1)
         ORDER BY c.name",
    )
    .bind(voucher_ids)
    .fetch_all(db)
    .await?;

    let mut index: HashMap<Uuid, VoucherCategories> = HashMap::new();
    for (voucher_id, category_id, name) in rows {
        let entry = index.entry(voucher_id).or_default();
        entry.ids.insert(category_id);
        entry.names.push(name);
    }
    Ok(index)
}

pub async fn voucher_category_ids(db: &PgPool, voucher_id: Uuid) -> Result<HashSet<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT category_id FROM voucher_categories WHERE voucher_id = $1",
    )
    .bind(voucher_id)
    .fetch_all(db)
    .await?;
    Ok(ids.into_iter().collect())
}

/// Re-checks everything the client might lie about: the voucher exists, its
/// window contains `now`, it belongs to this user (or is global) and the
/// user has not redeemed it yet.
pub async fn validate_for_user(db: &PgPool, user_id: Uuid, voucher_id: Uuid) -> Result<Voucher> {
    let voucher = sqlx::query_as::<_, Voucher>("SELECT * FROM vouchers WHERE id = $1")
        .bind(voucher_id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound("voucher"))?;

    if !voucher.is_active(Utc::now()) {
        return Err(StoreError::Validation("voucher is not active".into()));
    }
    if !voucher.is_global && voucher.user_id != Some(user_id) {
        return Err(StoreError::Validation(
            "voucher is not available for this user".into(),
        ));
    }
    let redeemed = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM voucher_redemptions WHERE user_id = $1 AND voucher_id = $2",
    )
    .bind(user_id)
    .bind(voucher_id)
    .fetch_one(db)
    .await?;
    if redeemed > 0 {
        return Err(StoreError::Validation("voucher already used".into()));
    }
    Ok(voucher)
}

/// Discount preview against the current cart. Pure read: calling it twice
/// with the same cart yields the same numbers.
///
/// The caller-supplied `claimed_min` is informational only; the voucher's
/// own minimum is what gets enforced.
pub async fn apply(
    db: &PgPool,
    user_id: Uuid,
    voucher_id: Uuid,
    claimed_min: Decimal,
) -> Result<DiscountResult> {
    let voucher = validate_for_user(db, user_id, voucher_id).await?;
    if claimed_min != voucher.min_amount {
        tracing::debug!(%voucher_id, %claimed_min, actual = %voucher.min_amount,
            "client-claimed voucher minimum ignored");
    }

    let cart = cart::get_or_create_cart(db, user_id).await?;
    let mut conn = db.acquire().await?;
    let lines = cart::load_lines(&mut conn, cart.id).await?;
    drop(conn);

    let categories = voucher_category_ids(db, voucher_id).await?;
    let (eligible, other) = partition_by_category(&lines, &categories);
    if eligible < voucher.min_amount {
        return Err(StoreError::BelowMinimumAmount);
    }

    let (discount_amount, final_price) = discount_breakdown(eligible, other, voucher.discount);
    Ok(DiscountResult {
        voucher_id,
        discount: voucher.discount,
        total_price_voucher: eligible,
        total_price_other: other,
        discount_amount,
        final_price,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(category_id: Uuid, price: i64, quantity: i32) -> LineSummary {
        LineSummary {
            line_id: Uuid::new_v4(),
            variant_id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            product_name: "Test Product".into(),
            category_id,
            size: "M".into(),
            color: "Red".into(),
            unit_price: Decimal::from(price),
            quantity,
            line_total: Decimal::from(price) * Decimal::from(quantity),
        }
    }

    #[test]
    fn partitions_lines_by_voucher_categories() {
        let shirts = Uuid::new_v4();
        let shoes = Uuid::new_v4();
        let lines = vec![line(shirts, 100, 2), line(shoes, 300, 1)];
        let categories: HashSet<Uuid> = [shirts].into_iter().collect();

        let (eligible, other) = partition_by_category(&lines, &categories);
        assert_eq!(eligible, Decimal::from(200));
        assert_eq!(other, Decimal::from(300));
    }

    #[test]
    fn minimum_is_checked_against_eligible_lines_only() {
        let shirts = Uuid::new_v4();
        let shoes = Uuid::new_v4();
        // Eligible lines are worth 300; the other 400 in the cart must not
        // help a voucher over its minimum.
        let lines = vec![line(shirts, 100, 3), line(shoes, 200, 2)];
        let categories = HashSet::from([shirts]);

        assert!(!meets_minimum(&lines, &categories, Decimal::from(500)));
        assert!(meets_minimum(&lines, &categories, Decimal::from(300)));
        assert!(meets_minimum(&lines, &categories, Decimal::ZERO));
    }

    #[test]
    fn discount_hits_eligible_part_only() {
        let (amount, final_price) =
            discount_breakdown(Decimal::from(200), Decimal::from(300), Decimal::from(10));
        assert_eq!(amount, Decimal::from(20));
        assert_eq!(final_price, Decimal::from(480));
    }

    #[test]
    fn zero_and_full_discounts() {
        let (amount, final_price) =
            discount_breakdown(Decimal::from(200), Decimal::ZERO, Decimal::ZERO);
        assert_eq!(amount, Decimal::ZERO);
        assert_eq!(final_price, Decimal::from(200));

        let (amount, final_price) =
            discount_breakdown(Decimal::from(200), Decimal::from(50), Decimal::from(100));
        assert_eq!(amount, Decimal::from(200));
        assert_eq!(final_price, Decimal::from(50));
    }

    #[test]
    fn breakdown_is_deterministic() {
        let first = discount_breakdown(Decimal::from(150), Decimal::from(75), Decimal::from(25));
        let second = discount_breakdown(Decimal::from(150), Decimal::from(75), Decimal::from(25));
        assert_eq!(first, second);
    }

    #[test]
    fn empty_cart_partitions_to_zero() {
        let categories: HashSet<Uuid> = HashSet::new();
        let (eligible, other) = partition_by_category(&[], &categories);
        assert_eq!(eligible, Decimal::ZERO);
        assert_eq!(other, Decimal::ZERO);
    }
}
