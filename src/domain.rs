//! Row types and shared enums.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub default_address: String,
    pub default_phone_number: String,
    pub is_active: bool,
    pub is_banned: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PendingVerification {
    pub nonce: Uuid,
    pub user_id: Uuid,
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl PendingVerification {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub category_id: Uuid,
    pub description: String,
    /// Derived: minimum price across live variants, NULL when none exist.
    pub price: Option<Decimal>,
    pub average_rating: f64,
    pub sold_quantity: i32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProductVariant {
    pub id: Uuid,
    pub product_id: Uuid,
    pub size: String,
    pub color: String,
    pub price: Decimal,
    pub remain_quantity: i32,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Cart {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Cached sum of line subtotals. Always recomputed from the live lines
    /// after a mutation, never incremented in place.
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Voucher {
    pub id: Uuid,
    /// Percentage in [0, 100].
    pub discount: Decimal,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub min_amount: Decimal,
    /// Either global or assigned to exactly one user, never both.
    pub is_global: bool,
    pub user_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Voucher {
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.started_at <= now && now < self.ended_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address: String,
    pub phone_number: String,
    pub voucher_id: Option<Uuid>,
    pub status: String,
    pub note: Option<String>,
    pub total: Decimal,
    pub payment_method: String,
    pub expired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderLine {
    pub id: Uuid,
    pub order_id: Uuid,
    pub variant_id: Uuid,
    pub quantity: i32,
    /// Variant price snapshotted at placement time.
    pub unit_price: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Order lifecycle. Stored as its wire string in the `orders.status` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Wait_for_pay")]
    WaitForPay,
    #[serde(rename = "Wait_for_preparing")]
    WaitForPreparing,
    #[serde(rename = "Wait_for_delivery")]
    WaitForDelivery,
    #[serde(rename = "Completed")]
    Completed,
    #[serde(rename = "Cancelled")]
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WaitForPay => "Wait_for_pay",
            Self::WaitForPreparing => "Wait_for_preparing",
            Self::WaitForDelivery => "Wait_for_delivery",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "Wait_for_pay" => Some(Self::WaitForPay),
            "Wait_for_preparing" => Some(Self::WaitForPreparing),
            "Wait_for_delivery" => Some(Self::WaitForDelivery),
            "Completed" => Some(Self::Completed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// First state after placement. Cash on delivery skips the payment wait.
    pub fn initial_for(method: PaymentMethod) -> Self {
        match method {
            PaymentMethod::Cash => Self::WaitForPreparing,
            PaymentMethod::Visa | PaymentMethod::Bank => Self::WaitForPay,
        }
    }

    /// Cancellation is allowed until delivery begins.
    pub fn can_cancel(self) -> bool {
        matches!(self, Self::WaitForPay | Self::WaitForPreparing)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentMethod {
    Cash,
    Visa,
    Bank,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cash => "CASH",
            Self::Visa => "VISA",
            Self::Bank => "BANK",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CASH" => Some(Self::Cash),
            "VISA" => Some(Self::Visa),
            "BANK" => Some(Self::Bank),
            _ => None,
        }
    }

    /// Prepaid orders carry a payment deadline; cash on delivery does not.
    pub fn is_prepaid(self) -> bool {
        matches!(self, Self::Visa | Self::Bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn initial_status_depends_on_payment_method() {
        assert_eq!(
            OrderStatus::initial_for(PaymentMethod::Cash),
            OrderStatus::WaitForPreparing
        );
        assert_eq!(
            OrderStatus::initial_for(PaymentMethod::Visa),
            OrderStatus::WaitForPay
        );
        assert_eq!(
            OrderStatus::initial_for(PaymentMethod::Bank),
            OrderStatus::WaitForPay
        );
    }

    #[test]
    fn cancellation_allowed_before_delivery_only() {
        assert!(OrderStatus::WaitForPay.can_cancel());
        assert!(OrderStatus::WaitForPreparing.can_cancel());
        assert!(!OrderStatus::WaitForDelivery.can_cancel());
        assert!(!OrderStatus::Completed.can_cancel());
        assert!(!OrderStatus::Cancelled.can_cancel());
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            OrderStatus::WaitForPay,
            OrderStatus::WaitForPreparing,
            OrderStatus::WaitForDelivery,
            OrderStatus::Completed,
            OrderStatus::Cancelled,
        ] {
            assert_eq!(OrderStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(OrderStatus::parse("Refunded"), None);
    }

    #[test]
    fn voucher_window_is_half_open() {
        let now = Utc::now();
        let voucher = Voucher {
            id: Uuid::new_v4(),
            discount: Decimal::from(10),
            started_at: now - Duration::days(1),
            ended_at: now + Duration::days(1),
            min_amount: Decimal::ZERO,
            is_global: true,
            user_id: None,
            created_at: now,
        };
        assert!(voucher.is_active(now));
        assert!(voucher.is_active(voucher.started_at));
        assert!(!voucher.is_active(voucher.ended_at));
    }
}
