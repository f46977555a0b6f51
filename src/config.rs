//! Runtime configuration, read once from the environment at startup.

use chrono::Duration;
use rust_decimal::Decimal;

/// Cities served by the cheap shipping tier. Stored pre-normalized
/// (lowercase, no diacritics) so address matching stays a plain substring
/// test.
const DEFAULT_CITIES: &[&str] = &["ha noi", "ho chi minh", "da nang", "hai phong", "can tho"];

const DEFAULT_FEE_KNOWN_CITY: i64 = 15_000;
const DEFAULT_FEE_UNKNOWN_CITY: i64 = 25_000;
const DEFAULT_PAYMENT_GRACE_HOURS: i64 = 24;
const OTP_TTL_MINUTES: i64 = 3;

#[derive(Clone, Debug)]
pub struct Config {
    /// City names eligible for the low shipping fee.
    pub known_cities: Vec<String>,
    /// Flat fee when the delivery address matches a known city.
    pub shipping_fee_known: Decimal,
    /// Flat fee for everywhere else.
    pub shipping_fee_unknown: Decimal,
    /// How long a prepaid order may sit unpaid before it expires.
    pub payment_grace: Duration,
    /// Lifetime of an account-verification code.
    pub otp_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let known_cities = std::env::var("KNOWN_CITIES")
            .map(|raw| {
                raw.split(',')
                    .map(|city| city.trim().to_lowercase())
                    .filter(|city| !city.is_empty())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_else(|_| DEFAULT_CITIES.iter().map(|c| c.to_string()).collect());

        Self {
            known_cities,
            shipping_fee_known: decimal_env("SHIPPING_FEE_KNOWN", DEFAULT_FEE_KNOWN_CITY),
            shipping_fee_unknown: decimal_env("SHIPPING_FEE_UNKNOWN", DEFAULT_FEE_UNKNOWN_CITY),
            payment_grace: Duration::hours(
                int_env("PAYMENT_GRACE_HOURS", DEFAULT_PAYMENT_GRACE_HOURS),
            ),
            otp_ttl: Duration::minutes(OTP_TTL_MINUTES),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            known_cities: DEFAULT_CITIES.iter().map(|c| c.to_string()).collect(),
            shipping_fee_known: Decimal::from(DEFAULT_FEE_KNOWN_CITY),
            shipping_fee_unknown: Decimal::from(DEFAULT_FEE_UNKNOWN_CITY),
            payment_grace: Duration::hours(DEFAULT_PAYMENT_GRACE_HOURS),
            otp_ttl: Duration::minutes(OTP_TTL_MINUTES),
        }
    }
}

fn decimal_env(key: &str, default: i64) -> Decimal {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or_else(|| Decimal::from(default))
}

fn int_env(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(default)
}
