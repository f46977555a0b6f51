//! Storefront pricing and checkout service.
//!
//! ## Features
//! - Product catalog with size/color variants and derived minimum prices
//! - Per-user shopping carts with live totals
//! - Address-based two-tier shipping fees
//! - Category-scoped percentage vouchers with preview semantics
//! - Transactional order placement with a status state machine
//! - OTP-based account activation

use std::sync::Arc;

pub mod auth;
pub mod cart;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod http;
pub mod notify;
pub mod order;
pub mod shipping;
pub mod voucher;

pub use error::{Result, StoreError};

/// Shared handler state: connection pool, runtime configuration and the
/// optional notification client.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Arc<config::Config>,
    pub notifier: notify::Notifier,
}
