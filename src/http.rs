//! JSON endpoints. Every success body carries `"success": true` next to its
//! payload; errors come back through `StoreError`'s response mapping.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::domain::PaymentMethod;
use crate::error::{Result, StoreError};
use crate::order::{OrderFilter, PlacementDetails};
use crate::{auth, cart, catalog, order, voucher, AppState};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/auth/register", post(register))
        .route("/api/v1/auth/verify", post(verify))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route(
            "/api/v1/products/:id/variants",
            get(get_variant).post(create_variant),
        )
        .route("/api/v1/variants/:id", axum::routing::put(update_variant).delete(delete_variant))
        .route("/api/v1/cart/:user_id", get(get_cart))
        .route("/api/v1/cart/:user_id/lines", post(add_line))
        .route(
            "/api/v1/cart/:user_id/lines/:line_id",
            axum::routing::put(update_line).delete(remove_line),
        )
        .route("/api/v1/cart/:user_id/vouchers", get(list_vouchers))
        .route("/api/v1/cart/:user_id/vouchers/preview", post(preview_voucher))
        .route("/api/v1/orders/:user_id", get(list_orders).post(place_order))
        .route("/api/v1/orders/:user_id/:order_id/cancel", post(cancel_order))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "storefront" }))
}

// ---- accounts ----

async fn register(
    State(state): State<AppState>,
    Json(req): Json<auth::RegisterRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let nonce = auth::register(&state.db, &state.config, &state.notifier, &req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "nonce": nonce,
            "message": "Check your inbox for the verification code."
        })),
    ))
}

async fn verify(
    State(state): State<AppState>,
    Json(req): Json<auth::VerifyRequest>,
) -> Result<Json<serde_json::Value>> {
    auth::verify(&state.db, &req).await?;
    Ok(Json(json!({ "success": true, "message": "Account activated." })))
}

// ---- catalog ----

async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<catalog::ListParams>,
) -> Result<Json<serde_json::Value>> {
    let (products, total, page) = catalog::list_products(&state.db, &params).await?;
    Ok(Json(json!({
        "success": true,
        "data": products,
        "total": total,
        "page": page
    })))
}

async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let product = catalog::get_product(&state.db, id).await?;
    Ok(Json(json!({ "success": true, "product": product })))
}

#[derive(Debug, Deserialize)]
struct VariantQuery {
    size: String,
    color: String,
}

/// Resolves the live variant for a chosen size/color on a product page.
async fn get_variant(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<VariantQuery>,
) -> Result<Json<serde_json::Value>> {
    let variant = catalog::get_variant(&state.db, product_id, &query.size, &query.color).await?;
    Ok(Json(json!({ "success": true, "variant": variant })))
}

async fn create_variant(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Json(req): Json<catalog::VariantRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let variant = catalog::create_variant(&state.db, product_id, &req).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "variant": variant })),
    ))
}

async fn update_variant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<catalog::VariantRequest>,
) -> Result<Json<serde_json::Value>> {
    let variant = catalog::update_variant(&state.db, id, &req).await?;
    Ok(Json(json!({ "success": true, "variant": variant })))
}

async fn delete_variant(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    catalog::delete_variant(&state.db, id).await?;
    Ok(Json(json!({ "success": true })))
}

// ---- cart ----

async fn get_cart(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let snapshot = cart::compute_totals(&state.db, &state.config, user_id).await?;
    Ok(Json(json!({ "success": true, "cart": snapshot })))
}

#[derive(Debug, Deserialize)]
struct AddLineRequest {
    variant_id: Uuid,
    quantity: i32,
}

async fn add_line(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<AddLineRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let cart_length = cart::add_line(&state.db, user_id, req.variant_id, req.quantity).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": "Product added to cart successfully!",
            "cart_length": cart_length
        })),
    ))
}

#[derive(Debug, Deserialize)]
struct UpdateLineRequest {
    quantity: i32,
    size: Option<String>,
    color: Option<String>,
}

async fn update_line(
    State(state): State<AppState>,
    Path((user_id, line_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateLineRequest>,
) -> Result<Json<serde_json::Value>> {
    cart::update_line(
        &state.db,
        user_id,
        line_id,
        req.quantity,
        req.size.as_deref(),
        req.color.as_deref(),
    )
    .await?;
    let snapshot = cart::compute_totals(&state.db, &state.config, user_id).await?;
    Ok(Json(json!({
        "success": true,
        "message": "Cart item updated successfully",
        "cart": snapshot
    })))
}

async fn remove_line(
    State(state): State<AppState>,
    Path((user_id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>> {
    cart::remove_line(&state.db, user_id, line_id).await?;
    let snapshot = cart::compute_totals(&state.db, &state.config, user_id).await?;
    // Any previously previewed voucher is stale once a line disappears.
    Ok(Json(json!({
        "success": true,
        "removed": true,
        "subtotal": snapshot.subtotal,
        "total_price": snapshot.total,
        "discount_fee": 0,
        "message": "Please select a voucher again."
    })))
}

// ---- vouchers ----

async fn list_vouchers(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let vouchers = voucher::list_available(&state.db, user_id).await?;
    Ok(Json(json!({ "success": true, "vouchers": vouchers })))
}

#[derive(Debug, Deserialize)]
struct PreviewVoucherRequest {
    voucher_id: Uuid,
    #[serde(default)]
    min_amount: Decimal,
}

async fn preview_voucher(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<PreviewVoucherRequest>,
) -> Result<Json<serde_json::Value>> {
    let result = voucher::apply(&state.db, user_id, req.voucher_id, req.min_amount).await?;
    Ok(Json(json!({ "success": true, "discount": result })))
}

// ---- orders ----

#[derive(Debug, Deserialize)]
struct PlaceOrderRequest {
    address: String,
    phone_number: String,
    payment_method: String,
    note: Option<String>,
    voucher_id: Option<Uuid>,
}

async fn place_order(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let payment_method = PaymentMethod::parse(&req.payment_method)
        .ok_or_else(|| StoreError::Validation("unknown payment method".into()))?;
    let placed = order::place_order(
        &state.db,
        &state.config,
        &state.notifier,
        user_id,
        PlacementDetails {
            address: req.address,
            phone_number: req.phone_number,
            payment_method,
            note: req.note,
            voucher_id: req.voucher_id,
        },
    )
    .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "order": placed })),
    ))
}

async fn list_orders(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(filter): Query<OrderFilter>,
) -> Result<Json<serde_json::Value>> {
    let orders = order::list_orders(&state.db, user_id, &filter).await?;
    Ok(Json(json!({ "success": true, "orders": orders })))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path((user_id, order_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<serde_json::Value>> {
    let cancelled = order::cancel_order(&state.db, user_id, order_id).await?;
    Ok(Json(json!({ "success": true, "order": cancelled })))
}
