use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::application::cart_service::CartService;
use crate::application::order_service::OrderService;
use crate::auth::AuthUser;
use crate::domain::cart::{CartItemView, CartSummary};
use crate::errors::AppError;
use crate::handlers::orders::OrderResponse;

// ── Request / response DTOs ──────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddCartItemRequest {
    pub product_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCartItemRequest {
    /// New absolute quantity for the line. 0 removes it.
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartItemResponse {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_price: String,
    pub quantity: i32,
    pub available_stock: i32,
    pub item_total: String,
    pub in_stock: bool,
}

impl From<CartItemView> for CartItemResponse {
    fn from(i: CartItemView) -> Self {
        CartItemResponse {
            id: i.id,
            product_id: i.product_id,
            product_name: i.product_name,
            product_price: i.product_price.to_string(),
            quantity: i.quantity,
            available_stock: i.available_stock,
            item_total: i.item_total.to_string(),
            in_stock: i.in_stock,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CartSummaryResponse {
    pub items: Vec<CartItemResponse>,
    pub total_price: String,
    pub items_count: usize,
    pub can_checkout: bool,
}

impl From<CartSummary> for CartSummaryResponse {
    fn from(s: CartSummary) -> Self {
        CartSummaryResponse {
            items: s.items.into_iter().map(Into::into).collect(),
            total_price: s.total_price.to_string(),
            items_count: s.items_count,
            can_checkout: s.can_checkout,
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────────────

/// GET /cart
///
/// Cart contents with live stock availability and checkout eligibility.
#[utoipa::path(
    get,
    path = "/cart",
    responses(
        (status = 200, description = "Cart summary", body = CartSummaryResponse),
        (status = 401, description = "Missing identity"),
    ),
    tag = "cart"
)]
pub async fn get_cart(
    svc: web::Data<CartService>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let svc = svc.into_inner();
    let summary = web::block(move || svc.summary(user.principal().id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Ok().json(CartSummaryResponse::from(summary)))
}

/// POST /cart/items
///
/// Add a product to the caller's cart, reserving stock for it. Fails with
/// 409 when fewer units are available than requested; the error body carries
/// the maximum quantity still available.
#[utoipa::path(
    post,
    path = "/cart/items",
    request_body = AddCartItemRequest,
    responses(
        (status = 201, description = "Item added, stock reserved", body = CartItemResponse),
        (status = 400, description = "Non-positive quantity"),
        (status = 404, description = "Product not found"),
        (status = 409, description = "Insufficient stock"),
    ),
    tag = "cart"
)]
pub async fn add_cart_item(
    svc: web::Data<CartService>,
    user: AuthUser,
    body: web::Json<AddCartItemRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let svc = svc.into_inner();
    let item = web::block(move || svc.add_item(user.principal(), body.product_id, body.quantity))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Created().json(CartItemResponse::from(item)))
}

/// PUT /cart/items/{id}
///
/// Set a cart line to an absolute quantity; the stock reservation is
/// adjusted by the difference. Quantity 0 removes the line (204).
#[utoipa::path(
    put,
    path = "/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item UUID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Quantity updated", body = CartItemResponse),
        (status = 204, description = "Line removed (quantity 0)"),
        (status = 403, description = "Item belongs to another user's cart"),
        (status = 404, description = "Item not found"),
        (status = 409, description = "Insufficient stock for the increase"),
    ),
    tag = "cart"
)]
pub async fn update_cart_item(
    svc: web::Data<CartService>,
    user: AuthUser,
    path: web::Path<Uuid>,
    body: web::Json<UpdateCartItemRequest>,
) -> Result<HttpResponse, AppError> {
    let item_id = path.into_inner();
    let quantity = body.into_inner().quantity;
    let svc = svc.into_inner();
    let item = web::block(move || svc.update_item(user.principal(), item_id, quantity))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    match item {
        Some(item) => Ok(HttpResponse::Ok().json(CartItemResponse::from(item))),
        None => Ok(HttpResponse::NoContent().finish()),
    }
}

/// DELETE /cart/items/{id}
#[utoipa::path(
    delete,
    path = "/cart/items/{id}",
    params(("id" = Uuid, Path, description = "Cart item UUID")),
    responses(
        (status = 204, description = "Item removed, reservation released"),
        (status = 403, description = "Item belongs to another user's cart"),
        (status = 404, description = "Item not found"),
    ),
    tag = "cart"
)]
pub async fn remove_cart_item(
    svc: web::Data<CartService>,
    user: AuthUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let item_id = path.into_inner();
    let svc = svc.into_inner();
    web::block(move || svc.remove_item(user.principal(), item_id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /cart/checkout
///
/// Convert the whole cart into a PENDING order in one transaction: every
/// line's reservation becomes a permanent stock decrement and the price is
/// snapshotted. Any failure leaves cart and stock untouched.
#[utoipa::path(
    post,
    path = "/cart/checkout",
    responses(
        (status = 201, description = "Order created", body = OrderResponse),
        (status = 400, description = "Cart is empty"),
        (status = 409, description = "A line can no longer be fulfilled"),
    ),
    tag = "cart"
)]
pub async fn checkout(
    svc: web::Data<OrderService>,
    user: AuthUser,
) -> Result<HttpResponse, AppError> {
    let svc = svc.into_inner();
    let order = web::block(move || svc.checkout(user.principal()))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;
    Ok(HttpResponse::Created().json(OrderResponse::from(order)))
}
