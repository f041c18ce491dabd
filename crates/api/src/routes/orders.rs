//! Order endpoints, including checkout.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::CatalogService;
use serde::{Deserialize, Serialize};
use store::{CartId, Order, OrderId, PaymentStatus, ProductId, Store};

use super::carts::SimpleProductResponse;
use super::{AppState, Caller, JsonBody, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub cart_id: String,
}

#[derive(Deserialize)]
pub struct UpdateOrderRequest {
    pub payment_status: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderItemResponse {
    /// `None` once the product has left the catalog.
    pub product: Option<SimpleProductResponse>,
    pub unit_price: String,
    pub quantity: u32,
    pub total_price: String,
}

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub customer: String,
    pub placed_at: String,
    pub payment_status: String,
    pub items: Vec<OrderItemResponse>,
    pub total: String,
}

/// Renders orders with the current catalog entry for each ordered product.
pub(crate) async fn render_orders<S: Store + Clone>(
    catalog: &CatalogService<S>,
    orders: &[Order],
) -> Result<Vec<OrderResponse>, ApiError> {
    let mut ids: Vec<ProductId> = orders
        .iter()
        .flat_map(|o| o.items.iter().map(|i| i.product_id))
        .collect();
    ids.sort();
    ids.dedup();

    let products: HashMap<_, _> = catalog
        .get_products(&ids)
        .await?
        .into_iter()
        .map(|p| (p.id, p))
        .collect();

    Ok(orders
        .iter()
        .map(|order| OrderResponse {
            id: order.id.to_string(),
            customer: order.customer_id.to_string(),
            placed_at: order.placed_at.to_rfc3339(),
            payment_status: order.payment_status.to_string(),
            items: order
                .items
                .iter()
                .map(|item| OrderItemResponse {
                    product: products.get(&item.product_id).map(|p| SimpleProductResponse {
                        id: p.id.as_i64(),
                        title: p.title.clone(),
                        unit_price: p.unit_price.to_decimal_string(),
                    }),
                    unit_price: item.unit_price.to_decimal_string(),
                    quantity: item.quantity,
                    total_price: item.total_price().to_decimal_string(),
                })
                .collect(),
            total: order.total().to_decimal_string(),
        })
        .collect())
}

async fn render_order<S: Store + Clone>(
    catalog: &CatalogService<S>,
    order: Order,
) -> Result<OrderResponse, ApiError> {
    render_orders(catalog, std::slice::from_ref(&order))
        .await?
        .pop()
        .ok_or_else(|| ApiError::Internal("order rendering produced no output".to_string()))
}

// -- Handlers --

/// POST /orders: checks out the given cart.
#[tracing::instrument(skip(state, caller, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let user_id = caller.0.require_user()?;
    let cart_id: CartId = parse_id(&req.cart_id, "cart id")?;

    let order = state.checkout.place_order(cart_id, user_id).await?;
    let response = render_order(&state.catalog, order).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// GET /orders
#[tracing::instrument(skip(state, caller))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state.orders.list_orders(&caller.0).await?;
    Ok(Json(render_orders(&state.catalog, &orders).await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id, "order id")?;
    let order = state.orders.get_order(&caller.0, id).await?;
    Ok(Json(render_order(&state.catalog, order).await?))
}

/// PATCH /orders/{id} (staff only)
#[tracing::instrument(skip(state, caller, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateOrderRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    let id: OrderId = parse_id(&id, "order id")?;
    let status: PaymentStatus = req
        .payment_status
        .parse()
        .map_err(ApiError::BadRequest)?;

    let order = state
        .orders
        .update_payment_status(&caller.0, id, status)
        .await?;
    Ok(Json(render_order(&state.catalog, order).await?))
}

/// DELETE /orders/{id} (staff only; 405 while it has items)
#[tracing::instrument(skip(state, caller))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: OrderId = parse_id(&id, "order id")?;
    state.orders.delete_order(&caller.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
