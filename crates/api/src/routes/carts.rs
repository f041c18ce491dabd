//! Cart and cart item endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{CartLineView, CartView};
use serde::{Deserialize, Serialize};
use store::{CartId, ProductId, Store};

use super::{AppState, JsonBody, parse_id};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct AddCartItemRequest {
    pub product_id: i64,
    pub quantity: i64,
}

#[derive(Deserialize)]
pub struct UpdateCartItemRequest {
    pub quantity: i64,
}

// -- Response types --

#[derive(Serialize)]
pub struct SimpleProductResponse {
    pub id: i64,
    pub title: String,
    pub unit_price: String,
}

#[derive(Serialize)]
pub struct CartItemResponse {
    pub product: SimpleProductResponse,
    pub quantity: u32,
    pub total_price: String,
}

impl From<&CartLineView> for CartItemResponse {
    fn from(line: &CartLineView) -> Self {
        Self {
            product: SimpleProductResponse {
                id: line.product.id.as_i64(),
                title: line.product.title.clone(),
                unit_price: line.product.unit_price.to_decimal_string(),
            },
            quantity: line.quantity,
            total_price: line.total_price.to_decimal_string(),
        }
    }
}

#[derive(Serialize)]
pub struct CartResponse {
    pub id: String,
    pub created_at: String,
    pub items: Vec<CartItemResponse>,
    pub total_price: String,
}

impl From<&CartView> for CartResponse {
    fn from(cart: &CartView) -> Self {
        Self {
            id: cart.id.to_string(),
            created_at: cart.created_at.to_rfc3339(),
            items: cart.items.iter().map(CartItemResponse::from).collect(),
            total_price: cart.total_price.to_decimal_string(),
        }
    }
}

fn parse_cart_id(raw: &str) -> Result<CartId, ApiError> {
    parse_id(raw, "cart id")
}

fn parse_product_id(raw: &str) -> Result<ProductId, ApiError> {
    parse_id(raw, "product id")
}

// -- Handlers --

/// POST /carts
#[tracing::instrument(skip(state))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let cart = state.carts.create_cart().await?;
    let view = state.carts.get_cart(cart.id).await?;
    Ok((StatusCode::CREATED, Json(CartResponse::from(&view))))
}

/// GET /carts/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let view = state.carts.get_cart(parse_cart_id(&id)?).await?;
    Ok(Json(CartResponse::from(&view)))
}

/// DELETE /carts/{id}
#[tracing::instrument(skip(state))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.carts.delete_cart(parse_cart_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /carts/{id}/items
#[tracing::instrument(skip(state))]
pub async fn list_items<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CartItemResponse>>, ApiError> {
    let lines = state.carts.list_items(parse_cart_id(&id)?).await?;
    Ok(Json(lines.iter().map(CartItemResponse::from).collect()))
}

/// POST /carts/{id}/items
///
/// Adds to an existing line or creates one.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<AddCartItemRequest>,
) -> Result<(StatusCode, Json<CartItemResponse>), ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let product_id = ProductId::new(req.product_id);

    state
        .carts
        .add_item(cart_id, product_id, req.quantity)
        .await?;
    let line = state.carts.get_item(cart_id, product_id).await?;
    Ok((StatusCode::CREATED, Json(CartItemResponse::from(&line))))
}

/// GET /carts/{id}/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn get_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, product_id)): Path<(String, String)>,
) -> Result<Json<CartItemResponse>, ApiError> {
    let line = state
        .carts
        .get_item(parse_cart_id(&id)?, parse_product_id(&product_id)?)
        .await?;
    Ok(Json(CartItemResponse::from(&line)))
}

/// PATCH /carts/{id}/items/{product_id}
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, product_id)): Path<(String, String)>,
    JsonBody(req): JsonBody<UpdateCartItemRequest>,
) -> Result<Json<CartItemResponse>, ApiError> {
    let cart_id = parse_cart_id(&id)?;
    let product_id = parse_product_id(&product_id)?;

    state
        .carts
        .update_item_quantity(cart_id, product_id, req.quantity)
        .await?;
    let line = state.carts.get_item(cart_id, product_id).await?;
    Ok(Json(CartItemResponse::from(&line)))
}

/// DELETE /carts/{id}/items/{product_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((id, product_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state
        .carts
        .remove_item(parse_cart_id(&id)?, parse_product_id(&product_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
