//! Product and review endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::price_with_tax;
use serde::{Deserialize, Serialize};
use store::{
    CollectionId, NewProduct, Product, ProductId, ProductUpdate, Review, ReviewId, Store,
};

use super::{AppState, Caller, JsonBody, parse_id, parse_money};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct CreateProductRequest {
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub unit_price: String,
    pub inventory: i32,
    pub collection: i64,
}

#[derive(Deserialize)]
pub struct UpdateProductRequest {
    pub title: String,
    pub unit_price: String,
    pub inventory: i32,
}

#[derive(Deserialize)]
pub struct CreateReviewRequest {
    pub name: String,
    pub description: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub description: Option<String>,
    pub inventory: i32,
    pub unit_price: String,
    pub price_with_tax: String,
    pub collection: i64,
    pub last_update: String,
}

impl From<&Product> for ProductResponse {
    fn from(product: &Product) -> Self {
        Self {
            id: product.id.as_i64(),
            title: product.title.clone(),
            slug: product.slug.clone(),
            description: product.description.clone(),
            inventory: product.inventory,
            unit_price: product.unit_price.to_decimal_string(),
            price_with_tax: price_with_tax(product).to_decimal_string(),
            collection: product.collection_id.as_i64(),
            last_update: product.last_update.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct ReviewResponse {
    pub id: i64,
    pub date: String,
    pub name: String,
    pub description: String,
}

impl From<&Review> for ReviewResponse {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id.as_i64(),
            date: review.date.to_rfc3339(),
            name: review.name.clone(),
            description: review.description.clone(),
        }
    }
}

// -- Handlers --

/// GET /products
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<ProductResponse>>, ApiError> {
    let products = state.catalog.list_products().await?;
    Ok(Json(products.iter().map(ProductResponse::from).collect()))
}

/// POST /products (staff only)
#[tracing::instrument(skip(state, caller, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), ApiError> {
    let product = NewProduct {
        title: req.title,
        slug: req.slug.unwrap_or_default(),
        description: req.description,
        unit_price: parse_money(&req.unit_price)?,
        inventory: req.inventory,
        collection_id: CollectionId::new(req.collection),
    };

    let product = state.catalog.create_product(&caller.0, product).await?;
    Ok((StatusCode::CREATED, Json(ProductResponse::from(&product))))
}

/// GET /products/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id, "product id")?;
    let product = state.catalog.get_product(id).await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// PUT /products/{id} (staff only)
#[tracing::instrument(skip(state, caller, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, ApiError> {
    let id: ProductId = parse_id(&id, "product id")?;
    let update = ProductUpdate {
        title: req.title,
        unit_price: parse_money(&req.unit_price)?,
        inventory: req.inventory,
    };

    let product = state.catalog.update_product(&caller.0, id, update).await?;
    Ok(Json(ProductResponse::from(&product)))
}

/// DELETE /products/{id} (staff only; 405 while ordered)
#[tracing::instrument(skip(state, caller))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: ProductId = parse_id(&id, "product id")?;
    state.catalog.delete_product(&caller.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /products/{id}/reviews
#[tracing::instrument(skip(state))]
pub async fn list_reviews<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
) -> Result<Json<Vec<ReviewResponse>>, ApiError> {
    let product_id: ProductId = parse_id(&product_id, "product id")?;
    let reviews = state.catalog.list_reviews(product_id).await?;
    Ok(Json(reviews.iter().map(ReviewResponse::from).collect()))
}

/// POST /products/{id}/reviews
#[tracing::instrument(skip(state, req))]
pub async fn create_review<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(product_id): Path<String>,
    JsonBody(req): JsonBody<CreateReviewRequest>,
) -> Result<(StatusCode, Json<ReviewResponse>), ApiError> {
    let product_id: ProductId = parse_id(&product_id, "product id")?;
    let review = state
        .catalog
        .add_review(product_id, req.name, req.description)
        .await?;
    Ok((StatusCode::CREATED, Json(ReviewResponse::from(&review))))
}

/// DELETE /products/{id}/reviews/{review_id}
#[tracing::instrument(skip(state))]
pub async fn delete_review<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((product_id, review_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let product_id: ProductId = parse_id(&product_id, "product id")?;
    let review_id: ReviewId = parse_id(&review_id, "review id")?;
    state.catalog.delete_review(product_id, review_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
