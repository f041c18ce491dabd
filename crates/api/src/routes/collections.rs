//! Collection endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use store::{Collection, CollectionId, CollectionSummary, ProductId, Store};

use super::{AppState, Caller, JsonBody, parse_id};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateCollectionRequest {
    pub title: String,
    #[serde(default)]
    pub featured_product: Option<i64>,
}

#[derive(Deserialize)]
pub struct UpdateCollectionRequest {
    pub title: String,
}

#[derive(Serialize)]
pub struct CollectionResponse {
    pub id: i64,
    pub title: String,
    pub featured_product: Option<i64>,
    pub products_count: u64,
}

impl CollectionResponse {
    fn new(collection: &Collection, products_count: u64) -> Self {
        Self {
            id: collection.id.as_i64(),
            title: collection.title.clone(),
            featured_product: collection.featured_product.map(|p| p.as_i64()),
            products_count,
        }
    }
}

impl From<&CollectionSummary> for CollectionResponse {
    fn from(summary: &CollectionSummary) -> Self {
        Self::new(&summary.collection, summary.products_count)
    }
}

/// GET /collections, ordered by title.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<CollectionResponse>>, ApiError> {
    let collections = state.catalog.list_collections().await?;
    Ok(Json(
        collections.iter().map(CollectionResponse::from).collect(),
    ))
}

/// POST /collections (staff only)
#[tracing::instrument(skip(state, caller, req))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<CreateCollectionRequest>,
) -> Result<(StatusCode, Json<CollectionResponse>), ApiError> {
    let collection = state
        .catalog
        .create_collection(&caller.0, req.title, req.featured_product.map(ProductId::new))
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CollectionResponse::new(&collection, 0)),
    ))
}

/// GET /collections/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let id: CollectionId = parse_id(&id, "collection id")?;
    let summary = state.catalog.get_collection(id).await?;
    Ok(Json(CollectionResponse::from(&summary)))
}

/// PUT /collections/{id} (staff only)
#[tracing::instrument(skip(state, caller, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateCollectionRequest>,
) -> Result<Json<CollectionResponse>, ApiError> {
    let id: CollectionId = parse_id(&id, "collection id")?;
    state
        .catalog
        .update_collection(&caller.0, id, req.title)
        .await?;
    let summary = state.catalog.get_collection(id).await?;
    Ok(Json(CollectionResponse::from(&summary)))
}

/// DELETE /collections/{id} (staff only; 405 while it has products)
#[tracing::instrument(skip(state, caller))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: CollectionId = parse_id(&id, "collection id")?;
    state.catalog.delete_collection(&caller.0, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
