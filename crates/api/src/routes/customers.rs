//! Customer profile endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::NaiveDate;
use domain::ProfileChanges;
use serde::{Deserialize, Deserializer, Serialize};
use store::{Customer, CustomerId, Membership, Store};

use super::orders::{OrderResponse, render_orders};
use super::{AppState, Caller, JsonBody, parse_id};
use crate::error::ApiError;

/// Profile update body. `phone` is required; omitted `birth_date` and
/// `membership` keep their stored values, an explicit `null` birth date
/// clears it.
#[derive(Deserialize)]
pub struct CustomerRequest {
    pub phone: String,
    #[serde(default, deserialize_with = "present")]
    pub birth_date: Option<Option<NaiveDate>>,
    /// Membership code: `B`, `S` or `G`.
    #[serde(default)]
    pub membership: Option<String>,
}

/// Marks a field that appeared in the body, even as `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl CustomerRequest {
    fn into_changes(self) -> Result<ProfileChanges, ApiError> {
        let membership = self
            .membership
            .map(|code| {
                Membership::from_code(&code).ok_or_else(|| {
                    ApiError::BadRequest(format!("Invalid membership code: {code}"))
                })
            })
            .transpose()?;
        Ok(ProfileChanges {
            phone: self.phone,
            birth_date: self.birth_date,
            membership,
        })
    }
}

#[derive(Serialize)]
pub struct CustomerResponse {
    pub id: String,
    pub user_id: i64,
    pub phone: String,
    pub birth_date: Option<NaiveDate>,
    pub membership: &'static str,
}

impl From<&Customer> for CustomerResponse {
    fn from(customer: &Customer) -> Self {
        Self {
            id: customer.id.to_string(),
            user_id: customer.user_id.as_i64(),
            phone: customer.phone.clone(),
            birth_date: customer.birth_date,
            membership: customer.membership.as_code(),
        }
    }
}

fn parse_customer_id(raw: &str) -> Result<CustomerId, ApiError> {
    parse_id(raw, "customer id")
}

/// GET /customers (requires `view_customer`)
#[tracing::instrument(skip(state, caller))]
pub async fn list<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<Vec<CustomerResponse>>, ApiError> {
    let customers = state.customers.list_customers(&caller.0).await?;
    Ok(Json(customers.iter().map(CustomerResponse::from).collect()))
}

/// GET /customers/me
///
/// Provisions the profile on first access.
#[tracing::instrument(skip(state, caller))]
pub async fn me<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<Json<CustomerResponse>, ApiError> {
    let user_id = caller.0.require_user()?;
    let customer = state.customers.me(user_id).await?;
    Ok(Json(CustomerResponse::from(&customer)))
}

/// PUT /customers/me
#[tracing::instrument(skip(state, caller, req))]
pub async fn update_me<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<CustomerRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let user_id = caller.0.require_user()?;
    let customer = state
        .customers
        .update_me(user_id, req.into_changes()?)
        .await?;
    Ok(Json(CustomerResponse::from(&customer)))
}

/// GET /customers/{id} (requires `view_customer`)
#[tracing::instrument(skip(state, caller))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let customer = state
        .customers
        .get_customer(&caller.0, parse_customer_id(&id)?)
        .await?;
    Ok(Json(CustomerResponse::from(&customer)))
}

/// PUT /customers/{id} (requires `change_customer`)
#[tracing::instrument(skip(state, caller, req))]
pub async fn update<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<CustomerRequest>,
) -> Result<Json<CustomerResponse>, ApiError> {
    let id = parse_customer_id(&id)?;
    let customer = state
        .customers
        .update_customer(&caller.0, id, req.into_changes()?)
        .await?;
    Ok(Json(CustomerResponse::from(&customer)))
}

/// DELETE /customers/{id} (requires `delete_customer`; 405 while it owns orders)
#[tracing::instrument(skip(state, caller))]
pub async fn delete<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .customers
        .delete_customer(&caller.0, parse_customer_id(&id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /customers/{id}/history (requires `view_history`)
#[tracing::instrument(skip(state, caller))]
pub async fn history<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<OrderResponse>>, ApiError> {
    let orders = state
        .customers
        .customer_history(&caller.0, parse_customer_id(&id)?)
        .await?;
    Ok(Json(render_orders(&state.catalog, &orders).await?))
}
