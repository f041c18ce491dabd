//! HTTP handlers and the state they share.

pub mod carts;
pub mod collections;
pub mod customers;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;

use std::str::FromStr;

use axum::Json;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::HeaderMap;
use axum::http::request::Parts;
use serde::de::DeserializeOwned;
use domain::{
    Actor, CartService, CatalogService, CustomerService, EventDispatcher, OrderPlacementService,
    OrderService,
};
use store::{Money, Store, UserId};

use crate::error::ApiError;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Header flagging staff users (`true`/`false`).
pub const USER_STAFF_HEADER: &str = "x-user-staff";

/// Header listing granted permission codenames, comma separated.
pub const USER_PERMISSIONS_HEADER: &str = "x-user-permissions";

/// Shared application state accessible from all handlers.
pub struct AppState<S> {
    pub carts: CartService<S>,
    pub catalog: CatalogService<S>,
    pub customers: CustomerService<S>,
    pub checkout: OrderPlacementService<S>,
    pub orders: OrderService<S>,
}

impl<S: Store + Clone> AppState<S> {
    pub fn new(store: S, events: EventDispatcher) -> Self {
        Self {
            carts: CartService::new(store.clone()),
            catalog: CatalogService::new(store.clone()),
            customers: CustomerService::new(store.clone()),
            checkout: OrderPlacementService::new(store.clone(), events),
            orders: OrderService::new(store),
        }
    }
}

/// The caller as described by the upstream authenticator.
///
/// Missing `x-user-id` means an anonymous caller; malformed headers are
/// rejected with 400.
#[derive(Debug, Clone)]
pub struct Caller(pub Actor);

impl Caller {
    fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let Some(raw_id) = header_str(headers, USER_ID_HEADER)? else {
            return Ok(Caller(Actor::anonymous()));
        };
        let user_id: UserId = parse_id(raw_id, USER_ID_HEADER)?;

        let is_staff = match header_str(headers, USER_STAFF_HEADER)? {
            None => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(v) => {
                return Err(ApiError::BadRequest(format!(
                    "Invalid {USER_STAFF_HEADER} header: {v}"
                )));
            }
        };

        let permissions = header_str(headers, USER_PERMISSIONS_HEADER)?
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Caller(Actor {
            user_id: Some(user_id),
            is_staff,
            permissions,
        }))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Caller::from_headers(&parts.headers)
    }
}

/// JSON request body whose rejections are reported as 400 with an
/// `{"error": ...}` body.
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, ApiError> {
    headers
        .get(name)
        .map(|v| {
            v.to_str()
                .map(str::trim)
                .map_err(|_| ApiError::BadRequest(format!("Invalid {name} header")))
        })
        .transpose()
}

/// Parses a path or header identifier, reporting malformed input as 400.
pub(crate) fn parse_id<T>(raw: &str, what: &str) -> Result<T, ApiError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid {what}: {e}")))
}

/// Parses a decimal amount such as `"10.00"`.
pub(crate) fn parse_money(raw: &str) -> Result<Money, ApiError> {
    Money::parse_decimal(raw).map_err(|e| ApiError::BadRequest(e.to_string()))
}
