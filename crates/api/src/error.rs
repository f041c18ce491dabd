//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::DomainError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Bad request from the client (malformed id, header or amount).
    BadRequest(String),
    /// Domain logic error.
    Domain(DomainError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Domain(err) => domain_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn domain_error_to_response(err: DomainError) -> (StatusCode, String) {
    let status = match &err {
        DomainError::CartNotFound(_) | DomainError::NotFound { .. } => StatusCode::NOT_FOUND,
        DomainError::Validation(_) | DomainError::EmptyCart(_) => StatusCode::BAD_REQUEST,
        DomainError::Conflict(_) => StatusCode::CONFLICT,
        DomainError::Protected { .. } => StatusCode::METHOD_NOT_ALLOWED,
        DomainError::Unauthenticated => StatusCode::UNAUTHORIZED,
        DomainError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        DomainError::Store(_) => {
            tracing::error!(error = %err, "store failure");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Domain(err)
    }
}

#[cfg(test)]
mod tests {
    use domain::Action;
    use store::CartId;

    use super::*;

    fn status_of(err: DomainError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn checkout_failures_have_distinct_statuses() {
        assert_eq!(
            status_of(DomainError::CartNotFound(CartId::new())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(DomainError::EmptyCart(CartId::new())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(DomainError::Conflict("cart changed".to_string())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn access_failures() {
        assert_eq!(
            status_of(DomainError::Unauthenticated),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(DomainError::PermissionDenied(Action::ManageOrders)),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn protected_delete_is_method_not_allowed() {
        let err = DomainError::Protected {
            entity: "Product",
            id: "1".to_string(),
            reason: "it is referenced by order items",
        };
        assert_eq!(status_of(err), StatusCode::METHOD_NOT_ALLOWED);
    }
}
