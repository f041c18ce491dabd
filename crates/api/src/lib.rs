//! HTTP API for the storefront: catalog, carts, checkout and orders.
//!
//! Handlers are generic over the [`store::Store`] backend, so the same router
//! serves the in-memory store and PostgreSQL.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use domain::{EventDispatcher, LoggingSubscriber};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use crate::routes::{carts, collections, customers, orders, products};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // catalog
        .route(
            "/collections",
            get(collections::list::<S>).post(collections::create::<S>),
        )
        .route(
            "/collections/{id}",
            get(collections::get::<S>)
                .put(collections::update::<S>)
                .delete(collections::delete::<S>),
        )
        .route(
            "/products",
            get(products::list::<S>).post(products::create::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .put(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route(
            "/products/{id}/reviews",
            get(products::list_reviews::<S>).post(products::create_review::<S>),
        )
        .route(
            "/products/{id}/reviews/{review_id}",
            axum::routing::delete(products::delete_review::<S>),
        )
        // carts
        .route("/carts", axum::routing::post(carts::create::<S>))
        .route(
            "/carts/{id}",
            get(carts::get::<S>).delete(carts::delete::<S>),
        )
        .route(
            "/carts/{id}/items",
            get(carts::list_items::<S>).post(carts::add_item::<S>),
        )
        .route(
            "/carts/{id}/items/{product_id}",
            get(carts::get_item::<S>)
                .patch(carts::update_item::<S>)
                .delete(carts::remove_item::<S>),
        )
        // customers
        .route("/customers", get(customers::list::<S>))
        .route(
            "/customers/me",
            get(customers::me::<S>).put(customers::update_me::<S>),
        )
        .route(
            "/customers/{id}",
            get(customers::get::<S>)
                .put(customers::update::<S>)
                .delete(customers::delete::<S>),
        )
        .route("/customers/{id}/history", get(customers::history::<S>))
        // orders
        .route("/orders", get(orders::list::<S>).post(orders::create::<S>))
        .route(
            "/orders/{id}",
            get(orders::get::<S>)
                .patch(orders::update::<S>)
                .delete(orders::delete::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the default application state, logging every placed order.
pub fn create_default_state<S: Store + Clone + 'static>(store: S) -> Arc<AppState<S>> {
    let events = EventDispatcher::new().with_subscriber(Arc::new(LoggingSubscriber));
    Arc::new(AppState::new(store, events))
}

/// Registers descriptions for the metrics the services emit.
pub fn describe_metrics() {
    metrics::describe_counter!("orders_placed_total", "Carts successfully converted to orders");
    metrics::describe_counter!(
        "checkout_failures_total",
        "Checkout attempts that failed, labelled by reason"
    );
    metrics::describe_histogram!(
        "checkout_duration_seconds",
        metrics::Unit::Seconds,
        "Time spent converting a cart to an order"
    );
    metrics::describe_counter!("cart_items_added_total", "Add-to-cart operations");
    metrics::describe_counter!(
        "order_created_delivery_failures_total",
        "OrderCreated deliveries that failed or panicked"
    );
}
