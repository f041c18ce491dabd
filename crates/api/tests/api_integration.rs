//! Integration tests for the API server.

use std::sync::OnceLock;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::InMemoryStore;
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

fn setup() -> Router {
    let state = api::create_default_state(InMemoryStore::new());
    api::create_app(state, get_metrics_handle())
}

/// Who is calling, expressed through the identity headers.
#[derive(Clone, Copy)]
enum As {
    Anonymous,
    User(i64),
    Staff(i64),
    WithPermissions(i64, &'static str),
}

async fn call(app: &Router, method: &str, uri: &str, who: As, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    match who {
        As::Anonymous => {}
        As::User(id) => builder = builder.header("x-user-id", id.to_string()),
        As::Staff(id) => {
            builder = builder
                .header("x-user-id", id.to_string())
                .header("x-user-staff", "true");
        }
        As::WithPermissions(id, perms) => {
            builder = builder
                .header("x-user-id", id.to_string())
                .header("x-user-permissions", perms);
        }
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_string(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

const STAFF: As = As::Staff(1);

async fn create_collection(app: &Router, title: &str) -> i64 {
    let (status, body) = call(app, "POST", "/collections", STAFF, Some(json!({ "title": title }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_i64().unwrap()
}

async fn create_product(app: &Router, collection: i64, title: &str, price: &str) -> i64 {
    let (status, body) = call(
        app,
        "POST",
        "/products",
        STAFF,
        Some(json!({
            "title": title,
            "unit_price": price,
            "inventory": 10,
            "collection": collection,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_i64().unwrap()
}

async fn create_cart(app: &Router) -> String {
    let (status, body) = call(app, "POST", "/carts", As::Anonymous, None).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn add_item(app: &Router, cart: &str, product: i64, quantity: i64) -> (StatusCode, Value) {
    call(
        app,
        "POST",
        &format!("/carts/{cart}/items"),
        As::Anonymous,
        Some(json!({ "product_id": product, "quantity": quantity })),
    )
    .await
}

async fn checkout(app: &Router, cart: &str, who: As) -> (StatusCode, Value) {
    call(app, "POST", "/orders", who, Some(json!({ "cart_id": cart }))).await
}

/// A cart holding 2 x 10.00 and 1 x 5.00.
async fn filled_cart(app: &Router) -> (String, i64, i64) {
    let collection = create_collection(app, "Shoes").await;
    let p1 = create_product(app, collection, "Runner", "10.00").await;
    let p2 = create_product(app, collection, "Laces", "5.00").await;
    let cart = create_cart(app).await;
    add_item(app, &cart, p1, 2).await;
    add_item(app, &cart, p2, 1).await;
    (cart, p1, p2)
}

#[tokio::test]
async fn test_health_check() {
    let app = setup();

    let (status, body) = call(&app, "GET", "/health", As::Anonymous, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup();

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap();
    assert!(content_type.starts_with("text/plain"));
}

mod catalog {
    use super::*;

    #[tokio::test]
    async fn product_writes_are_staff_only() {
        let app = setup();
        let collection = create_collection(&app, "Shoes").await;
        let body = json!({
            "title": "Runner",
            "unit_price": "10.00",
            "inventory": 3,
            "collection": collection,
        });

        let (status, _) = call(&app, "POST", "/products", As::Anonymous, Some(body.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "POST", "/products", As::User(7), Some(body.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, product) = call(&app, "POST", "/products", STAFF, Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(product["unit_price"], "10.00");
        assert_eq!(product["price_with_tax"], "11.00");
        assert_eq!(product["slug"], "runner");

        let (status, listed) = call(&app, "GET", "/products", As::Anonymous, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn price_below_minimum_is_rejected() {
        let app = setup();
        let collection = create_collection(&app, "Shoes").await;

        let (status, _) = call(
            &app,
            "POST",
            "/products",
            STAFF,
            Some(json!({
                "title": "Cheap",
                "unit_price": "0.50",
                "inventory": 1,
                "collection": collection,
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn collection_with_products_cannot_be_deleted() {
        let app = setup();
        let collection = create_collection(&app, "Shoes").await;
        create_product(&app, collection, "Runner", "10.00").await;

        let (status, body) = call(&app, "GET", &format!("/collections/{collection}"), As::Anonymous, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["products_count"], 1);

        let (status, _) = call(&app, "DELETE", &format!("/collections/{collection}"), STAFF, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn reviews_are_scoped_to_their_product() {
        let app = setup();
        let collection = create_collection(&app, "Shoes").await;
        let product = create_product(&app, collection, "Runner", "10.00").await;

        let (status, review) = call(
            &app,
            "POST",
            &format!("/products/{product}/reviews"),
            As::Anonymous,
            Some(json!({ "name": "Ana", "description": "Comfortable" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, reviews) = call(&app, "GET", &format!("/products/{product}/reviews"), As::Anonymous, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reviews[0]["name"], "Ana");

        let (status, _) = call(&app, "GET", "/products/999/reviews", As::Anonymous, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let uri = format!("/products/{product}/reviews/{}", review["id"]);
        let (status, _) = call(&app, "DELETE", &uri, As::Anonymous, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

mod carts {
    use super::*;

    #[tokio::test]
    async fn adding_same_product_merges_lines() {
        let app = setup();
        let collection = create_collection(&app, "Shoes").await;
        let product = create_product(&app, collection, "Runner", "10.00").await;
        let cart = create_cart(&app).await;

        let (status, line) = add_item(&app, &cart, product, 2).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(line["quantity"], 2);

        let (_, line) = add_item(&app, &cart, product, 3).await;
        assert_eq!(line["quantity"], 5);
        assert_eq!(line["total_price"], "50.00");

        let (status, body) = call(&app, "GET", &format!("/carts/{cart}"), As::Anonymous, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["items"].as_array().unwrap().len(), 1);
        assert_eq!(body["total_price"], "50.00");
    }

    #[tokio::test]
    async fn invalid_additions_are_rejected() {
        let app = setup();
        let collection = create_collection(&app, "Shoes").await;
        let product = create_product(&app, collection, "Runner", "10.00").await;
        let cart = create_cart(&app).await;

        let (status, _) = add_item(&app, &cart, product, 0).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = add_item(&app, &cart, 999, 1).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn update_and_remove_lines() {
        let app = setup();
        let collection = create_collection(&app, "Shoes").await;
        let product = create_product(&app, collection, "Runner", "10.00").await;
        let cart = create_cart(&app).await;
        add_item(&app, &cart, product, 1).await;

        let uri = format!("/carts/{cart}/items/{product}");
        let (status, line) = call(&app, "PATCH", &uri, As::Anonymous, Some(json!({ "quantity": 4 }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(line["quantity"], 4);

        let (status, _) = call(&app, "DELETE", &uri, As::Anonymous, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, _) = call(&app, "GET", &uri, As::Anonymous, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_cart_id_is_bad_request() {
        let app = setup();

        let (status, body) = call(&app, "GET", "/carts/not-a-uuid", As::Anonymous, None).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("cart id"));
    }
}

mod checkout {
    use super::*;

    #[tokio::test]
    async fn checkout_creates_order_and_deletes_cart() {
        let app = setup();
        let (cart, p1, _) = filled_cart(&app).await;

        let (status, order) = checkout(&app, &cart, As::User(42)).await;
        assert_eq!(status, StatusCode::CREATED, "{order}");
        assert_eq!(order["payment_status"], "pending");
        assert_eq!(order["total"], "25.00");
        assert_eq!(order["items"].as_array().unwrap().len(), 2);

        let runner = order["items"]
            .as_array()
            .unwrap()
            .iter()
            .find(|i| i["product"]["id"] == p1)
            .unwrap();
        assert_eq!(runner["unit_price"], "10.00");
        assert_eq!(runner["quantity"], 2);

        let (status, _) = call(&app, "GET", &format!("/carts/{cart}"), As::Anonymous, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = checkout(&app, &cart, As::User(42)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn order_prices_stay_frozen_after_price_change() {
        let app = setup();
        let (cart, p1, _) = filled_cart(&app).await;
        let (_, order) = checkout(&app, &cart, As::User(42)).await;

        let (status, _) = call(
            &app,
            "PUT",
            &format!("/products/{p1}"),
            STAFF,
            Some(json!({ "title": "Runner", "unit_price": "99.00", "inventory": 10 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/orders/{}", order["id"].as_str().unwrap());
        let (status, order) = call(&app, "GET", &uri, As::User(42), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["total"], "25.00");
    }

    #[tokio::test]
    async fn checkout_requires_authentication() {
        let app = setup();
        let (cart, _, _) = filled_cart(&app).await;

        let (status, _) = checkout(&app, &cart, As::Anonymous).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "GET", &format!("/carts/{cart}"), As::Anonymous, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn empty_unknown_and_malformed_carts() {
        let app = setup();
        let empty = create_cart(&app).await;

        let (status, _) = checkout(&app, &empty, As::User(42)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", &format!("/carts/{empty}"), As::Anonymous, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = checkout(&app, "00000000-0000-0000-0000-000000000000", As::User(42)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = checkout(&app, "bogus", As::User(42)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

mod orders {
    use super::*;

    async fn placed_order(app: &Router, user: i64) -> String {
        let (cart, _, _) = filled_cart(app).await;
        let (status, order) = checkout(app, &cart, As::User(user)).await;
        assert_eq!(status, StatusCode::CREATED);
        order["id"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn orders_are_visible_to_owner_and_staff_only() {
        let app = setup();
        let order = placed_order(&app, 42).await;
        let uri = format!("/orders/{order}");

        let (status, _) = call(&app, "GET", &uri, As::User(42), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(&app, "GET", &uri, As::User(43), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, listed) = call(&app, "GET", "/orders", As::User(43), None).await;
        assert!(listed.as_array().unwrap().is_empty());

        let (_, listed) = call(&app, "GET", "/orders", STAFF, None).await;
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let (status, _) = call(&app, "GET", "/orders", As::Anonymous, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn payment_status_is_staff_managed() {
        let app = setup();
        let order = placed_order(&app, 42).await;
        let uri = format!("/orders/{order}");
        let completed = json!({ "payment_status": "completed" });

        let (status, _) = call(&app, "PATCH", &uri, As::User(42), Some(completed.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = call(&app, "PATCH", &uri, STAFF, Some(completed)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payment_status"], "completed");

        let (status, _) = call(&app, "PATCH", &uri, STAFF, Some(json!({ "payment_status": "refunded" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ordered_rows_are_protected() {
        let app = setup();
        let (cart, p1, _) = filled_cart(&app).await;
        let (_, order) = checkout(&app, &cart, As::User(42)).await;

        let uri = format!("/orders/{}", order["id"].as_str().unwrap());
        let (status, _) = call(&app, "DELETE", &uri, STAFF, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (status, _) = call(&app, "DELETE", &format!("/products/{p1}"), STAFF, None).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);

        let (_, me) = call(&app, "GET", "/customers/me", As::User(42), None).await;
        let customer = me["id"].as_str().unwrap();
        let (status, _) = call(
            &app,
            "DELETE",
            &format!("/customers/{customer}"),
            As::WithPermissions(5, "delete_customer"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }
}

mod customers {
    use super::*;

    #[tokio::test]
    async fn me_is_provisioned_and_editable() {
        let app = setup();

        let (status, me) = call(&app, "GET", "/customers/me", As::User(9), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["user_id"], 9);
        assert_eq!(me["membership"], "B");

        let (status, me) = call(
            &app,
            "PUT",
            "/customers/me",
            As::User(9),
            Some(json!({ "phone": "555-0100", "birth_date": "1990-04-02", "membership": "G" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["membership"], "G");
        assert_eq!(me["birth_date"], "1990-04-02");

        let (status, _) = call(
            &app,
            "PUT",
            "/customers/me",
            As::User(9),
            Some(json!({ "phone": "555-0100", "membership": "X" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, "GET", "/customers/me", As::Anonymous, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn partial_update_keeps_stored_fields() {
        let app = setup();
        call(
            &app,
            "PUT",
            "/customers/me",
            As::User(9),
            Some(json!({ "phone": "555-0100", "birth_date": "1990-04-02", "membership": "G" })),
        )
        .await;

        let (status, me) = call(&app, "PUT", "/customers/me", As::User(9), Some(json!({ "phone": "555-0199" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["phone"], "555-0199");
        assert_eq!(me["birth_date"], "1990-04-02");
        assert_eq!(me["membership"], "G");

        let (status, me) = call(
            &app,
            "PUT",
            &format!("/customers/{}", me["id"].as_str().unwrap()),
            As::WithPermissions(5, "change_customer"),
            Some(json!({ "phone": "555-0199", "birth_date": null })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["birth_date"], Value::Null);
        assert_eq!(me["membership"], "G");

        let (status, body) = call(&app, "PUT", "/customers/me", As::User(9), Some(json!({ "membership": "S" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("phone"));
    }

    #[tokio::test]
    async fn history_requires_view_history() {
        let app = setup();
        let (cart, _, _) = filled_cart(&app).await;
        checkout(&app, &cart, As::User(42)).await;
        let (_, me) = call(&app, "GET", "/customers/me", As::User(42), None).await;
        let uri = format!("/customers/{}/history", me["id"].as_str().unwrap());

        let (status, _) = call(&app, "GET", &uri, STAFF, None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, history) = call(&app, "GET", &uri, As::WithPermissions(5, "view_history"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history.as_array().unwrap().len(), 1);
        assert_eq!(history[0]["total"], "25.00");
    }

    #[tokio::test]
    async fn listing_needs_view_customer() {
        let app = setup();
        call(&app, "GET", "/customers/me", As::User(9), None).await;

        let (status, _) = call(&app, "GET", "/customers", As::User(9), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, list) = call(&app, "GET", "/customers", As::WithPermissions(5, "view_customer"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
    }
}

mod malformed_bodies {
    use super::*;

    fn assert_bad_request(status: StatusCode, body: &Value) {
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert!(body["error"].is_string(), "{body}");
    }

    #[tokio::test]
    async fn wrong_field_types_are_bad_request() {
        let app = setup();
        let cart = create_cart(&app).await;
        let uri = format!("/carts/{cart}/items");

        let (status, body) = call(
            &app,
            "POST",
            &uri,
            As::Anonymous,
            Some(json!({ "product_id": "abc", "quantity": 1 })),
        )
        .await;
        assert_bad_request(status, &body);
        assert!(body["error"].as_str().unwrap().contains("product_id"));

        let (status, body) = call(
            &app,
            "POST",
            &uri,
            As::Anonymous,
            Some(json!({ "product_id": 1, "quantity": 1.5 })),
        )
        .await;
        assert_bad_request(status, &body);
    }

    #[tokio::test]
    async fn missing_fields_are_bad_request() {
        let app = setup();

        let (status, body) = call(&app, "POST", "/orders", As::User(42), Some(json!({}))).await;
        assert_bad_request(status, &body);
        assert!(body["error"].as_str().unwrap().contains("cart_id"));

        let (status, body) = call(&app, "POST", "/collections", STAFF, Some(json!({ "name": "x" }))).await;
        assert_bad_request(status, &body);
    }

    #[tokio::test]
    async fn unparseable_json_is_bad_request() {
        let app = setup();

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/products")
                    .header("x-user-id", "1")
                    .header("x-user-staff", "true")
                    .header("content-type", "application/json")
                    .body(Body::from("{\"title\": "))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn missing_content_type_is_bad_request() {
        let app = setup();
        let cart = create_cart(&app).await;

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/carts/{cart}/items"))
                    .body(Body::from(r#"{"product_id": 1, "quantity": 1}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
