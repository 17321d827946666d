//! # Integration Tests for ims-api
//!
//! Drives the assembled router end-to-end: order and purchase lifecycle
//! transitions, stock side effects, rate limiting with role-based
//! exemption, manual bypass, the strict auth limiter, and the error body
//! contract. Time is driven by a manual clock — no sleeping.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use ims_api::middleware::rate_limit::RateLimitConfig;
use ims_api::state::{AppConfig, AppState, Product, UserRecord, Warehouse};
use ims_core::{Clock, ManualClock, Money, Role};

const SECRET: &str = "test-secret";

/// Build a test state on a manual clock with auth enabled and the given
/// limiter budgets.
fn test_state(global: RateLimitConfig, auth: RateLimitConfig) -> (AppState, ManualClock) {
    let clock = ManualClock::new(Utc::now());
    let config = AppConfig {
        auth_token: Some(SECRET.to_string()),
        metrics_enabled: false,
        global_rate_limit: global,
        auth_rate_limit: auth,
        ..Default::default()
    };
    let state = AppState::with_config_and_clock(config, None, Arc::new(clock.clone()));
    (state, clock)
}

/// Defaults generous enough that only the scenario under test hits a limit.
fn default_state() -> (AppState, ManualClock) {
    test_state(RateLimitConfig::global(), RateLimitConfig::auth())
}

/// Seed a product and a warehouse, returning their IDs.
fn seed_catalog(state: &AppState) -> (Uuid, Uuid) {
    let now = state.now();
    let product = Product {
        id: Uuid::new_v4(),
        sku: "SKU-001".to_string(),
        name: "Widget".to_string(),
        unit_price: Money::from_minor(1500),
        description: None,
        created_at: now,
        updated_at: now,
    };
    let warehouse = Warehouse {
        id: Uuid::new_v4(),
        code: "WH-001".to_string(),
        name: "Main".to_string(),
        location: None,
        created_at: now,
        updated_at: now,
    };
    state.products.insert(product.id, product.clone());
    state.warehouses.insert(warehouse.id, warehouse.clone());
    (product.id, warehouse.id)
}

/// Seed a user with the given role, returning its ID.
fn seed_user(state: &AppState, username: &str, role: Role) -> Uuid {
    let now = state.now();
    let user = UserRecord {
        id: Uuid::new_v4(),
        username: username.to_string(),
        role,
        rate_limit_exempt_until: None,
        active: true,
        created_at: now,
        updated_at: now,
    };
    state.users.insert(user.id, user.clone());
    user.id
}

fn token(role: Role, actor_id: Option<Uuid>) -> String {
    format!(
        "{}:{}:{}",
        role.as_str(),
        actor_id.map(|id| id.to_string()).unwrap_or_default(),
        SECRET
    )
}

async fn send(
    app: &axum::Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value, axum::http::HeaderMap) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(bearer) = bearer {
        builder = builder.header("Authorization", format!("Bearer {bearer}"));
    }
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json, headers)
}

fn order_body(product_id: Uuid, warehouse_id: Uuid, quantity: u32) -> serde_json::Value {
    serde_json::json!({
        "customer_name": "Acme Retail",
        "warehouse_id": warehouse_id,
        "line_items": [{"product_id": product_id, "quantity": quantity}],
    })
}

fn purchase_body(product_id: Uuid, warehouse_id: Uuid, quantity: u32) -> serde_json::Value {
    serde_json::json!({
        "supplier_name": "Northwind Supply",
        "warehouse_id": warehouse_id,
        "line_items": [{"product_id": product_id, "quantity": quantity, "unit_price": 450}],
    })
}

// -- Order Lifecycle ----------------------------------------------------------

#[tokio::test]
async fn order_codes_are_sequential() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (status, first, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 1)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["code"], "OR-00001");
    assert_eq!(first["status"], "Pending");

    let (_, second, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 2)),
    )
    .await;
    assert_eq!(second["code"], "OR-00002");
}

#[tokio::test]
async fn order_total_is_derived_from_line_items() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    // Unit price falls back to the catalog price (1500).
    let (_, order, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 3)),
    )
    .await;
    assert_eq!(order["total_amount"], 4500);

    // Updating the items recomputes the total.
    let id = order["id"].as_str().unwrap();
    let (status, updated, _) = send(
        &app,
        "PATCH",
        &format!("/v1/orders/{id}"),
        Some(&staff),
        Some(serde_json::json!({
            "line_items": [{"product_id": product, "quantity": 2, "unit_price": 100}],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["total_amount"], 200);
}

#[tokio::test]
async fn process_succeeds_only_from_pending() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let actor = Uuid::new_v4();
    let staff = token(Role::Staff, Some(actor));

    let (_, order, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 1)),
    )
    .await;
    let id = order["id"].as_str().unwrap().to_string();

    let (status, processed, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{id}/process"),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(processed["status"], "Processing");
    assert_eq!(processed["processed_by"], actor.to_string());

    // Second attempt: 400 with the structured validation body, status
    // unchanged.
    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{id}/process"),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["success"], false);
    assert_eq!(err["error"]["type"], "ValidationError");
    assert_eq!(err["error"]["details"]["field"], "status");
    assert_eq!(err["error"]["details"]["value"], "Processing");

    let (_, current, _) = send(&app, "GET", &format!("/v1/orders/{id}"), Some(&staff), None).await;
    assert_eq!(current["status"], "Processing");
}

#[tokio::test]
async fn complete_requires_delivered() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (_, order, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 1)),
    )
    .await;
    let id = order["id"].as_str().unwrap();

    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{id}/complete"),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"]["message"]
        .as_str()
        .unwrap()
        .contains("complete"));
}

#[tokio::test]
async fn cancel_without_reason_fails_regardless_of_status() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (_, order, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 1)),
    )
    .await;
    let id = order["id"].as_str().unwrap();

    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{id}/cancel"),
        Some(&staff),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["type"], "ValidationError");
    assert_eq!(err["error"]["details"]["field"], "reason");

    let (status, cancelled, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{id}/cancel"),
        Some(&staff),
        Some(serde_json::json!({"reason": "customer request"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "Cancelled");
    assert_eq!(cancelled["cancellation_reason"], "customer request");
}

#[tokio::test]
async fn generic_update_rejects_off_whitelist_status_change() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (_, order, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 1)),
    )
    .await;
    let id = order["id"].as_str().unwrap();

    // Pending -> Shipped is not on the whitelist even though the state
    // machine can reach Shipped through dedicated operations.
    let (status, err, _) = send(
        &app,
        "PATCH",
        &format!("/v1/orders/{id}"),
        Some(&staff),
        Some(serde_json::json!({"status": "Shipped"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["details"]["field"], "status");

    // Pending -> Processing is whitelisted.
    let (status, updated, _) = send(
        &app,
        "PATCH",
        &format!("/v1/orders/{id}"),
        Some(&staff),
        Some(serde_json::json!({"status": "Processing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "Processing");
}

#[tokio::test]
async fn delete_respects_grace_period() {
    let (state, clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let manager = token(Role::Manager, Some(Uuid::new_v4()));

    let (_, stale, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&manager),
        Some(order_body(product, warehouse, 1)),
    )
    .await;
    let stale_id = stale["id"].as_str().unwrap().to_string();

    // 25 hours later the Pending order is no longer deletable.
    clock.advance(Duration::hours(25));
    let (status, err, _) = send(
        &app,
        "DELETE",
        &format!("/v1/orders/{stale_id}"),
        Some(&manager),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["type"], "ValidationError");

    // A fresh Pending order deletes fine.
    let (_, fresh, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&manager),
        Some(order_body(product, warehouse, 1)),
    )
    .await;
    let fresh_id = fresh["id"].as_str().unwrap().to_string();
    clock.advance(Duration::hours(1));
    let (status, _, _) = send(
        &app,
        "DELETE",
        &format!("/v1/orders/{fresh_id}"),
        Some(&manager),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn unknown_order_returns_404() {
    let (state, _clock) = default_state();
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{}/process", Uuid::new_v4()),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["error"]["type"], "NotFoundError");
}

// -- Stock Side Effects -------------------------------------------------------

#[tokio::test]
async fn purchase_receive_posts_stock_and_ship_consumes_it() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state.clone());
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    // Shipping before any stock exists fails and leaves the order in
    // Processing.
    let (_, order, _) = send(
        &app,
        "POST",
        "/v1/orders",
        Some(&staff),
        Some(order_body(product, warehouse, 5)),
    )
    .await;
    let order_id = order["id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        &format!("/v1/orders/{order_id}/process"),
        Some(&staff),
        None,
    )
    .await;
    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{order_id}/ship"),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"]["message"]
        .as_str()
        .unwrap()
        .contains("insufficient stock"));

    // Receive a purchase to stock the warehouse.
    let (_, purchase, _) = send(
        &app,
        "POST",
        "/v1/purchases",
        Some(&staff),
        Some(purchase_body(product, warehouse, 10)),
    )
    .await;
    let purchase_id = purchase["id"].as_str().unwrap().to_string();
    send(
        &app,
        "POST",
        &format!("/v1/purchases/{purchase_id}/place"),
        Some(&staff),
        None,
    )
    .await;
    let (status, received, _) = send(
        &app,
        "POST",
        &format!("/v1/purchases/{purchase_id}/receive"),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(received["status"], "Received");
    assert_eq!(state.stock.level(product, warehouse), 10);

    // Now the ship succeeds and consumes 5.
    let (status, shipped, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{order_id}/ship"),
        Some(&staff),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shipped["status"], "Shipped");
    assert_eq!(state.stock.level(product, warehouse), 5);

    // Cancelling the shipped order restocks it.
    let (status, cancelled, _) = send(
        &app,
        "POST",
        &format!("/v1/orders/{order_id}/cancel"),
        Some(&staff),
        Some(serde_json::json!({"reason": "customer refused delivery"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(cancelled["status"], "Cancelled");
    assert_eq!(state.stock.level(product, warehouse), 10);
}

#[tokio::test]
async fn transfer_moves_stock_between_warehouses() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let now = state.now();
    let second = Warehouse {
        id: Uuid::new_v4(),
        code: "WH-002".to_string(),
        name: "Overflow".to_string(),
        location: None,
        created_at: now,
        updated_at: now,
    };
    state.warehouses.insert(second.id, second.clone());
    let app = ims_api::app(state.clone());
    let manager = token(Role::Manager, Some(Uuid::new_v4()));

    // Stock the source via an adjustment.
    let (status, _, _) = send(
        &app,
        "POST",
        "/v1/stock/adjustments",
        Some(&manager),
        Some(serde_json::json!({
            "product_id": product,
            "warehouse_id": warehouse,
            "delta": 8,
            "reason": "initial count",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, legs, _) = send(
        &app,
        "POST",
        "/v1/stock/transfers",
        Some(&manager),
        Some(serde_json::json!({
            "product_id": product,
            "from_warehouse_id": warehouse,
            "to_warehouse_id": second.id,
            "quantity": 5,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(legs.as_array().unwrap().len(), 2);
    assert_eq!(state.stock.level(product, warehouse), 3);
    assert_eq!(state.stock.level(product, second.id), 5);

    // Overdraw posts neither leg.
    let (status, _, _) = send(
        &app,
        "POST",
        "/v1/stock/transfers",
        Some(&manager),
        Some(serde_json::json!({
            "product_id": product,
            "from_warehouse_id": warehouse,
            "to_warehouse_id": second.id,
            "quantity": 4,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(state.stock.level(product, warehouse), 3);
    assert_eq!(state.stock.level(product, second.id), 5);
}

#[tokio::test]
async fn adjustments_require_manager_role() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (status, err, _) = send(
        &app,
        "POST",
        "/v1/stock/adjustments",
        Some(&staff),
        Some(serde_json::json!({
            "product_id": product,
            "warehouse_id": warehouse,
            "delta": 1,
            "reason": "count",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"]["type"], "AuthorizationError");
}

// -- Rate Limiting ------------------------------------------------------------

#[tokio::test]
async fn global_limiter_enforces_budget_then_resets() {
    let (state, clock) = test_state(
        RateLimitConfig {
            max_requests: 2,
            window: Duration::seconds(1),
        },
        RateLimitConfig::auth(),
    );
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (status, _, headers) = send(&app, "GET", "/v1/orders", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("RateLimit-Limit").unwrap(), "2");
    assert_eq!(headers.get("RateLimit-Remaining").unwrap(), "1");

    let (status, _, headers) = send(&app, "GET", "/v1/orders", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("RateLimit-Remaining").unwrap(), "0");

    // Third request within the window: 429 with the documented body.
    let (status, err, headers) = send(&app, "GET", "/v1/orders", Some(&staff), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err["success"], false);
    assert_eq!(err["error"]["type"], "ApiError");
    assert_eq!(err["error"]["details"]["limit"], 2);
    assert_eq!(err["error"]["details"]["remaining"], 0);
    assert!(err["error"]["details"]["resetTime"].is_string());
    assert_eq!(headers.get("RateLimit-Remaining").unwrap(), "0");

    // After the window elapses the counter resets.
    clock.advance(Duration::seconds(1));
    let (status, _, _) = send(&app, "GET", "/v1/orders", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_is_exempt_from_the_budget() {
    let (state, _clock) = test_state(
        RateLimitConfig {
            max_requests: 2,
            window: Duration::seconds(60),
        },
        RateLimitConfig::auth(),
    );
    let admin_id = seed_user(&state, "admin", Role::Admin);
    let app = ims_api::app(state);
    let admin = token(Role::Admin, Some(admin_id));

    for _ in 0..5 {
        let (status, _, headers) = send(&app, "GET", "/v1/orders", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        // Exempt requests skip counting and carry no budget headers.
        assert!(headers.get("RateLimit-Limit").is_none());
    }
}

#[tokio::test]
async fn exemption_grant_honored_only_while_in_the_future() {
    let (state, clock) = test_state(
        RateLimitConfig {
            max_requests: 2,
            window: Duration::seconds(60),
        },
        RateLimitConfig::auth(),
    );
    let user_id = seed_user(&state, "granted", Role::Staff);
    state.users.update(&user_id, |u| {
        u.rate_limit_exempt_until = Some(clock.now() + Duration::hours(1));
    });
    let app = ims_api::app(state.clone());
    let granted = token(Role::Staff, Some(user_id));

    // Exempt: 5 requests against a budget of 2, all 200.
    for _ in 0..5 {
        let (status, _, _) = send(&app, "GET", "/v1/orders", Some(&granted), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Two hours later the grant has lapsed and the budget applies again.
    clock.advance(Duration::hours(2));
    for _ in 0..2 {
        let (status, _, _) = send(&app, "GET", "/v1/orders", Some(&granted), None).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, _) = send(&app, "GET", "/v1/orders", Some(&granted), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn manual_bypass_path_is_unlimited() {
    let clock = ManualClock::new(Utc::now());
    let config = AppConfig {
        auth_token: Some(SECRET.to_string()),
        metrics_enabled: false,
        global_rate_limit: RateLimitConfig {
            max_requests: 1,
            window: Duration::seconds(60),
        },
        rate_limit_bypass_paths: vec!["/v1/products".to_string()],
        ..Default::default()
    };
    let state = AppState::with_config_and_clock(config, None, Arc::new(clock));
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    // The bypassed prefix never consumes budget.
    for _ in 0..5 {
        let (status, _, _) = send(&app, "GET", "/v1/products", Some(&staff), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    // Other routes still hit the budget of 1.
    let (status, _, _) = send(&app, "GET", "/v1/orders", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, "GET", "/v1/orders", Some(&staff), None).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn auth_endpoint_uses_the_strict_budget() {
    let (state, clock) = test_state(
        RateLimitConfig::global(),
        RateLimitConfig {
            max_requests: 2,
            window: Duration::seconds(1),
        },
    );
    seed_user(&state, "alice", Role::Staff);
    let app = ims_api::app(state);
    let body = serde_json::json!({"username": "alice"});

    // Unauthenticated requests are keyed by network identity.
    for _ in 0..2 {
        let (status, json, _) = send(&app, "POST", "/v1/auth/login", None, Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["token"].as_str().unwrap().starts_with("staff:"));
    }
    let (status, err, _) = send(&app, "POST", "/v1/auth/login", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(err["error"]["type"], "ApiError");

    // Window expiry frees the budget again.
    clock.advance(Duration::seconds(1));
    let (status, _, _) = send(&app, "POST", "/v1/auth/login", None, Some(body)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_token_round_trips_through_auth() {
    let (state, _clock) = default_state();
    seed_user(&state, "bob", Role::Manager);
    let app = ims_api::app(state);

    let (status, login, _) = send(
        &app,
        "POST",
        "/v1/auth/login",
        None,
        Some(serde_json::json!({"username": "bob"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let bearer = login["token"].as_str().unwrap().to_string();

    let (status, _, _) = send(&app, "GET", "/v1/orders", Some(&bearer), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn inactive_user_cannot_log_in() {
    let (state, _clock) = default_state();
    let id = seed_user(&state, "carol", Role::Staff);
    state.users.update(&id, |u| u.active = false);
    let app = ims_api::app(state);

    let (status, err, _) = send(
        &app,
        "POST",
        "/v1/auth/login",
        None,
        Some(serde_json::json!({"username": "carol"})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["error"]["type"], "AuthorizationError");
}

// -- Auth & Access ------------------------------------------------------------

#[tokio::test]
async fn api_routes_require_authentication() {
    let (state, _clock) = default_state();
    let app = ims_api::app(state);

    let (status, _, _) = send(&app, "GET", "/v1/orders", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn health_probes_are_unauthenticated() {
    let (state, _clock) = default_state();
    let app = ims_api::app(state);

    let (status, _, _) = send(&app, "GET", "/health/liveness", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, "GET", "/health/readiness", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn user_administration_requires_admin() {
    let (state, _clock) = default_state();
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));
    let admin = token(Role::Admin, None);

    let (status, _, _) = send(&app, "GET", "/v1/users", Some(&staff), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, created, _) = send(
        &app,
        "POST",
        "/v1/users",
        Some(&admin),
        Some(serde_json::json!({"username": "dave", "role": "staff"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["role"], "staff");
}

#[tokio::test]
async fn exemption_grant_must_be_in_the_future() {
    let (state, clock) = default_state();
    let id = seed_user(&state, "erin", Role::Staff);
    let app = ims_api::app(state);
    let admin = token(Role::Admin, None);

    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/users/{id}/rate-limit-exemption"),
        Some(&admin),
        Some(serde_json::json!({"until": clock.now() - Duration::hours(1)})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["details"]["field"], "until");

    let (status, granted, _) = send(
        &app,
        "POST",
        &format!("/v1/users/{id}/rate-limit-exemption"),
        Some(&admin),
        Some(serde_json::json!({"until": clock.now() + Duration::hours(1)})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(granted["rate_limit_exempt_until"].is_string());
}

// -- Purchase Lifecycle -------------------------------------------------------

#[tokio::test]
async fn purchase_return_reverses_stock() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state.clone());
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (_, purchase, _) = send(
        &app,
        "POST",
        "/v1/purchases",
        Some(&staff),
        Some(purchase_body(product, warehouse, 4)),
    )
    .await;
    assert_eq!(purchase["code"], "PO-00001");
    assert_eq!(purchase["total_amount"], 1800);
    let id = purchase["id"].as_str().unwrap().to_string();

    send(&app, "POST", &format!("/v1/purchases/{id}/place"), Some(&staff), None).await;
    send(&app, "POST", &format!("/v1/purchases/{id}/receive"), Some(&staff), None).await;
    assert_eq!(state.stock.level(product, warehouse), 4);

    // Returning without a reason is rejected.
    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/purchases/{id}/return"),
        Some(&staff),
        Some(serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["details"]["field"], "reason");

    let (status, returned, _) = send(
        &app,
        "POST",
        &format!("/v1/purchases/{id}/return"),
        Some(&staff),
        Some(serde_json::json!({"reason": "failed inspection"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(returned["status"], "Returned");
    assert_eq!(state.stock.level(product, warehouse), 0);
}

#[tokio::test]
async fn purchase_cancel_only_before_receipt() {
    let (state, _clock) = default_state();
    let (product, warehouse) = seed_catalog(&state);
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (_, purchase, _) = send(
        &app,
        "POST",
        "/v1/purchases",
        Some(&staff),
        Some(purchase_body(product, warehouse, 1)),
    )
    .await;
    let id = purchase["id"].as_str().unwrap().to_string();

    send(&app, "POST", &format!("/v1/purchases/{id}/place"), Some(&staff), None).await;
    send(&app, "POST", &format!("/v1/purchases/{id}/receive"), Some(&staff), None).await;

    let (status, err, _) = send(
        &app,
        "POST",
        &format!("/v1/purchases/{id}/cancel"),
        Some(&staff),
        Some(serde_json::json!({"reason": "too late"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["error"]["details"]["value"], "Received");
}

// -- OpenAPI ------------------------------------------------------------------

#[tokio::test]
async fn openapi_spec_is_served() {
    let (state, _clock) = default_state();
    let app = ims_api::app(state);
    let staff = token(Role::Staff, Some(Uuid::new_v4()));

    let (status, spec, _) = send(&app, "GET", "/openapi.json", Some(&staff), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(spec["paths"]["/v1/orders"].is_object());
}
