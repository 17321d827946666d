//! # ims-api — Axum API Service for the IMS Stack
//!
//! HTTP surface over the IMS domain: sales orders and purchase orders with
//! lifecycle state machines, the product/warehouse catalog, the stock
//! movement ledger, and user administration.
//!
//! ## API Surface
//!
//! | Prefix              | Module                  | Domain                    |
//! |---------------------|-------------------------|---------------------------|
//! | `/v1/orders/*`      | [`routes::orders`]      | Sales order lifecycle     |
//! | `/v1/purchases/*`   | [`routes::purchases`]   | Purchase order lifecycle  |
//! | `/v1/products/*`    | [`routes::products`]    | Product catalog           |
//! | `/v1/warehouses/*`  | [`routes::warehouses`]  | Warehouse catalog         |
//! | `/v1/stock/*`       | [`routes::stock`]       | Stock ledger & postings   |
//! | `/v1/users/*`       | [`routes::users`]       | User administration       |
//! | `/v1/auth/login`    | [`routes::users`]       | Token exchange            |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → Metrics → Auth → RateLimitBypass → RateLimit(global) → Handler
//! ```
//!
//! Auth runs before rate limiting so the limiter can key on the caller's
//! identity and evaluate role/grant exemptions. The bypass middleware runs
//! before the counting middleware — the marker it sets is consumed by the
//! limiter, so the ordering is load-bearing. The login route is mounted
//! outside auth, behind the stricter auth limiter keyed on network
//! identity.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::IntoResponse;
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
///
/// Health probes (`/health/*`) and `/metrics` are mounted outside the auth
/// middleware so they remain accessible without credentials.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let metrics = ApiMetrics::new();
    let metrics_on = state.config.metrics_enabled;

    // Authenticated API routes.
    //
    // Body size limit: 2 MiB. This prevents OOM from oversized request
    // bodies.
    //
    // Middleware execution order (outermost → innermost):
    //   TraceLayer → Metrics → Auth → RateLimitBypass → RateLimit → Handler
    //
    // Auth runs BEFORE rate limiting so the limiter can key on actor
    // identity and apply the role/grant exemptions; the bypass marker is
    // set before the counting middleware consumes it.
    let mut api = Router::new()
        .merge(routes::orders::router())
        .merge(routes::purchases::router())
        .merge(routes::products::router())
        .merge(routes::warehouses::router())
        .merge(routes::stock::router())
        .merge(routes::users::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::global_rate_limit_middleware,
        ))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::rate_limit_bypass_middleware,
        ))
        .layer(from_fn(auth::auth_middleware));

    // Only register the metrics middleware when metrics are enabled.
    if metrics_on {
        api = api
            .layer(from_fn(middleware::metrics::metrics_middleware))
            .layer(Extension(metrics.clone()));
    }

    let api = api
        .layer(TraceLayer::new_for_http())
        .layer(Extension(auth_config))
        .with_state(state.clone());

    // Token exchange — unauthenticated by nature, so it gets the strict
    // limiter keyed on network identity instead.
    let auth_api = routes::users::auth_router()
        .layer(from_fn_with_state(
            state.clone(),
            middleware::rate_limit::auth_rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    // Unauthenticated health probes — readiness checks actual service health.
    let mut unauthenticated = Router::new()
        .route("/health/liveness", axum::routing::get(liveness))
        .route("/health/readiness", axum::routing::get(readiness));

    if metrics_on {
        unauthenticated = unauthenticated
            .route("/metrics", axum::routing::get(prometheus_metrics))
            .layer(Extension(metrics));
    }

    let unauthenticated = unauthenticated.with_state(state);

    Router::new()
        .merge(unauthenticated)
        .merge(auth_api)
        .merge(api)
}

/// GET /metrics — Prometheus metrics scrape endpoint.
///
/// Updates domain gauges from current `AppState` on each scrape (pull
/// model), then gathers and encodes all metrics in Prometheus text
/// exposition format.
async fn prometheus_metrics(
    State(state): State<AppState>,
    Extension(metrics): Extension<ApiMetrics>,
) -> impl IntoResponse {
    // -- Update domain gauges from AppState --

    metrics.orders_total().reset();
    for order in state.orders.list() {
        metrics
            .orders_total()
            .with_label_values(&[order.status.as_str()])
            .inc();
    }

    metrics.purchases_total().reset();
    for purchase in state.purchases.list() {
        metrics
            .purchases_total()
            .with_label_values(&[purchase.status.as_str()])
            .inc();
    }

    metrics.products_total().set(state.products.len() as f64);
    metrics
        .warehouses_total()
        .set(state.warehouses.len() as f64);
    metrics.users_total().set(state.users.len() as f64);
    metrics
        .stock_transactions_total()
        .set(state.stock.journal_len() as f64);

    // -- Gather and encode --
    match metrics.gather_and_encode() {
        Ok(body) => (
            StatusCode::OK,
            [(
                axum::http::header::CONTENT_TYPE,
                "text/plain; version=0.0.4; charset=utf-8",
            )],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Failed to encode Prometheus metrics: {e}");
            (StatusCode::INTERNAL_SERVER_ERROR, e).into_response()
        }
    }
}

/// Liveness probe — always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness probe — verifies the application is ready to serve traffic.
///
/// Checks:
/// - In-memory stores are accessible.
/// - Database connection is healthy (when configured).
///
/// Returns 200 "ready" or 503 with a diagnostic message.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    // Verify stores are accessible (read lock acquirable).
    let _ = state.orders.len();
    let _ = state.purchases.len();
    let _ = state.products.len();

    // Verify database connection (when configured).
    if let Some(pool) = &state.db_pool {
        if let Err(e) = sqlx::query("SELECT 1").execute(pool).await {
            tracing::warn!("Database health check failed: {e}");
            return (StatusCode::SERVICE_UNAVAILABLE, "database unreachable").into_response();
        }
    }

    (StatusCode::OK, "ready").into_response()
}
