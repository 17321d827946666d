//! # OpenAPI Specification Assembly
//!
//! Assembles all utoipa-documented routes into a single OpenAPI spec
//! served at `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

/// Adds the Bearer token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "Bearer token authentication. Set via IMS_AUTH_TOKEN env var.",
                        ))
                        .build(),
                ),
            );
        }
    }
}

/// Assembled OpenAPI spec for the entire API surface.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "IMS API — Inventory Management Stack",
        version = "0.3.9",
        description = "Inventory management API: sales orders and purchase orders with lifecycle state machines, a product/warehouse catalog, an append-only stock movement ledger, and user administration.\n\nAuthentication: Bearer token via `Authorization: Bearer <token>` header. All `/v1/*` endpoints except `/v1/auth/login` require authentication. Health probes (`/health/*`) are unauthenticated.\n\nRate limiting: a global budget applies to every API request; a stricter budget guards `/v1/auth/*`. Admin roles and actors holding an unexpired exemption grant are not counted. 429 responses carry `RateLimit-*` headers and the reset time.",
        license(name = "BUSL-1.1"),
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server"),
    ),
    security(
        ("bearer_auth" = [])
    ),
    paths(
        // ── Orders ──────────────────────────────────────────────────────
        crate::routes::orders::create_order,
        crate::routes::orders::list_orders,
        crate::routes::orders::get_order,
        crate::routes::orders::update_order,
        crate::routes::orders::delete_order,
        crate::routes::orders::process_order,
        crate::routes::orders::ship_order,
        crate::routes::orders::deliver_order,
        crate::routes::orders::complete_order,
        crate::routes::orders::cancel_order,
        // ── Purchases ───────────────────────────────────────────────────
        crate::routes::purchases::create_purchase,
        crate::routes::purchases::list_purchases,
        crate::routes::purchases::get_purchase,
        crate::routes::purchases::update_purchase,
        crate::routes::purchases::delete_purchase,
        crate::routes::purchases::place_purchase,
        crate::routes::purchases::receive_purchase,
        crate::routes::purchases::cancel_purchase,
        crate::routes::purchases::return_purchase,
        // ── Catalog ─────────────────────────────────────────────────────
        crate::routes::products::create_product,
        crate::routes::products::list_products,
        crate::routes::products::get_product,
        crate::routes::products::product_stock,
        crate::routes::products::update_product,
        crate::routes::products::delete_product,
        crate::routes::warehouses::create_warehouse,
        crate::routes::warehouses::list_warehouses,
        crate::routes::warehouses::get_warehouse,
        crate::routes::warehouses::update_warehouse,
        crate::routes::warehouses::delete_warehouse,
        // ── Stock ───────────────────────────────────────────────────────
        crate::routes::stock::get_level,
        crate::routes::stock::list_transactions,
        crate::routes::stock::create_adjustment,
        crate::routes::stock::create_transfer,
        // ── Users & Auth ────────────────────────────────────────────────
        crate::routes::users::create_user,
        crate::routes::users::list_users,
        crate::routes::users::get_user,
        crate::routes::users::update_user,
        crate::routes::users::delete_user,
        crate::routes::users::grant_exemption,
        crate::routes::users::revoke_exemption,
        crate::routes::users::login,
    ),
    components(schemas(
        crate::error::ErrorBody,
        crate::error::ErrorDetail,
        crate::state::Product,
        crate::state::Warehouse,
        crate::state::UserRecord,
        crate::routes::orders::LineItemRequest,
        crate::routes::orders::CreateOrderRequest,
        crate::routes::orders::UpdateOrderRequest,
        crate::routes::orders::CancelRequest,
        crate::routes::purchases::CreatePurchaseRequest,
        crate::routes::purchases::UpdatePurchaseRequest,
        crate::routes::purchases::ReasonRequest,
        crate::routes::products::CreateProductRequest,
        crate::routes::products::UpdateProductRequest,
        crate::routes::warehouses::CreateWarehouseRequest,
        crate::routes::warehouses::UpdateWarehouseRequest,
        crate::routes::stock::AdjustmentRequest,
        crate::routes::stock::TransferRequest,
        crate::routes::users::CreateUserRequest,
        crate::routes::users::UpdateUserRequest,
        crate::routes::users::ExemptionRequest,
        crate::routes::users::LoginRequest,
        crate::routes::users::LoginResponse,
    )),
    tags(
        (name = "orders", description = "Sales order lifecycle"),
        (name = "purchases", description = "Purchase order lifecycle"),
        (name = "products", description = "Product catalog"),
        (name = "warehouses", description = "Warehouse catalog"),
        (name = "stock", description = "Stock ledger and manual postings"),
        (name = "users", description = "User administration"),
        (name = "auth", description = "Authentication"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Build the OpenAPI router.
pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(serve_openapi))
}

/// GET /openapi.json — the assembled spec.
async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_contains_all_route_groups() {
        let spec = ApiDoc::openapi();
        let paths: Vec<&String> = spec.paths.paths.keys().collect();
        assert!(paths.iter().any(|p| p.starts_with("/v1/orders")));
        assert!(paths.iter().any(|p| p.starts_with("/v1/purchases")));
        assert!(paths.iter().any(|p| p.starts_with("/v1/products")));
        assert!(paths.iter().any(|p| p.starts_with("/v1/warehouses")));
        assert!(paths.iter().any(|p| p.starts_with("/v1/stock")));
        assert!(paths.iter().any(|p| p.starts_with("/v1/users")));
        assert!(paths.iter().any(|p| p.starts_with("/v1/auth/login")));
    }

    #[test]
    fn spec_serializes_to_json() {
        let spec = ApiDoc::openapi();
        let json = serde_json::to_string(&spec).unwrap();
        assert!(json.contains("Inventory Management Stack"));
    }
}
