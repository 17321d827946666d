//! # Product Catalog API
//!
//! Product CRUD. SKUs are unique; a product cannot be deleted while any
//! warehouse still holds its stock.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ims_core::{FieldViolation, Money, Role};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_max_len, require_non_empty, Validate};
use crate::state::{AppState, Product};

/// Request to create a product.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub sku: String,
    pub name: String,
    /// List price in minor units.
    pub unit_price: i64,
    pub description: Option<String>,
}

impl Validate for CreateProductRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        require_non_empty("sku", &self.sku)?;
        require_max_len("sku", &self.sku, 64)?;
        require_non_empty("name", &self.name)?;
        require_max_len("name", &self.name, 255)?;
        if self.unit_price < 0 {
            return Err(FieldViolation::new(
                "unit_price",
                self.unit_price,
                "must not be negative",
            ));
        }
        Ok(())
    }
}

/// Request to update a product.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub unit_price: Option<i64>,
    pub description: Option<String>,
}

impl Validate for UpdateProductRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
            require_max_len("name", name, 255)?;
        }
        if let Some(price) = self.unit_price {
            if price < 0 {
                return Err(FieldViolation::new(
                    "unit_price",
                    price,
                    "must not be negative",
                ));
            }
        }
        Ok(())
    }
}

/// Build the products router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/products", post(create_product).get(list_products))
        .route(
            "/v1/products/:id",
            get(get_product).patch(update_product).delete(delete_product),
        )
        .route("/v1/products/:id/stock", get(product_stock))
}

async fn persist_product(state: &AppState, record: &Product) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::catalog::save_product(pool, record).await {
            tracing::error!(product_id = %record.id, error = %e, "failed to persist product");
            return Err(AppError::Internal(
                "product recorded in-memory but database persist failed".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /v1/products — Create a product.
#[utoipa::path(
    post,
    path = "/v1/products",
    request_body = CreateProductRequest,
    responses(
        (status = 201, description = "Product created", body = Product),
        (status = 400, description = "Validation failure", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
async fn create_product(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateProductRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Product>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;

    let sku = req.sku.trim().to_string();
    if state.products.find(|p| p.sku == sku).is_some() {
        return Err(AppError::validation("sku", &sku, "sku already exists"));
    }

    let now = state.now();
    let record = Product {
        id: Uuid::new_v4(),
        sku,
        name: req.name,
        unit_price: Money::from_minor(req.unit_price),
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    state.products.insert(record.id, record.clone());
    persist_product(&state, &record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/products — List products.
#[utoipa::path(
    get,
    path = "/v1/products",
    responses((status = 200, description = "All products", body = [Product])),
    tag = "products"
)]
async fn list_products(State(state): State<AppState>) -> Json<Vec<Product>> {
    let mut products = state.products.list();
    products.sort_by(|a, b| a.sku.cmp(&b.sku));
    Json(products)
}

/// GET /v1/products/:id — Get a product.
#[utoipa::path(
    get,
    path = "/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Product found", body = Product),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, AppError> {
    let product = state
        .products
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("product {id} not found")))?;
    Ok(Json(product))
}

/// GET /v1/products/:id/stock — Current levels across warehouses.
#[utoipa::path(
    get,
    path = "/v1/products/{id}/stock",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Non-zero levels keyed by warehouse"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
async fn product_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, AppError> {
    if !state.products.contains(&id) {
        return Err(AppError::not_found(format!("product {id} not found")));
    }
    let levels: Vec<serde_json::Value> = state
        .stock
        .levels_for_product(id)
        .into_iter()
        .map(|(warehouse_id, quantity)| {
            serde_json::json!({ "warehouse_id": warehouse_id, "quantity": quantity })
        })
        .collect();
    Ok(Json(serde_json::json!({ "product_id": id, "levels": levels })))
}

/// PATCH /v1/products/:id — Update a product.
#[utoipa::path(
    patch,
    path = "/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    request_body = UpdateProductRequest,
    responses(
        (status = 200, description = "Updated product", body = Product),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
async fn update_product(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateProductRequest>, JsonRejection>,
) -> Result<Json<Product>, AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;

    let now = state.now();
    let updated = state
        .products
        .update(&id, |product| {
            if let Some(name) = req.name.clone() {
                product.name = name;
            }
            if let Some(price) = req.unit_price {
                product.unit_price = Money::from_minor(price);
            }
            if let Some(description) = req.description.clone() {
                product.description = Some(description);
            }
            product.updated_at = now;
        })
        .ok_or_else(|| AppError::not_found(format!("product {id} not found")))?;

    persist_product(&state, &updated).await?;
    Ok(Json(updated))
}

/// DELETE /v1/products/:id — Delete a product.
///
/// Refused while any warehouse still holds stock of it.
#[utoipa::path(
    delete,
    path = "/v1/products/{id}",
    params(("id" = Uuid, Path, description = "Product ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Still stocked", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "products"
)]
async fn delete_product(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Manager)?;

    if state.stock.product_has_stock(id) {
        return Err(AppError::validation(
            "id",
            id,
            "product still has stock on hand; adjust it to zero first",
        ));
    }

    state
        .products
        .remove(&id)
        .ok_or_else(|| AppError::not_found(format!("product {id} not found")))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::catalog::delete_product(pool, id).await {
            tracing::error!(product_id = %id, error = %e, "failed to delete product row");
            return Err(AppError::Internal(
                "product removed in-memory but database delete failed".to_string(),
            ));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
