//! # Warehouse API
//!
//! Warehouse CRUD. A warehouse cannot be deleted while it holds stock.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ims_core::{FieldViolation, Role};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_max_len, require_non_empty, Validate};
use crate::state::{AppState, Warehouse};

/// Request to create a warehouse.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateWarehouseRequest {
    pub code: String,
    pub name: String,
    pub location: Option<String>,
}

impl Validate for CreateWarehouseRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        require_non_empty("code", &self.code)?;
        require_max_len("code", &self.code, 32)?;
        require_non_empty("name", &self.name)?;
        require_max_len("name", &self.name, 255)?;
        Ok(())
    }
}

/// Request to update a warehouse.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateWarehouseRequest {
    pub name: Option<String>,
    pub location: Option<String>,
}

impl Validate for UpdateWarehouseRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        if let Some(name) = &self.name {
            require_non_empty("name", name)?;
            require_max_len("name", name, 255)?;
        }
        Ok(())
    }
}

/// Build the warehouses router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/warehouses", post(create_warehouse).get(list_warehouses))
        .route(
            "/v1/warehouses/:id",
            get(get_warehouse)
                .patch(update_warehouse)
                .delete(delete_warehouse),
        )
}

async fn persist_warehouse(state: &AppState, record: &Warehouse) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::catalog::save_warehouse(pool, record).await {
            tracing::error!(warehouse_id = %record.id, error = %e, "failed to persist warehouse");
            return Err(AppError::Internal(
                "warehouse recorded in-memory but database persist failed".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /v1/warehouses — Create a warehouse.
#[utoipa::path(
    post,
    path = "/v1/warehouses",
    request_body = CreateWarehouseRequest,
    responses(
        (status = 201, description = "Warehouse created", body = Warehouse),
        (status = 400, description = "Validation failure", body = crate::error::ErrorBody),
    ),
    tag = "warehouses"
)]
async fn create_warehouse(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateWarehouseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Warehouse>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;

    let code = req.code.trim().to_string();
    if state.warehouses.find(|w| w.code == code).is_some() {
        return Err(AppError::validation("code", &code, "code already exists"));
    }

    let now = state.now();
    let record = Warehouse {
        id: Uuid::new_v4(),
        code,
        name: req.name,
        location: req.location,
        created_at: now,
        updated_at: now,
    };

    state.warehouses.insert(record.id, record.clone());
    persist_warehouse(&state, &record).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/warehouses — List warehouses.
#[utoipa::path(
    get,
    path = "/v1/warehouses",
    responses((status = 200, description = "All warehouses", body = [Warehouse])),
    tag = "warehouses"
)]
async fn list_warehouses(State(state): State<AppState>) -> Json<Vec<Warehouse>> {
    let mut warehouses = state.warehouses.list();
    warehouses.sort_by(|a, b| a.code.cmp(&b.code));
    Json(warehouses)
}

/// GET /v1/warehouses/:id — Get a warehouse.
#[utoipa::path(
    get,
    path = "/v1/warehouses/{id}",
    params(("id" = Uuid, Path, description = "Warehouse ID")),
    responses(
        (status = 200, description = "Warehouse found", body = Warehouse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "warehouses"
)]
async fn get_warehouse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Warehouse>, AppError> {
    let warehouse = state
        .warehouses
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("warehouse {id} not found")))?;
    Ok(Json(warehouse))
}

/// PATCH /v1/warehouses/:id — Update a warehouse.
#[utoipa::path(
    patch,
    path = "/v1/warehouses/{id}",
    params(("id" = Uuid, Path, description = "Warehouse ID")),
    request_body = UpdateWarehouseRequest,
    responses(
        (status = 200, description = "Updated warehouse", body = Warehouse),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "warehouses"
)]
async fn update_warehouse(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateWarehouseRequest>, JsonRejection>,
) -> Result<Json<Warehouse>, AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;

    let now = state.now();
    let updated = state
        .warehouses
        .update(&id, |warehouse| {
            if let Some(name) = req.name.clone() {
                warehouse.name = name;
            }
            if let Some(location) = req.location.clone() {
                warehouse.location = Some(location);
            }
            warehouse.updated_at = now;
        })
        .ok_or_else(|| AppError::not_found(format!("warehouse {id} not found")))?;

    persist_warehouse(&state, &updated).await?;
    Ok(Json(updated))
}

/// DELETE /v1/warehouses/:id — Delete a warehouse.
///
/// Refused while the warehouse holds stock.
#[utoipa::path(
    delete,
    path = "/v1/warehouses/{id}",
    params(("id" = Uuid, Path, description = "Warehouse ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Still holds stock", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "warehouses"
)]
async fn delete_warehouse(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Manager)?;

    if state.stock.warehouse_has_stock(id) {
        return Err(AppError::validation(
            "id",
            id,
            "warehouse still holds stock; transfer it out first",
        ));
    }

    state
        .warehouses
        .remove(&id)
        .ok_or_else(|| AppError::not_found(format!("warehouse {id} not found")))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::catalog::delete_warehouse(pool, id).await {
            tracing::error!(warehouse_id = %id, error = %e, "failed to delete warehouse row");
            return Err(AppError::Internal(
                "warehouse removed in-memory but database delete failed".to_string(),
            ));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}
