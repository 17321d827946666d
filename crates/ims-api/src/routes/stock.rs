//! # Stock Movement API
//!
//! Read endpoints over the stock ledger plus manual postings: adjustments
//! (signed delta, reason required) and inter-warehouse transfers (both legs
//! or neither).

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ims_core::{FieldViolation, Role};
use ims_state::StockTransaction;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_non_empty, Validate};
use crate::state::AppState;

/// Manual stock adjustment request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustmentRequest {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    /// Signed level change; negative for shrinkage.
    pub delta: i64,
    pub reason: String,
}

impl Validate for AdjustmentRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        require_non_empty("reason", &self.reason)
    }
}

/// Inter-warehouse transfer request.
#[derive(Debug, Deserialize, ToSchema)]
pub struct TransferRequest {
    pub product_id: Uuid,
    pub from_warehouse_id: Uuid,
    pub to_warehouse_id: Uuid,
    pub quantity: i64,
}

impl Validate for TransferRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        if self.quantity <= 0 {
            return Err(FieldViolation::new(
                "quantity",
                self.quantity,
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Level query filter.
#[derive(Debug, Deserialize)]
pub struct LevelQuery {
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
}

/// Journal filter.
#[derive(Debug, Deserialize)]
pub struct JournalQuery {
    pub product_id: Option<Uuid>,
    pub warehouse_id: Option<Uuid>,
    /// Newest-first cap on returned entries.
    pub limit: Option<usize>,
}

/// Build the stock router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/stock/level", get(get_level))
        .route("/v1/stock/transactions", get(list_transactions))
        .route("/v1/stock/adjustments", post(create_adjustment))
        .route("/v1/stock/transfers", post(create_transfer))
}

fn ensure_catalog_refs(
    state: &AppState,
    product_id: Uuid,
    warehouse_id: Uuid,
) -> Result<(), AppError> {
    if !state.products.contains(&product_id) {
        return Err(AppError::validation(
            "product_id",
            product_id,
            "product does not exist",
        ));
    }
    if !state.warehouses.contains(&warehouse_id) {
        return Err(AppError::validation(
            "warehouse_id",
            warehouse_id,
            "warehouse does not exist",
        ));
    }
    Ok(())
}

async fn persist_transactions(
    state: &AppState,
    posted: &[StockTransaction],
) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        for tx in posted {
            if let Err(e) = crate::db::stock::save(pool, tx).await {
                tracing::error!(transaction_id = %tx.id, error = %e, "failed to persist stock transaction");
                return Err(AppError::Internal(
                    "stock posted in-memory but database persist failed".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// GET /v1/stock/level — Level for one (product, warehouse) pair.
#[utoipa::path(
    get,
    path = "/v1/stock/level",
    params(
        ("product_id" = Uuid, Query, description = "Product ID"),
        ("warehouse_id" = Uuid, Query, description = "Warehouse ID"),
    ),
    responses((status = 200, description = "Current level; zero when untracked")),
    tag = "stock"
)]
async fn get_level(
    State(state): State<AppState>,
    Query(query): Query<LevelQuery>,
) -> Json<serde_json::Value> {
    let quantity = state.stock.level(query.product_id, query.warehouse_id);
    Json(serde_json::json!({
        "product_id": query.product_id,
        "warehouse_id": query.warehouse_id,
        "quantity": quantity,
    }))
}

/// GET /v1/stock/transactions — Journal entries, newest first.
#[utoipa::path(
    get,
    path = "/v1/stock/transactions",
    params(
        ("product_id" = Option<Uuid>, Query, description = "Filter by product"),
        ("warehouse_id" = Option<Uuid>, Query, description = "Filter by warehouse"),
        ("limit" = Option<usize>, Query, description = "Cap on returned entries"),
    ),
    responses((status = 200, description = "Journal entries, newest first")),
    tag = "stock"
)]
async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<JournalQuery>,
) -> Json<Vec<StockTransaction>> {
    let mut journal = state.stock.journal();
    if let Some(product_id) = query.product_id {
        journal.retain(|tx| tx.product_id == product_id);
    }
    if let Some(warehouse_id) = query.warehouse_id {
        journal.retain(|tx| tx.warehouse_id == warehouse_id);
    }
    journal.reverse();
    if let Some(limit) = query.limit {
        journal.truncate(limit);
    }
    Json(journal)
}

/// POST /v1/stock/adjustments — Manual correction.
#[utoipa::path(
    post,
    path = "/v1/stock/adjustments",
    request_body = AdjustmentRequest,
    responses(
        (status = 201, description = "Adjustment posted"),
        (status = 400, description = "Missing reason, zero delta, or overdraw", body = crate::error::ErrorBody),
    ),
    tag = "stock"
)]
async fn create_adjustment(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<AdjustmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StockTransaction>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    ensure_catalog_refs(&state, req.product_id, req.warehouse_id)?;

    let posted = state.stock.adjust(
        req.product_id,
        req.warehouse_id,
        req.delta,
        &req.reason,
        caller.actor_or_nil(),
        state.now(),
    )?;

    persist_transactions(&state, std::slice::from_ref(&posted)).await?;
    tracing::info!(
        product = %req.product_id,
        warehouse = %req.warehouse_id,
        delta = req.delta,
        "stock adjusted"
    );
    Ok((StatusCode::CREATED, Json(posted)))
}

/// POST /v1/stock/transfers — Move stock between warehouses.
#[utoipa::path(
    post,
    path = "/v1/stock/transfers",
    request_body = TransferRequest,
    responses(
        (status = 201, description = "Both transfer legs posted"),
        (status = 400, description = "Overdraw or invalid warehouses", body = crate::error::ErrorBody),
    ),
    tag = "stock"
)]
async fn create_transfer(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<TransferRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<StockTransaction>>), AppError> {
    require_role(&caller, Role::Manager)?;
    let req = extract_validated_json(body)?;
    ensure_catalog_refs(&state, req.product_id, req.from_warehouse_id)?;
    if !state.warehouses.contains(&req.to_warehouse_id) {
        return Err(AppError::validation(
            "to_warehouse_id",
            req.to_warehouse_id,
            "warehouse does not exist",
        ));
    }

    let posted = state.stock.transfer(
        req.product_id,
        req.from_warehouse_id,
        req.to_warehouse_id,
        req.quantity,
        caller.actor_or_nil(),
        state.now(),
    )?;

    persist_transactions(&state, &posted).await?;
    tracing::info!(
        product = %req.product_id,
        from = %req.from_warehouse_id,
        to = %req.to_warehouse_id,
        quantity = req.quantity,
        "stock transferred"
    );
    Ok((StatusCode::CREATED, Json(posted)))
}
