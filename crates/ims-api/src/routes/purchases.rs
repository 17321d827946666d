//! # Purchase Order API
//!
//! Purchase CRUD plus the dedicated transition endpoints (place, receive,
//! cancel, return). Receiving posts inbound stock and returning posts the
//! outbound reversal, each inside the same critical section as its
//! transition.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ims_core::{FieldViolation, LineItem, Money, Role};
use ims_state::{PurchaseError, PurchasePatch, PurchaseRecord, PurchaseStatus};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, require_max_len, require_non_empty, Validate};
use crate::routes::orders::LineItemRequest;
use crate::state::AppState;

/// Request to create a purchase.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePurchaseRequest {
    pub supplier_name: String,
    pub warehouse_id: Uuid,
    pub line_items: Vec<LineItemRequest>,
}

impl Validate for CreatePurchaseRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        require_non_empty("supplier_name", &self.supplier_name)?;
        require_max_len("supplier_name", &self.supplier_name, 255)?;
        if self.line_items.is_empty() {
            return Err(FieldViolation::new(
                "line_items",
                "[]",
                "at least one line item is required",
            ));
        }
        Ok(())
    }
}

/// Request to update a purchase's editable fields.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePurchaseRequest {
    pub supplier_name: Option<String>,
    pub line_items: Option<Vec<LineItemRequest>>,
    /// Validated against the update whitelist; anything outside it is a 400.
    #[schema(value_type = Option<String>)]
    pub status: Option<PurchaseStatus>,
}

impl Validate for UpdatePurchaseRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        if let Some(name) = &self.supplier_name {
            require_non_empty("supplier_name", name)?;
            require_max_len("supplier_name", name, 255)?;
        }
        Ok(())
    }
}

/// Reason-carrying request for cancel and return.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

/// List filter.
#[derive(Debug, Deserialize)]
pub struct ListPurchasesQuery {
    pub status: Option<String>,
}

/// Build the purchases router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/purchases", post(create_purchase).get(list_purchases))
        .route(
            "/v1/purchases/:id",
            get(get_purchase).patch(update_purchase).delete(delete_purchase),
        )
        .route("/v1/purchases/:id/place", post(place_purchase))
        .route("/v1/purchases/:id/receive", post(receive_purchase))
        .route("/v1/purchases/:id/cancel", post(cancel_purchase))
        .route("/v1/purchases/:id/return", post(return_purchase))
}

/// Resolve requested lines against the catalog. Purchases have no list
/// price to fall back on — the supplier's price is part of the order — so
/// an omitted unit price is a validation failure.
fn resolve_line_items(
    state: &AppState,
    items: &[LineItemRequest],
) -> Result<Vec<LineItem>, AppError> {
    let mut resolved = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        if !state.products.contains(&item.product_id) {
            return Err(AppError::validation(
                format!("line_items[{index}].product_id"),
                item.product_id,
                "product does not exist",
            ));
        }
        let unit_price = item.unit_price.ok_or_else(|| {
            AppError::validation(
                format!("line_items[{index}].unit_price"),
                "",
                "purchase lines must carry the supplier's unit price",
            )
        })?;
        resolved.push(LineItem {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: Money::from_minor(unit_price),
        });
    }
    Ok(resolved)
}

async fn persist_purchase(state: &AppState, record: &PurchaseRecord) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::purchases::save(pool, record).await {
            tracing::error!(purchase_id = %record.id, error = %e, "failed to persist purchase");
            return Err(AppError::Internal(
                "purchase recorded in-memory but database persist failed".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /v1/purchases — Create a purchase.
#[utoipa::path(
    post,
    path = "/v1/purchases",
    request_body = CreatePurchaseRequest,
    responses(
        (status = 201, description = "Purchase created in Pending"),
        (status = 400, description = "Validation failure", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn create_purchase(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreatePurchaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PurchaseRecord>), AppError> {
    let req = extract_validated_json(body)?;
    if !state.warehouses.contains(&req.warehouse_id) {
        return Err(AppError::validation(
            "warehouse_id",
            req.warehouse_id,
            "warehouse does not exist",
        ));
    }
    let line_items = resolve_line_items(&state, &req.line_items)?;

    let now = state.now();
    let id = Uuid::new_v4();
    let code = state.purchase_codes.next();
    let record =
        PurchaseRecord::new(id, code, req.supplier_name, req.warehouse_id, line_items, now)?;

    state.purchases.insert(id, record.clone());
    persist_purchase(&state, &record).await?;

    tracing::info!(purchase = %record.code, actor = %caller.actor_or_nil(), "purchase created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/purchases — List purchases, optionally filtered by status.
#[utoipa::path(
    get,
    path = "/v1/purchases",
    params(("status" = Option<String>, Query, description = "Filter by status")),
    responses((status = 200, description = "Purchases, newest first")),
    tag = "purchases"
)]
async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<ListPurchasesQuery>,
) -> Result<Json<Vec<PurchaseRecord>>, AppError> {
    let filter = match &query.status {
        Some(s) => Some(PurchaseStatus::parse(s).ok_or_else(|| {
            AppError::validation("status", s, "unknown purchase status")
        })?),
        None => None,
    };

    let mut purchases = state.purchases.list();
    if let Some(status) = filter {
        purchases.retain(|p| p.status == status);
    }
    purchases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(purchases))
}

/// GET /v1/purchases/:id — Get a purchase.
#[utoipa::path(
    get,
    path = "/v1/purchases/{id}",
    params(("id" = Uuid, Path, description = "Purchase ID")),
    responses(
        (status = 200, description = "Purchase found"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn get_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseRecord>, AppError> {
    let purchase = state
        .purchases
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("purchase {id} not found")))?;
    Ok(Json(purchase))
}

/// PATCH /v1/purchases/:id — Generic field update.
#[utoipa::path(
    patch,
    path = "/v1/purchases/{id}",
    params(("id" = Uuid, Path, description = "Purchase ID")),
    request_body = UpdatePurchaseRequest,
    responses(
        (status = 200, description = "Updated purchase"),
        (status = 400, description = "Illegal edit or transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn update_purchase(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdatePurchaseRequest>, JsonRejection>,
) -> Result<Json<PurchaseRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let line_items = match &req.line_items {
        Some(items) => Some(resolve_line_items(&state, items)?),
        None => None,
    };
    let patch = PurchasePatch {
        supplier_name: req.supplier_name,
        line_items,
        status: req.status,
    };

    let now = state.now();
    let updated = state
        .purchases
        .try_update(&id, |purchase| {
            purchase.apply_update(patch, now)?;
            Ok::<_, PurchaseError>(purchase.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("purchase {id} not found")))??;

    persist_purchase(&state, &updated).await?;
    Ok(Json(updated))
}

/// DELETE /v1/purchases/:id — Delete a purchase.
#[utoipa::path(
    delete,
    path = "/v1/purchases/{id}",
    params(("id" = Uuid, Path, description = "Purchase ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Not deletable", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn delete_purchase(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Manager)?;

    let now = state.now();
    state
        .purchases
        .try_remove(&id, |purchase| purchase.ensure_deletable(now))
        .ok_or_else(|| AppError::not_found(format!("purchase {id} not found")))??;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::purchases::delete(pool, id).await {
            tracing::error!(purchase_id = %id, error = %e, "failed to delete purchase row");
            return Err(AppError::Internal(
                "purchase removed in-memory but database delete failed".to_string(),
            ));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/purchases/:id/place — Pending → Ordered.
#[utoipa::path(
    post,
    path = "/v1/purchases/{id}/place",
    params(("id" = Uuid, Path, description = "Purchase ID")),
    responses(
        (status = 200, description = "Purchase now Ordered"),
        (status = 400, description = "Illegal transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn place_purchase(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseRecord>, AppError> {
    let now = state.now();
    let actor = caller.actor_or_nil();
    let updated = state
        .purchases
        .try_update(&id, |purchase| {
            purchase.place(actor, now)?;
            Ok::<_, PurchaseError>(purchase.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("purchase {id} not found")))??;

    persist_purchase(&state, &updated).await?;
    tracing::info!(purchase = %updated.code, "purchase placed with supplier");
    Ok(Json(updated))
}

/// POST /v1/purchases/:id/receive — Ordered → Received.
///
/// Posts one inbound stock leg per line into the purchase's warehouse.
#[utoipa::path(
    post,
    path = "/v1/purchases/{id}/receive",
    params(("id" = Uuid, Path, description = "Purchase ID")),
    responses(
        (status = 200, description = "Purchase now Received, stock posted"),
        (status = 400, description = "Illegal transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn receive_purchase(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<PurchaseRecord>, AppError> {
    let now = state.now();
    let actor = caller.actor_or_nil();
    let stock = state.stock.clone();
    let updated = state
        .purchases
        .try_update(&id, |purchase| {
            if purchase.status != PurchaseStatus::Ordered {
                return Err(AppError::from(PurchaseError::InvalidTransition {
                    operation: "receive",
                    current: purchase.status,
                }));
            }
            stock.receive_purchase(
                &purchase.line_items,
                purchase.warehouse_id,
                &purchase.code,
                actor,
                now,
            )?;
            purchase.receive(actor, now)?;
            Ok(purchase.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("purchase {id} not found")))??;

    persist_purchase(&state, &updated).await?;
    tracing::info!(purchase = %updated.code, "purchase received");
    Ok(Json(updated))
}

/// POST /v1/purchases/:id/cancel — {Pending, Ordered} → Cancelled.
#[utoipa::path(
    post,
    path = "/v1/purchases/{id}/cancel",
    params(("id" = Uuid, Path, description = "Purchase ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Purchase now Cancelled"),
        (status = 400, description = "Missing reason or illegal transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn cancel_purchase(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> Result<Json<PurchaseRecord>, AppError> {
    let req = extract_json(body)?;
    let now = state.now();
    let actor = caller.actor_or_nil();
    let updated = state
        .purchases
        .try_update(&id, |purchase| {
            purchase.cancel(actor, req.reason.as_deref(), now)?;
            Ok::<_, PurchaseError>(purchase.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("purchase {id} not found")))??;

    persist_purchase(&state, &updated).await?;
    tracing::info!(purchase = %updated.code, "purchase cancelled");
    Ok(Json(updated))
}

/// POST /v1/purchases/:id/return — Received → Returned.
///
/// Posts the outbound stock reversal; fails without mutating if the goods
/// have already left the warehouse.
#[utoipa::path(
    post,
    path = "/v1/purchases/{id}/return",
    params(("id" = Uuid, Path, description = "Purchase ID")),
    request_body = ReasonRequest,
    responses(
        (status = 200, description = "Purchase now Returned, stock reversed"),
        (status = 400, description = "Missing reason, illegal transition, or insufficient stock", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "purchases"
)]
async fn return_purchase(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ReasonRequest>, JsonRejection>,
) -> Result<Json<PurchaseRecord>, AppError> {
    let req = extract_json(body)?;
    let now = state.now();
    let actor = caller.actor_or_nil();
    let stock = state.stock.clone();
    let updated = state
        .purchases
        .try_update(&id, |purchase| {
            let reason = match req.reason.as_deref().map(str::trim) {
                Some(r) if !r.is_empty() => r,
                _ => {
                    return Err(AppError::from(PurchaseError::MissingReason {
                        operation: "return",
                    }))
                }
            };
            if purchase.status != PurchaseStatus::Received {
                return Err(AppError::from(PurchaseError::InvalidTransition {
                    operation: "return",
                    current: purchase.status,
                }));
            }
            stock.return_purchase(
                &purchase.line_items,
                purchase.warehouse_id,
                reason,
                &purchase.code,
                actor,
                now,
            )?;
            purchase.return_to_supplier(actor, Some(reason), now)?;
            Ok(purchase.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("purchase {id} not found")))??;

    persist_purchase(&state, &updated).await?;
    tracing::info!(purchase = %updated.code, "purchase returned to supplier");
    Ok(Json(updated))
}
