//! # Sales Order API
//!
//! Order CRUD plus the dedicated transition endpoints (process, ship,
//! deliver, complete, cancel). Transitions run atomically under the store's
//! per-entity write lock; shipping and cancellation post their stock side
//! effects inside the same critical section so they happen exactly once per
//! transition.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ims_core::{FieldViolation, LineItem, Money, Role};
use ims_state::{OrderError, OrderPatch, OrderRecord, OrderStatus};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, require_max_len, require_non_empty, Validate};
use crate::state::AppState;

/// One requested line. `unit_price` defaults to the product's current list
/// price; the resolved price is copied onto the order and never tracks the
/// catalog afterwards.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LineItemRequest {
    pub product_id: Uuid,
    pub quantity: u32,
    pub unit_price: Option<i64>,
}

/// Request to create an order.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub customer_name: String,
    pub warehouse_id: Uuid,
    pub line_items: Vec<LineItemRequest>,
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        require_non_empty("customer_name", &self.customer_name)?;
        require_max_len("customer_name", &self.customer_name, 255)?;
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

/// Request to update an order's editable fields.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderRequest {
    pub customer_name: Option<String>,
    pub line_items: Option<Vec<LineItemRequest>>,
    /// Validated against the update whitelist; anything outside it is a 400.
    #[schema(value_type = Option<String>)]
    pub status: Option<OrderStatus>,
}

impl Validate for UpdateOrderRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        if let Some(name) = &self.customer_name {
            require_non_empty("customer_name", name)?;
            require_max_len("customer_name", name, 255)?;
        }
        Ok(())
    }
}

/// Cancellation request. The reason is mandatory; its absence is rejected
/// before the status is even inspected.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelRequest {
    pub reason: Option<String>,
}

/// List filter.
#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
}

/// Build the orders router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order).get(list_orders))
        .route(
            "/v1/orders/:id",
            get(get_order).patch(update_order).delete(delete_order),
        )
        .route("/v1/orders/:id/process", post(process_order))
        .route("/v1/orders/:id/ship", post(ship_order))
        .route("/v1/orders/:id/deliver", post(deliver_order))
        .route("/v1/orders/:id/complete", post(complete_order))
        .route("/v1/orders/:id/cancel", post(cancel_order))
}

/// Resolve requested lines against the catalog: the product must exist and
/// an omitted unit price falls back to the product's current list price.
fn resolve_line_items(
    state: &AppState,
    items: &[LineItemRequest],
) -> Result<Vec<LineItem>, AppError> {
    let mut resolved = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let product = state.products.get(&item.product_id).ok_or_else(|| {
            AppError::validation(
                format!("line_items[{index}].product_id"),
                item.product_id,
                "product does not exist",
            )
        })?;
        resolved.push(LineItem {
            product_id: item.product_id,
            quantity: item.quantity,
            unit_price: item
                .unit_price
                .map(Money::from_minor)
                .unwrap_or(product.unit_price),
        });
    }
    Ok(resolved)
}

fn ensure_warehouse_exists(state: &AppState, warehouse_id: Uuid) -> Result<(), AppError> {
    if !state.warehouses.contains(&warehouse_id) {
        return Err(AppError::validation(
            "warehouse_id",
            warehouse_id,
            "warehouse does not exist",
        ));
    }
    Ok(())
}

/// Write-through persistence. Surfaced to the client on failure because the
/// in-memory record would be lost on restart, causing silent data loss.
async fn persist_order(state: &AppState, record: &OrderRecord) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::orders::save(pool, record).await {
            tracing::error!(order_id = %record.id, error = %e, "failed to persist order");
            return Err(AppError::Internal(
                "order recorded in-memory but database persist failed".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /v1/orders — Create an order.
#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created in Pending"),
        (status = 400, description = "Validation failure", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn create_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderRecord>), AppError> {
    let req = extract_validated_json(body)?;
    ensure_warehouse_exists(&state, req.warehouse_id)?;
    let line_items = resolve_line_items(&state, &req.line_items)?;

    let now = state.now();
    let id = Uuid::new_v4();
    let code = state.order_codes.next();
    let record = OrderRecord::new(id, code, req.customer_name, req.warehouse_id, line_items, now)?;

    state.orders.insert(id, record.clone());
    persist_order(&state, &record).await?;

    tracing::info!(order = %record.code, actor = %caller.actor_or_nil(), "order created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/orders — List orders, optionally filtered by status.
#[utoipa::path(
    get,
    path = "/v1/orders",
    params(("status" = Option<String>, Query, description = "Filter by status")),
    responses((status = 200, description = "Orders, newest first")),
    tag = "orders"
)]
async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<OrderRecord>>, AppError> {
    let filter = match &query.status {
        Some(s) => Some(OrderStatus::parse(s).ok_or_else(|| {
            AppError::validation("status", s, "unknown order status")
        })?),
        None => None,
    };

    let mut orders = state.orders.list();
    if let Some(status) = filter {
        orders.retain(|o| o.status == status);
    }
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(Json(orders))
}

/// GET /v1/orders/:id — Get an order.
#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderRecord>, AppError> {
    let order = state
        .orders
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))?;
    Ok(Json(order))
}

/// PATCH /v1/orders/:id — Generic field update.
///
/// Rejected in non-editable states; a requested status change must be on
/// the update whitelist.
#[utoipa::path(
    patch,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = UpdateOrderRequest,
    responses(
        (status = 200, description = "Updated order"),
        (status = 400, description = "Illegal edit or transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderRecord>, AppError> {
    let req = extract_validated_json(body)?;
    let line_items = match &req.line_items {
        Some(items) => Some(resolve_line_items(&state, items)?),
        None => None,
    };
    let patch = OrderPatch {
        customer_name: req.customer_name,
        line_items,
        status: req.status,
    };

    let now = state.now();
    let updated = state
        .orders
        .try_update(&id, |order| {
            order.apply_update(patch, now)?;
            Ok::<_, OrderError>(order.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))??;

    persist_order(&state, &updated).await?;
    Ok(Json(updated))
}

/// DELETE /v1/orders/:id — Delete an order.
///
/// Only Cancelled orders, or Pending orders younger than the grace period,
/// may be deleted.
#[utoipa::path(
    delete,
    path = "/v1/orders/{id}",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 400, description = "Not deletable", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn delete_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Manager)?;

    let now = state.now();
    state
        .orders
        .try_remove(&id, |order| order.ensure_deletable(now))
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))??;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::orders::delete(pool, id).await {
            tracing::error!(order_id = %id, error = %e, "failed to delete order row");
            return Err(AppError::Internal(
                "order removed in-memory but database delete failed".to_string(),
            ));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/orders/:id/process — Pending → Processing.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/process",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order now Processing"),
        (status = 400, description = "Illegal transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn process_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderRecord>, AppError> {
    let now = state.now();
    let actor = caller.actor_or_nil();
    let updated = state
        .orders
        .try_update(&id, |order| {
            order.process(actor, now)?;
            Ok::<_, OrderError>(order.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))??;

    persist_order(&state, &updated).await?;
    tracing::info!(order = %updated.code, "order processing");
    Ok(Json(updated))
}

/// POST /v1/orders/:id/ship — Processing → Shipped.
///
/// Issues stock for every line from the order's warehouse inside the same
/// critical section as the transition: an overdraw fails the whole request
/// and the order stays in Processing.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/ship",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order now Shipped, stock issued"),
        (status = 400, description = "Illegal transition or insufficient stock", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn ship_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderRecord>, AppError> {
    let now = state.now();
    let actor = caller.actor_or_nil();
    let stock = state.stock.clone();
    let updated = state
        .orders
        .try_update(&id, |order| {
            if order.status != OrderStatus::Processing {
                return Err(AppError::from(OrderError::InvalidTransition {
                    operation: "ship",
                    current: order.status,
                }));
            }
            stock.issue_order(&order.line_items, order.warehouse_id, &order.code, actor, now)?;
            order.ship(now)?;
            Ok(order.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))??;

    persist_order(&state, &updated).await?;
    tracing::info!(order = %updated.code, "order shipped");
    Ok(Json(updated))
}

/// POST /v1/orders/:id/deliver — Shipped → Delivered.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/deliver",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order now Delivered"),
        (status = 400, description = "Illegal transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn deliver_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderRecord>, AppError> {
    let now = state.now();
    let updated = state
        .orders
        .try_update(&id, |order| {
            order.deliver(now)?;
            Ok::<_, OrderError>(order.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))??;

    persist_order(&state, &updated).await?;
    Ok(Json(updated))
}

/// POST /v1/orders/:id/complete — Delivered → Completed.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/complete",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order now Completed"),
        (status = 400, description = "Illegal transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn complete_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderRecord>, AppError> {
    let now = state.now();
    let actor = caller.actor_or_nil();
    let updated = state
        .orders
        .try_update(&id, |order| {
            order.complete(actor, now)?;
            Ok::<_, OrderError>(order.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))??;

    persist_order(&state, &updated).await?;
    tracing::info!(order = %updated.code, "order completed");
    Ok(Json(updated))
}

/// POST /v1/orders/:id/cancel — {Pending, Processing, Shipped} → Cancelled.
///
/// A Shipped order's stock is restocked as part of the same critical
/// section.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/cancel",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Order now Cancelled"),
        (status = 400, description = "Missing reason or illegal transition", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
async fn cancel_order(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<CancelRequest>, JsonRejection>,
) -> Result<Json<OrderRecord>, AppError> {
    let req = extract_json(body)?;
    let now = state.now();
    let actor = caller.actor_or_nil();
    let stock = state.stock.clone();
    let updated = state
        .orders
        .try_update(&id, |order| {
            let was_shipped = order.status == OrderStatus::Shipped;
            order.cancel(actor, req.reason.as_deref(), now)?;
            if was_shipped {
                stock.restock_order(
                    &order.line_items,
                    order.warehouse_id,
                    &order.code,
                    actor,
                    now,
                )?;
            }
            Ok::<_, AppError>(order.clone())
        })
        .ok_or_else(|| AppError::not_found(format!("order {id} not found")))??;

    persist_order(&state, &updated).await?;
    tracing::info!(order = %updated.code, reason = ?updated.cancellation_reason, "order cancelled");
    Ok(Json(updated))
}
