//! Order persistence operations.
//!
//! Upsert save, load-all for hydration, and delete. Line items are stored
//! as JSONB; statuses as their canonical strings.

use chrono::{DateTime, Utc};
use ims_state::{OrderRecord, OrderStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Save an order record to the database (upsert).
pub async fn save(pool: &PgPool, record: &OrderRecord) -> Result<(), sqlx::Error> {
    let items_json = serde_json::to_value(&record.line_items)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize line_items: {e}")))?;

    sqlx::query(
        "INSERT INTO orders (id, code, customer_name, status, warehouse_id, line_items,
                             total_amount, cancellation_reason, processed_by, completed_by,
                             cancelled_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
         ON CONFLICT (id) DO UPDATE SET
            customer_name = EXCLUDED.customer_name,
            status = EXCLUDED.status,
            line_items = EXCLUDED.line_items,
            total_amount = EXCLUDED.total_amount,
            cancellation_reason = EXCLUDED.cancellation_reason,
            processed_by = EXCLUDED.processed_by,
            completed_by = EXCLUDED.completed_by,
            cancelled_by = EXCLUDED.cancelled_by,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.code)
    .bind(&record.customer_name)
    .bind(record.status.as_str())
    .bind(record.warehouse_id)
    .bind(&items_json)
    .bind(record.total_amount.minor())
    .bind(&record.cancellation_reason)
    .bind(record.processed_by)
    .bind(record.completed_by)
    .bind(record.cancelled_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all orders from the database for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<OrderRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, OrderRow>(
        "SELECT id, code, customer_name, status, warehouse_id, line_items, total_amount,
                cancellation_reason, processed_by, completed_by, cancelled_by,
                created_at, updated_at
         FROM orders ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let line_items = serde_json::from_value(row.line_items).map_err(|e| {
            sqlx::Error::Protocol(format!("corrupt line_items in order {}: {e}", row.id))
        })?;
        records.push(OrderRecord {
            id: row.id,
            code: row.code,
            customer_name: row.customer_name,
            status: parse_status(&row.status),
            warehouse_id: row.warehouse_id,
            line_items,
            total_amount: ims_core::Money::from_minor(row.total_amount),
            cancellation_reason: row.cancellation_reason,
            processed_by: row.processed_by,
            completed_by: row.completed_by,
            cancelled_by: row.cancelled_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        });
    }
    Ok(records)
}

/// Delete an order row.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM orders WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    code: String,
    customer_name: String,
    status: String,
    warehouse_id: Uuid,
    line_items: serde_json::Value,
    total_amount: i64,
    cancellation_reason: Option<String>,
    processed_by: Option<Uuid>,
    completed_by: Option<Uuid>,
    cancelled_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> OrderStatus {
    OrderStatus::parse(s).unwrap_or_else(|| {
        tracing::warn!(value = s, "unrecognized order status in database, defaulting to Pending");
        OrderStatus::Pending
    })
}
