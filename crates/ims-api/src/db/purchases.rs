//! Purchase persistence operations.
//!
//! Follows the same pattern as `orders.rs`.

use chrono::{DateTime, Utc};
use ims_state::{PurchaseRecord, PurchaseStatus};
use sqlx::PgPool;
use uuid::Uuid;

/// Save a purchase record to the database (upsert).
pub async fn save(pool: &PgPool, record: &PurchaseRecord) -> Result<(), sqlx::Error> {
    let items_json = serde_json::to_value(&record.line_items)
        .map_err(|e| sqlx::Error::Protocol(format!("failed to serialize line_items: {e}")))?;

    sqlx::query(
        "INSERT INTO purchases (id, code, supplier_name, status, warehouse_id, line_items,
                                total_amount, cancellation_reason, return_reason, ordered_by,
                                received_by, cancelled_by, returned_by, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         ON CONFLICT (id) DO UPDATE SET
            supplier_name = EXCLUDED.supplier_name,
            status = EXCLUDED.status,
            line_items = EXCLUDED.line_items,
            total_amount = EXCLUDED.total_amount,
            cancellation_reason = EXCLUDED.cancellation_reason,
            return_reason = EXCLUDED.return_reason,
            ordered_by = EXCLUDED.ordered_by,
            received_by = EXCLUDED.received_by,
            cancelled_by = EXCLUDED.cancelled_by,
            returned_by = EXCLUDED.returned_by,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.code)
    .bind(&record.supplier_name)
    .bind(record.status.as_str())
    .bind(record.warehouse_id)
    .bind(&items_json)
    .bind(record.total_amount.minor())
    .bind(&record.cancellation_reason)
    .bind(&record.return_reason)
    .bind(record.ordered_by)
    .bind(record.received_by)
    .bind(record.cancelled_by)
    .bind(record.returned_by)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load all purchases from the database for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<PurchaseRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, PurchaseRow>(
        "SELECT id, code, supplier_name, status, warehouse_id, line_items, total_amount,
                cancellation_reason, return_reason, ordered_by, received_by, cancelled_by,
                returned_by, created_at, updated_at
         FROM purchases ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let line_items = serde_json::from_value(row.line_items).map_err(|e| {
            sqlx::Error::Protocol(format!("corrupt line_items in purchase {}: {e}", row.id))
        })?;
        records.push(PurchaseRecord {
            id: row.id,
            code: row.code,
            supplier_name: row.supplier_name,
            status: parse_status(&row.status),
            warehouse_id: row.warehouse_id,
            line_items,
            total_amount: ims_core::Money::from_minor(row.total_amount),
            cancellation_reason: row.cancellation_reason,
            return_reason: row.return_reason,
            ordered_by: row.ordered_by,
            received_by: row.received_by,
            cancelled_by: row.cancelled_by,
            returned_by: row.returned_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        });
    }
    Ok(records)
}

/// Delete a purchase row.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM purchases WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    code: String,
    supplier_name: String,
    status: String,
    warehouse_id: Uuid,
    line_items: serde_json::Value,
    total_amount: i64,
    cancellation_reason: Option<String>,
    return_reason: Option<String>,
    ordered_by: Option<Uuid>,
    received_by: Option<Uuid>,
    cancelled_by: Option<Uuid>,
    returned_by: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> PurchaseStatus {
    PurchaseStatus::parse(s).unwrap_or_else(|| {
        tracing::warn!(
            value = s,
            "unrecognized purchase status in database, defaulting to Pending"
        );
        PurchaseStatus::Pending
    })
}
