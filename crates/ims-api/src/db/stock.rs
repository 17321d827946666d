//! Stock journal persistence operations.
//!
//! The journal is append-only: entries are inserted once and never updated.
//! Levels are not persisted — they are replayed from the journal during
//! hydration.

use chrono::{DateTime, Utc};
use ims_state::{StockTransaction, StockTransactionKind};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a journal entry. Conflicting IDs are ignored — the journal is
/// immutable.
pub async fn save(pool: &PgPool, tx: &StockTransaction) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stock_transactions (id, kind, product_id, warehouse_id, quantity_delta,
                                         reason, reference, actor_id, created_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (id) DO NOTHING",
    )
    .bind(tx.id)
    .bind(tx.kind.as_str())
    .bind(tx.product_id)
    .bind(tx.warehouse_id)
    .bind(tx.quantity_delta)
    .bind(&tx.reason)
    .bind(&tx.reference)
    .bind(tx.actor_id)
    .bind(tx.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load the full journal, oldest first, for level replay.
pub async fn load_all(pool: &PgPool) -> Result<Vec<StockTransaction>, sqlx::Error> {
    let rows = sqlx::query_as::<_, StockRow>(
        "SELECT id, kind, product_id, warehouse_id, quantity_delta, reason, reference,
                actor_id, created_at
         FROM stock_transactions ORDER BY created_at, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| StockTransaction {
            id: row.id,
            kind: parse_kind(&row.kind),
            product_id: row.product_id,
            warehouse_id: row.warehouse_id,
            quantity_delta: row.quantity_delta,
            reason: row.reason,
            reference: row.reference,
            actor_id: row.actor_id,
            created_at: row.created_at,
        })
        .collect())
}

#[derive(sqlx::FromRow)]
struct StockRow {
    id: Uuid,
    kind: String,
    product_id: Uuid,
    warehouse_id: Uuid,
    quantity_delta: i64,
    reason: Option<String>,
    reference: Option<String>,
    actor_id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

fn parse_kind(s: &str) -> StockTransactionKind {
    StockTransactionKind::parse(s).unwrap_or_else(|| {
        tracing::warn!(
            value = s,
            "unrecognized stock transaction kind in database, defaulting to Adjustment"
        );
        StockTransactionKind::Adjustment
    })
}
