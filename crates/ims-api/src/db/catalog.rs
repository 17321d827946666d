//! Product and warehouse persistence operations.

use chrono::{DateTime, Utc};
use ims_core::Money;
use sqlx::PgPool;
use uuid::Uuid;

use crate::state::{Product, Warehouse};

/// Save a product (upsert).
pub async fn save_product(pool: &PgPool, record: &Product) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO products (id, sku, name, unit_price, description, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            unit_price = EXCLUDED.unit_price,
            description = EXCLUDED.description,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.sku)
    .bind(&record.name)
    .bind(record.unit_price.minor())
    .bind(&record.description)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load all products for hydration.
pub async fn load_all_products(pool: &PgPool) -> Result<Vec<Product>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ProductRow>(
        "SELECT id, sku, name, unit_price, description, created_at, updated_at
         FROM products ORDER BY sku",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Product {
            id: row.id,
            sku: row.sku,
            name: row.name,
            unit_price: Money::from_minor(row.unit_price),
            description: row.description,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect())
}

/// Delete a product row.
pub async fn delete_product(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM products WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Save a warehouse (upsert).
pub async fn save_warehouse(pool: &PgPool, record: &Warehouse) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO warehouses (id, code, name, location, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (id) DO UPDATE SET
            name = EXCLUDED.name,
            location = EXCLUDED.location,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.code)
    .bind(&record.name)
    .bind(&record.location)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load all warehouses for hydration.
pub async fn load_all_warehouses(pool: &PgPool) -> Result<Vec<Warehouse>, sqlx::Error> {
    let rows = sqlx::query_as::<_, WarehouseRow>(
        "SELECT id, code, name, location, created_at, updated_at
         FROM warehouses ORDER BY code",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| Warehouse {
            id: row.id,
            code: row.code,
            name: row.name,
            location: row.location,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect())
}

/// Delete a warehouse row.
pub async fn delete_warehouse(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM warehouses WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    sku: String,
    name: String,
    unit_price: i64,
    description: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct WarehouseRow {
    id: Uuid,
    code: String,
    name: String,
    location: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
