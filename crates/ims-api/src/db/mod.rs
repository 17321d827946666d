//! # Database Persistence Layer
//!
//! Provides Postgres persistence for IMS state via SQLx.
//!
//! ## Architecture
//!
//! The database layer is **optional**. When `DATABASE_URL` is set, the API
//! persists orders, purchases, products, warehouses, users, and the stock
//! journal to PostgreSQL and hydrates the in-memory stores from it at
//! startup. When absent, the API operates in in-memory-only mode (suitable
//! for development and testing).
//!
//! Writes go through after the in-memory mutation (write-through); a
//! failed write is surfaced to the client rather than silently dropped.

pub mod catalog;
pub mod orders;
pub mod purchases;
pub mod stock;
pub mod users;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::state::AppState;

/// Initialize the database connection pool and run migrations.
///
/// Returns `None` if `DATABASE_URL` is not set (in-memory-only mode).
/// Returns `Err` if the URL is set but the connection or migration fails.
pub async fn init_pool() -> Result<Option<PgPool>, sqlx::Error> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            tracing::warn!(
                "DATABASE_URL not set — running in-memory only mode. \
                 State will not survive restarts."
            );
            return Ok(None);
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(&url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    // Run embedded migrations.
    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(Some(pool))
}

/// Hydrate the in-memory stores from the database and seed the code
/// sequences above the highest persisted codes.
pub async fn hydrate(state: &AppState, pool: &PgPool) -> Result<(), sqlx::Error> {
    for product in catalog::load_all_products(pool).await? {
        state.products.insert(product.id, product);
    }
    for warehouse in catalog::load_all_warehouses(pool).await? {
        state.warehouses.insert(warehouse.id, warehouse);
    }
    for user in users::load_all(pool).await? {
        state.users.insert(user.id, user);
    }

    for order in orders::load_all(pool).await? {
        if let Some(seq) = state.order_codes.parse(&order.code) {
            state.order_codes.observe(seq);
        }
        state.orders.insert(order.id, order);
    }
    for purchase in purchases::load_all(pool).await? {
        if let Some(seq) = state.purchase_codes.parse(&purchase.code) {
            state.purchase_codes.observe(seq);
        }
        state.purchases.insert(purchase.id, purchase);
    }

    for tx in stock::load_all(pool).await? {
        state.stock.insert(tx);
    }

    tracing::info!(
        orders = state.orders.len(),
        purchases = state.purchases.len(),
        products = state.products.len(),
        warehouses = state.warehouses.len(),
        users = state.users.len(),
        stock_transactions = state.stock.journal_len(),
        "state hydrated from database"
    );
    Ok(())
}
