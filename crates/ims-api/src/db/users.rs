//! User persistence operations.

use chrono::{DateTime, Utc};
use ims_core::Role;
use sqlx::PgPool;
use uuid::Uuid;

use crate::state::UserRecord;

/// Save a user (upsert).
pub async fn save(pool: &PgPool, record: &UserRecord) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO users (id, username, role, rate_limit_exempt_until, active,
                            created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (id) DO UPDATE SET
            role = EXCLUDED.role,
            rate_limit_exempt_until = EXCLUDED.rate_limit_exempt_until,
            active = EXCLUDED.active,
            updated_at = EXCLUDED.updated_at",
    )
    .bind(record.id)
    .bind(&record.username)
    .bind(record.role.as_str())
    .bind(record.rate_limit_exempt_until)
    .bind(record.active)
    .bind(record.created_at)
    .bind(record.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Load all users for hydration.
pub async fn load_all(pool: &PgPool) -> Result<Vec<UserRecord>, sqlx::Error> {
    let rows = sqlx::query_as::<_, UserRow>(
        "SELECT id, username, role, rate_limit_exempt_until, active, created_at, updated_at
         FROM users ORDER BY username",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| UserRecord {
            id: row.id,
            username: row.username,
            role: parse_role(&row.role),
            rate_limit_exempt_until: row.rate_limit_exempt_until,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
        .collect())
}

/// Delete a user row.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    role: String,
    rate_limit_exempt_until: Option<DateTime<Utc>>,
    active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn parse_role(s: &str) -> Role {
    Role::parse(s).unwrap_or_else(|| {
        tracing::warn!(value = s, "unrecognized role in database, defaulting to staff");
        Role::Staff
    })
}
