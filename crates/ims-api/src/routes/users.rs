//! # Users & Authentication API
//!
//! User administration (Admin+), temporary rate-limit exemption grants, and
//! the login endpoint that exchanges a username for a bearer token bound to
//! the user's role and ID.
//!
//! The login route is mounted outside the auth middleware and behind the
//! strict auth rate limiter; password verification itself lives in the
//! identity collaborator, not here.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use ims_core::{FieldViolation, Role};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{require_role, CallerIdentity};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, require_max_len, require_non_empty, Validate};
use crate::state::{AppState, UserRecord};

/// Request to create a user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    /// One of `staff`, `manager`, `admin`, `superadmin`.
    pub role: String,
}

impl Validate for CreateUserRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        require_non_empty("username", &self.username)?;
        require_max_len("username", &self.username, 64)?;
        if Role::parse(&self.role).is_none() {
            return Err(FieldViolation::new("role", &self.role, "unknown role"));
        }
        Ok(())
    }
}

/// Request to update a user.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub role: Option<String>,
    pub active: Option<bool>,
}

impl Validate for UpdateUserRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        if let Some(role) = &self.role {
            if Role::parse(role).is_none() {
                return Err(FieldViolation::new("role", role, "unknown role"));
            }
        }
        Ok(())
    }
}

/// Temporary rate-limit exemption grant.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ExemptionRequest {
    /// Instant the exemption lapses. Must be in the future.
    pub until: DateTime<Utc>,
}

/// Login request. Credential verification is the identity collaborator's
/// job; this endpoint models the rate-limited token exchange surface.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub username: String,
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), FieldViolation> {
        require_non_empty("username", &self.username)
    }
}

/// Login response.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    #[schema(value_type = String)]
    pub role: Role,
    pub user_id: Uuid,
}

/// Build the users router (mounted behind auth).
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/users", post(create_user).get(list_users))
        .route(
            "/v1/users/:id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route(
            "/v1/users/:id/rate-limit-exemption",
            post(grant_exemption).delete(revoke_exemption),
        )
}

/// Build the authentication router (mounted outside auth, behind the
/// strict limiter).
pub fn auth_router() -> Router<AppState> {
    Router::new().route("/v1/auth/login", post(login))
}

async fn persist_user(state: &AppState, record: &UserRecord) -> Result<(), AppError> {
    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::save(pool, record).await {
            tracing::error!(user_id = %record.id, error = %e, "failed to persist user");
            return Err(AppError::Internal(
                "user recorded in-memory but database persist failed".to_string(),
            ));
        }
    }
    Ok(())
}

/// POST /v1/users — Create a user.
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserRecord),
        (status = 400, description = "Validation failure", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn create_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<UserRecord>), AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;

    let username = req.username.trim().to_string();
    if state.users.find(|u| u.username == username).is_some() {
        return Err(AppError::validation(
            "username",
            &username,
            "username already exists",
        ));
    }
    let role = Role::parse(&req.role)
        .ok_or_else(|| AppError::validation("role", &req.role, "unknown role"))?;

    let now = state.now();
    let record = UserRecord {
        id: Uuid::new_v4(),
        username,
        role,
        rate_limit_exempt_until: None,
        active: true,
        created_at: now,
        updated_at: now,
    };

    state.users.insert(record.id, record.clone());
    persist_user(&state, &record).await?;
    tracing::info!(user = %record.username, role = %record.role.as_str(), "user created");
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /v1/users — List users.
#[utoipa::path(
    get,
    path = "/v1/users",
    responses((status = 200, description = "All users", body = [UserRecord])),
    tag = "users"
)]
async fn list_users(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<Vec<UserRecord>>, AppError> {
    require_role(&caller, Role::Admin)?;
    let mut users = state.users.list();
    users.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(Json(users))
}

/// GET /v1/users/:id — Get a user.
#[utoipa::path(
    get,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "User found", body = UserRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn get_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let user = state
        .users
        .get(&id)
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;
    Ok(Json(user))
}

/// PATCH /v1/users/:id — Update role or active flag.
#[utoipa::path(
    patch,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "Updated user", body = UserRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn update_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<UpdateUserRequest>, JsonRejection>,
) -> Result<Json<UserRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = extract_validated_json(body)?;
    let role = match &req.role {
        Some(r) => {
            Some(Role::parse(r).ok_or_else(|| AppError::validation("role", r, "unknown role"))?)
        }
        None => None,
    };

    let now = state.now();
    let updated = state
        .users
        .update(&id, |user| {
            if let Some(role) = role {
                user.role = role;
            }
            if let Some(active) = req.active {
                user.active = active;
            }
            user.updated_at = now;
        })
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;

    persist_user(&state, &updated).await?;
    Ok(Json(updated))
}

/// DELETE /v1/users/:id — Delete a user.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn delete_user(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    require_role(&caller, Role::Admin)?;

    state
        .users
        .remove(&id)
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;

    if let Some(pool) = &state.db_pool {
        if let Err(e) = crate::db::users::delete(pool, id).await {
            tracing::error!(user_id = %id, error = %e, "failed to delete user row");
            return Err(AppError::Internal(
                "user removed in-memory but database delete failed".to_string(),
            ));
        }
    }
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/users/:id/rate-limit-exemption — Grant a temporary exemption.
#[utoipa::path(
    post,
    path = "/v1/users/{id}/rate-limit-exemption",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = ExemptionRequest,
    responses(
        (status = 200, description = "Exemption granted", body = UserRecord),
        (status = 400, description = "Timestamp not in the future", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn grant_exemption(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    body: Result<Json<ExemptionRequest>, JsonRejection>,
) -> Result<Json<UserRecord>, AppError> {
    require_role(&caller, Role::Admin)?;
    let req = crate::extractors::extract_json(body)?;

    let now = state.now();
    if req.until <= now {
        return Err(AppError::validation(
            "until",
            req.until.to_rfc3339(),
            "exemption must end in the future",
        ));
    }

    let updated = state
        .users
        .update(&id, |user| {
            user.rate_limit_exempt_until = Some(req.until);
            user.updated_at = now;
        })
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;

    persist_user(&state, &updated).await?;
    tracing::info!(user = %updated.username, until = %req.until, "rate-limit exemption granted");
    Ok(Json(updated))
}

/// DELETE /v1/users/:id/rate-limit-exemption — Revoke an exemption.
#[utoipa::path(
    delete,
    path = "/v1/users/{id}/rate-limit-exemption",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Exemption revoked", body = UserRecord),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "users"
)]
async fn revoke_exemption(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<UserRecord>, AppError> {
    require_role(&caller, Role::Admin)?;

    let now = state.now();
    let updated = state
        .users
        .update(&id, |user| {
            user.rate_limit_exempt_until = None;
            user.updated_at = now;
        })
        .ok_or_else(|| AppError::not_found(format!("user {id} not found")))?;

    persist_user(&state, &updated).await?;
    Ok(Json(updated))
}

/// POST /v1/auth/login — Exchange a username for a bearer token.
///
/// Guarded by the strict auth rate limiter keyed on network identity.
#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 403, description = "Account deactivated", body = crate::error::ErrorBody),
        (status = 404, description = "Unknown username", body = crate::error::ErrorBody),
        (status = 429, description = "Too many attempts", body = crate::error::ErrorBody),
    ),
    tag = "auth"
)]
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, AppError> {
    let req = extract_validated_json(body)?;

    let secret = state.config.auth_token.clone().ok_or_else(|| {
        AppError::ServiceUnavailable("authentication is disabled; no token secret configured".into())
    })?;

    let username = req.username.trim();
    let user = state
        .users
        .find(|u| u.username == username)
        .ok_or_else(|| AppError::not_found(format!("no user named '{username}'")))?;

    if !user.active {
        return Err(AppError::Forbidden("account is deactivated".into()));
    }

    tracing::info!(user = %user.username, "login token issued");
    Ok(Json(LoginResponse {
        token: format!("{}:{}:{}", user.role.as_str(), user.id, secret),
        role: user.role,
        user_id: user.id,
    }))
}
