//! # Authentication & Authorization Middleware
//!
//! Bearer token middleware with role-based access control (RBAC).
//!
//! ## Token Format
//!
//! Bearer tokens encode role and actor identity:
//!
//! ```text
//! Bearer {role}:{actor_id}:{secret}   — standard format
//! Bearer {secret}                      — legacy format (treated as SuperAdmin)
//! ```
//!
//! ## CallerIdentity
//!
//! Every authenticated request gets a [`CallerIdentity`] injected into the
//! request extensions. Handlers extract it via the `FromRequestParts` impl.
//! The rate-limit middleware uses it for the exemption check and as the
//! counting key, which is why auth runs before rate limiting.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ims_core::Role;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::error::{AppError, ErrorBody, ErrorDetail};

// ── CallerIdentity ──────────────────────────────────────────────────────────

/// Identity of the authenticated caller, extracted from the bearer token
/// and available to all route handlers via Axum's `FromRequestParts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    /// The caller's role in the system.
    pub role: Role,
    /// The caller's user ID. None for legacy tokens, which are not bound
    /// to a user record.
    pub actor_id: Option<Uuid>,
}

impl CallerIdentity {
    /// Check if the caller has at least the given minimum role.
    ///
    /// Since `Role` derives `Ord` with `Staff < Manager < Admin <
    /// SuperAdmin`, this is a single comparison.
    pub fn has_role(&self, minimum: Role) -> bool {
        self.role >= minimum
    }

    /// The actor UUID to stamp on transitions. Legacy tokens stamp the nil
    /// UUID so the audit trail still records that an unbound admin acted.
    pub fn actor_or_nil(&self) -> Uuid {
        self.actor_id.unwrap_or(Uuid::nil())
    }
}

/// Axum `FromRequestParts` implementation for `CallerIdentity`.
///
/// Extracts the identity that the auth middleware injected into extensions.
/// Returns 401 if no identity is present (middleware didn't run or failed).
#[axum::async_trait]
impl<S: Send + Sync> axum::extract::FromRequestParts<S> for CallerIdentity {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// Check that the caller has at least the required role.
/// Returns 403 Forbidden if the caller's role is insufficient.
pub fn require_role(caller: &CallerIdentity, minimum: Role) -> Result<(), AppError> {
    if caller.has_role(minimum) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Auth configuration injected into request extensions.
///
/// Custom `Debug` redacts the token value to prevent credential leakage in
/// logs.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison of bearer tokens.
///
/// Prevents timing side-channels that could reveal token length or prefix.
/// When lengths differ, performs a dummy comparison to avoid leaking length
/// information through timing variance.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        // Dummy comparison to keep timing constant regardless of length match.
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Parse the bearer token in format `{role}:{actor_id}:{secret}` or
/// `{secret}` (legacy).
///
/// Legacy tokens (without role prefix) are treated as `SuperAdmin` for
/// backward compatibility with existing deployments.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<CallerIdentity, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();

    match parts.len() {
        // Legacy format: just the secret.
        1 => {
            if constant_time_token_eq(provided, expected_secret) {
                Ok(CallerIdentity {
                    role: Role::SuperAdmin,
                    actor_id: None,
                })
            } else {
                Err("invalid bearer token".into())
            }
        }
        // Standard format: role:actor_id:secret (actor_id may be empty).
        3 => {
            let role_str = parts[0];
            let actor_str = parts[1];
            let secret = parts[2];

            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }

            let role = Role::parse(role_str).ok_or_else(|| format!("unknown role: {role_str}"))?;

            let actor_id = if actor_str.is_empty() {
                None
            } else {
                Some(
                    actor_str
                        .parse::<Uuid>()
                        .map_err(|e| format!("invalid actor_id: {e}"))?,
                )
            };

            Ok(CallerIdentity { role, actor_id })
        }
        _ => Err("invalid token format — expected {role}:{actor_id}:{secret} or {secret}".into()),
    }
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// Extract and validate the Bearer token from the Authorization header.
///
/// Parses the token to extract `CallerIdentity` (role + actor binding) and
/// injects it into request extensions for downstream handlers.
///
/// When `AuthConfig.token` is `None`, all requests are allowed with
/// `SuperAdmin` identity (auth disabled / development mode).
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected_token = request.extensions().get::<AuthConfig>().cloned();

    match expected_token {
        Some(AuthConfig {
            token: Some(ref expected),
        }) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());

            match auth_header {
                Some(header_value) if header_value.starts_with("Bearer ") => {
                    let provided = &header_value[7..];
                    match parse_bearer_token(provided, expected) {
                        Ok(identity) => {
                            request.extensions_mut().insert(identity);
                            next.run(request).await
                        }
                        Err(msg) => {
                            tracing::warn!(reason = %msg, "authentication failed: invalid bearer token");
                            unauthorized_response(&msg)
                        }
                    }
                }
                Some(_) => {
                    tracing::warn!("authentication failed: non-Bearer authorization scheme");
                    unauthorized_response("authorization header must use Bearer scheme")
                }
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    unauthorized_response("missing authorization header")
                }
            }
        }
        _ => {
            // Auth disabled — inject SuperAdmin identity for full access.
            request.extensions_mut().insert(CallerIdentity {
                role: Role::SuperAdmin,
                actor_id: None,
            });
            next.run(request).await
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        success: false,
        error: ErrorDetail {
            kind: "AuthenticationError".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
