//! # Rate Limiting with Role-Based Exemption
//!
//! Fixed-window request counter keyed by client identity, with bypass rules
//! for privileged actors and a manual bypass escape hatch.
//!
//! ## Keying
//!
//! Authenticated requests count against the actor's user ID — stable across
//! NATs and consistent with the identity the exemption is granted to.
//! Unauthenticated requests (the auth endpoints) count against network
//! identity: the first `X-Forwarded-For` hop, else the peer address.
//!
//! ## Exemption
//!
//! A request skips counting entirely — it neither consumes nor is blocked
//! by the budget — when any of:
//!
//! - the actor's role is Admin or SuperAdmin;
//! - the actor holds a `rate_limit_exempt_until` grant strictly in the
//!   future (looked up from the user store at evaluation time);
//! - the request carries the [`RateLimitBypass`] marker. The marker is set
//!   by [`rate_limit_bypass_middleware`], which MUST be layered so it runs
//!   before the counting middleware or it has no effect.
//!
//! ## Configurations
//!
//! Two named budgets: [`RateLimitConfig::global`] applied to every API
//! request, and [`RateLimitConfig::auth`] — short window, small budget —
//! scoped to the authentication endpoints to blunt credential guessing.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Duration, Utc};
use ims_core::{ActorDescriptor, Clock, SystemClock};
use parking_lot::Mutex;

use crate::auth::CallerIdentity;
use crate::error::AppError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u64,
    /// Window duration.
    pub window: Duration,
}

impl RateLimitConfig {
    /// Generous budget applied to every API request.
    pub fn global() -> Self {
        Self {
            max_requests: 1000,
            window: Duration::seconds(60),
        }
    }

    /// Strict budget for authentication endpoints.
    pub fn auth() -> Self {
        Self {
            max_requests: 5,
            window: Duration::minutes(15),
        }
    }
}

// ---------------------------------------------------------------------------
// Limiter
// ---------------------------------------------------------------------------

/// Per-key window state.
#[derive(Debug, Clone)]
struct WindowState {
    count: u64,
    window_start: DateTime<Utc>,
}

/// Outcome of a budget check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Under budget. Headers expose the remaining allowance.
    Allowed {
        limit: u64,
        remaining: u64,
        reset_time: DateTime<Utc>,
    },
    /// Budget exhausted for this window.
    Limited {
        limit: u64,
        reset_time: DateTime<Utc>,
    },
}

/// Shared fixed-window rate limiter.
///
/// Windows reset lazily on access: when a request arrives after the window
/// has elapsed, the entry restarts at count 1. Entries persist for the
/// process lifetime. The read-check-increment sequence runs under one lock
/// so the count never exceeds the budget.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clock: Arc<dyn Clock>,
    windows: Arc<Mutex<HashMap<String, WindowState>>>,
}

impl RateLimiter {
    /// Create a limiter on the system clock.
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected clock so tests can simulate window
    /// expiry deterministically instead of sleeping.
    pub fn with_clock(config: RateLimitConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The limiter's view of "now".
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Count a request against `key` and decide whether it fits the budget.
    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = self.clock.now();
        let mut windows = self.windows.lock();

        let state = windows.entry(key.to_string()).or_insert(WindowState {
            count: 0,
            window_start: now,
        });

        if now.signed_duration_since(state.window_start) >= self.config.window {
            state.count = 0;
            state.window_start = now;
        }

        let reset_time = state.window_start + self.config.window;
        if state.count >= self.config.max_requests {
            RateLimitDecision::Limited {
                limit: self.config.max_requests,
                reset_time,
            }
        } else {
            state.count += 1;
            RateLimitDecision::Allowed {
                limit: self.config.max_requests,
                remaining: self.config.max_requests - state.count,
                reset_time,
            }
        }
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("tracked_keys", &self.windows.lock().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Bypass marker
// ---------------------------------------------------------------------------

/// Marker inserted into request extensions by the bypass middleware and
/// consumed by the counting middleware before it counts.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitBypass;

/// Mark requests on configured path prefixes as bypassed.
///
/// Ordering-sensitive: this middleware must execute before the counting
/// middleware on the request path (i.e. be layered outside it), otherwise
/// the marker is set too late and has no effect.
pub async fn rate_limit_bypass_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if state
        .config
        .rate_limit_bypass_paths
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        request.extensions_mut().insert(RateLimitBypass);
    }
    next.run(request).await
}

// ---------------------------------------------------------------------------
// Counting middleware
// ---------------------------------------------------------------------------

/// Enforce the global budget on API requests.
pub async fn global_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = state.global_limiter.clone();
    enforce(&state, limiter, request, next).await
}

/// Enforce the strict budget on authentication endpoints.
pub async fn auth_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let limiter = state.auth_limiter.clone();
    enforce(&state, limiter, request, next).await
}

/// Shared enforcement: exemption check, then count, then attach headers.
async fn enforce(state: &AppState, limiter: RateLimiter, request: Request, next: Next) -> Response {
    // Manually bypassed requests skip counting entirely.
    if request.extensions().get::<RateLimitBypass>().is_some() {
        return next.run(request).await;
    }

    let caller = request.extensions().get::<CallerIdentity>().cloned();
    let now = limiter.now();

    // Privileged roles and unexpired grants skip counting entirely. The
    // grant lives on the user record, not in the token, so a revocation
    // takes effect on the next request.
    if let Some(caller) = &caller {
        if let Some(actor_id) = caller.actor_id {
            let exempt_until = state
                .users
                .get(&actor_id)
                .and_then(|u| u.rate_limit_exempt_until);
            let descriptor = ActorDescriptor {
                actor_id,
                role: caller.role,
                rate_limit_exempt_until: exempt_until,
            };
            if descriptor.is_rate_limit_exempt(now) {
                return next.run(request).await;
            }
        } else if caller.role >= ims_core::Role::Admin {
            // Legacy tokens have no user record to look up.
            return next.run(request).await;
        }
    }

    let key = counting_key(caller.as_ref(), &request);

    match limiter.check(&key) {
        RateLimitDecision::Allowed {
            limit,
            remaining,
            reset_time,
        } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            if let Ok(v) = HeaderValue::from_str(&limit.to_string()) {
                headers.insert("RateLimit-Limit", v);
            }
            if let Ok(v) = HeaderValue::from_str(&remaining.to_string()) {
                headers.insert("RateLimit-Remaining", v);
            }
            if let Ok(v) = HeaderValue::from_str(&reset_time.to_rfc3339()) {
                headers.insert("RateLimit-Reset", v);
            }
            response
        }
        RateLimitDecision::Limited { limit, reset_time } => {
            tracing::warn!(key = %key, limit, "rate limit exceeded");
            AppError::TooManyRequests { limit, reset_time }.into_response()
        }
    }
}

/// Stable counting key: actor identity when authenticated, network identity
/// otherwise.
fn counting_key(caller: Option<&CallerIdentity>, request: &Request) -> String {
    if let Some(actor_id) = caller.and_then(|c| c.actor_id) {
        return format!("user:{actor_id}");
    }

    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        return format!("ip:{forwarded}");
    }

    request
        .extensions()
        .get::<ConnectInfo<std::net::SocketAddr>>()
        .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        .unwrap_or_else(|| "ip:anonymous".to_string())
}
