//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers via
//! the `State` extractor.
//!
//! ## Architecture
//!
//! `AppState` holds the in-memory stores for every IMS domain record —
//! orders, purchases, products, warehouses, users — plus the stock book,
//! the sequential code allocators, both rate limiters, and the optional
//! Postgres pool. The in-memory stores are the serving copy; when a pool is
//! configured, mutations write through to Postgres and the stores are
//! hydrated from it at startup.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ims_core::{Clock, CodeSequence, Money, Role, SystemClock};
use ims_state::{OrderRecord, PurchaseRecord, StockBook};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::rate_limit::{RateLimitConfig, RateLimiter};

// -- Generic In-Memory Store --------------------------------------------------

/// Thread-safe, cloneable in-memory key-value store.
///
/// All operations are synchronous (the RwLock is `parking_lot`, not
/// `tokio::sync`) because we never hold the lock across `.await` points.
/// `parking_lot::RwLock` is non-poisonable — a panicking writer does not
/// permanently corrupt the store.
#[derive(Debug)]
pub struct Store<T: Clone + Send + Sync> {
    data: Arc<RwLock<HashMap<Uuid, T>>>,
}

impl<T: Clone + Send + Sync> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
        }
    }
}

impl<T: Clone + Send + Sync> Store<T> {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert a record, returning the previous value if the key existed.
    pub fn insert(&self, id: Uuid, value: T) -> Option<T> {
        self.data.write().insert(id, value)
    }

    /// Retrieve a record by ID.
    pub fn get(&self, id: &Uuid) -> Option<T> {
        self.data.read().get(id).cloned()
    }

    /// List all records.
    pub fn list(&self) -> Vec<T> {
        self.data.read().values().cloned().collect()
    }

    /// Find the first record matching a predicate.
    pub fn find(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.data.read().values().find(|v| predicate(v)).cloned()
    }

    /// Update a record in place. Returns the updated record, or `None` if
    /// not found.
    pub fn update(&self, id: &Uuid, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut guard = self.data.write();
        if let Some(entry) = guard.get_mut(id) {
            f(entry);
            Some(entry.clone())
        } else {
            None
        }
    }

    /// Atomically read-validate-update a record.
    ///
    /// The closure receives a `&mut T` and may inspect the current state,
    /// validate preconditions, mutate the record, and return `Ok(R)` or
    /// `Err(E)`. The entire operation runs under a single write lock,
    /// eliminating TOCTOU races between read and update — concurrent
    /// transition attempts on the same entity have exactly one winner.
    ///
    /// Returns `None` if the record doesn't exist, or `Some(result)` with
    /// the closure's `Result`.
    pub fn try_update<R, E>(
        &self,
        id: &Uuid,
        f: impl FnOnce(&mut T) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        self.data.write().get_mut(id).map(f)
    }

    /// Remove a record by ID.
    pub fn remove(&self, id: &Uuid) -> Option<T> {
        self.data.write().remove(id)
    }

    /// Atomically check a precondition and remove the record only if it
    /// passes. `None` if absent; the guard's error otherwise.
    pub fn try_remove<E>(
        &self,
        id: &Uuid,
        guard: impl FnOnce(&T) -> Result<(), E>,
    ) -> Option<Result<T, E>> {
        let mut data = self.data.write();
        let entry = data.get(id)?;
        Some(match guard(entry) {
            Ok(()) => Ok(data.remove(id).expect("checked above")),
            Err(e) => Err(e),
        })
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &Uuid) -> bool {
        self.data.read().contains_key(id)
    }

    /// Return the number of records.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone + Send + Sync> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}

// -- IMS Record Types ---------------------------------------------------------

/// A product in the catalog.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Product {
    pub id: Uuid,
    /// Stock-keeping unit. Unique across the catalog.
    pub sku: String,
    pub name: String,
    /// Current list price in minor units. Orders copy it at creation time.
    #[schema(value_type = i64)]
    pub unit_price: Money,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A warehouse location.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Warehouse {
    pub id: Uuid,
    /// Short code, e.g. `WH-001`.
    pub code: String,
    pub name: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user account.
///
/// Credentials live in the identity collaborator; this record carries the
/// authorization-relevant fields only.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserRecord {
    pub id: Uuid,
    /// Unique login name.
    pub username: String,
    #[schema(value_type = String)]
    pub role: Role,
    /// Temporary rate-limit exemption grant; exempt while strictly in the
    /// future.
    pub rate_limit_exempt_until: Option<DateTime<Utc>>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// -- Configuration ------------------------------------------------------------

/// Application configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Shared bearer secret. `None` disables auth (development mode).
    pub auth_token: Option<String>,
    pub metrics_enabled: bool,
    /// Budget applied to every API request.
    pub global_rate_limit: RateLimitConfig,
    /// Stricter budget applied to authentication endpoints.
    pub auth_rate_limit: RateLimitConfig,
    /// Path prefixes whose requests bypass rate-limit counting entirely.
    pub rate_limit_bypass_paths: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            metrics_enabled: true,
            global_rate_limit: RateLimitConfig::global(),
            auth_rate_limit: RateLimitConfig::auth(),
            rate_limit_bypass_paths: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Read configuration from `IMS_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: env_parse("IMS_PORT").unwrap_or(defaults.port),
            auth_token: std::env::var("IMS_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
            metrics_enabled: std::env::var("IMS_METRICS_ENABLED")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
            global_rate_limit: RateLimitConfig {
                max_requests: env_parse("IMS_RATE_LIMIT_MAX")
                    .unwrap_or(defaults.global_rate_limit.max_requests),
                window: env_parse("IMS_RATE_LIMIT_WINDOW_SECS")
                    .map(chrono::Duration::seconds)
                    .unwrap_or(defaults.global_rate_limit.window),
            },
            auth_rate_limit: RateLimitConfig {
                max_requests: env_parse("IMS_AUTH_RATE_LIMIT_MAX")
                    .unwrap_or(defaults.auth_rate_limit.max_requests),
                window: env_parse("IMS_AUTH_RATE_LIMIT_WINDOW_SECS")
                    .map(chrono::Duration::seconds)
                    .unwrap_or(defaults.auth_rate_limit.window),
            },
            rate_limit_bypass_paths: std::env::var("IMS_RATE_LIMIT_BYPASS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

// -- Application State --------------------------------------------------------

/// Shared application state. Cheap to clone — everything inside is an Arc.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub orders: Store<OrderRecord>,
    pub purchases: Store<PurchaseRecord>,
    pub products: Store<Product>,
    pub warehouses: Store<Warehouse>,
    pub users: Store<UserRecord>,
    pub stock: Arc<StockBook>,
    pub order_codes: Arc<CodeSequence>,
    pub purchase_codes: Arc<CodeSequence>,
    pub global_limiter: RateLimiter,
    pub auth_limiter: RateLimiter,
    pub clock: Arc<dyn Clock>,
    pub db_pool: Option<PgPool>,
}

impl AppState {
    /// In-memory state with default configuration. Used by tests and
    /// development mode.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    /// State from explicit configuration and an optional database pool.
    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        Self::with_config_and_clock(config, db_pool, Arc::new(SystemClock))
    }

    /// State with an injected clock so tests can drive window expiry and
    /// age checks deterministically.
    pub fn with_config_and_clock(
        config: AppConfig,
        db_pool: Option<PgPool>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let global_limiter =
            RateLimiter::with_clock(config.global_rate_limit.clone(), Arc::clone(&clock));
        let auth_limiter =
            RateLimiter::with_clock(config.auth_rate_limit.clone(), Arc::clone(&clock));
        Self {
            config: Arc::new(config),
            orders: Store::new(),
            purchases: Store::new(),
            products: Store::new(),
            warehouses: Store::new(),
            users: Store::new(),
            stock: Arc::new(StockBook::new()),
            order_codes: Arc::new(CodeSequence::new("OR", 5)),
            purchase_codes: Arc::new(CodeSequence::new("PO", 5)),
            global_limiter,
            auth_limiter,
            clock,
            db_pool,
        }
    }

    /// The current instant, via the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("orders", &self.orders.len())
            .field("purchases", &self.purchases.len())
            .field("products", &self.products.len())
            .field("warehouses", &self.warehouses.len())
            .field("users", &self.users.len())
            .field("db", &self.db_pool.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_insert_get_round_trip() {
        let store: Store<String> = Store::new();
        let id = Uuid::new_v4();
        assert!(store.insert(id, "a".into()).is_none());
        assert_eq!(store.get(&id), Some("a".into()));
        assert_eq!(store.insert(id, "b".into()), Some("a".into()));
    }

    #[test]
    fn try_update_runs_under_one_lock() {
        let store: Store<u32> = Store::new();
        let id = Uuid::new_v4();
        store.insert(id, 1);

        let result: Option<Result<u32, &str>> = store.try_update(&id, |v| {
            if *v == 1 {
                *v = 2;
                Ok(*v)
            } else {
                Err("precondition failed")
            }
        });
        assert_eq!(result, Some(Ok(2)));
        assert_eq!(store.get(&id), Some(2));

        let result: Option<Result<u32, &str>> = store.try_update(&id, |v| {
            if *v == 1 {
                Ok(*v)
            } else {
                Err("precondition failed")
            }
        });
        assert_eq!(result, Some(Err("precondition failed")));
    }

    #[test]
    fn try_update_missing_record_is_none() {
        let store: Store<u32> = Store::new();
        let result: Option<Result<(), ()>> = store.try_update(&Uuid::new_v4(), |_| Ok(()));
        assert!(result.is_none());
    }

    #[test]
    fn try_remove_keeps_record_on_guard_failure() {
        let store: Store<u32> = Store::new();
        let id = Uuid::new_v4();
        store.insert(id, 7);

        let result = store.try_remove(&id, |v| if *v > 10 { Ok(()) } else { Err("too small") });
        assert_eq!(result, Some(Err("too small")));
        assert!(store.contains(&id));

        let result = store.try_remove(&id, |_| Ok::<(), &str>(()));
        assert_eq!(result, Some(Ok(7)));
        assert!(!store.contains(&id));
    }

    #[test]
    fn find_matches_predicate() {
        let store: Store<String> = Store::new();
        store.insert(Uuid::new_v4(), "alpha".into());
        store.insert(Uuid::new_v4(), "beta".into());
        assert_eq!(store.find(|v| v.starts_with('b')), Some("beta".into()));
        assert_eq!(store.find(|v| v.starts_with('z')), None);
    }

    #[test]
    fn default_config_has_both_limiter_budgets() {
        let config = AppConfig::default();
        assert!(config.global_rate_limit.max_requests > config.auth_rate_limit.max_requests);
        assert!(config.global_rate_limit.window < config.auth_rate_limit.window);
    }
}
