//! # API Route Modules
//!
//! Route modules for the IMS API surface:
//!
//! - `orders` — sales order CRUD and lifecycle transitions
//!   (process/ship/deliver/complete/cancel).
//! - `purchases` — purchase order CRUD and lifecycle transitions
//!   (place/receive/cancel/return), with stock side effects.
//! - `products` — product catalog CRUD and per-product stock views.
//! - `warehouses` — warehouse CRUD.
//! - `stock` — stock ledger reads, manual adjustments, and
//!   inter-warehouse transfers.
//! - `users` — user administration, rate-limit exemption grants, and the
//!   login endpoint (mounted separately behind the strict auth limiter).

pub mod orders;
pub mod products;
pub mod purchases;
pub mod stock;
pub mod users;
pub mod warehouses;
