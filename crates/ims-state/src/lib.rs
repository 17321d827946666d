// SPDX-License-Identifier: BUSL-1.1
//! # ims-state — Lifecycle State Machines & Stock Ledger
//!
//! The control logic of the IMS stack, independent of HTTP and storage:
//!
//! - [`order`] — the sales order lifecycle
//!   (Pending → Processing → Shipped → Delivered → Completed, with
//!   cancellation from the first three states).
//! - [`purchase`] — the purchase order lifecycle
//!   (Pending → Ordered → Received, cancellation from the first two,
//!   return-to-supplier from Received).
//! - [`stock`] — the append-only stock movement ledger and per-warehouse
//!   level index, with the never-negative invariant.
//!
//! Every rule violation is a typed error; a failed operation mutates
//! nothing. Transitions mutate a record in place and are intended to run
//! under the caller's per-entity write lock so concurrent attempts on one
//! entity have exactly one winner.

pub mod order;
pub mod purchase;
pub mod stock;

pub use order::{OrderError, OrderPatch, OrderRecord, OrderStatus};
pub use purchase::{PurchaseError, PurchasePatch, PurchaseRecord, PurchaseStatus};
pub use stock::{StockBook, StockError, StockTransaction, StockTransactionKind};

/// Grace period within which a still-Pending document may be deleted.
///
/// A non-cancelled document older than this may not be deleted even when it
/// never left Pending — the record is presumed live.
pub const DELETE_GRACE_HOURS: i64 = 24;
