// SPDX-License-Identifier: BUSL-1.1
//! # Stock Movement Ledger
//!
//! Append-only journal of stock transactions plus a per-(product, warehouse)
//! level index. Levels are derived state: every level equals the sum of the
//! journal deltas for its key.
//!
//! Invariant: a stock level never goes negative. A posting that would
//! overdraw fails with [`StockError::InsufficientStock`] and mutates
//! nothing — including multi-entry postings (order issue, transfer), which
//! validate every leg before applying any.
//!
//! Writes are serialized by the journal lock; reads go straight to the
//! `DashMap` level index without blocking writers mid-read of a single key.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ims_core::LineItem;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Stock error type
// ---------------------------------------------------------------------------

/// Errors arising from stock postings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StockError {
    /// The posting would take a level below zero.
    #[error("insufficient stock for product {product_id} in warehouse {warehouse_id}: available {available}, requested {requested}")]
    InsufficientStock {
        product_id: Uuid,
        warehouse_id: Uuid,
        available: i64,
        requested: i64,
    },

    /// Quantities on inbound/outbound/transfer postings must be positive.
    #[error("quantity must be greater than zero, got {0}")]
    NonPositiveQuantity(i64),

    /// Adjustments must actually move the level.
    #[error("adjustment delta must not be zero")]
    ZeroAdjustment,

    /// Adjustments and returns must carry a reason.
    #[error("{kind} postings require a reason")]
    MissingReason { kind: StockTransactionKind },

    /// A transfer needs two distinct warehouses.
    #[error("source and destination warehouses must differ")]
    SameWarehouse,
}

// ---------------------------------------------------------------------------
// Transaction types
// ---------------------------------------------------------------------------

/// The kind of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StockTransactionKind {
    /// Goods received (purchase receipt, order-cancellation restock).
    Inbound,
    /// Goods issued (order shipment).
    Outbound,
    /// Manual correction, signed delta, reason required.
    Adjustment,
    /// Debit leg of a warehouse transfer.
    TransferOut,
    /// Credit leg of a warehouse transfer.
    TransferIn,
    /// Goods sent back to a supplier, reason required.
    Return,
}

impl StockTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "Inbound",
            Self::Outbound => "Outbound",
            Self::Adjustment => "Adjustment",
            Self::TransferOut => "TransferOut",
            Self::TransferIn => "TransferIn",
            Self::Return => "Return",
        }
    }

    /// Parse a kind string as stored in database rows.
    pub fn parse(s: &str) -> Option<StockTransactionKind> {
        match s {
            "Inbound" => Some(Self::Inbound),
            "Outbound" => Some(Self::Outbound),
            "Adjustment" => Some(Self::Adjustment),
            "TransferOut" => Some(Self::TransferOut),
            "TransferIn" => Some(Self::TransferIn),
            "Return" => Some(Self::Return),
            _ => None,
        }
    }
}

impl std::fmt::Display for StockTransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One journal entry. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockTransaction {
    pub id: Uuid,
    pub kind: StockTransactionKind,
    pub product_id: Uuid,
    pub warehouse_id: Uuid,
    /// Signed level change. Positive for Inbound/TransferIn, negative for
    /// Outbound/TransferOut/Return; Adjustment carries either sign.
    pub quantity_delta: i64,
    pub reason: Option<String>,
    /// Originating document code (e.g. `OR-00012`, `PO-00003`), if any.
    pub reference: Option<String>,
    pub actor_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Stock book
// ---------------------------------------------------------------------------

/// One leg of a posting, validated before anything is applied.
struct Leg {
    kind: StockTransactionKind,
    product_id: Uuid,
    warehouse_id: Uuid,
    delta: i64,
}

/// In-memory stock book: level index plus append-only journal.
pub struct StockBook {
    levels: DashMap<(Uuid, Uuid), i64>,
    journal: Mutex<Vec<StockTransaction>>,
}

impl StockBook {
    /// Create an empty book.
    pub fn new() -> Self {
        Self {
            levels: DashMap::new(),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Current level for a (product, warehouse) pair. Missing keys are zero.
    pub fn level(&self, product_id: Uuid, warehouse_id: Uuid) -> i64 {
        self.levels
            .get(&(product_id, warehouse_id))
            .map(|v| *v)
            .unwrap_or(0)
    }

    /// All non-zero levels for one product across warehouses.
    pub fn levels_for_product(&self, product_id: Uuid) -> Vec<(Uuid, i64)> {
        self.levels
            .iter()
            .filter(|e| e.key().0 == product_id && *e.value() != 0)
            .map(|e| (e.key().1, *e.value()))
            .collect()
    }

    /// Whether any warehouse holds stock of this product.
    pub fn product_has_stock(&self, product_id: Uuid) -> bool {
        self.levels
            .iter()
            .any(|e| e.key().0 == product_id && *e.value() > 0)
    }

    /// Whether this warehouse holds any stock.
    pub fn warehouse_has_stock(&self, warehouse_id: Uuid) -> bool {
        self.levels
            .iter()
            .any(|e| e.key().1 == warehouse_id && *e.value() > 0)
    }

    /// Snapshot of the journal, oldest first.
    pub fn journal(&self) -> Vec<StockTransaction> {
        self.journal.lock().clone()
    }

    /// Number of journal entries.
    pub fn journal_len(&self) -> usize {
        self.journal.lock().len()
    }

    /// Post a purchase receipt: one inbound leg per line item.
    pub fn receive_purchase(
        &self,
        items: &[LineItem],
        warehouse_id: Uuid,
        reference: &str,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockTransaction>, StockError> {
        let legs = items
            .iter()
            .map(|item| positive_leg(StockTransactionKind::Inbound, item, warehouse_id, 1))
            .collect::<Result<Vec<_>, _>>()?;
        self.post(legs, None, Some(reference), Some(actor_id), now)
    }

    /// Issue stock for an order shipment: one outbound leg per line item.
    /// Fails without mutating if any line would overdraw.
    pub fn issue_order(
        &self,
        items: &[LineItem],
        warehouse_id: Uuid,
        reference: &str,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockTransaction>, StockError> {
        let legs = items
            .iter()
            .map(|item| positive_leg(StockTransactionKind::Outbound, item, warehouse_id, -1))
            .collect::<Result<Vec<_>, _>>()?;
        self.post(legs, None, Some(reference), Some(actor_id), now)
    }

    /// Restock a cancelled shipment: the inbound reversal of
    /// [`issue_order`].
    pub fn restock_order(
        &self,
        items: &[LineItem],
        warehouse_id: Uuid,
        reference: &str,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockTransaction>, StockError> {
        let legs = items
            .iter()
            .map(|item| positive_leg(StockTransactionKind::Inbound, item, warehouse_id, 1))
            .collect::<Result<Vec<_>, _>>()?;
        self.post(
            legs,
            Some("order cancelled after shipment"),
            Some(reference),
            Some(actor_id),
            now,
        )
    }

    /// Return received goods to the supplier: outbound legs, reason
    /// required, overdraw-checked.
    pub fn return_purchase(
        &self,
        items: &[LineItem],
        warehouse_id: Uuid,
        reason: &str,
        reference: &str,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockTransaction>, StockError> {
        if reason.trim().is_empty() {
            return Err(StockError::MissingReason {
                kind: StockTransactionKind::Return,
            });
        }
        let legs = items
            .iter()
            .map(|item| positive_leg(StockTransactionKind::Return, item, warehouse_id, -1))
            .collect::<Result<Vec<_>, _>>()?;
        self.post(legs, Some(reason), Some(reference), Some(actor_id), now)
    }

    /// Manual correction with a signed delta. Reason required; the
    /// resulting level must not be negative.
    pub fn adjust(
        &self,
        product_id: Uuid,
        warehouse_id: Uuid,
        delta: i64,
        reason: &str,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<StockTransaction, StockError> {
        if delta == 0 {
            return Err(StockError::ZeroAdjustment);
        }
        if reason.trim().is_empty() {
            return Err(StockError::MissingReason {
                kind: StockTransactionKind::Adjustment,
            });
        }
        let legs = vec![Leg {
            kind: StockTransactionKind::Adjustment,
            product_id,
            warehouse_id,
            delta,
        }];
        let mut posted = self.post(legs, Some(reason), None, Some(actor_id), now)?;
        Ok(posted.remove(0))
    }

    /// Move stock between warehouses: a TransferOut and a TransferIn posted
    /// together — both legs or neither. Conserves total quantity.
    pub fn transfer(
        &self,
        product_id: Uuid,
        from_warehouse_id: Uuid,
        to_warehouse_id: Uuid,
        quantity: i64,
        actor_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockTransaction>, StockError> {
        if quantity <= 0 {
            return Err(StockError::NonPositiveQuantity(quantity));
        }
        if from_warehouse_id == to_warehouse_id {
            return Err(StockError::SameWarehouse);
        }
        let legs = vec![
            Leg {
                kind: StockTransactionKind::TransferOut,
                product_id,
                warehouse_id: from_warehouse_id,
                delta: -quantity,
            },
            Leg {
                kind: StockTransactionKind::TransferIn,
                product_id,
                warehouse_id: to_warehouse_id,
                delta: quantity,
            },
        ];
        self.post(legs, None, None, Some(actor_id), now)
    }

    /// Insert a journal entry directly and replay its delta (used for
    /// hydration from the database). No invariant checks — the database is
    /// the authority on history.
    pub fn insert(&self, tx: StockTransaction) {
        let mut journal = self.journal.lock();
        *self
            .levels
            .entry((tx.product_id, tx.warehouse_id))
            .or_insert(0) += tx.quantity_delta;
        journal.push(tx);
    }

    /// Validate every leg against current levels, then apply all of them
    /// and append the journal entries. Runs entirely under the journal
    /// lock so concurrent postings cannot interleave between validation
    /// and application.
    fn post(
        &self,
        legs: Vec<Leg>,
        reason: Option<&str>,
        reference: Option<&str>,
        actor_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Vec<StockTransaction>, StockError> {
        let mut journal = self.journal.lock();

        // Validation pass. Accumulate per-key effects so several legs
        // against the same key (two lines of one product) are checked
        // against their combined effect.
        let mut projected: std::collections::HashMap<(Uuid, Uuid), i64> =
            std::collections::HashMap::new();
        for leg in &legs {
            let key = (leg.product_id, leg.warehouse_id);
            let current = *projected
                .entry(key)
                .or_insert_with(|| self.level(leg.product_id, leg.warehouse_id));
            let next = current + leg.delta;
            if next < 0 {
                return Err(StockError::InsufficientStock {
                    product_id: leg.product_id,
                    warehouse_id: leg.warehouse_id,
                    available: current,
                    requested: -leg.delta,
                });
            }
            projected.insert(key, next);
        }

        // Application pass.
        let mut posted = Vec::with_capacity(legs.len());
        for leg in legs {
            *self
                .levels
                .entry((leg.product_id, leg.warehouse_id))
                .or_insert(0) += leg.delta;
            let tx = StockTransaction {
                id: Uuid::new_v4(),
                kind: leg.kind,
                product_id: leg.product_id,
                warehouse_id: leg.warehouse_id,
                quantity_delta: leg.delta,
                reason: reason.map(str::to_string),
                reference: reference.map(str::to_string),
                actor_id,
                created_at: now,
            };
            journal.push(tx.clone());
            posted.push(tx);
        }
        Ok(posted)
    }
}

impl Default for StockBook {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StockBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockBook")
            .field("tracked_levels", &self.levels.len())
            .field("journal_len", &self.journal_len())
            .finish()
    }
}

/// Build a leg from a line item with a direction sign, rejecting zero
/// quantities.
fn positive_leg(
    kind: StockTransactionKind,
    item: &LineItem,
    warehouse_id: Uuid,
    sign: i64,
) -> Result<Leg, StockError> {
    let quantity = i64::from(item.quantity);
    if quantity <= 0 {
        return Err(StockError::NonPositiveQuantity(quantity));
    }
    Ok(Leg {
        kind,
        product_id: item.product_id,
        warehouse_id,
        delta: sign * quantity,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use ims_core::Money;

    fn item(product_id: Uuid, quantity: u32) -> LineItem {
        LineItem {
            product_id,
            quantity,
            unit_price: Money::from_minor(100),
        }
    }

    fn actor() -> Uuid {
        Uuid::new_v4()
    }

    #[test]
    fn receive_then_issue_round_trips_levels() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let now = Utc::now();

        book.receive_purchase(&[item(product, 10)], wh, "PO-00001", actor(), now)
            .unwrap();
        assert_eq!(book.level(product, wh), 10);

        book.issue_order(&[item(product, 4)], wh, "OR-00001", actor(), now)
            .unwrap();
        assert_eq!(book.level(product, wh), 6);
        assert_eq!(book.journal_len(), 2);
    }

    #[test]
    fn overdraw_fails_and_mutates_nothing() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let now = Utc::now();

        book.receive_purchase(&[item(product, 3)], wh, "PO-00001", actor(), now)
            .unwrap();

        let err = book
            .issue_order(&[item(product, 5)], wh, "OR-00001", actor(), now)
            .unwrap_err();
        assert!(matches!(
            err,
            StockError::InsufficientStock {
                available: 3,
                requested: 5,
                ..
            }
        ));
        assert_eq!(book.level(product, wh), 3);
        assert_eq!(book.journal_len(), 1);
    }

    #[test]
    fn multi_line_issue_is_all_or_nothing() {
        let book = StockBook::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let now = Utc::now();

        book.receive_purchase(&[item(a, 10), item(b, 1)], wh, "PO-00001", actor(), now)
            .unwrap();

        // Second line overdraws; the first line must not be applied.
        let err = book
            .issue_order(&[item(a, 2), item(b, 5)], wh, "OR-00001", actor(), now)
            .unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));
        assert_eq!(book.level(a, wh), 10);
        assert_eq!(book.level(b, wh), 1);
    }

    #[test]
    fn repeated_product_lines_are_checked_against_combined_effect() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let now = Utc::now();

        book.receive_purchase(&[item(product, 5)], wh, "PO-00001", actor(), now)
            .unwrap();

        // 3 + 3 exceeds the available 5 even though each line alone fits.
        let err = book
            .issue_order(
                &[item(product, 3), item(product, 3)],
                wh,
                "OR-00001",
                actor(),
                now,
            )
            .unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));
        assert_eq!(book.level(product, wh), 5);
    }

    #[test]
    fn transfer_conserves_total_quantity() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let src = Uuid::new_v4();
        let dst = Uuid::new_v4();
        let now = Utc::now();

        book.receive_purchase(&[item(product, 8)], src, "PO-00001", actor(), now)
            .unwrap();
        let posted = book.transfer(product, src, dst, 5, actor(), now).unwrap();

        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].kind, StockTransactionKind::TransferOut);
        assert_eq!(posted[1].kind, StockTransactionKind::TransferIn);
        assert_eq!(book.level(product, src), 3);
        assert_eq!(book.level(product, dst), 5);
        assert_eq!(
            book.level(product, src) + book.level(product, dst),
            8
        );
    }

    #[test]
    fn transfer_without_source_stock_posts_neither_leg() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let src = Uuid::new_v4();
        let dst = Uuid::new_v4();

        let err = book
            .transfer(product, src, dst, 5, actor(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, StockError::InsufficientStock { .. }));
        assert_eq!(book.level(product, dst), 0);
        assert_eq!(book.journal_len(), 0);
    }

    #[test]
    fn transfer_rejects_same_warehouse_and_bad_quantity() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let wh = Uuid::new_v4();
        assert!(matches!(
            book.transfer(product, wh, wh, 5, actor(), Utc::now()),
            Err(StockError::SameWarehouse)
        ));
        assert!(matches!(
            book.transfer(product, wh, Uuid::new_v4(), 0, actor(), Utc::now()),
            Err(StockError::NonPositiveQuantity(0))
        ));
    }

    #[test]
    fn adjustment_requires_reason_and_nonzero_delta() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let now = Utc::now();

        assert!(matches!(
            book.adjust(product, wh, 0, "cycle count", actor(), now),
            Err(StockError::ZeroAdjustment)
        ));
        assert!(matches!(
            book.adjust(product, wh, 5, "  ", actor(), now),
            Err(StockError::MissingReason { .. })
        ));

        book.adjust(product, wh, 5, "cycle count", actor(), now)
            .unwrap();
        assert_eq!(book.level(product, wh), 5);

        // Negative adjustment below zero is refused.
        assert!(matches!(
            book.adjust(product, wh, -6, "shrinkage", actor(), now),
            Err(StockError::InsufficientStock { .. })
        ));
    }

    #[test]
    fn purchase_return_requires_reason_and_stock() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let now = Utc::now();

        book.receive_purchase(&[item(product, 4)], wh, "PO-00002", actor(), now)
            .unwrap();

        assert!(matches!(
            book.return_purchase(&[item(product, 4)], wh, "", "PO-00002", actor(), now),
            Err(StockError::MissingReason { .. })
        ));

        book.return_purchase(
            &[item(product, 4)],
            wh,
            "failed inspection",
            "PO-00002",
            actor(),
            now,
        )
        .unwrap();
        assert_eq!(book.level(product, wh), 0);
    }

    #[test]
    fn journal_records_reference_and_actor() {
        let book = StockBook::new();
        let product = Uuid::new_v4();
        let wh = Uuid::new_v4();
        let a = actor();

        book.receive_purchase(&[item(product, 2)], wh, "PO-00009", a, Utc::now())
            .unwrap();
        let journal = book.journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].reference.as_deref(), Some("PO-00009"));
        assert_eq!(journal[0].actor_id, Some(a));
        assert_eq!(journal[0].quantity_delta, 2);
    }
}
