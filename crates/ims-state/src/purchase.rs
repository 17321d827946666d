// SPDX-License-Identifier: BUSL-1.1
//! # Purchase Order Lifecycle State Machine
//!
//! The inbound counterpart of [`crate::order`]:
//!
//! ```text
//! Pending ──place──> Ordered ──receive──> Received ──return──> Returned
//!    │                  │
//!    └─────cancel───────┘
//!        Cancelled
//! ```
//!
//! Receiving posts inbound stock; returning posts the outbound reversal.
//! Both side effects run in the caller before the transition commits, so a
//! failed stock posting leaves the purchase untouched.

use chrono::{DateTime, Duration, Utc};
use ims_core::{total_amount, FieldViolation, LineItem, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::DELETE_GRACE_HOURS;

// ---------------------------------------------------------------------------
// Purchase error type
// ---------------------------------------------------------------------------

/// Errors arising from purchase lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PurchaseError {
    /// The requested operation is not legal in the purchase's current status.
    #[error("invalid transition: cannot {operation} a purchase in status {current}")]
    InvalidTransition {
        operation: &'static str,
        current: PurchaseStatus,
    },

    /// Field edits are rejected once the goods are received.
    #[error("purchase is not editable in status {current}")]
    NotEditable { current: PurchaseStatus },

    /// A direct status change outside the update whitelist.
    #[error("status change {from} -> {to} is not allowed through update")]
    StatusChangeNotAllowed {
        from: PurchaseStatus,
        to: PurchaseStatus,
    },

    /// Cancellation or return was requested without a reason.
    #[error("{operation} requires a reason")]
    MissingReason { operation: &'static str },

    /// A Pending purchase past the deletion grace period.
    #[error("purchase is {age_hours}h old; only purchases younger than {DELETE_GRACE_HOURS}h may be deleted while Pending")]
    DeleteWindowExpired { age_hours: i64 },

    /// Line item or field validation failure.
    #[error(transparent)]
    Field(#[from] FieldViolation),
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// The lifecycle status of a purchase order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurchaseStatus {
    /// Drafted, not yet sent to the supplier.
    Pending,
    /// Placed with the supplier.
    Ordered,
    /// Goods received; inbound stock has been posted.
    Received,
    /// Cancelled before receipt. Terminal state.
    Cancelled,
    /// Goods sent back to the supplier. Terminal state.
    Returned,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Ordered => "Ordered",
            Self::Received => "Received",
            Self::Cancelled => "Cancelled",
            Self::Returned => "Returned",
        }
    }

    /// Parse a status string as stored in database rows.
    pub fn parse(s: &str) -> Option<PurchaseStatus> {
        match s {
            "Pending" => Some(Self::Pending),
            "Ordered" => Some(Self::Ordered),
            "Received" => Some(Self::Received),
            "Cancelled" => Some(Self::Cancelled),
            "Returned" => Some(Self::Returned),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Returned)
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Pending | Self::Ordered)
    }

    /// Cancellation is only legal before goods arrive.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Ordered)
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (from, to) pairs a generic field update may set directly.
pub fn update_status_whitelist(from: PurchaseStatus) -> &'static [PurchaseStatus] {
    match from {
        PurchaseStatus::Pending => &[PurchaseStatus::Ordered, PurchaseStatus::Cancelled],
        _ => &[],
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A purchase order.
///
/// Same derivation rule as orders: `total_amount` always equals
/// `Σ quantity × unit_price` over `line_items`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub id: Uuid,
    /// Human-readable sequential code, e.g. `PO-00001`. Globally unique.
    pub code: String,
    pub supplier_name: String,
    pub status: PurchaseStatus,
    /// Warehouse goods are received into.
    pub warehouse_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub total_amount: Money,
    pub cancellation_reason: Option<String>,
    pub return_reason: Option<String>,
    pub ordered_by: Option<Uuid>,
    pub received_by: Option<Uuid>,
    pub cancelled_by: Option<Uuid>,
    pub returned_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a generic update may change. `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct PurchasePatch {
    pub supplier_name: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub status: Option<PurchaseStatus>,
}

impl PurchaseRecord {
    /// Create a new purchase in Pending with a validated item list.
    pub fn new(
        id: Uuid,
        code: String,
        supplier_name: String,
        warehouse_id: Uuid,
        line_items: Vec<LineItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, PurchaseError> {
        let total = total_amount(&line_items)?;
        Ok(Self {
            id,
            code,
            supplier_name,
            status: PurchaseStatus::Pending,
            warehouse_id,
            line_items,
            total_amount: total,
            cancellation_reason: None,
            return_reason: None,
            ordered_by: None,
            received_by: None,
            cancelled_by: None,
            returned_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Pending → Ordered. Stamps `ordered_by`.
    pub fn place(&mut self, actor: Uuid, now: DateTime<Utc>) -> Result<(), PurchaseError> {
        if self.status != PurchaseStatus::Pending {
            return Err(PurchaseError::InvalidTransition {
                operation: "place",
                current: self.status,
            });
        }
        self.status = PurchaseStatus::Ordered;
        self.ordered_by = Some(actor);
        self.updated_at = now;
        Ok(())
    }

    /// Ordered → Received. Stamps `received_by`. The caller posts inbound
    /// stock before committing this transition.
    pub fn receive(&mut self, actor: Uuid, now: DateTime<Utc>) -> Result<(), PurchaseError> {
        if self.status != PurchaseStatus::Ordered {
            return Err(PurchaseError::InvalidTransition {
                operation: "receive",
                current: self.status,
            });
        }
        self.status = PurchaseStatus::Received;
        self.received_by = Some(actor);
        self.updated_at = now;
        Ok(())
    }

    /// {Pending, Ordered} → Cancelled. Reason required, checked first.
    pub fn cancel(
        &mut self,
        actor: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), PurchaseError> {
        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return Err(PurchaseError::MissingReason {
                operation: "cancel",
            }),
        };
        if !self.status.is_cancellable() {
            return Err(PurchaseError::InvalidTransition {
                operation: "cancel",
                current: self.status,
            });
        }
        self.status = PurchaseStatus::Cancelled;
        self.cancelled_by = Some(actor);
        self.cancellation_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Received → Returned. Reason required, checked first. The caller posts
    /// the outbound stock reversal before committing this transition.
    pub fn return_to_supplier(
        &mut self,
        actor: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), PurchaseError> {
        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return Err(PurchaseError::MissingReason {
                operation: "return",
            }),
        };
        if self.status != PurchaseStatus::Received {
            return Err(PurchaseError::InvalidTransition {
                operation: "return",
                current: self.status,
            });
        }
        self.status = PurchaseStatus::Returned;
        self.returned_by = Some(actor);
        self.return_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Generic field update — same contract as the order variant.
    pub fn apply_update(
        &mut self,
        patch: PurchasePatch,
        now: DateTime<Utc>,
    ) -> Result<(), PurchaseError> {
        if !self.status.is_editable() {
            return Err(PurchaseError::NotEditable {
                current: self.status,
            });
        }

        if let Some(to) = patch.status {
            if to != self.status && !update_status_whitelist(self.status).contains(&to) {
                return Err(PurchaseError::StatusChangeNotAllowed {
                    from: self.status,
                    to,
                });
            }
        }

        let new_total = match &patch.line_items {
            Some(items) => Some(total_amount(items)?),
            None => None,
        };

        if let Some(name) = patch.supplier_name {
            self.supplier_name = name;
        }
        if let Some(items) = patch.line_items {
            self.line_items = items;
            self.total_amount = new_total.unwrap_or(self.total_amount);
        }
        if let Some(to) = patch.status {
            self.status = to;
        }
        self.updated_at = now;
        Ok(())
    }

    /// Deletion gate: Cancelled always, Pending only within the grace period.
    pub fn ensure_deletable(&self, now: DateTime<Utc>) -> Result<(), PurchaseError> {
        match self.status {
            PurchaseStatus::Cancelled => Ok(()),
            PurchaseStatus::Pending => {
                let age = now.signed_duration_since(self.created_at);
                if age <= Duration::hours(DELETE_GRACE_HOURS) {
                    Ok(())
                } else {
                    Err(PurchaseError::DeleteWindowExpired {
                        age_hours: age.num_hours(),
                    })
                }
            }
            other => Err(PurchaseError::InvalidTransition {
                operation: "delete",
                current: other,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
