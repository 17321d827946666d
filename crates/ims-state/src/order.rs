// SPDX-License-Identifier: BUSL-1.1
//! # Sales Order Lifecycle State Machine
//!
//! Enforces which status transitions are legal for a sales order and gates
//! side-effecting operations on current state and elapsed time.
//!
//! ```text
//! Pending ──process──> Processing ──ship──> Shipped ──deliver──> Delivered ──complete──> Completed
//!    │                     │                   │
//!    └──────cancel─────────┴───────cancel──────┘        (Delivered/Completed/Cancelled are
//!                        Cancelled                        not cancellable)
//! ```
//!
//! Two separate mechanisms govern status changes:
//!
//! 1. **Dedicated operations** ([`OrderRecord::process`], [`ship`],
//!    [`deliver`], [`complete`], [`cancel`]) — each with a single-transition
//!    precondition and its own actor stamping.
//! 2. **The generic update whitelist** ([`update_status_whitelist`]) — the
//!    only (from, to) pairs a field-level update may set directly. Narrower
//!    than the operation set on purpose; the two are not unified.
//!
//! [`ship`]: OrderRecord::ship
//! [`deliver`]: OrderRecord::deliver
//! [`complete`]: OrderRecord::complete
//! [`cancel`]: OrderRecord::cancel

use chrono::{DateTime, Duration, Utc};
use ims_core::{total_amount, FieldViolation, LineItem, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::DELETE_GRACE_HOURS;

// ---------------------------------------------------------------------------
// Order error type
// ---------------------------------------------------------------------------

/// Errors arising from order lifecycle operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The requested operation is not legal in the order's current status.
    #[error("invalid transition: cannot {operation} an order in status {current}")]
    InvalidTransition {
        operation: &'static str,
        current: OrderStatus,
    },

    /// Field edits are rejected once the order has shipped.
    #[error("order is not editable in status {current}")]
    NotEditable { current: OrderStatus },

    /// A direct status change outside the update whitelist.
    #[error("status change {from} -> {to} is not allowed through update")]
    StatusChangeNotAllowed { from: OrderStatus, to: OrderStatus },

    /// Cancellation was requested without a reason.
    #[error("cancellation requires a reason")]
    MissingCancellationReason,

    /// A Pending order past the deletion grace period.
    #[error("order is {age_hours}h old; only orders younger than {DELETE_GRACE_HOURS}h may be deleted while Pending")]
    DeleteWindowExpired { age_hours: i64 },

    /// Line item or field validation failure.
    #[error(transparent)]
    Field(#[from] FieldViolation),
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// The lifecycle status of a sales order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, awaiting processing.
    Pending,
    /// Picked up by fulfillment.
    Processing,
    /// Left the warehouse; stock has been issued.
    Shipped,
    /// Confirmed received by the customer.
    Delivered,
    /// Closed out. Terminal state.
    Completed,
    /// Cancelled with a recorded reason. Terminal state.
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Processing => "Processing",
            Self::Shipped => "Shipped",
            Self::Delivered => "Delivered",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Parse a status string as stored in database rows.
    pub fn parse(s: &str) -> Option<OrderStatus> {
        match s {
            "Pending" => Some(Self::Pending),
            "Processing" => Some(Self::Processing),
            "Shipped" => Some(Self::Shipped),
            "Delivered" => Some(Self::Delivered),
            "Completed" => Some(Self::Completed),
            "Cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// No further status mutation is permitted from a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Field edits are only legal before the order ships.
    pub fn is_editable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Cancellation is legal until the customer has the goods.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Shipped)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (from, to) pairs a generic field update may set directly.
///
/// Deliberately narrower than the full transition table: everything else
/// must go through a dedicated operation with its own precondition and
/// actor stamping.
pub fn update_status_whitelist(from: OrderStatus) -> &'static [OrderStatus] {
    match from {
        OrderStatus::Pending => &[OrderStatus::Processing, OrderStatus::Cancelled],
        _ => &[],
    }
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

/// A sales order.
///
/// `total_amount` is derived — always `Σ quantity × unit_price` over
/// `line_items` — and is recomputed by every mutation that touches the
/// items. The actor fields are set only by the corresponding transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: Uuid,
    /// Human-readable sequential code, e.g. `OR-00001`. Globally unique.
    pub code: String,
    pub customer_name: String,
    pub status: OrderStatus,
    /// Warehouse stock is issued from when the order ships.
    pub warehouse_id: Uuid,
    pub line_items: Vec<LineItem>,
    pub total_amount: Money,
    pub cancellation_reason: Option<String>,
    pub processed_by: Option<Uuid>,
    pub completed_by: Option<Uuid>,
    pub cancelled_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields a generic update may change. `None` means "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub customer_name: Option<String>,
    pub line_items: Option<Vec<LineItem>>,
    pub status: Option<OrderStatus>,
}

impl OrderRecord {
    /// Create a new order in Pending with a validated item list.
    pub fn new(
        id: Uuid,
        code: String,
        customer_name: String,
        warehouse_id: Uuid,
        line_items: Vec<LineItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let total = total_amount(&line_items)?;
        Ok(Self {
            id,
            code,
            customer_name,
            status: OrderStatus::Pending,
            warehouse_id,
            line_items,
            total_amount: total,
            cancellation_reason: None,
            processed_by: None,
            completed_by: None,
            cancelled_by: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Pending → Processing. Stamps `processed_by`.
    pub fn process(&mut self, actor: Uuid, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending {
            return Err(OrderError::InvalidTransition {
                operation: "process",
                current: self.status,
            });
        }
        self.status = OrderStatus::Processing;
        self.processed_by = Some(actor);
        self.updated_at = now;
        Ok(())
    }

    /// Processing → Shipped. The caller issues stock before committing this
    /// transition; a failed stock issue must leave the order untouched.
    pub fn ship(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Processing {
            return Err(OrderError::InvalidTransition {
                operation: "ship",
                current: self.status,
            });
        }
        self.status = OrderStatus::Shipped;
        self.updated_at = now;
        Ok(())
    }

    /// Shipped → Delivered.
    pub fn deliver(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Shipped {
            return Err(OrderError::InvalidTransition {
                operation: "deliver",
                current: self.status,
            });
        }
        self.status = OrderStatus::Delivered;
        self.updated_at = now;
        Ok(())
    }

    /// Delivered → Completed. Stamps `completed_by`.
    pub fn complete(&mut self, actor: Uuid, now: DateTime<Utc>) -> Result<(), OrderError> {
        if self.status != OrderStatus::Delivered {
            return Err(OrderError::InvalidTransition {
                operation: "complete",
                current: self.status,
            });
        }
        self.status = OrderStatus::Completed;
        self.completed_by = Some(actor);
        self.updated_at = now;
        Ok(())
    }

    /// {Pending, Processing, Shipped} → Cancelled. Stamps `cancelled_by`
    /// and records the reason.
    ///
    /// A missing reason fails regardless of status — the reason check runs
    /// before the status check.
    pub fn cancel(
        &mut self,
        actor: Uuid,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), OrderError> {
        let reason = match reason.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return Err(OrderError::MissingCancellationReason),
        };
        if !self.status.is_cancellable() {
            return Err(OrderError::InvalidTransition {
                operation: "cancel",
                current: self.status,
            });
        }
        self.status = OrderStatus::Cancelled;
        self.cancelled_by = Some(actor);
        self.cancellation_reason = Some(reason.to_string());
        self.updated_at = now;
        Ok(())
    }

    /// Generic field update.
    ///
    /// Rejected outright in non-editable states. A `status` in the patch is
    /// validated against [`update_status_whitelist`]; a pair outside the
    /// whitelist fails loudly rather than being silently ignored.
    /// `total_amount` is recomputed when the items change.
    pub fn apply_update(&mut self, patch: OrderPatch, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.status.is_editable() {
            return Err(OrderError::NotEditable {
                current: self.status,
            });
        }

        if let Some(to) = patch.status {
            if to != self.status && !update_status_whitelist(self.status).contains(&to) {
                return Err(OrderError::StatusChangeNotAllowed {
                    from: self.status,
                    to,
                });
            }
        }

        // Validate before mutating anything: either the whole update commits
        // or nothing does.
        let new_total = match &patch.line_items {
            Some(items) => Some(total_amount(items)?),
            None => None,
        };

        if let Some(name) = patch.customer_name {
            self.customer_name = name;
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
    pub fn ensure_deletable(&self, now: DateTime<Utc>) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Cancelled => Ok(()),
            OrderStatus::Pending => {
                let age = now.signed_duration_since(self.created_at);
                if age <= Duration::hours(DELETE_GRACE_HOURS) {
                    Ok(())
                } else {
                    Err(OrderError::DeleteWindowExpired {
                        age_hours: age.num_hours(),
                    })
                }
            }
            other => Err(OrderError::InvalidTransition {
                operation: "delete",
                current: other,
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
