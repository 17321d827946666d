// SPDX-License-Identifier: BUSL-1.1
//! Minor-unit money and line items.
//!
//! Amounts are integer minor units (cents) — never floats. An order's or
//! purchase's `total_amount` is always derived from its line items via
//! [`total_amount`]; callers never set it directly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::validation::FieldViolation;

/// A currency amount in minor units.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Construct from minor units (e.g. cents).
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// The raw minor-unit value.
    pub const fn minor(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition; `None` on overflow.
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// Checked multiplication by a quantity; `None` on overflow.
    pub fn checked_mul(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line of an order or purchase: a product, a positive quantity, and
/// the unit price captured at transaction time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub product_id: Uuid,
    pub quantity: u32,
    /// Unit price at the time the document was created. Deliberately a copy,
    /// not a reference to the product's current price.
    pub unit_price: Money,
}

impl LineItem {
    /// `quantity × unit_price`, checked.
    pub fn amount(&self) -> Option<Money> {
        self.unit_price.checked_mul(self.quantity)
    }

    /// Validate this line item as the `index`-th element of a document.
    pub fn validate(&self, index: usize) -> Result<(), FieldViolation> {
        if self.quantity == 0 {
            return Err(FieldViolation::new(
                format!("line_items[{index}].quantity"),
                self.quantity,
                "quantity must be greater than zero",
            ));
        }
        if self.unit_price.is_negative() {
            return Err(FieldViolation::new(
                format!("line_items[{index}].unit_price"),
                self.unit_price,
                "unit price must not be negative",
            ));
        }
        Ok(())
    }
}

/// Validate all line items and derive the document total.
///
/// An empty item list is rejected — an order with nothing on it is not a
/// meaningful document.
pub fn total_amount(items: &[LineItem]) -> Result<Money, FieldViolation> {
    if items.is_empty() {
        return Err(FieldViolation::new(
            "line_items",
            "[]",
            "at least one line item is required",
        ));
    }

    let mut total = Money::ZERO;
    for (index, item) in items.iter().enumerate() {
        item.validate(index)?;
        let amount = item.amount().ok_or_else(|| {
            FieldViolation::new(
                format!("line_items[{index}]"),
                format!("{} x {}", item.quantity, item.unit_price),
                "line amount overflows",
            )
        })?;
        total = total.checked_add(amount).ok_or_else(|| {
            FieldViolation::new("line_items", items.len(), "total amount overflows")
        })?;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(quantity: u32, unit_price: i64) -> LineItem {
        LineItem {
            product_id: Uuid::new_v4(),
            quantity,
            unit_price: Money::from_minor(unit_price),
        }
    }

    #[test]
    fn total_is_sum_of_quantity_times_price() {
        let items = vec![item(2, 1500), item(3, 200)];
        assert_eq!(total_amount(&items).unwrap(), Money::from_minor(3600));
    }

    #[test]
    fn zero_quantity_rejected_with_index() {
        let items = vec![item(1, 100), item(0, 100)];
        let err = total_amount(&items).unwrap_err();
        assert_eq!(err.field, "line_items[1].quantity");
    }

    #[test]
    fn negative_unit_price_rejected() {
        let err = total_amount(&[item(1, -5)]).unwrap_err();
        assert_eq!(err.field, "line_items[0].unit_price");
    }

    #[test]
    fn empty_items_rejected() {
        let err = total_amount(&[]).unwrap_err();
        assert_eq!(err.field, "line_items");
    }

    #[test]
    fn overflow_is_an_error_not_a_panic() {
        let items = vec![item(u32::MAX, i64::MAX / 2)];
        assert!(total_amount(&items).is_err());
    }

    #[test]
    fn money_serializes_transparently() {
        let json = serde_json::to_value(Money::from_minor(1250)).unwrap();
        assert_eq!(json, serde_json::json!(1250));
    }
}
