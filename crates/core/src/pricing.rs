//! Pricing
//!
//! Pure aggregate computations over a cart and its line items. Nothing here is
//! persisted; aggregates are derived on every read.

use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::{
    cart::{Adjustments, Cart, CartItem},
    money::to_amount_scale,
};

/// Errors that can occur while computing cart aggregates.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PricingError {
    /// Decimal arithmetic overflowed.
    #[error("cart amount overflowed")]
    Overflow,
}

/// Derived cart aggregates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Totals {
    /// Sum of the line totals.
    pub subtotal: Decimal,

    /// Subtotal plus shipping and tax, less discount, never below zero.
    pub total: Decimal,

    /// Sum of the line quantities.
    pub item_count: u64,
}

/// `quantity × price_at_addition` for a single line.
///
/// # Errors
///
/// Returns [`PricingError::Overflow`] if the product does not fit a decimal.
pub fn line_total(item: &CartItem) -> Result<Decimal, PricingError> {
    item.snapshot
        .price_at_addition
        .checked_mul(Decimal::from(item.quantity.get()))
        .map(to_amount_scale)
        .ok_or(PricingError::Overflow)
}

/// Sum of all line totals before adjustments.
///
/// # Errors
///
/// Returns [`PricingError::Overflow`] on decimal overflow.
pub fn subtotal(items: &[CartItem]) -> Result<Decimal, PricingError> {
    items
        .iter()
        .try_fold(Decimal::ZERO, |acc, item| {
            acc.checked_add(line_total(item)?)
                .ok_or(PricingError::Overflow)
        })
        .map(to_amount_scale)
}

/// `max(0, subtotal + tax + shipping − discount)`.
///
/// A discount larger than the rest of the cart clamps the total to zero; totals are
/// never negative.
///
/// # Errors
///
/// Returns [`PricingError::Overflow`] on decimal overflow.
pub fn total(cart: &Cart, items: &[CartItem]) -> Result<Decimal, PricingError> {
    total_from_subtotal(subtotal(items)?, &cart.adjustments)
}

/// Total quantity across all lines, not the number of distinct lines.
pub fn item_count(items: &[CartItem]) -> u64 {
    items.iter().map(|item| u64::from(item.quantity.get())).sum()
}

/// Compute every aggregate in one pass over the items.
///
/// # Errors
///
/// Returns [`PricingError::Overflow`] on decimal overflow.
pub fn totals(cart: &Cart, items: &[CartItem]) -> Result<Totals, PricingError> {
    let subtotal = subtotal(items)?;

    Ok(Totals {
        subtotal,
        total: total_from_subtotal(subtotal, &cart.adjustments)?,
        item_count: item_count(items),
    })
}

fn total_from_subtotal(
    subtotal: Decimal,
    adjustments: &Adjustments,
) -> Result<Decimal, PricingError> {
    let total = subtotal
        .checked_add(adjustments.tax_amount)
        .and_then(|sum| sum.checked_add(adjustments.shipping_cost))
        .and_then(|sum| sum.checked_sub(adjustments.discount_amount))
        .ok_or(PricingError::Overflow)?;

    Ok(to_amount_scale(total.max(Decimal::ZERO)))
}
