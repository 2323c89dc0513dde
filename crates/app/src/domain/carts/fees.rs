//! Fee schedules compute shipping and tax for a cart.

use std::fmt::Debug;

use carthorse::cart::{Cart, CartItem};
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fees {
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
}

pub trait FeeSchedule: Debug + Send + Sync {
    fn fees(&self, cart: &Cart, items: &[CartItem]) -> Fees;
}

/// Shipping and tax are both zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFees;

impl FeeSchedule for NoFees {
    fn fees(&self, _cart: &Cart, _items: &[CartItem]) -> Fees {
        Fees::default()
    }
}
