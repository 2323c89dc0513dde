//! Cart Store Data

use carthorse::{
    cart::{CartItem, CartUuid, ItemSnapshot, ProductUuid, Quantity},
    money::CurrencyCode,
};
use rust_decimal::Decimal;

/// Desired state of one line in a whole-cart replacement.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemSpec {
    pub product_uuid: ProductUuid,
    pub quantity: Quantity,

    /// Used only when the product is not already in the cart.
    pub snapshot: ItemSnapshot,
}

/// Partial update of cart-level fields. `None` leaves a field untouched; the
/// nested options on coupon and notes allow clearing them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CartChanges {
    pub shipping_cost: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub currency: Option<CurrencyCode>,
    pub coupon_code: Option<Option<String>>,
    pub discount_notes: Option<Option<String>>,
}

/// Result of an upsert: the stored line and whether it was newly created.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertedItem {
    pub item: CartItem,
    pub created: bool,
}

/// Which snapshot survives when both carts in a merge hold the same product.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MergePricePolicy {
    /// Keep the target (user) cart's existing price and product details.
    #[default]
    KeepTarget,

    /// Keep the snapshot of whichever line was updated most recently.
    KeepNewest,
}

impl MergePricePolicy {
    pub(crate) fn keep_newest(self) -> bool {
        matches!(self, Self::KeepNewest)
    }
}

/// What a merge did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    pub target: CartUuid,
    pub source: CartUuid,

    /// Lines relinked from source to target unchanged.
    pub moved: u64,

    /// Lines folded into an existing target line for the same product.
    pub combined: u64,
}
