//! Cart Views
//!
//! Serialisable read models. Aggregates are derived here on every read and are
//! never stored.

use carthorse::{
    cart::{Cart, CartItem, CartItemUuid, CartStatus, CartUuid, ProductUuid, SessionKey, UserUuid},
    money::CurrencyCode,
    pricing::{PricingError, line_total, totals},
};
use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::Serialize;

/// Detail returned when a login merge finds no session cart.
pub const NO_SESSION_CART: &str = "no session cart to merge";

/// Full cart with its items, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartView {
    pub id: CartUuid,
    pub user_id: Option<UserUuid>,
    pub session_key: Option<SessionKey>,
    pub status: CartStatus,
    pub items: Vec<CartItemView>,
    pub subtotal: Decimal,
    pub total: Decimal,
    pub item_count: u64,
    pub shipping_cost: Decimal,
    pub discount_amount: Decimal,
    pub tax_amount: Decimal,
    pub currency_code: CurrencyCode,
    pub coupon_code: Option<String>,
    pub discount_notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartItemView {
    pub id: CartItemUuid,
    pub product_id: ProductUuid,
    pub product_name: String,
    pub product_sku: Option<String>,
    pub price_at_addition: Decimal,
    pub image_url: Option<String>,
    pub product_category: Option<String>,
    pub quantity: u32,
    pub total_price: Decimal,
    pub added_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Cart list entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CartSummary {
    pub id: CartUuid,
    pub user_id: Option<UserUuid>,
    pub session_key: Option<SessionKey>,
    pub status: CartStatus,
    pub subtotal: Decimal,
    pub item_count: u64,
    pub currency_code: CurrencyCode,
    pub updated_at: Timestamp,
}

/// Result of merging a session cart at login.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeView {
    Merged { cart: CartView },
    NothingToMerge { detail: &'static str, cart: CartView },
}

impl MergeView {
    pub fn cart(&self) -> &CartView {
        match self {
            Self::Merged { cart } | Self::NothingToMerge { cart, .. } => cart,
        }
    }
}

impl CartView {
    /// # Errors
    ///
    /// Returns [`PricingError::Overflow`] if an aggregate overflows.
    pub fn build(cart: Cart, items: &[CartItem]) -> Result<Self, PricingError> {
        let totals = totals(&cart, items)?;

        let items = items
            .iter()
            .map(|item| {
                Ok(CartItemView {
                    id: item.uuid,
                    product_id: item.product_uuid,
                    product_name: item.snapshot.product_name.clone(),
                    product_sku: item.snapshot.product_sku.clone(),
                    price_at_addition: item.snapshot.price_at_addition,
                    image_url: item.snapshot.image_url.clone(),
                    product_category: item.snapshot.product_category.clone(),
                    quantity: item.quantity.get(),
                    total_price: line_total(item)?,
                    added_at: item.added_at,
                    updated_at: item.updated_at,
                })
            })
            .collect::<Result<_, PricingError>>()?;

        Ok(Self {
            id: cart.uuid,
            user_id: cart.owner.user(),
            session_key: cart.owner.session().cloned(),
            status: cart.status,
            items,
            subtotal: totals.subtotal,
            total: totals.total,
            item_count: totals.item_count,
            shipping_cost: cart.adjustments.shipping_cost,
            discount_amount: cart.adjustments.discount_amount,
            tax_amount: cart.adjustments.tax_amount,
            currency_code: cart.currency,
            coupon_code: cart.coupon_code,
            discount_notes: cart.discount_notes,
            created_at: cart.created_at,
            updated_at: cart.updated_at,
        })
    }
}

impl CartSummary {
    /// # Errors
    ///
    /// Returns [`PricingError::Overflow`] if an aggregate overflows.
    pub fn build(cart: &Cart, items: &[CartItem]) -> Result<Self, PricingError> {
        let totals = totals(cart, items)?;

        Ok(Self {
            id: cart.uuid,
            user_id: cart.owner.user(),
            session_key: cart.owner.session().cloned(),
            status: cart.status,
            subtotal: totals.subtotal,
            item_count: totals.item_count,
            currency_code: cart.currency,
            updated_at: cart.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use carthorse::cart::{Adjustments, Owner, ProductUuid};
    use serde_json::json;
    use testresult::TestResult;

    use crate::test::helpers::cart_item;

    use super::*;

    fn session_cart() -> Result<Cart, carthorse::cart::CartModelError> {
        Ok(Cart {
            uuid: CartUuid::new(),
            owner: Owner::Session(SessionKey::new("view")?),
            status: CartStatus::Active,
            adjustments: Adjustments {
                shipping_cost: Decimal::new(500, 2),
                discount_amount: Decimal::new(10_000, 2),
                tax_amount: Decimal::ZERO,
            },
            currency: CurrencyCode::default(),
            coupon_code: Some("SPRING".to_string()),
            discount_notes: None,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        })
    }

    #[test]
    fn view_derives_aggregates_and_clamps_total() -> TestResult {
        let cart = session_cart()?;
        let items = [
            cart_item(cart.uuid, ProductUuid::new(), Decimal::new(1_000, 2), 2)?,
            cart_item(cart.uuid, ProductUuid::new(), Decimal::new(250, 2), 3)?,
        ];

        let view = CartView::build(cart, &items)?;

        assert_eq!(view.subtotal, Decimal::new(2_750, 2));
        assert_eq!(view.total, Decimal::ZERO);
        assert_eq!(view.item_count, 5);
        assert_eq!(
            view.items.first().map(|item| item.total_price),
            Some(Decimal::new(2_000, 2))
        );
        assert!(view.user_id.is_none());

        Ok(())
    }

    #[test]
    fn summary_counts_units() -> TestResult {
        let cart = session_cart()?;
        let items = [cart_item(cart.uuid, ProductUuid::new(), Decimal::ONE, 4)?];

        let summary = CartSummary::build(&cart, &items)?;

        assert_eq!(summary.item_count, 4);
        assert_eq!(summary.subtotal, Decimal::new(400, 2));

        Ok(())
    }

    #[test]
    fn nothing_to_merge_serialises_with_detail() -> TestResult {
        let cart = CartView::build(session_cart()?, &[])?;
        let value = serde_json::to_value(MergeView::NothingToMerge {
            detail: NO_SESSION_CART,
            cart,
        })?;

        assert_eq!(value.get("outcome"), Some(&json!("nothing_to_merge")));
        assert_eq!(value.get("detail"), Some(&json!(NO_SESSION_CART)));
        assert_eq!(
            value.pointer("/cart/currency_code"),
            Some(&json!("USD"))
        );

        Ok(())
    }
}
