//! Order Handoff Snapshot

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{
    cart::{Cart, CartItem, CartUuid, ProductUuid, Quantity, UserUuid},
    money::CurrencyCode,
    pricing::{PricingError, totals},
};

/// Everything the order service needs to place an order for a cart.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSnapshot {
    /// Cart being converted.
    pub cart_id: CartUuid,

    /// Owning user. `None` for a guest checkout.
    pub user_id: Option<UserUuid>,

    /// One entry per cart line.
    pub items: Vec<OrderLine>,

    /// Totals as computed at handoff.
    pub totals: OrderTotals,
}

/// One priced line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderLine {
    /// Catalog product.
    pub product_id: ProductUuid,

    /// Units ordered.
    pub quantity: Quantity,

    /// Price captured when the product was added to the cart.
    pub unit_price: Decimal,

    /// Currency of `unit_price`.
    pub currency: CurrencyCode,
}

/// Order totals, frozen at handoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    /// Sum of the line totals.
    pub subtotal: Decimal,

    /// Shipping cost.
    pub shipping: Decimal,

    /// Tax amount.
    pub tax: Decimal,

    /// Discount amount.
    pub discount: Decimal,

    /// Amount due, never below zero.
    pub total: Decimal,
}

impl OrderSnapshot {
    /// Freeze a cart and its items into an order snapshot.
    ///
    /// # Errors
    ///
    /// Returns a [`PricingError`] if the cart totals overflow.
    pub fn from_cart(cart: &Cart, items: &[CartItem]) -> Result<Self, PricingError> {
        let totals = totals(cart, items)?;

        Ok(Self {
            cart_id: cart.uuid,
            user_id: cart.owner.user(),
            items: items
                .iter()
                .map(|item| OrderLine {
                    product_id: item.product_uuid,
                    quantity: item.quantity,
                    unit_price: item.snapshot.price_at_addition,
                    currency: cart.currency,
                })
                .collect(),
            totals: OrderTotals {
                subtotal: totals.subtotal,
                shipping: cart.adjustments.shipping_cost,
                tax: cart.adjustments.tax_amount,
                discount: cart.adjustments.discount_amount,
                total: totals.total,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use jiff::Timestamp;
    use testresult::TestResult;

    use crate::cart::{
        Adjustments, CartItemUuid, CartModelError, CartStatus, ItemSnapshot, Owner, SessionKey,
    };

    use super::*;

    fn line(cart: CartUuid, price: Decimal, quantity: i64) -> Result<CartItem, CartModelError> {
        Ok(CartItem {
            uuid: CartItemUuid::new(),
            cart_uuid: cart,
            product_uuid: ProductUuid::new(),
            snapshot: ItemSnapshot {
                product_name: "Lamp".to_string(),
                product_sku: Some("LAMP-1".to_string()),
                price_at_addition: price,
                image_url: None,
                product_category: Some("Lighting".to_string()),
            },
            quantity: Quantity::new(quantity)?,
            added_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        })
    }

    #[test]
    fn snapshot_carries_lines_and_totals() -> TestResult {
        let user = UserUuid::new();
        let cart = Cart {
            uuid: CartUuid::new(),
            owner: Owner::User(user),
            status: CartStatus::Active,
            adjustments: Adjustments {
                shipping_cost: Decimal::new(500, 2),
                discount_amount: Decimal::new(200, 2),
                tax_amount: Decimal::new(100, 2),
            },
            currency: CurrencyCode::parse("GBP")?,
            coupon_code: None,
            discount_notes: None,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        };
        let items = [line(cart.uuid, Decimal::new(1_000, 2), 3)?];

        let order = OrderSnapshot::from_cart(&cart, &items)?;

        assert_eq!(order.cart_id, cart.uuid);
        assert_eq!(order.user_id, Some(user));
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items.first().map(|l| l.currency.code()), Some("GBP"));
        assert_eq!(order.totals.subtotal, Decimal::new(3_000, 2));
        assert_eq!(order.totals.total, Decimal::new(3_400, 2));

        Ok(())
    }

    #[test]
    fn anonymous_cart_has_no_user() -> TestResult {
        let cart = Cart {
            uuid: CartUuid::new(),
            owner: Owner::Session(SessionKey::new("anon")?),
            status: CartStatus::Active,
            adjustments: Adjustments::default(),
            currency: CurrencyCode::default(),
            coupon_code: None,
            discount_notes: None,
            created_at: Timestamp::now(),
            updated_at: Timestamp::now(),
        };

        let order = OrderSnapshot::from_cart(&cart, &[])?;

        assert!(order.user_id.is_none());
        assert!(order.items.is_empty());

        Ok(())
    }
}
