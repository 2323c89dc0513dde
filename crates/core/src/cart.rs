//! Cart Models

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use jiff::Timestamp;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{ids::TypedUuid, money::CurrencyCode};

/// Maximum length of an anonymous session key.
pub const SESSION_KEY_MAX_LEN: usize = 40;

/// Cart UUID
pub type CartUuid = TypedUuid<Cart>;

/// Cart Item UUID
pub type CartItemUuid = TypedUuid<CartItem>;

/// Product reference in the external catalog.
#[derive(Debug)]
pub struct CatalogProduct;

/// Product UUID
pub type ProductUuid = TypedUuid<CatalogProduct>;

/// Account reference in the external identity service.
#[derive(Debug)]
pub struct Customer;

/// User UUID
pub type UserUuid = TypedUuid<Customer>;

/// Errors raised while parsing cart identity and quantity values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CartModelError {
    /// Quantity was zero or negative.
    #[error("quantity must be at least 1")]
    InvalidQuantity,

    /// Quantity does not fit the storage type.
    #[error("quantity is too large")]
    QuantityTooLarge,

    /// Session key was empty, too long or contained whitespace.
    #[error("session key must be 1-{SESSION_KEY_MAX_LEN} non-whitespace characters")]
    InvalidSessionKey,

    /// Unrecognised cart status.
    #[error("unknown cart status {0:?}")]
    UnknownStatus(String),
}

/// Anonymous session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(String);

impl SessionKey {
    /// Validate and wrap a session key.
    ///
    /// # Errors
    ///
    /// Returns [`CartModelError::InvalidSessionKey`] for empty, oversized or
    /// whitespace-containing keys.
    pub fn new(key: impl Into<String>) -> Result<Self, CartModelError> {
        let key = key.into();

        if key.is_empty()
            || key.len() > SESSION_KEY_MAX_LEN
            || key.chars().any(char::is_whitespace)
        {
            return Err(CartModelError::InvalidSessionKey);
        }

        Ok(Self(key))
    }

    /// Borrow the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionKey {
    type Error = CartModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SessionKey> for String {
    fn from(value: SessionKey) -> Self {
        value.0
    }
}

impl Display for SessionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

/// Who a cart belongs to: an authenticated user or an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    /// Authenticated user.
    User(UserUuid),

    /// Anonymous browser session.
    Session(SessionKey),
}

impl Owner {
    /// The owning user, if any.
    pub fn user(&self) -> Option<UserUuid> {
        match self {
            Self::User(user) => Some(*user),
            Self::Session(_) => None,
        }
    }

    /// The owning session, if any.
    pub fn session(&self) -> Option<&SessionKey> {
        match self {
            Self::User(_) => None,
            Self::Session(session) => Some(session),
        }
    }

    /// Whether the cart belongs to an anonymous session.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

impl Display for Owner {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::User(user) => write!(f, "User:{user}"),
            Self::Session(session) => write!(f, "Session:{session}"),
        }
    }
}

/// Cart lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    /// Accepting item changes. At most one per owner.
    #[default]
    Active,

    /// Closed by its owner, retained for audit.
    Abandoned,

    /// Handed off to the order service.
    Converted,

    /// Absorbed into another cart.
    Merged,
}

impl CartStatus {
    /// Storage representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Abandoned => "abandoned",
            Self::Converted => "converted",
            Self::Merged => "merged",
        }
    }

    /// Only active carts accept mutations.
    pub const fn is_mutable(self) -> bool {
        matches!(self, Self::Active)
    }
}

impl Display for CartStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for CartStatus {
    type Err = CartModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "abandoned" => Ok(Self::Abandoned),
            "converted" => Ok(Self::Converted),
            "merged" => Ok(Self::Merged),
            other => Err(CartModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// Line item quantity, always at least one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct Quantity(u32);

impl Quantity {
    /// A single unit.
    pub const ONE: Self = Self(1);

    /// Validate a caller supplied quantity.
    ///
    /// # Errors
    ///
    /// - [`CartModelError::InvalidQuantity`]: the value is below one.
    /// - [`CartModelError::QuantityTooLarge`]: the value does not fit in storage.
    pub fn new(value: i64) -> Result<Self, CartModelError> {
        if value < 1 {
            return Err(CartModelError::InvalidQuantity);
        }

        i32::try_from(value)
            .ok()
            .and_then(|value| u32::try_from(value).ok())
            .map(Self)
            .ok_or(CartModelError::QuantityTooLarge)
    }

    /// The raw count.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// The count as the signed integer it is stored as.
    pub fn as_i32(self) -> i32 {
        i32::try_from(self.0).unwrap_or(i32::MAX)
    }

    /// Add two quantities, failing rather than wrapping past the storage limit.
    ///
    /// # Errors
    ///
    /// Returns [`CartModelError::QuantityTooLarge`] on overflow.
    pub fn checked_add(self, other: Self) -> Result<Self, CartModelError> {
        Self::new(i64::from(self.0) + i64::from(other.0))
    }
}

impl TryFrom<i64> for Quantity {
    type Error = CartModelError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Quantity> for u32 {
    fn from(value: Quantity) -> Self {
        value.0
    }
}

impl Display for Quantity {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        Display::fmt(&self.0, f)
    }
}

/// Cart-level monetary adjustments, independent of the line items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustments {
    /// Added to the subtotal.
    pub shipping_cost: Decimal,

    /// Subtracted from the subtotal. May exceed it; the total clamps at zero.
    pub discount_amount: Decimal,

    /// Added to the subtotal.
    pub tax_amount: Decimal,
}

/// Product data copied into a line item when it is added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSnapshot {
    /// Display name at the time of addition.
    pub product_name: String,

    /// Stock keeping unit, when the catalog has one.
    pub product_sku: Option<String>,

    /// Unit price at [`AMOUNT_SCALE`](crate::money::AMOUNT_SCALE), frozen for the life of the line.
    pub price_at_addition: Decimal,

    /// Product image.
    pub image_url: Option<String>,

    /// Catalog category.
    pub product_category: Option<String>,
}

/// Cart Model
#[derive(Debug, Clone, PartialEq)]
pub struct Cart {
    /// Cart identifier.
    pub uuid: CartUuid,

    /// User or session the cart belongs to.
    pub owner: Owner,

    /// Lifecycle state.
    pub status: CartStatus,

    /// Shipping, discount and tax.
    pub adjustments: Adjustments,

    /// Currency every line is priced in.
    pub currency: CurrencyCode,

    /// Applied coupon, at most 20 characters.
    pub coupon_code: Option<String>,

    /// Free-text explanation of the discount.
    pub discount_notes: Option<String>,

    /// When the cart was created.
    pub created_at: Timestamp,

    /// When the cart or any of its lines last changed.
    pub updated_at: Timestamp,
}

/// Cart Item Model
#[derive(Debug, Clone, PartialEq)]
pub struct CartItem {
    /// Line identifier.
    pub uuid: CartItemUuid,

    /// Cart the line belongs to.
    pub cart_uuid: CartUuid,

    /// Catalog product. Unique within a cart.
    pub product_uuid: ProductUuid,

    /// Product details captured when the line was added.
    pub snapshot: ItemSnapshot,

    /// Units of the product.
    pub quantity: Quantity,

    /// When the line was first added.
    pub added_at: Timestamp,

    /// When the quantity or snapshot last changed.
    pub updated_at: Timestamp,
}

/// New Cart Item Model
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    /// Identifier used if the line is created rather than incremented.
    pub uuid: CartItemUuid,

    /// Catalog product.
    pub product_uuid: ProductUuid,

    /// Units to add.
    pub quantity: Quantity,

    /// Fresh product details from the catalog.
    pub snapshot: ItemSnapshot,
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn quantity_rejects_zero_and_negative() {
        assert_eq!(Quantity::new(0), Err(CartModelError::InvalidQuantity));
        assert_eq!(Quantity::new(-3), Err(CartModelError::InvalidQuantity));
    }

    #[test]
    fn quantity_rejects_values_past_storage_limit() {
        assert_eq!(
            Quantity::new(i64::from(i32::MAX) + 1),
            Err(CartModelError::QuantityTooLarge)
        );
    }

    #[test]
    fn quantity_checked_add_sums() -> TestResult {
        let sum = Quantity::new(2)?.checked_add(Quantity::new(3)?)?;

        assert_eq!(sum.get(), 5);

        Ok(())
    }

    #[test]
    fn session_key_validation() {
        assert!(SessionKey::new("abc123").is_ok());
        assert_eq!(SessionKey::new(""), Err(CartModelError::InvalidSessionKey));
        assert_eq!(
            SessionKey::new("has space"),
            Err(CartModelError::InvalidSessionKey)
        );
        assert_eq!(
            SessionKey::new("x".repeat(SESSION_KEY_MAX_LEN + 1)),
            Err(CartModelError::InvalidSessionKey)
        );
    }

    #[test]
    fn status_round_trips_through_storage_form() -> TestResult {
        for status in [
            CartStatus::Active,
            CartStatus::Abandoned,
            CartStatus::Converted,
            CartStatus::Merged,
        ] {
            assert_eq!(status.as_str().parse::<CartStatus>()?, status);
        }

        assert!("pending".parse::<CartStatus>().is_err());

        Ok(())
    }

    #[test]
    fn only_active_carts_are_mutable() {
        assert!(CartStatus::Active.is_mutable());
        assert!(!CartStatus::Abandoned.is_mutable());
        assert!(!CartStatus::Converted.is_mutable());
        assert!(!CartStatus::Merged.is_mutable());
    }

    #[test]
    fn owner_accessors() -> TestResult {
        let user = UserUuid::new();
        let session = SessionKey::new("sess")?;

        assert_eq!(Owner::User(user).user(), Some(user));
        assert!(Owner::User(user).session().is_none());
        assert!(Owner::Session(session.clone()).is_anonymous());
        assert_eq!(Owner::Session(session.clone()).session(), Some(&session));

        Ok(())
    }
}
