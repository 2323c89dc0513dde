//! Money

use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use rust_decimal::{Decimal, RoundingStrategy};
use rusty_money::iso::{self, Currency};
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};
use thiserror::Error;

/// Number of fractional digits every stored amount is kept at.
pub const AMOUNT_SCALE: u32 = 2;

/// Errors raised while validating amounts and currencies.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount must not be negative")]
    Negative,

    /// The amount carries more fractional digits than the stored scale.
    #[error("amount must have at most {AMOUNT_SCALE} decimal places")]
    TooPrecise,

    /// The currency code is not a known ISO 4217 alpha code.
    #[error("unknown currency code {0:?}")]
    UnknownCurrency(String),
}

/// ISO 4217 currency a cart is priced in.
#[derive(Clone, Copy)]
pub struct CurrencyCode(&'static Currency);

impl CurrencyCode {
    /// Look up a currency by its three letter alpha code (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::UnknownCurrency`] when the code is not recognised.
    pub fn parse(code: &str) -> Result<Self, MoneyError> {
        let code = code.trim();

        if code.len() != 3 {
            return Err(MoneyError::UnknownCurrency(code.to_string()));
        }

        iso::find(&code.to_ascii_uppercase())
            .map(Self)
            .ok_or_else(|| MoneyError::UnknownCurrency(code.to_string()))
    }

    /// The alpha code, e.g. `"USD"`.
    pub fn code(&self) -> &'static str {
        self.0.iso_alpha_code
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self(iso::USD)
    }
}

impl PartialEq for CurrencyCode {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for CurrencyCode {}

impl Debug for CurrencyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_tuple("CurrencyCode").field(&self.code()).finish()
    }
}

impl Display for CurrencyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.code())
    }
}

impl Serialize for CurrencyCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for CurrencyCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;

        Self::parse(&code).map_err(de::Error::custom)
    }
}

/// Validate a user supplied adjustment amount (shipping, discount, tax).
///
/// # Errors
///
/// - [`MoneyError::Negative`]: the amount is below zero.
/// - [`MoneyError::TooPrecise`]: the amount has more than [`AMOUNT_SCALE`] fractional digits.
pub fn validate_amount(amount: Decimal) -> Result<Decimal, MoneyError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(MoneyError::Negative);
    }

    if amount.normalize().scale() > AMOUNT_SCALE {
        return Err(MoneyError::TooPrecise);
    }

    Ok(to_amount_scale(amount))
}

/// Round an upstream price to the stored scale, half away from zero.
pub fn to_amount_scale(amount: Decimal) -> Decimal {
    let mut rounded =
        amount.round_dp_with_strategy(AMOUNT_SCALE, RoundingStrategy::MidpointAwayFromZero);

    rounded.rescale(AMOUNT_SCALE);

    rounded
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    #[test]
    fn parse_accepts_lowercase_codes() -> TestResult {
        let currency = CurrencyCode::parse("eur")?;

        assert_eq!(currency.code(), "EUR");

        Ok(())
    }

    #[test]
    fn parse_rejects_unknown_codes() {
        assert_eq!(
            CurrencyCode::parse("ZZZ"),
            Err(MoneyError::UnknownCurrency("ZZZ".to_string()))
        );
        assert!(CurrencyCode::parse("DOLLARS").is_err());
    }

    #[test]
    fn validate_amount_rejects_negative() {
        assert_eq!(validate_amount(Decimal::new(-1, 2)), Err(MoneyError::Negative));
    }

    #[test]
    fn validate_amount_rejects_sub_cent_precision() {
        assert_eq!(
            validate_amount(Decimal::new(1_005, 3)),
            Err(MoneyError::TooPrecise)
        );
    }

    #[test]
    fn validate_amount_ignores_trailing_zeros() -> TestResult {
        let amount = validate_amount(Decimal::new(1_500, 3))?;

        assert_eq!(amount, Decimal::new(150, 2));
        assert_eq!(amount.scale(), 2);

        Ok(())
    }

    #[test]
    fn to_amount_scale_rounds_half_away_from_zero() {
        assert_eq!(to_amount_scale(Decimal::new(19_995, 3)), Decimal::new(2_000, 2));
        assert_eq!(to_amount_scale(Decimal::new(5, 0)).scale(), 2);
    }
}
