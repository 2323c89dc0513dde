//! Cart store errors.

use carthorse::{
    cart::{CartModelError, CartStatus},
    money::CurrencyCode,
};
use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

/// `PostgreSQL` SQLSTATE for `numeric_value_out_of_range`.
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

#[derive(Debug, Error)]
pub enum CartStoreError {
    #[error("cart not found")]
    NotFound,

    #[error("cart item not found")]
    ItemNotFound,

    #[error("cart is {0} and cannot be modified")]
    NotMutable(CartStatus),

    #[error("concurrent write conflict")]
    Conflict,

    #[error("item quantity out of range")]
    QuantityOverflow,

    /// A value did not fit its column, such as an amount beyond `NUMERIC(12, 2)`.
    #[error("value out of range for storage")]
    ValueOutOfRange,

    #[error("cannot merge a {source_currency} cart into a {target_currency} cart")]
    CurrencyMismatch {
        target_currency: CurrencyCode,
        source_currency: CurrencyCode,
    },

    #[error("currency cannot change while the cart has items")]
    CurrencyLocked,

    #[error("invalid data")]
    InvalidData,

    #[error("storage error")]
    Sql(#[source] sqlx::Error),
}

impl From<sqlx::Error> for CartStoreError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return Self::NotFound;
        }

        if error
            .as_database_error()
            .and_then(DatabaseError::code)
            .is_some_and(|code| code == NUMERIC_VALUE_OUT_OF_RANGE)
        {
            return Self::ValueOutOfRange;
        }

        match error.as_database_error().map(DatabaseError::kind) {
            Some(ErrorKind::UniqueViolation) => Self::Conflict,
            Some(ErrorKind::ForeignKeyViolation) => Self::NotFound,
            Some(ErrorKind::CheckViolation | ErrorKind::NotNullViolation) => Self::InvalidData,
            _ => Self::Sql(error),
        }
    }
}

impl From<CartModelError> for CartStoreError {
    fn from(error: CartModelError) -> Self {
        match error {
            CartModelError::InvalidQuantity | CartModelError::QuantityTooLarge => {
                Self::QuantityOverflow
            }
            CartModelError::InvalidSessionKey | CartModelError::UnknownStatus(_) => {
                Self::InvalidData
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        borrow::Cow,
        error::Error as StdError,
        fmt::{Display, Formatter, Result as FmtResult},
    };

    use super::*;

    /// What `PostgreSQL` reports when an amount overflows its `NUMERIC` column.
    #[derive(Debug)]
    struct NumericOverflow;

    impl Display for NumericOverflow {
        fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
            f.write_str("numeric field overflow")
        }
    }

    impl StdError for NumericOverflow {}

    impl DatabaseError for NumericOverflow {
        fn message(&self) -> &str {
            "numeric field overflow"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed(NUMERIC_VALUE_OUT_OF_RANGE))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    #[test]
    fn out_of_range_values_are_not_reported_as_quantities() {
        assert!(matches!(
            CartStoreError::from(sqlx::Error::Database(Box::new(NumericOverflow))),
            CartStoreError::ValueOutOfRange
        ));
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        assert!(matches!(
            CartStoreError::from(sqlx::Error::RowNotFound),
            CartStoreError::NotFound
        ));
    }

    #[test]
    fn quantity_errors_map_to_overflow() {
        assert!(matches!(
            CartStoreError::from(CartModelError::QuantityTooLarge),
            CartStoreError::QuantityOverflow
        ));
    }

    #[test]
    fn other_sqlx_errors_are_wrapped() {
        assert!(matches!(
            CartStoreError::from(sqlx::Error::PoolTimedOut),
            CartStoreError::Sql(_)
        ));
    }
}
