//! Carts service errors.

use carthorse::{cart::CartStatus, pricing::PricingError};
use thiserror::Error;

use crate::{domain::carts::store::CartStoreError, lookup::LookupError, orders::HandoffError};

#[derive(Debug, Error)]
pub enum CartsServiceError {
    /// Rejected before anything was written.
    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    /// The cart does not exist or belongs to someone else.
    #[error("cart not found")]
    NotFound,

    #[error("{service} service unavailable")]
    UpstreamUnavailable {
        service: &'static str,

        #[source]
        error: LookupError,
    },

    #[error("product not found")]
    ProductNotFound,

    #[error("product does not have enough stock")]
    ProductUnavailable { available: Option<u32> },

    #[error("cart is {status} and cannot be modified")]
    CartNotMutable { status: CartStatus },

    #[error("storage error")]
    Store(#[source] CartStoreError),

    #[error("pricing error")]
    Pricing(#[from] PricingError),

    #[error("order handoff failed")]
    Handoff(#[from] HandoffError),
}

impl CartsServiceError {
    pub(crate) fn invalid(field: &'static str, reason: impl ToString) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.to_string(),
        }
    }
}

impl From<CartStoreError> for CartsServiceError {
    fn from(error: CartStoreError) -> Self {
        match error {
            CartStoreError::NotFound | CartStoreError::ItemNotFound => Self::NotFound,
            CartStoreError::NotMutable(status) => Self::CartNotMutable { status },
            CartStoreError::QuantityOverflow => Self::invalid("quantity", "quantity is too large"),
            CartStoreError::ValueOutOfRange => Self::invalid("amount", "amount is too large"),
            CartStoreError::CurrencyMismatch { .. } | CartStoreError::CurrencyLocked => {
                Self::invalid("currency_code", &error)
            }
            CartStoreError::Conflict
            | CartStoreError::InvalidData
            | CartStoreError::Sql(_) => Self::Store(error),
        }
    }
}

impl From<LookupError> for CartsServiceError {
    fn from(error: LookupError) -> Self {
        Self::UpstreamUnavailable {
            service: error.service(),
            error,
        }
    }
}
