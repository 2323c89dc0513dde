//! Carts
//!
//! Cart lifecycle, item mutation and login merges on top of a [`CartStore`].

pub mod errors;
pub mod fees;
pub mod merge;
pub mod service;
pub mod store;
pub mod views;

pub use errors::CartsServiceError;
pub use fees::{FeeSchedule, Fees, NoFees};
pub use merge::{MergeCoordinator, MergeOutcome};
pub use service::*;
pub use store::{CartStore, CartStoreError, MemoryCartStore, MergePricePolicy, PgCartStore};
pub use views::{CartItemView, CartSummary, CartView, MergeView};
