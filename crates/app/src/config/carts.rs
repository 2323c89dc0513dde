//! Cart Config

use carthorse::money::{CurrencyCode, MoneyError};
use clap::Args;

use crate::domain::carts::store::MergePricePolicy;

/// Which snapshot survives a merge collision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum MergePolicyArg {
    /// The user's cart keeps its existing line details.
    #[default]
    KeepTarget,

    /// The most recently updated line's details win.
    KeepNewest,
}

impl From<MergePolicyArg> for MergePricePolicy {
    fn from(arg: MergePolicyArg) -> Self {
        match arg {
            MergePolicyArg::KeepTarget => Self::KeepTarget,
            MergePolicyArg::KeepNewest => Self::KeepNewest,
        }
    }
}

/// Cart behaviour settings.
#[derive(Debug, Clone, Args)]
pub struct CartsConfig {
    /// ISO 4217 currency for newly created carts
    #[arg(long, env = "DEFAULT_CURRENCY", default_value = "USD")]
    pub default_currency: String,

    /// Snapshot kept when a merge finds the same product in both carts
    #[arg(long, env = "MERGE_PRICE_POLICY", value_enum, default_value_t = MergePolicyArg::KeepTarget)]
    pub merge_price_policy: MergePolicyArg,
}

impl CartsConfig {
    /// # Errors
    ///
    /// Returns an error if the configured currency is not a known ISO 4217 code.
    pub fn default_currency(&self) -> Result<CurrencyCode, MoneyError> {
        CurrencyCode::parse(&self.default_currency)
    }
}
