//! Application configuration
//!
//! Settings are read from CLI flags with environment fallbacks and turned into
//! explicit policy objects before anything is constructed from them.

use clap::Args;

pub mod carts;
pub mod db;
pub mod logging;
pub mod lookup;

pub use carts::{CartsConfig, MergePolicyArg};
pub use db::DatabaseConfig;
pub use logging::{LogFormat, LoggingConfig};
pub use lookup::{LookupConfig, OrdersConfig};

/// Everything needed to build an [`AppContext`](crate::context::AppContext).
#[derive(Debug, Clone, Args)]
pub struct AppConfig {
    #[command(flatten)]
    pub database: DatabaseConfig,

    #[command(flatten)]
    pub lookup: LookupConfig,

    #[command(flatten)]
    pub orders: OrdersConfig,

    #[command(flatten)]
    pub carts: CartsConfig,
}
