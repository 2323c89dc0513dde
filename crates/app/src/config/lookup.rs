//! Remote Service Config

use std::time::Duration;

use clap::Args;

use crate::lookup::{CacheConfig, LookupPolicy};

/// Product catalog and user identity settings.
#[derive(Debug, Clone, Args)]
pub struct LookupConfig {
    /// Base URL of the product catalog
    #[arg(long, env = "PRODUCT_SERVICE_URL")]
    pub product_service_url: String,

    /// Base URL of the user identity service
    #[arg(long, env = "USER_SERVICE_URL")]
    pub user_service_url: String,

    /// Per-attempt timeout for lookups, in milliseconds
    #[arg(long, env = "LOOKUP_TIMEOUT_MS", default_value_t = 3_000)]
    pub lookup_timeout_ms: u64,

    /// Retries after the first failed lookup attempt
    #[arg(long, env = "LOOKUP_MAX_RETRIES", default_value_t = 2)]
    pub lookup_max_retries: u32,

    /// Backoff before the first retry, in milliseconds; doubles per retry
    #[arg(long, env = "LOOKUP_BACKOFF_BASE_MS", default_value_t = 100)]
    pub lookup_backoff_base_ms: u64,

    /// Upper bound on the backoff between retries, in milliseconds
    #[arg(long, env = "LOOKUP_BACKOFF_MAX_MS", default_value_t = 2_000)]
    pub lookup_backoff_max_ms: u64,

    /// Product details kept in the cache; 0 disables caching
    #[arg(long, env = "PRODUCT_CACHE_CAPACITY", default_value_t = 1_024)]
    pub product_cache_capacity: usize,

    /// How long a cached product stays fresh, in seconds
    #[arg(long, env = "PRODUCT_CACHE_TTL_SECONDS", default_value_t = 60)]
    pub product_cache_ttl_seconds: u64,
}

impl LookupConfig {
    pub fn policy(&self) -> LookupPolicy {
        LookupPolicy {
            timeout: Duration::from_millis(self.lookup_timeout_ms),
            max_retries: self.lookup_max_retries,
            backoff_base: Duration::from_millis(self.lookup_backoff_base_ms),
            backoff_max: Duration::from_millis(self.lookup_backoff_max_ms),
        }
    }

    /// `None` when caching is disabled.
    pub fn cache(&self) -> Option<CacheConfig> {
        (self.product_cache_capacity > 0).then(|| CacheConfig {
            capacity: self.product_cache_capacity,
            ttl: Duration::from_secs(self.product_cache_ttl_seconds),
        })
    }
}

/// Order service settings.
#[derive(Debug, Clone, Args)]
pub struct OrdersConfig {
    /// Base URL of the order service
    #[arg(long, env = "ORDER_SERVICE_URL")]
    pub order_service_url: String,

    /// Timeout for submitting an order, in milliseconds
    #[arg(long, env = "ORDER_TIMEOUT_MS", default_value_t = 5_000)]
    pub order_timeout_ms: u64,
}

impl OrdersConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }
}
