//! Product lookup cache.
//!
//! Cached entries only ever stand in for product details. Stock checks always
//! go to the catalog service.

use std::{
    collections::VecDeque,
    fmt::Debug,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use carthorse::cart::ProductUuid;
use rustc_hash::FxHashMap;
use tokio::time::Instant;
use tracing::debug;

use super::Product;

pub trait ProductCache: Debug + Send + Sync {
    fn get(&self, product: ProductUuid) -> Option<Product>;

    fn insert(&self, product: ProductUuid, details: Product);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    pub capacity: usize,
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1_024,
            ttl: Duration::from_secs(60),
        }
    }
}

/// Disables caching.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl ProductCache for NoCache {
    fn get(&self, _product: ProductUuid) -> Option<Product> {
        None
    }

    fn insert(&self, _product: ProductUuid, _details: Product) {}
}

/// Capacity and TTL bounded cache with first-in-first-out eviction.
#[derive(Debug)]
pub struct BoundedCache {
    config: CacheConfig,
    state: Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: FxHashMap<ProductUuid, (Product, Instant)>,
    order: VecDeque<ProductUuid>,
}

impl CacheState {
    fn remove(&mut self, product: ProductUuid) {
        self.entries.remove(&product);
        self.order.retain(|queued| *queued != product);
    }
}

impl BoundedCache {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProductCache for BoundedCache {
    fn get(&self, product: ProductUuid) -> Option<Product> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let (details, inserted_at) = state.entries.get(&product)?;

        if inserted_at.elapsed() < self.config.ttl {
            return Some(details.clone());
        }

        state.remove(product);

        debug!(%product, "expired cached product");

        None
    }

    fn insert(&self, product: ProductUuid, details: Product) {
        if self.config.capacity == 0 {
            return;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        state.remove(product);

        while state.entries.len() >= self.config.capacity {
            let Some(evicted) = state.order.pop_front() else {
                break;
            };

            state.entries.remove(&evicted);

            debug!(product = %evicted, "evicted cached product");
        }

        state.entries.insert(product, (details, Instant::now()));
        state.order.push_back(product);
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    fn product(name: &str) -> Product {
        Product {
            name: name.to_string(),
            price: Decimal::new(999, 2),
            sku: None,
            image_url: None,
            category: None,
            stock: 5,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let cache = BoundedCache::new(CacheConfig {
            capacity: 4,
            ttl: Duration::from_secs(60),
        });
        let id = ProductUuid::new();

        cache.insert(id, product("Lamp"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get(id).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get(id).is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn oldest_entry_is_evicted_at_capacity() {
        let cache = BoundedCache::new(CacheConfig {
            capacity: 2,
            ttl: Duration::from_secs(60),
        });
        let (a, b, c) = (ProductUuid::new(), ProductUuid::new(), ProductUuid::new());

        cache.insert(a, product("A"));
        cache.insert(b, product("B"));
        cache.insert(c, product("C"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get(a).is_none());
        assert!(cache.get(b).is_some());
        assert!(cache.get(c).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reinserting_refreshes_entry() {
        let cache = BoundedCache::new(CacheConfig {
            capacity: 2,
            ttl: Duration::from_secs(60),
        });
        let id = ProductUuid::new();

        cache.insert(id, product("Old"));
        cache.insert(id, product("New"));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(id).map(|p| p.name), Some("New".to_string()));
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let cache = BoundedCache::new(CacheConfig {
            capacity: 0,
            ttl: Duration::from_secs(60),
        });
        let id = ProductUuid::new();

        cache.insert(id, product("Lamp"));

        assert!(cache.get(id).is_none());
    }
}
