//! Product catalog client.

use std::sync::Arc;

use async_trait::async_trait;
use carthorse::{
    cart::{ItemSnapshot, ProductUuid, Quantity},
    money::to_amount_scale,
};
use mockall::automock;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::debug;

use super::{LookupError, ProductCache, RemoteLookup};

/// Canonical product details as served by the catalog.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Product {
    pub name: String,
    pub price: Decimal,

    #[serde(default)]
    pub sku: Option<String>,

    #[serde(default)]
    pub image_url: Option<String>,

    #[serde(default)]
    pub category: Option<String>,

    #[serde(default)]
    pub stock: u32,
}

impl Product {
    /// The fields copied into a cart line, with the price rounded to currency scale.
    pub fn snapshot(&self) -> ItemSnapshot {
        ItemSnapshot {
            product_name: self.name.clone(),
            product_sku: self.sku.clone(),
            price_at_addition: to_amount_scale(self.price),
            image_url: self.image_url.clone(),
            product_category: self.category.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Availability {
    Available(Product),
    Insufficient { in_stock: u32 },
    Missing,
}

#[automock]
#[async_trait]
pub trait ProductService: Send + Sync {
    /// Product details, possibly served from cache.
    async fn get_product(&self, product: ProductUuid) -> Result<Option<Product>, LookupError>;

    /// Fresh stock check for `quantity` units. Never answered from cache.
    async fn check_availability(
        &self,
        product: ProductUuid,
        quantity: Quantity,
    ) -> Result<Availability, LookupError>;
}

#[derive(Debug, Clone)]
pub struct RemoteProductService {
    lookup: RemoteLookup,
    cache: Arc<dyn ProductCache>,
}

impl RemoteProductService {
    pub fn new(lookup: RemoteLookup, cache: Arc<dyn ProductCache>) -> Self {
        Self { lookup, cache }
    }

    async fn fetch(&self, product: ProductUuid) -> Result<Option<Product>, LookupError> {
        let Some(body) = self.lookup.get(&format!("api/products/{product}")).await? else {
            return Ok(None);
        };

        let details: Product =
            serde_json::from_str(&body).map_err(|error| LookupError::InvalidResponse {
                service: self.lookup.service(),
                error,
            })?;

        self.cache.insert(product, details.clone());

        Ok(Some(details))
    }
}

#[async_trait]
impl ProductService for RemoteProductService {
    async fn get_product(&self, product: ProductUuid) -> Result<Option<Product>, LookupError> {
        if let Some(details) = self.cache.get(product) {
            debug!(%product, "product cache hit");

            return Ok(Some(details));
        }

        self.fetch(product).await
    }

    async fn check_availability(
        &self,
        product: ProductUuid,
        quantity: Quantity,
    ) -> Result<Availability, LookupError> {
        let availability = match self.fetch(product).await? {
            None => Availability::Missing,
            Some(details) if details.stock >= quantity.get() => Availability::Available(details),
            Some(details) => Availability::Insufficient {
                in_stock: details.stock,
            },
        };

        Ok(availability)
    }
}
