//! Test Helpers

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use carthorse::{
    cart::{
        CartItem, CartItemUuid, CartModelError, CartUuid, ItemSnapshot, NewCartItem, ProductUuid,
        Quantity,
    },
    money::to_amount_scale,
};
use jiff::Timestamp;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;

use crate::lookup::{Availability, LookupError, Product, ProductService};

pub(crate) fn snapshot(name: &str, price: Decimal) -> ItemSnapshot {
    ItemSnapshot {
        product_name: name.to_string(),
        product_sku: None,
        price_at_addition: to_amount_scale(price),
        image_url: None,
        product_category: None,
    }
}

/// A new line for `product` priced at 9.99.
pub(crate) fn new_item(product: ProductUuid, quantity: i64) -> Result<NewCartItem, CartModelError> {
    Ok(NewCartItem {
        uuid: CartItemUuid::new(),
        product_uuid: product,
        quantity: Quantity::new(quantity)?,
        snapshot: snapshot("Widget", Decimal::new(999, 2)),
    })
}

pub(crate) fn cart_item(
    cart: CartUuid,
    product: ProductUuid,
    price: Decimal,
    quantity: i64,
) -> Result<CartItem, CartModelError> {
    let now = Timestamp::now();

    Ok(CartItem {
        uuid: CartItemUuid::new(),
        cart_uuid: cart,
        product_uuid: product,
        snapshot: snapshot("Widget", price),
        quantity: Quantity::new(quantity)?,
        added_at: now,
        updated_at: now,
    })
}

pub(crate) fn product(name: &str, price: Decimal, stock: u32) -> Product {
    Product {
        name: name.to_string(),
        price,
        sku: Some(format!("SKU-{}", name.to_uppercase())),
        image_url: None,
        category: None,
        stock,
    }
}

/// In-process catalog that answers lookups from a fixed product table.
#[derive(Debug, Default)]
pub(crate) struct FakeCatalog {
    products: Mutex<FxHashMap<ProductUuid, Product>>,
    lookups: AtomicUsize,
}

impl FakeCatalog {
    /// Register a product and return its id.
    pub(crate) fn stock(&self, product: Product) -> ProductUuid {
        let uuid = ProductUuid::new();

        self.products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(uuid, product);

        uuid
    }

    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn find(&self, product: ProductUuid) -> Option<Product> {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        self.products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&product)
            .cloned()
    }
}

#[async_trait]
impl ProductService for FakeCatalog {
    async fn get_product(&self, product: ProductUuid) -> Result<Option<Product>, LookupError> {
        Ok(self.find(product))
    }

    async fn check_availability(
        &self,
        product: ProductUuid,
        quantity: Quantity,
    ) -> Result<Availability, LookupError> {
        let availability = match self.find(product) {
            None => Availability::Missing,
            Some(details) if details.stock < quantity.get() => Availability::Insufficient {
                in_stock: details.stock,
            },
            Some(details) => Availability::Available(details),
        };

        Ok(availability)
    }
}
