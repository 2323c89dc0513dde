//! Cart Store
//!
//! Persistence for carts and their line items. Implementations must enforce
//! the two uniqueness rules themselves rather than by check-then-act in the
//! caller: one active cart per owner, and one line per product per cart.
//! Mutations on the same cart are linearizable; different carts never contend.

use async_trait::async_trait;
use carthorse::{
    cart::{Cart, CartItem, CartStatus, CartUuid, NewCartItem, Owner, ProductUuid, Quantity},
    money::CurrencyCode,
};
use mockall::automock;

mod data;
mod errors;
mod memory;
mod pg;

pub use data::{CartChanges, ItemSpec, MergePricePolicy, MergeReport, UpsertedItem};
pub use errors::CartStoreError;
pub use memory::MemoryCartStore;
pub use pg::PgCartStore;

#[automock]
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Return the owner's active cart, creating it in `currency` if there is none.
    async fn get_or_create_active_cart(
        &self,
        owner: &Owner,
        currency: CurrencyCode,
    ) -> Result<Cart, CartStoreError>;

    /// Return the owner's active cart without creating one.
    async fn find_active_cart(&self, owner: &Owner) -> Result<Option<Cart>, CartStoreError>;

    /// Retrieve a cart in any status.
    async fn get_cart(&self, cart: CartUuid) -> Result<Cart, CartStoreError>;

    /// Every cart the owner has ever had, newest first.
    async fn list_carts(&self, owner: &Owner) -> Result<Vec<Cart>, CartStoreError>;

    /// Items in a cart, most recently added first.
    async fn list_items(&self, cart: CartUuid) -> Result<Vec<CartItem>, CartStoreError>;

    /// Add `item.quantity` to the existing line for the product and refresh its
    /// snapshot, or create the line.
    async fn upsert_item(
        &self,
        cart: CartUuid,
        item: NewCartItem,
    ) -> Result<UpsertedItem, CartStoreError>;

    /// Overwrite the quantity of an existing line.
    async fn set_item_quantity(
        &self,
        cart: CartUuid,
        product: ProductUuid,
        quantity: Quantity,
    ) -> Result<CartItem, CartStoreError>;

    /// Reconcile the cart to exactly `items`: listed lines get the given
    /// quantity, unlisted lines are deleted.
    async fn replace_items(
        &self,
        cart: CartUuid,
        items: Vec<ItemSpec>,
    ) -> Result<Vec<CartItem>, CartStoreError>;

    /// Apply cart-level field changes and, when `items` is given, reconcile the
    /// cart to exactly those lines, as one atomic step. Listed lines get the
    /// given quantity, unlisted lines are deleted. A currency change is checked
    /// against the lines as they stand after reconciliation.
    async fn apply_update(
        &self,
        cart: CartUuid,
        changes: CartChanges,
        items: Option<Vec<ItemSpec>>,
    ) -> Result<Cart, CartStoreError>;

    /// Remove the line for a product.
    async fn delete_item(&self, cart: CartUuid, product: ProductUuid)
    -> Result<(), CartStoreError>;

    /// Remove every line, returning how many were removed.
    async fn clear_items(&self, cart: CartUuid) -> Result<u64, CartStoreError>;

    /// Apply cart-level field changes, leaving the lines alone.
    async fn update_cart(
        &self,
        cart: CartUuid,
        changes: CartChanges,
    ) -> Result<Cart, CartStoreError>;

    /// Move an active cart into another lifecycle state.
    async fn mark_status(&self, cart: CartUuid, status: CartStatus)
    -> Result<Cart, CartStoreError>;

    /// Atomically fold every line of `source` into `target` and delete `source`.
    ///
    /// Returns `None` when `source` no longer exists or is not active, so a
    /// repeated merge is a no-op.
    async fn absorb_cart(
        &self,
        target: CartUuid,
        source: CartUuid,
        policy: MergePricePolicy,
    ) -> Result<Option<MergeReport>, CartStoreError>;
}
