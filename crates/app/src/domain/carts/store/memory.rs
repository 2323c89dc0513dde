//! In-memory cart store.
//!
//! Each cart sits behind its own mutex so operations on different carts never
//! wait on each other. The owner index is only held long enough to resolve a
//! cart handle. Lock order is always index, then cart(s) in uuid order.

use std::{
    cmp::Reverse,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use carthorse::{
    cart::{
        Adjustments, Cart, CartItem, CartItemUuid, CartStatus, CartUuid, NewCartItem, Owner,
        ProductUuid, Quantity,
    },
    money::CurrencyCode,
};
use jiff::Timestamp;
use rustc_hash::FxHashMap;
use tracing::debug;

use super::{
    CartChanges, CartStore, CartStoreError, ItemSpec, MergePricePolicy, MergeReport, UpsertedItem,
};

type CartHandle = Arc<Mutex<CartEntry>>;

#[derive(Debug, Default)]
pub struct MemoryCartStore {
    index: Mutex<OwnerIndex>,
}

#[derive(Debug, Default)]
struct OwnerIndex {
    carts: FxHashMap<CartUuid, CartHandle>,

    /// Candidate active cart per owner. Stale when the cart has since left the
    /// active state; readers re-check the status under the cart lock.
    active: FxHashMap<Owner, CartUuid>,

    owned: FxHashMap<Owner, Vec<CartUuid>>,
}

#[derive(Debug)]
struct CartEntry {
    cart: Cart,
    items: Vec<CartItem>,
    deleted: bool,
}

impl CartEntry {
    fn is_active(&self) -> bool {
        !self.deleted && self.cart.status == CartStatus::Active
    }

    fn ensure_mutable(&self) -> Result<(), CartStoreError> {
        if self.deleted {
            return Err(CartStoreError::NotFound);
        }

        if !self.cart.status.is_mutable() {
            return Err(CartStoreError::NotMutable(self.cart.status));
        }

        Ok(())
    }

    fn item_mut(&mut self, product: ProductUuid) -> Option<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|item| item.product_uuid == product)
    }

    fn sorted_items(&self) -> Vec<CartItem> {
        let mut items = self.items.clone();

        items.sort_by_key(|item| Reverse((item.added_at, item.uuid)));

        items
    }

    fn touch(&mut self, now: Timestamp) {
        self.cart.updated_at = now;
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Lines for a whole-cart replacement. Lines already present keep their
/// identity and snapshot and take the listed quantity.
fn reconcile(
    cart: CartUuid,
    current: &[CartItem],
    specs: Vec<ItemSpec>,
    now: Timestamp,
) -> Vec<CartItem> {
    specs
        .into_iter()
        .map(|spec| {
            match current
                .iter()
                .find(|item| item.product_uuid == spec.product_uuid)
            {
                Some(existing) => CartItem {
                    quantity: spec.quantity,
                    updated_at: now,
                    ..existing.clone()
                },
                None => CartItem {
                    uuid: CartItemUuid::new(),
                    cart_uuid: cart,
                    product_uuid: spec.product_uuid,
                    snapshot: spec.snapshot,
                    quantity: spec.quantity,
                    added_at: now,
                    updated_at: now,
                },
            }
        })
        .collect()
}

impl MemoryCartStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, cart: CartUuid) -> Option<CartHandle> {
        lock(&self.index).carts.get(&cart).cloned()
    }

    fn read<R>(&self, cart: CartUuid, f: impl FnOnce(&CartEntry) -> R) -> Result<R, CartStoreError> {
        let handle = self.handle(cart).ok_or(CartStoreError::NotFound)?;
        let entry = lock(&handle);

        if entry.deleted {
            return Err(CartStoreError::NotFound);
        }

        Ok(f(&entry))
    }

    fn mutate<R>(
        &self,
        cart: CartUuid,
        f: impl FnOnce(&mut CartEntry, Timestamp) -> Result<R, CartStoreError>,
    ) -> Result<R, CartStoreError> {
        let handle = self.handle(cart).ok_or(CartStoreError::NotFound)?;
        let mut entry = lock(&handle);

        entry.ensure_mutable()?;

        let now = Timestamp::now();
        let result = f(&mut entry, now)?;

        entry.touch(now);

        Ok(result)
    }

    fn forget(&self, cart: &Cart) {
        let mut index = lock(&self.index);

        index.carts.remove(&cart.uuid);

        if index.active.get(&cart.owner) == Some(&cart.uuid) {
            index.active.remove(&cart.owner);
        }

        if let Some(owned) = index.owned.get_mut(&cart.owner) {
            owned.retain(|uuid| *uuid != cart.uuid);
        }
    }
}

#[async_trait]
impl CartStore for MemoryCartStore {
    async fn get_or_create_active_cart(
        &self,
        owner: &Owner,
        currency: CurrencyCode,
    ) -> Result<Cart, CartStoreError> {
        let mut index = lock(&self.index);

        if let Some(uuid) = index.active.get(owner)
            && let Some(handle) = index.carts.get(uuid)
        {
            let entry = lock(handle);

            if entry.is_active() {
                return Ok(entry.cart.clone());
            }
        }

        let now = Timestamp::now();
        let cart = Cart {
            uuid: CartUuid::new(),
            owner: owner.clone(),
            status: CartStatus::Active,
            adjustments: Adjustments::default(),
            currency,
            coupon_code: None,
            discount_notes: None,
            created_at: now,
            updated_at: now,
        };

        index.carts.insert(
            cart.uuid,
            Arc::new(Mutex::new(CartEntry {
                cart: cart.clone(),
                items: Vec::new(),
                deleted: false,
            })),
        );
        index.active.insert(owner.clone(), cart.uuid);
        index.owned.entry(owner.clone()).or_default().push(cart.uuid);

        debug!(cart = %cart.uuid, %owner, "created active cart");

        Ok(cart)
    }

    async fn find_active_cart(&self, owner: &Owner) -> Result<Option<Cart>, CartStoreError> {
        let index = lock(&self.index);

        let cart = index
            .active
            .get(owner)
            .and_then(|uuid| index.carts.get(uuid))
            .and_then(|handle| {
                let entry = lock(handle);

                entry.is_active().then(|| entry.cart.clone())
            });

        Ok(cart)
    }

    async fn get_cart(&self, cart: CartUuid) -> Result<Cart, CartStoreError> {
        self.read(cart, |entry| entry.cart.clone())
    }

    async fn list_carts(&self, owner: &Owner) -> Result<Vec<Cart>, CartStoreError> {
        let handles: Vec<CartHandle> = {
            let index = lock(&self.index);

            index
                .owned
                .get(owner)
                .into_iter()
                .flatten()
                .filter_map(|uuid| index.carts.get(uuid).cloned())
                .collect()
        };

        let mut carts: Vec<Cart> = handles
            .iter()
            .filter_map(|handle| {
                let entry = lock(handle);

                (!entry.deleted).then(|| entry.cart.clone())
            })
            .collect();

        carts.sort_by_key(|cart| Reverse((cart.created_at, cart.uuid)));

        Ok(carts)
    }

    async fn list_items(&self, cart: CartUuid) -> Result<Vec<CartItem>, CartStoreError> {
        self.read(cart, CartEntry::sorted_items)
    }

    async fn upsert_item(
        &self,
        cart: CartUuid,
        item: NewCartItem,
    ) -> Result<UpsertedItem, CartStoreError> {
        self.mutate(cart, |entry, now| {
            if let Some(existing) = entry.item_mut(item.product_uuid) {
                existing.quantity = existing.quantity.checked_add(item.quantity)?;
                existing.snapshot = item.snapshot;
                existing.updated_at = now;

                return Ok(UpsertedItem {
                    item: existing.clone(),
                    created: false,
                });
            }

            let created = CartItem {
                uuid: item.uuid,
                cart_uuid: cart,
                product_uuid: item.product_uuid,
                snapshot: item.snapshot,
                quantity: item.quantity,
                added_at: now,
                updated_at: now,
            };

            entry.items.push(created.clone());

            Ok(UpsertedItem {
                item: created,
                created: true,
            })
        })
    }

    async fn set_item_quantity(
        &self,
        cart: CartUuid,
        product: ProductUuid,
        quantity: Quantity,
    ) -> Result<CartItem, CartStoreError> {
        self.mutate(cart, |entry, now| {
            let item = entry
                .item_mut(product)
                .ok_or(CartStoreError::ItemNotFound)?;

            item.quantity = quantity;
            item.updated_at = now;

            Ok(item.clone())
        })
    }

    async fn delete_item(
        &self,
        cart: CartUuid,
        product: ProductUuid,
    ) -> Result<(), CartStoreError> {
        self.mutate(cart, |entry, _| {
            let before = entry.items.len();

            entry.items.retain(|item| item.product_uuid != product);

            if entry.items.len() == before {
                return Err(CartStoreError::ItemNotFound);
            }

            Ok(())
        })
    }

    async fn clear_items(&self, cart: CartUuid) -> Result<u64, CartStoreError> {
        self.mutate(cart, |entry, _| {
            let removed = entry.items.len() as u64;

            entry.items.clear();

            Ok(removed)
        })
    }

    async fn replace_items(
        &self,
        cart: CartUuid,
        items: Vec<ItemSpec>,
    ) -> Result<Vec<CartItem>, CartStoreError> {
        self.mutate(cart, |entry, now| {
            entry.items = reconcile(cart, &entry.items, items, now);

            Ok(entry.sorted_items())
        })
    }

    async fn update_cart(
        &self,
        cart: CartUuid,
        changes: CartChanges,
    ) -> Result<Cart, CartStoreError> {
        self.apply_update(cart, changes, None).await
    }

    async fn apply_update(
        &self,
        cart: CartUuid,
        changes: CartChanges,
        items: Option<Vec<ItemSpec>>,
    ) -> Result<Cart, CartStoreError> {
        self.mutate(cart, |entry, now| {
            // Build the new lines aside so a rejected currency change leaves
            // the entry untouched.
            let reconciled = items.map(|specs| reconcile(cart, &entry.items, specs, now));

            let has_items = reconciled
                .as_ref()
                .map_or(!entry.items.is_empty(), |items| !items.is_empty());

            if let Some(currency) = changes.currency
                && currency != entry.cart.currency
                && has_items
            {
                return Err(CartStoreError::CurrencyLocked);
            }

            if let Some(items) = reconciled {
                entry.items = items;
            }

            let cart = &mut entry.cart;

            if let Some(shipping) = changes.shipping_cost {
                cart.adjustments.shipping_cost = shipping;
            }
            if let Some(discount) = changes.discount_amount {
                cart.adjustments.discount_amount = discount;
            }
            if let Some(tax) = changes.tax_amount {
                cart.adjustments.tax_amount = tax;
            }
            if let Some(currency) = changes.currency {
                cart.currency = currency;
            }
            if let Some(coupon) = changes.coupon_code {
                cart.coupon_code = coupon;
            }
            if let Some(notes) = changes.discount_notes {
                cart.discount_notes = notes;
            }

            cart.updated_at = now;

            Ok(cart.clone())
        })
    }

    async fn mark_status(
        &self,
        cart: CartUuid,
        status: CartStatus,
    ) -> Result<Cart, CartStoreError> {
        self.mutate(cart, |entry, now| {
            entry.cart.status = status;
            entry.cart.updated_at = now;

            Ok(entry.cart.clone())
        })
    }

    async fn absorb_cart(
        &self,
        target: CartUuid,
        source: CartUuid,
        policy: MergePricePolicy,
    ) -> Result<Option<MergeReport>, CartStoreError> {
        if target == source {
            return Ok(None);
        }

        let (target_handle, source_handle) = {
            let index = lock(&self.index);

            let target_handle = index
                .carts
                .get(&target)
                .cloned()
                .ok_or(CartStoreError::NotFound)?;

            let Some(source_handle) = index.carts.get(&source).cloned() else {
                return Ok(None);
            };

            (target_handle, source_handle)
        };

        let (mut target_entry, mut source_entry) = if target < source {
            let target_entry = lock(&target_handle);
            (target_entry, lock(&source_handle))
        } else {
            let source_entry = lock(&source_handle);
            (lock(&target_handle), source_entry)
        };

        target_entry.ensure_mutable()?;

        if !source_entry.is_active() {
            return Ok(None);
        }

        if source_entry.cart.currency != target_entry.cart.currency {
            return Err(CartStoreError::CurrencyMismatch {
                target_currency: target_entry.cart.currency,
                source_currency: source_entry.cart.currency,
            });
        }

        // Validate every fold before touching either cart so an overflow
        // leaves both untouched.
        let folded: Vec<Option<Quantity>> = source_entry
            .items
            .iter()
            .map(|item| {
                target_entry
                    .items
                    .iter()
                    .find(|existing| existing.product_uuid == item.product_uuid)
                    .map(|existing| existing.quantity.checked_add(item.quantity))
                    .transpose()
            })
            .collect::<Result<_, _>>()?;

        let now = Timestamp::now();
        let mut moved = 0;
        let mut combined = 0;

        for (mut item, folded) in source_entry.items.drain(..).zip(folded) {
            if let Some(quantity) = folded
                && let Some(existing) = target_entry.item_mut(item.product_uuid)
            {
                if policy.keep_newest() && item.updated_at > existing.updated_at {
                    existing.snapshot = item.snapshot;
                }

                existing.quantity = quantity;
                existing.updated_at = now;
                combined += 1;
            } else {
                item.cart_uuid = target;
                item.updated_at = now;
                target_entry.items.push(item);
                moved += 1;
            }
        }

        target_entry.touch(now);
        source_entry.cart.status = CartStatus::Merged;
        source_entry.deleted = true;

        let retired = source_entry.cart.clone();

        drop(source_entry);
        drop(target_entry);

        self.forget(&retired);

        Ok(Some(MergeReport {
            target,
            source,
            moved,
            combined,
        }))
    }
}
