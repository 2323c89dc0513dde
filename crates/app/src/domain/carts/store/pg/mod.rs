//! `PostgreSQL` cart store.
//!
//! Every mutation runs in its own transaction and begins by taking a row lock
//! on the cart, so concurrent writers to one cart serialize on that row while
//! writers to other carts proceed independently.

use std::error::Error as StdError;

use async_trait::async_trait;
use carthorse::{
    cart::{Cart, CartItem, CartStatus, CartUuid, NewCartItem, Owner, ProductUuid, Quantity},
    money::CurrencyCode,
};
use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::database::Db;

use super::{
    CartChanges, CartStore, CartStoreError, ItemSpec, MergePricePolicy, MergeReport, UpsertedItem,
};

mod carts;
mod items;

use carts::{LockedCart, PgCartsRepository};
use items::PgCartItemsRepository;

pub(super) fn decode_error(
    column: &str,
    error: impl Into<Box<dyn StdError + Send + Sync>>,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: error.into(),
    }
}

#[derive(Debug, Clone)]
pub struct PgCartStore {
    db: Db,
    carts: PgCartsRepository,
    items: PgCartItemsRepository,
}

impl PgCartStore {
    #[must_use]
    pub fn new(db: Db) -> Self {
        Self {
            db,
            carts: PgCartsRepository,
            items: PgCartItemsRepository,
        }
    }

    async fn lock_mutable(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
    ) -> Result<LockedCart, CartStoreError> {
        self.carts
            .lock_cart(tx, cart)
            .await?
            .ok_or(CartStoreError::NotFound)?
            .ensure_mutable()
    }

    async fn reconcile_items(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cart: CartUuid,
        items: Vec<ItemSpec>,
    ) -> Result<(), CartStoreError> {
        let keep: Vec<ProductUuid> = items.iter().map(|spec| spec.product_uuid).collect();

        for spec in items {
            self.items.replace_cart_item(tx, cart, spec).await?;
        }

        self.items.prune_cart_items(tx, cart, &keep).await?;

        Ok(())
    }

    async fn try_get_or_create(
        &self,
        owner: &Owner,
        currency: CurrencyCode,
    ) -> Result<Cart, CartStoreError> {
        let mut tx = self.db.begin().await?;

        if let Some(cart) = self.carts.find_active_cart(&mut tx, owner).await? {
            tx.commit().await?;

            return Ok(cart);
        }

        if let Some(cart) = self
            .carts
            .create_active_cart(&mut tx, owner, currency)
            .await?
        {
            tx.commit().await?;

            debug!(cart = %cart.uuid, %owner, "created active cart");

            return Ok(cart);
        }

        // Another writer won the insert; its row is committed by now.
        let cart = self
            .carts
            .find_active_cart(&mut tx, owner)
            .await?
            .ok_or(CartStoreError::Conflict)?;

        tx.commit().await?;

        Ok(cart)
    }
}

#[async_trait]
impl CartStore for PgCartStore {
    async fn get_or_create_active_cart(
        &self,
        owner: &Owner,
        currency: CurrencyCode,
    ) -> Result<Cart, CartStoreError> {
        match self.try_get_or_create(owner, currency).await {
            Err(CartStoreError::Conflict) => {
                debug!(%owner, "active cart changed during creation, retrying");

                self.try_get_or_create(owner, currency).await
            }
            result => result,
        }
    }

    async fn find_active_cart(&self, owner: &Owner) -> Result<Option<Cart>, CartStoreError> {
        let mut tx = self.db.begin().await?;

        let cart = self.carts.find_active_cart(&mut tx, owner).await?;

        tx.commit().await?;

        Ok(cart)
    }

    async fn get_cart(&self, cart: CartUuid) -> Result<Cart, CartStoreError> {
        let mut tx = self.db.begin().await?;

        let cart = self.carts.get_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(cart)
    }

    async fn list_carts(&self, owner: &Owner) -> Result<Vec<Cart>, CartStoreError> {
        let mut tx = self.db.begin().await?;

        let carts = self.carts.list_carts(&mut tx, owner).await?;

        tx.commit().await?;

        Ok(carts)
    }

    async fn list_items(&self, cart: CartUuid) -> Result<Vec<CartItem>, CartStoreError> {
        let mut tx = self.db.begin().await?;

        // Distinguish an empty cart from a missing one.
        self.carts.get_cart(&mut tx, cart).await?;

        let items = self.items.get_cart_items(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(items)
    }

    async fn upsert_item(
        &self,
        cart: CartUuid,
        item: NewCartItem,
    ) -> Result<UpsertedItem, CartStoreError> {
        let mut tx = self.db.begin().await?;

        self.lock_mutable(&mut tx, cart).await?;

        // Lines only change under the cart lock, so the sum checked here is
        // the sum written below.
        if let Some(existing) = self
            .items
            .get_quantity(&mut tx, cart, item.product_uuid)
            .await?
        {
            existing.checked_add(item.quantity)?;
        }

        let upserted = self.items.upsert_cart_item(&mut tx, cart, item).await?;

        self.carts.touch_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(upserted)
    }

    async fn set_item_quantity(
        &self,
        cart: CartUuid,
        product: ProductUuid,
        quantity: Quantity,
    ) -> Result<CartItem, CartStoreError> {
        let mut tx = self.db.begin().await?;

        self.lock_mutable(&mut tx, cart).await?;

        let item = self
            .items
            .set_quantity(&mut tx, cart, product, quantity)
            .await?
            .ok_or(CartStoreError::ItemNotFound)?;

        self.carts.touch_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(item)
    }

    async fn delete_item(
        &self,
        cart: CartUuid,
        product: ProductUuid,
    ) -> Result<(), CartStoreError> {
        let mut tx = self.db.begin().await?;

        self.lock_mutable(&mut tx, cart).await?;

        if self.items.delete_cart_item(&mut tx, cart, product).await? == 0 {
            return Err(CartStoreError::ItemNotFound);
        }

        self.carts.touch_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(())
    }

    async fn clear_items(&self, cart: CartUuid) -> Result<u64, CartStoreError> {
        let mut tx = self.db.begin().await?;

        self.lock_mutable(&mut tx, cart).await?;

        let removed = self.items.clear_cart_items(&mut tx, cart).await?;

        self.carts.touch_cart(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(removed)
    }

    async fn replace_items(
        &self,
        cart: CartUuid,
        items: Vec<ItemSpec>,
    ) -> Result<Vec<CartItem>, CartStoreError> {
        let mut tx = self.db.begin().await?;

        self.lock_mutable(&mut tx, cart).await?;
        self.reconcile_items(&mut tx, cart, items).await?;
        self.carts.touch_cart(&mut tx, cart).await?;

        let items = self.items.get_cart_items(&mut tx, cart).await?;

        tx.commit().await?;

        Ok(items)
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
        let mut tx = self.db.begin().await?;

        let locked = self.lock_mutable(&mut tx, cart).await?;

        if let Some(items) = items {
            self.reconcile_items(&mut tx, cart, items).await?;
        }

        // Dropping the transaction rolls back the line changes above.
        if let Some(currency) = changes.currency
            && currency != locked.currency
            && self.items.count_cart_items(&mut tx, cart).await? > 0
        {
            return Err(CartStoreError::CurrencyLocked);
        }

        let updated = self.carts.update_cart(&mut tx, cart, changes).await?;

        tx.commit().await?;

        Ok(updated)
    }

    async fn mark_status(
        &self,
        cart: CartUuid,
        status: CartStatus,
    ) -> Result<Cart, CartStoreError> {
        let mut tx = self.db.begin().await?;

        self.lock_mutable(&mut tx, cart).await?;

        let updated = self.carts.set_status(&mut tx, cart, status).await?;

        tx.commit().await?;

        Ok(updated)
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

        let mut tx = self.db.begin().await?;

        // Lock in uuid order so two merges touching the same pair cannot deadlock.
        let (target_lock, source_lock) = if target < source {
            let target_lock = self.carts.lock_cart(&mut tx, target).await?;
            (target_lock, self.carts.lock_cart(&mut tx, source).await?)
        } else {
            let source_lock = self.carts.lock_cart(&mut tx, source).await?;
            (self.carts.lock_cart(&mut tx, target).await?, source_lock)
        };

        let target_lock = target_lock
            .ok_or(CartStoreError::NotFound)?
            .ensure_mutable()?;

        let Some(source_lock) = source_lock.filter(|locked| locked.status.is_mutable()) else {
            return Ok(None);
        };

        if source_lock.currency != target_lock.currency {
            return Err(CartStoreError::CurrencyMismatch {
                target_currency: target_lock.currency,
                source_currency: source_lock.currency,
            });
        }

        if self.items.fold_would_overflow(&mut tx, target, source).await? {
            return Err(CartStoreError::QuantityOverflow);
        }

        let combined = self
            .items
            .fold_cart_items(&mut tx, target, source, policy.keep_newest())
            .await?;
        let moved = self.items.relink_cart_items(&mut tx, target, source).await?;

        self.carts.delete_cart(&mut tx, source).await?;
        self.carts.touch_cart(&mut tx, target).await?;

        tx.commit().await?;

        Ok(Some(MergeReport {
            target,
            source,
            moved,
            combined,
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use carthorse::cart::{SessionKey, UserUuid};
    use rust_decimal::Decimal;
    use testresult::TestResult;
    use tokio::sync::Barrier;

    use crate::test::{
        db::TestDb,
        helpers::{new_item, snapshot},
    };

    use super::*;

    fn store(db: &TestDb) -> PgCartStore {
        PgCartStore::new(Db::new(db.pool().clone()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires Docker"]
    async fn concurrent_get_or_create_converges_on_one_cart() -> TestResult {
        const CALLERS: usize = 8;

        let db = TestDb::new().await;
        let store = Arc::new(store(&db));
        let owner = Owner::Session(SessionKey::new("pg-race")?);
        let start = Arc::new(Barrier::new(CALLERS));

        let tasks: Vec<_> = (0..CALLERS)
            .map(|_| {
                let store = Arc::clone(&store);
                let owner = owner.clone();
                let start = Arc::clone(&start);

                tokio::spawn(async move {
                    start.wait().await;

                    store
                        .get_or_create_active_cart(&owner, CurrencyCode::default())
                        .await
                })
            })
            .collect();

        let mut uuids = Vec::new();

        for task in tasks {
            uuids.push(task.await??.uuid);
        }

        uuids.sort();
        uuids.dedup();

        assert_eq!(uuids.len(), 1, "all callers should see the same cart");
        assert_eq!(store.list_carts(&owner).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn upsert_increments_and_reports_creation() -> TestResult {
        let db = TestDb::new().await;
        let store = store(&db);
        let cart = store
            .get_or_create_active_cart(&Owner::User(UserUuid::new()), CurrencyCode::default())
            .await?;
        let product = ProductUuid::new();

        let first = store.upsert_item(cart.uuid, new_item(product, 2)?).await?;
        let second = store.upsert_item(cart.uuid, new_item(product, 3)?).await?;

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(second.item.quantity.get(), 5);

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn upsert_past_storage_limit_is_rejected() -> TestResult {
        let db = TestDb::new().await;
        let store = store(&db);
        let cart = store
            .get_or_create_active_cart(&Owner::User(UserUuid::new()), CurrencyCode::default())
            .await?;
        let product = ProductUuid::new();

        store
            .upsert_item(cart.uuid, new_item(product, i64::from(i32::MAX))?)
            .await?;

        let result = store.upsert_item(cart.uuid, new_item(product, 1)?).await;

        assert!(
            matches!(result, Err(CartStoreError::QuantityOverflow)),
            "expected overflow, got {result:?}"
        );

        let items = store.list_items(cart.uuid).await?;
        assert_eq!(
            items.first().map(|item| item.quantity.as_i32()),
            Some(i32::MAX)
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn absorb_folds_relinks_and_deletes_source() -> TestResult {
        let db = TestDb::new().await;
        let store = store(&db);
        let x = ProductUuid::new();

        let target = store
            .get_or_create_active_cart(&Owner::User(UserUuid::new()), CurrencyCode::default())
            .await?;
        let anon = Owner::Session(SessionKey::new("pg-merge")?);
        let source = store
            .get_or_create_active_cart(&anon, CurrencyCode::default())
            .await?;

        store.upsert_item(target.uuid, new_item(x, 3)?).await?;
        store.upsert_item(source.uuid, new_item(x, 2)?).await?;

        let mut other = new_item(ProductUuid::new(), 1)?;
        other.snapshot = snapshot("Gadget", Decimal::new(250, 2));
        store.upsert_item(source.uuid, other).await?;

        let report = store
            .absorb_cart(target.uuid, source.uuid, MergePricePolicy::KeepTarget)
            .await?;

        assert_eq!(report.map(|report| (report.moved, report.combined)), Some((1, 1)));

        let items = store.list_items(target.uuid).await?;
        assert_eq!(items.len(), 2);
        assert_eq!(
            items
                .iter()
                .find(|item| item.product_uuid == x)
                .map(|item| item.quantity.get()),
            Some(5)
        );

        assert!(matches!(
            store.get_cart(source.uuid).await,
            Err(CartStoreError::NotFound)
        ));
        assert!(store.find_active_cart(&anon).await?.is_none());

        let again = store
            .absorb_cart(target.uuid, source.uuid, MergePricePolicy::KeepTarget)
            .await?;
        assert!(again.is_none());

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn closed_cart_rejects_mutations() -> TestResult {
        let db = TestDb::new().await;
        let store = store(&db);
        let cart = store
            .get_or_create_active_cart(&Owner::User(UserUuid::new()), CurrencyCode::default())
            .await?;

        store.mark_status(cart.uuid, CartStatus::Abandoned).await?;

        let result = store.clear_items(cart.uuid).await;

        assert!(matches!(
            result,
            Err(CartStoreError::NotMutable(CartStatus::Abandoned))
        ));

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn absorb_overflow_rolls_back_both_carts() -> TestResult {
        let db = TestDb::new().await;
        let store = store(&db);
        let anon = Owner::Session(SessionKey::new("pg-overflow")?);
        let x = ProductUuid::new();

        let target = store
            .get_or_create_active_cart(&Owner::User(UserUuid::new()), CurrencyCode::default())
            .await?;
        let source = store
            .get_or_create_active_cart(&anon, CurrencyCode::default())
            .await?;

        store
            .upsert_item(target.uuid, new_item(x, i64::from(i32::MAX))?)
            .await?;
        store.upsert_item(source.uuid, new_item(x, 1)?).await?;
        store
            .upsert_item(source.uuid, new_item(ProductUuid::new(), 2)?)
            .await?;

        let result = store
            .absorb_cart(target.uuid, source.uuid, MergePricePolicy::KeepTarget)
            .await;

        assert!(
            matches!(result, Err(CartStoreError::QuantityOverflow)),
            "expected overflow, got {result:?}"
        );

        let still_active = store.find_active_cart(&anon).await?;
        assert_eq!(still_active.map(|cart| cart.uuid), Some(source.uuid));
        assert_eq!(store.list_items(source.uuid).await?.len(), 2);

        let target_items = store.list_items(target.uuid).await?;
        assert_eq!(target_items.len(), 1);
        assert_eq!(
            target_items.first().map(|item| item.quantity.as_i32()),
            Some(i32::MAX)
        );

        Ok(())
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn rejected_update_rolls_back_line_changes() -> TestResult {
        let db = TestDb::new().await;
        let store = store(&db);
        let cart = store
            .get_or_create_active_cart(&Owner::User(UserUuid::new()), CurrencyCode::default())
            .await?;
        let lamp = ProductUuid::new();

        store.upsert_item(cart.uuid, new_item(lamp, 1)?).await?;

        let result = store
            .apply_update(
                cart.uuid,
                CartChanges {
                    shipping_cost: Some(Decimal::new(999, 2)),
                    currency: Some(CurrencyCode::parse("EUR")?),
                    ..CartChanges::default()
                },
                Some(vec![ItemSpec {
                    product_uuid: lamp,
                    quantity: Quantity::new(4)?,
                    snapshot: snapshot("Lamp", Decimal::ONE),
                }]),
            )
            .await;

        assert!(matches!(result, Err(CartStoreError::CurrencyLocked)));
        assert_eq!(
            store.get_cart(cart.uuid).await?.adjustments.shipping_cost,
            Decimal::ZERO
        );
        assert_eq!(
            store
                .list_items(cart.uuid)
                .await?
                .first()
                .map(|item| item.quantity.get()),
            Some(1)
        );

        let euro = CurrencyCode::parse("EUR")?;
        let emptied = store
            .apply_update(
                cart.uuid,
                CartChanges {
                    currency: Some(euro),
                    ..CartChanges::default()
                },
                Some(Vec::new()),
            )
            .await?;

        assert_eq!(emptied.currency, euro);
        assert!(store.list_items(cart.uuid).await?.is_empty());

        Ok(())
    }
}
