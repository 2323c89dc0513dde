//! Merge Coordinator
//!
//! Folds an anonymous session cart into the user's active cart at login.
//! Merges into the same target cart are serialized in-process; the store's
//! atomic absorb keeps them correct across processes.

use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::{Arc, Mutex, PoisonError},
};

use carthorse::{
    cart::{Cart, CartUuid, Owner, SessionKey, UserUuid},
    money::CurrencyCode,
};
use rustc_hash::FxHashMap;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use super::store::{CartStore, CartStoreError, MergePricePolicy, MergeReport};

#[derive(Debug, Clone, PartialEq)]
pub enum MergeOutcome {
    Merged { cart: Cart, report: MergeReport },

    /// The session had no active cart; the user's cart is unchanged.
    NothingToMerge { cart: Cart },
}

impl MergeOutcome {
    pub fn cart(&self) -> &Cart {
        match self {
            Self::Merged { cart, .. } | Self::NothingToMerge { cart } => cart,
        }
    }
}

type TargetLock = Arc<AsyncMutex<()>>;

type TargetLocks = Mutex<FxHashMap<CartUuid, TargetLock>>;

/// A merge's handle on its target's lock. Dropping it prunes the map entry
/// once no other merge holds or waits on the lock, including when the merge
/// future is dropped before it finishes.
struct LockClaim<'a> {
    locks: &'a TargetLocks,
    target: CartUuid,
    lock: TargetLock,
}

impl Drop for LockClaim<'_> {
    fn drop(&mut self) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        // Handles are only cloned under this mutex, so the map's copy plus ours
        // means nobody else is waiting.
        if Arc::strong_count(&self.lock) <= 2
            && locks
                .get(&self.target)
                .is_some_and(|tracked| Arc::ptr_eq(tracked, &self.lock))
        {
            locks.remove(&self.target);
        }
    }
}

pub struct MergeCoordinator {
    store: Arc<dyn CartStore>,
    policy: MergePricePolicy,
    locks: TargetLocks,
}

impl Debug for MergeCoordinator {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MergeCoordinator")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl MergeCoordinator {
    pub fn new(store: Arc<dyn CartStore>, policy: MergePricePolicy) -> Self {
        Self {
            store,
            policy,
            locks: Mutex::new(FxHashMap::default()),
        }
    }

    /// Merge the session's active cart, if any, into the user's active cart.
    ///
    /// A user without an active cart gets one, in the session cart's currency
    /// when there is a session cart and in `currency` otherwise. Calling this
    /// again after a successful merge is a no-op.
    ///
    /// # Errors
    ///
    /// Store failures, including a currency mismatch between the two carts,
    /// leave both carts untouched.
    pub async fn merge(
        &self,
        user: UserUuid,
        session: &SessionKey,
        currency: CurrencyCode,
    ) -> Result<MergeOutcome, CartStoreError> {
        let user_owner = Owner::User(user);

        let Some(source) = self
            .store
            .find_active_cart(&Owner::Session(session.clone()))
            .await?
        else {
            let cart = self
                .store
                .get_or_create_active_cart(&user_owner, currency)
                .await?;

            debug!(%user, "no session cart to merge");

            return Ok(MergeOutcome::NothingToMerge { cart });
        };

        let target = self
            .store
            .get_or_create_active_cart(&user_owner, source.currency)
            .await?;

        let report = {
            let claim = self.claim(target.uuid);
            let _held = claim.lock.lock().await;

            self.store
                .absorb_cart(target.uuid, source.uuid, self.policy)
                .await?
        };

        let cart = self.store.get_cart(target.uuid).await?;

        match report {
            Some(report) => {
                info!(
                    target = %report.target,
                    source = %report.source,
                    moved = report.moved,
                    combined = report.combined,
                    "merged session cart"
                );

                Ok(MergeOutcome::Merged { cart, report })
            }
            None => {
                debug!(cart = %target.uuid, source = %source.uuid, "session cart already merged");

                Ok(MergeOutcome::NothingToMerge { cart })
            }
        }
    }

    fn claim(&self, target: CartUuid) -> LockClaim<'_> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        LockClaim {
            locks: &self.locks,
            target,
            lock: Arc::clone(locks.entry(target).or_default()),
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use carthorse::cart::ProductUuid;
    use rust_decimal::Decimal;
    use testresult::TestResult;
    use tokio::{sync::Barrier, time::timeout};

    use crate::{
        domain::carts::store::{MemoryCartStore, MockCartStore},
        test::helpers::{new_item, snapshot},
    };

    use super::*;

    fn quantity_of(items: &[carthorse::cart::CartItem], product: ProductUuid) -> Option<u32> {
        items
            .iter()
            .find(|item| item.product_uuid == product)
            .map(|item| item.quantity.get())
    }

    #[tokio::test]
    async fn merges_session_cart_into_user_cart() -> TestResult {
        let store = Arc::new(MemoryCartStore::new());
        let coordinator = MergeCoordinator::new(store.clone(), MergePricePolicy::KeepTarget);
        let user = UserUuid::new();
        let session = SessionKey::new("login")?;
        let (x, y) = (ProductUuid::new(), ProductUuid::new());

        let user_cart = store
            .get_or_create_active_cart(&Owner::User(user), CurrencyCode::default())
            .await?;
        store.upsert_item(user_cart.uuid, new_item(x, 3)?).await?;
        store.upsert_item(user_cart.uuid, new_item(y, 1)?).await?;

        let session_cart = store
            .get_or_create_active_cart(&Owner::Session(session.clone()), CurrencyCode::default())
            .await?;
        let mut cheaper = new_item(x, 2)?;
        cheaper.snapshot = snapshot("Widget", Decimal::new(100, 2));
        store.upsert_item(session_cart.uuid, cheaper).await?;

        let outcome = coordinator
            .merge(user, &session, CurrencyCode::default())
            .await?;

        assert!(matches!(outcome, MergeOutcome::Merged { .. }));
        assert_eq!(outcome.cart().uuid, user_cart.uuid);

        let items = store.list_items(user_cart.uuid).await?;

        assert_eq!(items.len(), 2);
        assert_eq!(quantity_of(&items, x), Some(5));
        assert_eq!(quantity_of(&items, y), Some(1));
        assert_ne!(
            items
                .iter()
                .find(|item| item.product_uuid == x)
                .map(|item| item.snapshot.price_at_addition),
            Some(Decimal::new(100, 2)),
            "target snapshot should win by default"
        );
        assert!(
            store
                .find_active_cart(&Owner::Session(session))
                .await?
                .is_none()
        );
        assert_eq!(coordinator.tracked_locks(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn missing_session_cart_is_a_no_op() -> TestResult {
        let store = Arc::new(MemoryCartStore::new());
        let coordinator = MergeCoordinator::new(store.clone(), MergePricePolicy::default());
        let user = UserUuid::new();

        let user_cart = store
            .get_or_create_active_cart(&Owner::User(user), CurrencyCode::default())
            .await?;
        store
            .upsert_item(user_cart.uuid, new_item(ProductUuid::new(), 2)?)
            .await?;

        let outcome = coordinator
            .merge(user, &SessionKey::new("nobody")?, CurrencyCode::default())
            .await?;

        match outcome {
            MergeOutcome::NothingToMerge { cart } => {
                assert_eq!(cart.uuid, user_cart.uuid);
            }
            MergeOutcome::Merged { .. } => {
                return Err("expected nothing to merge".into());
            }
        }

        assert_eq!(store.list_items(user_cart.uuid).await?.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn new_user_cart_takes_session_currency() -> TestResult {
        let store = Arc::new(MemoryCartStore::new());
        let coordinator = MergeCoordinator::new(store.clone(), MergePricePolicy::default());
        let session = SessionKey::new("euro")?;
        let euro = CurrencyCode::parse("EUR")?;

        let session_cart = store
            .get_or_create_active_cart(&Owner::Session(session.clone()), euro)
            .await?;
        store
            .upsert_item(session_cart.uuid, new_item(ProductUuid::new(), 1)?)
            .await?;

        let outcome = coordinator
            .merge(UserUuid::new(), &session, CurrencyCode::default())
            .await?;

        assert_eq!(outcome.cart().currency, euro);

        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_merges_do_not_double_count() -> TestResult {
        const LOGINS: usize = 4;

        let store = Arc::new(MemoryCartStore::new());
        let coordinator = Arc::new(MergeCoordinator::new(
            store.clone(),
            MergePricePolicy::default(),
        ));
        let user = UserUuid::new();
        let session = SessionKey::new("double")?;
        let product = ProductUuid::new();

        let user_cart = store
            .get_or_create_active_cart(&Owner::User(user), CurrencyCode::default())
            .await?;
        store.upsert_item(user_cart.uuid, new_item(product, 3)?).await?;

        let session_cart = store
            .get_or_create_active_cart(&Owner::Session(session.clone()), CurrencyCode::default())
            .await?;
        store.upsert_item(session_cart.uuid, new_item(product, 2)?).await?;

        let start = Arc::new(Barrier::new(LOGINS));

        let tasks: Vec<_> = (0..LOGINS)
            .map(|_| {
                let coordinator = Arc::clone(&coordinator);
                let session = session.clone();
                let start = Arc::clone(&start);

                tokio::spawn(async move {
                    start.wait().await;

                    coordinator
                        .merge(user, &session, CurrencyCode::default())
                        .await
                })
            })
            .collect();

        let mut merged = 0;

        for task in tasks {
            if matches!(task.await??, MergeOutcome::Merged { .. }) {
                merged += 1;
            }
        }

        assert_eq!(merged, 1);
        assert_eq!(
            quantity_of(&store.list_items(user_cart.uuid).await?, product),
            Some(5)
        );
        assert_eq!(coordinator.tracked_locks(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn store_failure_releases_target_lock() -> TestResult {
        let session = SessionKey::new("broken")?;
        let source = Cart {
            uuid: CartUuid::new(),
            owner: Owner::Session(session.clone()),
            status: carthorse::cart::CartStatus::Active,
            adjustments: carthorse::cart::Adjustments::default(),
            currency: CurrencyCode::default(),
            coupon_code: None,
            discount_notes: None,
            created_at: jiff::Timestamp::now(),
            updated_at: jiff::Timestamp::now(),
        };
        let target = Cart {
            uuid: CartUuid::new(),
            owner: Owner::User(UserUuid::new()),
            ..source.clone()
        };

        let mut store = MockCartStore::new();

        store
            .expect_find_active_cart()
            .returning(move |_| Ok(Some(source.clone())));
        store
            .expect_get_or_create_active_cart()
            .returning(move |_, _| Ok(target.clone()));
        store
            .expect_absorb_cart()
            .times(1)
            .returning(|_, _, _| Err(CartStoreError::Conflict));

        let coordinator = MergeCoordinator::new(Arc::new(store), MergePricePolicy::default());

        let result = coordinator
            .merge(UserUuid::new(), &session, CurrencyCode::default())
            .await;

        assert!(matches!(result, Err(CartStoreError::Conflict)));
        assert_eq!(coordinator.tracked_locks(), 0);

        Ok(())
    }

    #[tokio::test]
    async fn overflowing_merge_leaves_both_carts_as_they_were() -> TestResult {
        let store = Arc::new(MemoryCartStore::new());
        let coordinator = MergeCoordinator::new(store.clone(), MergePricePolicy::default());
        let user = UserUuid::new();
        let session = SessionKey::new("bulk")?;
        let (x, y) = (ProductUuid::new(), ProductUuid::new());

        let user_cart = store
            .get_or_create_active_cart(&Owner::User(user), CurrencyCode::default())
            .await?;
        store
            .upsert_item(user_cart.uuid, new_item(x, i64::from(i32::MAX))?)
            .await?;

        let session_cart = store
            .get_or_create_active_cart(&Owner::Session(session.clone()), CurrencyCode::default())
            .await?;
        store.upsert_item(session_cart.uuid, new_item(x, 1)?).await?;
        store.upsert_item(session_cart.uuid, new_item(y, 4)?).await?;

        let result = coordinator
            .merge(user, &session, CurrencyCode::default())
            .await;

        assert!(
            matches!(result, Err(CartStoreError::QuantityOverflow)),
            "expected overflow, got {result:?}"
        );

        let session_items = store.list_items(session_cart.uuid).await?;
        assert_eq!(quantity_of(&session_items, x), Some(1));
        assert_eq!(quantity_of(&session_items, y), Some(4));

        let user_items = store.list_items(user_cart.uuid).await?;
        assert_eq!(user_items.len(), 1);
        assert_eq!(quantity_of(&user_items, x), Some(2_147_483_647));
        assert_eq!(coordinator.tracked_locks(), 0);

        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_merge_does_not_leak_its_lock() -> TestResult {
        let store = Arc::new(MemoryCartStore::new());
        let coordinator = MergeCoordinator::new(store.clone(), MergePricePolicy::default());
        let user = UserUuid::new();
        let session = SessionKey::new("walked-away")?;

        let user_cart = store
            .get_or_create_active_cart(&Owner::User(user), CurrencyCode::default())
            .await?;
        let session_cart = store
            .get_or_create_active_cart(&Owner::Session(session.clone()), CurrencyCode::default())
            .await?;
        store
            .upsert_item(session_cart.uuid, new_item(ProductUuid::new(), 1)?)
            .await?;

        let other = coordinator.claim(user_cart.uuid);
        let held = other.lock.lock().await;

        let mut merge = Box::pin(coordinator.merge(user, &session, CurrencyCode::default()));

        assert!(
            timeout(Duration::from_millis(50), &mut merge).await.is_err(),
            "merge should wait for the target lock"
        );

        drop(held);
        drop(other);

        assert_eq!(coordinator.tracked_locks(), 1, "the waiting merge still holds a claim");

        drop(merge);

        assert_eq!(coordinator.tracked_locks(), 0);
        assert!(store.find_active_cart(&Owner::Session(session)).await?.is_some());

        Ok(())
    }
}
