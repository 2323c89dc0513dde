//! Carts service.

use std::{
    collections::HashSet,
    fmt::{Debug, Formatter, Result as FmtResult},
    sync::Arc,
};

use async_trait::async_trait;
use carthorse::{
    cart::{
        Cart, CartItem, CartItemUuid, CartStatus, CartUuid, ItemSnapshot, NewCartItem, Owner,
        ProductUuid, Quantity, SessionKey, UserUuid,
    },
    money::{CurrencyCode, validate_amount},
    order::OrderSnapshot,
};
use mockall::automock;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::{
    domain::carts::{
        errors::CartsServiceError,
        fees::FeeSchedule,
        merge::{MergeCoordinator, MergeOutcome},
        store::{CartChanges, CartStore, ItemSpec},
        views::{CartSummary, CartView, MergeView, NO_SESSION_CART},
    },
    lookup::{Availability, Product, ProductService, UserService},
    orders::OrderHandoff,
};

/// Maximum length of a coupon code.
pub const COUPON_CODE_MAX_LEN: usize = 20;

/// How much upstream validation a call performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValidationMode {
    /// Check that users exist and that products have stock.
    #[default]
    Strict,

    /// Skip user and stock checks. Products must still exist in the catalog.
    Trusted,
}

impl ValidationMode {
    fn is_strict(self) -> bool {
        matches!(self, Self::Strict)
    }
}

/// A product and a caller supplied quantity, validated by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddItem {
    pub product: ProductUuid,
    pub quantity: i64,
}

/// Partial cart update. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartUpdate {
    pub shipping_cost: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub tax_amount: Option<Decimal>,
    pub currency_code: Option<String>,
    pub coupon_code: Option<Option<String>>,
    pub discount_notes: Option<Option<String>>,

    /// Whole-cart replacement: listed quantities are set, unlisted items removed.
    pub items: Option<Vec<AddItem>>,
}

#[automock]
#[async_trait]
pub trait CartsService: Send + Sync {
    /// Add units of a product to the owner's active cart, creating the cart if needed.
    async fn add_item(
        &self,
        owner: &Owner,
        item: AddItem,
        mode: ValidationMode,
    ) -> Result<CartView, CartsServiceError>;

    /// Retrieve a cart the requester owns, in any status.
    async fn get_cart(&self, cart: CartUuid, requester: &Owner)
    -> Result<CartView, CartsServiceError>;

    async fn update_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
        update: CartUpdate,
        mode: ValidationMode,
    ) -> Result<CartView, CartsServiceError>;

    async fn remove_item(
        &self,
        cart: CartUuid,
        requester: &Owner,
        product: ProductUuid,
    ) -> Result<CartView, CartsServiceError>;

    /// Overwrite the quantity of a line already in the cart.
    async fn set_item_quantity(
        &self,
        cart: CartUuid,
        requester: &Owner,
        product: ProductUuid,
        quantity: i64,
    ) -> Result<CartView, CartsServiceError>;

    async fn clear_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<CartView, CartsServiceError>;

    /// Mark the cart abandoned. It is kept for audit and stays readable by id.
    async fn close_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<CartView, CartsServiceError>;

    /// Hand the cart to the order service and mark it converted.
    async fn convert_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<CartView, CartsServiceError>;

    /// Fold the session's active cart into the user's cart.
    async fn merge_on_login(
        &self,
        user: UserUuid,
        session: &SessionKey,
        mode: ValidationMode,
    ) -> Result<MergeView, CartsServiceError>;

    /// Every cart the owner has had, newest first.
    async fn list_carts(
        &self,
        owner: &Owner,
        mode: ValidationMode,
    ) -> Result<Vec<CartSummary>, CartsServiceError>;
}

#[derive(Clone)]
pub struct LiveCartsService {
    store: Arc<dyn CartStore>,
    products: Arc<dyn ProductService>,
    users: Arc<dyn UserService>,
    merges: Arc<MergeCoordinator>,
    fees: Arc<dyn FeeSchedule>,
    orders: Arc<dyn OrderHandoff>,
    default_currency: CurrencyCode,
}

/// Collaborators of [`LiveCartsService`].
#[derive(Clone)]
pub struct CartsServiceDeps {
    pub store: Arc<dyn CartStore>,
    pub products: Arc<dyn ProductService>,
    pub users: Arc<dyn UserService>,
    pub merges: Arc<MergeCoordinator>,
    pub fees: Arc<dyn FeeSchedule>,
    pub orders: Arc<dyn OrderHandoff>,
    pub default_currency: CurrencyCode,
}

impl Debug for LiveCartsService {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("LiveCartsService")
            .field("merges", &self.merges)
            .field("fees", &self.fees)
            .field("default_currency", &self.default_currency)
            .finish_non_exhaustive()
    }
}

impl LiveCartsService {
    #[must_use]
    pub fn new(deps: CartsServiceDeps) -> Self {
        let CartsServiceDeps {
            store,
            products,
            users,
            merges,
            fees,
            orders,
            default_currency,
        } = deps;

        Self {
            store,
            products,
            users,
            merges,
            fees,
            orders,
            default_currency,
        }
    }

    /// Load a cart, hiding carts owned by anyone else.
    async fn owned_cart(&self, cart: CartUuid, requester: &Owner) -> Result<Cart, CartsServiceError> {
        let cart = self.store.get_cart(cart).await?;

        if cart.owner != *requester {
            debug!(cart = %cart.uuid, %requester, "cart requested by non-owner");

            return Err(CartsServiceError::NotFound);
        }

        Ok(cart)
    }

    async fn owned_mutable_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<Cart, CartsServiceError> {
        let cart = self.owned_cart(cart, requester).await?;

        if !cart.status.is_mutable() {
            return Err(CartsServiceError::CartNotMutable {
                status: cart.status,
            });
        }

        Ok(cart)
    }

    async fn view(&self, cart: Cart) -> Result<CartView, CartsServiceError> {
        let items = self.store.list_items(cart.uuid).await?;

        Ok(CartView::build(cart, &items)?)
    }

    async fn view_of(&self, cart: CartUuid) -> Result<CartView, CartsServiceError> {
        let cart = self.store.get_cart(cart).await?;

        self.view(cart).await
    }

    async fn ensure_user_exists(
        &self,
        owner: &Owner,
        mode: ValidationMode,
    ) -> Result<(), CartsServiceError> {
        if let (true, Some(user)) = (mode.is_strict(), owner.user())
            && !self.users.user_exists(user).await?
        {
            return Err(CartsServiceError::invalid("user_id", "unknown user"));
        }

        Ok(())
    }

    /// Canonical product details for a line, stock-checked in strict mode.
    async fn resolve_product(
        &self,
        product: ProductUuid,
        quantity: Quantity,
        mode: ValidationMode,
    ) -> Result<Product, CartsServiceError> {
        if !mode.is_strict() {
            return self
                .products
                .get_product(product)
                .await?
                .ok_or(CartsServiceError::ProductNotFound);
        }

        match self.products.check_availability(product, quantity).await? {
            Availability::Available(details) => Ok(details),
            Availability::Insufficient { in_stock } => {
                debug!(%product, %quantity, in_stock, "insufficient stock");

                Err(CartsServiceError::ProductUnavailable {
                    available: Some(in_stock),
                })
            }
            Availability::Missing => Err(CartsServiceError::ProductNotFound),
        }
    }

    async fn refresh_fees(&self, cart: CartUuid) -> Result<Cart, CartsServiceError> {
        let current = self.store.get_cart(cart).await?;
        let items = self.store.list_items(cart).await?;
        let fees = self.fees.fees(&current, &items);

        if fees.shipping_cost == current.adjustments.shipping_cost
            && fees.tax_amount == current.adjustments.tax_amount
        {
            return Ok(current);
        }

        let updated = self
            .store
            .update_cart(
                cart,
                CartChanges {
                    shipping_cost: Some(fees.shipping_cost),
                    tax_amount: Some(fees.tax_amount),
                    ..CartChanges::default()
                },
            )
            .await?;

        Ok(updated)
    }

    /// Item specs for a whole-cart replacement, enriched from the catalog.
    async fn resolve_item_specs(
        &self,
        existing: &[CartItem],
        items: Vec<(ProductUuid, Quantity)>,
        mode: ValidationMode,
    ) -> Result<Vec<ItemSpec>, CartsServiceError> {
        let mut specs = Vec::with_capacity(items.len());

        for (product, quantity) in items {
            let current = existing.iter().find(|item| item.product_uuid == product);

            let snapshot: ItemSnapshot = match current {
                Some(item) if !mode.is_strict() => item.snapshot.clone(),
                _ => self.resolve_product(product, quantity, mode).await?.snapshot(),
            };

            specs.push(ItemSpec {
                product_uuid: product,
                quantity,
                snapshot,
            });
        }

        Ok(specs)
    }
}

fn parse_quantity(quantity: i64) -> Result<Quantity, CartsServiceError> {
    Quantity::new(quantity).map_err(|error| CartsServiceError::invalid("quantity", error))
}

fn parse_amount(
    field: &'static str,
    amount: Option<Decimal>,
) -> Result<Option<Decimal>, CartsServiceError> {
    amount
        .map(validate_amount)
        .transpose()
        .map_err(|error| CartsServiceError::invalid(field, error))
}

/// Validate every field of an update before anything is written.
fn validate_update(
    update: CartUpdate,
) -> Result<(CartChanges, Option<Vec<(ProductUuid, Quantity)>>), CartsServiceError> {
    if let Some(Some(coupon)) = &update.coupon_code
        && coupon.chars().count() > COUPON_CODE_MAX_LEN
    {
        return Err(CartsServiceError::invalid(
            "coupon_code",
            format!("must be at most {COUPON_CODE_MAX_LEN} characters"),
        ));
    }

    let currency = update
        .currency_code
        .as_deref()
        .map(CurrencyCode::parse)
        .transpose()
        .map_err(|error| CartsServiceError::invalid("currency_code", error))?;

    let items = update
        .items
        .map(|items| {
            let mut seen = HashSet::with_capacity(items.len());

            items
                .into_iter()
                .map(|item| {
                    if !seen.insert(item.product) {
                        return Err(CartsServiceError::invalid(
                            "items",
                            format!("product {} is listed more than once", item.product),
                        ));
                    }

                    Ok((item.product, parse_quantity(item.quantity)?))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let changes = CartChanges {
        shipping_cost: parse_amount("shipping_cost", update.shipping_cost)?,
        discount_amount: parse_amount("discount_amount", update.discount_amount)?,
        tax_amount: parse_amount("tax_amount", update.tax_amount)?,
        currency,
        coupon_code: update.coupon_code,
        discount_notes: update.discount_notes,
    };

    Ok((changes, items))
}

#[async_trait]
impl CartsService for LiveCartsService {
    async fn add_item(
        &self,
        owner: &Owner,
        item: AddItem,
        mode: ValidationMode,
    ) -> Result<CartView, CartsServiceError> {
        let quantity = parse_quantity(item.quantity)?;

        self.ensure_user_exists(owner, mode).await?;

        let product = self.resolve_product(item.product, quantity, mode).await?;

        let cart = self
            .store
            .get_or_create_active_cart(owner, self.default_currency)
            .await?;

        let upserted = self
            .store
            .upsert_item(
                cart.uuid,
                NewCartItem {
                    uuid: CartItemUuid::new(),
                    product_uuid: item.product,
                    quantity,
                    snapshot: product.snapshot(),
                },
            )
            .await?;

        info!(
            cart = %cart.uuid,
            product = %item.product,
            %quantity,
            created = upserted.created,
            line_quantity = %upserted.item.quantity,
            "added item to cart"
        );

        self.view_of(cart.uuid).await
    }

    async fn get_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<CartView, CartsServiceError> {
        let cart = self.owned_cart(cart, requester).await?;

        self.view(cart).await
    }

    async fn update_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
        update: CartUpdate,
        mode: ValidationMode,
    ) -> Result<CartView, CartsServiceError> {
        let (changes, items) = validate_update(update)?;

        let cart = self.owned_mutable_cart(cart, requester).await?;

        let specs = match items {
            Some(items) => {
                let existing = self.store.list_items(cart.uuid).await?;

                Some(self.resolve_item_specs(&existing, items, mode).await?)
            }
            None => None,
        };

        let lines = specs.as_ref().map(Vec::len);

        self.store.apply_update(cart.uuid, changes, specs).await?;

        info!(cart = %cart.uuid, ?lines, "updated cart");

        self.view_of(cart.uuid).await
    }

    async fn remove_item(
        &self,
        cart: CartUuid,
        requester: &Owner,
        product: ProductUuid,
    ) -> Result<CartView, CartsServiceError> {
        let cart = self.owned_mutable_cart(cart, requester).await?;

        self.store.delete_item(cart.uuid, product).await?;

        info!(cart = %cart.uuid, %product, "removed item from cart");

        self.view_of(cart.uuid).await
    }

    async fn set_item_quantity(
        &self,
        cart: CartUuid,
        requester: &Owner,
        product: ProductUuid,
        quantity: i64,
    ) -> Result<CartView, CartsServiceError> {
        let quantity = parse_quantity(quantity)?;
        let cart = self.owned_mutable_cart(cart, requester).await?;

        self.store
            .set_item_quantity(cart.uuid, product, quantity)
            .await?;

        let cart = self.refresh_fees(cart.uuid).await?;

        info!(cart = %cart.uuid, %product, %quantity, "set item quantity");

        self.view(cart).await
    }

    async fn clear_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<CartView, CartsServiceError> {
        let cart = self.owned_mutable_cart(cart, requester).await?;

        let removed = self.store.clear_items(cart.uuid).await?;
        let cart = self.refresh_fees(cart.uuid).await?;

        info!(cart = %cart.uuid, removed, "cleared cart");

        self.view(cart).await
    }

    async fn close_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<CartView, CartsServiceError> {
        let cart = self.owned_mutable_cart(cart, requester).await?;

        let cart = self.store.mark_status(cart.uuid, CartStatus::Abandoned).await?;

        info!(cart = %cart.uuid, "closed cart");

        self.view(cart).await
    }

    async fn convert_cart(
        &self,
        cart: CartUuid,
        requester: &Owner,
    ) -> Result<CartView, CartsServiceError> {
        let cart = self.owned_mutable_cart(cart, requester).await?;
        let items = self.store.list_items(cart.uuid).await?;

        if items.is_empty() {
            return Err(CartsServiceError::invalid("items", "cart is empty"));
        }

        let order = OrderSnapshot::from_cart(&cart, &items)?;

        self.orders.submit(&order).await?;

        let cart = self.store.mark_status(cart.uuid, CartStatus::Converted).await?;

        info!(cart = %cart.uuid, total = %order.totals.total, "converted cart");

        self.view(cart).await
    }

    async fn merge_on_login(
        &self,
        user: UserUuid,
        session: &SessionKey,
        mode: ValidationMode,
    ) -> Result<MergeView, CartsServiceError> {
        self.ensure_user_exists(&Owner::User(user), mode).await?;

        let outcome = self
            .merges
            .merge(user, session, self.default_currency)
            .await?;

        let merge = match outcome {
            MergeOutcome::Merged { cart, .. } => MergeView::Merged {
                cart: self.view(cart).await?,
            },
            MergeOutcome::NothingToMerge { cart } => MergeView::NothingToMerge {
                detail: NO_SESSION_CART,
                cart: self.view(cart).await?,
            },
        };

        Ok(merge)
    }

    async fn list_carts(
        &self,
        owner: &Owner,
        mode: ValidationMode,
    ) -> Result<Vec<CartSummary>, CartsServiceError> {
        if let (true, Some(user)) = (mode.is_strict(), owner.user())
            && !self.users.user_exists(user).await?
        {
            debug!(%user, "listing carts for unknown user");

            return Ok(Vec::new());
        }

        let carts = self.store.list_carts(owner).await?;
        let mut summaries = Vec::with_capacity(carts.len());

        for cart in carts {
            let items = self.store.list_items(cart.uuid).await?;

            summaries.push(CartSummary::build(&cart, &items)?);
        }

        Ok(summaries)
    }
}
