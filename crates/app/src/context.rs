//! App Context

use std::sync::Arc;

use carthorse::money::MoneyError;
use thiserror::Error;

use crate::{
    config::AppConfig,
    database::{self, Db},
    domain::carts::{
        CartStore, CartsService, CartsServiceDeps, LiveCartsService, MergeCoordinator, NoFees,
        PgCartStore,
    },
    lookup::{
        BoundedCache, HttpTransport, NoCache, ProductCache, RemoteLookup, RemoteProductService,
        RemoteUserService, Transport,
    },
    orders::HttpOrderHandoff,
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),

    #[error("invalid default currency")]
    Currency(#[source] MoneyError),

    #[error("failed to build HTTP client")]
    Http(#[source] reqwest::Error),
}

#[derive(Clone)]
pub struct AppContext {
    pub carts: Arc<dyn CartsService>,
    pub store: Arc<dyn CartStore>,
}

impl AppContext {
    /// Connect to the database and wire the cart service to its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error when the database is unreachable, the default currency
    /// is unknown or the HTTP client cannot be built.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppInitError> {
        let default_currency = config
            .carts
            .default_currency()
            .map_err(AppInitError::Currency)?;

        let pool = database::connect(
            &config.database.database_url,
            config.database.database_max_connections,
        )
        .await
        .map_err(AppInitError::Database)?;

        let db = Db::new(pool).with_lock_timeout(config.database.lock_timeout());
        let store: Arc<dyn CartStore> = Arc::new(PgCartStore::new(db));

        let http = reqwest::Client::builder()
            .user_agent(concat!("carthorse/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(AppInitError::Http)?;
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(http));

        let policy = config.lookup.policy();
        let cache: Arc<dyn ProductCache> = match config.lookup.cache() {
            Some(cache) => Arc::new(BoundedCache::new(cache)),
            None => Arc::new(NoCache),
        };

        let products = RemoteProductService::new(
            RemoteLookup::new(
                "product",
                &config.lookup.product_service_url,
                Arc::clone(&transport),
                policy,
            ),
            cache,
        );

        let users = RemoteUserService::new(RemoteLookup::new(
            "user",
            &config.lookup.user_service_url,
            Arc::clone(&transport),
            policy,
        ));

        let orders = HttpOrderHandoff::new(
            &config.orders.order_service_url,
            transport,
            config.orders.timeout(),
        );

        let merges = MergeCoordinator::new(
            Arc::clone(&store),
            config.carts.merge_price_policy.into(),
        );

        let carts = LiveCartsService::new(CartsServiceDeps {
            store: Arc::clone(&store),
            products: Arc::new(products),
            users: Arc::new(users),
            merges: Arc::new(merges),
            fees: Arc::new(NoFees),
            orders: Arc::new(orders),
            default_currency,
        });

        Ok(Self {
            carts: Arc::new(carts),
            store,
        })
    }
}
