//! Remote Lookups
//!
//! Outbound calls to the product catalog and user identity services. Each call
//! is bounded by an explicit [`LookupPolicy`] and reports an exhausted retry
//! budget as [`LookupError::Unavailable`], distinct from a definitive "not found".

mod cache;
mod client;
mod errors;
mod policy;
mod products;
mod transport;
mod users;

pub use cache::{BoundedCache, CacheConfig, NoCache, ProductCache};
pub use client::RemoteLookup;
pub use errors::{LookupError, TransportError};
pub use policy::LookupPolicy;
pub use products::{
    Availability, MockProductService, Product, ProductService, RemoteProductService,
};
pub use transport::{HttpTransport, MockTransport, Transport, TransportResponse};
pub use users::{MockUserService, RemoteUserService, UserService};
