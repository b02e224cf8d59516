//! Geo-data plumbing: wire types, the TTL cache, request de-duplication, and
//! the service that ties a [`GeoDataSource`] to the cache.

pub mod cache;
pub mod preload;
pub mod protocol;
pub mod request;
pub mod service;
pub mod source;

pub use cache::*;
pub use preload::*;
pub use protocol::*;
pub use request::*;
pub use service::*;
pub use source::*;
