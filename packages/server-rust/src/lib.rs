//! Plexus server: the realm tree, service resolution, memoized service
//! methods and the lifecycle driver.

pub mod cache;
pub mod realm;
pub mod server;
pub mod service;

pub use cache::{CachePolicy, CacheStore, Memoizer, MemoryStore};
pub use realm::RealmTree;
pub use server::{LifecycleError, LifecyclePhase, Server};
pub use service::{CacheConfig, CachePolicyConfig, Realm, ServerConfig};
