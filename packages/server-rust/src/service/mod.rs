//! Service registration for the host layer.
//!
//! 1. **Configuration** (`config`): server and cache settings
//! 2. **Caching** (`caching`): wraps cached methods with memoized entry points
//! 3. **Registry** (`registry`): the `Realm` handle that registers and resolves services

pub mod caching;
pub mod config;
pub mod registry;

pub use caching::decorate;
pub use config::{CacheConfig, CachePolicyConfig, ServerConfig};
pub use registry::Realm;
