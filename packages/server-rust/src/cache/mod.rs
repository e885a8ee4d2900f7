//! Cache primitive used by memoized service methods.
//!
//! - [`store`]: `CacheStore` trait and the `quick_cache`-backed `MemoryStore`
//! - [`memoizer`]: single-flight, timeout-aware memoization over a store

pub mod memoizer;
pub mod store;

pub use memoizer::{CachePolicy, Memoizer};
pub use store::{CacheStore, MemoryStore};
