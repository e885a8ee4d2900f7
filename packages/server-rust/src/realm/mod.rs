//! Realm tree: plugin scopes and the services registered in each.
//!
//! - [`tree`]: host-owned arena of realm nodes
//! - [`resolve`]: sandbox-aware resolution of a realm's visible services

pub mod resolve;
pub mod tree;

pub use tree::RealmTree;
