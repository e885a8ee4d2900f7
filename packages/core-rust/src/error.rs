//! Error types for registration, resolution and method calls.

use std::sync::Arc;

use crate::types::{RealmId, Sandbox};

/// Placeholder used in messages for services registered without a name.
pub const ANONYMOUS: &str = "<anonymous>";

/// Errors raised while declaring, registering or resolving services.
///
/// Every variant is fatal to the operation that raised it: a failed batch
/// registration leaves the realm untouched.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationError {
    #[error("a service named {name:?} has already been registered in {realm}")]
    DuplicateName { name: String, realm: RealmId },
    #[error("caching requires the service to have a name")]
    MissingName,
    #[error("service name must not be empty")]
    EmptyName,
    #[error("caching has already been configured for this service")]
    CachingAlreadyConfigured,
    #[error("cannot cache method {method:?}: service {service:?} has no such method")]
    UnknownCachedMethod { service: String, method: String },
    #[error("declaration already carries an explicit name ({existing:?})")]
    NameAlreadySet { existing: String },
    #[error("declaration already carries an explicit sandbox ({existing})")]
    SandboxAlreadySet { existing: Sandbox },
    #[error("{}", namespace_message(.namespace, .ambiguous))]
    UnknownNamespace { namespace: String, ambiguous: bool },
    #[error("unknown realm {0}")]
    UnknownRealm(RealmId),
    #[error("unknown cache policy {0:?}")]
    UnknownCachePolicy(String),
    #[error("invalid sandbox {0:?}, expected \"server\" or \"plugin\"")]
    InvalidSandbox(String),
    #[error("failed to construct service: {0}")]
    Construct(#[from] anyhow::Error),
}

fn namespace_message(namespace: &str, ambiguous: &bool) -> String {
    if *ambiguous {
        format!("plugin namespace {namespace:?} is not unique: is that plugin registered more than once?")
    } else {
        format!("plugin namespace {namespace:?} does not exist")
    }
}

/// Errors surfaced when a service method is invoked.
///
/// `Clone` so a single generation outcome can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error("service {service:?} has no method {method:?}")]
    UnknownMethod { service: String, method: String },
    #[error("generation of {key:?} timed out after {timeout_ms}ms")]
    GenerateTimeout { key: String, timeout_ms: u64 },
    #[error("generation of {key:?} ended without producing a result")]
    GenerationAborted { key: String },
    #[error("{0}")]
    Method(Arc<anyhow::Error>),
}

impl From<anyhow::Error> for CallError {
    fn from(err: anyhow::Error) -> Self {
        CallError::Method(Arc::new(err))
    }
}
