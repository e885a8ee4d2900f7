use std::time::Duration;

use crate::caching::KeyGenerator;
use crate::context::Selector;
use crate::error::RegistrationError;
use crate::instance::ServiceMap;
use crate::method::Method;
use crate::types::RealmId;

/// Read access to the realm tree for code running inside a realm.
///
/// Implemented by the server's realm tree; handed to services through
/// [`RealmContext`](crate::RealmContext).
pub trait ServiceLocator: Send + Sync {
    /// Resolve the services visible from `realm` under `selector`.
    fn services(&self, realm: RealmId, selector: &Selector) -> Result<ServiceMap, RegistrationError>;
}

/// Everything the memoization primitive needs to wrap one method.
pub struct MemoizeSpec {
    /// Key namespace, unique per registered method:
    /// `"{realm}/{service}.{method}"`.
    pub namespace: String,
    /// Produces the argument-sensitive part of the key.
    pub generate_key: KeyGenerator,
    /// The original, unwrapped method.
    pub generate: Method,
    /// How long waiters wait for a pending generation.
    pub generate_timeout: Duration,
    /// Value lifetime. `None` defers to the policy default.
    pub expires_in: Option<Duration>,
    /// Named cache policy. `None` selects the default store.
    pub policy: Option<String>,
}

/// Memoization primitive consumed by the caching decorator.
///
/// Implementations provide storage, expiry and single-flight deduplication:
/// concurrent calls with an equal key share one invocation of `generate`,
/// and waiters give up after `generate_timeout` without cancelling it.
pub trait CachePrimitive: Send + Sync {
    /// Returns a memoized entry point standing in for `spec.generate`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownCachePolicy` if `spec.policy` names no known store.
    fn memoize(&self, spec: MemoizeSpec) -> Result<Method, RegistrationError>;
}
