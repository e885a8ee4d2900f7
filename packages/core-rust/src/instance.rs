//! Realized services and the read-only views handed to callers.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::definition::ServiceDefinition;
use crate::error::{CallError, ANONYMOUS};
use crate::method::{Hook, Method};
use crate::types::{RealmId, Sandbox, Value};

/// A registered service, owned by the realm it was registered on and shared
/// by reference with every realm that can see it.
pub struct ServiceInstance {
    name: Option<String>,
    sandbox: Sandbox,
    realm: RealmId,
    methods: BTreeMap<String, Method>,
    properties: BTreeMap<String, Value>,
    initialize: Option<Hook>,
    teardown: Option<Hook>,
    state: Option<Arc<dyn Any + Send + Sync>>,
}

impl ServiceInstance {
    /// Builds the instance for a definition registered on `realm`.
    ///
    /// Caching must already have been applied to the definition's methods.
    #[must_use]
    pub fn new(definition: ServiceDefinition, realm: RealmId) -> Self {
        Self {
            name: definition.name,
            sandbox: definition.sandbox,
            realm,
            methods: definition.methods,
            properties: definition.properties,
            initialize: definition.initialize,
            teardown: definition.teardown,
            state: definition.state,
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Name for log and error messages; unnamed services render as `<anonymous>`.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(ANONYMOUS)
    }

    #[must_use]
    pub fn sandbox(&self) -> Sandbox {
        self.sandbox
    }

    /// The realm this instance was registered on.
    #[must_use]
    pub fn realm(&self) -> RealmId {
        self.realm
    }

    /// Invokes `method` with positional arguments.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMethod` if the service has no such method, otherwise
    /// whatever the method (or its memoized wrapper) returns.
    pub async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value, CallError> {
        let Some(callable) = self.methods.get(method) else {
            return Err(CallError::UnknownMethod {
                service: self.display_name().to_string(),
                method: method.to_string(),
            });
        };
        callable(args).await
    }

    /// Returns a handle to `method` that can be called without the instance.
    #[must_use]
    pub fn method(&self, method: &str) -> Option<Method> {
        self.methods.get(method).cloned()
    }

    #[must_use]
    pub fn has_method(&self, method: &str) -> bool {
        self.methods.contains_key(method)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Recovers the typed state attached by the constructor, if any.
    #[must_use]
    pub fn state<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.state
            .as_ref()
            .and_then(|state| Arc::clone(state).downcast::<T>().ok())
    }

    #[must_use]
    pub fn initialize_hook(&self) -> Option<Hook> {
        self.initialize.clone()
    }

    #[must_use]
    pub fn teardown_hook(&self) -> Option<Hook> {
        self.teardown.clone()
    }
}

impl fmt::Debug for ServiceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceInstance")
            .field("name", &self.name)
            .field("sandbox", &self.sandbox)
            .field("realm", &self.realm)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Resolved view of the services visible from a realm, keyed by name.
///
/// Built once per resolution; callers only read it.
#[derive(Debug, Clone, Default)]
pub struct ServiceMap {
    entries: BTreeMap<String, Arc<ServiceInstance>>,
}

impl ServiceMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `service` under `name` unless the name is already taken.
    /// Returns `false` when an earlier entry shadows the new one.
    pub fn insert_if_absent(&mut self, name: &str, service: &Arc<ServiceInstance>) -> bool {
        if self.entries.contains_key(name) {
            return false;
        }
        self.entries.insert(name.to_string(), Arc::clone(service));
        true
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ServiceInstance>> {
        self.entries.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<ServiceInstance>)> {
        self.entries.iter().map(|(name, svc)| (name.as_str(), svc))
    }
}
