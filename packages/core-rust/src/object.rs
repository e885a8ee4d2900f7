//! Plain service objects: the shape every declaration is normalized through.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::caching::CachingSpec;
use crate::error::RegistrationError;
use crate::method::{Hook, Method};
use crate::types::{Sandbox, Value};

/// Explicit name/sandbox overrides applied by [`with_name`](crate::with_name).
///
/// Overrides win over any literal name or sandbox carried by the object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub name: Option<String>,
    pub sandbox: Option<Sandbox>,
}

/// A service built from parts: methods, properties, hooks and optional
/// typed state.
///
/// Objects are what class constructors and factories return and what
/// object declarations carry directly.
#[derive(Clone, Default)]
pub struct ServiceObject {
    pub(crate) name: Option<String>,
    pub(crate) sandbox: Option<Sandbox>,
    pub(crate) overrides: Overrides,
    pub(crate) methods: BTreeMap<String, Method>,
    pub(crate) properties: BTreeMap<String, Value>,
    pub(crate) initialize: Option<Hook>,
    pub(crate) teardown: Option<Hook>,
    pub(crate) caching: Option<CachingSpec>,
    pub(crate) state: Option<Arc<dyn Any + Send + Sync>>,
}

impl ServiceObject {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the literal name field.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the literal sandbox field.
    #[must_use]
    pub fn sandbox(mut self, sandbox: impl Into<Sandbox>) -> Self {
        self.sandbox = Some(sandbox.into());
        self
    }

    #[must_use]
    pub fn method(mut self, name: impl Into<String>, method: Method) -> Self {
        self.methods.insert(name.into(), method);
        self
    }

    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn initialize(mut self, hook: Hook) -> Self {
        self.initialize = Some(hook);
        self
    }

    #[must_use]
    pub fn teardown(mut self, hook: Hook) -> Self {
        self.teardown = Some(hook);
        self
    }

    /// Attaches typed state, later recoverable through
    /// `ServiceInstance::state::<T>()`.
    #[must_use]
    pub fn state<T: Any + Send + Sync>(mut self, state: Arc<T>) -> Self {
        self.state = Some(state);
        self
    }

    /// Configures method caching. May be called once per object.
    ///
    /// # Errors
    ///
    /// Returns `CachingAlreadyConfigured` on any call after the first,
    /// whatever `spec` contains.
    pub fn caching(&mut self, spec: CachingSpec) -> Result<(), RegistrationError> {
        if self.caching.is_some() {
            return Err(RegistrationError::CachingAlreadyConfigured);
        }
        self.caching = Some(spec);
        Ok(())
    }

    /// Builder form of [`caching`](Self::caching).
    ///
    /// # Errors
    ///
    /// Same as [`caching`](Self::caching).
    pub fn with_caching(mut self, spec: CachingSpec) -> Result<Self, RegistrationError> {
        self.caching(spec)?;
        Ok(self)
    }

    #[must_use]
    pub fn literal_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn literal_sandbox(&self) -> Option<Sandbox> {
        self.sandbox
    }

    #[must_use]
    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    #[must_use]
    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    #[must_use]
    pub fn caching_spec(&self) -> Option<&CachingSpec> {
        self.caching.as_ref()
    }
}

impl fmt::Debug for ServiceObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceObject")
            .field("name", &self.name)
            .field("sandbox", &self.sandbox)
            .field("overrides", &self.overrides)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("properties", &self.properties)
            .field("caching", &self.caching)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::caching::CacheOptions;
    use crate::method::sync_method;

    #[test]
    fn builder_collects_parts() {
        let obj = ServiceObject::new()
            .name("users")
            .sandbox(true)
            .method("count", sync_method(|_| Ok(json!(3))))
            .property("table", json!("users"));

        assert_eq!(obj.literal_name(), Some("users"));
        assert_eq!(obj.literal_sandbox(), Some(Sandbox::Plugin));
        assert!(obj.has_method("count"));
        assert!(!obj.has_method("missing"));
        assert_eq!(obj.properties.get("table"), Some(&json!("users")));
    }

    #[test]
    fn caching_is_one_shot() {
        let mut obj = ServiceObject::new().name("users");
        obj.caching(CachingSpec::new()).unwrap();

        let second = CachingSpec::new().method("count", CacheOptions::new(Duration::from_secs(1)));
        let err = obj.caching(second).unwrap_err();
        assert!(matches!(err, RegistrationError::CachingAlreadyConfigured));
        assert!(obj.caching_spec().unwrap().is_empty());
    }

    #[test]
    fn with_caching_builder_rejects_second_call() {
        let obj = ServiceObject::new().with_caching(CachingSpec::new()).unwrap();
        assert!(matches!(
            obj.with_caching(CachingSpec::new()),
            Err(RegistrationError::CachingAlreadyConfigured)
        ));
    }
}
