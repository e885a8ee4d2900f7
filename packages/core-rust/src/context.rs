use std::fmt;
use std::sync::Weak;

use crate::error::RegistrationError;
use crate::instance::ServiceMap;
use crate::traits::ServiceLocator;
use crate::types::{RealmId, Value};

/// Which slice of the realm tree a resolution covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selector {
    /// The requesting realm's own view.
    #[default]
    Local,
    /// Every non-sandboxed service in the tree.
    Root,
    /// The view of the unique realm registered under this plugin name.
    Namespace(String),
}

impl From<bool> for Selector {
    fn from(root: bool) -> Self {
        if root {
            Selector::Root
        } else {
            Selector::Local
        }
    }
}

impl From<&str> for Selector {
    fn from(namespace: &str) -> Self {
        Selector::Namespace(namespace.to_string())
    }
}

impl From<String> for Selector {
    fn from(namespace: String) -> Self {
        Selector::Namespace(namespace)
    }
}

/// Per-realm context handed to class constructors and factories.
///
/// Carries the realm's identity, the plugin's options, and a weak handle to
/// the realm tree so services can look up their peers without keeping the
/// tree alive.
#[derive(Clone)]
pub struct RealmContext {
    realm: RealmId,
    plugin: Option<String>,
    options: Value,
    locator: Weak<dyn ServiceLocator>,
}

impl RealmContext {
    #[must_use]
    pub fn new(
        realm: RealmId,
        plugin: Option<String>,
        options: Value,
        locator: Weak<dyn ServiceLocator>,
    ) -> Self {
        Self {
            realm,
            plugin,
            options,
            locator,
        }
    }

    #[must_use]
    pub fn realm(&self) -> RealmId {
        self.realm
    }

    /// Plugin name of the realm; `None` for the root realm.
    #[must_use]
    pub fn plugin(&self) -> Option<&str> {
        self.plugin.as_deref()
    }

    /// Options the plugin was registered with.
    #[must_use]
    pub fn options(&self) -> &Value {
        &self.options
    }

    /// Resolves services as seen from this realm.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRealm` once the realm tree has been dropped, or any
    /// resolution error (e.g. `UnknownNamespace`).
    pub fn services(&self, selector: impl Into<Selector>) -> Result<ServiceMap, RegistrationError> {
        let locator = self
            .locator
            .upgrade()
            .ok_or(RegistrationError::UnknownRealm(self.realm))?;
        locator.services(self.realm, &selector.into())
    }
}

impl fmt::Debug for RealmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealmContext")
            .field("realm", &self.realm)
            .field("plugin", &self.plugin)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
