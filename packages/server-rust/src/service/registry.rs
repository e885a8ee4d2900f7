use std::fmt;
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;
use plexus_core::{
    normalize, CachePrimitive, Declaration, RealmContext, RealmId, RegistrationError, Selector,
    ServiceInstance, ServiceLocator, ServiceMap, Value,
};
use tracing::{debug, warn};

use super::caching::decorate;
use crate::realm::RealmTree;
use crate::server::LifecyclePhase;

// ---------------------------------------------------------------------------
// Realm
// ---------------------------------------------------------------------------

/// Handle to one realm of the tree: the root or a plugin realm.
///
/// Cloning is cheap; every clone addresses the same realm. Services are
/// registered through the handle in batches that either land whole or not
/// at all.
#[derive(Clone)]
pub struct Realm {
    id: RealmId,
    tree: Arc<RealmTree>,
    cache: Arc<dyn CachePrimitive>,
    phase: Arc<ArcSwap<LifecyclePhase>>,
}

impl Realm {
    pub(crate) fn new(
        id: RealmId,
        tree: Arc<RealmTree>,
        cache: Arc<dyn CachePrimitive>,
        phase: Arc<ArcSwap<LifecyclePhase>>,
    ) -> Self {
        Self {
            id,
            tree,
            cache,
            phase,
        }
    }

    #[must_use]
    pub fn id(&self) -> RealmId {
        self.id
    }

    /// Plugin name of this realm; `None` for the root.
    #[must_use]
    pub fn plugin(&self) -> Option<String> {
        self.tree.plugin(self.id)
    }

    /// Context handed to constructors and factories registered here.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRealm` if the realm has been removed.
    pub fn context(&self) -> Result<RealmContext, RegistrationError> {
        let options = self
            .tree
            .options(self.id)
            .ok_or(RegistrationError::UnknownRealm(self.id))?;
        let tree: Weak<RealmTree> = Arc::downgrade(&self.tree);
        let locator: Weak<dyn ServiceLocator> = tree;
        Ok(RealmContext::new(
            self.id,
            self.tree.plugin(self.id),
            options,
            locator,
        ))
    }

    /// Registers a single declaration.
    ///
    /// # Errors
    ///
    /// See [`Realm::register_all`].
    pub fn register(&self, declaration: impl Into<Declaration>) -> Result<(), RegistrationError> {
        self.register_all([declaration.into()])
    }

    /// Normalizes, decorates and inserts a batch of declarations.
    ///
    /// Nothing is inserted unless every declaration in the batch succeeds.
    ///
    /// # Errors
    ///
    /// Constructor failures, naming errors, caching errors and
    /// `DuplicateName` (against the realm or within the batch).
    pub fn register_all(
        &self,
        declarations: impl IntoIterator<Item = Declaration>,
    ) -> Result<(), RegistrationError> {
        let phase = **self.phase.load();
        if phase != LifecyclePhase::Setup {
            warn!(realm = %self.id, ?phase, "registering services after startup");
        }

        let ctx = self.context()?;
        let instances = declarations
            .into_iter()
            .map(|declaration| {
                let mut definition = normalize(declaration, &ctx)?;
                decorate(&mut definition, self.id, self.cache.as_ref())?;
                Ok(Arc::new(ServiceInstance::new(definition, self.id)))
            })
            .collect::<Result<Vec<_>, RegistrationError>>()?;

        let count = instances.len();
        self.tree.insert(self.id, instances)?;
        debug!(realm = %self.id, count, "services registered");
        Ok(())
    }

    /// Services visible from this realm under `selector`.
    ///
    /// # Errors
    ///
    /// `UnknownRealm` if the realm has been removed, `UnknownNamespace` for
    /// a namespace matching no realm or several.
    pub fn services(&self, selector: impl Into<Selector>) -> Result<ServiceMap, RegistrationError> {
        self.tree.resolve(self.id, &selector.into())
    }

    /// Everything registered directly on this realm, anonymous services
    /// included, in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<Arc<ServiceInstance>> {
        self.tree.registered(self.id)
    }

    /// Creates a child realm for the plugin `name`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRealm` if this realm has been removed.
    pub fn register_plugin(
        &self,
        name: impl Into<String>,
        options: Value,
    ) -> Result<Realm, RegistrationError> {
        let id = self.tree.create_child(self.id, name, options)?;
        Ok(Self {
            id,
            tree: Arc::clone(&self.tree),
            cache: Arc::clone(&self.cache),
            phase: Arc::clone(&self.phase),
        })
    }
}

impl fmt::Debug for Realm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Realm")
            .field("id", &self.id)
            .field("plugin", &self.plugin())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
