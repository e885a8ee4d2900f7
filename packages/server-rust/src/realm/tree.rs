//! Arena of realm nodes mirroring plugin nesting.
//!
//! The host creates and removes realms; registration only ever writes the
//! service tables of an existing node. Nodes are addressed by [`RealmId`]
//! and never move, so ids stay valid until their realm is removed.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use plexus_core::{RealmId, RegistrationError, ServiceInstance, ServiceMap, Value};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// RealmNode
// ---------------------------------------------------------------------------

pub(crate) struct RealmNode {
    pub(crate) parent: Option<RealmId>,
    pub(crate) children: Vec<RealmId>,
    pub(crate) plugin: Option<String>,
    pub(crate) options: Value,
    /// Every service registered here, in registration order.
    pub(crate) registered: Vec<Arc<ServiceInstance>>,
    /// Named subset of `registered`.
    pub(crate) by_name: HashMap<String, Arc<ServiceInstance>>,
}

impl RealmNode {
    fn new(parent: Option<RealmId>, plugin: Option<String>, options: Value) -> Self {
        Self {
            parent,
            children: Vec::new(),
            plugin,
            options,
            registered: Vec::new(),
            by_name: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Nodes (lock-free view used under a single guard)
// ---------------------------------------------------------------------------

/// Slot storage for realm nodes. Removed realms leave an empty slot.
pub(crate) struct Nodes(Vec<Option<RealmNode>>);

impl Nodes {
    pub(crate) fn get(&self, id: RealmId) -> Option<&RealmNode> {
        self.0.get(id.0).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: RealmId) -> Option<&mut RealmNode> {
        self.0.get_mut(id.0).and_then(Option::as_mut)
    }

    pub(crate) fn require(&self, id: RealmId) -> Result<&RealmNode, RegistrationError> {
        self.get(id).ok_or(RegistrationError::UnknownRealm(id))
    }

    /// Ancestors of `id`, nearest first.
    pub(crate) fn ancestors(&self, id: RealmId) -> Vec<RealmId> {
        let mut out = Vec::new();
        let mut current = self.get(id).and_then(|node| node.parent);
        while let Some(parent) = current {
            out.push(parent);
            current = self.get(parent).and_then(|node| node.parent);
        }
        out
    }

    /// Descendants of `id` in breadth-first order, excluding `id` itself.
    pub(crate) fn descendants(&self, id: RealmId) -> Vec<RealmId> {
        let mut out = Vec::new();
        let mut queue: VecDeque<RealmId> = self
            .get(id)
            .map(|node| node.children.iter().copied().collect())
            .unwrap_or_default();
        while let Some(next) = queue.pop_front() {
            if let Some(node) = self.get(next) {
                out.push(next);
                queue.extend(node.children.iter().copied());
            }
        }
        out
    }

    /// Depth-first pre-order walk from `id`, including `id`.
    fn preorder(&self, id: RealmId) -> Vec<RealmId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.get(next) {
                out.push(next);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    pub(crate) fn with_plugin(&self, plugin: &str) -> Vec<RealmId> {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| {
                slot.as_ref()
                    .filter(|node| node.plugin.as_deref() == Some(plugin))
                    .map(|_| RealmId(idx))
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// RealmTree
// ---------------------------------------------------------------------------

/// Host-owned tree of realms and the services registered on each.
///
/// Registration happens during setup; afterwards the tables are only read.
/// The `RwLock` makes the arena shareable across tasks and is never held
/// across an `.await`.
pub struct RealmTree {
    pub(crate) nodes: RwLock<Nodes>,
    root: RealmId,
}

impl RealmTree {
    /// Creates a tree holding only the root realm.
    #[must_use]
    pub fn new(root_options: Value) -> Self {
        Self {
            nodes: RwLock::new(Nodes(vec![Some(RealmNode::new(None, None, root_options))])),
            root: RealmId(0),
        }
    }

    #[must_use]
    pub fn root(&self) -> RealmId {
        self.root
    }

    /// Adds a plugin realm under `parent`.
    ///
    /// Ids are allocated by appending, never by reusing the slot of a
    /// removed realm, so a stale `RealmId` can never address a newer realm.
    /// The arena grows by one slot per plugin realm ever created.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRealm` if `parent` does not exist.
    pub fn create_child(
        &self,
        parent: RealmId,
        plugin: impl Into<String>,
        options: Value,
    ) -> Result<RealmId, RegistrationError> {
        let plugin = plugin.into();
        let mut nodes = self.nodes.write();
        nodes.require(parent)?;

        let id = RealmId(nodes.0.len());
        nodes.0.push(Some(RealmNode::new(Some(parent), Some(plugin.clone()), options)));
        if let Some(parent_node) = nodes.get_mut(parent) {
            parent_node.children.push(id);
        }

        debug!(%parent, realm = %id, plugin = %plugin, "realm created");
        Ok(id)
    }

    /// Removes `id` and its whole subtree, returning how many realms were
    /// removed. The root realm lives as long as the tree and is never
    /// removed. Removed slots stay empty; their ids resolve to
    /// `UnknownRealm` from then on.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRealm` if `id` does not exist.
    pub fn remove(&self, id: RealmId) -> Result<usize, RegistrationError> {
        let mut nodes = self.nodes.write();
        let parent = nodes.require(id)?.parent;
        let Some(parent) = parent else {
            warn!(realm = %id, "refusing to remove the root realm");
            return Ok(0);
        };

        let doomed = nodes.preorder(id);
        for realm in &doomed {
            nodes.0[realm.0] = None;
        }
        if let Some(parent_node) = nodes.get_mut(parent) {
            parent_node.children.retain(|child| *child != id);
        }

        debug!(realm = %id, removed = doomed.len(), "realm removed");
        Ok(doomed.len())
    }

    #[must_use]
    pub fn contains(&self, id: RealmId) -> bool {
        self.nodes.read().get(id).is_some()
    }

    #[must_use]
    pub fn parent(&self, id: RealmId) -> Option<RealmId> {
        self.nodes.read().get(id).and_then(|node| node.parent)
    }

    #[must_use]
    pub fn children(&self, id: RealmId) -> Vec<RealmId> {
        self.nodes
            .read()
            .get(id)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    /// Ancestors of `id`, nearest first.
    #[must_use]
    pub fn ancestors(&self, id: RealmId) -> Vec<RealmId> {
        self.nodes.read().ancestors(id)
    }

    /// Descendants of `id`, breadth-first.
    #[must_use]
    pub fn descendants(&self, id: RealmId) -> Vec<RealmId> {
        self.nodes.read().descendants(id)
    }

    #[must_use]
    pub fn plugin(&self, id: RealmId) -> Option<String> {
        self.nodes.read().get(id).and_then(|node| node.plugin.clone())
    }

    #[must_use]
    pub fn options(&self, id: RealmId) -> Option<Value> {
        self.nodes.read().get(id).map(|node| node.options.clone())
    }

    /// Realms registered under the plugin name `plugin`.
    #[must_use]
    pub fn realms_for_plugin(&self, plugin: &str) -> Vec<RealmId> {
        self.nodes.read().with_plugin(plugin)
    }

    /// Inserts a batch of instances into `realm`.
    ///
    /// Either every instance is inserted or none is: names are checked
    /// against the realm and against the rest of the batch before anything
    /// is written.
    ///
    /// # Errors
    ///
    /// `UnknownRealm` for a missing realm, `DuplicateName` on a collision.
    pub fn insert(
        &self,
        realm: RealmId,
        instances: Vec<Arc<ServiceInstance>>,
    ) -> Result<(), RegistrationError> {
        let mut nodes = self.nodes.write();
        let node = nodes
            .get_mut(realm)
            .ok_or(RegistrationError::UnknownRealm(realm))?;

        let mut batch_names = std::collections::HashSet::new();
        for instance in &instances {
            if let Some(name) = instance.name() {
                if node.by_name.contains_key(name) || !batch_names.insert(name) {
                    return Err(RegistrationError::DuplicateName {
                        name: name.to_string(),
                        realm,
                    });
                }
            }
        }

        for instance in instances {
            if let Some(name) = instance.name() {
                node.by_name.insert(name.to_string(), Arc::clone(&instance));
            }
            node.registered.push(instance);
        }
        Ok(())
    }

    /// Services registered directly on `realm`, in registration order,
    /// including anonymous ones.
    #[must_use]
    pub fn registered(&self, realm: RealmId) -> Vec<Arc<ServiceInstance>> {
        self.nodes
            .read()
            .get(realm)
            .map(|node| node.registered.clone())
            .unwrap_or_default()
    }

    /// Named services registered directly on `realm`, sandboxed included.
    #[must_use]
    pub fn local(&self, realm: RealmId) -> ServiceMap {
        let nodes = self.nodes.read();
        let mut map = ServiceMap::new();
        if let Some(node) = nodes.get(realm) {
            for (name, instance) in &node.by_name {
                map.insert_if_absent(name, instance);
            }
        }
        map
    }

    /// Every registered service in the tree: realms depth-first from the
    /// root, registration order within each realm.
    #[must_use]
    pub fn all_registered(&self) -> Vec<Arc<ServiceInstance>> {
        let nodes = self.nodes.read();
        nodes
            .preorder(self.root)
            .into_iter()
            .filter_map(|id| nodes.get(id))
            .flat_map(|node| node.registered.iter().cloned())
            .collect()
    }
}

impl fmt::Debug for RealmTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.nodes.read();
        f.debug_struct("RealmTree")
            .field("root", &self.root)
            .field("realms", &nodes.0.iter().filter(|slot| slot.is_some()).count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
