//! Resolution of the services visible from a realm.
//!
//! A realm's view is built from, in order of precedence:
//! 1. everything registered on the realm itself, sandboxed included;
//! 2. non-sandboxed services of its ancestors, nearest first;
//! 3. non-sandboxed services of its descendants, breadth-first.
//!
//! The first entry for a name wins; later ones are shadowed.

use std::sync::Arc;

use plexus_core::{RealmId, RegistrationError, Selector, ServiceInstance, ServiceLocator, ServiceMap};
use tracing::debug;

use super::tree::{Nodes, RealmTree};

impl RealmTree {
    /// Resolves the services visible from `realm` under `selector`.
    ///
    /// # Errors
    ///
    /// `UnknownRealm` if `realm` does not exist; `UnknownNamespace` if a
    /// namespace selector matches no realm or more than one.
    pub fn resolve(&self, realm: RealmId, selector: &Selector) -> Result<ServiceMap, RegistrationError> {
        let nodes = self.nodes.read();
        nodes.require(realm)?;

        match selector {
            Selector::Local => realm_view(&nodes, realm),
            Selector::Root => Ok(root_view(&nodes, self.root())),
            Selector::Namespace(namespace) => {
                let target = find_namespace(&nodes, namespace)?;
                realm_view(&nodes, target)
            }
        }
    }
}

impl ServiceLocator for RealmTree {
    fn services(&self, realm: RealmId, selector: &Selector) -> Result<ServiceMap, RegistrationError> {
        self.resolve(realm, selector)
    }
}

fn realm_view(nodes: &Nodes, realm: RealmId) -> Result<ServiceMap, RegistrationError> {
    let node = nodes.require(realm)?;
    let mut view = ServiceMap::new();
    for (name, instance) in &node.by_name {
        view.insert_if_absent(name, instance);
    }

    for ancestor in nodes.ancestors(realm) {
        merge_public(&mut view, nodes, ancestor, realm);
    }
    for descendant in nodes.descendants(realm) {
        merge_public(&mut view, nodes, descendant, realm);
    }
    Ok(view)
}

fn root_view(nodes: &Nodes, root: RealmId) -> ServiceMap {
    let mut view = ServiceMap::new();
    merge_public(&mut view, nodes, root, root);
    for descendant in nodes.descendants(root) {
        merge_public(&mut view, nodes, descendant, root);
    }
    view
}

/// Adds the non-sandboxed services of `source` to `view`.
fn merge_public(view: &mut ServiceMap, nodes: &Nodes, source: RealmId, requester: RealmId) {
    let Some(node) = nodes.get(source) else {
        return;
    };
    for (name, instance) in &node.by_name {
        if instance.sandbox().is_sandboxed() {
            continue;
        }
        if !view.insert_if_absent(name, instance) {
            log_shadowed(name, instance, requester);
        }
    }
}

fn log_shadowed(name: &str, instance: &Arc<ServiceInstance>, requester: RealmId) {
    debug!(
        %requester,
        service = name,
        shadowed_from = %instance.realm(),
        "service shadowed by a nearer registration"
    );
}

fn find_namespace(nodes: &Nodes, namespace: &str) -> Result<RealmId, RegistrationError> {
    let matches = nodes.with_plugin(namespace);
    match matches.as_slice() {
        [only] => Ok(*only),
        [] => Err(RegistrationError::UnknownNamespace {
            namespace: namespace.to_string(),
            ambiguous: false,
        }),
        _ => Err(RegistrationError::UnknownNamespace {
            namespace: namespace.to_string(),
            ambiguous: true,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
