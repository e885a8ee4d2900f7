//! Host layer: owns the realm tree, the cache primitive and the lifecycle.

use std::sync::Arc;

use arc_swap::ArcSwap;
use plexus_core::{CachePrimitive, RealmId, RegistrationError, Selector, ServiceMap, Value};
use tracing::{info, info_span, warn, Instrument};

use crate::cache::Memoizer;
use crate::realm::RealmTree;
use crate::service::config::ServerConfig;
use crate::service::registry::Realm;

// ---------------------------------------------------------------------------
// LifecyclePhase
// ---------------------------------------------------------------------------

/// Server lifecycle state.
///
/// State machine: Setup -> Starting -> Started -> Stopping -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Services are being registered; nothing has been initialized.
    Setup,
    /// `initialize` hooks are running.
    Starting,
    Started,
    /// `teardown` hooks are running.
    Stopping,
    Stopped,
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {operation} while the server is {phase:?}")]
    InvalidPhase {
        operation: &'static str,
        phase: LifecyclePhase,
    },
    #[error("initialize hook of service {service} failed")]
    Initialize {
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("teardown hook of service {service} failed")]
    Teardown {
        service: String,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Owns the realm tree and drives service lifecycle hooks.
pub struct Server {
    config: Arc<ServerConfig>,
    tree: Arc<RealmTree>,
    cache: Arc<dyn CachePrimitive>,
    phase: Arc<ArcSwap<LifecyclePhase>>,
}

impl Server {
    /// Creates a server whose cache primitive is a [`Memoizer`] built from
    /// `config.cache`.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let cache = Arc::new(Memoizer::from_config(&config.cache));
        Self::with_cache(config, cache)
    }

    /// Creates a server backed by a caller-provided cache primitive.
    #[must_use]
    pub fn with_cache(config: ServerConfig, cache: Arc<dyn CachePrimitive>) -> Self {
        let tree = Arc::new(RealmTree::new(config.root_options.clone()));
        Self {
            config: Arc::new(config),
            tree,
            cache,
            phase: Arc::new(ArcSwap::from_pointee(LifecyclePhase::Setup)),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn tree(&self) -> &Arc<RealmTree> {
        &self.tree
    }

    #[must_use]
    pub fn phase(&self) -> LifecyclePhase {
        **self.phase.load()
    }

    /// Handle to the root realm.
    #[must_use]
    pub fn root(&self) -> Realm {
        self.handle(self.tree.root())
    }

    /// Handle to an existing realm, `None` if it does not exist.
    #[must_use]
    pub fn realm(&self, id: RealmId) -> Option<Realm> {
        self.tree.contains(id).then(|| self.handle(id))
    }

    /// Creates a plugin realm under `parent`.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRealm` if `parent` does not exist.
    pub fn register_plugin(
        &self,
        parent: RealmId,
        name: impl Into<String>,
        options: Value,
    ) -> Result<Realm, RegistrationError> {
        let id = self.tree.create_child(parent, name, options)?;
        Ok(self.handle(id))
    }

    /// Removes a plugin realm and its subtree. Services registered there
    /// disappear from every view; their teardown hooks are not run.
    ///
    /// # Errors
    ///
    /// Returns `UnknownRealm` if `id` does not exist.
    pub fn remove_realm(&self, id: RealmId) -> Result<usize, RegistrationError> {
        self.tree.remove(id)
    }

    /// Services visible from the root realm under `selector`.
    ///
    /// # Errors
    ///
    /// Any resolution error, e.g. `UnknownNamespace`.
    pub fn services(&self, selector: impl Into<Selector>) -> Result<ServiceMap, RegistrationError> {
        self.tree.resolve(self.tree.root(), &selector.into())
    }

    /// Runs every `initialize` hook: realms depth-first from the root,
    /// registration order within a realm. The first failure aborts startup
    /// and returns the server to `Setup`.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless the server is in `Setup`; `Initialize` for the
    /// first failing hook.
    pub async fn start(&self) -> Result<(), LifecycleError> {
        self.transition("start", LifecyclePhase::Setup, LifecyclePhase::Starting)?;
        let span = info_span!("server_start", node_id = %self.config.node_id);

        async {
            for service in self.tree.all_registered() {
                let Some(hook) = service.initialize_hook() else {
                    continue;
                };
                if let Err(source) = hook().await {
                    self.phase.store(Arc::new(LifecyclePhase::Setup));
                    return Err(LifecycleError::Initialize {
                        service: service.display_name().to_string(),
                        source,
                    });
                }
            }
            self.phase.store(Arc::new(LifecyclePhase::Started));
            info!("server started");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Runs every `teardown` hook in the reverse of startup order. Every
    /// hook runs even if an earlier one fails; the first failure is
    /// returned.
    ///
    /// # Errors
    ///
    /// `InvalidPhase` unless the server is `Started`; `Teardown` for the
    /// first failing hook.
    pub async fn stop(&self) -> Result<(), LifecycleError> {
        self.transition("stop", LifecyclePhase::Started, LifecyclePhase::Stopping)?;
        let span = info_span!("server_stop", node_id = %self.config.node_id);

        async {
            let mut first_error = None;
            for service in self.tree.all_registered().into_iter().rev() {
                let Some(hook) = service.teardown_hook() else {
                    continue;
                };
                if let Err(source) = hook().await {
                    warn!(service = service.display_name(), error = %source, "teardown failed");
                    first_error.get_or_insert(LifecycleError::Teardown {
                        service: service.display_name().to_string(),
                        source,
                    });
                }
            }
            self.phase.store(Arc::new(LifecyclePhase::Stopped));
            info!("server stopped");
            first_error.map_or(Ok(()), Err)
        }
        .instrument(span)
        .await
    }

    fn transition(
        &self,
        operation: &'static str,
        from: LifecyclePhase,
        to: LifecyclePhase,
    ) -> Result<(), LifecycleError> {
        let current = self.phase.load_full();
        if *current != from {
            return Err(LifecycleError::InvalidPhase {
                operation,
                phase: *current,
            });
        }
        let previous = self.phase.compare_and_swap(&current, Arc::new(to));
        if Arc::ptr_eq(&*previous, &current) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidPhase {
                operation,
                phase: **previous,
            })
        }
    }

    fn handle(&self, id: RealmId) -> Realm {
        Realm::new(
            id,
            Arc::clone(&self.tree),
            Arc::clone(&self.cache),
            Arc::clone(&self.phase),
        )
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("node_id", &self.config.node_id)
            .field("phase", &self.phase())
            .field("tree", &self.tree)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use plexus_core::{hook, ServiceObject};

    use super::*;

    type Log = Arc<Mutex<Vec<String>>>;

    fn tracked(name: &str, log: &Log) -> ServiceObject {
        let init_log = Arc::clone(log);
        let teardown_log = Arc::clone(log);
        let init_name = name.to_string();
        let teardown_name = name.to_string();
        ServiceObject::new()
            .name(name)
            .initialize(hook(move || {
                let log = Arc::clone(&init_log);
                let name = init_name.clone();
                async move {
                    log.lock().push(format!("init:{name}"));
                    Ok(())
                }
            }))
            .teardown(hook(move || {
                let log = Arc::clone(&teardown_log);
                let name = teardown_name.clone();
                async move {
                    log.lock().push(format!("teardown:{name}"));
                    Ok(())
                }
            }))
    }

    #[tokio::test]
    async fn hooks_run_depth_first_then_reverse() {
        let log: Log = Arc::default();
        let server = Server::new(ServerConfig::default());
        let root = server.root();
        root.register(tracked("a", &log)).unwrap();
        let child = root.register_plugin("child", Value::Null).unwrap();
        child.register(tracked("c", &log)).unwrap();
        root.register(tracked("b", &log)).unwrap();
        let sibling = server
            .register_plugin(root.id(), "sibling", Value::Null)
            .unwrap();
        sibling.register(tracked("d", &log)).unwrap();

        server.start().await.unwrap();
        assert_eq!(server.phase(), LifecyclePhase::Started);
        server.stop().await.unwrap();
        assert_eq!(server.phase(), LifecyclePhase::Stopped);

        assert_eq!(
            *log.lock(),
            vec![
                "init:a", "init:b", "init:c", "init:d", "teardown:d", "teardown:c", "teardown:b",
                "teardown:a",
            ]
        );
    }

    #[tokio::test]
    async fn failing_initialize_aborts_start() {
        let log: Log = Arc::default();
        let server = Server::new(ServerConfig::default());
        let root = server.root();
        root.register(
            ServiceObject::new()
                .name("flaky")
                .initialize(hook(|| async { Err::<(), _>(anyhow::anyhow!("no connection")) })),
        )
        .unwrap();
        root.register(tracked("later", &log)).unwrap();

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Initialize { ref service, .. } if service == "flaky"));
        assert!(log.lock().is_empty());
        assert_eq!(server.phase(), LifecyclePhase::Setup);
    }

    #[tokio::test]
    async fn stop_runs_every_teardown_and_reports_first_failure() {
        let log: Log = Arc::default();
        let server = Server::new(ServerConfig::default());
        let root = server.root();
        root.register(tracked("first", &log)).unwrap();
        root.register(
            ServiceObject::new()
                .name("broken")
                .teardown(hook(|| async { Err::<(), _>(anyhow::anyhow!("stuck")) })),
        )
        .unwrap();

        server.start().await.unwrap();
        let err = server.stop().await.unwrap_err();
        assert!(matches!(err, LifecycleError::Teardown { ref service, .. } if service == "broken"));
        assert_eq!(*log.lock(), vec!["init:first", "teardown:first"]);
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let server = Server::new(ServerConfig::default());
        server.start().await.unwrap();
        assert!(matches!(
            server.start().await,
            Err(LifecycleError::InvalidPhase { operation: "start", phase: LifecyclePhase::Started })
        ));
    }

    #[tokio::test]
    async fn stop_before_start_is_rejected() {
        let server = Server::new(ServerConfig::default());
        assert!(matches!(
            server.stop().await,
            Err(LifecycleError::InvalidPhase { operation: "stop", .. })
        ));
    }

    #[test]
    fn removed_realm_handle_is_gone() {
        let server = Server::new(ServerConfig::default());
        let plugin = server
            .register_plugin(server.root().id(), "temp", Value::Null)
            .unwrap();
        plugin.register(ServiceObject::new().name("tmp")).unwrap();
        assert!(server.services(Selector::Local).unwrap().contains("tmp"));

        assert_eq!(server.remove_realm(plugin.id()).unwrap(), 1);
        assert!(server.realm(plugin.id()).is_none());
        assert!(!server.services(Selector::Local).unwrap().contains("tmp"));
    }

    #[test]
    fn root_options_reach_root_context() {
        let config = ServerConfig {
            root_options: serde_json::json!({ "env": "test" }),
            ..ServerConfig::default()
        };
        let server = Server::new(config);
        let ctx = server.root().context().unwrap();
        assert_eq!(ctx.options()["env"], serde_json::json!("test"));
        assert!(ctx.plugin().is_none());
    }
}
