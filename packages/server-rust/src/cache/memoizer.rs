//! Single-flight memoization of service methods.
//!
//! [`Memoizer`] is the in-process implementation of the cache primitive
//! contract. For each call it:
//! 1. derives the key (`"{namespace}:{argument key}"`);
//! 2. serves a stored value when one is present;
//! 3. otherwise joins the in-flight generation for that key, starting one
//!    in a spawned task if none is running;
//! 4. waits at most `generate_timeout` for the outcome.
//!
//! A generation that outlives its waiters keeps running and stores its value
//! for later callers. Failures are shared with every waiter but never stored.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use plexus_core::{
    CachePrimitive, CallError, KeyGenerator, MemoizeSpec, Method, MethodResult, RegistrationError,
    Value,
};
use tokio::sync::watch;
use tracing::{debug, debug_span, warn, Instrument};

use super::store::{CacheStore, MemoryStore};
use crate::service::config::CacheConfig;

type Outcome = Option<MethodResult>;
type InFlight = DashMap<String, watch::Receiver<Outcome>>;

// ---------------------------------------------------------------------------
// CachePolicy
// ---------------------------------------------------------------------------

/// A store plus the expiry applied when a method does not set its own.
#[derive(Clone)]
pub struct CachePolicy {
    pub store: Arc<dyn CacheStore>,
    pub default_expires_in: Duration,
}

impl CachePolicy {
    #[must_use]
    pub fn new(store: Arc<dyn CacheStore>, default_expires_in: Duration) -> Self {
        Self {
            store,
            default_expires_in,
        }
    }
}

// ---------------------------------------------------------------------------
// Memoizer
// ---------------------------------------------------------------------------

/// In-process cache primitive: named policies plus a shared in-flight table.
pub struct Memoizer {
    default_policy: CachePolicy,
    policies: HashMap<String, CachePolicy>,
    in_flight: Arc<InFlight>,
}

impl Memoizer {
    #[must_use]
    pub fn new(default_policy: CachePolicy) -> Self {
        Self {
            default_policy,
            policies: HashMap::new(),
            in_flight: Arc::new(DashMap::new()),
        }
    }

    /// Builds the default policy and every named policy from configuration,
    /// each backed by its own [`MemoryStore`].
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let default_expires_in = Duration::from_millis(config.default_expires_in_ms);
        let mut memoizer = Self::new(CachePolicy::new(
            Arc::new(MemoryStore::new(config.capacity)),
            default_expires_in,
        ));
        for (name, policy) in &config.policies {
            let expires_in = policy
                .expires_in_ms
                .map_or(default_expires_in, Duration::from_millis);
            memoizer.add_policy(
                name.clone(),
                CachePolicy::new(Arc::new(MemoryStore::new(policy.capacity)), expires_in),
            );
        }
        memoizer
    }

    /// Registers (or replaces) a named policy.
    pub fn add_policy(&mut self, name: impl Into<String>, policy: CachePolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Number of generations currently running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    fn policy(&self, name: Option<&str>) -> Result<&CachePolicy, RegistrationError> {
        match name {
            None => Ok(&self.default_policy),
            Some(name) => self
                .policies
                .get(name)
                .ok_or_else(|| RegistrationError::UnknownCachePolicy(name.to_string())),
        }
    }
}

impl CachePrimitive for Memoizer {
    fn memoize(&self, spec: MemoizeSpec) -> Result<Method, RegistrationError> {
        let policy = self.policy(spec.policy.as_deref())?;
        let entry = Arc::new(MemoizedMethod {
            namespace: spec.namespace,
            generate: spec.generate,
            generate_key: spec.generate_key,
            generate_timeout: spec.generate_timeout,
            expires_in: spec.expires_in.unwrap_or(policy.default_expires_in),
            store: Arc::clone(&policy.store),
            in_flight: Arc::clone(&self.in_flight),
        });

        debug!(
            namespace = %entry.namespace,
            policy = spec.policy.as_deref().unwrap_or("default"),
            "memoized method registered"
        );

        Ok(Arc::new(move |args| {
            let entry = Arc::clone(&entry);
            Box::pin(async move { entry.call(args).await })
        }))
    }
}

impl fmt::Debug for Memoizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memoizer")
            .field("policies", &self.policies.keys().collect::<Vec<_>>())
            .field("in_flight", &self.in_flight.len())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// MemoizedMethod
// ---------------------------------------------------------------------------

struct MemoizedMethod {
    namespace: String,
    generate: Method,
    generate_key: KeyGenerator,
    generate_timeout: Duration,
    expires_in: Duration,
    store: Arc<dyn CacheStore>,
    in_flight: Arc<InFlight>,
}

impl MemoizedMethod {
    async fn call(&self, args: Vec<Value>) -> MethodResult {
        let Some(arg_key) = (self.generate_key)(&args) else {
            debug!(namespace = %self.namespace, "arguments not keyable, calling through");
            return (self.generate)(args).await;
        };
        let key = format!("{}:{}", self.namespace, arg_key);

        if let Some(value) = self.store.get(&key).await {
            debug!(%key, "cache hit");
            return Ok(value);
        }

        let mut outcome = self.join_or_generate(&key, args);

        #[allow(clippy::cast_possible_truncation)]
        let timeout_ms = self.generate_timeout.as_millis() as u64;
        let result = match tokio::time::timeout(self.generate_timeout, outcome.wait_for(Option::is_some)).await {
            Ok(Ok(ready)) => {
                let ready: Outcome = Option::clone(&ready);
                ready.unwrap_or(Err(CallError::GenerationAborted { key }))
            }
            Ok(Err(_closed)) => Err(CallError::GenerationAborted { key }),
            Err(_elapsed) => {
                warn!(%key, timeout_ms, "generation timed out, waiter gives up");
                Err(CallError::GenerateTimeout { key, timeout_ms })
            }
        };
        result
    }

    /// Returns a receiver for the generation of `key`, starting it if no
    /// generation is running.
    fn join_or_generate(&self, key: &str, args: Vec<Value>) -> watch::Receiver<Outcome> {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(running) => {
                debug!(%key, "joining in-flight generation");
                running.get().clone()
            }
            Entry::Vacant(slot) => {
                debug!(%key, "cache miss, generating");
                let (tx, rx) = watch::channel(None);
                slot.insert(rx.clone());

                let guard = InFlightGuard {
                    key: key.to_string(),
                    table: Arc::clone(&self.in_flight),
                };
                let generate = Arc::clone(&self.generate);
                let store = Arc::clone(&self.store);
                let expires_in = self.expires_in;
                let span = debug_span!(
                    "generate",
                    key = %key,
                    duration_ms = tracing::field::Empty,
                    outcome = tracing::field::Empty,
                );

                tokio::spawn(
                    async move {
                        let start = Instant::now();
                        let result = generate(args).await;

                        #[allow(clippy::cast_possible_truncation)]
                        let duration_ms = start.elapsed().as_millis() as u64;
                        tracing::Span::current().record("duration_ms", duration_ms);
                        tracing::Span::current()
                            .record("outcome", if result.is_ok() { "ok" } else { "error" });

                        if let Ok(value) = &result {
                            store.set(&guard.key, value.clone(), expires_in).await;
                        }
                        drop(guard);
                        tx.send_replace(Some(result));
                    }
                    .instrument(span),
                );
                rx
            }
        }
    }
}

/// Removes the in-flight entry when the generation finishes or panics.
struct InFlightGuard {
    key: String,
    table: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
