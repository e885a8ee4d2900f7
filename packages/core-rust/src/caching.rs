//! Caching specifications attached to services.
//!
//! A [`CachingSpec`] maps method names to [`CacheOptions`]. The spec is only
//! a description: the server's caching decorator turns each entry into a
//! memoized entry point at registration time.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::types::Value;

/// Derives the argument-sensitive part of a cache key.
///
/// Returning `None` means the arguments cannot be keyed and the call goes
/// straight to the underlying method.
pub type KeyGenerator = Arc<dyn Fn(&[Value]) -> Option<String> + Send + Sync>;

/// Per-method caching options.
#[derive(Clone)]
pub struct CacheOptions {
    /// How long callers wait for a pending generation before failing.
    pub generate_timeout: Duration,
    /// Lifetime of a generated value. `None` defers to the cache policy.
    pub expires_in: Option<Duration>,
    /// Name of the cache policy (store) to use. `None` selects the default.
    pub cache: Option<String>,
    /// Custom key generator. `None` selects [`default_key`].
    pub generate_key: Option<KeyGenerator>,
}

impl CacheOptions {
    #[must_use]
    pub fn new(generate_timeout: Duration) -> Self {
        Self {
            generate_timeout,
            expires_in: None,
            cache: None,
            generate_key: None,
        }
    }

    #[must_use]
    pub fn expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    #[must_use]
    pub fn cache(mut self, policy: impl Into<String>) -> Self {
        self.cache = Some(policy.into());
        self
    }

    #[must_use]
    pub fn generate_key<F>(mut self, generate_key: F) -> Self
    where
        F: Fn(&[Value]) -> Option<String> + Send + Sync + 'static,
    {
        self.generate_key = Some(Arc::new(generate_key));
        self
    }

    /// Returns the configured key generator, falling back to [`default_key`].
    #[must_use]
    pub fn key_generator(&self) -> KeyGenerator {
        match &self.generate_key {
            Some(generate_key) => Arc::clone(generate_key),
            None => Arc::new(default_key),
        }
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("generate_timeout", &self.generate_timeout)
            .field("expires_in", &self.expires_in)
            .field("cache", &self.cache)
            .field("generate_key", &self.generate_key.is_some())
            .finish()
    }
}

/// Method name -> caching options for one service.
#[derive(Debug, Clone, Default)]
pub struct CachingSpec {
    methods: BTreeMap<String, CacheOptions>,
}

impl CachingSpec {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds (or replaces) the options for `method`.
    #[must_use]
    pub fn method(mut self, method: impl Into<String>, options: CacheOptions) -> Self {
        self.methods.insert(method.into(), options);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CacheOptions)> {
        self.methods.iter().map(|(name, options)| (name.as_str(), options))
    }

    #[must_use]
    pub fn get(&self, method: &str) -> Option<&CacheOptions> {
        self.methods.get(method)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

/// Default key generator: joins the JSON encoding of scalar arguments
/// with `,`.
///
/// Strings are quoted and escaped, so `["a,b"]` and `["a", "b"]` yield
/// different keys, as do `"1"` and `1`. Any argument that is not a string,
/// number or boolean (arrays, objects, null) yields `None`.
#[must_use]
pub fn default_key(args: &[Value]) -> Option<String> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        match arg {
            Value::String(_) | Value::Number(_) | Value::Bool(_) => parts.push(arg.to_string()),
            _ => return None,
        }
    }
    Some(parts.join(","))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn default_key_joins_scalars() {
        let key = default_key(&[json!("alice"), json!(7), json!(true)]);
        assert_eq!(key.as_deref(), Some(r#""alice",7,true"#));
    }

    #[test]
    fn default_key_separator_inside_string_is_distinct() {
        let joined = default_key(&[json!("a,b")]);
        let split = default_key(&[json!("a"), json!("b")]);
        assert_ne!(joined, split);
        assert_eq!(joined.as_deref(), Some(r#""a,b""#));

        let quoted = default_key(&[json!(r#"a","b"#)]);
        assert_ne!(quoted, split);
    }

    #[test]
    fn default_key_distinguishes_scalar_types() {
        assert_ne!(default_key(&[json!("1")]), default_key(&[json!(1)]));
        assert_ne!(default_key(&[json!("true")]), default_key(&[json!(true)]));
        assert_ne!(default_key(&[json!(1)]), default_key(&[json!(1.5)]));
    }

    #[test]
    fn default_key_empty_args() {
        assert_eq!(default_key(&[]).as_deref(), Some(""));
    }

    #[test]
    fn default_key_rejects_non_scalars() {
        assert!(default_key(&[json!({"id": 1})]).is_none());
        assert!(default_key(&[json!("a"), json!([1, 2])]).is_none());
        assert!(default_key(&[Value::Null]).is_none());
    }

    #[test]
    fn custom_key_generator_is_used() {
        let options = CacheOptions::new(Duration::from_millis(100))
            .generate_key(|args| args.first().map(|v| format!("first:{v}")));
        let generate = options.key_generator();
        assert_eq!(generate(&[json!(1), json!(2)]).as_deref(), Some("first:1"));
    }

    #[test]
    fn spec_replaces_duplicate_method() {
        let spec = CachingSpec::new()
            .method("lookup", CacheOptions::new(Duration::from_millis(10)))
            .method("lookup", CacheOptions::new(Duration::from_millis(20)));
        assert_eq!(spec.len(), 1);
        assert_eq!(
            spec.get("lookup").unwrap().generate_timeout,
            Duration::from_millis(20)
        );
    }

    #[test]
    fn options_builder_sets_fields() {
        let options = CacheOptions::new(Duration::from_secs(1))
            .expires_in(Duration::from_secs(60))
            .cache("redis-like");
        assert_eq!(options.expires_in, Some(Duration::from_secs(60)));
        assert_eq!(options.cache.as_deref(), Some("redis-like"));
        assert!(options.generate_key.is_none());
    }
}
