//! Caching decorator: swaps the methods named in a service's caching spec
//! for memoized entry points.

use std::sync::Arc;

use plexus_core::{CachePrimitive, MemoizeSpec, RealmId, RegistrationError, ServiceDefinition};
use tracing::debug;

/// Applies the definition's caching spec, if any, in place.
///
/// Keys are scoped to the owning realm (`"realm#N/{service}.{method}"`), so
/// equally named services in different realms never share entries. Realm
/// ids are not reused, so a removed realm's entries cannot leak into a
/// later one.
///
/// Every entry is validated before any method is replaced, so a failure
/// leaves the definition unchanged.
///
/// # Errors
///
/// `MissingName` for an unnamed service with a caching spec,
/// `UnknownCachedMethod` for an entry naming no method, and
/// `UnknownCachePolicy` from the primitive.
pub fn decorate(
    definition: &mut ServiceDefinition,
    realm: RealmId,
    cache: &dyn CachePrimitive,
) -> Result<(), RegistrationError> {
    let Some(spec) = definition.caching.as_ref() else {
        return Ok(());
    };
    let service = definition.name.clone().ok_or(RegistrationError::MissingName)?;

    if let Some((method, _)) = spec
        .iter()
        .find(|(method, _)| !definition.methods.contains_key(*method))
    {
        return Err(RegistrationError::UnknownCachedMethod {
            service,
            method: method.to_string(),
        });
    }

    let mut memoized = Vec::with_capacity(spec.len());
    for (method, options) in spec.iter() {
        let Some(generate) = definition.methods.get(method) else {
            continue;
        };
        let entry = cache.memoize(MemoizeSpec {
            namespace: format!("{realm}/{service}.{method}"),
            generate_key: options.key_generator(),
            generate: Arc::clone(generate),
            generate_timeout: options.generate_timeout,
            expires_in: options.expires_in,
            policy: options.cache.clone(),
        })?;
        memoized.push((method.to_string(), entry));
    }

    for (method, entry) in memoized {
        debug!(%realm, service = %service, method = %method, "method memoized");
        definition.methods.insert(method, entry);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use plexus_core::{sync_method, CacheOptions, CachingSpec, Value};
    use serde_json::json;

    use super::*;
    use crate::cache::{CachePolicy, Memoizer, MemoryStore};

    fn memoizer() -> Memoizer {
        Memoizer::new(CachePolicy::new(
            Arc::new(MemoryStore::new(16)),
            Duration::from_secs(60),
        ))
    }

    fn counted_definition(calls: &Arc<AtomicU32>, cached: &str) -> ServiceDefinition {
        let counter = Arc::clone(calls);
        let mut definition = ServiceDefinition::empty();
        definition.name = Some("users".to_string());
        definition.methods.insert(
            "find".to_string(),
            sync_method(move |args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "id": args.first().cloned().unwrap_or(Value::Null) }))
            }),
        );
        definition.caching = Some(
            CachingSpec::new().method(cached, CacheOptions::new(Duration::from_millis(100))),
        );
        definition
    }

    #[tokio::test]
    async fn cached_method_is_replaced() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut definition = counted_definition(&calls, "find");
        decorate(&mut definition, RealmId(0), &memoizer()).unwrap();

        let find = definition.methods["find"].clone();
        find(vec![json!(7)]).await.unwrap();
        let second = find(vec![json!(7)]).await.unwrap();

        assert_eq!(second, json!({ "id": 7 }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn same_service_in_two_realms_keeps_separate_entries() {
        let memo = memoizer();
        let left_calls = Arc::new(AtomicU32::new(0));
        let right_calls = Arc::new(AtomicU32::new(0));
        let mut left = counted_definition(&left_calls, "find");
        let mut right = counted_definition(&right_calls, "find");
        decorate(&mut left, RealmId(1), &memo).unwrap();
        decorate(&mut right, RealmId(2), &memo).unwrap();

        left.methods["find"](vec![json!(1)]).await.unwrap();
        right.methods["find"](vec![json!(1)]).await.unwrap();

        assert_eq!(left_calls.load(Ordering::SeqCst), 1);
        assert_eq!(right_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unnamed_service_cannot_cache() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut definition = counted_definition(&calls, "find");
        definition.name = None;
        let err = decorate(&mut definition, RealmId(0), &memoizer()).unwrap_err();
        assert!(matches!(err, RegistrationError::MissingName));
    }

    #[test]
    fn unknown_method_rejected() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut definition = counted_definition(&calls, "list");
        let err = decorate(&mut definition, RealmId(0), &memoizer()).unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::UnknownCachedMethod { ref service, ref method }
                if service == "users" && method == "list"
        ));
    }

    #[test]
    fn unknown_policy_leaves_methods_untouched() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut definition = counted_definition(&calls, "find");
        let original = Arc::clone(&definition.methods["find"]);
        definition.caching = Some(CachingSpec::new().method(
            "find",
            CacheOptions::new(Duration::from_millis(10)).cache("missing"),
        ));

        let err = decorate(&mut definition, RealmId(0), &memoizer()).unwrap_err();
        assert!(matches!(err, RegistrationError::UnknownCachePolicy(_)));
        assert!(Arc::ptr_eq(&original, &definition.methods["find"]));
    }

    #[test]
    fn no_spec_is_a_no_op() {
        let mut definition = ServiceDefinition::empty();
        decorate(&mut definition, RealmId(0), &memoizer()).unwrap();
        assert!(definition.methods.is_empty());
    }
}
