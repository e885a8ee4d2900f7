//! Canonical registration records and the normalizer that produces them.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::caching::CachingSpec;
use crate::context::RealmContext;
use crate::declaration::Declaration;
use crate::error::RegistrationError;
use crate::method::{Hook, Method};
use crate::naming::camelize;
use crate::object::ServiceObject;
use crate::types::{Sandbox, Value};

/// The canonical record every declaration is normalized into.
pub struct ServiceDefinition {
    /// Resolved name; `None` for anonymous services.
    pub name: Option<String>,
    pub sandbox: Sandbox,
    pub caching: Option<CachingSpec>,
    pub methods: BTreeMap<String, Method>,
    pub properties: BTreeMap<String, Value>,
    pub initialize: Option<Hook>,
    pub teardown: Option<Hook>,
    pub state: Option<Arc<dyn Any + Send + Sync>>,
}

impl ServiceDefinition {
    /// An anonymous, server-visible definition with no methods.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            name: None,
            sandbox: Sandbox::default(),
            caching: None,
            methods: BTreeMap::new(),
            properties: BTreeMap::new(),
            initialize: None,
            teardown: None,
            state: None,
        }
    }

    fn from_object(
        object: ServiceObject,
        name: Option<String>,
        sandbox: Sandbox,
    ) -> Result<Self, RegistrationError> {
        if name.as_deref() == Some("") {
            return Err(RegistrationError::EmptyName);
        }
        Ok(Self {
            name,
            sandbox,
            caching: object.caching,
            methods: object.methods,
            properties: object.properties,
            initialize: object.initialize,
            teardown: object.teardown,
            state: object.state,
        })
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("name", &self.name)
            .field("sandbox", &self.sandbox)
            .field("caching", &self.caching)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Normalizes a declaration into a [`ServiceDefinition`] for the realm
/// described by `ctx`.
///
/// Classes and factories are constructed here with the realm's plugin
/// options, so each registering realm gets its own object.
///
/// Name precedence: explicit override, then literal name, then (classes
/// only) the camel-cased class identifier. Sandbox precedence: explicit
/// override, then literal sandbox, then `Server`.
///
/// # Errors
///
/// Constructor failures and `EmptyName` for an empty literal name.
pub fn normalize(
    declaration: Declaration,
    ctx: &RealmContext,
) -> Result<ServiceDefinition, RegistrationError> {
    let kind = declaration.kind();
    let definition = match declaration {
        Declaration::Class(class) => {
            let object = (class.construct)(ctx, ctx.options())?;
            let name = class
                .overrides
                .name
                .clone()
                .or_else(|| object.overrides.name.clone())
                .or_else(|| class.literal_name().map(str::to_string))
                .or_else(|| object.name.clone())
                .unwrap_or_else(|| camelize(class.ident()));
            let sandbox = class
                .overrides
                .sandbox
                .or(object.overrides.sandbox)
                .or(class.literal_sandbox())
                .or(object.sandbox)
                .unwrap_or_default();
            ServiceDefinition::from_object(object, Some(name), sandbox)?
        }
        Declaration::Object(object) => from_plain_object(object)?,
        Declaration::Factory(factory) => from_plain_object((factory.construct)(ctx, ctx.options())?)?,
    };

    debug!(
        realm = %ctx.realm(),
        kind,
        name = definition.name.as_deref().unwrap_or(crate::error::ANONYMOUS),
        sandbox = %definition.sandbox,
        "normalized service declaration"
    );
    Ok(definition)
}

fn from_plain_object(object: ServiceObject) -> Result<ServiceDefinition, RegistrationError> {
    let name = object.overrides.name.clone().or_else(|| object.name.clone());
    let sandbox = object
        .overrides
        .sandbox
        .or(object.sandbox)
        .unwrap_or_default();
    ServiceDefinition::from_object(object, name, sandbox)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::caching::CacheOptions;
    use crate::context::tests::detached_context;
    use crate::declaration::{ClassDeclaration, ServiceClass};
    use crate::method::sync_method;
    use crate::naming::{with_name, NameOptions};

    struct UserStore {
        table: String,
    }

    impl ServiceClass for UserStore {
        fn construct(_ctx: &RealmContext, options: &Value) -> Result<ServiceObject, RegistrationError> {
            let table = options
                .get("table")
                .and_then(Value::as_str)
                .unwrap_or("users")
                .to_string();
            Ok(ServiceObject::new()
                .state(Arc::new(UserStore { table: table.clone() }))
                .property("table", json!(table)))
        }
    }

    struct Literal;

    impl ServiceClass for Literal {
        const NAME: Option<&'static str> = Some("fromConst");
        const SANDBOX: Option<Sandbox> = Some(Sandbox::Plugin);

        fn construct(_ctx: &RealmContext, _options: &Value) -> Result<ServiceObject, RegistrationError> {
            Ok(ServiceObject::new().name("fromObject"))
        }
    }

    struct Broken;

    impl ServiceClass for Broken {
        fn construct(_ctx: &RealmContext, _options: &Value) -> Result<ServiceObject, RegistrationError> {
            Err(anyhow::anyhow!("database unavailable").into())
        }
    }

    #[test]
    fn class_name_derived_from_ident() {
        let ctx = detached_context(json!({ "table": "people" }));
        let def = normalize(Declaration::class::<UserStore>(), &ctx).unwrap();
        assert_eq!(def.name.as_deref(), Some("userStore"));
        assert_eq!(def.sandbox, Sandbox::Server);
        assert_eq!(def.properties.get("table"), Some(&json!("people")));
        let state = def.state.unwrap().downcast::<UserStore>().ok().unwrap();
        assert_eq!(state.table, "people");
    }

    #[test]
    fn class_literal_beats_ident_and_object_literal() {
        let ctx = detached_context(Value::Null);
        let def = normalize(Declaration::class::<Literal>(), &ctx).unwrap();
        assert_eq!(def.name.as_deref(), Some("fromConst"));
        assert_eq!(def.sandbox, Sandbox::Plugin);
    }

    #[test]
    fn override_beats_literal() {
        let ctx = detached_context(Value::Null);
        let decl = with_name(
            "explicit",
            NameOptions::sandbox(Sandbox::Server),
            Declaration::class::<Literal>(),
        )
        .unwrap();
        let def = normalize(decl, &ctx).unwrap();
        assert_eq!(def.name.as_deref(), Some("explicit"));
        assert_eq!(def.sandbox, Sandbox::Server);
    }

    #[test]
    fn object_without_name_stays_anonymous() {
        let ctx = detached_context(Value::Null);
        let def = normalize(ServiceObject::new().into(), &ctx).unwrap();
        assert!(def.name.is_none());
        assert_eq!(def.sandbox, Sandbox::Server);
    }

    #[test]
    fn object_literal_fields_are_read() {
        let ctx = detached_context(Value::Null);
        let object = ServiceObject::new()
            .name("mailer")
            .sandbox(Sandbox::Plugin)
            .method("send", sync_method(|_| Ok(Value::Null)));
        let def = normalize(object.into(), &ctx).unwrap();
        assert_eq!(def.name.as_deref(), Some("mailer"));
        assert_eq!(def.sandbox, Sandbox::Plugin);
        assert!(def.methods.contains_key("send"));
    }

    #[test]
    fn empty_literal_name_rejected() {
        let ctx = detached_context(Value::Null);
        let err = normalize(ServiceObject::new().name("").into(), &ctx).unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyName));
    }

    #[test]
    fn factory_invoked_once_per_normalization() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let decl = Declaration::factory(move |ctx, options| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(ServiceObject::new()
                .property("realm", json!(ctx.realm().0))
                .property("flag", options.get("flag").cloned().unwrap_or(Value::Null)))
        });

        let ctx = detached_context(json!({ "flag": true }));
        let first = normalize(decl.clone(), &ctx).unwrap();
        let second = normalize(decl, &ctx).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.properties.get("flag"), Some(&json!(true)));
        assert!(second.name.is_none());
    }

    #[test]
    fn constructor_failure_propagates() {
        let ctx = detached_context(Value::Null);
        let err = normalize(Declaration::class::<Broken>(), &ctx).unwrap_err();
        assert!(matches!(err, RegistrationError::Construct(_)));
    }

    #[test]
    fn caching_spec_is_carried_over() {
        let ctx = detached_context(Value::Null);
        let class = ClassDeclaration::new("Lookup", |_, _| {
            let object = ServiceObject::new()
                .method("find", sync_method(|_| Ok(Value::Null)))
                .with_caching(
                    CachingSpec::new().method("find", CacheOptions::new(Duration::from_millis(50))),
                )?;
            Ok(object)
        });
        let def = normalize(class.into(), &ctx).unwrap();
        assert_eq!(def.name.as_deref(), Some("lookup"));
        assert_eq!(def.caching.unwrap().len(), 1);
    }
}
