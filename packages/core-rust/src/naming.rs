//! Name and sandbox overrides.

use std::sync::Arc;

use crate::context::RealmContext;
use crate::declaration::{Declaration, FactoryDeclaration};
use crate::error::RegistrationError;
use crate::object::Overrides;
use crate::types::{Sandbox, Value};

/// Options accepted by [`with_name`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NameOptions {
    pub sandbox: Option<Sandbox>,
}

impl NameOptions {
    #[must_use]
    pub fn sandbox(sandbox: impl Into<Sandbox>) -> Self {
        Self {
            sandbox: Some(sandbox.into()),
        }
    }
}

/// Annotates a declaration with an explicit name (and optionally sandbox).
///
/// Classes and objects are annotated directly. A factory is wrapped in a new
/// factory that annotates each object it produces, so a factory whose
/// product already carries an override fails when it is registered.
///
/// # Errors
///
/// `EmptyName` for an empty name, `NameAlreadySet` if the declaration already
/// has an explicit name, `SandboxAlreadySet` if `options` carries a sandbox
/// and the declaration already has an explicit one.
pub fn with_name(
    name: impl Into<String>,
    options: NameOptions,
    declaration: Declaration,
) -> Result<Declaration, RegistrationError> {
    let name = name.into();
    if name.is_empty() {
        return Err(RegistrationError::EmptyName);
    }

    match declaration {
        Declaration::Class(mut class) => {
            apply_overrides(&mut class.overrides, &name, options)?;
            Ok(Declaration::Class(class))
        }
        Declaration::Object(mut object) => {
            apply_overrides(&mut object.overrides, &name, options)?;
            Ok(Declaration::Object(object))
        }
        Declaration::Factory(factory) => {
            let inner = factory.construct;
            Ok(Declaration::Factory(FactoryDeclaration::from_constructor(
                Arc::new(move |ctx: &RealmContext, plugin_options: &Value| {
                    let mut object = inner(ctx, plugin_options)?;
                    apply_overrides(&mut object.overrides, &name, options)?;
                    Ok(object)
                }),
            )))
        }
    }
}

fn apply_overrides(
    overrides: &mut Overrides,
    name: &str,
    options: NameOptions,
) -> Result<(), RegistrationError> {
    if let Some(existing) = &overrides.name {
        return Err(RegistrationError::NameAlreadySet {
            existing: existing.clone(),
        });
    }
    if let (Some(_), Some(existing)) = (options.sandbox, overrides.sandbox) {
        return Err(RegistrationError::SandboxAlreadySet { existing });
    }

    overrides.name = Some(name.to_string());
    if options.sandbox.is_some() {
        overrides.sandbox = options.sandbox;
    }
    Ok(())
}

/// Derives a service name from a class identifier by lower-casing its first
/// character. The rest of the identifier is left alone.
#[must_use]
pub fn camelize(ident: &str) -> String {
    let mut chars = ident.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::context::tests::detached_context;
    use crate::declaration::ClassDeclaration;
    use crate::object::ServiceObject;

    #[test]
    fn camelize_lowercases_first_char_only() {
        assert_eq!(camelize("UserService"), "userService");
        assert_eq!(camelize("HTTPClient"), "hTTPClient");
        assert_eq!(camelize("already"), "already");
        assert_eq!(camelize(""), "");
    }

    proptest! {
        #[test]
        fn camelize_preserves_tail(ident in "[A-Za-z][A-Za-z0-9_]{0,16}") {
            let out = camelize(&ident);
            prop_assert_eq!(&out[1..], &ident[1..]);
            prop_assert_eq!(out.chars().next(), ident.chars().next().map(|c| c.to_ascii_lowercase()));
        }
    }

    #[test]
    fn names_object_in_place() {
        let decl = with_name("users", NameOptions::default(), ServiceObject::new().into()).unwrap();
        let Declaration::Object(object) = decl else {
            panic!("expected object declaration");
        };
        assert_eq!(object.overrides().name.as_deref(), Some("users"));
        assert!(object.overrides().sandbox.is_none());
    }

    #[test]
    fn names_class_with_sandbox() {
        let class = ClassDeclaration::new("Users", |_, _| Ok(ServiceObject::new()));
        let decl = with_name("people", NameOptions::sandbox(true), class.into()).unwrap();
        let Declaration::Class(class) = decl else {
            panic!("expected class declaration");
        };
        assert_eq!(class.overrides().name.as_deref(), Some("people"));
        assert_eq!(class.overrides().sandbox, Some(Sandbox::Plugin));
    }

    #[test]
    fn second_name_fails() {
        let decl = with_name("a", NameOptions::default(), ServiceObject::new().into()).unwrap();
        let err = with_name("b", NameOptions::default(), decl).unwrap_err();
        assert!(matches!(err, RegistrationError::NameAlreadySet { existing } if existing == "a"));
    }

    #[test]
    fn second_sandbox_fails() {
        let mut object = ServiceObject::new();
        object.overrides.sandbox = Some(Sandbox::Server);
        let err = with_name("a", NameOptions::sandbox("plugin".parse::<Sandbox>().unwrap()), object.into())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistrationError::SandboxAlreadySet { existing: Sandbox::Server }
        ));
    }

    #[test]
    fn empty_name_fails() {
        let err = with_name("", NameOptions::default(), ServiceObject::new().into()).unwrap_err();
        assert!(matches!(err, RegistrationError::EmptyName));
    }

    #[test]
    fn factory_is_wrapped_and_annotates_product() {
        let factory = Declaration::factory(|_, _| Ok(ServiceObject::new().name("literal")));
        let decl = with_name("explicit", NameOptions::sandbox(Sandbox::Plugin), factory).unwrap();
        let Declaration::Factory(factory) = decl else {
            panic!("expected factory declaration");
        };
        let object = (factory.construct)(&detached_context(Value::Null), &Value::Null).unwrap();
        assert_eq!(object.overrides().name.as_deref(), Some("explicit"));
        assert_eq!(object.overrides().sandbox, Some(Sandbox::Plugin));
        assert_eq!(object.literal_name(), Some("literal"));
    }

    #[test]
    fn double_wrapped_factory_fails_when_constructed() {
        let factory = Declaration::factory(|_, _| Ok(ServiceObject::new()));
        let once = with_name("a", NameOptions::default(), factory).unwrap();
        let twice = with_name("b", NameOptions::default(), once).unwrap();
        let Declaration::Factory(factory) = twice else {
            panic!("expected factory declaration");
        };
        let err = (factory.construct)(&detached_context(Value::Null), &Value::Null).unwrap_err();
        assert!(matches!(err, RegistrationError::NameAlreadySet { .. }));
    }
}
