//! The three shapes a service can be declared in.
//!
//! - [`ServiceClass`]: a type with a constructor, named after the type unless
//!   told otherwise.
//! - [`ServiceObject`]: a ready-made object.
//! - Factory: a closure producing a fresh object for every realm that
//!   registers it.
//!
//! All three normalize to one [`ServiceDefinition`](crate::ServiceDefinition)
//! through [`normalize`](crate::normalize).

use std::fmt;
use std::sync::Arc;

use crate::context::RealmContext;
use crate::error::RegistrationError;
use crate::object::{Overrides, ServiceObject};
use crate::types::{Sandbox, Value};

/// Builds a service object for a realm from `(realm context, plugin options)`.
pub type Constructor =
    Arc<dyn Fn(&RealmContext, &Value) -> Result<ServiceObject, RegistrationError> + Send + Sync>;

/// A class-like service declaration.
///
/// The class identifier (the type's own name) is the fallback service name,
/// camel-cased: `UserStore` registers as `userStore`. `NAME` and `SANDBOX`
/// play the role of literal fields on the class.
pub trait ServiceClass: 'static {
    /// Literal service name.
    const NAME: Option<&'static str> = None;
    /// Literal sandbox.
    const SANDBOX: Option<Sandbox> = None;

    /// Instantiates the service for one realm.
    ///
    /// # Errors
    ///
    /// Any error aborts the registration batch. `anyhow` errors convert
    /// into `RegistrationError::Construct` through `?`.
    fn construct(ctx: &RealmContext, options: &Value) -> Result<ServiceObject, RegistrationError>;
}

#[derive(Clone)]
pub struct ClassDeclaration {
    ident: String,
    name: Option<String>,
    sandbox: Option<Sandbox>,
    pub(crate) overrides: Overrides,
    pub(crate) construct: Constructor,
}

impl ClassDeclaration {
    /// Declaration for a [`ServiceClass`] type.
    #[must_use]
    pub fn of<T: ServiceClass>() -> Self {
        Self {
            ident: short_type_name(std::any::type_name::<T>()).to_string(),
            name: T::NAME.map(str::to_string),
            sandbox: T::SANDBOX,
            overrides: Overrides::default(),
            construct: Arc::new(T::construct),
        }
    }

    /// Declaration for a class assembled at runtime from an identifier and
    /// a constructor.
    pub fn new<F>(ident: impl Into<String>, construct: F) -> Self
    where
        F: Fn(&RealmContext, &Value) -> Result<ServiceObject, RegistrationError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            ident: ident.into(),
            name: None,
            sandbox: None,
            overrides: Overrides::default(),
            construct: Arc::new(construct),
        }
    }

    #[must_use]
    pub fn with_literal_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_literal_sandbox(mut self, sandbox: Sandbox) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    #[must_use]
    pub fn ident(&self) -> &str {
        &self.ident
    }

    #[must_use]
    pub fn literal_name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    #[must_use]
    pub fn literal_sandbox(&self) -> Option<Sandbox> {
        self.sandbox
    }

    #[must_use]
    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }
}

#[derive(Clone)]
pub struct FactoryDeclaration {
    pub(crate) construct: Constructor,
}

impl FactoryDeclaration {
    pub(crate) fn from_constructor(construct: Constructor) -> Self {
        Self { construct }
    }
}

/// A service declaration in any of its three shapes.
#[derive(Clone)]
pub enum Declaration {
    Class(ClassDeclaration),
    Object(ServiceObject),
    Factory(FactoryDeclaration),
}

impl Declaration {
    #[must_use]
    pub fn class<T: ServiceClass>() -> Self {
        Declaration::Class(ClassDeclaration::of::<T>())
    }

    #[must_use]
    pub fn object(object: ServiceObject) -> Self {
        Declaration::Object(object)
    }

    /// A factory invoked once per registering realm.
    pub fn factory<F>(factory: F) -> Self
    where
        F: Fn(&RealmContext, &Value) -> Result<ServiceObject, RegistrationError>
            + Send
            + Sync
            + 'static,
    {
        Declaration::Factory(FactoryDeclaration::from_constructor(Arc::new(factory)))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Declaration::Class(_) => "class",
            Declaration::Object(_) => "object",
            Declaration::Factory(_) => "factory",
        }
    }
}

impl From<ServiceObject> for Declaration {
    fn from(object: ServiceObject) -> Self {
        Declaration::Object(object)
    }
}

impl From<ClassDeclaration> for Declaration {
    fn from(class: ClassDeclaration) -> Self {
        Declaration::Class(class)
    }
}

impl fmt::Debug for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declaration::Class(class) => f
                .debug_struct("Class")
                .field("ident", &class.ident)
                .field("name", &class.name)
                .field("sandbox", &class.sandbox)
                .field("overrides", &class.overrides)
                .finish_non_exhaustive(),
            Declaration::Object(object) => f.debug_tuple("Object").field(object).finish(),
            Declaration::Factory(_) => f.write_str("Factory"),
        }
    }
}

/// `my_crate::services::UserStore<T>` -> `UserStore`.
fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
