// Core traits for the Girder framework
//
// These are normally implemented by the annotation macros (`#[service]`,
// `#[controller]`, `#[routes]`, `#[derive(ObjectType)]`,
// `#[derive(InputType)]`); hand-written impls are equally valid.

use crate::{BoundMethod, ClassRef, Dependencies, HttpMethod, Result, TypeSchema};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// A constructor dependency: "the singleton registered for `T`".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dependency {
    class: ClassRef,
}

impl Dependency {
    pub fn on<T: 'static>() -> Self {
        Self {
            class: ClassRef::of::<T>(),
        }
    }

    pub fn class(&self) -> ClassRef {
        self.class
    }
}

/// Types managed by the dependency container (controllers and services).
///
/// `register` is the registration method: it lists constructor
/// dependencies in the order `construct` will pull them out of
/// [`Dependencies`]. It may do asynchronous work, e.g. reach a
/// configuration store; the container awaits it once during `build`.
///
/// ```
/// use girder_core::{Dependencies, Dependency, Injectable, Result, async_trait};
/// use std::sync::Arc;
///
/// struct Clock;
///
/// #[async_trait]
/// impl Injectable for Clock {
///     async fn register() -> Result<Vec<Dependency>> {
///         Ok(vec![])
///     }
///
///     fn construct(_deps: &mut Dependencies) -> Result<Self> {
///         Ok(Clock)
///     }
/// }
///
/// struct Greeter {
///     clock: Arc<Clock>,
/// }
///
/// #[async_trait]
/// impl Injectable for Greeter {
///     async fn register() -> Result<Vec<Dependency>> {
///         Ok(vec![Dependency::on::<Clock>()])
///     }
///
///     fn construct(deps: &mut Dependencies) -> Result<Self> {
///         Ok(Greeter { clock: deps.next()? })
///     }
/// }
/// ```
#[async_trait]
pub trait Injectable: Send + Sync + Sized + 'static {
    async fn register() -> Result<Vec<Dependency>>;

    fn construct(deps: &mut Dependencies) -> Result<Self>;
}

/// An injectable that owns a route prefix.
pub trait Controller: Injectable {
    fn path() -> &'static str;
}

/// Route metadata and method dispatch for a controller or service.
pub trait Routes: Send + Sync + 'static {
    /// Every route declared on the type.
    fn routes() -> Vec<RouteDefinition>;

    /// The named route method bound to `self`, or `None` if no such route method exists.
    fn bind(self: Arc<Self>, method: &str) -> Option<BoundMethod>;
}

/// Output models. Schemas are descriptive only.
pub trait ObjectType: Send + Sync + 'static {
    fn schema() -> TypeSchema;
}

/// Request-body models.
pub trait InputType: DeserializeOwned + Send + 'static {
    fn schema() -> TypeSchema;
}

/// One route as declared on a type, before it is joined to a version and controller path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDefinition {
    pub method: HttpMethod,
    pub path: &'static str,
    pub handler_name: &'static str,
    pub body: Option<ClassRef>,
}

impl RouteDefinition {
    pub fn new(method: HttpMethod, path: &'static str, handler_name: &'static str) -> Self {
        Self {
            method,
            path,
            handler_name,
            body: None,
        }
    }

    /// Declare `T` as the request-body type.
    pub fn with_body<T: 'static>(mut self) -> Self {
        self.body = Some(ClassRef::of::<T>());
        self
    }
}
