//! Class registration registry.
//!
//! The registry is the single source of truth the container, router and
//! application read from. It maps each registered Rust type to an opaque
//! [`RegistrationKey`] and stores, per key, the class registration
//! (`{kind, target}`), optional controller metadata (`{path}`), route
//! metadata and the method binder used to dispatch route methods.
//!
//! There is no global state: build a [`Registry`], populate it with explicit
//! calls, and hand it to [`Application::new`](crate::Application::new).
//!
//! ```ignore
//! let registry = Registry::new();
//! registry.register_service::<MessageStore>()?;
//! registry.register_input_type::<CreateMessage>()?;
//! registry.register_controller::<MessagesController>()?;
//! ```
//!
//! A type can be registered once. Registering it again fails with
//! [`RegistrationError::AlreadyRegistered`] until the previous registration is
//! removed with [`Registry::unregister`], so keys held by route or dependency
//! metadata can never be orphaned.

use crate::logging::{debug, trace};
use crate::traits::{Controller, Dependency, InputType, Injectable, ObjectType, Routes};
use crate::{
    BoundMethod, Dependencies, HttpMethod, RegistrationError, Result, RouteDefinition, TypeSchema,
};
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Keys and class references
// ============================================================================

/// Opaque token identifying one class registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegistrationKey(u64);

impl fmt::Display for RegistrationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Opaque token identifying one route.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteKey(u64);

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route#{}", self.0)
    }
}

/// A reference to a Rust type, usable as a map key.
#[derive(Clone, Copy, Debug)]
pub struct ClassRef {
    type_id: TypeId,
    type_name: &'static str,
}

impl ClassRef {
    pub fn of<T: 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Type name without its module path.
    pub fn short_name(&self) -> &'static str {
        self.type_name.rsplit("::").next().unwrap_or(self.type_name)
    }
}

impl PartialEq for ClassRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ClassRef {}

impl std::hash::Hash for ClassRef {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

// ============================================================================
// Class registrations
// ============================================================================

/// Registration kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassKind {
    Injectable,
    ObjectType,
    InputType,
}

pub(crate) type RegisterFn = fn() -> BoxFuture<'static, Result<Vec<Dependency>>>;
pub(crate) type ConstructFn = fn(&mut Dependencies) -> Result<Arc<dyn Any + Send + Sync>>;
pub(crate) type DecodeFn = fn(&[u8]) -> serde_json::Result<Box<dyn Any + Send>>;
pub(crate) type MethodBinder = fn(Arc<dyn Any + Send + Sync>, &str) -> Option<BoundMethod>;

/// Registration method and constructor of an injectable.
#[derive(Clone, Copy)]
pub struct Provider {
    pub(crate) register: RegisterFn,
    pub(crate) construct: ConstructFn,
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider").finish_non_exhaustive()
    }
}

/// The registered class together with whatever capabilities it brings.
#[derive(Clone, Debug)]
pub struct ClassTarget {
    class: ClassRef,
    provider: Option<Provider>,
    decoder: Option<DecodeFn>,
    schema: Option<TypeSchema>,
}

impl ClassTarget {
    /// A type with no framework capabilities.
    pub fn plain<T: 'static>() -> Self {
        Self {
            class: ClassRef::of::<T>(),
            provider: None,
            decoder: None,
            schema: None,
        }
    }

    pub fn injectable<T: Injectable>() -> Self {
        Self {
            provider: Some(Provider {
                register: register_erased::<T>,
                construct: construct_erased::<T>,
            }),
            ..Self::plain::<T>()
        }
    }

    pub fn object_type<T: ObjectType>() -> Self {
        Self {
            schema: Some(T::schema()),
            ..Self::plain::<T>()
        }
    }

    pub fn input_type<T: InputType>() -> Self {
        Self {
            decoder: Some(decode_erased::<T>),
            schema: Some(T::schema()),
            ..Self::plain::<T>()
        }
    }

    pub fn class(&self) -> ClassRef {
        self.class
    }

    pub fn provider(&self) -> Option<Provider> {
        self.provider
    }

    pub fn schema(&self) -> Option<&TypeSchema> {
        self.schema.as_ref()
    }

    pub(crate) fn decoder(&self) -> Option<DecodeFn> {
        self.decoder
    }
}

fn register_erased<T: Injectable>() -> BoxFuture<'static, Result<Vec<Dependency>>> {
    T::register()
}

fn construct_erased<T: Injectable>(deps: &mut Dependencies) -> Result<Arc<dyn Any + Send + Sync>> {
    Ok(Arc::new(T::construct(deps)?))
}

fn decode_erased<T: InputType>(body: &[u8]) -> serde_json::Result<Box<dyn Any + Send>> {
    Ok(Box::new(serde_json::from_slice::<T>(body)?))
}

fn bind_erased<T: Routes>(instance: Arc<dyn Any + Send + Sync>, method: &str) -> Option<BoundMethod> {
    instance.downcast::<T>().ok().and_then(|this| this.bind(method))
}

/// `{kind, target}` as recorded at registration time.
#[derive(Clone, Debug)]
pub struct ClassRegistration {
    kind: ClassKind,
    target: ClassTarget,
}

impl ClassRegistration {
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    pub fn target(&self) -> &ClassTarget {
        &self.target
    }
}

/// Controller metadata.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ControllerMetadata {
    pub path: String,
}

/// Route metadata, keyed by a per-route token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteMetadata {
    pub key: RouteKey,
    pub method: HttpMethod,
    pub path: String,
    pub controller: RegistrationKey,
    pub method_name: &'static str,
    pub body: Option<ClassRef>,
}

// ============================================================================
// Registry
// ============================================================================

#[derive(Default)]
struct RegistryState {
    next_key: u64,
    next_route: u64,
    // Keys are minted in increasing order, so BTreeMap iteration is insertion order.
    classes: BTreeMap<RegistrationKey, ClassRegistration>,
    keys: HashMap<TypeId, RegistrationKey>,
    controllers: HashMap<RegistrationKey, ControllerMetadata>,
    routes: BTreeMap<RouteKey, RouteMetadata>,
    binders: HashMap<RegistrationKey, MethodBinder>,
}

/// Shared handle to the registration tables. Clones share state.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        debug!("Creating new registry");
        Self::default()
    }

    /// Mint a key for `target` and record `{kind, target}`.
    pub fn register_class(
        &self,
        kind: ClassKind,
        target: ClassTarget,
    ) -> Result<RegistrationKey, RegistrationError> {
        let class = target.class();
        let mut state = self.state.write();

        if let Some(key) = state.keys.get(&class.type_id()) {
            return Err(RegistrationError::AlreadyRegistered {
                class: class.type_name(),
                key: *key,
            });
        }

        state.next_key += 1;
        let key = RegistrationKey(state.next_key);
        state.keys.insert(class.type_id(), key);
        state.classes.insert(key, ClassRegistration { kind, target });

        debug!(class = class.type_name(), %key, ?kind, "Class registered");
        Ok(key)
    }

    /// Key for `T`.
    pub fn registration_key<T: 'static>(&self) -> Result<RegistrationKey, RegistrationError> {
        self.registration_key_of(&ClassRef::of::<T>())
    }

    pub fn registration_key_of(&self, class: &ClassRef) -> Result<RegistrationKey, RegistrationError> {
        self.state
            .read()
            .keys
            .get(&class.type_id())
            .copied()
            .ok_or_else(|| RegistrationError::NotFound(class.type_name().to_string()))
    }

    pub fn class_registration(
        &self,
        key: RegistrationKey,
    ) -> Result<ClassRegistration, RegistrationError> {
        self.state
            .read()
            .classes
            .get(&key)
            .cloned()
            .ok_or_else(|| RegistrationError::NotFound(key.to_string()))
    }

    /// All registrations in insertion order, optionally filtered by kind.
    pub fn class_registrations(
        &self,
        kind: Option<ClassKind>,
    ) -> Vec<(RegistrationKey, ClassRegistration)> {
        self.state
            .read()
            .classes
            .iter()
            .filter(|(_, registration)| kind.is_none_or(|k| registration.kind == k))
            .map(|(key, registration)| (*key, registration.clone()))
            .collect()
    }

    /// Remove a registration and everything attached to its key.
    pub fn unregister(&self, key: RegistrationKey) -> Result<ClassRegistration, RegistrationError> {
        let mut state = self.state.write();
        let registration = state
            .classes
            .remove(&key)
            .ok_or_else(|| RegistrationError::NotFound(key.to_string()))?;

        state.keys.remove(&registration.target.class().type_id());
        state.controllers.remove(&key);
        state.binders.remove(&key);
        state.routes.retain(|_, route| route.controller != key);

        debug!(class = registration.target.class().type_name(), %key, "Class unregistered");
        Ok(registration)
    }

    pub fn len(&self) -> usize {
        self.state.read().classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------------
    // Controller and route metadata
    // ------------------------------------------------------------------------

    /// Attach controller metadata to `key`.
    pub fn define_controller(
        &self,
        key: RegistrationKey,
        path: impl Into<String>,
    ) -> Result<(), RegistrationError> {
        let mut state = self.state.write();
        if !state.classes.contains_key(&key) {
            return Err(RegistrationError::NotFound(key.to_string()));
        }
        state.controllers.insert(key, ControllerMetadata { path: path.into() });
        Ok(())
    }

    pub fn controller_metadata(&self, key: RegistrationKey) -> Option<ControllerMetadata> {
        self.state.read().controllers.get(&key).cloned()
    }

    /// Record a route for the class registered under `controller`.
    pub fn add_route(
        &self,
        controller: RegistrationKey,
        definition: RouteDefinition,
    ) -> Result<RouteKey, RegistrationError> {
        let mut state = self.state.write();
        if !state.classes.contains_key(&controller) {
            return Err(RegistrationError::NotFound(controller.to_string()));
        }

        state.next_route += 1;
        let key = RouteKey(state.next_route);
        trace!(%key, %controller, method = %definition.method, path = definition.path, "Route recorded");
        state.routes.insert(
            key,
            RouteMetadata {
                key,
                method: definition.method,
                path: definition.path.to_string(),
                controller,
                method_name: definition.handler_name,
                body: definition.body,
            },
        );
        Ok(key)
    }

    /// Routes recorded for `controller`, in declaration order.
    pub fn routes_for(&self, controller: RegistrationKey) -> Vec<RouteMetadata> {
        self.state
            .read()
            .routes
            .values()
            .filter(|route| route.controller == controller)
            .cloned()
            .collect()
    }

    pub fn routes(&self) -> Vec<RouteMetadata> {
        self.state.read().routes.values().cloned().collect()
    }

    pub(crate) fn method_binder(&self, key: RegistrationKey) -> Option<MethodBinder> {
        self.state.read().binders.get(&key).copied()
    }

    /// Schemas of every object and input type, in registration order.
    pub fn schemas(&self) -> Vec<TypeSchema> {
        self.state
            .read()
            .classes
            .values()
            .filter_map(|registration| registration.target.schema().cloned())
            .collect()
    }

    // ------------------------------------------------------------------------
    // Typed registration
    // ------------------------------------------------------------------------

    /// Register `T` as an injectable service. Services carry empty
    /// controller metadata, so routes declared on them mount directly under
    /// the version prefix.
    pub fn register_service<T: Injectable>(&self) -> Result<RegistrationKey, RegistrationError> {
        let key = self.register_class(ClassKind::Injectable, ClassTarget::injectable::<T>())?;
        self.define_controller(key, "")?;
        Ok(key)
    }

    /// Register `T` as a controller together with all of its routes.
    pub fn register_controller<T: Controller + Routes>(
        &self,
    ) -> Result<RegistrationKey, RegistrationError> {
        let key = self.register_class(ClassKind::Injectable, ClassTarget::injectable::<T>())?;
        self.define_controller(key, T::path())?;
        self.attach_routes::<T>(key)?;
        Ok(key)
    }

    /// Attach the routes of an already registered `T`.
    pub fn register_routes<T: Routes>(&self) -> Result<RegistrationKey, RegistrationError> {
        let key = self.registration_key::<T>()?;
        self.attach_routes::<T>(key)?;
        Ok(key)
    }

    pub fn register_object_type<T: ObjectType>(&self) -> Result<RegistrationKey, RegistrationError> {
        self.register_class(ClassKind::ObjectType, ClassTarget::object_type::<T>())
    }

    pub fn register_input_type<T: InputType>(&self) -> Result<RegistrationKey, RegistrationError> {
        self.register_class(ClassKind::InputType, ClassTarget::input_type::<T>())
    }

    fn attach_routes<T: Routes>(&self, key: RegistrationKey) -> Result<(), RegistrationError> {
        for definition in T::routes() {
            self.add_route(key, definition)?;
        }
        self.state.write().binders.insert(key, bind_erased::<T>);
        Ok(())
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("Registry")
            .field("classes", &state.classes.len())
            .field("routes", &state.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    struct Beta;
    struct Gamma;

    #[test]
    fn test_register_and_lookup() {
        let registry = Registry::new();
        let key = registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Alpha>())
            .unwrap();

        assert_eq!(registry.registration_key::<Alpha>().unwrap(), key);
        assert_eq!(registry.registration_key::<Alpha>().unwrap(), key);

        let registration = registry.class_registration(key).unwrap();
        assert_eq!(registration.kind(), ClassKind::Injectable);
        assert_eq!(registration.target().class(), ClassRef::of::<Alpha>());
    }

    #[test]
    fn test_lookup_unregistered() {
        let registry = Registry::new();
        let err = registry.registration_key::<Alpha>().unwrap_err();
        assert!(matches!(err, RegistrationError::NotFound(name) if name.ends_with("Alpha")));
    }

    #[test]
    fn test_unknown_key() {
        let registry = Registry::new();
        let other = Registry::new();
        let key = other
            .register_class(ClassKind::ObjectType, ClassTarget::plain::<Alpha>())
            .unwrap();
        assert!(registry.class_registration(key).is_err());
    }

    #[test]
    fn test_registrations_insertion_order_and_filter() {
        let registry = Registry::new();
        let a = registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Alpha>())
            .unwrap();
        let b = registry
            .register_class(ClassKind::InputType, ClassTarget::plain::<Beta>())
            .unwrap();
        let c = registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Gamma>())
            .unwrap();

        let all: Vec<_> = registry.class_registrations(None).into_iter().map(|(k, _)| k).collect();
        assert_eq!(all, vec![a, b, c]);

        let injectables: Vec<_> = registry
            .class_registrations(Some(ClassKind::Injectable))
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(injectables, vec![a, c]);
    }

    #[test]
    fn test_reregistration_rejected() {
        let registry = Registry::new();
        let key = registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Alpha>())
            .unwrap();

        let err = registry
            .register_class(ClassKind::ObjectType, ClassTarget::plain::<Alpha>())
            .unwrap_err();
        assert_eq!(
            err,
            RegistrationError::AlreadyRegistered {
                class: std::any::type_name::<Alpha>(),
                key,
            }
        );
        assert_eq!(registry.registration_key::<Alpha>().unwrap(), key);
    }

    #[test]
    fn test_unregister_clears_metadata() {
        let registry = Registry::new();
        let key = registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Alpha>())
            .unwrap();
        registry.define_controller(key, "/alpha").unwrap();
        registry
            .add_route(key, RouteDefinition::new(HttpMethod::GET, "/", "list"))
            .unwrap();

        registry.unregister(key).unwrap();

        assert!(registry.registration_key::<Alpha>().is_err());
        assert!(registry.controller_metadata(key).is_none());
        assert!(registry.routes_for(key).is_empty());
        assert!(registry.is_empty());

        let again = registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Alpha>())
            .unwrap();
        assert_ne!(again, key);
    }

    #[test]
    fn test_routes_require_registered_class() {
        let registry = Registry::new();
        let other = Registry::new();
        let key = other
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Alpha>())
            .unwrap();

        assert!(registry
            .add_route(key, RouteDefinition::new(HttpMethod::GET, "/", "list"))
            .is_err());
        assert!(registry.define_controller(key, "/x").is_err());
    }

    struct Delta;

    #[async_trait::async_trait]
    impl Injectable for Delta {
        async fn register() -> Result<Vec<Dependency>> {
            Ok(vec![Dependency::on::<Alpha>()])
        }

        fn construct(_deps: &mut Dependencies) -> Result<Self> {
            Ok(Delta)
        }
    }

    #[test]
    fn test_injectable_target_carries_provider() {
        assert!(ClassTarget::plain::<Alpha>().provider().is_none());

        let provider = ClassTarget::injectable::<Delta>().provider().unwrap();
        let deps = tokio_test::block_on((provider.register)()).unwrap();
        assert_eq!(deps, vec![Dependency::on::<Alpha>()]);
    }

    #[test]
    fn test_class_ref_names() {
        let class = ClassRef::of::<Alpha>();
        assert_eq!(class.short_name(), "Alpha");
        assert!(class.type_name().ends_with("::Alpha"));
    }
}
