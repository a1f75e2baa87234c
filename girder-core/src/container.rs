// Dependency injection container
//
// `build()` records one binding per injectable (its constructor dependencies,
// by registration key) and verifies the graph is acyclic. Instances are
// created lazily on first use, dependencies first, and cached for the
// lifetime of the container.

use crate::logging::{debug, trace};
use crate::registry::{ClassKind, ClassRef, ConstructFn, RegistrationKey, Registry};
use crate::{BoundMethod, ContainerError, Error, Result};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type Instance = Arc<dyn Any + Send + Sync>;

#[derive(Clone)]
struct Binding {
    class: ClassRef,
    dependencies: Vec<RegistrationKey>,
    construct: ConstructFn,
}

struct Inner {
    registry: Registry,
    bindings: RwLock<HashMap<RegistrationKey, Binding>>,
    instances: Mutex<HashMap<RegistrationKey, Instance>>,
    // Serializes instantiation so every constructor runs at most once.
    construction: Mutex<()>,
    built: AtomicBool,
}

/// The dependency injection container
#[derive(Clone)]
pub struct Container {
    inner: Arc<Inner>,
}

impl Container {
    pub fn new(registry: Registry) -> Self {
        debug!("Creating new DI container");
        Self {
            inner: Arc::new(Inner {
                registry,
                bindings: RwLock::new(HashMap::new()),
                instances: Mutex::new(HashMap::new()),
                construction: Mutex::new(()),
                built: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    /// Record a singleton binding for every injectable.
    ///
    /// Registration methods are awaited one at a time in registration order.
    /// Nothing is instantiated here. The build is all-or-nothing: on error
    /// the previous bindings (if any) are left untouched.
    pub async fn build(&self) -> Result<()> {
        let registry = &self.inner.registry;
        let injectables = registry.class_registrations(Some(ClassKind::Injectable));
        debug!(count = injectables.len(), "Building container");

        let mut bindings = HashMap::with_capacity(injectables.len());
        let mut order = Vec::with_capacity(injectables.len());

        for (key, registration) in injectables {
            let class = registration.target().class();
            let provider = registration.target().provider().ok_or(
                ContainerError::MissingRegistrationMethod {
                    class: class.type_name(),
                },
            )?;

            trace!(class = class.type_name(), "Invoking registration method");
            let descriptors =
                (provider.register)()
                    .await
                    .map_err(|source| ContainerError::RegistrationFailed {
                        class: class.type_name(),
                        source: Box::new(source),
                    })?;

            let mut dependencies = Vec::with_capacity(descriptors.len());
            for (position, descriptor) in descriptors.iter().enumerate() {
                let dependency = descriptor.class();
                let dependency_key = registry.registration_key_of(&dependency).map_err(|_| {
                    ContainerError::UnresolvedDependency {
                        class: class.type_name(),
                        dependency: dependency.type_name(),
                        position,
                    }
                })?;

                if registry.class_registration(dependency_key)?.kind() != ClassKind::Injectable {
                    return Err(ContainerError::UnsupportedParameter {
                        class: class.type_name(),
                        position,
                    }
                    .into());
                }
                dependencies.push(dependency_key);
            }

            debug!(
                class = class.type_name(),
                dependencies = dependencies.len(),
                "Singleton bound"
            );
            bindings.insert(
                key,
                Binding {
                    class,
                    dependencies,
                    construct: provider.construct,
                },
            );
            order.push(key);
        }

        detect_cycles(&order, &bindings)?;

        *self.inner.bindings.write() = bindings;
        self.inner.instances.lock().clear();
        self.inner.built.store(true, Ordering::Release);
        debug!("Container built");
        Ok(())
    }

    pub fn is_built(&self) -> bool {
        self.inner.built.load(Ordering::Acquire)
    }

    /// Instantiate the class bound under `key` now, along with its dependency chain.
    pub fn setup_class(&self, key: RegistrationKey) -> Result<()> {
        self.instance(key).map(|_| ())
    }

    /// The singleton for `key`, instantiating it on first use.
    pub fn instance(&self, key: RegistrationKey) -> Result<Instance> {
        if let Some(instance) = self.inner.instances.lock().get(&key) {
            return Ok(instance.clone());
        }

        let _guard = self.inner.construction.lock();
        let mut stack = Vec::new();
        self.instantiate(key, &mut stack)
    }

    /// Resolve the singleton registered for `T`.
    pub fn resolve<T: Send + Sync + 'static>(&self) -> Result<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        trace!(provider = type_name, "Attempting to resolve provider");

        let key = self.inner.registry.registration_key::<T>()?;
        self.instance(key)?.downcast::<T>().map_err(|_| {
            ContainerError::DependencyMismatch {
                class: type_name,
                position: 0,
                expected: type_name,
            }
            .into()
        })
    }

    /// The route method `method` of the singleton under `key`, bound to that instance.
    pub fn get_class_method(&self, key: RegistrationKey, method: &str) -> Result<BoundMethod> {
        let instance = self.instance(key)?;
        let class = self.class_name(key);
        let not_found = || ContainerError::MethodNotFound {
            class,
            method: method.to_string(),
        };

        let binder = self.inner.registry.method_binder(key).ok_or_else(not_found)?;
        Ok(binder(instance, method).ok_or_else(not_found)?)
    }

    fn class_name(&self, key: RegistrationKey) -> &'static str {
        self.inner
            .bindings
            .read()
            .get(&key)
            .map(|binding| binding.class.type_name())
            .unwrap_or("<unbound>")
    }

    fn instantiate(&self, key: RegistrationKey, stack: &mut Vec<RegistrationKey>) -> Result<Instance> {
        if let Some(instance) = self.inner.instances.lock().get(&key) {
            return Ok(instance.clone());
        }

        let binding = self
            .inner
            .bindings
            .read()
            .get(&key)
            .cloned()
            .ok_or_else(|| ContainerError::NotBound(key.to_string()))?;

        if let Some(start) = stack.iter().position(|k| *k == key) {
            let mut cycle: Vec<_> = stack[start..].iter().map(|k| self.class_name(*k)).collect();
            cycle.push(binding.class.type_name());
            return Err(ContainerError::DependencyCycle { cycle }.into());
        }

        stack.push(key);
        let mut values = Vec::with_capacity(binding.dependencies.len());
        for dependency in &binding.dependencies {
            values.push(self.instantiate(*dependency, stack)?);
        }
        stack.pop();

        trace!(class = binding.class.type_name(), "Constructing singleton");
        let mut deps = Dependencies::new(binding.class.type_name(), values);
        let instance = (binding.construct)(&mut deps).map_err(|source| {
            ContainerError::ConstructionFailed {
                class: binding.class.type_name(),
                source: Box::new(source),
            }
        })?;

        debug!(class = binding.class.type_name(), "Singleton instantiated");
        self.inner.instances.lock().insert(key, instance.clone());
        Ok(instance)
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("bindings", &self.inner.bindings.read().len())
            .field("instances", &self.inner.instances.lock().len())
            .field("built", &self.is_built())
            .finish()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

fn detect_cycles(
    order: &[RegistrationKey],
    bindings: &HashMap<RegistrationKey, Binding>,
) -> Result<(), ContainerError> {
    let mut marks = HashMap::with_capacity(order.len());
    let mut path = Vec::new();
    for key in order {
        visit(*key, bindings, &mut marks, &mut path)?;
    }
    Ok(())
}

fn visit(
    key: RegistrationKey,
    bindings: &HashMap<RegistrationKey, Binding>,
    marks: &mut HashMap<RegistrationKey, Mark>,
    path: &mut Vec<RegistrationKey>,
) -> Result<(), ContainerError> {
    let name = |k: &RegistrationKey| {
        bindings
            .get(k)
            .map(|binding| binding.class.short_name())
            .unwrap_or("<unbound>")
    };

    match marks.get(&key) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            let start = path.iter().position(|k| *k == key).unwrap_or(0);
            let mut cycle: Vec<_> = path[start..].iter().map(name).collect();
            cycle.push(name(&key));
            return Err(ContainerError::DependencyCycle { cycle });
        }
        None => {}
    }

    marks.insert(key, Mark::Visiting);
    path.push(key);
    if let Some(binding) = bindings.get(&key) {
        for dependency in &binding.dependencies {
            visit(*dependency, bindings, marks, path)?;
        }
    }
    path.pop();
    marks.insert(key, Mark::Done);
    Ok(())
}

/// Constructor arguments, in the order the registration method declared them.
pub struct Dependencies {
    owner: &'static str,
    values: std::vec::IntoIter<Instance>,
    position: usize,
}

impl Dependencies {
    pub(crate) fn new(owner: &'static str, values: Vec<Instance>) -> Self {
        Self {
            owner,
            values: values.into_iter(),
            position: 0,
        }
    }

    /// Take the next argument as an `Arc<T>`.
    #[allow(clippy::should_implement_trait)]
    pub fn next<T: Send + Sync + 'static>(&mut self) -> Result<Arc<T>> {
        let position = self.position;
        self.position += 1;

        let value = self.values.next().ok_or(ContainerError::MissingDependency {
            class: self.owner,
            position,
        })?;

        value.downcast::<T>().map_err(|_| {
            Error::from(ContainerError::DependencyMismatch {
                class: self.owner,
                position,
                expected: std::any::type_name::<T>(),
            })
        })
    }

    pub fn remaining(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ClassTarget;
    use crate::traits::{Dependency, Injectable};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    static LOG: Mutex<Vec<&'static str>> = parking_lot::const_mutex(Vec::new());

    struct C;
    #[async_trait]
    impl Injectable for C {
        async fn register() -> Result<Vec<Dependency>> {
            Ok(vec![])
        }
        fn construct(_deps: &mut Dependencies) -> Result<Self> {
            LOG.lock().push("C");
            Ok(C)
        }
    }

    struct B(Arc<C>);
    #[async_trait]
    impl Injectable for B {
        async fn register() -> Result<Vec<Dependency>> {
            Ok(vec![Dependency::on::<C>()])
        }
        fn construct(deps: &mut Dependencies) -> Result<Self> {
            LOG.lock().push("B");
            Ok(B(deps.next()?))
        }
    }

    struct A(Arc<B>, Arc<C>);
    #[async_trait]
    impl Injectable for A {
        async fn register() -> Result<Vec<Dependency>> {
            Ok(vec![Dependency::on::<B>(), Dependency::on::<C>()])
        }
        fn construct(deps: &mut Dependencies) -> Result<Self> {
            let b = deps.next()?;
            let c = deps.next()?;
            LOG.lock().push("A");
            Ok(A(b, c))
        }
    }

    #[tokio::test]
    async fn test_chain_instantiates_dependencies_first_once_each() {
        let registry = Registry::new();
        let a = registry.register_service::<A>().unwrap();
        registry.register_service::<B>().unwrap();
        registry.register_service::<C>().unwrap();

        let container = Container::new(registry);
        container.build().await.unwrap();
        assert!(LOG.lock().is_empty(), "build must not instantiate");

        container.setup_class(a).unwrap();
        assert_eq!(*LOG.lock(), vec!["C", "B", "A"]);

        let resolved_a = container.resolve::<A>().unwrap();
        let resolved_b = container.resolve::<B>().unwrap();
        assert!(Arc::ptr_eq(&resolved_a.0, &resolved_b));
        assert!(Arc::ptr_eq(&resolved_a.1, &resolved_b.0));
        assert_eq!(LOG.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_parameter() {
        struct Model;

        struct Needy;
        #[async_trait]
        impl Injectable for Needy {
            async fn register() -> Result<Vec<Dependency>> {
                Ok(vec![Dependency::on::<Model>()])
            }
            fn construct(_deps: &mut Dependencies) -> Result<Self> {
                Ok(Needy)
            }
        }

        let registry = Registry::new();
        registry
            .register_class(ClassKind::ObjectType, ClassTarget::plain::<Model>())
            .unwrap();
        registry.register_service::<Needy>().unwrap();

        let err = Container::new(registry).build().await.unwrap_err();
        assert!(
            err.to_string().ends_with("unsupported parameter definition at position 0"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_unresolved_dependency() {
        struct Unregistered;

        struct Needy;
        #[async_trait]
        impl Injectable for Needy {
            async fn register() -> Result<Vec<Dependency>> {
                Ok(vec![Dependency::on::<Unregistered>()])
            }
            fn construct(_deps: &mut Dependencies) -> Result<Self> {
                Ok(Needy)
            }
        }

        let registry = Registry::new();
        registry.register_service::<Needy>().unwrap();

        let err = Container::new(registry).build().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Container(ContainerError::UnresolvedDependency { position: 0, .. })
        ));
    }

    #[tokio::test]
    async fn test_missing_registration_method() {
        struct Bare;

        let registry = Registry::new();
        registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Bare>())
            .unwrap();

        let err = Container::new(registry).build().await.unwrap_err();
        match err {
            Error::Container(ContainerError::MissingRegistrationMethod { class }) => {
                assert!(class.ends_with("Bare"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_cycle_detected_at_build() {
        struct Ping;
        struct Pong;

        #[async_trait]
        impl Injectable for Ping {
            async fn register() -> Result<Vec<Dependency>> {
                Ok(vec![Dependency::on::<Pong>()])
            }
            fn construct(_deps: &mut Dependencies) -> Result<Self> {
                Ok(Ping)
            }
        }

        #[async_trait]
        impl Injectable for Pong {
            async fn register() -> Result<Vec<Dependency>> {
                Ok(vec![Dependency::on::<Ping>()])
            }
            fn construct(_deps: &mut Dependencies) -> Result<Self> {
                Ok(Pong)
            }
        }

        let registry = Registry::new();
        registry.register_service::<Ping>().unwrap();
        registry.register_service::<Pong>().unwrap();

        let container = Container::new(registry);
        let err = container.build().await.unwrap_err();
        assert_eq!(err.to_string(), "Dependency cycle detected: Ping -> Pong -> Ping");
        assert!(!container.is_built());
    }

    #[tokio::test]
    async fn test_registration_failure_is_fatal() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        struct Flaky;
        #[async_trait]
        impl Injectable for Flaky {
            async fn register() -> Result<Vec<Dependency>> {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Err(Error::internal("config store unreachable"))
            }
            fn construct(_deps: &mut Dependencies) -> Result<Self> {
                Ok(Flaky)
            }
        }

        let registry = Registry::new();
        registry.register_service::<Flaky>().unwrap();

        let err = Container::new(registry).build().await.unwrap_err();
        assert!(err.to_string().contains("config store unreachable"));
        assert_eq!(CALLS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_construction_error_names_class() {
        struct Broken;
        #[async_trait]
        impl Injectable for Broken {
            async fn register() -> Result<Vec<Dependency>> {
                Ok(vec![])
            }
            fn construct(_deps: &mut Dependencies) -> Result<Self> {
                Err(Error::internal("no database"))
            }
        }

        let registry = Registry::new();
        let key = registry.register_service::<Broken>().unwrap();
        let container = Container::new(registry);
        container.build().await.unwrap();

        let err = container.setup_class(key).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Broken"), "{message}");
        assert!(message.ends_with("no database"), "{message}");
    }

    #[tokio::test]
    async fn test_method_not_found_without_routes() {
        struct Plain;
        #[async_trait]
        impl Injectable for Plain {
            async fn register() -> Result<Vec<Dependency>> {
                Ok(vec![])
            }
            fn construct(_deps: &mut Dependencies) -> Result<Self> {
                Ok(Plain)
            }
        }

        let registry = Registry::new();
        let key = registry.register_service::<Plain>().unwrap();
        let container = Container::new(registry);
        container.build().await.unwrap();

        let err = container.get_class_method(key, "list").unwrap_err();
        assert!(matches!(
            err,
            Error::Container(ContainerError::MethodNotFound { ref method, .. }) if method == "list"
        ));
    }

    #[test]
    fn test_unbuilt_container_has_no_bindings() {
        struct Lonely;
        let registry = Registry::new();
        let key = registry
            .register_class(ClassKind::Injectable, ClassTarget::plain::<Lonely>())
            .unwrap();

        let container = Container::new(registry);
        assert!(!container.is_built());
        assert!(matches!(
            container.setup_class(key),
            Err(Error::Container(ContainerError::NotBound(_)))
        ));
    }

    #[test]
    fn test_dependencies_positional_errors() {
        let mut deps = Dependencies::new("Owner", vec![Arc::new(5u32) as Instance]);
        assert_eq!(deps.remaining(), 1);

        let err = deps.next::<String>().unwrap_err();
        assert!(err.to_string().contains("position 0"));

        let err = deps.next::<u32>().unwrap_err();
        assert_eq!(err.to_string(), "Owner: missing constructor argument at position 1");
    }
}
