//! Named service registry with lazy construction and cycle detection.
//!
//! Services are registered by name with a [`ServiceDescriptor`] and built on first
//! [`ServiceRegistry::resolve`]. Declared dependencies are resolved depth-first, in
//! declaration order, and handed to the factory positionally.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::errors::ServiceError;

/// A resolved service. Consumers downcast via [`ServiceRegistry::resolve_as`].
pub type ServiceInstance = Arc<dyn Any + Send + Sync>;

/// Constructor receiving the resolved dependencies in declaration order.
pub type ServiceFactory =
    Arc<dyn Fn(Vec<ServiceInstance>) -> anyhow::Result<ServiceInstance> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceLifecycle {
    Singleton,
    Transient,
    /// Treated as transient at this layer.
    Scoped,
}

impl fmt::Display for ServiceLifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServiceLifecycle::Singleton => "singleton",
            ServiceLifecycle::Transient => "transient",
            ServiceLifecycle::Scoped => "scoped",
        };
        f.write_str(s)
    }
}

/// How an instance is produced.
#[derive(Clone)]
enum ServiceSource {
    /// Built by calling the factory with resolved dependencies.
    Factory(ServiceFactory),
    /// A pre-built implementation, shared by reference on every resolve.
    Implementation(ServiceInstance),
}

/// Built only through [`ServiceDescriptor::factory`] or [`ServiceDescriptor::implementation`],
/// so a pre-built implementation is always a singleton.
#[derive(Clone)]
pub struct ServiceDescriptor {
    pub name: String,
    pub dependencies: Vec<String>,
    lifecycle: ServiceLifecycle,
    source: ServiceSource,
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self.source {
            ServiceSource::Factory(_) => "factory",
            ServiceSource::Implementation(_) => "implementation",
        };
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("lifecycle", &self.lifecycle)
            .field("source", &source)
            .finish()
    }
}

impl ServiceDescriptor {
    pub fn factory<F>(name: impl Into<String>, lifecycle: ServiceLifecycle, factory: F) -> Self
    where
        F: Fn(Vec<ServiceInstance>) -> anyhow::Result<ServiceInstance> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            lifecycle,
            source: ServiceSource::Factory(Arc::new(factory)),
        }
    }

    /// Register an already-built value. Always a singleton.
    pub fn implementation<T>(name: impl Into<String>, value: Arc<T>) -> Self
    where
        T: Any + Send + Sync,
    {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            lifecycle: ServiceLifecycle::Singleton,
            source: ServiceSource::Implementation(value),
        }
    }

    pub fn lifecycle(&self) -> ServiceLifecycle {
        self.lifecycle
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }
}

/// Introspection row returned by [`ServiceRegistry::list_services`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub lifecycle: ServiceLifecycle,
    pub has_instance: bool,
}

#[derive(Default)]
struct Descriptors {
    order: Vec<String>,
    by_name: HashMap<String, ServiceDescriptor>,
}

/// Dependency-injection container shared by all modules of a runtime.
#[derive(Default)]
pub struct ServiceRegistry {
    descriptors: RwLock<Descriptors>,
    instances: RwLock<HashMap<String, ServiceInstance>>,
    resolving: Mutex<Resolving>,
}

/// Names currently being resolved; `stack` keeps resolution order for error paths.
#[derive(Default)]
struct Resolving {
    set: HashSet<String>,
    stack: Vec<String>,
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.descriptors.read().order)
            .field("instances_count", &self.instances.read().len())
            .finish()
    }
}

/// Clears a resolving mark when dropped, on success and on error alike.
struct ResolvingGuard<'a> {
    registry: &'a ServiceRegistry,
    name: String,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        let mut resolving = self.registry.resolving.lock();
        resolving.set.remove(&self.name);
        if let Some(pos) = resolving.stack.iter().rposition(|n| n == &self.name) {
            resolving.stack.remove(pos);
        }
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store or overwrite the descriptor for `descriptor.name`.
    ///
    /// Dependencies are not checked here; they are resolved lazily.
    pub fn register(&self, descriptor: ServiceDescriptor) {
        let name = descriptor.name.clone();
        {
            let mut d = self.descriptors.write();
            if d.by_name.insert(name.clone(), descriptor).is_none() {
                d.order.push(name.clone());
            }
        }
        // a cached singleton belongs to the replaced descriptor
        self.instances.write().remove(&name);
        tracing::debug!(service = %name, "Service registered");
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.descriptors.read().by_name.contains_key(name)
    }

    /// Resolve a service by name, constructing it (and its dependencies) as needed.
    pub fn resolve(&self, name: &str) -> Result<ServiceInstance, ServiceError> {
        let descriptor = self
            .descriptors
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::ServiceNotFound(name.to_string()))?;

        if descriptor.lifecycle == ServiceLifecycle::Singleton {
            if let Some(existing) = self.instances.read().get(name) {
                return Ok(existing.clone());
            }
        }

        let _guard = self.mark_resolving(name)?;

        let mut deps = Vec::with_capacity(descriptor.dependencies.len());
        for dep in &descriptor.dependencies {
            deps.push(self.resolve(dep)?);
        }

        let instance = match &descriptor.source {
            ServiceSource::Factory(factory) => {
                factory(deps).map_err(|source| ServiceError::ServiceConstruction {
                    service: name.to_string(),
                    source,
                })?
            }
            ServiceSource::Implementation(value) => value.clone(),
        };

        if descriptor.lifecycle == ServiceLifecycle::Singleton {
            self.instances
                .write()
                .insert(name.to_string(), instance.clone());
        }

        tracing::debug!(service = %name, lifecycle = %descriptor.lifecycle, "Service resolved");
        Ok(instance)
    }

    /// Resolve and downcast to a concrete type.
    pub fn resolve_as<T>(&self, name: &str) -> Result<Arc<T>, ServiceError>
    where
        T: Any + Send + Sync,
    {
        self.resolve(name)?
            .downcast::<T>()
            .map_err(|_| ServiceError::ServiceTypeMismatch {
                service: name.to_string(),
                expected: std::any::type_name::<T>(),
            })
    }

    /// Drop cached singletons and resolving marks; descriptors are kept.
    pub fn clear(&self) {
        self.instances.write().clear();
        let mut resolving = self.resolving.lock();
        resolving.set.clear();
        resolving.stack.clear();
    }

    pub fn list_services(&self) -> Vec<ServiceInfo> {
        let d = self.descriptors.read();
        let instances = self.instances.read();
        d.order
            .iter()
            .filter_map(|name| d.by_name.get(name))
            .map(|desc| ServiceInfo {
                name: desc.name.clone(),
                lifecycle: desc.lifecycle,
                has_instance: instances.contains_key(&desc.name),
            })
            .collect()
    }

    fn mark_resolving(&self, name: &str) -> Result<ResolvingGuard<'_>, ServiceError> {
        let mut resolving = self.resolving.lock();
        if !resolving.set.insert(name.to_string()) {
            let start = resolving
                .stack
                .iter()
                .position(|n| n == name)
                .unwrap_or(0);
            let mut path: Vec<String> = resolving.stack[start..].to_vec();
            path.push(name.to_string());
            tracing::error!(service = %name, path = ?path, "Circular service dependency");
            return Err(ServiceError::CircularDependency {
                service: name.to_string(),
                path,
            });
        }
        resolving.stack.push(name.to_string());
        Ok(ResolvingGuard {
            registry: self,
            name: name.to_string(),
        })
    }

    #[cfg(test)]
    fn resolving_is_empty(&self) -> bool {
        let r = self.resolving.lock();
        r.set.is_empty() && r.stack.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Counter(usize);

    fn counting_factory(
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(Vec<ServiceInstance>) -> anyhow::Result<ServiceInstance> + Send + Sync {
        move |_deps| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Counter(n)) as ServiceInstance)
        }
    }

    #[test]
    fn singleton_returns_same_instance() {
        let reg = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        reg.register(ServiceDescriptor::factory(
            "counter",
            ServiceLifecycle::Singleton,
            counting_factory(calls.clone()),
        ));

        let a = reg.resolve("counter").unwrap();
        let b = reg.resolve("counter").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn transient_and_scoped_build_fresh_instances() {
        let reg = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        reg.register(ServiceDescriptor::factory(
            "t",
            ServiceLifecycle::Transient,
            counting_factory(calls.clone()),
        ));
        reg.register(ServiceDescriptor::factory(
            "s",
            ServiceLifecycle::Scoped,
            counting_factory(calls.clone()),
        ));

        let a = reg.resolve_as::<Counter>("t").unwrap();
        let b = reg.resolve_as::<Counter>("t").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_ne!(a.0, b.0);

        let c = reg.resolve("s").unwrap();
        let d = reg.resolve("s").unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn implementation_is_shared_across_resolves() {
        let reg = ServiceRegistry::new();
        let desc = ServiceDescriptor::implementation("config", Arc::new(Counter(7)));
        assert_eq!(desc.lifecycle(), ServiceLifecycle::Singleton);
        reg.register(desc);

        let a = reg.resolve_as::<Counter>("config").unwrap();
        let b = reg.resolve_as::<Counter>("config").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.0, 7);
        assert_eq!(reg.list_services()[0].lifecycle, ServiceLifecycle::Singleton);
    }

    #[test]
    fn missing_service_is_reported() {
        let reg = ServiceRegistry::new();
        match reg.resolve("nope") {
            Err(ServiceError::ServiceNotFound(name)) => assert_eq!(name, "nope"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn dependencies_passed_in_declaration_order() {
        let reg = ServiceRegistry::new();
        reg.register(ServiceDescriptor::implementation(
            "host",
            Arc::new("localhost".to_string()),
        ));
        reg.register(ServiceDescriptor::implementation("port", Arc::new(8080u16)));
        reg.register(
            ServiceDescriptor::factory("addr", ServiceLifecycle::Transient, |deps| {
                let host = deps[0]
                    .clone()
                    .downcast::<String>()
                    .map_err(|_| anyhow::anyhow!("host is not a string"))?;
                let port = deps[1]
                    .clone()
                    .downcast::<u16>()
                    .map_err(|_| anyhow::anyhow!("port is not a u16"))?;
                Ok(Arc::new(format!("{host}:{port}")) as ServiceInstance)
            })
            .with_dependencies(["host", "port"]),
        );

        let addr = reg.resolve_as::<String>("addr").unwrap();
        assert_eq!(addr.as_str(), "localhost:8080");
    }

    #[test]
    fn cycle_detected_and_marker_cleared() {
        let reg = ServiceRegistry::new();
        let noop = |_deps: Vec<ServiceInstance>| -> anyhow::Result<ServiceInstance> {
            Ok(Arc::new(()))
        };
        reg.register(
            ServiceDescriptor::factory("a", ServiceLifecycle::Singleton, noop).with_dependencies(["b"]),
        );
        reg.register(
            ServiceDescriptor::factory("b", ServiceLifecycle::Singleton, noop).with_dependencies(["c"]),
        );
        reg.register(
            ServiceDescriptor::factory("c", ServiceLifecycle::Singleton, noop).with_dependencies(["a"]),
        );
        reg.register(ServiceDescriptor::factory(
            "unrelated",
            ServiceLifecycle::Singleton,
            noop,
        ));

        match reg.resolve("a") {
            Err(ServiceError::CircularDependency { service, path }) => {
                assert_eq!(service, "a");
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(reg.resolving_is_empty());
        assert!(reg.resolve("unrelated").is_ok());
        // nothing in the failed chain was cached
        assert!(reg
            .list_services()
            .iter()
            .filter(|s| s.name != "unrelated")
            .all(|s| !s.has_instance));
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let reg = ServiceRegistry::new();
        reg.register(
            ServiceDescriptor::factory("loop", ServiceLifecycle::Transient, |_| {
                Ok(Arc::new(1u8) as ServiceInstance)
            })
            .with_dependencies(["loop"]),
        );
        assert!(matches!(
            reg.resolve("loop"),
            Err(ServiceError::CircularDependency { .. })
        ));
        assert!(reg.resolving_is_empty());
    }

    #[test]
    fn factory_error_clears_marker() {
        let reg = ServiceRegistry::new();
        reg.register(ServiceDescriptor::factory(
            "broken",
            ServiceLifecycle::Singleton,
            |_| Err(anyhow::anyhow!("boom")),
        ));
        assert!(matches!(
            reg.resolve("broken"),
            Err(ServiceError::ServiceConstruction { .. })
        ));
        assert!(reg.resolving_is_empty());
    }

    #[test]
    fn missing_dependency_surfaces_not_found() {
        let reg = ServiceRegistry::new();
        reg.register(
            ServiceDescriptor::factory("needs", ServiceLifecycle::Singleton, |_| {
                Ok(Arc::new(()) as ServiceInstance)
            })
            .with_dependencies(["ghost"]),
        );
        match reg.resolve("needs") {
            Err(ServiceError::ServiceNotFound(name)) => assert_eq!(name, "ghost"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(reg.resolving_is_empty());
    }

    #[test]
    fn type_mismatch_is_reported() {
        let reg = ServiceRegistry::new();
        reg.register(ServiceDescriptor::implementation("n", Arc::new(5u32)));
        assert!(matches!(
            reg.resolve_as::<String>("n"),
            Err(ServiceError::ServiceTypeMismatch { .. })
        ));
        assert_eq!(*reg.resolve_as::<u32>("n").unwrap(), 5);
    }

    #[test]
    fn clear_keeps_descriptors_and_list_reports_instances() {
        let reg = ServiceRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        reg.register(ServiceDescriptor::factory(
            "first",
            ServiceLifecycle::Singleton,
            counting_factory(calls.clone()),
        ));
        reg.register(ServiceDescriptor::factory(
            "second",
            ServiceLifecycle::Transient,
            counting_factory(calls.clone()),
        ));

        reg.resolve("first").unwrap();
        reg.resolve("second").unwrap();

        let listed = reg.list_services();
        assert_eq!(
            listed,
            vec![
                ServiceInfo {
                    name: "first".into(),
                    lifecycle: ServiceLifecycle::Singleton,
                    has_instance: true,
                },
                ServiceInfo {
                    name: "second".into(),
                    lifecycle: ServiceLifecycle::Transient,
                    has_instance: false,
                },
            ]
        );

        reg.clear();
        assert!(reg.is_registered("first"));
        assert!(!reg.list_services()[0].has_instance);

        // rebuilt after clear
        reg.resolve("first").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn re_registration_overwrites_and_drops_cached_instance() {
        let reg = ServiceRegistry::new();
        reg.register(ServiceDescriptor::implementation("v", Arc::new(1u32)));
        assert_eq!(*reg.resolve_as::<u32>("v").unwrap(), 1);

        reg.register(ServiceDescriptor::implementation("v", Arc::new(2u32)));
        assert_eq!(*reg.resolve_as::<u32>("v").unwrap(), 2);
        assert_eq!(reg.list_services().len(), 1);
    }
}
