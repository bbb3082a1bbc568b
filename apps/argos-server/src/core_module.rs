//! Built-in `argos-core` module: publishes the logger, cache and security services
//! and reports system startup/shutdown.

use std::any::Any;
use std::num::NonZeroUsize;
use std::sync::Arc;

use anyhow::Result;
use argos_modkit::{
    events, ConfigMap, HookPayload, Module, ModuleBase, ModuleCtx, ModuleKind,
    ModuleMetadata, ServiceDescriptor, ServiceInstance, ServiceLifecycle,
};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Deserialize;

pub const CORE_MODULE: &str = "argos-core";
pub const LOGGER_SERVICE: &str = "logger";
pub const CACHE_SERVICE: &str = "cache";
pub const SECURITY_SERVICE: &str = "security";

const CORE_HOOK_PRIORITY: i32 = 100;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoreConfig {
    /// Entries kept by the in-memory cache before the oldest is evicted.
    pub cache_capacity: usize,
    pub max_payload_bytes: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            max_payload_bytes: 1024 * 1024,
        }
    }
}

/// Component-scoped facade over `tracing`.
#[derive(Debug, Clone)]
pub struct CoreLogger {
    component: String,
}

impl CoreLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn info(&self, message: &str) {
        tracing::info!(component = %self.component, "{message}");
    }

    pub fn warn(&self, message: &str) {
        tracing::warn!(component = %self.component, "{message}");
    }
}

/// Bounded in-memory key/value cache; the least recently used entry is evicted first.
#[derive(Debug)]
pub struct MemoryCache {
    entries: Mutex<LruCache<String, serde_json::Value>>,
    logger: Arc<CoreLogger>,
}

impl MemoryCache {
    pub fn new(capacity: usize, logger: Arc<CoreLogger>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            logger,
        }
    }

    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.lock().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        let evicted = self.entries.lock().push(key.clone(), value);
        if let Some((old_key, _)) = evicted.filter(|(k, _)| *k != key) {
            self.logger.warn(&format!("cache full, evicted '{old_key}'"));
        }
    }

    pub fn remove(&self, key: &str) -> Option<serde_json::Value> {
        self.entries.lock().pop(key)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Request admission rules shared by transports.
#[derive(Debug, Clone)]
pub struct SecurityPolicy {
    max_payload_bytes: usize,
}

impl SecurityPolicy {
    pub fn new(max_payload_bytes: usize) -> Self {
        Self { max_payload_bytes }
    }

    pub fn check_payload(&self, len: usize) -> Result<()> {
        if len > self.max_payload_bytes {
            anyhow::bail!(
                "payload of {len} bytes exceeds the {} byte limit",
                self.max_payload_bytes
            );
        }
        Ok(())
    }
}

fn downcast_logger(deps: &[ServiceInstance]) -> Result<Arc<CoreLogger>> {
    deps.first()
        .cloned()
        .and_then(|d| d.downcast::<CoreLogger>().ok())
        .ok_or_else(|| anyhow::anyhow!("'{LOGGER_SERVICE}' dependency is not a CoreLogger"))
}

pub struct CoreModule {
    base: ModuleBase,
}

impl Default for CoreModule {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreModule {
    pub fn new() -> Self {
        let metadata = ModuleMetadata::new(CORE_MODULE, "1.1.0", ModuleKind::Core)
            .with_description("Core services of the Argos runtime")
            .with_author("Argos Team")
            .with_main("CoreModule")
            .with_provides([LOGGER_SERVICE, CACHE_SERVICE, SECURITY_SERVICE])
            .with_priority(100);
        Self {
            base: ModuleBase::new(metadata),
        }
    }

    fn logger(&self) -> Option<Arc<CoreLogger>> {
        self.base.get_service::<CoreLogger>(LOGGER_SERVICE)
    }
}

#[async_trait]
impl Module for CoreModule {
    fn metadata(&self) -> &ModuleMetadata {
        self.base.metadata()
    }

    async fn initialize(&self, ctx: &ModuleCtx) -> Result<()> {
        let cfg: CoreConfig = ctx.config_as()?;
        let logger = Arc::new(CoreLogger::new(CORE_MODULE));
        logger.info("initializing core module");
        self.base.register_service(LOGGER_SERVICE, logger.clone());

        let services = ctx.services();
        services.register(ServiceDescriptor::implementation(LOGGER_SERVICE, logger));

        let capacity = cfg.cache_capacity;
        services.register(
            ServiceDescriptor::factory(CACHE_SERVICE, ServiceLifecycle::Singleton, move |deps| {
                let logger = downcast_logger(&deps)?;
                let cache: ServiceInstance = Arc::new(MemoryCache::new(capacity, logger));
                Ok(cache)
            })
            .with_dependencies([LOGGER_SERVICE]),
        );

        let max_payload = cfg.max_payload_bytes;
        services.register(ServiceDescriptor::factory(
            SECURITY_SERVICE,
            ServiceLifecycle::Singleton,
            move |_deps| {
                let policy: ServiceInstance = Arc::new(SecurityPolicy::new(max_payload));
                Ok(policy)
            },
        ));

        let hooks = ctx.hooks();
        for event in [events::SYSTEM_STARTUP, events::SYSTEM_SHUTDOWN] {
            hooks.register_fn(
                event,
                CORE_HOOK_PRIORITY,
                CORE_MODULE,
                move |payload: HookPayload| async move {
                    tracing::info!(event, payload = ?payload, "core: system event");
                    anyhow::Ok(serde_json::Value::Null)
                },
            );
        }
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        if let Some(logger) = self.logger() {
            logger.info("core module started");
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        if let Some(logger) = self.logger() {
            logger.info("core module stopped");
        }
        Ok(())
    }

    async fn destroy(&self) -> Result<()> {
        if let Some(logger) = self.logger() {
            logger.info("core module destroyed");
        }
        Ok(())
    }

    fn set_config(&self, config: &ConfigMap) {
        self.base.set_config(config);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argos_modkit::ModuleRuntime;
    use serde_json::json;

    #[tokio::test]
    async fn core_publishes_services_and_hooks() {
        let runtime = ModuleRuntime::new();
        runtime
            .register_module(Arc::new(CoreModule::new()))
            .await
            .unwrap();
        runtime
            .set_module_config(
                CORE_MODULE,
                json!({ "cache_capacity": 2 }).as_object().unwrap().clone(),
            )
            .unwrap();
        runtime.initialize_all().await.unwrap();

        let services = runtime.services();
        let logger = services.resolve_as::<CoreLogger>(LOGGER_SERVICE).unwrap();
        let cache = services.resolve_as::<MemoryCache>(CACHE_SERVICE).unwrap();
        let again = services.resolve_as::<MemoryCache>(CACHE_SERVICE).unwrap();
        assert!(Arc::ptr_eq(&cache, &again));
        assert_eq!(logger.component, CORE_MODULE);

        cache.set("a", json!(1));
        cache.set("b", json!(2));
        cache.set("c", json!(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("c"), Some(json!(3)));

        let security = services.resolve_as::<SecurityPolicy>(SECURITY_SERVICE).unwrap();
        assert!(security.check_payload(10).is_ok());
        assert!(security.check_payload(2 * 1024 * 1024).is_err());

        let hooks = runtime.hooks().list_hooks();
        let startup = &hooks[events::SYSTEM_STARTUP];
        assert_eq!(startup[0].priority, 100);
        assert_eq!(startup[0].owner, CORE_MODULE);
        assert_eq!(hooks[events::SYSTEM_SHUTDOWN].len(), 1);
    }

    #[tokio::test]
    async fn unknown_core_config_key_fails_initialization() {
        let runtime = ModuleRuntime::new();
        runtime
            .register_module(Arc::new(CoreModule::new()))
            .await
            .unwrap();
        runtime
            .set_module_config(
                CORE_MODULE,
                json!({ "cache_size": 2 }).as_object().unwrap().clone(),
            )
            .unwrap();

        let err = runtime.initialize_all().await.unwrap_err();
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("argos-core"));
    }

    #[test]
    fn removed_entry_frees_a_slot() {
        let cache = MemoryCache::new(2, Arc::new(CoreLogger::new("test")));
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        assert_eq!(cache.remove("a"), Some(json!(1)));
        cache.set("c", json!(3));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_some());
        assert!(!cache.is_empty());
    }

    #[test]
    fn recently_read_entry_survives_eviction() {
        let cache = MemoryCache::new(2, Arc::new(CoreLogger::new("test")));
        cache.set("a", json!(1));
        cache.set("b", json!(2));
        assert_eq!(cache.get("a"), Some(json!(1)));
        cache.set("c", json!(3));

        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("a"), Some(json!(1)));

        // overwriting a key is not an eviction
        cache.set("c", json!(4));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("c"), Some(json!(4)));

        let tiny = MemoryCache::new(0, Arc::new(CoreLogger::new("test")));
        tiny.set("x", json!(1));
        tiny.set("y", json!(2));
        assert_eq!(tiny.len(), 1);
    }
}
