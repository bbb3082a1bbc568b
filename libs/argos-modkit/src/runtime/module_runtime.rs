//! Module Runtime - owns registered modules and drives them through their lifecycle
//!
//! Every transition is wrapped by a pre/post hook pair on the shared [`HookBus`].
//! Transitions run one at a time; locks are never held across an await.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use crate::context::{ConfigMap, ConfigProvider, ModuleCtx};
use crate::contracts::Module;
use crate::errors::{Phase, RuntimeError};
use crate::hooks::{events, HookBus, HookPayload};
use crate::metadata::ModuleKind;
use crate::registry::{ModuleConfig, ModuleRecord, ModuleRegistry, ModuleState};
use crate::services::{ServiceInfo, ServiceRegistry};

/// Read-only view of one module, as returned by [`ModuleRuntime::get_module_info`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub version: String,
    pub enabled: bool,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    pub state: ModuleState,
    pub dependencies: Vec<String>,
    pub last_error: Option<String>,
}

/// Aggregate runtime snapshot for dashboards and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeStats {
    pub total_modules: usize,
    pub enabled_modules: usize,
    pub disabled_modules: usize,
    pub core_modules: usize,
    pub plugins: usize,
    pub extensions: usize,
    pub load_order: Vec<String>,
    pub services: Vec<ServiceInfo>,
    pub hooks: Vec<String>,
}

struct Transition {
    phase: Phase,
    pre: &'static str,
    post: &'static str,
    done: ModuleState,
    /// Disabled modules are skipped only for initialize/start.
    skip_disabled: bool,
}

const INITIALIZE: Transition = Transition {
    phase: Phase::Initialize,
    pre: events::MODULE_PRE_INIT,
    post: events::MODULE_POST_INIT,
    done: ModuleState::Initialized,
    skip_disabled: true,
};

const START: Transition = Transition {
    phase: Phase::Start,
    pre: events::MODULE_PRE_START,
    post: events::MODULE_POST_START,
    done: ModuleState::Started,
    skip_disabled: true,
};

const STOP: Transition = Transition {
    phase: Phase::Stop,
    pre: events::MODULE_PRE_STOP,
    post: events::MODULE_POST_STOP,
    done: ModuleState::Stopped,
    skip_disabled: false,
};

const DESTROY: Transition = Transition {
    phase: Phase::Destroy,
    pre: events::MODULE_PRE_DESTROY,
    post: events::MODULE_POST_DESTROY,
    done: ModuleState::Destroyed,
    skip_disabled: false,
};

/// Owns the module set, the shared service registry and the hook bus.
///
/// Construct one per embedding process (or per test) and share it by `Arc`.
pub struct ModuleRuntime {
    registry: RwLock<ModuleRegistry>,
    load_order: RwLock<Vec<String>>,
    services: Arc<ServiceRegistry>,
    hooks: Arc<HookBus>,
}

impl std::fmt::Debug for ModuleRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRuntime")
            .field("modules", &self.module_names())
            .field("load_order", &*self.load_order.read())
            .finish()
    }
}

impl Default for ModuleRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRuntime {
    pub fn new() -> Self {
        Self::with_parts(Arc::new(ServiceRegistry::new()), Arc::new(HookBus::new()))
    }

    /// Build around an existing registry and bus, e.g. ones shared with other components.
    pub fn with_parts(services: Arc<ServiceRegistry>, hooks: Arc<HookBus>) -> Self {
        Self {
            registry: RwLock::new(ModuleRegistry::default()),
            load_order: RwLock::new(Vec::new()),
            services,
            hooks,
        }
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn hooks(&self) -> &Arc<HookBus> {
        &self.hooks
    }

    /// Validate and store a module. Its declared dependencies must already be registered.
    ///
    /// Registering a name again replaces the record and drops the hooks owned by it.
    pub async fn register_module(&self, module: Arc<dyn Module>) -> Result<(), RuntimeError> {
        let meta = module.metadata().clone();
        meta.validate()
            .map_err(|reason| RuntimeError::InvalidMetadata {
                module: meta.name.clone(),
                reason,
            })?;

        {
            let mut registry = self.registry.write();
            if let Some(missing) = meta.dependencies.iter().find(|d| !registry.contains(d)) {
                return Err(RuntimeError::DependencyNotFound {
                    module: meta.name.clone(),
                    dependency: missing.clone(),
                });
            }
            if registry.insert(ModuleRecord::new(module)) {
                tracing::warn!(module = %meta.name, "Module re-registered; previous record replaced");
                self.hooks.remove_by_module(&meta.name);
            }
        }

        tracing::info!(module = %meta.name, version = %meta.version, "Module registered");
        self.hooks
            .execute(events::MODULE_REGISTERED, HookPayload::Module(meta))
            .await;
        Ok(())
    }

    /// Remove a module and every hook it owns. Fails while other modules depend on it.
    ///
    /// The module is not stopped or destroyed here.
    pub async fn unregister_module(&self, name: &str) -> Result<(), RuntimeError> {
        let record = {
            let mut registry = self.registry.write();
            if !registry.contains(name) {
                return Err(RuntimeError::ModuleNotFound(name.to_string()));
            }
            let dependents = registry.dependents_of(name);
            if !dependents.is_empty() {
                return Err(RuntimeError::DependencyInUse {
                    module: name.to_string(),
                    dependents,
                });
            }
            registry
                .remove(name)
                .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_string()))?
        };
        self.load_order.write().retain(|n| n != name);
        self.hooks.remove_by_module(name);

        tracing::info!(module = %name, "Module unregistered");
        let payload = HookPayload::Module(record.module.metadata().clone());
        self.hooks
            .execute(events::MODULE_UNREGISTERED, payload)
            .await;
        Ok(())
    }

    pub async fn initialize_module(&self, name: &str) -> Result<(), RuntimeError> {
        self.transition(name, &INITIALIZE).await
    }

    /// Sort all modules by dependency and initialize them one by one.
    ///
    /// The computed order is stored before the first module runs, so a partial
    /// failure can still be unwound with [`ModuleRuntime::stop_all`].
    pub async fn initialize_all(&self) -> Result<(), RuntimeError> {
        tracing::info!("Phase: init");
        let order = self.resolve_load_order()?;
        *self.load_order.write() = order.clone();

        for name in &order {
            self.initialize_module(name).await?;
        }

        tracing::info!(order = ?order, "All modules initialized");
        Ok(())
    }

    pub async fn start_module(&self, name: &str) -> Result<(), RuntimeError> {
        self.transition(name, &START).await
    }

    /// Start modules in the order computed by the last [`ModuleRuntime::initialize_all`].
    pub async fn start_all(&self) -> Result<(), RuntimeError> {
        tracing::info!("Phase: start");
        for name in self.load_order() {
            self.start_module(&name).await?;
        }
        tracing::info!("All modules started");
        Ok(())
    }

    pub async fn stop_module(&self, name: &str) -> Result<(), RuntimeError> {
        self.transition(name, &STOP).await
    }

    /// Stop modules in reverse load order, dependents before their dependencies.
    pub async fn stop_all(&self) -> Result<(), RuntimeError> {
        tracing::info!("Phase: stop");
        for name in self.load_order().iter().rev() {
            self.stop_module(name).await?;
        }
        tracing::info!("All modules stopped");
        Ok(())
    }

    /// Stop then start one module. Dependents and dependencies are not touched.
    pub async fn reload_module(&self, name: &str) -> Result<(), RuntimeError> {
        let payload = self.payload(name)?;
        tracing::info!(module = %name, "Reloading module");

        self.stop_module(name).await?;
        self.hooks
            .execute(events::MODULE_PRE_RELOAD, payload.clone())
            .await;
        self.start_module(name).await?;
        self.hooks.execute(events::MODULE_POST_RELOAD, payload).await;

        tracing::info!(module = %name, "Module reloaded");
        Ok(())
    }

    /// Destroy one module and drop the hooks it registered.
    pub async fn destroy_module(&self, name: &str) -> Result<(), RuntimeError> {
        self.transition(name, &DESTROY).await?;
        self.hooks.remove_by_module(name);
        Ok(())
    }

    pub async fn destroy_all(&self) -> Result<(), RuntimeError> {
        tracing::info!("Phase: destroy");
        for name in self.load_order().iter().rev() {
            self.destroy_module(name).await?;
        }
        tracing::info!("All modules destroyed");
        Ok(())
    }

    /// Shallow-merge `partial` into the module config and push the result into the module.
    pub fn set_module_config(&self, name: &str, partial: ConfigMap) -> Result<(), RuntimeError> {
        let (module, merged) = {
            let mut registry = self.registry.write();
            let record = registry
                .get_mut(name)
                .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_string()))?;
            for (k, v) in partial {
                record.config.config.insert(k, v);
            }
            (record.module.clone(), record.config.config.clone())
        };
        module.set_config(&merged);
        tracing::debug!(module = %name, "Module config updated");
        Ok(())
    }

    /// Flip the enabled flag. A started module keeps running; only later
    /// initialize/start calls are affected.
    pub fn set_module_enabled(&self, name: &str, enabled: bool) -> Result<(), RuntimeError> {
        let mut registry = self.registry.write();
        let record = registry
            .get_mut(name)
            .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_string()))?;
        record.config.enabled = enabled;
        tracing::info!(module = %name, enabled, "Module enabled flag changed");
        Ok(())
    }

    /// Push config sections and enabled overrides from `provider` into registered modules.
    pub fn apply_config(&self, provider: &dyn ConfigProvider) -> Result<(), RuntimeError> {
        for name in self.module_names() {
            if let Some(section) = provider.get_module_config(&name) {
                match section {
                    serde_json::Value::Object(map) => self.set_module_config(&name, map.clone())?,
                    serde_json::Value::Null => {}
                    _ => {
                        tracing::warn!(module = %name, "Ignoring non-object module config section")
                    }
                }
            }
            if let Some(enabled) = provider.module_enabled(&name) {
                self.set_module_enabled(&name, enabled)?;
            }
        }
        Ok(())
    }

    /// Compute the dependency order over all registered modules without storing it.
    pub fn resolve_load_order(&self) -> Result<Vec<String>, RuntimeError> {
        self.registry.read().load_order()
    }

    /// Order stored by the last [`ModuleRuntime::initialize_all`].
    pub fn load_order(&self) -> Vec<String> {
        self.load_order.read().clone()
    }

    /// Registered module names in registration order.
    pub fn module_names(&self) -> Vec<String> {
        self.registry.read().names().to_vec()
    }

    pub fn get_module(&self, name: &str) -> Option<Arc<dyn Module>> {
        self.registry.read().get(name).map(|r| r.module.clone())
    }

    pub fn module_config(&self, name: &str) -> Option<ModuleConfig> {
        self.registry.read().get(name).map(|r| r.config.clone())
    }

    pub fn module_state(&self, name: &str) -> Option<ModuleState> {
        self.registry.read().get(name).map(|r| r.state)
    }

    pub fn get_module_info(&self) -> Vec<ModuleInfo> {
        self.registry
            .read()
            .iter()
            .map(|r| {
                let meta = r.module.metadata();
                ModuleInfo {
                    name: meta.name.clone(),
                    version: meta.version.clone(),
                    enabled: r.config.enabled,
                    kind: meta.kind,
                    state: r.state,
                    dependencies: meta.dependencies.clone(),
                    last_error: r.last_error.clone(),
                }
            })
            .collect()
    }

    pub fn get_stats(&self) -> RuntimeStats {
        let (total, enabled, core, plugins, extensions) = {
            let registry = self.registry.read();
            let mut enabled = 0;
            let (mut core, mut plugins, mut extensions) = (0, 0, 0);
            for r in registry.iter() {
                if r.config.enabled {
                    enabled += 1;
                }
                match r.module.metadata().kind {
                    ModuleKind::Core => core += 1,
                    ModuleKind::Plugin => plugins += 1,
                    ModuleKind::Extension => extensions += 1,
                }
            }
            (registry.len(), enabled, core, plugins, extensions)
        };

        RuntimeStats {
            total_modules: total,
            enabled_modules: enabled,
            disabled_modules: total - enabled,
            core_modules: core,
            plugins,
            extensions,
            load_order: self.load_order(),
            services: self.services.list_services(),
            hooks: self.hooks.hook_names(),
        }
    }

    fn payload(&self, name: &str) -> Result<HookPayload, RuntimeError> {
        self.registry
            .read()
            .get(name)
            .map(|r| HookPayload::Module(r.module.metadata().clone()))
            .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_string()))
    }

    fn set_state(&self, name: &str, state: ModuleState, error: Option<String>) {
        if let Some(record) = self.registry.write().get_mut(name) {
            record.state = state;
            record.last_error = error;
        }
    }

    async fn transition(&self, name: &str, t: &Transition) -> Result<(), RuntimeError> {
        let (module, enabled, config) = {
            let registry = self.registry.read();
            let record = registry
                .get(name)
                .ok_or_else(|| RuntimeError::ModuleNotFound(name.to_string()))?;
            (
                record.module.clone(),
                record.config.enabled,
                record.config.config.clone(),
            )
        };

        if t.skip_disabled && !enabled {
            tracing::warn!(module = %name, phase = %t.phase, "Module disabled; skipping");
            return Ok(());
        }

        let payload = HookPayload::Module(module.metadata().clone());
        self.hooks.execute(t.pre, payload.clone()).await;

        tracing::debug!(module = %name, phase = %t.phase, "Running lifecycle phase");
        let result = match t.phase {
            Phase::Initialize => {
                let ctx = ModuleCtx::new(name, config, self.services.clone(), self.hooks.clone());
                module.initialize(&ctx).await
            }
            Phase::Start => module.start().await,
            Phase::Stop => module.stop().await,
            Phase::Destroy => module.destroy().await,
        };

        if let Err(err) = result {
            tracing::error!(module = %name, phase = %t.phase, error = %err, "Module lifecycle phase failed");
            self.set_state(name, ModuleState::Failed, Some(format!("{err:#}")));
            return Err(RuntimeError::lifecycle(name, t.phase, err));
        }
        self.set_state(name, t.done, None);

        self.hooks.execute(t.post, payload).await;
        tracing::info!(module = %name, phase = %t.phase, "Module phase complete");
        Ok(())
    }
}
