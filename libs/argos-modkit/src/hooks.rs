//! Hook bus: named extension points with priority-ordered, fault-isolated handlers.
//!
//! Handlers for an event run one after another, highest priority first. Equal
//! priorities keep registration order. A handler that returns an error or panics is
//! logged and skipped; [`HookBus::execute`] itself never fails.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::metadata::ModuleMetadata;

/// Well-known event names. Any other string is a legal event name too.
pub mod events {
    pub const MODULE_REGISTERED: &str = "module:registered";
    pub const MODULE_UNREGISTERED: &str = "module:unregistered";
    pub const MODULE_PRE_INIT: &str = "module:pre-init";
    pub const MODULE_POST_INIT: &str = "module:post-init";
    pub const MODULE_PRE_START: &str = "module:pre-start";
    pub const MODULE_POST_START: &str = "module:post-start";
    pub const MODULE_PRE_STOP: &str = "module:pre-stop";
    pub const MODULE_POST_STOP: &str = "module:post-stop";
    pub const MODULE_PRE_RELOAD: &str = "module:pre-reload";
    pub const MODULE_POST_RELOAD: &str = "module:post-reload";
    pub const MODULE_PRE_DESTROY: &str = "module:pre-destroy";
    pub const MODULE_POST_DESTROY: &str = "module:post-destroy";
    pub const SYSTEM_STARTUP: &str = "system:startup";
    pub const SYSTEM_SHUTDOWN: &str = "system:shutdown";
}

/// Owner recorded when a hook is registered without one.
pub const UNKNOWN_OWNER: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemPhase {
    Startup,
    Shutdown,
}

/// Typed argument passed to every handler of an event.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum HookPayload {
    /// Lifecycle events about one module.
    Module(ModuleMetadata),
    System { phase: SystemPhase },
    /// Application-defined events.
    Custom(Value),
}

impl HookPayload {
    /// Name of the module this payload is about, if any.
    pub fn module_name(&self) -> Option<&str> {
        match self {
            HookPayload::Module(meta) => Some(meta.name.as_str()),
            _ => None,
        }
    }
}

#[async_trait]
pub trait HookHandler: Send + Sync {
    async fn handle(&self, payload: &HookPayload) -> anyhow::Result<Value>;
}

/// Adapter turning an async closure into a [`HookHandler`].
pub struct FnHook<F>(F);

#[async_trait]
impl<F, Fut> HookHandler for FnHook<F>
where
    F: Fn(HookPayload) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn handle(&self, payload: &HookPayload) -> anyhow::Result<Value> {
        (self.0)(payload.clone()).await
    }
}

#[derive(Clone)]
struct Hook {
    handler: Arc<dyn HookHandler>,
    priority: i32,
    owner: String,
}

/// Introspection view of a registered hook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookInfo {
    pub name: String,
    pub priority: i32,
    pub owner: String,
}

#[derive(Default)]
pub struct HookBus {
    hooks: RwLock<HashMap<String, Vec<Hook>>>,
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hooks = self.hooks.read();
        let mut events: Vec<&String> = hooks.keys().collect();
        events.sort();
        f.debug_struct("HookBus").field("events", &events).finish()
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event`, keeping the list sorted by descending priority.
    pub fn register(
        &self,
        event: impl Into<String>,
        handler: Arc<dyn HookHandler>,
        priority: i32,
        owner: Option<&str>,
    ) {
        let event = event.into();
        let owner = owner.unwrap_or(UNKNOWN_OWNER).to_string();
        tracing::debug!(event = %event, owner = %owner, priority, "Hook registered");

        let mut hooks = self.hooks.write();
        let list = hooks.entry(event).or_default();
        list.push(Hook {
            handler,
            priority,
            owner,
        });
        // stable: equal priorities keep registration order
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
    }

    /// Register an async closure as a handler.
    pub fn register_fn<F, Fut>(&self, event: impl Into<String>, priority: i32, owner: &str, f: F)
    where
        F: Fn(HookPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        self.register(event, Arc::new(FnHook(f)), priority, Some(owner));
    }

    /// Run every handler of `event` in priority order and collect the successful results.
    pub async fn execute(&self, event: &str, payload: HookPayload) -> Vec<Value> {
        // snapshot so handlers may register or remove hooks while we iterate
        let snapshot: Vec<Hook> = self.hooks.read().get(event).cloned().unwrap_or_default();
        tracing::debug!(event = %event, handlers = snapshot.len(), "Executing hook");

        let mut results = Vec::with_capacity(snapshot.len());
        for hook in snapshot {
            let outcome = AssertUnwindSafe(hook.handler.handle(&payload))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(value)) => results.push(value),
                Ok(Err(err)) => {
                    tracing::error!(event = %event, owner = %hook.owner, error = %err, "Hook handler failed");
                }
                Err(_) => {
                    tracing::error!(event = %event, owner = %hook.owner, "Hook handler panicked");
                }
            }
        }
        results
    }

    /// Remove every hook owned by `owner` across all events.
    pub fn remove_by_module(&self, owner: &str) {
        let mut hooks = self.hooks.write();
        for list in hooks.values_mut() {
            list.retain(|h| h.owner != owner);
        }
        hooks.retain(|_, list| !list.is_empty());
        tracing::debug!(owner = %owner, "Hooks removed");
    }

    pub fn list_hooks(&self) -> BTreeMap<String, Vec<HookInfo>> {
        self.hooks
            .read()
            .iter()
            .map(|(event, list)| {
                let infos = list
                    .iter()
                    .map(|h| HookInfo {
                        name: event.clone(),
                        priority: h.priority,
                        owner: h.owner.clone(),
                    })
                    .collect();
                (event.clone(), infos)
            })
            .collect()
    }

    /// Sorted names of events that have at least one handler.
    pub fn hook_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hooks.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.hooks.read().get(event).map_or(0, Vec::len)
    }
}
