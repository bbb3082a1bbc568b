use async_trait::async_trait;

use crate::context::{ConfigMap, ModuleCtx};
use crate::metadata::ModuleMetadata;

/// A unit of extension driven through initialize → start ⇄ stop → destroy.
///
/// Lifecycle methods take `&self`; modules keep mutable state behind their own locks.
#[async_trait]
pub trait Module: Send + Sync + 'static {
    fn metadata(&self) -> &ModuleMetadata;

    /// Wire services and hooks. Runs once, in dependency order.
    async fn initialize(&self, ctx: &ModuleCtx) -> anyhow::Result<()>;

    async fn start(&self) -> anyhow::Result<()>;

    async fn stop(&self) -> anyhow::Result<()>;

    /// Release resources. Runs in reverse dependency order.
    async fn destroy(&self) -> anyhow::Result<()>;

    /// Receive the merged module config after [`crate::ModuleRuntime::set_module_config`].
    fn set_config(&self, _config: &ConfigMap) {}

    fn as_any(&self) -> &dyn std::any::Any;

    fn name(&self) -> &str {
        &self.metadata().name
    }

    fn version(&self) -> &str {
        &self.metadata().version
    }
}
