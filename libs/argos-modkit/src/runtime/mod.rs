mod module_runtime;
mod runner;
mod shutdown;

pub use module_runtime::{ModuleInfo, ModuleRuntime, RuntimeStats};
pub use runner::{run, RunOptions, ShutdownOptions};
pub use shutdown::wait_for_shutdown;
