// Modules compiled into the server binary. New built-in modules are added here,
// dependencies before their dependents.

use std::sync::Arc;

use argos_modkit::Module;

use crate::core_module::CoreModule;

pub fn builtin_modules() -> Vec<Arc<dyn Module>> {
    vec![Arc::new(CoreModule::new())]
}
