// argos-modkit/src/registry.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;

use crate::context::ConfigMap;
use crate::contracts::Module;
use crate::errors::RuntimeError;

/// Lifecycle position of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleState {
    Registered,
    Initialized,
    Started,
    Stopped,
    Destroyed,
    /// The module's own lifecycle code returned an error.
    Failed,
}

/// Mutable, runtime-owned configuration of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModuleConfig {
    pub enabled: bool,
    pub config: ConfigMap,
}

pub struct ModuleRecord {
    pub module: Arc<dyn Module>,
    pub config: ModuleConfig,
    pub state: ModuleState,
    pub last_error: Option<String>,
}

impl std::fmt::Debug for ModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = self.module.metadata();
        f.debug_struct("ModuleRecord")
            .field("name", &meta.name)
            .field("deps", &meta.dependencies)
            .field("enabled", &self.config.enabled)
            .field("state", &self.state)
            .finish()
    }
}

impl ModuleRecord {
    pub fn new(module: Arc<dyn Module>) -> Self {
        let enabled = module.metadata().enabled;
        Self {
            module,
            config: ModuleConfig {
                enabled,
                config: ConfigMap::new(),
            },
            state: ModuleState::Registered,
            last_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.module.metadata().name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.module.metadata().dependencies
    }
}

/// Registered modules, kept in registration order.
/// Keys are module **names**; re-registering a name replaces the record in place.
#[derive(Default)]
pub struct ModuleRegistry {
    order: Vec<String>,
    records: HashMap<String, ModuleRecord>,
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("modules", &self.order)
            .finish()
    }
}

impl ModuleRegistry {
    /// Insert or replace. Returns true when an existing record was overwritten.
    pub fn insert(&mut self, record: ModuleRecord) -> bool {
        let name = record.name().to_string();
        let replaced = self.records.insert(name.clone(), record).is_some();
        if !replaced {
            self.order.push(name);
        }
        replaced
    }

    pub fn remove(&mut self, name: &str) -> Option<ModuleRecord> {
        let record = self.records.remove(name)?;
        self.order.retain(|n| n != name);
        Some(record)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleRecord> {
        self.records.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ModuleRecord> {
        self.records.get_mut(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Records in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ModuleRecord> {
        self.order.iter().filter_map(|n| self.records.get(n))
    }

    /// Registered modules that declare `name` as a dependency.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        self.iter()
            .filter(|r| r.dependencies().iter().any(|d| d == name))
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Dependency-respecting order over every registered module.
    pub fn load_order(&self) -> Result<Vec<String>, RuntimeError> {
        sort_by_dependencies(self.iter().map(|r| (r.name(), r.dependencies())))
    }
}

/// Post-order DFS topological sort.
///
/// `nodes` yields `(name, declared_dependencies)` in the order roots are visited.
/// Dependencies that are not themselves nodes (e.g. service names) are skipped.
/// A back edge to a node still on the DFS path is a cycle.
pub fn sort_by_dependencies<'a, I>(nodes: I) -> Result<Vec<String>, RuntimeError>
where
    I: IntoIterator<Item = (&'a str, &'a [String])>,
{
    let mut names: Vec<&'a str> = Vec::new();
    let mut deps: HashMap<&'a str, &'a [String]> = HashMap::new();
    for (name, d) in nodes {
        if deps.insert(name, d).is_none() {
            names.push(name);
        }
    }

    struct Walk<'a> {
        deps: HashMap<&'a str, &'a [String]>,
        visited: HashSet<&'a str>,
        visiting: Vec<&'a str>,
        out: Vec<String>,
    }

    fn visit<'a>(w: &mut Walk<'a>, name: &'a str) -> Result<(), RuntimeError> {
        if let Some(start) = w.visiting.iter().position(|&n| n == name) {
            // Close the cycle by adding the first node again
            let mut path: Vec<String> = w.visiting[start..].iter().map(|s| s.to_string()).collect();
            path.push(name.to_string());
            return Err(RuntimeError::CircularDependency {
                module: name.to_string(),
                path,
            });
        }
        if w.visited.contains(name) {
            return Ok(());
        }

        w.visiting.push(name);
        if let Some(&deps) = w.deps.get(name) {
            for dep in deps {
                if w.deps.contains_key(dep.as_str()) {
                    visit(w, dep.as_str())?;
                }
            }
        }
        w.visiting.pop();
        w.visited.insert(name);
        w.out.push(name.to_string());
        Ok(())
    }

    let mut walk = Walk {
        deps,
        visited: HashSet::new(),
        visiting: Vec::new(),
        out: Vec::with_capacity(names.len()),
    };
    for name in names {
        visit(&mut walk, name)?;
    }

    tracing::debug!(modules = ?walk.out, "Module dependency order resolved (topo)");
    Ok(walk.out)
}
