//! Static module metadata and its schema validation.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of a module, used for grouping in stats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    Core,
    Plugin,
    Extension,
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ModuleKind::Core => "core",
            ModuleKind::Plugin => "plugin",
            ModuleKind::Extension => "extension",
        };
        f.write_str(s)
    }
}

/// Immutable description of a module.
///
/// `dependencies` names other *modules* that must already be registered when this
/// one is registered. `provides` / `requires` are informational capability tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModuleMetadata {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub main: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(rename = "type")]
    pub kind: ModuleKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

/// A single schema violation found by [`ModuleMetadata::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("name '{0}' must not contain whitespace")]
    NameWhitespace(String),
    #[error("version must not be empty")]
    EmptyVersion,
    #[error("{field} contains an empty entry")]
    EmptyEntry { field: &'static str },
    #[error("module cannot depend on itself")]
    SelfDependency,
    #[error("dependency '{0}' is listed more than once")]
    DuplicateDependency(String),
}

impl ModuleMetadata {
    /// Start a metadata record with the required fields; everything else defaults.
    pub fn new(name: impl Into<String>, version: impl Into<String>, kind: ModuleKind) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            description: String::new(),
            author: String::new(),
            main: String::new(),
            dependencies: Vec::new(),
            provides: Vec::new(),
            requires: Vec::new(),
            kind,
            enabled: true,
            priority: 0,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_main(mut self, main: impl Into<String>) -> Self {
        self.main = main.into();
        self
    }

    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_provides<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.provides = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requires<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requires = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Check the record against the fixed module schema.
    pub fn validate(&self) -> Result<(), MetadataError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(MetadataError::EmptyName);
        }
        if self.name.chars().any(char::is_whitespace) {
            return Err(MetadataError::NameWhitespace(self.name.clone()));
        }
        if self.version.trim().is_empty() {
            return Err(MetadataError::EmptyVersion);
        }

        for (field, entries) in [
            ("dependencies", &self.dependencies),
            ("provides", &self.provides),
            ("requires", &self.requires),
        ] {
            if entries.iter().any(|e| e.trim().is_empty()) {
                return Err(MetadataError::EmptyEntry { field });
            }
        }

        let mut seen = HashSet::new();
        for dep in &self.dependencies {
            if dep == &self.name {
                return Err(MetadataError::SelfDependency);
            }
            if !seen.insert(dep.as_str()) {
                return Err(MetadataError::DuplicateDependency(dep.clone()));
            }
        }

        Ok(())
    }
}
