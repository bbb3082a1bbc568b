use thiserror::Error;

use crate::metadata::MetadataError;

/// Lifecycle phase a module was in when its own code failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initialize,
    Start,
    Stop,
    Destroy,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Initialize => "initialize",
            Phase::Start => "start",
            Phase::Stop => "stop",
            Phase::Destroy => "destroy",
        };
        f.write_str(s)
    }
}

/// Structured errors for module registration and lifecycle driving.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("invalid metadata for module '{module}': {reason}")]
    InvalidMetadata {
        module: String,
        #[source]
        reason: MetadataError,
    },
    #[error("module '{module}' depends on '{dependency}', which is not registered")]
    DependencyNotFound { module: String, dependency: String },
    #[error("module not found: '{0}'")]
    ModuleNotFound(String),
    #[error("cyclic module dependency detected at '{module}': {}", path.join(" -> "))]
    CircularDependency { module: String, path: Vec<String> },
    #[error("{phase} failed for module '{module}'")]
    Lifecycle {
        module: String,
        phase: Phase,
        #[source]
        source: anyhow::Error,
    },
    #[error("module '{module}' is still required by: {}", dependents.join(", "))]
    DependencyInUse {
        module: String,
        dependents: Vec<String>,
    },
}

impl RuntimeError {
    pub fn lifecycle(module: impl Into<String>, phase: Phase, source: anyhow::Error) -> Self {
        RuntimeError::Lifecycle {
            module: module.into(),
            phase,
            source,
        }
    }
}

/// Structured errors for the service registry.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("service not found: '{0}'")]
    ServiceNotFound(String),
    #[error("circular service dependency detected: {}", path.join(" -> "))]
    CircularDependency { service: String, path: Vec<String> },
    #[error("failed to construct service '{service}'")]
    ServiceConstruction {
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("service '{service}' is not of type {expected}")]
    ServiceTypeMismatch {
        service: String,
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_messages_render_path() {
        let err = RuntimeError::CircularDependency {
            module: "a".into(),
            path: vec!["a".into(), "b".into(), "a".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("cyclic module dependency"));
        assert!(msg.contains("a -> b -> a"));

        let err = ServiceError::CircularDependency {
            service: "x".into(),
            path: vec!["x".into(), "y".into(), "x".into()],
        };
        assert!(err.to_string().contains("x -> y -> x"));
    }

    #[test]
    fn lifecycle_error_keeps_source() {
        let err = RuntimeError::lifecycle("db", Phase::Start, anyhow::anyhow!("port in use"));
        assert_eq!(err.to_string(), "start failed for module 'db'");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("port in use"));
    }
}
