//! Error types for xrdiff-engine

use thiserror::Error;

/// Result type for xrdiff-engine operations
pub type Result<T> = std::result::Result<T, DiffError>;

/// Errors produced by the external render invocation
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RenderError {
    /// The render command could not be started
    #[error("failed to spawn render command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The render command exited unsuccessfully
    #[error("render command exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The render output was not parseable
    #[error("unparseable render output: {0}")]
    Parse(String),

    /// IO while staging render inputs
    #[error("render IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing render inputs
    #[error("render input serialization error: {0}")]
    Serialization(String),
}

/// Errors produced while diffing
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiffError {
    /// Kubernetes layer error
    #[error(transparent)]
    Kube(#[from] xrdiff_kube::KubeError),

    /// Crossplane resolution error
    #[error(transparent)]
    Crossplane(#[from] xrdiff_crossplane::CrossplaneError),

    /// The external render pipeline failed
    #[error("render failed: {0}")]
    Render(#[from] RenderError),

    /// Two current resources claim the same composition resource name
    #[error("multiple existing resources carry composition resource name '{resource_name}' for {kind}: {first}, {second}")]
    DuplicateResourceName {
        resource_name: String,
        kind: String,
        first: String,
        second: String,
    },

    /// The overall operation exceeded its deadline
    #[error("diff timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Some input XRs failed to diff; siblings still completed
    #[error("{failed} of {total} composite resources failed to diff")]
    Partial { failed: usize, total: usize },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for DiffError {
    fn from(e: serde_json::Error) -> Self {
        DiffError::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for DiffError {
    fn from(e: serde_yaml::Error) -> Self {
        DiffError::Serialization(e.to_string())
    }
}
