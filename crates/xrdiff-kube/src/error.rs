//! Error types for xrdiff-kube

use kube::api::GroupVersionKind;
use thiserror::Error;

/// Result type for xrdiff-kube operations
pub type Result<T> = std::result::Result<T, KubeError>;

/// Errors that can occur while talking to the Kubernetes API
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum KubeError {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    /// API group is not served by the cluster
    #[error("API group {group} not found on server")]
    GroupNotFound { group: String },

    /// No API resource in the queried group-version has the kind
    #[error("no API resource found for {}/{} kind {}", gvk.group, gvk.version, gvk.kind)]
    KindNotFound { gvk: GroupVersionKind },

    /// Resource not present on the cluster
    #[error("{kind} '{id}' not found")]
    NotFound { kind: String, id: String },

    /// A required CustomResourceDefinition is missing from the cluster
    #[error("required CRD {name} (for {}/{} {}) not found on cluster", gvk.group, gvk.version, gvk.kind)]
    CrdMissing { name: String, gvk: GroupVersionKind },

    /// Dry-run server-side apply was rejected by the apiserver
    #[error("dry-run apply of {id} rejected: {source}")]
    Apply {
        id: String,
        #[source]
        source: kube::Error,
    },

    /// Object is structurally unusable (missing apiVersion/kind/name)
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for KubeError {
    fn from(e: serde_json::Error) -> Self {
        KubeError::Serialization(e.to_string())
    }
}

impl KubeError {
    /// Check if this is a Kubernetes 404 Not Found error
    pub fn is_not_found(&self) -> bool {
        match self {
            KubeError::NotFound { .. } | KubeError::CrdMissing { .. } => true,
            KubeError::Api(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    /// Check if this error came out of API discovery
    pub fn is_discovery(&self) -> bool {
        matches!(
            self,
            KubeError::GroupNotFound { .. }
                | KubeError::KindNotFound { .. }
                | KubeError::Api(kube::Error::Discovery(_))
        )
    }
}
