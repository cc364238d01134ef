//! Error types for xrdiff-crossplane

use kube::api::GroupVersionKind;
use thiserror::Error;

/// Result type for xrdiff-crossplane operations
pub type Result<T> = std::result::Result<T, CrossplaneError>;

/// Errors produced while resolving Crossplane objects
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CrossplaneError {
    /// Underlying Kubernetes layer error
    #[error(transparent)]
    Kube(#[from] xrdiff_kube::KubeError),

    /// A directly referenced Composition does not exist
    #[error("composition {name} referenced in {xr} not found")]
    CompositionNotFound { name: String, xr: String },

    /// No composition is compatible with the target type
    #[error("no composition found for {}/{} {}", target.group, target.version, target.kind)]
    NoCompositionForTarget { target: GroupVersionKind },

    /// A label selector matched no composition
    #[error("no composition with labels {selector} found for {}/{} {}", target.group, target.version, target.kind)]
    NoCompositionMatchingSelector {
        target: GroupVersionKind,
        selector: String,
    },

    /// More than one composition matched; never resolved by guessing
    #[error("ambiguous composition selection: multiple compositions match {}/{} {}: {}", target.group, target.version, target.kind, names.join(", "))]
    AmbiguousComposition {
        target: GroupVersionKind,
        names: Vec<String>,
    },

    /// A matched composition targets a different composite type
    #[error("composition {name} is not compatible with {}/{} {} (composes {composes})", target.group, target.version, target.kind)]
    IncompatibleComposition {
        name: String,
        target: GroupVersionKind,
        composes: String,
    },

    /// A pinned revision does not exist
    #[error("composition revision {name} not found")]
    RevisionNotFound { name: String },

    /// A composition has no published revisions yet
    #[error("no revisions found for composition {composition}")]
    NoRevisions { composition: String },

    /// Two revisions of one composition share a revision number
    #[error("multiple composition revisions found with the same revision number {revision} for composition {composition}: {first}, {second}")]
    DuplicateRevision {
        composition: String,
        revision: i64,
        first: String,
        second: String,
    },

    /// A pinned revision is labeled for a different composition
    #[error("composition revision {revision} belongs to composition {actual}, not {expected}")]
    RevisionCompositionMismatch {
        revision: String,
        actual: String,
        expected: String,
    },

    /// An XRD declares no referenceable version
    #[error("XRD {xrd} has no referenceable version")]
    MissingReferenceableVersion { xrd: String },

    /// An XRD declares claim names without a claim kind
    #[error("XRD {xrd} declares claimNames without a kind")]
    MissingClaimKind { xrd: String },

    /// The input resource's type is defined by no XRD on the cluster
    #[error("no XRD found defining {}/{} {}", gvk.group, gvk.version, gvk.kind)]
    XrdNotFound { gvk: GroupVersionKind },

    /// A pipeline step references a Function that is not installed
    #[error("function {name} referenced by composition {composition} not found")]
    FunctionNotFound { name: String, composition: String },

    /// The composition's mode is not the function pipeline
    #[error("composition {composition} has unsupported mode {mode}; only Pipeline is supported")]
    UnsupportedMode { composition: String, mode: String },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CrossplaneError {
    fn from(e: serde_json::Error) -> Self {
        CrossplaneError::Serialization(e.to_string())
    }
}

impl CrossplaneError {
    /// Check whether the error is an ambiguity (multiple candidates, never guessed)
    pub fn is_ambiguity(&self) -> bool {
        matches!(
            self,
            CrossplaneError::AmbiguousComposition { .. } | CrossplaneError::DuplicateRevision { .. }
        )
    }
}
