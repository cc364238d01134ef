//! xrdiff-crossplane - Typed Crossplane clients for xrdiff
//!
//! This crate provides:
//! - **Typed façade** (`types`): serde views of Composition, CompositionRevision, XRD and Function
//! - **Field probing** (`fields`): v1/v2-aware access to XR composition selection fields
//! - **Resolution** (`composition`, `revision`, `definition`): which Composition body an apply would use
//! - **Pipeline inputs** (`function`, `credential`): the Functions and Secrets a render needs
//! - **Tree discovery** (`tree`): the existing composed descendants of an XR

pub mod composition;
pub mod credential;
pub mod definition;
pub mod error;
pub mod fields;
pub mod function;
pub mod revision;
pub mod tree;
pub mod types;

pub use composition::{CompositionClient, ResolvedComposition, select_by_labels, select_by_type};
pub use credential::CredentialClient;
pub use definition::DefinitionClient;
pub use error::{CrossplaneError, Result};
pub use fields::UpdatePolicy;
pub use function::FunctionClient;
pub use revision::RevisionClient;
pub use tree::ResourceTreeClient;
pub use types::{
    COMPOSITE_LABEL, COMPOSITION_NAME_LABEL, COMPOSITION_RESOURCE_NAME_ANNOTATION, CROSSPLANE_GROUP,
    CompositeResourceDefinition, Composition, CompositionRevision, Function, from_dynamic,
};
