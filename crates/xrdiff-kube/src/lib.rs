//! xrdiff-kube - Kubernetes resource layer for xrdiff
//!
//! This crate provides:
//! - **Type conversion** (`convert`): memoized GVK -> GVR resolution via group-scoped discovery
//! - **Resource access** (`resource`): dynamic get/list/list-by-label over any GVK
//! - **Schema lookups** (`schema`): CRD fetching and CRD-requirement answers
//! - **Dry-run apply** (`apply`): server-side apply with `dryRun=All`, the engine's only write-shaped call

pub mod apply;
pub mod convert;
pub mod error;
pub mod resource;
pub mod schema;

pub use apply::{ApplyClient, COMPOSED_OWNER_PREFIX, DEFAULT_FIELD_MANAGER, composed_field_owner};
pub use convert::{TypeConverter, display_id, gvk_from_type_meta, gvk_of};
pub use error::{KubeError, Result};
pub use resource::ResourceClient;
pub use schema::{SchemaClient, crd_required_for_group};
