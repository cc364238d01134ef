//! Dry-run server-side apply
//!
//! The only "mutating" call xrdiff ever makes, and it never persists: a
//! server-side apply patch with `dryRun=All` and `force=true`, returning the
//! object as the apiserver would store it. The field manager defaults to
//! `crossplane-diff` but callers pass the existing object's composed-resource
//! manager so the apiserver computes the same merge Crossplane would.

use kube::api::{DynamicObject, Patch, PatchParams};

use crate::convert::{display_id, gvk_of};
use crate::error::{KubeError, Result};
use crate::resource::ResourceClient;

/// Default field manager for server-side apply
pub const DEFAULT_FIELD_MANAGER: &str = "crossplane-diff";

/// Prefix of field managers owned by Crossplane for composed resources
pub const COMPOSED_OWNER_PREFIX: &str = "apiextensions.crossplane.io/composed/";

/// Client performing dry-run server-side apply
#[derive(Clone)]
pub struct ApplyClient {
    resources: ResourceClient,
}

impl ApplyClient {
    /// Create an apply client on top of the resource client
    pub fn new(resources: ResourceClient) -> Self {
        Self { resources }
    }

    /// Server-side apply the object in dry-run mode and return the result
    ///
    /// `field_owner` is used as the SSA field manager; the default manager is
    /// used when it is empty.
    pub async fn dry_run_apply(&self, obj: &DynamicObject, field_owner: &str) -> Result<DynamicObject> {
        let gvk = gvk_of(obj)?;
        let name = obj.metadata.name.as_deref().ok_or_else(|| {
            KubeError::InvalidResource(format!("{} is missing metadata.name", display_id(obj)))
        })?;

        let api = self
            .resources
            .api_for(&gvk, obj.metadata.namespace.as_deref())
            .await?;

        let manager = if field_owner.is_empty() {
            DEFAULT_FIELD_MANAGER
        } else {
            field_owner
        };
        let mut params = PatchParams::apply(manager);
        params.force = true;
        params.dry_run = true;

        api.patch(name, &params, &Patch::Apply(obj))
            .await
            .map_err(|e| KubeError::Apply {
                id: display_id(obj),
                source: e,
            })
    }
}

/// The composed-resource field manager of an existing object, if any
///
/// Returns the first manager in `metadata.managedFields` whose name starts
/// with the Crossplane composed-resource prefix.
pub fn composed_field_owner(obj: &DynamicObject) -> Option<String> {
    obj.metadata
        .managed_fields
        .as_ref()?
        .iter()
        .filter_map(|entry| entry.manager.as_deref())
        .find(|manager| manager.starts_with(COMPOSED_OWNER_PREFIX))
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ManagedFieldsEntry;
    use kube::api::TypeMeta;

    fn object_with_managers(managers: &[&str]) -> DynamicObject {
        let mut obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.org/v1".to_string(),
                kind: "ComposedResource".to_string(),
            }),
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        obj.metadata.name = Some("my-xr-cr".to_string());
        obj.metadata.managed_fields = Some(
            managers
                .iter()
                .map(|m| ManagedFieldsEntry {
                    manager: Some((*m).to_string()),
                    ..Default::default()
                })
                .collect(),
        );
        obj
    }

    #[test]
    fn test_composed_field_owner_found() {
        let obj = object_with_managers(&[
            "kubectl-client-side-apply",
            "apiextensions.crossplane.io/composed/uid-1234",
            "apiextensions.crossplane.io/composed/uid-5678",
        ]);
        assert_eq!(
            composed_field_owner(&obj).as_deref(),
            Some("apiextensions.crossplane.io/composed/uid-1234")
        );
    }

    #[test]
    fn test_composed_field_owner_absent() {
        let obj = object_with_managers(&["kubectl", "crossplane"]);
        assert_eq!(composed_field_owner(&obj), None);
    }

    #[test]
    fn test_composed_field_owner_no_managed_fields() {
        let mut obj = object_with_managers(&[]);
        obj.metadata.managed_fields = None;
        assert_eq!(composed_field_owner(&obj), None);
    }

    #[test]
    fn test_default_field_manager_constant() {
        assert_eq!(DEFAULT_FIELD_MANAGER, "crossplane-diff");
        assert_eq!(COMPOSED_OWNER_PREFIX, "apiextensions.crossplane.io/composed/");
    }
}
