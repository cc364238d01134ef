//! GVK to GVR conversion backed by group-scoped discovery
//!
//! The converter answers "which API resource serves this kind" without ever
//! running a full discovery sweep: each lookup queries exactly the
//! group-version it was asked about, so stale discovery data for an unrelated
//! API group cannot poison the answer. Results are memoized for the lifetime
//! of the process.

use std::collections::HashMap;
use std::sync::RwLock;

use kube::Client;
use kube::api::{DynamicObject, GroupVersionKind, TypeMeta};
use kube::discovery::{ApiCapabilities, ApiResource, Scope, oneshot};

use crate::error::{KubeError, Result};

/// Memoizing GVK -> (ApiResource, ApiCapabilities) converter
pub struct TypeConverter {
    client: Client,
    cache: RwLock<HashMap<GroupVersionKind, (ApiResource, ApiCapabilities)>>,
}

impl TypeConverter {
    /// Create a converter for the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve a GVK to the ApiResource and capabilities that serve it
    ///
    /// Queries the discovery API for the specific group-version only; the
    /// result is cached. Fails with `KindNotFound` when no resource in that
    /// group-version has the kind.
    pub async fn resource_for(&self, gvk: &GroupVersionKind) -> Result<(ApiResource, ApiCapabilities)> {
        if let Some(hit) = self.cache.read().expect("type cache poisoned").get(gvk) {
            return Ok(hit.clone());
        }

        tracing::debug!(
            group = gvk.group.as_str(),
            version = gvk.version.as_str(),
            kind = gvk.kind.as_str(),
            "discovering API resource"
        );

        let resolved = match oneshot::pinned_kind(&self.client, gvk).await {
            Ok(pair) => pair,
            Err(kube::Error::Discovery(_)) => {
                return Err(KubeError::KindNotFound { gvk: gvk.clone() });
            }
            Err(e) => return Err(KubeError::Api(e)),
        };

        self.cache
            .write()
            .expect("type cache poisoned")
            .insert(gvk.clone(), resolved.clone());

        Ok(resolved)
    }

    /// The plural resource name (the GVR "resource" segment) for a GVK
    pub async fn plural_name(&self, gvk: &GroupVersionKind) -> Result<String> {
        let (ar, _) = self.resource_for(gvk).await?;
        Ok(ar.plural)
    }

    /// Whether resources of this GVK live in a namespace
    pub async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool> {
        let (_, caps) = self.resource_for(gvk).await?;
        Ok(caps.scope == Scope::Namespaced)
    }
}

/// Extract the GroupVersionKind of a dynamic object
///
/// Errors when the object carries no apiVersion/kind, which makes it
/// unusable for any API call.
pub fn gvk_of(obj: &DynamicObject) -> Result<GroupVersionKind> {
    let types = obj.types.as_ref().ok_or_else(|| {
        KubeError::InvalidResource("resource missing apiVersion or kind".to_string())
    })?;
    Ok(gvk_from_type_meta(types))
}

/// Convert TypeMeta to GroupVersionKind
///
/// - "apps/v1" -> group="apps", version="v1"
/// - "v1" -> group="", version="v1" (core API)
pub fn gvk_from_type_meta(tm: &TypeMeta) -> GroupVersionKind {
    let (group, version) = match tm.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), tm.api_version.clone()),
    };

    GroupVersionKind {
        group,
        version,
        kind: tm.kind.clone(),
    }
}

/// Human-readable resource identity for error messages: `Kind/ns/name`
pub fn display_id(obj: &DynamicObject) -> String {
    let kind = obj
        .types
        .as_ref()
        .map(|t| t.kind.as_str())
        .unwrap_or("Unknown");
    let name = obj.metadata.name.as_deref().unwrap_or("unnamed");
    match &obj.metadata.namespace {
        Some(ns) => format!("{}/{}/{}", ns, kind, name),
        None => format!("{}/{}", kind, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gvk_from_type_meta() {
        let tm = TypeMeta {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
        };
        let gvk = gvk_from_type_meta(&tm);
        assert_eq!(gvk.group, "apps");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Deployment");
    }

    #[test]
    fn test_gvk_from_type_meta_core() {
        let tm = TypeMeta {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        };
        let gvk = gvk_from_type_meta(&tm);
        assert_eq!(gvk.group, "");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "ConfigMap");
    }

    #[test]
    fn test_gvk_from_type_meta_crossplane_group() {
        let tm = TypeMeta {
            api_version: "apiextensions.crossplane.io/v1".to_string(),
            kind: "Composition".to_string(),
        };
        let gvk = gvk_from_type_meta(&tm);
        assert_eq!(gvk.group, "apiextensions.crossplane.io");
        assert_eq!(gvk.version, "v1");
        assert_eq!(gvk.kind, "Composition");
    }

    #[test]
    fn test_gvk_of_missing_types() {
        let obj = DynamicObject {
            types: None,
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        assert!(gvk_of(&obj).is_err());
    }

    #[test]
    fn test_display_id() {
        let mut obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.org/v1".to_string(),
                kind: "XExample".to_string(),
            }),
            metadata: Default::default(),
            data: serde_json::json!({}),
        };
        obj.metadata.name = Some("my-xr".to_string());
        assert_eq!(display_id(&obj), "XExample/my-xr");

        obj.metadata.namespace = Some("prod".to_string());
        assert_eq!(display_id(&obj), "prod/XExample/my-xr");
    }
}
