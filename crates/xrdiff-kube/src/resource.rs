//! Dynamic resource client
//!
//! Thin, cache-aware wrapper over `Api<DynamicObject>` that turns GVKs into
//! the right namespaced or cluster-scoped API handle and maps apiserver 404s
//! into typed errors carrying the resource identity.

use kube::Client;
use kube::api::{Api, DynamicObject, GroupVersionKind, ListParams, TypeMeta};
use kube::discovery::{Scope, oneshot};
use std::sync::Arc;

use crate::convert::TypeConverter;
use crate::error::{KubeError, Result};

/// Set apiVersion/kind on listed items that arrived without them
///
/// The apiserver omits TypeMeta on list items for built-in kinds; callers
/// downstream key everything by GVK, so restore it from the list's own GVK.
fn backfill_types(mut items: Vec<DynamicObject>, gvk: &GroupVersionKind) -> Vec<DynamicObject> {
    for item in &mut items {
        if item.types.is_none() {
            item.types = Some(TypeMeta {
                api_version: gvk.api_version(),
                kind: gvk.kind.clone(),
            });
        }
    }
    items
}

/// Read-only client for arbitrary cluster resources
#[derive(Clone)]
pub struct ResourceClient {
    client: Client,
    converter: Arc<TypeConverter>,
}

impl ResourceClient {
    /// Create a resource client sharing the given type converter
    pub fn new(client: Client, converter: Arc<TypeConverter>) -> Self {
        Self { client, converter }
    }

    /// The shared GVK converter
    pub fn converter(&self) -> &Arc<TypeConverter> {
        &self.converter
    }

    /// The underlying kube client
    pub fn kube_client(&self) -> &Client {
        &self.client
    }

    /// Build an Api handle for a GVK, scoped to `namespace` when the
    /// resource is namespaced
    pub async fn api_for(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Api<DynamicObject>> {
        let (ar, caps) = self.converter.resource_for(gvk).await?;
        let api = if caps.scope == Scope::Namespaced {
            let ns = namespace.unwrap_or("default");
            Api::namespaced_with(self.client.clone(), ns, &ar)
        } else {
            Api::all_with(self.client.clone(), &ar)
        };
        Ok(api)
    }

    /// Fetch a single resource; 404 becomes `NotFound` with identity
    pub async fn get(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<DynamicObject> {
        let api = self.api_for(gvk, namespace).await?;
        match api.get(name).await {
            Ok(obj) => Ok(obj),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Err(KubeError::NotFound {
                kind: gvk.kind.clone(),
                id: match namespace {
                    Some(ns) => format!("{}/{}", ns, name),
                    None => name.to_string(),
                },
            }),
            Err(e) => Err(KubeError::Api(e)),
        }
    }

    /// Fetch a single resource, `None` when it does not exist
    pub async fn get_opt(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        name: &str,
    ) -> Result<Option<DynamicObject>> {
        let api = self.api_for(gvk, namespace).await?;
        api.get_opt(name).await.map_err(KubeError::Api)
    }

    /// List all resources of a GVK
    pub async fn list(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.api_for(gvk, namespace).await?;
        let list = api.list(&ListParams::default()).await?;
        Ok(backfill_types(list.items, gvk))
    }

    /// List resources of a GVK matching a label selector
    pub async fn list_by_label(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<DynamicObject>> {
        let api = self.api_for(gvk, namespace).await?;
        let lp = ListParams::default().labels(label_selector);
        let list = api.list(&lp).await?;
        Ok(backfill_types(list.items, gvk))
    }

    /// Every served GVK of a group + kind pair
    ///
    /// Walks only the requested group's versions. An unknown group is an
    /// explicit error, never an empty answer.
    pub async fn gvks_for_group_kind(&self, group: &str, kind: &str) -> Result<Vec<GroupVersionKind>> {
        let apigroup = match oneshot::group(&self.client, group).await {
            Ok(g) => g,
            Err(kube::Error::Discovery(_)) => {
                return Err(KubeError::GroupNotFound {
                    group: group.to_string(),
                });
            }
            Err(e) => return Err(KubeError::Api(e)),
        };

        let mut gvks = Vec::new();
        for version in apigroup.versions() {
            for (ar, _) in apigroup.versioned_resources(version) {
                if ar.kind == kind {
                    gvks.push(GroupVersionKind {
                        group: group.to_string(),
                        version: version.to_string(),
                        kind: kind.to_string(),
                    });
                }
            }
        }

        if gvks.is_empty() {
            return Err(KubeError::KindNotFound {
                gvk: GroupVersionKind {
                    group: group.to_string(),
                    version: String::new(),
                    kind: kind.to_string(),
                },
            });
        }

        Ok(gvks)
    }

    /// Whether resources of this GVK are namespaced
    pub async fn is_namespaced(&self, gvk: &GroupVersionKind) -> Result<bool> {
        self.converter.is_namespaced(gvk).await
    }
}
