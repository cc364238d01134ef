//! Composed-resource tree discovery
//!
//! Finds the current in-cluster descendants of an XR. Two edge kinds
//! contribute and the results are deduplicated by (GVK, namespace, name):
//!
//! - **Resource refs**: `spec.resourceRefs` / `spec.crossplane.resourceRefs`
//!   / `status.resourceRefs`, followed recursively so nested XRs contribute
//!   their own children.
//! - **Composite label**: resources labeled `crossplane.io/composite=<name>`,
//!   listed per candidate GVK, which catches children whose ref has not been
//!   recorded yet.
//!
//! A ref whose kind is no longer served is skipped with a warning; the rest
//! of the tree still resolves.

use std::collections::{HashSet, VecDeque};

use kube::api::{DynamicObject, GroupVersionKind};
use xrdiff_kube::{ResourceClient, gvk_of};

use crate::error::Result;
use crate::fields::{self, ResourceRef};
use crate::types::COMPOSITE_LABEL;

fn node_key(gvk: &GroupVersionKind, namespace: Option<&str>, name: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        gvk.group,
        gvk.version,
        gvk.kind,
        namespace.unwrap_or(""),
        name
    )
}

fn gvk_of_ref(r: &ResourceRef) -> GroupVersionKind {
    let (group, version) = match r.api_version.rsplit_once('/') {
        Some((g, v)) => (g.to_string(), v.to_string()),
        None => (String::new(), r.api_version.clone()),
    };
    GroupVersionKind {
        group,
        version,
        kind: r.kind.clone(),
    }
}

/// Discovers the existing descendants of an XR
pub struct ResourceTreeClient {
    resources: ResourceClient,
}

impl ResourceTreeClient {
    /// Create a tree client
    pub fn new(resources: ResourceClient) -> Self {
        Self { resources }
    }

    /// Every existing composed descendant of `xr`, transitively
    ///
    /// `candidate_gvks` extends the composite-label sweep with types the
    /// caller already expects (typically the GVKs of freshly rendered
    /// resources).
    pub async fn discover(
        &self,
        xr: &DynamicObject,
        candidate_gvks: &[GroupVersionKind],
    ) -> Result<Vec<DynamicObject>> {
        let xr_namespace = xr.metadata.namespace.clone();
        let xr_name = xr.metadata.name.clone().unwrap_or_default();

        let mut out = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(ResourceRef, Option<String>)> = VecDeque::new();

        // mark the root so a self-referencing XR cannot loop
        if let Ok(root_gvk) = gvk_of(xr) {
            visited.insert(node_key(&root_gvk, xr_namespace.as_deref(), &xr_name));
        }

        // composite-label edge: children of this XR regardless of refs
        if !xr_name.is_empty() {
            let selector = format!("{}={}", COMPOSITE_LABEL, xr_name);
            let mut swept: HashSet<String> = HashSet::new();
            for gvk in candidate_gvks {
                if !swept.insert(node_key(gvk, None, "")) {
                    continue;
                }
                let listed = match self
                    .resources
                    .list_by_label(gvk, xr_namespace.as_deref(), &selector)
                    .await
                {
                    Ok(items) => items,
                    Err(e) if e.is_discovery() || e.is_not_found() => {
                        tracing::debug!(
                            kind = gvk.kind.as_str(),
                            error = %e,
                            "skipping composite-label sweep for unserved kind"
                        );
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                };

                for item in listed {
                    let Ok(item_gvk) = gvk_of(&item) else { continue };
                    let name = item.metadata.name.clone().unwrap_or_default();
                    let key = node_key(&item_gvk, item.metadata.namespace.as_deref(), &name);
                    if visited.insert(key) {
                        for child_ref in fields::resource_refs(&item) {
                            queue.push_back((child_ref, item.metadata.namespace.clone()));
                        }
                        out.push(item);
                    }
                }
            }
        }

        // resource-ref edge, breadth-first through nested XRs
        for r in fields::resource_refs(xr) {
            queue.push_back((r, xr_namespace.clone()));
        }

        while let Some((r, parent_namespace)) = queue.pop_front() {
            let gvk = gvk_of_ref(&r);
            let namespace = r.namespace.clone().or(parent_namespace);
            let key = node_key(&gvk, namespace.as_deref(), &r.name);
            if !visited.insert(key) {
                continue;
            }

            let fetched = match self.resources.get_opt(&gvk, namespace.as_deref(), &r.name).await {
                Ok(found) => found,
                Err(e) if e.is_discovery() || e.is_not_found() => {
                    tracing::warn!(
                        kind = gvk.kind.as_str(),
                        name = r.name.as_str(),
                        error = %e,
                        "skipping unresolvable resource ref"
                    );
                    None
                }
                Err(e) => return Err(e.into()),
            };

            if let Some(child) = fetched {
                for child_ref in fields::resource_refs(&child) {
                    queue.push_back((child_ref, child.metadata.namespace.clone()));
                }
                out.push(child);
            }
        }

        Ok(out)
    }
}
