//! CompositeResourceDefinition client
//!
//! Caches every XRD on the cluster on first access and answers "which XRD
//! defines this claim kind" and "which XRD defines this XR kind". The cache
//! is filled once per process; readers accept that staleness.

use std::sync::{Arc, RwLock};

use kube::api::GroupVersionKind;
use xrdiff_kube::ResourceClient;

use crate::error::Result;
use crate::types::{CROSSPLANE_GROUP, CompositeResourceDefinition, from_dynamic};

/// First XRD whose group and claim kind match the given claim GVK
pub fn xrd_for_claim_in<'a>(
    xrds: &'a [CompositeResourceDefinition],
    gvk: &GroupVersionKind,
) -> Option<&'a CompositeResourceDefinition> {
    xrds.iter().find(|xrd| {
        xrd.spec.group == gvk.group
            && xrd
                .spec
                .claim_names
                .as_ref()
                .is_some_and(|names| names.kind == gvk.kind)
    })
}

/// First XRD whose group, XR kind and declared versions match the given GVK
pub fn xrd_for_xr_in<'a>(
    xrds: &'a [CompositeResourceDefinition],
    gvk: &GroupVersionKind,
) -> Option<&'a CompositeResourceDefinition> {
    xrds.iter().find(|xrd| {
        xrd.spec.group == gvk.group
            && xrd.spec.names.kind == gvk.kind
            && xrd.spec.versions.iter().any(|v| v.name == gvk.version)
    })
}

/// Cluster XRD lookups over a lazily filled cache
pub struct DefinitionClient {
    resources: ResourceClient,
    cache: RwLock<Option<Arc<Vec<CompositeResourceDefinition>>>>,
}

impl DefinitionClient {
    /// Create a definition client
    pub fn new(resources: ResourceClient) -> Self {
        Self {
            resources,
            cache: RwLock::new(None),
        }
    }

    /// All XRDs on the cluster, fetched once and cached
    pub async fn xrds(&self) -> Result<Arc<Vec<CompositeResourceDefinition>>> {
        if let Some(cached) = self.cache.read().expect("xrd cache poisoned").as_ref() {
            return Ok(Arc::clone(cached));
        }

        let fetched = self.fetch_all().await?;

        let mut slot = self.cache.write().expect("xrd cache poisoned");
        // another task may have filled the cache while we were fetching
        if let Some(cached) = slot.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let arc = Arc::new(fetched);
        *slot = Some(Arc::clone(&arc));
        Ok(arc)
    }

    async fn fetch_all(&self) -> Result<Vec<CompositeResourceDefinition>> {
        let gvks = self
            .resources
            .gvks_for_group_kind(CROSSPLANE_GROUP, "CompositeResourceDefinition")
            .await?;

        // XRDs can be served at both v1 and v2; list at the newest wire
        // version so the apiVersion recorded on each XRD reflects what the
        // apiserver considers authoritative for field placement.
        let gvk = gvks
            .iter()
            .find(|g| g.version == "v2")
            .or_else(|| gvks.iter().find(|g| g.version == "v1"))
            .unwrap_or(&gvks[0]);

        let objects = self.resources.list(gvk, None).await?;
        tracing::debug!(count = objects.len(), version = gvk.version.as_str(), "cached XRDs");

        objects.iter().map(from_dynamic).collect()
    }

    /// The XRD defining the given claim kind, if any
    pub async fn xrd_for_claim(&self, gvk: &GroupVersionKind) -> Result<Option<CompositeResourceDefinition>> {
        let xrds = self.xrds().await?;
        Ok(xrd_for_claim_in(&xrds, gvk).cloned())
    }

    /// The XRD defining the given XR kind at the given version, if any
    pub async fn xrd_for_xr(&self, gvk: &GroupVersionKind) -> Result<Option<CompositeResourceDefinition>> {
        let xrds = self.xrds().await?;
        Ok(xrd_for_xr_in(&xrds, gvk).cloned())
    }
}
