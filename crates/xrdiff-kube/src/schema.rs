//! CRD schema client
//!
//! Answers two questions about resource types: "does this GVK need a CRD to
//! exist" and "give me that CRD". CRDs are fetched by their canonical
//! `<plural>.<group>` name through the typed apiextensions API, never through
//! discovery of the apiextensions group itself, and cached for the lifetime
//! of the process.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::Client;
use kube::api::{Api, GroupVersionKind, ListParams};

use crate::convert::TypeConverter;
use crate::error::{KubeError, Result};

/// Built-in API groups that are served without a CRD
const BUILTIN_GROUPS: &[&str] = &["apps", "batch", "autoscaling", "policy", "extensions"];

/// Whether a resource group can only be served by a CustomResourceDefinition
///
/// The empty (core) group and built-in `*.k8s.io` groups are compiled into
/// the apiserver. `apiextensions.k8s.io` is deliberately not exempted: the
/// lookup path for it must stay observable rather than short-circuited.
pub fn crd_required_for_group(group: &str) -> bool {
    if group.is_empty() {
        return false;
    }
    if BUILTIN_GROUPS.contains(&group) {
        return false;
    }
    if group.ends_with(".k8s.io") && group != "apiextensions.k8s.io" {
        return false;
    }
    true
}

/// Client for CustomResourceDefinition lookups
pub struct SchemaClient {
    crd_api: Api<CustomResourceDefinition>,
    converter: Arc<TypeConverter>,
    // by `<plural>.<group>` name
    crds: RwLock<HashMap<String, Arc<CustomResourceDefinition>>>,
    // per-GVK requirement answers
    required: RwLock<HashMap<GroupVersionKind, bool>>,
}

impl SchemaClient {
    /// Create a schema client sharing the given type converter
    pub fn new(client: Client, converter: Arc<TypeConverter>) -> Self {
        Self {
            crd_api: Api::all(client),
            converter,
            crds: RwLock::new(HashMap::new()),
            required: RwLock::new(HashMap::new()),
        }
    }

    /// Whether instances of this GVK require a CRD on the cluster
    pub fn is_crd_required(&self, gvk: &GroupVersionKind) -> bool {
        if let Some(answer) = self.required.read().expect("requirement cache poisoned").get(gvk) {
            return *answer;
        }
        let answer = crd_required_for_group(&gvk.group);
        self.required
            .write()
            .expect("requirement cache poisoned")
            .insert(gvk.clone(), answer);
        answer
    }

    /// Fetch the CRD backing a GVK
    ///
    /// The CRD name is constructed as `<plural>.<group>` from the converter's
    /// plural-name answer. Subsequent calls return the same cached instance.
    pub async fn get_crd(&self, gvk: &GroupVersionKind) -> Result<Arc<CustomResourceDefinition>> {
        if gvk.group.is_empty() {
            return Err(KubeError::InvalidResource(format!(
                "core-group kind {} is not served by a CRD",
                gvk.kind
            )));
        }

        let plural = self.converter.plural_name(gvk).await?;
        let name = format!("{}.{}", plural, gvk.group);

        if let Some(hit) = self.crds.read().expect("crd cache poisoned").get(&name) {
            return Ok(Arc::clone(hit));
        }

        let crd = match self.crd_api.get(&name).await {
            Ok(crd) => Arc::new(crd),
            Err(kube::Error::Api(resp)) if resp.code == 404 => {
                return Err(KubeError::CrdMissing {
                    name,
                    gvk: gvk.clone(),
                });
            }
            Err(e) => return Err(KubeError::Api(e)),
        };

        self.crds
            .write()
            .expect("crd cache poisoned")
            .insert(name, Arc::clone(&crd));

        Ok(crd)
    }

    /// Fetch the CRDs for every given GVK, failing fast on the first one
    /// missing from the cluster
    ///
    /// GVKs served without a CRD are skipped; for everything else a missing
    /// CRD is fatal, not a degraded mode.
    pub async fn load_crds(&self, gvks: &[GroupVersionKind]) -> Result<Vec<Arc<CustomResourceDefinition>>> {
        let mut out = Vec::with_capacity(gvks.len());
        let mut seen = std::collections::HashSet::new();
        for gvk in gvks {
            if !self.is_crd_required(gvk) {
                continue;
            }
            let crd = self.get_crd(gvk).await?;
            if seen.insert(crd.metadata.name.clone()) {
                out.push(crd);
            }
        }
        Ok(out)
    }

    /// List every CRD on the cluster, populating the by-name cache
    pub async fn all_crds(&self) -> Result<Vec<Arc<CustomResourceDefinition>>> {
        let list = self.crd_api.list(&ListParams::default()).await?;
        let mut out = Vec::with_capacity(list.items.len());
        let mut cache = self.crds.write().expect("crd cache poisoned");
        for crd in list.items {
            let name = crd.metadata.name.clone().unwrap_or_default();
            let arc = Arc::new(crd);
            cache.insert(name, Arc::clone(&arc));
            out.push(arc);
        }
        Ok(out)
    }
}
