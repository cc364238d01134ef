//! Composition resolver
//!
//! Maps an input XR (or claim) to the Composition body that would actually be
//! used at apply time:
//!
//! 1. Discriminate claim vs XR through the XRD cache and compute the
//!    effective target GVK.
//! 2. Honor a direct `compositionRef`, resolving through the
//!    Automatic/Manual revision policy.
//! 3. Otherwise match by `compositionSelector` labels, then by target type.
//!
//! Ambiguity is always an error that enumerates the colliding names; nothing
//! here guesses.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use kube::api::{DynamicObject, GroupVersionKind};
use xrdiff_kube::{ResourceClient, display_id, gvk_of};

use crate::definition::DefinitionClient;
use crate::error::{CrossplaneError, Result};
use crate::fields::{self, UpdatePolicy};
use crate::revision::{RevisionClient, check_revision_ownership};
use crate::types::{CROSSPLANE_GROUP, CompositeResourceDefinition, Composition, from_dynamic};

fn composition_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(CROSSPLANE_GROUP, "v1", "Composition")
}

/// Whether a composition's labels contain every selector entry with the
/// same value
fn labels_match(comp: &Composition, selector: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(key, value)| {
        comp.labels()
            .any(|(label_key, label_value)| label_key == key && label_value == value)
    })
}

/// Select the single composition compatible with `target` whose labels are a
/// superset of `selector`
pub fn select_by_labels(
    compositions: &[Arc<Composition>],
    target: &GroupVersionKind,
    selector: &BTreeMap<String, String>,
) -> Result<Arc<Composition>> {
    let mut matches: Vec<&Arc<Composition>> = compositions
        .iter()
        .filter(|c| c.spec.composite_type_ref.matches(target) && labels_match(c, selector))
        .collect();
    matches.sort_by_key(|c| c.name().to_string());

    match matches.as_slice() {
        [] => Err(CrossplaneError::NoCompositionMatchingSelector {
            target: target.clone(),
            selector: selector
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(","),
        }),
        [only] => Ok(Arc::clone(only)),
        many => Err(CrossplaneError::AmbiguousComposition {
            target: target.clone(),
            names: many.iter().map(|c| c.name().to_string()).collect(),
        }),
    }
}

/// Select the single composition compatible with `target`
pub fn select_by_type(
    compositions: &[Arc<Composition>],
    target: &GroupVersionKind,
) -> Result<Arc<Composition>> {
    let mut matches: Vec<&Arc<Composition>> = compositions
        .iter()
        .filter(|c| c.spec.composite_type_ref.matches(target))
        .collect();
    matches.sort_by_key(|c| c.name().to_string());

    match matches.as_slice() {
        [] => Err(CrossplaneError::NoCompositionForTarget {
            target: target.clone(),
        }),
        [only] => Ok(Arc::clone(only)),
        many => Err(CrossplaneError::AmbiguousComposition {
            target: target.clone(),
            names: many.iter().map(|c| c.name().to_string()).collect(),
        }),
    }
}

/// The outcome of resolving an XR against the cluster's compositions
#[derive(Debug, Clone)]
pub struct ResolvedComposition {
    /// The composition body to render with; synthetic when resolved through
    /// a revision
    pub composition: Composition,
    /// The XRD defining the input's type
    pub xrd: CompositeResourceDefinition,
    /// The effective composite target GVK
    pub target: GroupVersionKind,
    /// Whether the input resource was a claim
    pub is_claim: bool,
}

/// Cluster composition lookups and the resolver pipeline
pub struct CompositionClient {
    resources: ResourceClient,
    definitions: Arc<DefinitionClient>,
    revisions: Arc<RevisionClient>,
    cache: RwLock<Option<Arc<HashMap<String, Arc<Composition>>>>>,
}

impl CompositionClient {
    /// Create a composition client
    pub fn new(
        resources: ResourceClient,
        definitions: Arc<DefinitionClient>,
        revisions: Arc<RevisionClient>,
    ) -> Self {
        Self {
            resources,
            definitions,
            revisions,
            cache: RwLock::new(None),
        }
    }

    /// Eagerly populate the composition cache
    pub async fn initialize(&self) -> Result<()> {
        self.compositions().await.map(|_| ())
    }

    /// All compositions on the cluster, by name
    pub async fn compositions(&self) -> Result<Arc<HashMap<String, Arc<Composition>>>> {
        if let Some(cached) = self.cache.read().expect("composition cache poisoned").as_ref() {
            return Ok(Arc::clone(cached));
        }

        let objects = self.resources.list(&composition_gvk(), None).await?;
        let mut by_name = HashMap::with_capacity(objects.len());
        for obj in &objects {
            let comp: Composition = from_dynamic(obj)?;
            by_name.insert(comp.name().to_string(), Arc::new(comp));
        }
        tracing::debug!(count = by_name.len(), "cached compositions");

        let mut slot = self.cache.write().expect("composition cache poisoned");
        if let Some(cached) = slot.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let arc = Arc::new(by_name);
        *slot = Some(Arc::clone(&arc));
        Ok(arc)
    }

    /// A composition by name, if present
    pub async fn get_composition(&self, name: &str) -> Result<Option<Arc<Composition>>> {
        Ok(self.compositions().await?.get(name).cloned())
    }

    /// Resolve the Composition body an apply of this XR would use
    pub async fn find_matching_composition(&self, xr: &DynamicObject) -> Result<ResolvedComposition> {
        let gvk = gvk_of(xr).map_err(CrossplaneError::Kube)?;

        // claim discrimination: a claim's effective target is its XRD's XR
        // type at the referenceable version, never guessed
        let (xrd, target, is_claim) = match self.definitions.xrd_for_claim(&gvk).await? {
            Some(xrd) => {
                let target = xrd.xr_gvk()?;
                (xrd, target, true)
            }
            None => {
                let xrd = self
                    .definitions
                    .xrd_for_xr(&gvk)
                    .await?
                    .ok_or_else(|| CrossplaneError::XrdNotFound { gvk: gvk.clone() })?;
                (xrd, gvk.clone(), false)
            }
        };
        let v1 = xrd.is_v1();

        // direct reference wins over everything else
        if let Some(name) = fields::composition_ref_name(xr, v1) {
            let comp = self.get_composition(&name).await?.ok_or_else(|| {
                CrossplaneError::CompositionNotFound {
                    name: name.clone(),
                    xr: display_id(xr),
                }
            })?;
            let composition = self.resolve_revision(&comp, xr, v1).await?;
            if !composition.spec.composite_type_ref.matches(&target) {
                return Err(CrossplaneError::IncompatibleComposition {
                    name,
                    target,
                    composes: composition.spec.composite_type_ref.to_string(),
                });
            }
            return Ok(ResolvedComposition {
                composition,
                xrd,
                target,
                is_claim,
            });
        }

        let by_name = self.compositions().await?;
        let all: Vec<Arc<Composition>> = by_name.values().cloned().collect();

        let selected = match fields::composition_selector_labels(xr, v1) {
            Some(selector) => select_by_labels(&all, &target, &selector)?,
            None => select_by_type(&all, &target)?,
        };

        Ok(ResolvedComposition {
            composition: (*selected).clone(),
            xrd,
            target,
            is_claim,
        })
    }

    /// Decide which Composition body to use for a matched composition name
    ///
    /// | update policy         | revision ref | result                                  |
    /// |-----------------------|--------------|-----------------------------------------|
    /// | Automatic (default)   | ignored      | latest revision, direct comp fallback   |
    /// | Manual                | set          | that revision; must be labeled for name |
    /// | Manual                | unset        | latest revision, direct comp fallback   |
    ///
    /// Only "no revisions found" falls back to the direct composition; any
    /// other revision-lookup failure surfaces.
    async fn resolve_revision(
        &self,
        comp: &Composition,
        xr: &DynamicObject,
        xrd_is_v1: bool,
    ) -> Result<Composition> {
        let policy = fields::composition_update_policy(xr, xrd_is_v1);
        let pinned = fields::composition_revision_ref_name(xr, xrd_is_v1);

        if policy == UpdatePolicy::Manual {
            if let Some(rev_name) = pinned {
                let rev = self.revisions.get_revision(&rev_name).await?;
                check_revision_ownership(&rev, comp.name())?;
                return Ok(rev.to_composition());
            }
        }

        match self.revisions.latest_revision(comp.name()).await {
            Ok(rev) => Ok(rev.to_composition()),
            Err(CrossplaneError::NoRevisions { .. }) => Ok(comp.clone()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompositionSpec, TypeReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn composition(name: &str, api_version: &str, kind: &str, labels: &[(&str, &str)]) -> Arc<Composition> {
        let label_map = if labels.is_empty() {
            None
        } else {
            Some(
                labels
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
            )
        };
        Arc::new(Composition {
            api_version: "apiextensions.crossplane.io/v1".to_string(),
            kind: "Composition".to_string(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: label_map,
                ..Default::default()
            },
            spec: CompositionSpec {
                composite_type_ref: TypeReference {
                    api_version: api_version.to_string(),
                    kind: kind.to_string(),
                },
                mode: Some("Pipeline".to_string()),
                pipeline: vec![],
                write_connection_secrets_to_namespace: None,
            },
        })
    }

    fn target() -> GroupVersionKind {
        GroupVersionKind::gvk("example.org", "v1", "XR1")
    }

    #[test]
    fn test_select_by_type_single_match() {
        let comps = vec![
            composition("a-comp", "example.org/v1", "XR1", &[]),
            composition("b-comp", "example.org/v1", "XOther", &[]),
        ];
        assert_eq!(select_by_type(&comps, &target()).unwrap().name(), "a-comp");
    }

    #[test]
    fn test_select_by_type_no_match() {
        let comps = vec![composition("b-comp", "example.org/v1", "XOther", &[])];
        let err = select_by_type(&comps, &target()).unwrap_err();
        assert!(err.to_string().contains("no composition found for"));
    }

    #[test]
    fn test_select_by_type_ambiguous() {
        let comps = vec![
            composition("b-comp", "example.org/v1", "XR1", &[]),
            composition("a-comp", "example.org/v1", "XR1", &[]),
        ];
        let err = select_by_type(&comps, &target()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ambiguous composition selection: multiple compositions match"));
        // colliding names enumerated in stable order
        assert!(message.contains("a-comp, b-comp"));
    }

    #[test]
    fn test_select_by_labels_superset_semantics() {
        let comps = vec![
            composition(
                "a-comp",
                "example.org/v1",
                "XR1",
                &[("environment", "production"), ("tier", "gold")],
            ),
            composition("b-comp", "example.org/v1", "XR1", &[("environment", "staging")]),
        ];
        let mut selector = BTreeMap::new();
        selector.insert("environment".to_string(), "production".to_string());

        let selected = select_by_labels(&comps, &target(), &selector).unwrap();
        assert_eq!(selected.name(), "a-comp");
    }

    #[test]
    fn test_select_by_labels_ambiguous() {
        let comps = vec![
            composition("a-comp", "example.org/v1", "XR1", &[("environment", "production")]),
            composition("b-comp", "example.org/v1", "XR1", &[("environment", "production")]),
        ];
        let mut selector = BTreeMap::new();
        selector.insert("environment".to_string(), "production".to_string());

        let err = select_by_labels(&comps, &target(), &selector).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("ambiguous composition selection: multiple compositions match"));
        assert!(message.contains("a-comp"));
        assert!(message.contains("b-comp"));
    }

    #[test]
    fn test_select_by_labels_requires_type_compatibility() {
        // label match alone is not enough; the composition must compose the
        // target type
        let comps = vec![composition(
            "a-comp",
            "example.org/v1",
            "XOther",
            &[("environment", "production")],
        )];
        let mut selector = BTreeMap::new();
        selector.insert("environment".to_string(), "production".to_string());

        let err = select_by_labels(&comps, &target(), &selector).unwrap_err();
        assert!(err.to_string().contains("no composition with labels"));
    }

    #[test]
    fn test_select_by_labels_value_mismatch() {
        let comps = vec![composition(
            "a-comp",
            "example.org/v1",
            "XR1",
            &[("environment", "staging")],
        )];
        let mut selector = BTreeMap::new();
        selector.insert("environment".to_string(), "production".to_string());

        assert!(select_by_labels(&comps, &target(), &selector).is_err());
    }
}
