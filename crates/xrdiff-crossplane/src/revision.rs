//! CompositionRevision client
//!
//! Revisions are immutable snapshots of a Composition, labeled with the
//! owning composition's name and numbered by a monotonically increasing
//! integer. Revision numbers must be unique per composition; duplicates are
//! a hard error, never tie-broken.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kube::api::GroupVersionKind;
use xrdiff_kube::ResourceClient;

use crate::error::{CrossplaneError, Result};
use crate::types::{COMPOSITION_NAME_LABEL, CROSSPLANE_GROUP, CompositionRevision, from_dynamic};

fn revision_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(CROSSPLANE_GROUP, "v1", "CompositionRevision")
}

/// The highest-numbered revision of a composition
///
/// `revisions` is the full set labeled for `composition`. Errors when the
/// set is empty, and when the two highest entries share a revision number.
pub fn latest_of(
    revisions: &[Arc<CompositionRevision>],
    composition: &str,
) -> Result<Arc<CompositionRevision>> {
    let mut sorted: Vec<&Arc<CompositionRevision>> = revisions.iter().collect();
    sorted.sort_by(|a, b| b.spec.revision.cmp(&a.spec.revision));

    match sorted.as_slice() {
        [] => Err(CrossplaneError::NoRevisions {
            composition: composition.to_string(),
        }),
        [only] => Ok(Arc::clone(only)),
        [first, second, ..] => {
            if first.spec.revision == second.spec.revision {
                return Err(CrossplaneError::DuplicateRevision {
                    composition: composition.to_string(),
                    revision: first.spec.revision,
                    first: first.name().to_string(),
                    second: second.name().to_string(),
                });
            }
            Ok(Arc::clone(first))
        }
    }
}

/// Assert a revision is labeled for the expected composition
pub fn check_revision_ownership(rev: &CompositionRevision, expected: &str) -> Result<()> {
    let actual = rev.composition_name().unwrap_or("(unlabeled)");
    if actual != expected {
        return Err(CrossplaneError::RevisionCompositionMismatch {
            revision: rev.name().to_string(),
            actual: actual.to_string(),
            expected: expected.to_string(),
        });
    }
    Ok(())
}

/// Cluster revision lookups over lazily filled caches
pub struct RevisionClient {
    resources: ResourceClient,
    // individual lookups by revision name
    by_name: RwLock<HashMap<String, Arc<CompositionRevision>>>,
    // per-composition lists; the empty list is cached too
    by_composition: RwLock<HashMap<String, Arc<Vec<Arc<CompositionRevision>>>>>,
}

impl RevisionClient {
    /// Create a revision client
    pub fn new(resources: ResourceClient) -> Self {
        Self {
            resources,
            by_name: RwLock::new(HashMap::new()),
            by_composition: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch a revision by name
    pub async fn get_revision(&self, name: &str) -> Result<Arc<CompositionRevision>> {
        if let Some(hit) = self.by_name.read().expect("revision cache poisoned").get(name) {
            return Ok(Arc::clone(hit));
        }

        let obj = self
            .resources
            .get(&revision_gvk(), None, name)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    CrossplaneError::RevisionNotFound {
                        name: name.to_string(),
                    }
                } else {
                    CrossplaneError::Kube(e)
                }
            })?;
        let rev: Arc<CompositionRevision> = Arc::new(from_dynamic(&obj)?);

        self.by_name
            .write()
            .expect("revision cache poisoned")
            .insert(name.to_string(), Arc::clone(&rev));

        Ok(rev)
    }

    /// Every revision labeled for a composition
    ///
    /// Populated lazily by a server-side label-selector query; an empty
    /// result is cached so a new composition is not re-queried per XR.
    pub async fn revisions_for_composition(
        &self,
        composition: &str,
    ) -> Result<Arc<Vec<Arc<CompositionRevision>>>> {
        if let Some(hit) = self
            .by_composition
            .read()
            .expect("revision cache poisoned")
            .get(composition)
        {
            return Ok(Arc::clone(hit));
        }

        let selector = format!("{}={}", COMPOSITION_NAME_LABEL, composition);
        let objects = self
            .resources
            .list_by_label(&revision_gvk(), None, &selector)
            .await?;

        let mut revisions = Vec::with_capacity(objects.len());
        for obj in &objects {
            let rev: Arc<CompositionRevision> = Arc::new(from_dynamic(obj)?);
            self.by_name
                .write()
                .expect("revision cache poisoned")
                .insert(rev.name().to_string(), Arc::clone(&rev));
            revisions.push(rev);
        }
        tracing::debug!(
            composition = composition,
            count = revisions.len(),
            "cached composition revisions"
        );

        let arc = Arc::new(revisions);
        self.by_composition
            .write()
            .expect("revision cache poisoned")
            .insert(composition.to_string(), Arc::clone(&arc));
        Ok(arc)
    }

    /// The latest revision of a composition, by revision number
    pub async fn latest_revision(&self, composition: &str) -> Result<Arc<CompositionRevision>> {
        let revisions = self.revisions_for_composition(composition).await?;
        latest_of(&revisions, composition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompositionRevisionSpec, TypeReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn revision(name: &str, composition: Option<&str>, number: i64) -> Arc<CompositionRevision> {
        let labels = composition.map(|c| {
            let mut m = std::collections::BTreeMap::new();
            m.insert(COMPOSITION_NAME_LABEL.to_string(), c.to_string());
            m
        });
        Arc::new(CompositionRevision {
            api_version: "apiextensions.crossplane.io/v1".to_string(),
            kind: "CompositionRevision".to_string(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels,
                ..Default::default()
            },
            spec: CompositionRevisionSpec {
                revision: number,
                composite_type_ref: TypeReference {
                    api_version: "example.org/v1".to_string(),
                    kind: "XExample".to_string(),
                },
                mode: None,
                pipeline: vec![],
                write_connection_secrets_to_namespace: None,
            },
        })
    }

    #[test]
    fn test_latest_of_picks_highest_number() {
        let revisions = vec![
            revision("comp-aaa", Some("comp"), 1),
            revision("comp-ccc", Some("comp"), 3),
            revision("comp-bbb", Some("comp"), 2),
        ];
        let latest = latest_of(&revisions, "comp").unwrap();
        assert_eq!(latest.name(), "comp-ccc");
        assert_eq!(latest.spec.revision, 3);
    }

    #[test]
    fn test_latest_of_single_revision() {
        let revisions = vec![revision("comp-aaa", Some("comp"), 1)];
        assert_eq!(latest_of(&revisions, "comp").unwrap().spec.revision, 1);
    }

    #[test]
    fn test_latest_of_empty_is_no_revisions() {
        let err = latest_of(&[], "fresh-comp").unwrap_err();
        assert!(matches!(err, CrossplaneError::NoRevisions { .. }));
    }

    #[test]
    fn test_latest_of_rejects_duplicate_numbers() {
        let revisions = vec![
            revision("dup-comp-aaa", Some("dup-comp"), 5),
            revision("dup-comp-bbb", Some("dup-comp"), 5),
            revision("dup-comp-old", Some("dup-comp"), 2),
        ];
        let err = latest_of(&revisions, "dup-comp").unwrap_err();
        let message = err.to_string();
        assert!(
            message.contains("multiple composition revisions found with the same revision number 5")
        );
        assert!(message.contains("dup-comp-aaa"));
        assert!(message.contains("dup-comp-bbb"));
    }

    #[test]
    fn test_duplicate_below_top_is_allowed() {
        // only the top two entries decide; a stale duplicate further down
        // cannot be "the latest" under any ordering
        let revisions = vec![
            revision("comp-a", Some("comp"), 3),
            revision("comp-b", Some("comp"), 1),
            revision("comp-c", Some("comp"), 1),
        ];
        assert_eq!(latest_of(&revisions, "comp").unwrap().spec.revision, 3);
    }

    #[test]
    fn test_check_revision_ownership() {
        let rev = revision("other-comp-rev1", Some("other-comp"), 1);
        let err = check_revision_ownership(&rev, "test-comp").unwrap_err();
        assert!(
            err.to_string()
                .contains("belongs to composition other-comp, not test-comp")
        );

        assert!(check_revision_ownership(&rev, "other-comp").is_ok());
    }

    #[test]
    fn test_check_revision_ownership_unlabeled() {
        let rev = revision("stray-rev", None, 1);
        assert!(check_revision_ownership(&rev, "test-comp").is_err());
    }
}
