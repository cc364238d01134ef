//! XR composition-field probing
//!
//! Where an XR keeps its composition selection fields depends on the wire
//! version of its XRD: v1 XRDs use `spec.<field>`, everything else uses
//! `spec.crossplane.<field>` with a `spec.<field>` fallback. The fallback
//! order matters: during a migration both locations can be populated and the
//! v2 location is authoritative.

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use serde::Deserialize;

/// The XR's composition update policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Track the latest revision of the bound composition
    #[default]
    Automatic,
    /// Stay pinned to a revision until rewritten
    Manual,
}

/// Reference to a composed (or composite) resource held by an XR
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// Walk a dotted segment path into the object's data
fn probe<'a>(data: &'a serde_json::Value, path: &[&str]) -> Option<&'a serde_json::Value> {
    let mut current = data;
    for segment in path {
        current = current.get(segment)?;
    }
    Some(current)
}

/// Probe a composition field at the wire-version-appropriate locations
///
/// `field` is the path below `spec` (v1) or `spec.crossplane` (v2), e.g.
/// `["compositionRef", "name"]`.
fn probe_composition_field<'a>(
    xr: &'a DynamicObject,
    xrd_is_v1: bool,
    field: &[&str],
) -> Option<&'a serde_json::Value> {
    let mut v1_path = vec!["spec"];
    v1_path.extend_from_slice(field);

    if xrd_is_v1 {
        return probe(&xr.data, &v1_path);
    }

    let mut v2_path = vec!["spec", "crossplane"];
    v2_path.extend_from_slice(field);

    probe(&xr.data, &v2_path).or_else(|| probe(&xr.data, &v1_path))
}

/// `compositionRef.name`, if set
pub fn composition_ref_name(xr: &DynamicObject, xrd_is_v1: bool) -> Option<String> {
    probe_composition_field(xr, xrd_is_v1, &["compositionRef", "name"])
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// `compositionRevisionRef.name`, if set
pub fn composition_revision_ref_name(xr: &DynamicObject, xrd_is_v1: bool) -> Option<String> {
    probe_composition_field(xr, xrd_is_v1, &["compositionRevisionRef", "name"])
        .and_then(|v| v.as_str())
        .map(String::from)
}

/// `compositionUpdatePolicy`, defaulting to Automatic
pub fn composition_update_policy(xr: &DynamicObject, xrd_is_v1: bool) -> UpdatePolicy {
    match probe_composition_field(xr, xrd_is_v1, &["compositionUpdatePolicy"]).and_then(|v| v.as_str())
    {
        Some("Manual") => UpdatePolicy::Manual,
        _ => UpdatePolicy::Automatic,
    }
}

/// `compositionSelector.matchLabels`, if set
pub fn composition_selector_labels(
    xr: &DynamicObject,
    xrd_is_v1: bool,
) -> Option<BTreeMap<String, String>> {
    let labels = probe_composition_field(xr, xrd_is_v1, &["compositionSelector", "matchLabels"])?
        .as_object()?;
    Some(
        labels
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
            .collect(),
    )
}

/// Composed-resource references held by an XR, across every known location
///
/// Reads `spec.resourceRefs` (v1 XRs), `spec.crossplane.resourceRefs` (v2)
/// and `status.resourceRefs`; entries without a name are dropped.
pub fn resource_refs(xr: &DynamicObject) -> Vec<ResourceRef> {
    const LOCATIONS: &[&[&str]] = &[
        &["spec", "crossplane", "resourceRefs"],
        &["spec", "resourceRefs"],
        &["status", "resourceRefs"],
    ];

    let mut refs = Vec::new();
    for location in LOCATIONS {
        let Some(items) = probe(&xr.data, location).and_then(|v| v.as_array()) else {
            continue;
        };
        for item in items {
            if let Ok(r) = serde_json::from_value::<ResourceRef>(item.clone()) {
                if !r.name.is_empty() && !r.kind.is_empty() {
                    refs.push(r);
                }
            }
        }
    }
    refs
}

/// A claim's reference to its bound XR (`spec.resourceRef`), if present
pub fn claim_resource_ref(claim: &DynamicObject) -> Option<ResourceRef> {
    let value = probe(&claim.data, &["spec", "resourceRef"])?;
    serde_json::from_value(value.clone()).ok()
}
