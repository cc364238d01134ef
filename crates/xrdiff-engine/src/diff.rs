//! Diff model: pairing, canonicalization and classification
//!
//! A diff is keyed by (kind, namespace, name, apiVersion) and classified as
//! Added, Modified, Removed or Equal. Before any line diff both sides are
//! canonicalized: server-managed metadata is stripped with a path-removal
//! helper that understands dotted segments and `[bracketed]` map keys (needed
//! for annotation keys that themselves contain dots and slashes), then
//! serialized to YAML with sorted keys.

use std::collections::BTreeMap;

use kube::api::DynamicObject;
use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use xrdiff_crossplane::COMPOSITION_RESOURCE_NAME_ANNOTATION;
use xrdiff_kube::{display_id, gvk_of};

use crate::error::{DiffError, Result};

/// Paths stripped from both sides before comparison
///
/// These are server-managed or volatile and would turn every diff into
/// noise. `status` is stripped wholesale: the engine predicts spec-level
/// changes, not controller observations.
const IGNORED_PATHS: &[&str] = &[
    "metadata.managedFields",
    "metadata.resourceVersion",
    "metadata.uid",
    "metadata.generation",
    "metadata.creationTimestamp",
    "metadata.selfLink",
    "metadata.annotations[kubectl.kubernetes.io/last-applied-configuration]",
    "status",
];

/// How a resource would change
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffType {
    Added,
    Modified,
    Removed,
    Equal,
}

impl std::fmt::Display for DiffType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiffType::Added => write!(f, "Added"),
            DiffType::Modified => write!(f, "Modified"),
            DiffType::Removed => write!(f, "Removed"),
            DiffType::Equal => write!(f, "Equal"),
        }
    }
}

/// Identity of a diffed resource
///
/// Field order gives the stable kind-then-name iteration order the text
/// renderer relies on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DiffKey {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub api_version: String,
}

impl DiffKey {
    /// The key of a live or rendered object
    pub fn of(obj: &DynamicObject) -> Result<Self> {
        let gvk = gvk_of(obj).map_err(DiffError::Kube)?;
        let api_version = obj
            .types
            .as_ref()
            .map(|t| t.api_version.clone())
            .unwrap_or_default();
        let name = obj.metadata.name.clone().ok_or_else(|| {
            DiffError::Serialization(format!("{} is missing metadata.name", display_id(obj)))
        })?;
        Ok(Self {
            kind: gvk.kind,
            namespace: obj.metadata.namespace.clone(),
            name,
            api_version,
        })
    }

    /// `Kind/name`, the header form
    pub fn display(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

/// One line of a computed diff
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDiff {
    pub tag: LineTag,
    pub text: String,
}

/// Line disposition within a diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineTag {
    Equal,
    Insert,
    Delete,
}

/// A single resource's predicted change
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    pub key: DiffKey,
    pub diff_type: DiffType,
    /// In-cluster object before; None iff Added
    pub current: Option<DynamicObject>,
    /// Post-dry-run object after; None iff Removed
    pub desired: Option<DynamicObject>,
    pub line_diffs: Vec<LineDiff>,
}

/// All diffs of a run, iterated in stable key order
pub type DiffSet = BTreeMap<DiffKey, ResourceDiff>;

/// Counts of non-equal diffs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub modified: usize,
    pub removed: usize,
}

/// Summarize a diff set, ignoring Equal entries
pub fn summarize(diffs: &DiffSet) -> DiffSummary {
    let mut summary = DiffSummary::default();
    for diff in diffs.values() {
        match diff.diff_type {
            DiffType::Added => summary.added += 1,
            DiffType::Modified => summary.modified += 1,
            DiffType::Removed => summary.removed += 1,
            DiffType::Equal => {}
        }
    }
    summary
}

/// Split a removal path into segments
///
/// `a.b.c` walks three keys; `a.b[key/with.dots]` walks `a`, `b`, then the
/// literal bracketed key.
fn parse_path_segments(path: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = path.chars();

    while let Some(c) = chars.next() {
        match c {
            '.' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
            }
            '[' => {
                if !current.is_empty() {
                    segments.push(std::mem::take(&mut current));
                }
                let mut key = String::new();
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    key.push(inner);
                }
                segments.push(key);
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn remove_segments(value: &mut serde_json::Value, segments: &[String]) {
    match segments {
        [] => {}
        [last] => {
            if let Some(obj) = value.as_object_mut() {
                obj.remove(last);
            }
        }
        [head, rest @ ..] => {
            if let Some(child) = value.as_object_mut().and_then(|o| o.get_mut(head)) {
                remove_segments(child, rest);
            }
        }
    }
}

/// Remove a dotted/bracketed path from a JSON value
pub fn remove_path(value: &mut serde_json::Value, path: &str) {
    let segments = parse_path_segments(path);
    remove_segments(value, &segments);
}

/// Canonical JSON value of an object with volatile metadata stripped
pub fn canonical_value(obj: &DynamicObject) -> Result<serde_json::Value> {
    let mut value = serde_json::to_value(obj)?;

    for path in IGNORED_PATHS {
        remove_path(&mut value, path);
    }

    // drop annotation maps emptied by the stripping
    if let Some(metadata) = value.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        let empty = metadata
            .get("annotations")
            .and_then(|a| a.as_object())
            .is_some_and(|a| a.is_empty());
        if empty {
            metadata.remove("annotations");
        }
    }

    Ok(value)
}

/// Canonical YAML of an object with volatile metadata stripped
pub fn canonicalize(obj: &DynamicObject) -> Result<String> {
    Ok(serde_yaml::to_string(&canonical_value(obj)?)?)
}

fn all_lines(text: &str, tag: LineTag) -> Vec<LineDiff> {
    text.lines()
        .map(|line| LineDiff {
            tag,
            text: line.to_string(),
        })
        .collect()
}

/// Line-granular diff of two canonical texts
pub fn compute_line_diffs(old: &str, new: &str) -> Vec<LineDiff> {
    let diff = TextDiff::from_lines(old, new);
    diff.iter_all_changes()
        .map(|change| LineDiff {
            tag: match change.tag() {
                ChangeTag::Delete => LineTag::Delete,
                ChangeTag::Insert => LineTag::Insert,
                ChangeTag::Equal => LineTag::Equal,
            },
            text: change.value().trim_end().to_string(),
        })
        .collect()
}

/// Build the diff for one current/desired pair
///
/// Classification: Added iff current is absent, Removed iff desired is
/// absent, Equal iff the canonical forms match, Modified otherwise.
pub fn build_diff(current: Option<DynamicObject>, desired: Option<DynamicObject>) -> Result<ResourceDiff> {
    match (current, desired) {
        (None, Some(desired)) => {
            let key = DiffKey::of(&desired)?;
            let canonical = canonicalize(&desired)?;
            Ok(ResourceDiff {
                key,
                diff_type: DiffType::Added,
                current: None,
                desired: Some(desired),
                line_diffs: all_lines(&canonical, LineTag::Insert),
            })
        }
        (Some(current), None) => {
            let key = DiffKey::of(&current)?;
            let canonical = canonicalize(&current)?;
            Ok(ResourceDiff {
                key,
                diff_type: DiffType::Removed,
                current: Some(current),
                desired: None,
                line_diffs: all_lines(&canonical, LineTag::Delete),
            })
        }
        (Some(current), Some(desired)) => {
            let key = DiffKey::of(&current)?;
            let old = canonicalize(&current)?;
            let new = canonicalize(&desired)?;
            if old == new {
                Ok(ResourceDiff {
                    key,
                    diff_type: DiffType::Equal,
                    current: Some(current),
                    desired: Some(desired),
                    line_diffs: Vec::new(),
                })
            } else {
                Ok(ResourceDiff {
                    key,
                    diff_type: DiffType::Modified,
                    current: Some(current),
                    desired: Some(desired),
                    line_diffs: compute_line_diffs(&old, &new),
                })
            }
        }
        (None, None) => Err(DiffError::Serialization(
            "cannot diff a pair with neither side present".to_string(),
        )),
    }
}

/// A matched current/desired pair awaiting dry-run apply and diffing
#[derive(Debug)]
pub struct ResourcePair {
    pub current: Option<DynamicObject>,
    pub desired: Option<DynamicObject>,
}

fn composition_resource_name(obj: &DynamicObject) -> Option<String> {
    obj.metadata
        .annotations
        .as_ref()?
        .get(COMPOSITION_RESOURCE_NAME_ANNOTATION)
        .cloned()
}

/// Pair current and desired resources by identity
///
/// Primary match is the full (kind, namespace, name, apiVersion) key. A
/// desired resource that misses falls back to matching a current resource of
/// the same type carrying the same composition-resource-name annotation,
/// which covers generated names. Two current resources claiming the same
/// annotation value are an error, not a guess.
pub fn pair_resources(
    current: Vec<DynamicObject>,
    desired: Vec<DynamicObject>,
) -> Result<Vec<ResourcePair>> {
    let mut remaining: BTreeMap<DiffKey, DynamicObject> = BTreeMap::new();
    for obj in current {
        remaining.insert(DiffKey::of(&obj)?, obj);
    }

    let mut pairs = Vec::new();
    for desired_obj in desired {
        let key = DiffKey::of(&desired_obj)?;
        if let Some(matched) = remaining.remove(&key) {
            pairs.push(ResourcePair {
                current: Some(matched),
                desired: Some(desired_obj),
            });
            continue;
        }

        if let Some(resource_name) = composition_resource_name(&desired_obj) {
            let candidates: Vec<DiffKey> = remaining
                .iter()
                .filter(|(candidate_key, candidate)| {
                    candidate_key.kind == key.kind
                        && candidate_key.api_version == key.api_version
                        && composition_resource_name(candidate).as_deref()
                            == Some(resource_name.as_str())
                })
                .map(|(candidate_key, _)| candidate_key.clone())
                .collect();

            match candidates.as_slice() {
                [] => {}
                [only] => {
                    let matched = remaining.remove(only).expect("candidate key present");
                    pairs.push(ResourcePair {
                        current: Some(matched),
                        desired: Some(desired_obj),
                    });
                    continue;
                }
                [first, second, ..] => {
                    return Err(DiffError::DuplicateResourceName {
                        resource_name,
                        kind: key.kind,
                        first: first.display(),
                        second: second.display(),
                    });
                }
            }
        }

        pairs.push(ResourcePair {
            current: None,
            desired: Some(desired_obj),
        });
    }

    // anything still unmatched exists only in the cluster
    for (_, leftover) in remaining {
        pairs.push(ResourcePair {
            current: Some(leftover),
            desired: None,
        });
    }

    Ok(pairs)
}
