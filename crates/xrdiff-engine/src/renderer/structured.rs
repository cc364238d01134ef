//! Structured (JSON/YAML) renderer
//!
//! Emits `{summary, changes[]}` for machine consumers. Added and removed
//! entries carry the full object under `diff.spec`; modified entries carry
//! both versions under `diff.old` / `diff.new`. Equal entries are omitted.
//! Output is deterministic: stable change order, sorted keys.

use std::io::Write;

use serde::Serialize;

use super::DiffRenderer;
use crate::diff::{DiffSet, DiffSummary, DiffType, canonical_value, summarize};

/// Wire format of the structured renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredFormat {
    Json,
    Yaml,
}

#[derive(Serialize)]
struct Document {
    summary: DiffSummary,
    changes: Vec<Change>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Change {
    #[serde(rename = "type")]
    change_type: DiffType,
    api_version: String,
    kind: String,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<String>,
    diff: serde_json::Value,
}

/// The machine-facing diff renderer
pub struct StructuredRenderer {
    format: StructuredFormat,
}

impl StructuredRenderer {
    /// Create a structured renderer for the given format
    pub fn new(format: StructuredFormat) -> Self {
        Self { format }
    }

    fn document(diffs: &DiffSet) -> std::io::Result<Document> {
        let mut changes = Vec::new();
        for diff in diffs.values() {
            let body = match diff.diff_type {
                DiffType::Equal => continue,
                DiffType::Added => {
                    let desired = diff.desired.as_ref().expect("added diff has desired side");
                    serde_json::json!({ "spec": canonical_value(desired).map_err(std::io::Error::other)? })
                }
                DiffType::Removed => {
                    let current = diff.current.as_ref().expect("removed diff has current side");
                    serde_json::json!({ "spec": canonical_value(current).map_err(std::io::Error::other)? })
                }
                DiffType::Modified => {
                    let current = diff.current.as_ref().expect("modified diff has current side");
                    let desired = diff.desired.as_ref().expect("modified diff has desired side");
                    serde_json::json!({
                        "old": canonical_value(current).map_err(std::io::Error::other)?,
                        "new": canonical_value(desired).map_err(std::io::Error::other)?,
                    })
                }
            };

            changes.push(Change {
                change_type: diff.diff_type,
                api_version: diff.key.api_version.clone(),
                kind: diff.key.kind.clone(),
                name: diff.key.name.clone(),
                namespace: diff.key.namespace.clone(),
                diff: body,
            });
        }

        Ok(Document {
            summary: summarize(diffs),
            changes,
        })
    }
}

impl DiffRenderer for StructuredRenderer {
    fn render(&self, w: &mut dyn Write, diffs: &DiffSet) -> std::io::Result<()> {
        let document = Self::document(diffs)?;
        match self.format {
            StructuredFormat::Json => {
                serde_json::to_writer_pretty(&mut *w, &document).map_err(std::io::Error::other)?;
                writeln!(w)?;
            }
            StructuredFormat::Yaml => {
                let text = serde_yaml::to_string(&document).map_err(std::io::Error::other)?;
                w.write_all(text.as_bytes())?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::build_diff;
    use kube::api::{DynamicObject, TypeMeta};

    fn object(kind: &str, name: &str, spec: serde_json::Value) -> DynamicObject {
        let mut obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.org/v1".to_string(),
                kind: kind.to_string(),
            }),
            metadata: Default::default(),
            data: serde_json::json!({ "spec": spec }),
        };
        obj.metadata.name = Some(name.to_string());
        obj
    }

    fn sample_diffs() -> DiffSet {
        let mut diffs = DiffSet::new();
        let added = build_diff(
            None,
            Some(object("ComposedResource", "new-cr", serde_json::json!({"field": "new"}))),
        )
        .unwrap();
        diffs.insert(added.key.clone(), added);

        let modified = build_diff(
            Some(object("ComposedResource", "cr", serde_json::json!({"field": "old"}))),
            Some(object("ComposedResource", "cr", serde_json::json!({"field": "new"}))),
        )
        .unwrap();
        diffs.insert(modified.key.clone(), modified);

        let equal = build_diff(
            Some(object("ComposedResource", "same", serde_json::json!({"x": 1}))),
            Some(object("ComposedResource", "same", serde_json::json!({"x": 1}))),
        )
        .unwrap();
        diffs.insert(equal.key.clone(), equal);

        diffs
    }

    fn render_json(diffs: &DiffSet) -> serde_json::Value {
        let renderer = StructuredRenderer::new(StructuredFormat::Json);
        let mut out = Vec::new();
        renderer.render(&mut out, diffs).unwrap();
        serde_json::from_slice(&out).unwrap()
    }

    #[test]
    fn test_json_document_shape() {
        let value = render_json(&sample_diffs());

        assert_eq!(value["summary"]["added"], 1);
        assert_eq!(value["summary"]["modified"], 1);
        assert_eq!(value["summary"]["removed"], 0);

        // equal entries omitted
        let changes = value["changes"].as_array().unwrap();
        assert_eq!(changes.len(), 2);

        let modified = changes
            .iter()
            .find(|c| c["type"] == "modified")
            .expect("modified change present");
        assert_eq!(modified["diff"]["old"]["spec"]["field"], "old");
        assert_eq!(modified["diff"]["new"]["spec"]["field"], "new");

        let added = changes
            .iter()
            .find(|c| c["type"] == "added")
            .expect("added change present");
        assert_eq!(added["diff"]["spec"]["spec"]["field"], "new");
        assert_eq!(added["kind"], "ComposedResource");
        assert_eq!(added["name"], "new-cr");
    }

    #[test]
    fn test_output_is_idempotent() {
        let diffs = sample_diffs();
        let renderer = StructuredRenderer::new(StructuredFormat::Json);

        let mut first = Vec::new();
        renderer.render(&mut first, &diffs).unwrap();
        let mut second = Vec::new();
        renderer.render(&mut second, &diffs).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_yaml_output_parses() {
        let diffs = sample_diffs();
        let renderer = StructuredRenderer::new(StructuredFormat::Yaml);
        let mut out = Vec::new();
        renderer.render(&mut out, &diffs).unwrap();

        let value: serde_yaml::Value = serde_yaml::from_slice(&out).unwrap();
        assert!(value.get("summary").is_some());
        assert!(value.get("changes").is_some());
    }
}
