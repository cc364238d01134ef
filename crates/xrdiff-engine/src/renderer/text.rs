//! kubectl-diff-style text renderer
//!
//! Non-equal diffs print in stable kind-then-name order, each under a header
//! line (`+++` added, `---` removed, `~~~` modified), with configurable line
//! prefixes, context clipping around changed hunks and a trailing summary.

use std::io::Write;

use console::Style;

use super::DiffRenderer;
use crate::diff::{DiffSet, DiffType, LineTag, ResourceDiff, summarize};

/// Formatting knobs for the text renderer
#[derive(Debug, Clone)]
pub struct TextDiffOptions {
    pub add_prefix: String,
    pub delete_prefix: String,
    pub context_prefix: String,
    /// Context lines kept around each changed hunk
    pub context_lines: usize,
    /// Separator between non-adjacent hunks
    pub chunk_separator: String,
    /// Minimize surrounding context
    pub compact: bool,
    /// Emit ANSI colors
    pub color: bool,
}

impl Default for TextDiffOptions {
    fn default() -> Self {
        Self {
            add_prefix: "+ ".to_string(),
            delete_prefix: "- ".to_string(),
            context_prefix: "  ".to_string(),
            context_lines: 3,
            chunk_separator: "...".to_string(),
            compact: false,
            color: true,
        }
    }
}

/// The human-facing diff renderer
pub struct TextRenderer {
    options: TextDiffOptions,
}

impl TextRenderer {
    /// Create a text renderer with the given options
    pub fn new(options: TextDiffOptions) -> Self {
        Self { options }
    }

    fn effective_context(&self) -> usize {
        if self.options.compact {
            0
        } else {
            self.options.context_lines
        }
    }

    fn styled(&self, style: Style, text: &str) -> String {
        if self.options.color {
            style.apply_to(text).to_string()
        } else {
            text.to_string()
        }
    }

    fn write_header(&self, w: &mut dyn Write, diff: &ResourceDiff) -> std::io::Result<()> {
        let id = diff.key.display();
        let header = match diff.diff_type {
            DiffType::Added => self.styled(Style::new().green().bold(), &format!("+++ {}", id)),
            DiffType::Removed => self.styled(Style::new().red().bold(), &format!("--- {}", id)),
            DiffType::Modified => self.styled(Style::new().yellow().bold(), &format!("~~~ {}", id)),
            DiffType::Equal => return Ok(()),
        };
        writeln!(w, "{}", header)
    }

    fn write_body(&self, w: &mut dyn Write, diff: &ResourceDiff) -> std::io::Result<()> {
        let context = self.effective_context();

        // a line is visible when within `context` of any changed line;
        // added/removed bodies are all changes so everything shows
        let changed: Vec<usize> = diff
            .line_diffs
            .iter()
            .enumerate()
            .filter(|(_, l)| l.tag != LineTag::Equal)
            .map(|(i, _)| i)
            .collect();

        let visible = |index: usize| {
            changed
                .iter()
                .any(|c| index.abs_diff(*c) <= context)
        };

        let mut last_emitted: Option<usize> = None;
        for (index, line) in diff.line_diffs.iter().enumerate() {
            if !visible(index) {
                continue;
            }
            if let Some(previous) = last_emitted {
                if index > previous + 1 {
                    writeln!(w, "{}", self.styled(Style::new().dim(), &self.options.chunk_separator))?;
                }
            }

            let rendered = match line.tag {
                LineTag::Insert => self.styled(
                    Style::new().green(),
                    &format!("{}{}", self.options.add_prefix, line.text),
                ),
                LineTag::Delete => self.styled(
                    Style::new().red(),
                    &format!("{}{}", self.options.delete_prefix, line.text),
                ),
                LineTag::Equal => self.styled(
                    Style::new().dim(),
                    &format!("{}{}", self.options.context_prefix, line.text),
                ),
            };
            writeln!(w, "{}", rendered)?;
            last_emitted = Some(index);
        }
        Ok(())
    }
}

impl DiffRenderer for TextRenderer {
    fn render(&self, w: &mut dyn Write, diffs: &DiffSet) -> std::io::Result<()> {
        let mut printed_any = false;
        for diff in diffs.values() {
            if diff.diff_type == DiffType::Equal {
                continue;
            }
            if printed_any {
                writeln!(w)?;
            }
            self.write_header(w, diff)?;
            self.write_body(w, diff)?;
            printed_any = true;
        }

        if printed_any {
            writeln!(w)?;
        }

        let summary = summarize(diffs);
        writeln!(w, "Summary:")?;
        writeln!(w, "  {} added", summary.added)?;
        writeln!(w, "  {} modified", summary.modified)?;
        writeln!(w, "  {} removed", summary.removed)?;
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

    fn plain_renderer() -> TextRenderer {
        TextRenderer::new(TextDiffOptions {
            color: false,
            ..Default::default()
        })
    }

    fn render_to_string(renderer: &TextRenderer, diffs: &DiffSet) -> String {
        let mut out = Vec::new();
        renderer.render(&mut out, diffs).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_added_resource_output() {
        let desired = object("ComposedResource", "my-xr-cr", serde_json::json!({"field": "new"}));
        let diff = build_diff(None, Some(desired)).unwrap();
        let mut diffs = DiffSet::new();
        diffs.insert(diff.key.clone(), diff);

        let output = render_to_string(&plain_renderer(), &diffs);
        assert!(output.contains("+++ ComposedResource/my-xr-cr"));
        assert!(output.contains("+   field: new"));
        assert!(output.contains("Summary:\n  1 added\n  0 modified\n  0 removed"));
    }

    #[test]
    fn test_modified_resource_output() {
        let current = object("ComposedResource", "my-xr-cr", serde_json::json!({"field": "old"}));
        let desired = object("ComposedResource", "my-xr-cr", serde_json::json!({"field": "new"}));
        let diff = build_diff(Some(current), Some(desired)).unwrap();
        let mut diffs = DiffSet::new();
        diffs.insert(diff.key.clone(), diff);

        let output = render_to_string(&plain_renderer(), &diffs);
        assert!(output.contains("~~~ ComposedResource/my-xr-cr"));
        assert!(output.contains("-   field: old"));
        assert!(output.contains("+   field: new"));
        assert!(output.contains("  1 modified"));
    }

    #[test]
    fn test_equal_resources_are_skipped() {
        let current = object("ComposedResource", "same", serde_json::json!({"x": 1}));
        let desired = object("ComposedResource", "same", serde_json::json!({"x": 1}));
        let diff = build_diff(Some(current), Some(desired)).unwrap();
        let mut diffs = DiffSet::new();
        diffs.insert(diff.key.clone(), diff);

        let output = render_to_string(&plain_renderer(), &diffs);
        assert!(!output.contains("same"));
        assert!(output.contains("  0 added\n  0 modified\n  0 removed"));
    }

    #[test]
    fn test_context_clipping_inserts_separator() {
        // many unchanged fields around two distant changes force a gap
        let mut old_spec = serde_json::Map::new();
        let mut new_spec = serde_json::Map::new();
        for i in 0..20 {
            let key = format!("field{:02}", i);
            old_spec.insert(key.clone(), serde_json::json!("same"));
            new_spec.insert(key, serde_json::json!("same"));
        }
        old_spec.insert("field00".to_string(), serde_json::json!("old"));
        new_spec.insert("field00".to_string(), serde_json::json!("new"));
        old_spec.insert("field19".to_string(), serde_json::json!("old"));
        new_spec.insert("field19".to_string(), serde_json::json!("new"));

        let current = object("ComposedResource", "cr", serde_json::Value::Object(old_spec));
        let desired = object("ComposedResource", "cr", serde_json::Value::Object(new_spec));
        let diff = build_diff(Some(current), Some(desired)).unwrap();
        let mut diffs = DiffSet::new();
        diffs.insert(diff.key.clone(), diff);

        let renderer = TextRenderer::new(TextDiffOptions {
            color: false,
            context_lines: 1,
            ..Default::default()
        });
        let output = render_to_string(&renderer, &diffs);
        assert!(output.contains("..."));
        // clipped context must not include every unchanged field
        assert!(!output.contains("field10"));
    }

    #[test]
    fn test_compact_mode_drops_context() {
        let current = object(
            "ComposedResource",
            "cr",
            serde_json::json!({"a": "same", "b": "old", "c": "same"}),
        );
        let desired = object(
            "ComposedResource",
            "cr",
            serde_json::json!({"a": "same", "b": "new", "c": "same"}),
        );
        let diff = build_diff(Some(current), Some(desired)).unwrap();
        let mut diffs = DiffSet::new();
        diffs.insert(diff.key.clone(), diff);

        let renderer = TextRenderer::new(TextDiffOptions {
            color: false,
            compact: true,
            ..Default::default()
        });
        let output = render_to_string(&renderer, &diffs);
        assert!(output.contains("-   b: old"));
        assert!(output.contains("+   b: new"));
        assert!(!output.contains("a: same"));
    }

    #[test]
    fn test_kind_name_sorted_order() {
        let mut diffs = DiffSet::new();
        for (kind, name) in [("ZKind", "a"), ("AKind", "z"), ("AKind", "a")] {
            let diff = build_diff(None, Some(object(kind, name, serde_json::json!({})))).unwrap();
            diffs.insert(diff.key.clone(), diff);
        }

        let output = render_to_string(&plain_renderer(), &diffs);
        let first = output.find("AKind/a").unwrap();
        let second = output.find("AKind/z").unwrap();
        let third = output.find("ZKind/a").unwrap();
        assert!(first < second && second < third);
    }
}
