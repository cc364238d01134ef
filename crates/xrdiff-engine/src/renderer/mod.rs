//! Output renderers
//!
//! Two interchangeable renderers behind one interface: a kubectl-diff-style
//! text renderer and a structured JSON/YAML renderer for machine consumers.

mod structured;
mod text;

pub use structured::{StructuredFormat, StructuredRenderer};
pub use text::{TextDiffOptions, TextRenderer};

use crate::diff::DiffSet;

/// Renders a diff set to a writer
pub trait DiffRenderer {
    fn render(&self, w: &mut dyn std::io::Write, diffs: &DiffSet) -> std::io::Result<()>;
}
