//! xrdiff-engine - The diff engine for xrdiff
//!
//! This crate provides:
//! - **Render gate** (`render`): the external function-pipeline invocation behind one process-wide mutex
//! - **Diff model** (`diff`): pairing, canonicalization and Added/Modified/Removed/Equal classification
//! - **Processor** (`processor`): per-XR orchestration with sibling isolation and an overall timeout
//! - **Renderers** (`renderer`): kubectl-diff-style text output and structured JSON/YAML

pub mod diff;
pub mod error;
pub mod processor;
pub mod render;
pub mod renderer;

pub use diff::{
    DiffKey, DiffSet, DiffSummary, DiffType, LineDiff, LineTag, ResourceDiff, build_diff,
    canonical_value, canonicalize, pair_resources, summarize,
};
pub use error::{DiffError, RenderError, Result};
pub use xrdiff_crossplane::CrossplaneError;
pub use xrdiff_kube::KubeError;
pub use processor::{DiffProcessor, ProcessOutcome, ProcessorOptions, XrFailure};
pub use render::{CommandRenderer, RenderGate, RenderInputs, RenderOutputs, Renderer};
pub use renderer::{DiffRenderer, StructuredFormat, StructuredRenderer, TextDiffOptions, TextRenderer};
