//! External render invocation
//!
//! The function pipeline itself is an external collaborator: given an XR, its
//! Composition and the pipeline's Functions, it returns the desired composed
//! resources. The engine wraps every invocation in one process-wide mutex
//! because renderers start container workloads keyed by function identity;
//! two concurrent renders race to start same-named containers and can
//! overload the local runtime. At most one render is in flight at any moment.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::DynamicObject;
use tokio::sync::Mutex;
use xrdiff_crossplane::{Composition, Function};
use xrdiff_kube::{display_id, gvk_of};

use crate::error::RenderError;

/// Everything a render invocation needs
#[derive(Debug, Clone)]
pub struct RenderInputs {
    pub xr: DynamicObject,
    pub composition: Composition,
    pub functions: Vec<Function>,
    pub credentials: Vec<Secret>,
    pub environment_configs: Vec<DynamicObject>,
    pub crds: Vec<CustomResourceDefinition>,
}

/// What a render invocation produced
#[derive(Debug, Clone, Default)]
pub struct RenderOutputs {
    /// The rendered XR, when the renderer echoes it back
    pub xr: Option<DynamicObject>,
    /// Desired composed resources
    pub composed: Vec<DynamicObject>,
}

/// An external function-pipeline renderer
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, inputs: RenderInputs) -> Result<RenderOutputs, RenderError>;
}

// One render in flight per process, however many XRs are being diffed.
static RENDER_LOCK: Mutex<()> = Mutex::const_new(());
static RENDER_SEQ: AtomicU64 = AtomicU64::new(0);

/// Serializing gate in front of any renderer
pub struct RenderGate {
    inner: Box<dyn Renderer>,
}

impl RenderGate {
    /// Wrap a renderer in the process-global render mutex
    pub fn new(inner: Box<dyn Renderer>) -> Self {
        Self { inner }
    }

    /// Render under the global mutex, timing and numbering the invocation
    pub async fn render(&self, inputs: RenderInputs) -> Result<RenderOutputs, RenderError> {
        let _guard = RENDER_LOCK.lock().await;
        let seq = RENDER_SEQ.fetch_add(1, Ordering::Relaxed) + 1;
        let xr_id = display_id(&inputs.xr);
        let start = Instant::now();

        tracing::debug!(seq, xr = xr_id.as_str(), "render starting");
        let result = self.inner.render(inputs).await;
        tracing::info!(
            seq,
            xr = xr_id.as_str(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            ok = result.is_ok(),
            "render finished"
        );

        result
    }
}

/// Renderer invoking a `crossplane render`-compatible command
///
/// Inputs are staged as files in a scratch directory and the command's
/// multi-document YAML stdout is parsed back. The command receives the XR,
/// Composition and Functions files as positional arguments plus
/// `--include-full-xr`; credentials and extra resources are passed by flag
/// when present.
pub struct CommandRenderer {
    program: String,
    args: Vec<String>,
}

impl CommandRenderer {
    /// Create a renderer for an explicit program and base arguments
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Parse a whitespace-separated command line, e.g. `crossplane render`
    pub fn from_command_line(command: &str) -> Result<Self, RenderError> {
        let mut parts = command.split_whitespace();
        let program = parts.next().ok_or_else(|| {
            RenderError::Parse("render command must not be empty".to_string())
        })?;
        Ok(Self::new(program, parts.map(String::from).collect()))
    }

    fn to_multi_doc<T: serde::Serialize>(items: &[T]) -> Result<String, RenderError> {
        let mut out = String::new();
        for item in items {
            let doc = serde_yaml::to_string(item)
                .map_err(|e| RenderError::Serialization(e.to_string()))?;
            out.push_str("---\n");
            out.push_str(&doc);
        }
        Ok(out)
    }
}

#[async_trait]
impl Renderer for CommandRenderer {
    async fn render(&self, inputs: RenderInputs) -> Result<RenderOutputs, RenderError> {
        let dir = tempfile::tempdir()?;

        let xr_path = dir.path().join("xr.yaml");
        let composition_path = dir.path().join("composition.yaml");
        let functions_path = dir.path().join("functions.yaml");

        tokio::fs::write(
            &xr_path,
            serde_yaml::to_string(&inputs.xr).map_err(|e| RenderError::Serialization(e.to_string()))?,
        )
        .await?;
        tokio::fs::write(
            &composition_path,
            serde_yaml::to_string(&inputs.composition)
                .map_err(|e| RenderError::Serialization(e.to_string()))?,
        )
        .await?;
        tokio::fs::write(&functions_path, Self::to_multi_doc(&inputs.functions)?).await?;

        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(&xr_path)
            .arg(&composition_path)
            .arg(&functions_path)
            .arg("--include-full-xr");

        if !inputs.credentials.is_empty() {
            let credentials_path = dir.path().join("credentials.yaml");
            tokio::fs::write(&credentials_path, Self::to_multi_doc(&inputs.credentials)?).await?;
            command.arg(format!("--function-credentials={}", credentials_path.display()));
        }

        if !inputs.environment_configs.is_empty() || !inputs.crds.is_empty() {
            let extra_path = dir.path().join("extra-resources.yaml");
            let mut extra = Self::to_multi_doc(&inputs.environment_configs)?;
            extra.push_str(&Self::to_multi_doc(&inputs.crds)?);
            tokio::fs::write(&extra_path, extra).await?;
            command.arg(format!("--extra-resources={}", extra_path.display()));
        }

        let output = command.output().await.map_err(|source| RenderError::Spawn {
            command: self.program.clone(),
            source,
        })?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_render_output(&stdout, &inputs.xr)
    }
}

/// Parse multi-document YAML render output into an XR and composed resources
///
/// The document matching the input XR's type and name becomes the rendered
/// XR; everything else is a composed resource.
pub fn parse_render_output(stdout: &str, input_xr: &DynamicObject) -> Result<RenderOutputs, RenderError> {
    let input_gvk = gvk_of(input_xr).map_err(|e| RenderError::Parse(e.to_string()))?;
    let input_name = input_xr.metadata.name.as_deref().unwrap_or_default();

    let mut outputs = RenderOutputs::default();
    for doc in stdout.split("---") {
        let doc = doc.trim();
        if doc.is_empty()
            || doc
                .lines()
                .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
        {
            continue;
        }

        let obj: DynamicObject = serde_yaml::from_str(doc)
            .map_err(|e| RenderError::Parse(format!("bad YAML document in render output: {}", e)))?;

        let is_input_xr = gvk_of(&obj)
            .map(|gvk| gvk == input_gvk && obj.metadata.name.as_deref() == Some(input_name))
            .unwrap_or(false);
        if is_input_xr && outputs.xr.is_none() {
            outputs.xr = Some(obj);
        } else {
            outputs.composed.push(obj);
        }
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::api::TypeMeta;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    fn xr() -> DynamicObject {
        let mut obj = DynamicObject {
            types: Some(TypeMeta {
                api_version: "example.org/v1".to_string(),
                kind: "XExample".to_string(),
            }),
            metadata: Default::default(),
            data: serde_json::json!({"spec": {}}),
        };
        obj.metadata.name = Some("my-xr".to_string());
        obj
    }

    #[test]
    fn test_parse_render_output_splits_xr_and_composed() {
        let stdout = r#"---
apiVersion: example.org/v1
kind: XExample
metadata:
  name: my-xr
spec:
  field: rendered
---
apiVersion: example.org/v1
kind: ComposedResource
metadata:
  name: my-xr-cr
spec:
  field: new
"#;
        let outputs = parse_render_output(stdout, &xr()).unwrap();
        assert!(outputs.xr.is_some());
        assert_eq!(outputs.composed.len(), 1);
        assert_eq!(
            outputs.composed[0].metadata.name.as_deref(),
            Some("my-xr-cr")
        );
    }

    #[test]
    fn test_parse_render_output_skips_comment_documents() {
        let stdout = "---\n# nothing here\n---\napiVersion: example.org/v1\nkind: ComposedResource\nmetadata:\n  name: cr\n";
        let outputs = parse_render_output(stdout, &xr()).unwrap();
        assert!(outputs.xr.is_none());
        assert_eq!(outputs.composed.len(), 1);
    }

    #[test]
    fn test_parse_render_output_rejects_garbage() {
        let stdout = "---\n{not yaml: [\n";
        assert!(parse_render_output(stdout, &xr()).is_err());
    }

    #[test]
    fn test_from_command_line() {
        let renderer = CommandRenderer::from_command_line("crossplane render").unwrap();
        assert_eq!(renderer.program, "crossplane");
        assert_eq!(renderer.args, vec!["render".to_string()]);

        assert!(CommandRenderer::from_command_line("   ").is_err());
    }

    struct SlowRenderer {
        in_flight: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Renderer for SlowRenderer {
        async fn render(&self, _inputs: RenderInputs) -> Result<RenderOutputs, RenderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(RenderOutputs::default())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_gate_serializes_renders() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(RenderGate::new(Box::new(SlowRenderer {
            in_flight: Arc::clone(&in_flight),
            max_seen: Arc::clone(&max_seen),
        })));

        let composition = Composition {
            api_version: "apiextensions.crossplane.io/v1".to_string(),
            kind: "Composition".to_string(),
            metadata: Default::default(),
            spec: xrdiff_crossplane::types::CompositionSpec {
                composite_type_ref: xrdiff_crossplane::types::TypeReference {
                    api_version: "example.org/v1".to_string(),
                    kind: "XExample".to_string(),
                },
                mode: None,
                pipeline: vec![],
                write_connection_secrets_to_namespace: None,
            },
        };

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let gate = Arc::clone(&gate);
            let inputs = RenderInputs {
                xr: xr(),
                composition: composition.clone(),
                functions: vec![],
                credentials: vec![],
                environment_configs: vec![],
                crds: vec![],
            };
            tasks.push(tokio::spawn(async move { gate.render(inputs).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }
}
