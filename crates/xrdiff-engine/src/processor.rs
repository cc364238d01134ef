//! Per-XR diff orchestration
//!
//! For each input XR: resolve its Composition, gather the pipeline's
//! Functions and credentials plus the renderer's extra inputs, render the
//! desired composed resources under the global render gate, discover the
//! existing descendants, dry-run apply every desired object and classify the
//! result against what is in the cluster. XRs are processed concurrently;
//! one XR failing never aborts its siblings.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream;
use kube::api::{DynamicObject, GroupVersionKind};
use xrdiff_crossplane::{
    CROSSPLANE_GROUP, CompositionClient, CredentialClient, DefinitionClient, FunctionClient,
    ResolvedComposition, ResourceTreeClient, RevisionClient, fields,
};
use xrdiff_kube::{
    ApplyClient, ResourceClient, SchemaClient, TypeConverter, composed_field_owner, display_id,
    gvk_of,
};

use crate::diff::{DiffSet, ResourcePair, build_diff, pair_resources};
use crate::error::{DiffError, Result};
use crate::render::{RenderGate, RenderInputs, Renderer};

/// Knobs for a processor run
#[derive(Debug, Clone)]
pub struct ProcessorOptions {
    /// How many XRs may be in flight at once (renders still serialize)
    pub concurrency: usize,
    /// Overall deadline for the whole input set
    pub timeout: Option<Duration>,
    /// Namespace applied to namespaced desired resources without one
    pub default_namespace: Option<String>,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            timeout: None,
            default_namespace: None,
        }
    }
}

/// One XR's failure, recorded without aborting siblings
#[derive(Debug)]
pub struct XrFailure {
    /// Identity of the failed input, `Kind/name` form
    pub id: String,
    pub error: DiffError,
}

/// The merged result of a processor run
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub diffs: DiffSet,
    pub failures: Vec<XrFailure>,
}

impl ProcessOutcome {
    /// Whether every input diffed cleanly
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// The aggregate error for a partially failed run, if any
    pub fn partial_error(&self, total: usize) -> Option<DiffError> {
        if self.failures.is_empty() {
            None
        } else {
            Some(DiffError::Partial {
                failed: self.failures.len(),
                total,
            })
        }
    }
}

/// Top-level diff processor
pub struct DiffProcessor {
    resources: ResourceClient,
    apply: ApplyClient,
    schema: Arc<SchemaClient>,
    compositions: Arc<CompositionClient>,
    functions: Arc<FunctionClient>,
    credentials: Arc<CredentialClient>,
    tree: Arc<ResourceTreeClient>,
    gate: Arc<RenderGate>,
    options: ProcessorOptions,
}

impl DiffProcessor {
    /// Wire a processor onto a cluster client and an external renderer
    pub fn new(client: kube::Client, renderer: Box<dyn Renderer>, options: ProcessorOptions) -> Self {
        let converter = Arc::new(TypeConverter::new(client.clone()));
        let resources = ResourceClient::new(client.clone(), Arc::clone(&converter));
        let schema = Arc::new(SchemaClient::new(client, Arc::clone(&converter)));
        let definitions = Arc::new(DefinitionClient::new(resources.clone()));
        let revisions = Arc::new(RevisionClient::new(resources.clone()));
        let compositions = Arc::new(CompositionClient::new(
            resources.clone(),
            Arc::clone(&definitions),
            revisions,
        ));
        let functions = Arc::new(FunctionClient::new(resources.clone()));
        let credentials = Arc::new(CredentialClient::new(resources.clone()));
        let tree = Arc::new(ResourceTreeClient::new(resources.clone()));
        let gate = Arc::new(RenderGate::new(renderer));
        let apply = ApplyClient::new(resources.clone());

        Self {
            resources,
            apply,
            schema,
            compositions,
            functions,
            credentials,
            tree,
            gate,
            options,
        }
    }

    /// Diff every input XR against the cluster
    ///
    /// Returns the merged diff set plus per-XR failures; only the overall
    /// timeout turns into an error here.
    pub async fn process(&self, xrs: Vec<DynamicObject>) -> Result<ProcessOutcome> {
        match self.options.timeout {
            Some(deadline) => tokio::time::timeout(deadline, self.process_inner(xrs))
                .await
                .map_err(|_| DiffError::Timeout(deadline))?,
            None => self.process_inner(xrs).await,
        }
    }

    async fn process_inner(&self, xrs: Vec<DynamicObject>) -> Result<ProcessOutcome> {
        let concurrency = self.options.concurrency.max(1);
        let results: Vec<(String, Result<(DiffSet, Vec<DiffError>)>)> =
            stream::iter(xrs.into_iter().map(|xr| async move {
                let id = display_id(&xr);
                let result = self.diff_one(&xr).await;
                (id, result)
            }))
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let mut outcome = ProcessOutcome::default();
        for (id, result) in results {
            match result {
                Ok((diffs, pair_errors)) => {
                    outcome.diffs.extend(diffs);
                    for error in pair_errors {
                        tracing::error!(xr = id.as_str(), error = %error, "resource pair failed");
                        outcome.failures.push(XrFailure {
                            id: id.clone(),
                            error,
                        });
                    }
                }
                Err(error) => {
                    tracing::error!(xr = id.as_str(), error = %error, "composite diff failed");
                    outcome.failures.push(XrFailure { id, error });
                }
            }
        }
        Ok(outcome)
    }

    /// The single-XR pipeline: resolve, gather, render, discover, apply, diff
    async fn diff_one(&self, xr: &DynamicObject) -> Result<(DiffSet, Vec<DiffError>)> {
        let resolved = self.compositions.find_matching_composition(xr).await?;

        let functions = self
            .functions
            .functions_for_pipeline(&resolved.composition)
            .await?;
        let credentials = self.credentials.fetch_credentials(&resolved.composition).await;

        let environment_configs = self.environment_configs().await?;
        let crds = self
            .schema
            .load_crds(&resolved.xrd.all_gvks())
            .await
            .map_err(DiffError::Kube)?;

        let inputs = RenderInputs {
            xr: xr.clone(),
            composition: resolved.composition.clone(),
            functions: functions.iter().map(|f| (**f).clone()).collect(),
            credentials,
            environment_configs,
            crds: crds.iter().map(|c| (**c).clone()).collect(),
        };
        let outputs = self.gate.render(inputs).await?;

        let mut desired_composed = outputs.composed;
        self.apply_default_namespace(&mut desired_composed).await;

        // the renderer's echo of the XR is what an apply would produce; fall
        // back to the raw input when the renderer omits it
        let desired_xr = outputs.xr.unwrap_or_else(|| xr.clone());

        let current_xr = self.fetch_current(xr).await?;
        let tree_root = self.tree_root(xr, &resolved, current_xr.as_ref()).await?;

        let mut candidate_gvks: Vec<GroupVersionKind> = Vec::new();
        for obj in &desired_composed {
            if let Ok(gvk) = gvk_of(obj) {
                if !candidate_gvks.contains(&gvk) {
                    candidate_gvks.push(gvk);
                }
            }
        }
        let current_children = self.tree.discover(&tree_root, &candidate_gvks).await?;

        let mut diffs = DiffSet::new();
        let mut pair_errors = Vec::new();

        let pairs = pair_resources(current_children, desired_composed)?;
        for pair in pairs {
            match self.diff_pair(pair).await {
                Ok(diff) => {
                    diffs.insert(diff.key.clone(), diff);
                }
                Err(error) => pair_errors.push(error),
            }
        }

        // the XR itself diffs the same way its children do
        match self
            .diff_pair(ResourcePair {
                current: current_xr,
                desired: Some(desired_xr),
            })
            .await
        {
            Ok(diff) => {
                diffs.insert(diff.key.clone(), diff);
            }
            Err(error) => pair_errors.push(error),
        }

        Ok((diffs, pair_errors))
    }

    /// Dry-run apply the desired side and classify the pair
    async fn diff_pair(&self, pair: ResourcePair) -> Result<crate::diff::ResourceDiff> {
        match (pair.current, pair.desired) {
            (Some(current), Some(desired)) => {
                let owner = composed_field_owner(&current).unwrap_or_default();
                let applied = self.apply.dry_run_apply(&desired, &owner).await?;
                build_diff(Some(current), Some(applied))
            }
            (None, Some(desired)) => {
                let applied = self.apply.dry_run_apply(&desired, "").await?;
                build_diff(None, Some(applied))
            }
            (current, desired) => build_diff(current, desired),
        }
    }

    /// The cluster's copy of the input object, if it exists
    async fn fetch_current(&self, xr: &DynamicObject) -> Result<Option<DynamicObject>> {
        let gvk = gvk_of(xr).map_err(DiffError::Kube)?;
        let Some(name) = xr.metadata.name.as_deref() else {
            return Ok(None);
        };
        let namespace = xr
            .metadata
            .namespace
            .as_deref()
            .or(self.options.default_namespace.as_deref());
        Ok(self
            .resources
            .get_opt(&gvk, namespace, name)
            .await
            .map_err(DiffError::Kube)?)
    }

    /// The root used for current-state discovery
    ///
    /// For a claim with a bound XR, descendants hang off the XR the claim's
    /// `spec.resourceRef` points at; otherwise the cluster's copy of the
    /// input (or the input itself, pre-creation) is the root.
    async fn tree_root(
        &self,
        xr: &DynamicObject,
        resolved: &ResolvedComposition,
        current_xr: Option<&DynamicObject>,
    ) -> Result<DynamicObject> {
        if resolved.is_claim {
            if let Some(bound) = fields::claim_resource_ref(xr) {
                if !bound.name.is_empty() {
                    if let Some(found) = self
                        .resources
                        .get_opt(&resolved.target, None, &bound.name)
                        .await
                        .map_err(DiffError::Kube)?
                    {
                        return Ok(found);
                    }
                }
            }
        }
        Ok(current_xr.cloned().unwrap_or_else(|| xr.clone()))
    }

    /// Every EnvironmentConfig on the cluster; an absent CRD is an empty set
    async fn environment_configs(&self) -> Result<Vec<DynamicObject>> {
        match self
            .resources
            .gvks_for_group_kind(CROSSPLANE_GROUP, "EnvironmentConfig")
            .await
        {
            Ok(gvks) => Ok(self.resources.list(&gvks[0], None).await?),
            Err(e) if e.is_discovery() => {
                tracing::debug!("EnvironmentConfig not served; rendering without environment");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Apply the run's default namespace to namespaced desired resources
    ///
    /// A type whose scope cannot be discovered is left untouched; the
    /// dry-run apply will report the real failure for that pair.
    async fn apply_default_namespace(&self, desired: &mut [DynamicObject]) {
        let Some(namespace) = self.options.default_namespace.clone() else {
            return;
        };
        for obj in desired.iter_mut() {
            if obj.metadata.namespace.is_some() {
                continue;
            }
            let Ok(gvk) = gvk_of(obj) else { continue };
            if let Ok(true) = self.resources.is_namespaced(&gvk).await {
                obj.metadata.namespace = Some(namespace.clone());
            }
        }
    }
}
