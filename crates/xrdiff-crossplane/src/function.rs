//! Function client
//!
//! Compositions in Pipeline mode name the Functions their steps run. The
//! client caches every installed Function once and materializes the ordered
//! set a composition's pipeline needs; a missing Function is fatal for the
//! XR referencing it.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use kube::api::GroupVersionKind;
use xrdiff_kube::ResourceClient;

use crate::error::{CrossplaneError, Result};
use crate::types::{Composition, Function, MODE_PIPELINE, PKG_GROUP, from_dynamic};

fn function_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk(PKG_GROUP, "v1", "Function")
}

/// The ordered, deduplicated Functions a composition's pipeline references
///
/// Errors when the composition is not in Pipeline mode or a referenced
/// Function is not installed.
pub fn functions_for_pipeline_in(
    functions: &HashMap<String, Arc<Function>>,
    comp: &Composition,
) -> Result<Vec<Arc<Function>>> {
    if let Some(mode) = comp.spec.mode.as_deref() {
        if mode != MODE_PIPELINE {
            return Err(CrossplaneError::UnsupportedMode {
                composition: comp.name().to_string(),
                mode: mode.to_string(),
            });
        }
    }

    let mut out: Vec<Arc<Function>> = Vec::with_capacity(comp.spec.pipeline.len());
    for step in &comp.spec.pipeline {
        let name = &step.function_ref.name;
        if out.iter().any(|f| f.name() == name) {
            continue;
        }
        let function = functions
            .get(name)
            .ok_or_else(|| CrossplaneError::FunctionNotFound {
                name: name.clone(),
                composition: comp.name().to_string(),
            })?;
        out.push(Arc::clone(function));
    }
    Ok(out)
}

/// Cluster Function lookups over a lazily filled cache
pub struct FunctionClient {
    resources: ResourceClient,
    cache: RwLock<Option<Arc<HashMap<String, Arc<Function>>>>>,
}

impl FunctionClient {
    /// Create a function client
    pub fn new(resources: ResourceClient) -> Self {
        Self {
            resources,
            cache: RwLock::new(None),
        }
    }

    /// All installed Functions, by name
    pub async fn functions(&self) -> Result<Arc<HashMap<String, Arc<Function>>>> {
        if let Some(cached) = self.cache.read().expect("function cache poisoned").as_ref() {
            return Ok(Arc::clone(cached));
        }

        let objects = self.resources.list(&function_gvk(), None).await?;
        let mut by_name = HashMap::with_capacity(objects.len());
        for obj in &objects {
            let function: Function = from_dynamic(obj)?;
            by_name.insert(function.name().to_string(), Arc::new(function));
        }
        tracing::debug!(count = by_name.len(), "cached functions");

        let mut slot = self.cache.write().expect("function cache poisoned");
        if let Some(cached) = slot.as_ref() {
            return Ok(Arc::clone(cached));
        }
        let arc = Arc::new(by_name);
        *slot = Some(Arc::clone(&arc));
        Ok(arc)
    }

    /// The Functions a composition's pipeline runs, in step order
    pub async fn functions_for_pipeline(&self, comp: &Composition) -> Result<Vec<Arc<Function>>> {
        let functions = self.functions().await?;
        functions_for_pipeline_in(&functions, comp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CompositionSpec, FunctionReference, PipelineStep, TypeReference};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn function(name: &str) -> Arc<Function> {
        Arc::new(Function {
            api_version: "pkg.crossplane.io/v1".to_string(),
            kind: "Function".to_string(),
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: None,
        })
    }

    fn composition(mode: Option<&str>, steps: &[&str]) -> Composition {
        Composition {
            api_version: "apiextensions.crossplane.io/v1".to_string(),
            kind: "Composition".to_string(),
            metadata: ObjectMeta {
                name: Some("test-comp".to_string()),
                ..Default::default()
            },
            spec: CompositionSpec {
                composite_type_ref: TypeReference {
                    api_version: "example.org/v1".to_string(),
                    kind: "XExample".to_string(),
                },
                mode: mode.map(String::from),
                pipeline: steps
                    .iter()
                    .map(|name| PipelineStep {
                        step: format!("run-{}", name),
                        function_ref: FunctionReference {
                            name: (*name).to_string(),
                        },
                        input: None,
                        credentials: vec![],
                    })
                    .collect(),
                write_connection_secrets_to_namespace: None,
            },
        }
    }

    fn installed(names: &[&str]) -> HashMap<String, Arc<Function>> {
        names
            .iter()
            .map(|n| ((*n).to_string(), function(n)))
            .collect()
    }

    #[test]
    fn test_pipeline_functions_in_step_order() {
        let functions = installed(&["fn-a", "fn-b"]);
        let comp = composition(Some("Pipeline"), &["fn-b", "fn-a"]);
        let out = functions_for_pipeline_in(&functions, &comp).unwrap();
        let names: Vec<&str> = out.iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["fn-b", "fn-a"]);
    }

    #[test]
    fn test_pipeline_functions_deduplicated() {
        let functions = installed(&["fn-a"]);
        let comp = composition(Some("Pipeline"), &["fn-a", "fn-a"]);
        let out = functions_for_pipeline_in(&functions, &comp).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_missing_function_is_error() {
        let functions = installed(&["fn-a"]);
        let comp = composition(Some("Pipeline"), &["fn-a", "fn-missing"]);
        let err = functions_for_pipeline_in(&functions, &comp).unwrap_err();
        assert!(err.to_string().contains("function fn-missing"));
        assert!(err.to_string().contains("test-comp"));
    }

    #[test]
    fn test_non_pipeline_mode_is_error() {
        let functions = installed(&[]);
        let comp = composition(Some("Resources"), &[]);
        let err = functions_for_pipeline_in(&functions, &comp).unwrap_err();
        assert!(err.to_string().contains("unsupported mode Resources"));
    }

    #[test]
    fn test_unset_mode_defaults_to_pipeline() {
        let functions = installed(&["fn-a"]);
        let comp = composition(None, &["fn-a"]);
        assert!(functions_for_pipeline_in(&functions, &comp).is_ok());
    }
}
