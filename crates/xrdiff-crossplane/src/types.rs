//! Typed façade over Crossplane's wire objects
//!
//! Everything the engine fetches or sends stays unstructured at the apiserver
//! boundary; these serde views exist for the handful of kinds whose fields
//! drive resolution decisions: Composition, CompositionRevision,
//! CompositeResourceDefinition and Function. They are deserialized from
//! `DynamicObject` JSON and serialize back to valid wire YAML, so the same
//! value can be handed to the external renderer unchanged.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{DynamicObject, GroupVersionKind};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{CrossplaneError, Result};

/// API group of Crossplane's composition machinery
pub const CROSSPLANE_GROUP: &str = "apiextensions.crossplane.io";

/// API group of Crossplane's package machinery (Functions)
pub const PKG_GROUP: &str = "pkg.crossplane.io";

/// Wire apiVersion of v1 XRDs; everything else probes v2-style paths first
pub const XRD_API_VERSION_V1: &str = "apiextensions.crossplane.io/v1";

/// Label linking a CompositionRevision to its Composition
pub const COMPOSITION_NAME_LABEL: &str = "crossplane.io/composition-name";

/// Annotation carrying a composed resource's name within its composition
pub const COMPOSITION_RESOURCE_NAME_ANNOTATION: &str = "crossplane.io/composition-resource-name";

/// Label linking a composed resource back to its composite
pub const COMPOSITE_LABEL: &str = "crossplane.io/composite";

/// Deserialize a typed view out of a dynamic object
pub fn from_dynamic<T: DeserializeOwned>(obj: &DynamicObject) -> Result<T> {
    let value = serde_json::to_value(obj)?;
    Ok(serde_json::from_value(value)?)
}

/// Reference to a composite type, as carried by `spec.compositeTypeRef`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeReference {
    pub api_version: String,
    pub kind: String,
}

impl TypeReference {
    /// Whether this reference names the given GVK
    pub fn matches(&self, gvk: &GroupVersionKind) -> bool {
        let api_version = if gvk.group.is_empty() {
            gvk.version.clone()
        } else {
            format!("{}/{}", gvk.group, gvk.version)
        };
        self.api_version == api_version && self.kind == gvk.kind
    }
}

impl std::fmt::Display for TypeReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.api_version, self.kind)
    }
}

/// Reference from a pipeline step to an installed Function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionReference {
    pub name: String,
}

/// Secret coordinates for a pipeline credential
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretReference {
    pub namespace: String,
    pub name: String,
}

/// Credential requested by a pipeline step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCredentials {
    pub name: String,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,
}

impl FunctionCredentials {
    /// Credential source naming a Secret
    pub const SOURCE_SECRET: &'static str = "Secret";
}

/// One step of a composition function pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStep {
    pub step: String,
    pub function_ref: FunctionReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub credentials: Vec<FunctionCredentials>,
}

/// Composition spec fields the engine reads or forwards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionSpec {
    pub composite_type_ref: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipeline: Vec<PipelineStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secrets_to_namespace: Option<String>,
}

/// Composition mode the engine supports
pub const MODE_PIPELINE: &str = "Pipeline";

/// A Composition, read-only from the engine's perspective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: CompositionSpec,
}

impl Composition {
    /// The composition's name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// The composition's labels, empty when unset
    pub fn labels(&self) -> impl Iterator<Item = (&String, &String)> {
        self.metadata.labels.iter().flatten()
    }
}

/// CompositionRevision spec: an immutable composition snapshot plus its number
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRevisionSpec {
    pub revision: i64,
    pub composite_type_ref: TypeReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pipeline: Vec<PipelineStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secrets_to_namespace: Option<String>,
}

/// An immutable snapshot of a Composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositionRevision {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: CompositionRevisionSpec,
}

impl CompositionRevision {
    /// The revision object's own name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Name of the owning Composition, per the composition-name label
    pub fn composition_name(&self) -> Option<&str> {
        self.metadata
            .labels
            .as_ref()?
            .get(COMPOSITION_NAME_LABEL)
            .map(String::as_str)
    }

    /// Reconstruct the Composition body this revision snapshotted
    ///
    /// Spec fields are copied; the name comes from the composition-name
    /// label, falling back to the revision's own name.
    pub fn to_composition(&self) -> Composition {
        let name = self
            .composition_name()
            .unwrap_or_else(|| self.name())
            .to_string();
        Composition {
            api_version: XRD_API_VERSION_V1.to_string(),
            kind: "Composition".to_string(),
            metadata: ObjectMeta {
                name: Some(name),
                ..Default::default()
            },
            spec: CompositionSpec {
                composite_type_ref: self.spec.composite_type_ref.clone(),
                mode: self.spec.mode.clone(),
                pipeline: self.spec.pipeline.clone(),
                write_connection_secrets_to_namespace: self
                    .spec
                    .write_connection_secrets_to_namespace
                    .clone(),
            },
        }
    }
}

/// One declared version of an XRD
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrdVersion {
    pub name: String,
    #[serde(default)]
    pub referenceable: bool,
    #[serde(default)]
    pub served: bool,
}

/// XR kind names declared by an XRD
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrdNames {
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plural: Option<String>,
}

/// CompositeResourceDefinition spec fields the engine reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XrdSpec {
    pub group: String,
    pub names: XrdNames,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_names: Option<XrdNames>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub versions: Vec<XrdVersion>,
}

/// A CompositeResourceDefinition at either wire version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResourceDefinition {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: XrdSpec,
}

impl CompositeResourceDefinition {
    /// The XRD's name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    /// Whether this XRD was served at the v1 wire version
    ///
    /// v1 XRDs keep composition selection fields at `spec.<field>` on the XR;
    /// any other wire version probes `spec.crossplane.<field>` first.
    pub fn is_v1(&self) -> bool {
        self.api_version == XRD_API_VERSION_V1
    }

    /// The unique version marked `referenceable: true`
    pub fn referenceable_version(&self) -> Result<&str> {
        self.spec
            .versions
            .iter()
            .find(|v| v.referenceable)
            .map(|v| v.name.as_str())
            .ok_or_else(|| CrossplaneError::MissingReferenceableVersion {
                xrd: self.name().to_string(),
            })
    }

    /// The GVK of XRs defined by this XRD, at the referenceable version
    pub fn xr_gvk(&self) -> Result<GroupVersionKind> {
        Ok(GroupVersionKind {
            group: self.spec.group.clone(),
            version: self.referenceable_version()?.to_string(),
            kind: self.spec.names.kind.clone(),
        })
    }

    /// The GVK of claims defined by this XRD, if it declares any
    pub fn claim_gvk(&self) -> Result<Option<GroupVersionKind>> {
        let Some(claim_names) = &self.spec.claim_names else {
            return Ok(None);
        };
        if claim_names.kind.is_empty() {
            return Err(CrossplaneError::MissingClaimKind {
                xrd: self.name().to_string(),
            });
        }
        Ok(Some(GroupVersionKind {
            group: self.spec.group.clone(),
            version: self.referenceable_version()?.to_string(),
            kind: claim_names.kind.clone(),
        }))
    }

    /// Every (group, version, kind) triple this XRD puts on the cluster
    pub fn all_gvks(&self) -> Vec<GroupVersionKind> {
        self.spec
            .versions
            .iter()
            .map(|v| GroupVersionKind {
                group: self.spec.group.clone(),
                version: v.name.clone(),
                kind: self.spec.names.kind.clone(),
            })
            .collect()
    }
}

/// An installed composition Function, forwarded opaquely to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Function {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<serde_json::Value>,
}

impl Function {
    /// The function's name
    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}
