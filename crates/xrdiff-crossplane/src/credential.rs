//! Pipeline credential client
//!
//! Pipeline steps can request credentials from Secrets. A Secret that cannot
//! be fetched is skipped rather than failing the diff: the secret may only be
//! injected at runtime, and the renderer treats credentials as best-effort.

use k8s_openapi::api::core::v1::Secret;
use kube::api::GroupVersionKind;
use xrdiff_kube::ResourceClient;

use crate::types::{Composition, FunctionCredentials, from_dynamic};

fn secret_gvk() -> GroupVersionKind {
    GroupVersionKind::gvk("", "v1", "Secret")
}

/// Fetches the Secrets referenced by a composition's pipeline credentials
pub struct CredentialClient {
    resources: ResourceClient,
}

impl CredentialClient {
    /// Create a credential client
    pub fn new(resources: ResourceClient) -> Self {
        Self { resources }
    }

    /// The successfully fetched Secrets for every `source: Secret`
    /// credential in the pipeline; failures are logged and skipped
    pub async fn fetch_credentials(&self, comp: &Composition) -> Vec<Secret> {
        let mut secrets = Vec::new();
        let mut skipped = 0usize;

        for step in &comp.spec.pipeline {
            for cred in &step.credentials {
                if cred.source != FunctionCredentials::SOURCE_SECRET {
                    continue;
                }
                let Some(secret_ref) = &cred.secret_ref else {
                    continue;
                };

                match self
                    .resources
                    .get(&secret_gvk(), Some(&secret_ref.namespace), &secret_ref.name)
                    .await
                {
                    Ok(obj) => match from_dynamic::<Secret>(&obj) {
                        Ok(secret) => secrets.push(secret),
                        Err(e) => {
                            skipped += 1;
                            tracing::warn!(
                                step = step.step.as_str(),
                                credential = cred.name.as_str(),
                                error = %e,
                                "skipping undecodable pipeline credential"
                            );
                        }
                    },
                    Err(e) => {
                        skipped += 1;
                        tracing::warn!(
                            step = step.step.as_str(),
                            credential = cred.name.as_str(),
                            secret = format!("{}/{}", secret_ref.namespace, secret_ref.name),
                            error = %e,
                            "skipping unfetchable pipeline credential"
                        );
                    }
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(
                composition = comp.name(),
                fetched = secrets.len(),
                skipped = skipped,
                "some pipeline credentials were not fetchable"
            );
        }

        secrets
    }
}
