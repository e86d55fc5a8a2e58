//! Kubernetes manifest apply
//!
//! Applies the agent installer manifest TMC hands out when a cluster is
//! attached (or a management cluster registered). Objects that already exist
//! are deleted and recreated so a re-attach picks up fresh credentials.

use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::GroupVersionKind;
use kube::discovery::{self, ApiCapabilities, ApiResource, Scope as KubeScope};
use kube::{Client, Config};
use serde::Deserialize;
use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Attempts made to delete a pre-existing object
pub const DELETE_ATTEMPTS: u32 = 3;

const DELETE_RETRY_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to parse manifest document {index}: {source}")]
    Yaml {
        index: usize,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("manifest document {index} is missing {field}")]
    MissingField { index: usize, field: &'static str },
    #[error("invalid kubeconfig: {0}")]
    Kubeconfig(String),
    #[error("failed to resolve {kind} in {api_version}: {source}")]
    Discovery {
        api_version: String,
        kind: String,
        #[source]
        source: kube::Error,
    },
    #[error("failed to {action} {kind}/{name}: {source}")]
    Apply {
        action: &'static str,
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

pub type Result<T> = std::result::Result<T, ManifestError>;

/// A single decoded manifest document
#[derive(Debug, Clone)]
pub struct ManifestObject {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
    pub value: serde_json::Value,
}

impl ManifestObject {
    pub fn gvk(&self) -> GroupVersionKind {
        let (group, version) = parse_api_version(&self.api_version);
        GroupVersionKind::gvk(&group, &version, &self.kind)
    }
}

/// Parse apiVersion into (group, version)
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Split a multi-document YAML manifest into objects, skipping empty documents
pub fn parse_manifest(manifest: &str) -> Result<Vec<ManifestObject>> {
    let mut objects = Vec::new();

    for (index, document) in serde_yaml::Deserializer::from_str(manifest).enumerate() {
        let value = serde_json::Value::deserialize(document)
            .map_err(|source| ManifestError::Yaml { index, source })?;

        if value.is_null() {
            continue;
        }

        let field = |pointer: &str, field: &'static str| {
            value
                .pointer(pointer)
                .and_then(|v| v.as_str())
                .filter(|s| !s.is_empty())
                .map(String::from)
                .ok_or(ManifestError::MissingField { index, field })
        };

        let api_version = field("/apiVersion", "apiVersion")?;
        let kind = field("/kind", "kind")?;
        let name = field("/metadata/name", "metadata.name")?;
        let namespace = field("/metadata/namespace", "metadata.namespace").ok();

        objects.push(ManifestObject {
            api_version,
            kind,
            name,
            namespace,
            value,
        });
    }

    Ok(objects)
}

/// Create a kube client from a kubeconfig path, or infer one from the
/// environment (`KUBECONFIG`, in-cluster) when no path is given
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .map_err(|e| ManifestError::Kubeconfig(format!("{}: {}", path.display(), e)))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ManifestError::Kubeconfig(e.to_string()))?
        }
        None => Config::infer()
            .await
            .map_err(|e| ManifestError::Kubeconfig(e.to_string()))?,
    };

    Client::try_from(config).map_err(|e| ManifestError::Kubeconfig(e.to_string()))
}

fn dynamic_api(client: &Client, object: &ManifestObject, ar: &ApiResource, caps: &ApiCapabilities) -> Api<DynamicObject> {
    match (&caps.scope, &object.namespace) {
        (KubeScope::Cluster, _) => Api::all_with(client.clone(), ar),
        (KubeScope::Namespaced, Some(ns)) => Api::namespaced_with(client.clone(), ns, ar),
        (KubeScope::Namespaced, None) => Api::default_namespaced_with(client.clone(), ar),
    }
}

fn is_not_found(err: &kube::Error) -> bool {
    matches!(err, kube::Error::Api(resp) if resp.code == 404)
}

/// Run `delete` for `object` up to [`DELETE_ATTEMPTS`] times, sleeping `delay`
/// between failures. A missing object counts as deleted.
async fn delete_with_retry<F, Fut>(
    object: &ManifestObject,
    delay: Duration,
    mut delete: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<(), kube::Error>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match delete().await {
            Ok(()) => return Ok(()),
            Err(e) if is_not_found(&e) => return Ok(()),
            Err(e) if attempt < DELETE_ATTEMPTS => {
                warn!(
                    kind = %object.kind,
                    name = %object.name,
                    attempt,
                    error = %e,
                    "delete failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(source) => {
                return Err(ManifestError::Apply {
                    action: "delete",
                    kind: object.kind.clone(),
                    name: object.name.clone(),
                    source,
                })
            }
        }
    }
}

/// Apply one object: delete any existing copy, then create it
async fn apply_object(client: &Client, object: &ManifestObject) -> Result<()> {
    let (ar, caps) = discovery::pinned_kind(client, &object.gvk())
        .await
        .map_err(|source| ManifestError::Discovery {
            api_version: object.api_version.clone(),
            kind: object.kind.clone(),
            source,
        })?;
    let api = dynamic_api(client, object, &ar, &caps);

    let existing = api
        .get_opt(&object.name)
        .await
        .map_err(|source| ManifestError::Apply {
            action: "get",
            kind: object.kind.clone(),
            name: object.name.clone(),
            source,
        })?;

    if existing.is_some() {
        debug!(kind = %object.kind, name = %object.name, "object exists, replacing");
        let api = &api;
        let name = object.name.as_str();
        delete_with_retry(object, DELETE_RETRY_DELAY, move || async move {
            api.delete(name, &DeleteParams::default()).await.map(|_| ())
        })
        .await?;
    }

    let data: DynamicObject =
        serde_json::from_value(object.value.clone()).map_err(|e| ManifestError::Apply {
            action: "decode",
            kind: object.kind.clone(),
            name: object.name.clone(),
            source: kube::Error::SerdeError(e),
        })?;

    api.create(&PostParams::default(), &data)
        .await
        .map_err(|source| ManifestError::Apply {
            action: "create",
            kind: object.kind.clone(),
            name: object.name.clone(),
            source,
        })?;

    Ok(())
}

/// Apply every document of `manifest` in order, stopping at the first error.
/// Returns the number of objects created.
pub async fn apply_manifest(client: &Client, manifest: &str) -> Result<usize> {
    let objects = parse_manifest(manifest)?;

    for object in &objects {
        apply_object(client, object).await?;
        debug!(kind = %object.kind, name = %object.name, "applied");
    }

    info!(count = objects.len(), "manifest applied");
    Ok(objects.len())
}
