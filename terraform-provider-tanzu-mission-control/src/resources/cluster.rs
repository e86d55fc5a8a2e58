//! Cluster resource and data source
//!
//! Clusters are attached by creating the TMC entry, then applying the agent
//! installer manifest TMC returns to the target cluster and waiting for the
//! entry to report `READY`.

use super::meta::{construct_meta, flatten_meta, merge_meta, meta_block, META};
use super::ready::{parse_duration, poll_until, DEFAULT_POLL_INTERVAL};
use super::{
    client_diagnostic, invalid, single_block, CreateOutcome, DataSource, Resource,
    ResourceResult, ResourceState,
};
use crate::client::TmcClient;
use crate::manifest;
use crate::schema::{
    AttributeType, Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tmc_models::cluster::{Cluster, ClusterFullName, ClusterSpec, ATTACHED};
use tmc_models::Phase;
use tracing::{debug, info, warn};

const SPEC: &str = "spec";
const ATTACH: &str = "attach_k8s_cluster";
const STATUS: &str = "status";
const READY_WAIT_TIMEOUT: &str = "ready_wait_timeout";
const WAIT_UNTIL_READY: &str = "wait_until_ready";

const DEFAULT_CLUSTER_GROUP: &str = "default";
const DEFAULT_READY_WAIT_TIMEOUT: &str = "15m";

fn full_name_attributes(block: SchemaBlock, force_new: bool) -> SchemaBlock {
    let parent = |desc: &str| {
        let attr = SchemaAttribute::string()
            .with_description(desc)
            .optional()
            .with_default(json!(ATTACHED));
        if force_new {
            attr.force_new()
        } else {
            attr
        }
    };
    let name = SchemaAttribute::string()
        .with_description("Name of this cluster")
        .required();

    block
        .with_attribute(
            "management_cluster_name",
            parent("Name of the management cluster"),
        )
        .with_attribute("provisioner_name", parent("Provisioner of the cluster"))
        .with_attribute("name", if force_new { name.force_new() } else { name })
}

fn spec_block() -> NestedBlock {
    NestedBlock::single(
        SchemaBlock::new()
            .with_attribute(
                "cluster_group",
                SchemaAttribute::string()
                    .with_description("Name of the cluster group to which this cluster belongs")
                    .optional()
                    .with_default(json!(DEFAULT_CLUSTER_GROUP)),
            )
            .with_attribute(
                "proxy",
                SchemaAttribute::string()
                    .with_description("Optional proxy name is the name of the Proxy Config to be used for the cluster")
                    .optional(),
            )
            .with_attribute(
                "image_registry",
                SchemaAttribute::string()
                    .with_description("Optional image registry name is the name of the image registry to be used for the cluster")
                    .optional(),
            )
            .with_description("Spec for the cluster"),
    )
}

fn ready_wait_timeout_attribute() -> SchemaAttribute {
    SchemaAttribute::string()
        .with_description("Wait timeout duration until cluster resource reaches READY state. Accepted timeout duration values like 5m, 45s or 1h")
        .optional()
        .with_default(json!(DEFAULT_READY_WAIT_TIMEOUT))
}

fn status_attribute() -> SchemaAttribute {
    SchemaAttribute::map(AttributeType::String)
        .with_description("Status of the cluster")
        .computed()
}

/// Build the full name from the top-level name attributes of `state`
pub fn construct_full_name(state: &ResourceState, org_id: Option<&str>) -> ClusterFullName {
    let parent = |key: &str| {
        state
            .get_non_empty(key)
            .unwrap_or_else(|| ATTACHED.to_string())
    };

    let mut full_name = ClusterFullName::new(
        &parent("management_cluster_name"),
        &parent("provisioner_name"),
        &state.get_string("name").unwrap_or_default(),
    );
    full_name.org_id = org_id.map(String::from);
    full_name
}

fn construct_spec(state: &ResourceState) -> ClusterSpec {
    let block = state.get_block(SPEC).unwrap_or_default();

    ClusterSpec {
        cluster_group_name: block
            .get_non_empty("cluster_group")
            .unwrap_or_else(|| DEFAULT_CLUSTER_GROUP.to_string()),
        proxy_name: block.get_non_empty("proxy"),
        image_registry: block.get_non_empty("image_registry"),
    }
}

pub fn construct_cluster(state: &ResourceState, org_id: Option<&str>) -> Cluster {
    Cluster {
        full_name: construct_full_name(state, org_id),
        meta: construct_meta(state),
        spec: construct_spec(state),
        status: None,
    }
}

fn flatten_spec(spec: &ClusterSpec) -> Value {
    let mut block = ResourceState::new();
    block.set("cluster_group", json!(spec.cluster_group_name));
    block.set("proxy", json!(spec.proxy_name.clone().unwrap_or_default()));
    block.set(
        "image_registry",
        json!(spec.image_registry.clone().unwrap_or_default()),
    );
    single_block(block)
}

fn flatten_status(cluster: &Cluster) -> Value {
    let mut status = BTreeMap::new();
    if let Some(s) = &cluster.status {
        status.insert("phase", s.phase.to_string());
        status.insert("health", s.health.to_string());
        if let Some(t) = &s.cluster_type {
            status.insert("type", t.clone());
        }
        if let Some(v) = &s.kube_server_version {
            status.insert("kube_server_version", v.clone());
        }
        if let Some(provider) = &s.kubernetes_provider {
            if let Some(t) = &provider.provider_type {
                status.insert("kubernetes_provider_type", t.clone());
            }
            if let Some(v) = &provider.version {
                status.insert("kubernetes_provider_version", v.clone());
            }
        }
        if let Some(link) = &s.installer_link {
            status.insert("installer_link", link.clone());
        }
    }
    json!(status)
}

/// Flatten the Terraform-visible fields of `cluster`
pub fn flatten_cluster(cluster: &Cluster) -> ResourceState {
    let mut state = ResourceState::new();
    state.set(
        "id",
        json!(cluster
            .meta
            .uid
            .clone()
            .unwrap_or_else(|| cluster.full_name.to_string())),
    );
    state.set(
        "management_cluster_name",
        json!(cluster.full_name.management_cluster_name),
    );
    state.set("provisioner_name", json!(cluster.full_name.provisioner_name));
    state.set("name", json!(cluster.full_name.name));
    state.set(META, flatten_meta(&cluster.meta));
    state.set(SPEC, flatten_spec(&cluster.spec));
    state.set(STATUS, flatten_status(cluster));
    state
}

/// Parse `ready_wait_timeout`, falling back to the cluster default
pub(crate) fn ready_wait_timeout(state: &ResourceState, default: &str) -> ResourceResult<Duration> {
    let raw = state
        .get_non_empty(READY_WAIT_TIMEOUT)
        .unwrap_or_else(|| default.to_string());
    parse_duration(&raw).map_err(|e| vec![invalid(&[READY_WAIT_TIMEOUT], &e)])
}

/// Where to find the kubeconfig for an attach.
///
/// `None` means no kubeconfig is available and the installer manifest must be
/// applied by hand. `Some(None)` defers to `KUBECONFIG`.
pub(crate) fn kubeconfig_source(path: Option<String>) -> Option<Option<PathBuf>> {
    match path.filter(|p| !p.is_empty()) {
        Some(path) => Some(Some(PathBuf::from(path))),
        None => std::env::var_os("KUBECONFIG")
            .filter(|v| !v.is_empty())
            .map(|_| None),
    }
}

/// Fetch the manifest at `link` and apply it through `kubeconfig`
pub(crate) async fn apply_remote_manifest(
    client: &TmcClient,
    link: &str,
    kubeconfig: Option<&Path>,
) -> ResourceResult<usize> {
    let text = client
        .fetch_text(link)
        .await
        .map_err(|e| client_diagnostic("fetch", "installer manifest", &e))?;

    let manifest_error = |e: manifest::ManifestError| {
        vec![Diagnostic::error("Unable to apply the installer manifest to the cluster")
            .with_detail(&e.to_string())]
    };
    let kube = manifest::create_client(kubeconfig)
        .await
        .map_err(manifest_error)?;
    manifest::apply_manifest(&kube, &text)
        .await
        .map_err(manifest_error)
}

/// Poll every `interval` until the cluster reports `READY`. A zero timeout
/// skips the wait.
pub async fn wait_for_ready(
    client: &TmcClient,
    full_name: &ClusterFullName,
    timeout: Duration,
    interval: Duration,
) -> ResourceResult<()> {
    if timeout.is_zero() {
        return Ok(());
    }

    let what = format!("cluster {} to become ready", full_name);
    poll_until(&what, timeout, interval, move || async move {
        let cluster = client
            .get_cluster(full_name)
            .await
            .map_err(|e| e.to_string())?;
        match cluster.phase() {
            Phase::Ready => Ok(true),
            Phase::Error => Err(format!("cluster {} is in ERROR phase", full_name)),
            phase => {
                debug!(cluster = %full_name, %phase, "cluster not ready");
                Ok(false)
            }
        }
    })
    .await
    .map_err(|e| {
        vec![Diagnostic::error("Cluster did not become ready").with_detail(&e.to_string())]
    })
}

async fn wait_for_deletion(
    client: &TmcClient,
    full_name: &ClusterFullName,
    timeout: Duration,
) -> ResourceResult<()> {
    if timeout.is_zero() {
        return Ok(());
    }

    let what = format!("cluster {} to be deleted", full_name);
    poll_until(&what, timeout, DEFAULT_POLL_INTERVAL, move || async move {
        match client.get_cluster(full_name).await {
            Ok(_) => Ok(false),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e),
        }
    })
    .await
    .map_err(|e| {
        vec![Diagnostic::error("Cluster was not deleted in time").with_detail(&e.to_string())]
    })
}

/// Apply the installer manifest of a freshly created cluster entry and wait
/// for it to become ready
async fn attach(
    client: &TmcClient,
    cluster: &Cluster,
    kubeconfig: Option<&Path>,
    timeout: Duration,
) -> ResourceResult<Cluster> {
    let what = format!("cluster entry, name : {}", cluster.full_name.name);
    let link = match cluster.status.as_ref().and_then(|s| s.installer_link.clone()) {
        Some(link) => link,
        None => client
            .get_cluster(&cluster.full_name)
            .await
            .map_err(|e| client_diagnostic("get", &what, &e))?
            .status
            .and_then(|s| s.installer_link)
            .ok_or_else(|| vec![Diagnostic::error("Cluster has no installer link to apply")])?,
    };

    let applied = apply_remote_manifest(client, &link, kubeconfig).await?;
    info!(cluster = %cluster.full_name, objects = applied, "cluster agent manifest applied");

    wait_for_ready(client, &cluster.full_name, timeout, DEFAULT_POLL_INTERVAL).await?;
    client
        .get_cluster(&cluster.full_name)
        .await
        .map_err(|e| client_diagnostic("get", &what, &e))
}

/// Cluster resource
pub struct ClusterResource;

impl ClusterResource {
    pub fn new() -> Self {
        Self
    }

    fn resource_state(cluster: &Cluster, config: &ResourceState) -> ResourceState {
        let mut state = flatten_cluster(cluster);
        state.carry_over(config, ATTACH);
        state.set(
            READY_WAIT_TIMEOUT,
            json!(config
                .get_non_empty(READY_WAIT_TIMEOUT)
                .unwrap_or_else(|| DEFAULT_READY_WAIT_TIMEOUT.to_string())),
        );
        state
    }
}

impl Default for ClusterResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for ClusterResource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        let block = full_name_attributes(SchemaBlock::new(), true)
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Unique identifier of the cluster")
                    .computed(),
            )
            .with_attribute(READY_WAIT_TIMEOUT, ready_wait_timeout_attribute())
            .with_attribute(STATUS, status_attribute())
            .with_block(META, meta_block())
            .with_block(SPEC, spec_block())
            .with_block(
                ATTACH,
                NestedBlock::single(
                    SchemaBlock::new()
                        .with_attribute(
                            "kubeconfig_file",
                            SchemaAttribute::string()
                                .with_description("Attach cluster KUBECONFIG path")
                                .optional(),
                        )
                        .with_attribute(
                            "description",
                            SchemaAttribute::string()
                                .with_description("Attach cluster description")
                                .optional(),
                        )
                        .with_description("Attach a Kubernetes cluster to Tanzu Mission Control"),
                )
                .force_new(),
            )
            .with_description("Tanzu Mission Control cluster");

        ResourceSchema::new(0, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if let Err(mut d) = ready_wait_timeout(config, DEFAULT_READY_WAIT_TIMEOUT) {
            diags.append(&mut d);
        }
        if config.get_string("name").is_some_and(|n| n.is_empty()) {
            diags.push(invalid(&["name"], "name must not be empty"));
        }
        diags
    }

    async fn create(
        &self,
        client: &TmcClient,
        planned: &ResourceState,
    ) -> ResourceResult<CreateOutcome> {
        let timeout = ready_wait_timeout(planned, DEFAULT_READY_WAIT_TIMEOUT)?;
        let request = construct_cluster(planned, client.org_id());
        let what = format!("cluster entry, name : {}", request.full_name.name);
        debug!(cluster = %request.full_name, "creating cluster");

        let cluster = client
            .create_cluster(&request)
            .await
            .map_err(|e| client_diagnostic("create", &what, &e))?;

        let kubeconfig = planned
            .get_block(ATTACH)
            .and_then(|block| kubeconfig_source(block.get_string("kubeconfig_file")));
        let Some(kubeconfig) = kubeconfig else {
            return Ok(Self::resource_state(&cluster, planned).into());
        };

        match attach(client, &cluster, kubeconfig.as_deref(), timeout).await {
            Ok(attached) => Ok(Self::resource_state(&attached, planned).into()),
            Err(diagnostics) => {
                warn!(cluster = %cluster.full_name, "cluster entry created but attach failed");
                Ok(CreateOutcome::partial(
                    Self::resource_state(&cluster, planned),
                    diagnostics,
                ))
            }
        }
    }

    async fn read(
        &self,
        client: &TmcClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let full_name = construct_full_name(current, client.org_id());

        match client.get_cluster(&full_name).await {
            Ok(cluster) => Ok(Self::resource_state(&cluster, current)),
            Err(e) if e.is_not_found() => {
                debug!(cluster = %full_name, "cluster no longer exists");
                Ok(ResourceState::new())
            }
            Err(e) => Err(client_diagnostic(
                "get",
                &format!("cluster entry, name : {}", full_name.name),
                &e,
            )),
        }
    }

    async fn update(
        &self,
        client: &TmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let full_name = construct_full_name(current, client.org_id());
        let what = format!("cluster entry, name : {}", full_name.name);

        let mut cluster = client
            .get_cluster(&full_name)
            .await
            .map_err(|e| client_diagnostic("get", &what, &e))?;

        merge_meta(&mut cluster.meta, &construct_meta(planned));
        cluster.spec = construct_spec(planned);
        debug!(cluster = %full_name, "updating cluster");

        let updated = client
            .update_cluster(&cluster)
            .await
            .map_err(|e| client_diagnostic("update", &what, &e))?;

        Ok(Self::resource_state(&updated, planned))
    }

    async fn delete(&self, client: &TmcClient, current: &ResourceState) -> ResourceResult<()> {
        let full_name = construct_full_name(current, client.org_id());
        let force = full_name.is_attached() && current.has_block(ATTACH);
        debug!(cluster = %full_name, force, "deleting cluster");

        match client.delete_cluster(&full_name, force).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => {
                return Err(client_diagnostic(
                    "delete",
                    &format!("cluster entry, name : {}", full_name.name),
                    &e,
                ))
            }
        }

        let timeout = ready_wait_timeout(current, DEFAULT_READY_WAIT_TIMEOUT)?;
        wait_for_deletion(client, &full_name, timeout).await
    }

    fn import_state(&self, id: &str) -> ResourceResult<ResourceState> {
        let parts: Vec<&str> = id.split('/').collect();
        let (mc, prov, name) = match parts.as_slice() {
            [mc, prov, name] if !mc.is_empty() && !prov.is_empty() && !name.is_empty() => {
                (*mc, *prov, *name)
            }
            [name] if !name.is_empty() => (ATTACHED, ATTACHED, *name),
            _ => {
                return Err(vec![Diagnostic::error(&format!(
                    "invalid import id {:?}, expected <management_cluster_name>/<provisioner_name>/<name> or <name>",
                    id
                ))])
            }
        };

        let mut state = ResourceState::new();
        state.set("management_cluster_name", json!(mc));
        state.set("provisioner_name", json!(prov));
        state.set("name", json!(name));
        Ok(state)
    }
}

/// Cluster data source
pub struct ClusterDataSource;

impl ClusterDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ClusterDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for ClusterDataSource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        let block = full_name_attributes(SchemaBlock::new(), false)
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Unique identifier of the cluster")
                    .computed(),
            )
            .with_attribute(
                WAIT_UNTIL_READY,
                SchemaAttribute::bool()
                    .with_description("Wait until the cluster reports READY before returning")
                    .optional()
                    .with_default(json!(false)),
            )
            .with_attribute(READY_WAIT_TIMEOUT, ready_wait_timeout_attribute())
            .with_attribute(STATUS, status_attribute())
            .with_block(META, meta_block())
            .with_block(SPEC, spec_block())
            .with_description("Look up a Tanzu Mission Control cluster");

        ResourceSchema::new(0, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        ready_wait_timeout(config, DEFAULT_READY_WAIT_TIMEOUT)
            .err()
            .unwrap_or_default()
    }

    async fn read(
        &self,
        client: &TmcClient,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let full_name = construct_full_name(config, client.org_id());

        if config.get_bool(WAIT_UNTIL_READY).unwrap_or(false) {
            let timeout = ready_wait_timeout(config, DEFAULT_READY_WAIT_TIMEOUT)?;
            wait_for_ready(client, &full_name, timeout, DEFAULT_POLL_INTERVAL).await?;
        }

        let cluster = client.get_cluster(&full_name).await.map_err(|e| {
            client_diagnostic("get", &format!("cluster entry, name : {}", full_name.name), &e)
        })?;

        let mut state = flatten_cluster(&cluster);
        state.carry_over(config, WAIT_UNTIL_READY);
        state.carry_over(config, READY_WAIT_TIMEOUT);
        Ok(state)
    }
}
