//! Management cluster resource and data source

use super::cluster::{apply_remote_manifest, kubeconfig_source, ready_wait_timeout};
use super::meta::{construct_meta, flatten_meta, merge_meta, meta_block, META};
use super::ready::{poll_until, DEFAULT_POLL_INTERVAL};
use super::{
    client_diagnostic, invalid, single_block, CreateOutcome, DataSource, Resource,
    ResourceResult, ResourceState,
};
use crate::client::TmcClient;
use crate::schema::{
    AttributeType, Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tmc_models::management_cluster::{
    KubernetesProviderType, ManagementCluster, ManagementClusterFullName, ManagementClusterSpec,
};
use tmc_models::Phase;
use tracing::{debug, info, warn};

const SPEC: &str = "spec";
const REGISTER: &str = "register_management_cluster";
const REGISTRATION_LINK: &str = "registration_link";
const STATUS: &str = "status";
const READY_WAIT_TIMEOUT: &str = "ready_wait_timeout";

const DEFAULT_CLUSTER_GROUP: &str = "default";
const DEFAULT_READY_WAIT_TIMEOUT: &str = "3m";

fn spec_block() -> NestedBlock {
    NestedBlock::single(
        SchemaBlock::new()
            .with_attribute(
                "kubernetes_provider_type",
                SchemaAttribute::string()
                    .with_description("Kubernetes provider type: VMWARE_TANZU_KUBERNETES_GRID, VMWARE_TANZU_KUBERNETES_GRID_SERVICE or VMWARE_TANZU_KUBERNETES_GRID_HOSTED")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                "default_cluster_group",
                SchemaAttribute::string()
                    .with_description("Default cluster group for workload clusters")
                    .optional()
                    .with_default(json!(DEFAULT_CLUSTER_GROUP)),
            )
            .with_attribute(
                "default_workload_cluster_proxy_name",
                SchemaAttribute::string()
                    .with_description("Default proxy configuration for workload clusters")
                    .optional(),
            )
            .with_attribute(
                "default_workload_cluster_image_registry",
                SchemaAttribute::string()
                    .with_description("Default image registry for workload clusters")
                    .optional(),
            )
            .with_description("Spec for the management cluster"),
    )
    .required()
}

fn computed_string(desc: &str) -> SchemaAttribute {
    SchemaAttribute::string().with_description(desc).computed()
}

fn status_attribute() -> SchemaAttribute {
    SchemaAttribute::map(AttributeType::String)
        .with_description("Status of the management cluster")
        .computed()
}

fn construct_full_name(state: &ResourceState, org_id: Option<&str>) -> ManagementClusterFullName {
    ManagementClusterFullName {
        org_id: org_id.map(String::from),
        name: state.get_string("name").unwrap_or_default(),
    }
}

fn construct_spec(state: &ResourceState) -> Result<ManagementClusterSpec, Vec<Diagnostic>> {
    let block = state
        .get_block(SPEC)
        .ok_or_else(|| vec![invalid(&[SPEC], "spec block is required")])?;

    let provider_type = block
        .get_non_empty("kubernetes_provider_type")
        .ok_or_else(|| {
            vec![invalid(
                &[SPEC, "kubernetes_provider_type"],
                "kubernetes_provider_type is required",
            )]
        })?;
    let kubernetes_provider_type: KubernetesProviderType = provider_type
        .parse()
        .map_err(|e: tmc_models::Error| {
            vec![invalid(&[SPEC, "kubernetes_provider_type"], &e.to_string())]
        })?;

    Ok(ManagementClusterSpec {
        kubernetes_provider_type,
        default_cluster_group: block
            .get_non_empty("default_cluster_group")
            .unwrap_or_else(|| DEFAULT_CLUSTER_GROUP.to_string()),
        default_workload_cluster_proxy_name: block
            .get_non_empty("default_workload_cluster_proxy_name"),
        default_workload_cluster_image_registry: block
            .get_non_empty("default_workload_cluster_image_registry"),
    })
}

pub fn construct_management_cluster(
    state: &ResourceState,
    org_id: Option<&str>,
) -> ResourceResult<ManagementCluster> {
    Ok(ManagementCluster {
        full_name: construct_full_name(state, org_id),
        meta: construct_meta(state),
        spec: construct_spec(state)?,
        status: None,
    })
}

fn flatten_spec(spec: &ManagementClusterSpec) -> Value {
    let mut block = ResourceState::new();
    block.set(
        "kubernetes_provider_type",
        json!(spec.kubernetes_provider_type.as_str()),
    );
    block.set("default_cluster_group", json!(spec.default_cluster_group));
    block.set(
        "default_workload_cluster_proxy_name",
        json!(spec
            .default_workload_cluster_proxy_name
            .clone()
            .unwrap_or_default()),
    );
    block.set(
        "default_workload_cluster_image_registry",
        json!(spec
            .default_workload_cluster_image_registry
            .clone()
            .unwrap_or_default()),
    );
    single_block(block)
}

pub fn flatten_management_cluster(mc: &ManagementCluster) -> ResourceState {
    let mut state = ResourceState::new();
    state.set(
        "id",
        json!(mc.meta.uid.clone().unwrap_or_else(|| mc.full_name.name.clone())),
    );
    state.set("name", json!(mc.full_name.name));
    state.set(META, flatten_meta(&mc.meta));
    state.set(SPEC, flatten_spec(&mc.spec));

    let mut status = BTreeMap::new();
    if let Some(s) = &mc.status {
        status.insert("phase", s.phase.to_string());
        status.insert("health", s.health.to_string());
    }
    state.set(STATUS, json!(status));
    state.set(
        REGISTRATION_LINK,
        json!(mc
            .status
            .as_ref()
            .and_then(|s| s.registration_url.clone())
            .unwrap_or_default()),
    );
    state
}

/// Poll every `interval` until the management cluster reports `READY`
pub async fn wait_for_ready(
    client: &TmcClient,
    full_name: &ManagementClusterFullName,
    timeout: Duration,
    interval: Duration,
) -> ResourceResult<()> {
    if timeout.is_zero() {
        return Ok(());
    }

    let what = format!("management cluster {} to become ready", full_name.name);
    poll_until(&what, timeout, interval, move || async move {
        let mc = client
            .get_management_cluster(full_name)
            .await
            .map_err(|e| e.to_string())?;
        match mc.phase() {
            Phase::Ready => Ok(true),
            Phase::Error => Err(format!(
                "management cluster {} is in ERROR phase",
                full_name.name
            )),
            phase => {
                debug!(management_cluster = %full_name.name, %phase, "management cluster not ready");
                Ok(false)
            }
        }
    })
    .await
    .map_err(|e| {
        vec![Diagnostic::error("Management cluster did not become ready")
            .with_detail(&e.to_string())]
    })
}

/// Apply the registration manifest of a new management cluster entry and
/// wait for it to become ready
async fn register(
    client: &TmcClient,
    mc: &ManagementCluster,
    kubeconfig: Option<&Path>,
    timeout: Duration,
) -> ResourceResult<ManagementCluster> {
    let link = mc
        .status
        .as_ref()
        .and_then(|s| s.registration_url.clone())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            vec![Diagnostic::error(
                "Management cluster has no registration link to apply",
            )]
        })?;

    let applied = apply_remote_manifest(client, &link, kubeconfig).await?;
    info!(
        management_cluster = %mc.full_name.name,
        objects = applied,
        "registration manifest applied"
    );

    wait_for_ready(client, &mc.full_name, timeout, DEFAULT_POLL_INTERVAL).await?;
    client
        .get_management_cluster(&mc.full_name)
        .await
        .map_err(|e| {
            client_diagnostic(
                "get",
                &format!("management cluster entry, name : {}", mc.full_name.name),
                &e,
            )
        })
}

/// Management cluster resource
pub struct ManagementClusterResource;

impl ManagementClusterResource {
    pub fn new() -> Self {
        Self
    }

    fn resource_state(mc: &ManagementCluster, config: &ResourceState) -> ResourceState {
        let mut state = flatten_management_cluster(mc);
        state.carry_over(config, REGISTER);
        state.set(
            READY_WAIT_TIMEOUT,
            json!(config
                .get_non_empty(READY_WAIT_TIMEOUT)
                .unwrap_or_else(|| DEFAULT_READY_WAIT_TIMEOUT.to_string())),
        );
        state
    }
}

impl Default for ManagementClusterResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for ManagementClusterResource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_management_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute("id", computed_string("Unique identifier of the management cluster"))
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the management cluster")
                    .required()
                    .force_new(),
            )
            .with_attribute(
                REGISTRATION_LINK,
                computed_string("Link to the registration manifest for the management cluster"),
            )
            .with_attribute(
                READY_WAIT_TIMEOUT,
                SchemaAttribute::string()
                    .with_description("Wait timeout duration until the management cluster reaches READY state. Accepted timeout duration values like 5m, 45s or 1h; 0s skips the wait")
                    .optional()
                    .with_default(json!(DEFAULT_READY_WAIT_TIMEOUT)),
            )
            .with_attribute(STATUS, status_attribute())
            .with_block(META, meta_block())
            .with_block(SPEC, spec_block())
            .with_block(
                REGISTER,
                NestedBlock::single(
                    SchemaBlock::new()
                        .with_attribute(
                            "kubeconfig_file",
                            SchemaAttribute::string()
                                .with_description("Path to the kubeconfig of the management cluster to register")
                                .optional(),
                        )
                        .with_attribute(
                            "description",
                            SchemaAttribute::string()
                                .with_description("Registration description")
                                .optional(),
                        )
                        .with_description("Apply the registration manifest to the management cluster"),
                )
                .force_new(),
            )
            .with_description("Tanzu Mission Control management cluster registration");

        ResourceSchema::new(0, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let mut diags = Vec::new();
        if let Err(mut d) = ready_wait_timeout(config, DEFAULT_READY_WAIT_TIMEOUT) {
            diags.append(&mut d);
        }
        if config.has_block(SPEC) {
            if let Err(mut d) = construct_spec(config) {
                diags.append(&mut d);
            }
        }
        diags
    }

    async fn create(
        &self,
        client: &TmcClient,
        planned: &ResourceState,
    ) -> ResourceResult<CreateOutcome> {
        let timeout = ready_wait_timeout(planned, DEFAULT_READY_WAIT_TIMEOUT)?;
        let request = construct_management_cluster(planned, client.org_id())?;
        let what = format!("management cluster entry, name : {}", request.full_name.name);
        debug!(management_cluster = %request.full_name.name, "registering management cluster");

        let mc = client
            .create_management_cluster(&request)
            .await
            .map_err(|e| client_diagnostic("create", &what, &e))?;

        let kubeconfig = planned
            .get_block(REGISTER)
            .and_then(|register| kubeconfig_source(register.get_string("kubeconfig_file")));
        let Some(kubeconfig) = kubeconfig else {
            return Ok(Self::resource_state(&mc, planned).into());
        };

        match register(client, &mc, kubeconfig.as_deref(), timeout).await {
            Ok(registered) => Ok(Self::resource_state(&registered, planned).into()),
            Err(diagnostics) => {
                warn!(
                    management_cluster = %mc.full_name.name,
                    "management cluster entry created but registration failed"
                );
                Ok(CreateOutcome::partial(
                    Self::resource_state(&mc, planned),
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

        match client.get_management_cluster(&full_name).await {
            Ok(mc) => Ok(Self::resource_state(&mc, current)),
            Err(e) if e.is_not_found() => {
                debug!(management_cluster = %full_name.name, "management cluster no longer exists");
                Ok(ResourceState::new())
            }
            Err(e) => Err(client_diagnostic(
                "get",
                &format!("management cluster entry, name : {}", full_name.name),
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
        let what = format!("management cluster entry, name : {}", full_name.name);
        let desired = construct_spec(planned)?;

        let mut mc = client
            .get_management_cluster(&full_name)
            .await
            .map_err(|e| client_diagnostic("get", &what, &e))?;

        merge_meta(&mut mc.meta, &construct_meta(planned));
        mc.spec.default_cluster_group = desired.default_cluster_group;
        mc.spec.default_workload_cluster_proxy_name = desired.default_workload_cluster_proxy_name;
        mc.spec.default_workload_cluster_image_registry =
            desired.default_workload_cluster_image_registry;

        let updated = client
            .update_management_cluster(&mc)
            .await
            .map_err(|e| client_diagnostic("update", &what, &e))?;

        Ok(Self::resource_state(&updated, planned))
    }

    async fn delete(&self, client: &TmcClient, current: &ResourceState) -> ResourceResult<()> {
        let full_name = construct_full_name(current, client.org_id());
        let force = current.has_block(REGISTER);
        debug!(management_cluster = %full_name.name, force, "deregistering management cluster");

        match client.delete_management_cluster(&full_name, force).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(client_diagnostic(
                "delete",
                &format!("management cluster entry, name : {}", full_name.name),
                &e,
            )),
        }
    }
}

/// Management cluster data source
pub struct ManagementClusterDataSource;

impl ManagementClusterDataSource {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ManagementClusterDataSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DataSource for ManagementClusterDataSource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_management_cluster"
    }

    fn schema(&self) -> ResourceSchema {
        let spec = SchemaBlock::new()
            .with_attribute("kubernetes_provider_type", computed_string("Kubernetes provider type"))
            .with_attribute("default_cluster_group", computed_string("Default cluster group for workload clusters"))
            .with_attribute(
                "default_workload_cluster_proxy_name",
                computed_string("Default proxy configuration for workload clusters"),
            )
            .with_attribute(
                "default_workload_cluster_image_registry",
                computed_string("Default image registry for workload clusters"),
            );

        let block = SchemaBlock::new()
            .with_attribute("id", computed_string("Unique identifier of the management cluster"))
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the management cluster")
                    .required(),
            )
            .with_attribute(REGISTRATION_LINK, computed_string("Registration manifest link"))
            .with_attribute(STATUS, status_attribute())
            .with_block(META, meta_block())
            .with_block(SPEC, NestedBlock::single(spec))
            .with_description("Look up a Tanzu Mission Control management cluster");

        ResourceSchema::new(0, block)
    }

    async fn read(
        &self,
        client: &TmcClient,
        config: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let full_name = construct_full_name(config, client.org_id());
        let mc = client.get_management_cluster(&full_name).await.map_err(|e| {
            client_diagnostic(
                "get",
                &format!("management cluster entry, name : {}", full_name.name),
                &e,
            )
        })?;
        Ok(flatten_management_cluster(&mc))
    }
}
