//! Terraform Provider Implementation
//!
//! Dispatches plugin RPC requests to the Tanzu Mission Control resources and
//! data sources.

use crate::client::TmcClient;
use crate::resources::{
    get_all_data_sources, get_all_resources, CreateOutcome, DataSource, Resource, ResourceState,
};
use crate::schema::{
    Diagnostic, ProviderSchema, RpcRequest, RpcResponse, SchemaAttribute, SchemaBlock,
    INTERNAL_ERROR, METHOD_NOT_FOUND, PARSE_ERROR,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::RwLock;
use tmc_models::auth::DEFAULT_CLOUD_ENDPOINT;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

/// Provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub endpoint: Option<String>,
    pub vmw_cloud_api_token: Option<String>,
    pub vmw_cloud_endpoint: Option<String>,
    pub insecure_allow_unverified_ssl: Option<bool>,
    pub org_id: Option<String>,
}

impl ProviderConfig {
    /// Fill unset attributes from the process environment
    pub fn with_env_fallback(self) -> Self {
        self.with_fallback(|key| std::env::var(key).ok())
    }

    /// Fill unset attributes through `lookup`, keyed by environment variable name
    pub fn with_fallback(self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let pick = |value: Option<String>, key: &str| {
            value
                .filter(|v| !v.is_empty())
                .or_else(|| lookup(key).filter(|v| !v.is_empty()))
        };

        Self {
            endpoint: pick(self.endpoint, "TMC_ENDPOINT"),
            vmw_cloud_api_token: pick(self.vmw_cloud_api_token, "VMW_CLOUD_API_TOKEN"),
            vmw_cloud_endpoint: pick(self.vmw_cloud_endpoint, "VMW_CLOUD_ENDPOINT"),
            insecure_allow_unverified_ssl: self.insecure_allow_unverified_ssl,
            org_id: pick(self.org_id, "ORG_ID"),
        }
    }
}

/// Tanzu Mission Control Terraform Provider
pub struct TmcProvider {
    client: RwLock<Option<TmcClient>>,
    resources: HashMap<String, Box<dyn Resource>>,
    data_sources: HashMap<String, Box<dyn DataSource>>,
    runtime: Runtime,
}

fn state_param(params: &Value, key: &str) -> Option<ResourceState> {
    params
        .get(key)
        .and_then(|v| v.as_object())
        .map(ResourceState::from_object)
}

fn type_name(params: &Value) -> &str {
    params
        .get("type_name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
}

fn unknown_type(id: i64, kind: &str, type_name: &str) -> RpcResponse {
    RpcResponse::diagnostics(
        id,
        vec![Diagnostic::error(&format!("Unknown {} type: {}", kind, type_name))],
    )
}

impl TmcProvider {
    /// Create a new provider
    pub fn new() -> std::io::Result<Self> {
        let resources = get_all_resources()
            .into_iter()
            .map(|r| (r.type_name().to_string(), r))
            .collect();
        let data_sources = get_all_data_sources()
            .into_iter()
            .map(|d| (d.type_name().to_string(), d))
            .collect();

        Ok(Self {
            client: RwLock::new(None),
            resources,
            data_sources,
            runtime: Runtime::new()?,
        })
    }

    /// Get provider schema
    fn get_schema(&self) -> ProviderSchema {
        let provider_block = SchemaBlock::new()
            .with_attribute(
                "endpoint",
                SchemaAttribute::string()
                    .with_description("Tanzu Mission Control endpoint, e.g. myorg.tmc.cloud.vmware.com. Falls back to TMC_ENDPOINT")
                    .optional(),
            )
            .with_attribute(
                "vmw_cloud_api_token",
                SchemaAttribute::string()
                    .with_description("VMware Cloud API token. Falls back to VMW_CLOUD_API_TOKEN")
                    .optional()
                    .sensitive(),
            )
            .with_attribute(
                "vmw_cloud_endpoint",
                SchemaAttribute::string()
                    .with_description(&format!(
                        "VMware Cloud services endpoint. Falls back to VMW_CLOUD_ENDPOINT, then {}",
                        DEFAULT_CLOUD_ENDPOINT
                    ))
                    .optional(),
            )
            .with_attribute(
                "insecure_allow_unverified_ssl",
                SchemaAttribute::bool()
                    .with_description("Skip TLS certificate verification")
                    .optional()
                    .with_default(json!(false)),
            )
            .with_attribute(
                "org_id",
                SchemaAttribute::string()
                    .with_description("Organization id stamped into the full name of new entities. Falls back to ORG_ID")
                    .optional(),
            )
            .with_description("VMware Tanzu Mission Control provider");

        let mut schema = ProviderSchema::new(provider_block);
        for (name, resource) in &self.resources {
            schema = schema.with_resource(name, resource.schema());
        }
        for (name, data_source) in &self.data_sources {
            schema = schema.with_data_source(name, data_source.schema());
        }
        schema
    }

    /// Configure the provider
    fn configure(&self, config: ProviderConfig) -> Vec<Diagnostic> {
        let config = config.with_env_fallback();

        let Some(endpoint) = config.endpoint.clone() else {
            return vec![Diagnostic::error("endpoint is required")
                .with_detail("Set the endpoint attribute or the TMC_ENDPOINT environment variable")
                .with_attribute(&["endpoint"])];
        };
        let Some(api_token) = config.vmw_cloud_api_token.clone() else {
            return vec![Diagnostic::error("vmw_cloud_api_token is required")
                .with_detail("Set the vmw_cloud_api_token attribute or the VMW_CLOUD_API_TOKEN environment variable")
                .with_attribute(&["vmw_cloud_api_token"])];
        };
        let cloud_endpoint = config
            .vmw_cloud_endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_CLOUD_ENDPOINT.to_string());
        let insecure = config.insecure_allow_unverified_ssl.unwrap_or(false);

        let mut client = match TmcClient::with_options(&endpoint, insecure) {
            Ok(client) => client,
            Err(e) => {
                return vec![Diagnostic::error("Unable to create Tanzu Mission Control client")
                    .with_detail(&e.to_string())]
            }
        };

        if let Err(e) = self
            .runtime
            .block_on(client.authenticate(&cloud_endpoint, &api_token))
        {
            return vec![Diagnostic::error("Unable to authenticate with VMware Cloud services")
                .with_detail(&e.to_string())];
        }
        let client = client.with_org_id(config.org_id.clone());

        match self.client.write() {
            Ok(mut guard) => *guard = Some(client),
            Err(_) => return vec![Diagnostic::error("Provider state is unavailable")],
        }

        info!(endpoint = %endpoint, insecure, "provider configured");
        Vec::new()
    }

    /// Get the configured client
    fn get_client(&self) -> Result<TmcClient, Diagnostic> {
        self.client
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or_else(|| Diagnostic::error("Provider not configured"))
    }

    /// Handle an RPC request
    pub fn handle_request(&self, input: &str) -> String {
        let request: RpcRequest = match serde_json::from_str(input) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unparseable request");
                return serde_json::to_string(&RpcResponse::error(
                    0,
                    PARSE_ERROR,
                    &format!("Parse error: {}", e),
                ))
                .unwrap_or_default();
            }
        };

        debug!(method = %request.method, id = request.id, "handling request");
        let id = request.id;
        let params = &request.params;

        let response = match request.method.as_str() {
            "GetProviderSchema" => self.handle_get_schema(id),
            "ConfigureProvider" => self.handle_configure(id, params),
            "ValidateResourceConfig" => self.handle_validate_resource(id, params),
            "ValidateDataResourceConfig" => self.handle_validate_data_source(id, params),
            "PlanResourceChange" => self.handle_plan_resource(id, params),
            "ApplyResourceChange" => self.handle_apply_resource(id, params),
            "ReadResource" => self.handle_read_resource(id, params),
            "ReadDataSource" => self.handle_read_data_source(id, params),
            "ImportResourceState" => self.handle_import_resource(id, params),
            "StopProvider" => RpcResponse::success(id, json!({})),
            _ => RpcResponse::error(
                id,
                METHOD_NOT_FOUND,
                &format!("Method not found: {}", request.method),
            ),
        };

        serde_json::to_string(&response).unwrap_or_else(|e| {
            serde_json::to_string(&RpcResponse::error(
                id,
                INTERNAL_ERROR,
                &format!("Serialization error: {}", e),
            ))
            .unwrap_or_default()
        })
    }

    /// Handle GetProviderSchema
    fn handle_get_schema(&self, id: i64) -> RpcResponse {
        match serde_json::to_value(self.get_schema()) {
            Ok(schema) => RpcResponse::success(id, schema),
            Err(e) => RpcResponse::error(id, INTERNAL_ERROR, &e.to_string()),
        }
    }

    /// Handle ConfigureProvider
    fn handle_configure(&self, id: i64, params: &Value) -> RpcResponse {
        let config = match params.get("config") {
            Some(c) if !c.is_null() => match serde_json::from_value(c.clone()) {
                Ok(config) => config,
                Err(e) => {
                    return RpcResponse::diagnostics(
                        id,
                        vec![Diagnostic::error("Invalid provider configuration")
                            .with_detail(&e.to_string())],
                    )
                }
            },
            _ => ProviderConfig::default(),
        };

        RpcResponse::diagnostics(id, self.configure(config))
    }

    /// Handle ValidateResourceConfig
    fn handle_validate_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        let Some(resource) = self.resources.get(type_name) else {
            return unknown_type(id, "resource", type_name);
        };

        let config = state_param(params, "config").unwrap_or_default();
        RpcResponse::diagnostics(id, resource.validate(&config))
    }

    /// Handle ValidateDataResourceConfig
    fn handle_validate_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        let Some(data_source) = self.data_sources.get(type_name) else {
            return unknown_type(id, "data source", type_name);
        };

        let config = state_param(params, "config").unwrap_or_default();
        RpcResponse::diagnostics(id, data_source.validate(&config))
    }

    /// Handle PlanResourceChange
    fn handle_plan_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        let Some(resource) = self.resources.get(type_name) else {
            return unknown_type(id, "resource", type_name);
        };

        // A null proposed state plans a destroy
        let Some(proposed) = state_param(params, "proposed_new_state") else {
            return RpcResponse::success(id, json!({"planned_state": null, "diagnostics": []}));
        };
        let prior = state_param(params, "prior_state");

        match resource.plan_change(prior.as_ref(), &proposed) {
            Ok(planned) => {
                let requires_replace = prior
                    .as_ref()
                    .map(|p| resource.schema().requires_replace(&p.values, &planned.values))
                    .unwrap_or_default();
                if !requires_replace.is_empty() {
                    debug!(type_name, ?requires_replace, "change forces replacement");
                }

                RpcResponse::success(
                    id,
                    json!({
                        "planned_state": planned.values,
                        "requires_replace": requires_replace,
                        "diagnostics": []
                    }),
                )
            }
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }

    /// Handle ApplyResourceChange
    fn handle_apply_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        let Some(resource) = self.resources.get(type_name) else {
            return unknown_type(id, "resource", type_name);
        };
        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let planned = state_param(params, "planned_state");
        let prior = state_param(params, "prior_state");

        let result = self.runtime.block_on(async {
            match (prior, planned) {
                (Some(prior), None) => resource.delete(&client, &prior).await.map(|_| None),
                (None, None) => Ok(None),
                (None, Some(planned)) => resource.create(&client, &planned).await.map(Some),
                (Some(prior), Some(planned)) => resource
                    .update(&client, &prior, &planned)
                    .await
                    .map(|state| Some(state.into())),
            }
        });

        match result {
            Ok(Some(CreateOutcome { state, diagnostics })) => {
                if !diagnostics.is_empty() {
                    warn!(
                        resource = type_name,
                        "resource created but not fully provisioned, recording partial state"
                    );
                }
                RpcResponse::success(
                    id,
                    json!({"new_state": state.values, "diagnostics": diagnostics}),
                )
            }
            Ok(None) => RpcResponse::success(id, json!({"new_state": null, "diagnostics": []})),
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }

    /// Handle ReadResource
    fn handle_read_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        let Some(resource) = self.resources.get(type_name) else {
            return unknown_type(id, "resource", type_name);
        };
        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let current = state_param(params, "current_state").unwrap_or_default();
        let result = self.runtime.block_on(resource.read(&client, &current));

        match result {
            // Resource no longer exists
            Ok(state) if state.is_empty() => {
                RpcResponse::success(id, json!({"new_state": null, "diagnostics": []}))
            }
            Ok(state) => {
                RpcResponse::success(id, json!({"new_state": state.values, "diagnostics": []}))
            }
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }

    /// Handle ReadDataSource
    fn handle_read_data_source(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        let Some(data_source) = self.data_sources.get(type_name) else {
            return unknown_type(id, "data source", type_name);
        };
        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let config = state_param(params, "config").unwrap_or_default();
        match self.runtime.block_on(data_source.read(&client, &config)) {
            Ok(state) => RpcResponse::success(id, json!({"state": state.values, "diagnostics": []})),
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }

    /// Handle ImportResourceState
    fn handle_import_resource(&self, id: i64, params: &Value) -> RpcResponse {
        let type_name = type_name(params);
        let resource_id = params.get("id").and_then(|v| v.as_str()).unwrap_or("");

        let Some(resource) = self.resources.get(type_name) else {
            return unknown_type(id, "resource", type_name);
        };
        let client = match self.get_client() {
            Ok(c) => c,
            Err(diag) => return RpcResponse::diagnostics(id, vec![diag]),
        };

        let import_state = match resource.import_state(resource_id) {
            Ok(state) => state,
            Err(diagnostics) => return RpcResponse::diagnostics(id, diagnostics),
        };

        match self.runtime.block_on(resource.read(&client, &import_state)) {
            Ok(state) if state.is_empty() => RpcResponse::diagnostics(
                id,
                vec![Diagnostic::error(&format!("Resource {} not found", resource_id))],
            ),
            Ok(state) => RpcResponse::success(
                id,
                json!({
                    "imported_resources": [{
                        "type_name": type_name,
                        "state": state.values
                    }],
                    "diagnostics": []
                }),
            ),
            Err(diagnostics) => RpcResponse::diagnostics(id, diagnostics),
        }
    }
}
