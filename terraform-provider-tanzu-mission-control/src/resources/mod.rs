//! Terraform Resources for Tanzu Mission Control
//!
//! Defines the resources and data sources that can be managed via Terraform.

pub mod cluster;
pub mod helm_repository;
pub mod management_cluster;
pub mod meta;
pub mod policy;
pub mod provisioner;
pub mod ready;
pub mod scope;
pub mod source_secret;

use crate::client::{ClientError, TmcClient};
use crate::schema::{Diagnostic, ResourceSchema};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Prefix shared by every resource and data source type name
pub const TYPE_PREFIX: &str = "tanzu-mission-control";

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, Vec<Diagnostic>>;

/// Resource state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceState {
    pub values: HashMap<String, Value>,
}

impl ResourceState {
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    pub fn from_object(obj: &Map<String, Value>) -> Self {
        Self {
            values: obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.values.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    /// String value, treating "" as unset
    pub fn get_non_empty(&self, key: &str) -> Option<String> {
        self.get_string(key).filter(|s| !s.is_empty())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.values.get(key).and_then(|v| v.as_i64())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.values.get(key).and_then(|v| v.as_bool())
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.values
            .get(key)
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_string_map(&self, key: &str) -> BTreeMap<String, String> {
        self.values
            .get(key)
            .and_then(|v| v.as_object())
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// First element of a nested list block, or the block itself when stored
    /// as an object.
    pub fn get_block(&self, key: &str) -> Option<ResourceState> {
        match self.values.get(key)? {
            Value::Array(items) => items
                .first()
                .and_then(|item| item.as_object())
                .map(ResourceState::from_object),
            Value::Object(obj) => Some(ResourceState::from_object(obj)),
            _ => None,
        }
    }

    /// All elements of a nested list block
    pub fn get_blocks(&self, key: &str) -> Vec<ResourceState> {
        self.values
            .get(key)
            .and_then(|v| v.as_array())
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.as_object())
                    .map(ResourceState::from_object)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether a nested block was written in configuration, even if empty
    pub fn has_block(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(_)) => true,
            _ => false,
        }
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    /// Copy `key` from another state when present there
    pub fn carry_over(&mut self, from: &ResourceState, key: &str) {
        if let Some(value) = from.get(key) {
            if !value.is_null() {
                self.set(key, value.clone());
            }
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.values.into_iter().collect())
    }
}

impl Default for ResourceState {
    fn default() -> Self {
        Self::new()
    }
}

/// Wrap a flattened block as a single-element list
pub fn single_block(state: ResourceState) -> Value {
    Value::Array(vec![state.into_value()])
}

/// Names among `candidates` whose block is populated in `state`
pub fn populated_blocks<'a>(state: &ResourceState, candidates: &[&'a str]) -> Vec<&'a str> {
    candidates
        .iter()
        .copied()
        .filter(|name| state.has_block(name))
        .collect()
}

/// Turn a client error into a diagnostic with context
pub fn client_diagnostic(action: &str, what: &str, err: &ClientError) -> Vec<Diagnostic> {
    vec![Diagnostic::error(&format!(
        "Unable to {} Tanzu Mission Control {}",
        action, what
    ))
    .with_detail(&err.to_string())]
}

/// Attribute validation error
pub fn invalid(path: &[&str], summary: &str) -> Diagnostic {
    Diagnostic::error(summary).with_attribute(path)
}

/// Result of a create.
///
/// A create can fail after the remote entry already exists, for example
/// while applying an agent manifest. The entry is then reported in `state`
/// together with the failure so Terraform records it instead of orphaning it.
#[derive(Debug)]
pub struct CreateOutcome {
    pub state: ResourceState,
    pub diagnostics: Vec<Diagnostic>,
}

impl CreateOutcome {
    /// Entry was created but a later step failed
    pub fn partial(state: ResourceState, diagnostics: Vec<Diagnostic>) -> Self {
        Self { state, diagnostics }
    }
}

impl From<ResourceState> for CreateOutcome {
    fn from(state: ResourceState) -> Self {
        Self {
            state,
            diagnostics: Vec::new(),
        }
    }
}

/// Resource trait
#[async_trait]
pub trait Resource: Send + Sync {
    /// Resource type name
    fn type_name(&self) -> &str;

    /// Get the schema for this resource
    fn schema(&self) -> ResourceSchema;

    /// Validate configuration before planning
    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    /// Create a new resource. `Err` means nothing was created.
    async fn create(
        &self,
        client: &TmcClient,
        planned: &ResourceState,
    ) -> ResourceResult<CreateOutcome>;

    /// Read an existing resource. An empty state means it no longer exists.
    async fn read(
        &self,
        client: &TmcClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Update an existing resource
    async fn update(
        &self,
        client: &TmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState>;

    /// Delete a resource
    async fn delete(&self, client: &TmcClient, current: &ResourceState) -> ResourceResult<()>;

    /// Plan changes
    fn plan_change(
        &self,
        current: Option<&ResourceState>,
        proposed: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        // Default implementation: return proposed state
        let _ = current;
        Ok(proposed.clone())
    }

    /// Build the state to read back for `terraform import <id>`
    fn import_state(&self, id: &str) -> ResourceResult<ResourceState> {
        let mut state = ResourceState::new();
        state.set("name", Value::String(id.to_string()));
        Ok(state)
    }
}

/// Data source trait
#[async_trait]
pub trait DataSource: Send + Sync {
    fn type_name(&self) -> &str;

    fn schema(&self) -> ResourceSchema;

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let _ = config;
        Vec::new()
    }

    async fn read(&self, client: &TmcClient, config: &ResourceState)
        -> ResourceResult<ResourceState>;
}

/// Get all available resources
pub fn get_all_resources() -> Vec<Box<dyn Resource>> {
    let mut resources: Vec<Box<dyn Resource>> = vec![
        Box::new(cluster::ClusterResource::new()),
        Box::new(management_cluster::ManagementClusterResource::new()),
        Box::new(provisioner::ProvisionerResource::new()),
        Box::new(source_secret::SourceSecretResource::new()),
    ];
    resources.extend(
        policy::PolicyKind::ALL
            .iter()
            .map(|kind| Box::new(policy::PolicyResource::new(*kind)) as Box<dyn Resource>),
    );
    resources
}

/// Get all available data sources
pub fn get_all_data_sources() -> Vec<Box<dyn DataSource>> {
    vec![
        Box::new(cluster::ClusterDataSource::new()),
        Box::new(management_cluster::ManagementClusterDataSource::new()),
        Box::new(provisioner::ProvisionerDataSource::new()),
        Box::new(helm_repository::HelmRepositoryDataSource::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_state() {
        let mut state = ResourceState::new();
        state.set("name", json!("dev"));
        state.set("wait", json!(true));
        state.set("labels", json!({"env": "dev", "bad": 1}));

        assert_eq!(state.get_string("name"), Some("dev".to_string()));
        assert_eq!(state.get_bool("wait"), Some(true));
        let labels = state.get_string_map("labels");
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["env"], "dev");
    }

    #[test]
    fn test_get_block_from_list_or_object() {
        let mut state = ResourceState::new();
        state.set("spec", json!([{"cluster_group": "default"}]));
        state.set("meta", json!({"description": "d"}));
        state.set("empty", json!([]));

        assert_eq!(
            state.get_block("spec").unwrap().get_string("cluster_group"),
            Some("default".to_string())
        );
        assert_eq!(
            state.get_block("meta").unwrap().get_string("description"),
            Some("d".to_string())
        );
        assert!(state.get_block("empty").is_none());
        assert!(!state.has_block("empty"));
    }

    #[test]
    fn test_empty_block_counts_as_populated() {
        let mut state = ResourceState::new();
        state.set("deny_all", json!([{}]));
        state.set("allow_all", Value::Null);

        assert_eq!(
            populated_blocks(&state, &["allow_all", "deny_all"]),
            vec!["deny_all"]
        );
    }

    #[test]
    fn test_get_non_empty() {
        let mut state = ResourceState::new();
        state.set("proxy", json!(""));
        assert_eq!(state.get_string("proxy"), Some(String::new()));
        assert_eq!(state.get_non_empty("proxy"), None);
    }

    #[test]
    fn test_all_type_names_are_unique() {
        let resources = get_all_resources();
        let mut names: Vec<&str> = resources.iter().map(|r| r.type_name()).collect();
        names.sort();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
        assert!(names.iter().all(|n| n.starts_with(TYPE_PREFIX)));
        assert_eq!(before, 9);
    }
}
