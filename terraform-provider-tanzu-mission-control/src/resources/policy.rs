//! Policy resources
//!
//! Security, image, network, namespace quota and custom policies share one
//! wire model and one Terraform shape:
//!
//! ```hcl
//! spec {
//!   input {
//!     <recipe> { ... }
//!   }
//!   namespace_selector {
//!     match_expressions { key = "..." operator = "In" values = [...] }
//!   }
//! }
//! ```
//!
//! Exactly one recipe block may be set under `input`. Each [`PolicyKind`]
//! carries its recipe table and the scopes it can attach to.

use super::meta::{construct_meta, flatten_meta, merge_meta, meta_block, META};
use super::scope::{
    construct_scope, flatten_scope, parse_scoped_import_id, reported_scope, scope_block,
    validate_scope, SCOPE,
};
use super::{
    client_diagnostic, invalid, populated_blocks, single_block, CreateOutcome, Resource,
    ResourceResult, ResourceState, TYPE_PREFIX,
};
use crate::client::TmcClient;
use crate::schema::{
    AttributeType, Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock,
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tmc_models::policy::{LabelSelector, LabelSelectorRequirement, Policy, PolicyFullName, PolicySpec};
use tmc_models::scope::{Scope, ScopeKind};
use tracing::{debug, warn};

const SPEC: &str = "spec";
const INPUT: &str = "input";
const NAMESPACE_SELECTOR: &str = "namespace_selector";
const MATCH_EXPRESSIONS: &str = "match_expressions";

const SELECTOR_OPERATORS: [&str; 4] = ["In", "NotIn", "Exists", "DoesNotExist"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    String,
    Number,
    StringList,
    /// A single nested block, sent as an object
    Block(&'static [RecipeParam]),
    /// A repeated nested block, sent as an array of objects
    BlockList(&'static [RecipeParam]),
}

/// One recipe input: the Terraform attribute name and its wire name
#[derive(Debug, PartialEq, Eq)]
pub struct RecipeParam {
    pub name: &'static str,
    pub wire: &'static str,
    pub kind: ParamKind,
}

impl RecipeParam {
    const fn new(name: &'static str, wire: &'static str, kind: ParamKind) -> Self {
        Self { name, wire, kind }
    }
}

#[derive(Debug)]
pub struct Recipe {
    /// Block name under `spec.input`
    pub block: &'static str,
    /// Recipe name sent to the API
    pub recipe: &'static str,
    pub params: &'static [RecipeParam],
}

const AUDIT: RecipeParam = RecipeParam::new("audit", "audit", ParamKind::Bool);

const DISABLE_NATIVE_PSP: RecipeParam =
    RecipeParam::new("disable_native_psp", "disableNativePsp", ParamKind::Bool);

const SECURITY_RECIPES: &[Recipe] = &[
    Recipe {
        block: "baseline",
        recipe: "baseline",
        params: &[AUDIT, DISABLE_NATIVE_PSP],
    },
    Recipe {
        block: "strict",
        recipe: "strict",
        params: &[AUDIT, DISABLE_NATIVE_PSP],
    },
    Recipe {
        block: "custom",
        recipe: "custom",
        params: &[
            AUDIT,
            DISABLE_NATIVE_PSP,
            RecipeParam::new("allow_privileged_containers", "allowPrivilegedContainers", ParamKind::Bool),
            RecipeParam::new("allow_privilege_escalation", "allowPrivilegeEscalation", ParamKind::Bool),
            RecipeParam::new("allow_host_network", "allowHostNetwork", ParamKind::Bool),
            RecipeParam::new("allow_host_pid", "allowHostPID", ParamKind::Bool),
            RecipeParam::new("read_only_root_file_system", "readOnlyRootFileSystem", ParamKind::Bool),
            RecipeParam::new("allowed_volumes", "allowedVolumes", ParamKind::StringList),
            RecipeParam::new("allowed_capabilities", "allowedCapabilities", ParamKind::StringList),
            RecipeParam::new("required_drop_capabilities", "requiredDropCapabilities", ParamKind::StringList),
        ],
    },
];

const IMAGE_TAG: RecipeParam = RecipeParam::new(
    "tag",
    "tag",
    ParamKind::Block(&[
        RecipeParam::new("negate", "negate", ParamKind::Bool),
        RecipeParam::new("value", "value", ParamKind::String),
    ]),
);

const IMAGE_RECIPES: &[Recipe] = &[
    Recipe {
        block: "block_latest_tag",
        recipe: "block-latest-tag",
        params: &[AUDIT],
    },
    Recipe {
        block: "require_digest",
        recipe: "require-digest",
        params: &[AUDIT],
    },
    Recipe {
        block: "allowed_name_tag",
        recipe: "allowed-name-tag",
        params: &[
            AUDIT,
            RecipeParam::new(
                "rules",
                "rules",
                ParamKind::BlockList(&[
                    RecipeParam::new("image_name", "imageName", ParamKind::String),
                    IMAGE_TAG,
                ]),
            ),
        ],
    },
    Recipe {
        block: "custom",
        recipe: "custom",
        params: &[
            AUDIT,
            RecipeParam::new(
                "rules",
                "rules",
                ParamKind::BlockList(&[
                    RecipeParam::new("hostname", "hostname", ParamKind::String),
                    RecipeParam::new("image_name", "imageName", ParamKind::String),
                    RecipeParam::new("port", "port", ParamKind::String),
                    RecipeParam::new("require_digest", "requireDigest", ParamKind::Bool),
                    IMAGE_TAG,
                ]),
            ),
        ],
    },
];

const NETWORK_RECIPES: &[Recipe] = &[
    Recipe {
        block: "allow_all",
        recipe: "allow-all",
        params: &[RecipeParam::new("from_own_namespace", "fromOwnNamespace", ParamKind::Bool)],
    },
    Recipe {
        block: "deny_all",
        recipe: "deny-all",
        params: &[],
    },
    Recipe {
        block: "allow_all_egress",
        recipe: "allow-all-egress",
        params: &[],
    },
    Recipe {
        block: "deny_all_egress",
        recipe: "deny-all-egress",
        params: &[],
    },
];

const QUOTA_RECIPES: &[Recipe] = &[
    Recipe {
        block: "small",
        recipe: "small",
        params: &[],
    },
    Recipe {
        block: "medium",
        recipe: "medium",
        params: &[],
    },
    Recipe {
        block: "large",
        recipe: "large",
        params: &[],
    },
    Recipe {
        block: "custom",
        recipe: "custom",
        params: &[
            RecipeParam::new("limits_cpu", "limitsCpu", ParamKind::String),
            RecipeParam::new("limits_memory", "limitsMemory", ParamKind::String),
            RecipeParam::new("requests_cpu", "requestsCpu", ParamKind::String),
            RecipeParam::new("requests_memory", "requestsMemory", ParamKind::String),
            RecipeParam::new("persistent_volume_claims", "persistentVolumeClaims", ParamKind::Number),
            RecipeParam::new("requests_storage", "requestsStorage", ParamKind::String),
        ],
    },
];

const TARGET_RESOURCES: RecipeParam = RecipeParam::new(
    "target_kubernetes_resources",
    "targetKubernetesResources",
    ParamKind::BlockList(&[
        RecipeParam::new("api_groups", "apiGroups", ParamKind::StringList),
        RecipeParam::new("kinds", "kinds", ParamKind::StringList),
    ]),
);

const CUSTOM_RECIPES: &[Recipe] = &[
    Recipe {
        block: "tmc_block_nodeport_service",
        recipe: "tmc-block-nodeport-service",
        params: &[AUDIT, TARGET_RESOURCES],
    },
    Recipe {
        block: "tmc_block_resources",
        recipe: "tmc-block-resources",
        params: &[AUDIT, TARGET_RESOURCES],
    },
    Recipe {
        block: "tmc_https_ingress",
        recipe: "tmc-https-ingress",
        params: &[AUDIT, TARGET_RESOURCES],
    },
    Recipe {
        block: "tmc_require_labels",
        recipe: "tmc-require-labels",
        params: &[
            AUDIT,
            RecipeParam::new(
                "parameters",
                "parameters",
                ParamKind::Block(&[RecipeParam::new(
                    "labels",
                    "labels",
                    ParamKind::BlockList(&[
                        RecipeParam::new("key", "key", ParamKind::String),
                        RecipeParam::new("value", "value", ParamKind::String),
                    ]),
                )]),
            ),
            TARGET_RESOURCES,
        ],
    },
    Recipe {
        block: "tmc_external_ips",
        recipe: "tmc-external-ips",
        params: &[
            AUDIT,
            RecipeParam::new(
                "parameters",
                "parameters",
                ParamKind::Block(&[RecipeParam::new("allowed_ips", "allowedIPs", ParamKind::StringList)]),
            ),
            TARGET_RESOURCES,
        ],
    },
    Recipe {
        block: "tmc_block_rolebinding_subjects",
        recipe: "tmc-block-rolebinding-subjects",
        params: &[
            AUDIT,
            RecipeParam::new(
                "parameters",
                "parameters",
                ParamKind::Block(&[RecipeParam::new(
                    "disallowed_subjects",
                    "disallowedSubjects",
                    ParamKind::BlockList(&[
                        RecipeParam::new("kind", "kind", ParamKind::String),
                        RecipeParam::new("name", "name", ParamKind::String),
                    ]),
                )]),
            ),
            TARGET_RESOURCES,
        ],
    },
];

const CLUSTER_SCOPES: &[ScopeKind] = &[
    ScopeKind::Cluster,
    ScopeKind::ClusterGroup,
    ScopeKind::Organization,
];

const WORKSPACE_SCOPES: &[ScopeKind] = &[ScopeKind::Workspace, ScopeKind::Organization];

/// The policy resource types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Security,
    Image,
    Network,
    NamespaceQuota,
    Custom,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 5] = [
        PolicyKind::Security,
        PolicyKind::Image,
        PolicyKind::Network,
        PolicyKind::NamespaceQuota,
        PolicyKind::Custom,
    ];

    fn suffix(&self) -> &'static str {
        match self {
            Self::Security => "security_policy",
            Self::Image => "image_policy",
            Self::Network => "network_policy",
            Self::NamespaceQuota => "namespace_quota_policy",
            Self::Custom => "custom_policy",
        }
    }

    /// Value of `spec.type` on the wire
    pub fn policy_type(&self) -> &'static str {
        match self {
            Self::Security => "security-policy",
            Self::Image => "image-policy",
            Self::Network => "network-policy",
            Self::NamespaceQuota => "namespace-quota-policy",
            Self::Custom => "custom-policy",
        }
    }

    pub fn scopes(&self) -> &'static [ScopeKind] {
        match self {
            Self::Image | Self::Network => WORKSPACE_SCOPES,
            Self::Security | Self::NamespaceQuota | Self::Custom => CLUSTER_SCOPES,
        }
    }

    pub fn recipes(&self) -> &'static [Recipe] {
        match self {
            Self::Security => SECURITY_RECIPES,
            Self::Image => IMAGE_RECIPES,
            Self::Network => NETWORK_RECIPES,
            Self::NamespaceQuota => QUOTA_RECIPES,
            Self::Custom => CUSTOM_RECIPES,
        }
    }

    /// Workspace-scoped kinds select namespaces through the workspace itself
    fn has_namespace_selector(&self) -> bool {
        !matches!(self, Self::Image | Self::Network)
    }

    fn recipe_by_wire_name(&self, name: &str) -> Option<&'static Recipe> {
        self.recipes().iter().find(|r| r.recipe == name)
    }
}

/// Schema block holding `params`, nested parameters becoming nested blocks
fn params_block(params: &[RecipeParam], description: &str) -> SchemaBlock {
    let mut block = SchemaBlock::new().with_description(description);
    for param in params {
        block = match param.kind {
            ParamKind::Bool => block.with_attribute(
                param.name,
                SchemaAttribute::bool().with_default(json!(false)).optional(),
            ),
            ParamKind::String => block.with_attribute(param.name, SchemaAttribute::string().optional()),
            ParamKind::Number => block.with_attribute(param.name, SchemaAttribute::number().optional()),
            ParamKind::StringList => block.with_attribute(
                param.name,
                SchemaAttribute::list(AttributeType::String).optional(),
            ),
            ParamKind::Block(inner) => block.with_block(
                param.name,
                NestedBlock::single(params_block(inner, &format!("{} parameters", param.name))),
            ),
            ParamKind::BlockList(inner) => block.with_block(
                param.name,
                NestedBlock::list(params_block(inner, &format!("{} entries", param.name))),
            ),
        };
    }
    block
}

fn input_block(kind: PolicyKind) -> NestedBlock {
    let mut block = SchemaBlock::new().with_description(&format!(
        "Input for the {} policy, one of: {}. Policies using other recipes are read with an empty input",
        kind.policy_type(),
        kind.recipes()
            .iter()
            .map(|r| r.block)
            .collect::<Vec<_>>()
            .join(", ")
    ));

    for recipe in kind.recipes() {
        let recipe_block = params_block(recipe.params, &format!("The {} recipe", recipe.recipe));
        block = block.with_block(recipe.block, NestedBlock::single(recipe_block));
    }

    NestedBlock::single(block).required()
}

fn namespace_selector_block() -> NestedBlock {
    let expression = SchemaBlock::new()
        .with_attribute(
            "key",
            SchemaAttribute::string()
                .with_description("Label key that the selector applies to")
                .required(),
        )
        .with_attribute(
            "operator",
            SchemaAttribute::string()
                .with_description("One of In, NotIn, Exists and DoesNotExist")
                .required(),
        )
        .with_attribute(
            "values",
            SchemaAttribute::list(AttributeType::String)
                .with_description("Label values; must be empty for Exists and DoesNotExist")
                .optional(),
        );

    NestedBlock::single(
        SchemaBlock::new()
            .with_block(MATCH_EXPRESSIONS, NestedBlock::list(expression).required())
            .with_description("Label based namespace selector for the policy"),
    )
}

fn spec_block(kind: PolicyKind) -> NestedBlock {
    let mut block = SchemaBlock::new()
        .with_block(INPUT, input_block(kind))
        .with_description("Spec for the policy");
    if kind.has_namespace_selector() {
        block = block.with_block(NAMESPACE_SELECTOR, namespace_selector_block());
    }
    NestedBlock::single(block).required()
}

/// Pick the populated recipe block and encode its parameters for the wire
fn construct_input(
    kind: PolicyKind,
    spec: &ResourceState,
) -> ResourceResult<(&'static Recipe, Value)> {
    let input = spec
        .get_block(INPUT)
        .ok_or_else(|| vec![invalid(&[SPEC, INPUT], "input block is required")])?;

    let names: Vec<&str> = kind.recipes().iter().map(|r| r.block).collect();
    let recipe = match populated_blocks(&input, &names).as_slice() {
        [one] => kind
            .recipes()
            .iter()
            .find(|r| r.block == *one)
            .ok_or_else(|| vec![invalid(&[SPEC, INPUT], "unknown recipe")])?,
        [] => {
            return Err(vec![invalid(
                &[SPEC, INPUT],
                &format!(
                    "no valid input recipe block found: one of {} must be specified",
                    names.join(", ")
                ),
            )])
        }
        many => {
            return Err(vec![invalid(
                &[SPEC, INPUT],
                &format!(
                    "found recipes: {}, but only one of {} is allowed",
                    many.join(", "),
                    names.join(", ")
                ),
            )])
        }
    };

    if recipe.params.is_empty() {
        return Ok((recipe, Value::Null));
    }

    let params = input.get_block(recipe.block).unwrap_or_default();
    let wire = construct_params(recipe.params, &params, &[SPEC, INPUT, recipe.block])?;
    Ok((recipe, Value::Object(wire)))
}

/// Encode the set parameters of one (possibly nested) block for the wire
fn construct_params(
    params: &[RecipeParam],
    values: &ResourceState,
    path: &[&str],
) -> ResourceResult<Map<String, Value>> {
    let mut wire = Map::new();
    for param in params {
        let mut param_path = path.to_vec();
        param_path.push(param.name);

        let value = match param.kind {
            ParamKind::Block(inner) => match values.get_block(param.name) {
                Some(block) => Value::Object(construct_params(inner, &block, &param_path)?),
                None => continue,
            },
            ParamKind::BlockList(inner) => {
                let blocks = values.get_blocks(param.name);
                if blocks.is_empty() {
                    continue;
                }
                let mut entries = Vec::with_capacity(blocks.len());
                for block in &blocks {
                    entries.push(Value::Object(construct_params(inner, block, &param_path)?));
                }
                Value::Array(entries)
            }
            scalar => match (scalar, values.get(param.name)) {
                (_, None | Some(Value::Null)) => continue,
                (ParamKind::String, Some(Value::String(s))) if s.is_empty() => continue,
                (ParamKind::Bool, Some(v @ Value::Bool(_)))
                | (ParamKind::String, Some(v @ Value::String(_)))
                | (ParamKind::Number, Some(v @ Value::Number(_)))
                | (ParamKind::StringList, Some(v @ Value::Array(_))) => v.clone(),
                (_, Some(other)) => {
                    return Err(vec![invalid(
                        &param_path,
                        &format!("unexpected value {} for {}", other, param.name),
                    )])
                }
            },
        };
        wire.insert(param.wire.to_string(), value);
    }
    Ok(wire)
}

/// Decode wire parameters back into Terraform attributes and blocks
fn flatten_params(params: &[RecipeParam], wire: &Value) -> ResourceState {
    let mut state = ResourceState::new();
    for param in params {
        let value = wire.get(param.wire);
        let flattened = match param.kind {
            ParamKind::Bool => value.cloned().unwrap_or(Value::Bool(false)),
            ParamKind::Block(inner) => match value {
                Some(obj @ Value::Object(_)) => single_block(flatten_params(inner, obj)),
                _ => json!([]),
            },
            ParamKind::BlockList(inner) => Value::Array(
                value
                    .and_then(|v| v.as_array())
                    .map(|entries| {
                        entries
                            .iter()
                            .map(|entry| flatten_params(inner, entry).into_value())
                            .collect()
                    })
                    .unwrap_or_default(),
            ),
            _ => value.cloned().unwrap_or(Value::Null),
        };
        state.set(param.name, flattened);
    }
    state
}

fn flatten_input(kind: PolicyKind, spec: &PolicySpec) -> Value {
    let mut input = ResourceState::new();

    match kind.recipe_by_wire_name(&spec.recipe) {
        Some(recipe) => {
            input.set(recipe.block, single_block(flatten_params(recipe.params, &spec.input)));
        }
        None => warn!(
            policy_type = kind.policy_type(),
            recipe = %spec.recipe,
            "policy uses a recipe this provider does not manage"
        ),
    }

    single_block(input)
}

fn construct_namespace_selector(spec: &ResourceState) -> ResourceResult<Option<LabelSelector>> {
    let Some(selector) = spec.get_block(NAMESPACE_SELECTOR) else {
        return Ok(None);
    };

    let mut match_expressions = Vec::new();
    for expression in selector.get_blocks(MATCH_EXPRESSIONS) {
        let operator = expression.get_string("operator").unwrap_or_default();
        let values = expression.get_string_list("values");
        let path = [SPEC, NAMESPACE_SELECTOR, MATCH_EXPRESSIONS, "operator"];

        if !SELECTOR_OPERATORS.contains(&operator.as_str()) {
            return Err(vec![invalid(
                &path,
                &format!(
                    "invalid operator {:?}, expected one of {}",
                    operator,
                    SELECTOR_OPERATORS.join(", ")
                ),
            )]);
        }
        let takes_values = operator == "In" || operator == "NotIn";
        if takes_values == values.is_empty() {
            return Err(vec![invalid(
                &path,
                &format!(
                    "operator {} {} values",
                    operator,
                    if takes_values { "requires" } else { "does not accept" }
                ),
            )]);
        }

        match_expressions.push(LabelSelectorRequirement {
            key: expression.get_string("key").unwrap_or_default(),
            operator,
            values,
        });
    }

    Ok(Some(LabelSelector { match_expressions }))
}

fn flatten_namespace_selector(selector: &LabelSelector) -> Value {
    let expressions: Vec<Value> = selector
        .match_expressions
        .iter()
        .map(|e| json!({"key": e.key, "operator": e.operator, "values": e.values}))
        .collect();

    let mut block = ResourceState::new();
    block.set(MATCH_EXPRESSIONS, Value::Array(expressions));
    single_block(block)
}

fn construct_spec(kind: PolicyKind, state: &ResourceState) -> ResourceResult<PolicySpec> {
    let spec = state
        .get_block(SPEC)
        .ok_or_else(|| vec![invalid(&[SPEC], "spec block is required")])?;
    let (recipe, input) = construct_input(kind, &spec)?;
    let namespace_selector = if kind.has_namespace_selector() {
        construct_namespace_selector(&spec)?
    } else {
        None
    };

    Ok(PolicySpec {
        policy_type: kind.policy_type().to_string(),
        recipe: recipe.recipe.to_string(),
        recipe_version: None,
        input,
        namespace_selector,
    })
}

fn flatten_spec(kind: PolicyKind, spec: &PolicySpec) -> Value {
    let mut block = ResourceState::new();
    block.set(INPUT, flatten_input(kind, spec));
    if let Some(selector) = spec
        .namespace_selector
        .as_ref()
        .filter(|s| !s.match_expressions.is_empty())
    {
        block.set(NAMESPACE_SELECTOR, flatten_namespace_selector(selector));
    }
    single_block(block)
}

pub fn construct_policy(
    kind: PolicyKind,
    state: &ResourceState,
    org_id: Option<&str>,
) -> ResourceResult<Policy> {
    let scope = construct_scope(state, kind.scopes(), org_id)?;
    let name = state
        .get_non_empty("name")
        .ok_or_else(|| vec![invalid(&["name"], "name is required")])?;

    Ok(Policy {
        full_name: PolicyFullName::new(&scope, name),
        meta: construct_meta(state),
        spec: construct_spec(kind, state)?,
    })
}

/// Flatten `policy`, reporting `requested` as the scope when the response
/// does not name its parent
pub fn flatten_policy(kind: PolicyKind, policy: &Policy, requested: &Scope) -> ResourceState {
    let mut state = ResourceState::new();
    state.set(
        "id",
        json!(policy
            .meta
            .uid
            .clone()
            .unwrap_or_else(|| policy.full_name.name.clone())),
    );
    state.set("name", json!(policy.full_name.name));
    state.set(SCOPE, flatten_scope(&reported_scope(&policy.full_name, requested)));
    state.set(META, flatten_meta(&policy.meta));
    state.set(SPEC, flatten_spec(kind, &policy.spec));
    state
}

/// A policy resource of one [`PolicyKind`]
pub struct PolicyResource {
    kind: PolicyKind,
    type_name: String,
}

impl PolicyResource {
    pub fn new(kind: PolicyKind) -> Self {
        Self {
            kind,
            type_name: format!("{}_{}", TYPE_PREFIX, kind.suffix()),
        }
    }

    fn full_name(&self, state: &ResourceState, client: &TmcClient) -> ResourceResult<(Scope, PolicyFullName)> {
        let scope = construct_scope(state, self.kind.scopes(), client.org_id())?;
        let name = state.get_string("name").unwrap_or_default();
        let full_name = PolicyFullName::new(&scope, name);
        Ok((scope, full_name))
    }

    fn describe(&self, full_name: &PolicyFullName) -> String {
        format!("{} entry, name : {}", self.kind.policy_type(), full_name.name)
    }
}

#[async_trait]
impl Resource for PolicyResource {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Unique identifier of the policy")
                    .computed(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the policy")
                    .required()
                    .force_new(),
            )
            .with_block(SCOPE, scope_block(self.kind.scopes()))
            .with_block(META, meta_block())
            .with_block(SPEC, spec_block(self.kind))
            .with_description(&format!(
                "Tanzu Mission Control {}",
                self.kind.policy_type().replace('-', " ")
            ));

        ResourceSchema::new(0, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let mut diags = validate_scope(config, self.kind.scopes());
        if let Err(mut d) = construct_spec(self.kind, config) {
            diags.append(&mut d);
        }
        diags
    }

    async fn create(
        &self,
        client: &TmcClient,
        planned: &ResourceState,
    ) -> ResourceResult<CreateOutcome> {
        let request = construct_policy(self.kind, planned, client.org_id())?;
        let scope = request.full_name.scope();
        debug!(
            policy_type = self.kind.policy_type(),
            name = %request.full_name.name,
            scope = %scope.kind(),
            "creating policy"
        );

        let policy = client
            .create_policy(&request)
            .await
            .map_err(|e| client_diagnostic("create", &self.describe(&request.full_name), &e))?;
        Ok(flatten_policy(self.kind, &policy, &scope).into())
    }

    async fn read(
        &self,
        client: &TmcClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (scope, full_name) = self.full_name(current, client)?;

        match client.get_policy(&full_name).await {
            Ok(policy) => Ok(flatten_policy(self.kind, &policy, &scope)),
            Err(e) if e.is_not_found() => Ok(ResourceState::new()),
            Err(e) => Err(client_diagnostic("get", &self.describe(&full_name), &e)),
        }
    }

    async fn update(
        &self,
        client: &TmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (scope, full_name) = self.full_name(current, client)?;
        let spec = construct_spec(self.kind, planned)?;

        let mut policy = client
            .get_policy(&full_name)
            .await
            .map_err(|e| client_diagnostic("get", &self.describe(&full_name), &e))?;
        merge_meta(&mut policy.meta, &construct_meta(planned));
        policy.spec = spec;

        let updated = client
            .update_policy(&policy)
            .await
            .map_err(|e| client_diagnostic("update", &self.describe(&full_name), &e))?;
        Ok(flatten_policy(self.kind, &updated, &scope))
    }

    async fn delete(&self, client: &TmcClient, current: &ResourceState) -> ResourceResult<()> {
        let (_, full_name) = self.full_name(current, client)?;
        debug!(policy_type = self.kind.policy_type(), name = %full_name.name, "deleting policy");

        match client.delete_policy(&full_name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(client_diagnostic("delete", &self.describe(&full_name), &e)),
        }
    }

    fn import_state(&self, id: &str) -> ResourceResult<ResourceState> {
        let (scope, name) = parse_scoped_import_id(id, self.kind.scopes())?;
        let mut state = ResourceState::new();
        state.set("name", json!(name));
        state.set(SCOPE, flatten_scope(&scope));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn security_config(input: Value) -> ResourceState {
        let mut state = ResourceState::new();
        state.set("name", json!("tf-baseline"));
        state.set(SCOPE, json!([{"cluster_group": [{"cluster_group": "default"}]}]));
        state.set(
            SPEC,
            json!([{
                "input": input,
                "namespace_selector": [{
                    "match_expressions": [
                        {"key": "env", "operator": "In", "values": ["dev", "test"]},
                        {"key": "legacy", "operator": "DoesNotExist", "values": []}
                    ]
                }]
            }]),
        );
        state
    }

    #[test]
    fn test_type_names() {
        let names: Vec<String> = PolicyKind::ALL
            .iter()
            .map(|k| PolicyResource::new(*k).type_name().to_string())
            .collect();
        assert!(names.contains(&"tanzu-mission-control_security_policy".to_string()));
        assert!(names.contains(&"tanzu-mission-control_namespace_quota_policy".to_string()));
    }

    #[test]
    fn test_construct_security_policy() {
        let state = security_config(json!([{"baseline": [{"audit": true, "disable_native_psp": false}]}]));
        let policy = construct_policy(PolicyKind::Security, &state, None).unwrap();

        assert_eq!(policy.full_name.cluster_group_name.as_deref(), Some("default"));
        assert_eq!(policy.spec.policy_type, "security-policy");
        assert_eq!(policy.spec.recipe, "baseline");
        assert_eq!(policy.spec.input, json!({"audit": true, "disableNativePsp": false}));

        let selector = policy.spec.namespace_selector.unwrap();
        assert_eq!(selector.match_expressions.len(), 2);
        assert_eq!(selector.match_expressions[0].values, vec!["dev", "test"]);
    }

    #[test]
    fn test_round_trip_preserves_visible_fields() {
        let state = security_config(json!([{"strict": [{"audit": false, "disable_native_psp": true}]}]));
        let policy = construct_policy(PolicyKind::Security, &state, None).unwrap();
        let scope = policy.full_name.scope();

        let flattened = flatten_policy(PolicyKind::Security, &policy, &scope);
        let again = construct_policy(PolicyKind::Security, &flattened, None).unwrap();
        assert_eq!(again.full_name, policy.full_name);
        assert_eq!(again.spec, policy.spec);
    }

    #[test]
    fn test_empty_recipe_block_selects_recipe() {
        let mut state = ResourceState::new();
        state.set("name", json!("deny"));
        state.set(SCOPE, json!([{"workspace": [{"workspace": "ws"}]}]));
        state.set(SPEC, json!([{"input": [{"deny_all": [{}]}]}]));

        let policy = construct_policy(PolicyKind::Network, &state, None).unwrap();
        assert_eq!(policy.spec.recipe, "deny-all");
        assert!(policy.spec.input.is_null());
        assert!(policy.spec.namespace_selector.is_none());
    }

    #[test]
    fn test_rejects_zero_or_multiple_recipes() {
        let none = security_config(json!([{}]));
        let diags = PolicyResource::new(PolicyKind::Security).validate(&none);
        assert!(diags[0].summary.contains("no valid input recipe block found"));

        let both = security_config(json!([{"baseline": [{}], "strict": [{}]}]));
        let diags = PolicyResource::new(PolicyKind::Security).validate(&both);
        assert!(diags[0].summary.contains("found recipes: baseline, strict"));
    }

    #[test]
    fn test_rejects_unsupported_scope() {
        let mut state = security_config(json!([{"baseline": [{}]}]));
        state.set(SCOPE, json!([{"workspace": [{"workspace": "ws"}]}]));
        let diags = PolicyResource::new(PolicyKind::Security).validate(&state);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("workspace scope is not supported"));
    }

    #[test]
    fn test_selector_operator_rules() {
        let mut state = security_config(json!([{"baseline": [{}]}]));
        state.set(
            SPEC,
            json!([{
                "input": [{"baseline": [{}]}],
                "namespace_selector": [{"match_expressions": [{"key": "a", "operator": "Exists", "values": ["x"]}]}]
            }]),
        );
        let diags = PolicyResource::new(PolicyKind::Security).validate(&state);
        assert!(diags[0].summary.contains("does not accept values"));

        state.set(
            SPEC,
            json!([{
                "input": [{"baseline": [{}]}],
                "namespace_selector": [{"match_expressions": [{"key": "a", "operator": "Matches"}]}]
            }]),
        );
        let diags = PolicyResource::new(PolicyKind::Security).validate(&state);
        assert!(diags[0].summary.contains("invalid operator"));
    }

    #[test]
    fn test_custom_quota_input() {
        let mut state = ResourceState::new();
        state.set("name", json!("quota"));
        state.set(SCOPE, json!([{"cluster": [{"name": "dev"}]}]));
        state.set(
            SPEC,
            json!([{"input": [{"custom": [{
                "limits_cpu": "4",
                "limits_memory": "8Gi",
                "requests_cpu": "",
                "persistent_volume_claims": 2
            }]}]}]),
        );

        let policy = construct_policy(PolicyKind::NamespaceQuota, &state, None).unwrap();
        assert_eq!(policy.spec.policy_type, "namespace-quota-policy");
        assert_eq!(
            policy.spec.input,
            json!({"limitsCpu": "4", "limitsMemory": "8Gi", "persistentVolumeClaims": 2})
        );

        let flattened = flatten_policy(PolicyKind::NamespaceQuota, &policy, &policy.full_name.scope());
        let spec = flattened.get_block(SPEC).unwrap();
        let custom = spec.get_block(INPUT).unwrap().get_block("custom").unwrap();
        assert_eq!(custom.get_i64("persistent_volume_claims"), Some(2));
        assert_eq!(custom.get("requests_cpu"), Some(&Value::Null));
    }

    #[test]
    fn test_wrong_parameter_type() {
        let state = security_config(json!([{"baseline": [{"audit": "yes"}]}]));
        let diags = PolicyResource::new(PolicyKind::Security).validate(&state);
        assert_eq!(
            diags[0].attribute,
            Some(vec![
                "spec".to_string(),
                "input".to_string(),
                "baseline".to_string(),
                "audit".to_string()
            ])
        );
    }

    #[test]
    fn test_image_name_tag_rules() {
        let mut state = ResourceState::new();
        state.set("name", json!("pinned"));
        state.set(SCOPE, json!([{"workspace": [{"workspace": "apps"}]}]));
        state.set(
            SPEC,
            json!([{"input": [{"allowed_name_tag": [{
                "audit": false,
                "rules": [
                    {"image_name": "nginx", "tag": [{"negate": true, "value": "latest"}]},
                    {"image_name": "redis", "tag": []}
                ]
            }]}]}]),
        );

        let policy = construct_policy(PolicyKind::Image, &state, None).unwrap();
        assert_eq!(policy.spec.recipe, "allowed-name-tag");
        assert_eq!(
            policy.spec.input,
            json!({
                "audit": false,
                "rules": [
                    {"imageName": "nginx", "tag": {"negate": true, "value": "latest"}},
                    {"imageName": "redis"}
                ]
            })
        );

        let flattened = flatten_policy(PolicyKind::Image, &policy, &policy.full_name.scope());
        let spec = flattened.get_block(SPEC).unwrap();
        let recipe = spec.get_block(INPUT).unwrap().get_block("allowed_name_tag").unwrap();
        let rules = recipe.get_blocks("rules");
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].get_string("image_name"), Some("nginx".to_string()));
        let tag = rules[0].get_block("tag").unwrap();
        assert_eq!(tag.get_bool("negate"), Some(true));
        assert_eq!(tag.get_string("value"), Some("latest".to_string()));
        assert!(rules[1].get_block("tag").is_none());
    }

    #[test]
    fn test_target_resources_and_parameters() {
        let mut state = ResourceState::new();
        state.set("name", json!("labels"));
        state.set(SCOPE, json!([{"cluster_group": [{"cluster_group": "prod"}]}]));
        state.set(
            SPEC,
            json!([{"input": [{"tmc_require_labels": [{
                "audit": true,
                "parameters": [{"labels": [{"key": "team", "value": ""}]}],
                "target_kubernetes_resources": [
                    {"api_groups": ["apps"], "kinds": ["Deployment", "StatefulSet"]}
                ]
            }]}]}]),
        );

        let policy = construct_policy(PolicyKind::Custom, &state, None).unwrap();
        assert_eq!(policy.spec.recipe, "tmc-require-labels");
        assert_eq!(
            policy.spec.input,
            json!({
                "audit": true,
                "parameters": {"labels": [{"key": "team"}]},
                "targetKubernetesResources": [
                    {"apiGroups": ["apps"], "kinds": ["Deployment", "StatefulSet"]}
                ]
            })
        );

        let flattened = flatten_policy(PolicyKind::Custom, &policy, &policy.full_name.scope());
        let again = construct_policy(PolicyKind::Custom, &flattened, None).unwrap();
        assert_eq!(again.spec, policy.spec);
    }

    #[test]
    fn test_nested_parameter_type_error_path() {
        let mut state = ResourceState::new();
        state.set("name", json!("ips"));
        state.set(SCOPE, json!([{"cluster": [{"name": "dev"}]}]));
        state.set(
            SPEC,
            json!([{"input": [{"tmc_external_ips": [{
                "parameters": [{"allowed_ips": "10.0.0.1"}]
            }]}]}]),
        );

        let diags = PolicyResource::new(PolicyKind::Custom).validate(&state);
        assert_eq!(diags.len(), 1);
        assert_eq!(
            diags[0].attribute,
            Some(
                ["spec", "input", "tmc_external_ips", "parameters", "allowed_ips"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            )
        );
    }

    #[test]
    fn test_security_custom_recipe_schema() {
        let schema = PolicyResource::new(PolicyKind::Security).schema();
        let spec = serde_json::to_value(&schema).unwrap();
        let text = spec.to_string();
        assert!(text.contains("allow_privileged_containers"));
        assert!(text.contains("required_drop_capabilities"));

        let state = security_config(json!([{"custom": [{
            "allow_privilege_escalation": false,
            "allowed_volumes": ["configMap", "secret"]
        }]}]));
        let policy = construct_policy(PolicyKind::Security, &state, None).unwrap();
        assert_eq!(policy.spec.recipe, "custom");
        assert_eq!(
            policy.spec.input,
            json!({"allowPrivilegeEscalation": false, "allowedVolumes": ["configMap", "secret"]})
        );
    }

    #[test]
    fn test_import_state() {
        let resource = PolicyResource::new(PolicyKind::Image);
        let state = resource.import_state("workspace:apps/no-latest").unwrap();
        assert_eq!(state.get_string("name"), Some("no-latest".to_string()));
        let scope = construct_scope(&state, PolicyKind::Image.scopes(), None).unwrap();
        assert_eq!(scope.kind(), ScopeKind::Workspace);

        assert!(resource.import_state("cluster:dev/no-latest").is_err());
    }
}
