//! Terraform Schema Types
//!
//! Defines the schema types and the JSON-RPC plugin envelope spoken over
//! stdin/stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Attribute type for schema
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Number,
    Bool,
    List(Box<AttributeType>),
    Set(Box<AttributeType>),
    Map(Box<AttributeType>),
    Object(HashMap<String, AttributeType>),
}

/// Schema attribute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaAttribute {
    #[serde(rename = "type")]
    pub attr_type: AttributeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub computed: bool,
    #[serde(default)]
    pub sensitive: bool,
    /// Changing the value destroys and recreates the resource
    #[serde(default)]
    pub force_new: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl SchemaAttribute {
    fn of(attr_type: AttributeType) -> Self {
        Self {
            attr_type,
            description: None,
            required: false,
            optional: false,
            computed: false,
            sensitive: false,
            force_new: false,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::of(AttributeType::String)
    }

    pub fn number() -> Self {
        Self::of(AttributeType::Number)
    }

    pub fn bool() -> Self {
        Self::of(AttributeType::Bool)
    }

    pub fn list(element_type: AttributeType) -> Self {
        Self::of(AttributeType::List(Box::new(element_type)))
    }

    pub fn map(element_type: AttributeType) -> Self {
        Self::of(AttributeType::Map(Box::new(element_type)))
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self.optional = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self.required = false;
        self
    }

    pub fn computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }
}

/// Block type for nested blocks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaBlock {
    pub attributes: HashMap<String, SchemaAttribute>,
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub blocks: HashMap<String, NestedBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl SchemaBlock {
    pub fn new() -> Self {
        Self {
            attributes: HashMap::new(),
            blocks: HashMap::new(),
            description: None,
        }
    }

    pub fn with_attribute(mut self, name: &str, attr: SchemaAttribute) -> Self {
        self.attributes.insert(name.to_string(), attr);
        self
    }

    pub fn with_block(mut self, name: &str, block: NestedBlock) -> Self {
        self.blocks.insert(name.to_string(), block);
        self
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = Some(desc.to_string());
        self
    }
}

impl Default for SchemaBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Nested block type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedBlock {
    pub nesting_mode: NestingMode,
    pub block: SchemaBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<i64>,
    #[serde(default)]
    pub force_new: bool,
}

impl NestedBlock {
    /// A list block holding at most one element
    pub fn single(block: SchemaBlock) -> Self {
        Self {
            nesting_mode: NestingMode::List,
            block,
            min_items: None,
            max_items: Some(1),
            force_new: false,
        }
    }

    pub fn list(block: SchemaBlock) -> Self {
        Self {
            nesting_mode: NestingMode::List,
            block,
            min_items: None,
            max_items: None,
            force_new: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.min_items = Some(1);
        self
    }

    pub fn force_new(mut self) -> Self {
        self.force_new = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingMode {
    Single,
    List,
    Set,
    Map,
}

/// Resource schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub version: i64,
    pub block: SchemaBlock,
}

impl ResourceSchema {
    pub fn new(version: i64, block: SchemaBlock) -> Self {
        Self { version, block }
    }

    /// Top-level attribute and block names whose change forces replacement
    /// between `prior` and `planned`.
    pub fn requires_replace(
        &self,
        prior: &HashMap<String, Value>,
        planned: &HashMap<String, Value>,
    ) -> Vec<Vec<String>> {
        let attrs = self
            .block
            .attributes
            .iter()
            .filter(|(_, attr)| attr.force_new)
            .map(|(name, _)| name);
        let blocks = self
            .block
            .blocks
            .iter()
            .filter(|(_, block)| block.force_new)
            .map(|(name, _)| name);

        let mut paths: Vec<Vec<String>> = attrs
            .chain(blocks)
            .filter(|name| {
                normalize(prior.get(name.as_str())) != normalize(planned.get(name.as_str()))
            })
            .map(|name| vec![name.clone()])
            .collect();

        // Force-new attributes inside single-element blocks
        for (name, nested) in &self.block.blocks {
            if nested.force_new || nested.max_items != Some(1) {
                continue;
            }
            let prior_block = first_element(prior.get(name));
            let planned_block = first_element(planned.get(name));
            for (attr_name, attr) in &nested.block.attributes {
                if !attr.force_new {
                    continue;
                }
                let before = prior_block.and_then(|b| b.get(attr_name));
                let after = planned_block.and_then(|b| b.get(attr_name));
                if normalize(before) != normalize(after) {
                    paths.push(vec![name.clone(), attr_name.clone()]);
                }
            }
        }

        paths.sort();
        paths
    }
}

fn first_element(value: Option<&Value>) -> Option<&serde_json::Map<String, Value>> {
    match value? {
        Value::Array(items) => items.first().and_then(|v| v.as_object()),
        Value::Object(obj) => Some(obj),
        _ => None,
    }
}

/// Treat absent, null and empty values as the same thing when diffing.
fn normalize(value: Option<&Value>) -> Option<&Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(Value::Array(a)) if a.is_empty() => None,
        other => other,
    }
}

/// Provider schema
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSchema {
    pub provider: SchemaBlock,
    pub resource_schemas: HashMap<String, ResourceSchema>,
    pub data_source_schemas: HashMap<String, ResourceSchema>,
}

impl ProviderSchema {
    pub fn new(provider: SchemaBlock) -> Self {
        Self {
            provider,
            resource_schemas: HashMap::new(),
            data_source_schemas: HashMap::new(),
        }
    }

    pub fn with_resource(mut self, name: &str, schema: ResourceSchema) -> Self {
        self.resource_schemas.insert(name.to_string(), schema);
        self
    }

    pub fn with_data_source(mut self, name: &str, schema: ResourceSchema) -> Self {
        self.data_source_schemas.insert(name.to_string(), schema);
        self
    }
}

// ============================================================================
// Terraform Plugin Protocol Messages
// ============================================================================

/// JSON-RPC request
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// JSON-RPC response
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error
#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INTERNAL_ERROR: i32 = -32603;

impl RpcResponse {
    pub fn success(id: i64, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: i64, code: i32, message: &str) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.to_string(),
                data: None,
            }),
        }
    }

    /// Successful call that only carries diagnostics
    pub fn diagnostics(id: i64, diagnostics: Vec<Diagnostic>) -> Self {
        Self::success(id, serde_json::json!({ "diagnostics": diagnostics }))
    }
}

/// Diagnostic severity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticSeverity {
    Invalid,
    Error,
    Warning,
}

/// Diagnostic message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<Vec<String>>,
}

impl Diagnostic {
    pub fn error(summary: &str) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.to_string(),
            detail: None,
            attribute: None,
        }
    }

    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }

    pub fn with_attribute(mut self, path: &[&str]) -> Self {
        self.attribute = Some(path.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_attribute_builder() {
        let attr = SchemaAttribute::string()
            .with_description("Test attribute")
            .required()
            .sensitive()
            .force_new();

        assert!(attr.required);
        assert!(attr.sensitive);
        assert!(attr.force_new);
        assert_eq!(attr.description, Some("Test attribute".to_string()));
    }

    #[test]
    fn test_single_block_limits() {
        let block = NestedBlock::single(SchemaBlock::new()).required();
        assert_eq!(block.min_items, Some(1));
        assert_eq!(block.max_items, Some(1));
    }

    #[test]
    fn test_requires_replace_only_force_new() {
        let schema = ResourceSchema::new(
            1,
            SchemaBlock::new()
                .with_attribute("name", SchemaAttribute::string().required().force_new())
                .with_attribute("description", SchemaAttribute::string().optional())
                .with_block(
                    "scope",
                    NestedBlock::single(SchemaBlock::new()).force_new(),
                ),
        );

        let prior: HashMap<String, Value> = [
            ("name".to_string(), json!("a")),
            ("description".to_string(), json!("x")),
            ("scope".to_string(), json!([{"cluster_group": [{"cluster_group": "g1"}]}])),
        ]
        .into();
        let mut planned = prior.clone();
        planned.insert("description".to_string(), json!("y"));
        assert!(schema.requires_replace(&prior, &planned).is_empty());

        planned.insert("name".to_string(), json!("b"));
        planned.insert(
            "scope".to_string(),
            json!([{"cluster_group": [{"cluster_group": "g2"}]}]),
        );
        assert_eq!(
            schema.requires_replace(&prior, &planned),
            vec![vec!["name".to_string()], vec!["scope".to_string()]]
        );
    }

    #[test]
    fn test_requires_replace_inside_single_block() {
        let schema = ResourceSchema::new(
            1,
            SchemaBlock::new().with_block(
                "spec",
                NestedBlock::single(
                    SchemaBlock::new()
                        .with_attribute("provider_type", SchemaAttribute::string().required().force_new())
                        .with_attribute("group", SchemaAttribute::string().optional()),
                ),
            ),
        );

        let prior: HashMap<String, Value> =
            [("spec".to_string(), json!([{"provider_type": "A", "group": "g"}]))].into();
        let planned: HashMap<String, Value> =
            [("spec".to_string(), json!([{"provider_type": "A", "group": "h"}]))].into();
        assert!(schema.requires_replace(&prior, &planned).is_empty());

        let planned: HashMap<String, Value> =
            [("spec".to_string(), json!([{"provider_type": "B", "group": "g"}]))].into();
        assert_eq!(
            schema.requires_replace(&prior, &planned),
            vec![vec!["spec".to_string(), "provider_type".to_string()]]
        );
    }

    #[test]
    fn test_null_and_empty_string_are_equal() {
        let schema = ResourceSchema::new(
            1,
            SchemaBlock::new().with_attribute("proxy", SchemaAttribute::string().force_new()),
        );
        let prior: HashMap<String, Value> = [("proxy".to_string(), json!(""))].into();
        let planned: HashMap<String, Value> = [("proxy".to_string(), Value::Null)].into();
        assert!(schema.requires_replace(&prior, &planned).is_empty());
    }

    #[test]
    fn test_rpc_response_error() {
        let response = RpcResponse::error(1, -32600, "Invalid request");
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().code, -32600);
    }

    #[test]
    fn test_diagnostics_response() {
        let response = RpcResponse::diagnostics(3, vec![Diagnostic::error("boom")]);
        let result = response.result.unwrap();
        assert_eq!(result["diagnostics"][0]["severity"], "ERROR");
        assert_eq!(result["diagnostics"][0]["summary"], "boom");
    }
}
