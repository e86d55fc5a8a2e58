//! Policy models
//!
//! Every policy kind shares one wire shape: a `type`, a `recipe` naming the
//! template, and a free-form `input` object whose layout depends on the recipe.

use crate::scope::ScopedFullName;
use crate::Meta;
use serde::{Deserialize, Serialize};

pub type PolicyFullName = ScopedFullName;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    #[serde(rename = "type")]
    pub policy_type: String,
    pub recipe: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe_version: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub input: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub full_name: PolicyFullName,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: PolicySpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub policy: Policy,
}

pub type PolicyResponse = PolicyRequest;
