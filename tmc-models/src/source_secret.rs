//! Source secret (repository credential) models

use crate::scope::ScopedFullName;
use crate::{parse_enum, Meta};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub type SourceSecretFullName = ScopedFullName;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceSecretType {
    #[default]
    UsernamePassword,
    Ssh,
}

impl FromStr for SourceSecretType {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        parse_enum("source_secret_type", s)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsernamePasswordData {
    pub username: String,
    /// Base64 encoded on the wire
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyData {
    #[serde(default)]
    pub identity: String,
    #[serde(default)]
    pub known_hosts: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSecretData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_password_data: Option<UsernamePasswordData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssh_key: Option<SshKeyData>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSecretSpec {
    pub source_secret_type: SourceSecretType,
    #[serde(default)]
    pub data: SourceSecretData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSecret {
    pub full_name: SourceSecretFullName,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub spec: SourceSecretSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSecretRequest {
    pub source_secret: SourceSecret,
}

pub type SourceSecretResponse = SourceSecretRequest;
