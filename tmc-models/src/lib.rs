//! Typed models for the Tanzu Mission Control v1alpha1 REST API
//!
//! Every entity is keyed by a full name and carries a [`Meta`] block. Field
//! names follow the API's camelCase wire format.

pub mod auth;
pub mod cluster;
pub mod helm_repository;
pub mod management_cluster;
pub mod policy;
pub mod provisioner;
pub mod scope;
pub mod source_secret;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Object metadata shared by every TMC entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

/// Lifecycle phase reported by the API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    PhaseUnspecified,
    Pending,
    Processing,
    Creating,
    Ready,
    Deleting,
    Error,
    Detaching,
    Upgrading,
    AttachComplete,
    Updating,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PhaseUnspecified => "PHASE_UNSPECIFIED",
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Creating => "CREATING",
            Self::Ready => "READY",
            Self::Deleting => "DELETING",
            Self::Error => "ERROR",
            Self::Detaching => "DETACHING",
            Self::Upgrading => "UPGRADING",
            Self::AttachComplete => "ATTACH_COMPLETE",
            Self::Updating => "UPDATING",
            Self::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Health summary reported by the API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    Healthy,
    Warning,
    Unhealthy,
    Disconnected,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Health {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "HEALTHY"),
            Self::Warning => write!(f, "WARNING"),
            Self::Unhealthy => write!(f, "UNHEALTHY"),
            Self::Disconnected => write!(f, "DISCONNECTED"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Model conversion errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid value {value:?} for {field}")]
    InvalidValue { field: &'static str, value: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Parse a SCREAMING_SNAKE_CASE enum value through its serde representation.
pub(crate) fn parse_enum<T: serde::de::DeserializeOwned>(field: &'static str, value: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(value.to_string())).map_err(|_| {
        Error::InvalidValue {
            field,
            value: value.to_string(),
        }
    })
}

impl FromStr for Phase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_enum("phase", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_phase_falls_back() {
        let phase: Phase = serde_json::from_str("\"SOMETHING_NEW\"").unwrap();
        assert_eq!(phase, Phase::Unknown);

        let phase: Phase = serde_json::from_str("\"ATTACH_COMPLETE\"").unwrap();
        assert_eq!(phase, Phase::AttachComplete);
        assert_eq!(phase.to_string(), "ATTACH_COMPLETE");
    }

    #[test]
    fn test_meta_skips_empty_fields() {
        let meta = Meta {
            description: Some("managed by terraform".to_string()),
            ..Default::default()
        };

        let json = serde_json::to_value(&meta).unwrap();
        assert_eq!(json, serde_json::json!({"description": "managed by terraform"}));
    }

    #[test]
    fn test_meta_parses_api_payload() {
        let meta: Meta = serde_json::from_value(serde_json::json!({
            "uid": "c:01ABC",
            "labels": {"env": "dev"},
            "resourceVersion": "7",
            "creationTime": "2024-03-01T10:00:00Z"
        }))
        .unwrap();

        assert_eq!(meta.uid.as_deref(), Some("c:01ABC"));
        assert_eq!(meta.labels.get("env").map(String::as_str), Some("dev"));
        assert_eq!(meta.resource_version.as_deref(), Some("7"));
        assert!(meta.creation_time.is_some());
    }

    #[test]
    fn test_health_display() {
        assert_eq!(Health::Disconnected.to_string(), "DISCONNECTED");
        let health: Health = serde_json::from_str("\"HEALTHY\"").unwrap();
        assert_eq!(health, Health::Healthy);
    }
}
