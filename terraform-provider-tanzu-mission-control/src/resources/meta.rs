//! The `meta` block shared by every resource

use super::{single_block, ResourceState};
use crate::schema::{AttributeType, NestedBlock, SchemaAttribute, SchemaBlock};
use serde_json::json;
use tmc_models::Meta;

pub const META: &str = "meta";

pub fn meta_block() -> NestedBlock {
    NestedBlock::single(
        SchemaBlock::new()
            .with_attribute(
                "description",
                SchemaAttribute::string()
                    .with_description("Description of the resource")
                    .optional(),
            )
            .with_attribute(
                "labels",
                SchemaAttribute::map(AttributeType::String)
                    .with_description("Labels for the resource")
                    .optional(),
            )
            .with_attribute(
                "annotations",
                SchemaAttribute::map(AttributeType::String)
                    .with_description("Annotations for the resource")
                    .optional()
                    .computed(),
            )
            .with_attribute(
                "uid",
                SchemaAttribute::string()
                    .with_description("UID of the resource")
                    .computed(),
            )
            .with_attribute(
                "resource_version",
                SchemaAttribute::string()
                    .with_description("Resource version of the resource")
                    .computed(),
            )
            .with_description("Metadata for the resource"),
    )
}

/// Build API metadata from the `meta` block of `state`
pub fn construct_meta(state: &ResourceState) -> Meta {
    let Some(block) = state.get_block(META) else {
        return Meta::default();
    };

    Meta {
        description: block.get_non_empty("description"),
        labels: block.get_string_map("labels"),
        annotations: block.get_string_map("annotations"),
        uid: block.get_non_empty("uid"),
        resource_version: block.get_non_empty("resource_version"),
        ..Default::default()
    }
}

/// Flatten API metadata into a `meta` block value
pub fn flatten_meta(meta: &Meta) -> serde_json::Value {
    let mut block = ResourceState::new();
    block.set("description", json!(meta.description.clone().unwrap_or_default()));
    block.set("labels", json!(meta.labels));
    block.set("annotations", json!(meta.annotations));
    block.set("uid", json!(meta.uid.clone().unwrap_or_default()));
    block.set(
        "resource_version",
        json!(meta.resource_version.clone().unwrap_or_default()),
    );
    single_block(block)
}

/// Apply user-settable fields from `desired` onto `current` before an update
pub fn merge_meta(current: &mut Meta, desired: &Meta) {
    current.description = desired.description.clone();
    current.labels = desired.labels.clone();
    for (k, v) in &desired.annotations {
        current.annotations.insert(k.clone(), v.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_meta_round_trip() {
        let meta = Meta {
            description: Some("dev cluster".to_string()),
            labels: BTreeMap::from([("team".to_string(), "platform".to_string())]),
            uid: Some("c:01H".to_string()),
            resource_version: Some("3".to_string()),
            ..Default::default()
        };

        let mut state = ResourceState::new();
        state.set(META, flatten_meta(&meta));
        assert_eq!(construct_meta(&state), meta);
    }

    #[test]
    fn test_missing_meta_block() {
        assert_eq!(construct_meta(&ResourceState::new()), Meta::default());
    }

    #[test]
    fn test_merge_keeps_server_annotations() {
        let mut current = Meta {
            description: Some("old".to_string()),
            annotations: BTreeMap::from([("tmc.cloud.vmware.com/creator".to_string(), "x".to_string())]),
            uid: Some("u".to_string()),
            ..Default::default()
        };
        let desired = Meta {
            description: Some("new".to_string()),
            labels: BTreeMap::from([("a".to_string(), "b".to_string())]),
            ..Default::default()
        };

        merge_meta(&mut current, &desired);
        assert_eq!(current.description.as_deref(), Some("new"));
        assert_eq!(current.labels.len(), 1);
        assert_eq!(current.annotations.len(), 1);
        assert_eq!(current.uid.as_deref(), Some("u"));
    }
}
