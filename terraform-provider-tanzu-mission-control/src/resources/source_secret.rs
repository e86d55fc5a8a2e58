//! Repository credential (source secret) resource
//!
//! Secret material is base64 encoded on the wire and never returned by the
//! API, so flatten takes it from the configuration it was written from.

use super::meta::{construct_meta, flatten_meta, merge_meta, meta_block, META};
use super::scope::{
    construct_scope, flatten_scope, parse_scoped_import_id, reported_scope, scope_block,
    validate_scope, SCOPE,
};
use super::{
    client_diagnostic, invalid, populated_blocks, single_block, CreateOutcome, Resource,
    ResourceResult, ResourceState,
};
use crate::client::TmcClient;
use crate::schema::{Diagnostic, NestedBlock, ResourceSchema, SchemaAttribute, SchemaBlock};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Value};
use tmc_models::scope::{Scope, ScopeKind};
use tmc_models::source_secret::{
    SourceSecret, SourceSecretData, SourceSecretFullName, SourceSecretSpec, SourceSecretType,
    SshKeyData, UsernamePasswordData,
};
use tracing::debug;

const SCOPES: &[ScopeKind] = &[ScopeKind::Cluster, ScopeKind::ClusterGroup];

const SPEC: &str = "spec";
const DATA: &str = "data";
const USERNAME_PASSWORD: &str = "username_password";
const SSH_KEY: &str = "ssh_key";
const CREDENTIAL_BLOCKS: [&str; 2] = [USERNAME_PASSWORD, SSH_KEY];

fn spec_block() -> NestedBlock {
    let username_password = SchemaBlock::new()
        .with_attribute(
            "username",
            SchemaAttribute::string()
                .with_description("Username for the repository")
                .required(),
        )
        .with_attribute(
            "password",
            SchemaAttribute::string()
                .with_description("Password for the repository")
                .required()
                .sensitive(),
        )
        .with_description("Username and password credential");

    let ssh_key = SchemaBlock::new()
        .with_attribute(
            "identity",
            SchemaAttribute::string()
                .with_description("SSH private key")
                .required()
                .sensitive(),
        )
        .with_attribute(
            "known_hosts",
            SchemaAttribute::string()
                .with_description("SSH known hosts")
                .required()
                .sensitive(),
        )
        .with_description("SSH key credential");

    let data = SchemaBlock::new()
        .with_block(USERNAME_PASSWORD, NestedBlock::single(username_password))
        .with_block(SSH_KEY, NestedBlock::single(ssh_key))
        .with_description("Credential data, one of: username_password, ssh_key");

    NestedBlock::single(
        SchemaBlock::new()
            .with_block(DATA, NestedBlock::single(data).required())
            .with_description("Spec for the repository credential"),
    )
    .required()
}

fn data_block(state: &ResourceState) -> Option<ResourceState> {
    state.get_block(SPEC)?.get_block(DATA)
}

fn construct_spec(state: &ResourceState) -> ResourceResult<SourceSecretSpec> {
    let data = data_block(state)
        .ok_or_else(|| vec![invalid(&[SPEC, DATA], "data block is required")])?;

    let kind = match populated_blocks(&data, &CREDENTIAL_BLOCKS).as_slice() {
        [kind] => *kind,
        [] => {
            return Err(vec![invalid(
                &[SPEC, DATA],
                "no credential block found: one of username_password, ssh_key must be specified",
            )])
        }
        _ => {
            return Err(vec![invalid(
                &[SPEC, DATA],
                "only one of username_password, ssh_key is allowed",
            )])
        }
    };

    let block = data.get_block(kind).unwrap_or_default();
    let field = |name: &str| block.get_string(name).unwrap_or_default();

    if kind == USERNAME_PASSWORD {
        Ok(SourceSecretSpec {
            source_secret_type: SourceSecretType::UsernamePassword,
            data: SourceSecretData {
                username_password_data: Some(UsernamePasswordData {
                    username: field("username"),
                    password: STANDARD.encode(field("password")),
                }),
                ssh_key: None,
            },
        })
    } else {
        Ok(SourceSecretSpec {
            source_secret_type: SourceSecretType::Ssh,
            data: SourceSecretData {
                username_password_data: None,
                ssh_key: Some(SshKeyData {
                    identity: STANDARD.encode(field("identity")),
                    known_hosts: STANDARD.encode(field("known_hosts")),
                }),
            },
        })
    }
}

pub fn construct_source_secret(
    state: &ResourceState,
    org_id: Option<&str>,
) -> ResourceResult<SourceSecret> {
    let scope = construct_scope(state, SCOPES, org_id)?;
    let name = state
        .get_non_empty("name")
        .ok_or_else(|| vec![invalid(&["name"], "name is required")])?;

    Ok(SourceSecret {
        full_name: SourceSecretFullName::new(&scope, name),
        meta: construct_meta(state),
        spec: construct_spec(state)?,
    })
}

fn flatten_spec(spec: &SourceSecretSpec, config: &ResourceState) -> Value {
    let configured = data_block(config).unwrap_or_default();
    let secret = |block: &str, field: &str| {
        configured
            .get_block(block)
            .and_then(|b| b.get_string(field))
            .unwrap_or_default()
    };

    let mut credential = ResourceState::new();
    let block = match spec.source_secret_type {
        SourceSecretType::UsernamePassword => {
            let username = spec
                .data
                .username_password_data
                .as_ref()
                .map(|d| d.username.clone())
                .unwrap_or_else(|| secret(USERNAME_PASSWORD, "username"));
            credential.set("username", json!(username));
            credential.set("password", json!(secret(USERNAME_PASSWORD, "password")));
            USERNAME_PASSWORD
        }
        SourceSecretType::Ssh => {
            credential.set("identity", json!(secret(SSH_KEY, "identity")));
            credential.set("known_hosts", json!(secret(SSH_KEY, "known_hosts")));
            SSH_KEY
        }
    };

    let mut data = ResourceState::new();
    data.set(block, single_block(credential));
    let mut spec_state = ResourceState::new();
    spec_state.set(DATA, single_block(data));
    single_block(spec_state)
}

/// Flatten `secret`, taking secret material from `config`
pub fn flatten_source_secret(
    secret: &SourceSecret,
    requested: &Scope,
    config: &ResourceState,
) -> ResourceState {
    let mut state = ResourceState::new();
    state.set(
        "id",
        json!(secret
            .meta
            .uid
            .clone()
            .unwrap_or_else(|| secret.full_name.name.clone())),
    );
    state.set("name", json!(secret.full_name.name));
    state.set(SCOPE, flatten_scope(&reported_scope(&secret.full_name, requested)));
    state.set(META, flatten_meta(&secret.meta));
    state.set(SPEC, flatten_spec(&secret.spec, config));
    state
}

fn describe(full_name: &SourceSecretFullName) -> String {
    format!("repository credential entry, name : {}", full_name.name)
}

/// Repository credential resource
pub struct SourceSecretResource;

impl SourceSecretResource {
    pub fn new() -> Self {
        Self
    }

    fn full_name(
        state: &ResourceState,
        client: &TmcClient,
    ) -> ResourceResult<(Scope, SourceSecretFullName)> {
        let scope = construct_scope(state, SCOPES, client.org_id())?;
        let full_name =
            SourceSecretFullName::new(&scope, state.get_string("name").unwrap_or_default());
        Ok((scope, full_name))
    }
}

impl Default for SourceSecretResource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Resource for SourceSecretResource {
    fn type_name(&self) -> &str {
        "tanzu-mission-control_repository_credential"
    }

    fn schema(&self) -> ResourceSchema {
        let block = SchemaBlock::new()
            .with_attribute(
                "id",
                SchemaAttribute::string()
                    .with_description("Unique identifier of the repository credential")
                    .computed(),
            )
            .with_attribute(
                "name",
                SchemaAttribute::string()
                    .with_description("Name of the repository credential")
                    .required()
                    .force_new(),
            )
            .with_block(SCOPE, scope_block(SCOPES))
            .with_block(META, meta_block())
            .with_block(SPEC, spec_block())
            .with_description("Tanzu Mission Control repository credential");

        ResourceSchema::new(0, block)
    }

    fn validate(&self, config: &ResourceState) -> Vec<Diagnostic> {
        let mut diags = validate_scope(config, SCOPES);
        if let Err(mut d) = construct_spec(config) {
            diags.append(&mut d);
        }
        diags
    }

    async fn create(
        &self,
        client: &TmcClient,
        planned: &ResourceState,
    ) -> ResourceResult<CreateOutcome> {
        let request = construct_source_secret(planned, client.org_id())?;
        let scope = request.full_name.scope();
        debug!(name = %request.full_name.name, scope = %scope.kind(), "creating repository credential");

        let secret = client
            .create_source_secret(&request)
            .await
            .map_err(|e| client_diagnostic("create", &describe(&request.full_name), &e))?;
        Ok(flatten_source_secret(&secret, &scope, planned).into())
    }

    async fn read(
        &self,
        client: &TmcClient,
        current: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (scope, full_name) = Self::full_name(current, client)?;

        match client.get_source_secret(&full_name).await {
            Ok(secret) => Ok(flatten_source_secret(&secret, &scope, current)),
            Err(e) if e.is_not_found() => Ok(ResourceState::new()),
            Err(e) => Err(client_diagnostic("get", &describe(&full_name), &e)),
        }
    }

    async fn update(
        &self,
        client: &TmcClient,
        current: &ResourceState,
        planned: &ResourceState,
    ) -> ResourceResult<ResourceState> {
        let (scope, full_name) = Self::full_name(current, client)?;
        let spec = construct_spec(planned)?;

        let mut secret = client
            .get_source_secret(&full_name)
            .await
            .map_err(|e| client_diagnostic("get", &describe(&full_name), &e))?;
        merge_meta(&mut secret.meta, &construct_meta(planned));
        secret.spec = spec;

        let updated = client
            .update_source_secret(&secret)
            .await
            .map_err(|e| client_diagnostic("update", &describe(&full_name), &e))?;
        Ok(flatten_source_secret(&updated, &scope, planned))
    }

    async fn delete(&self, client: &TmcClient, current: &ResourceState) -> ResourceResult<()> {
        let (_, full_name) = Self::full_name(current, client)?;
        debug!(name = %full_name.name, "deleting repository credential");

        match client.delete_source_secret(&full_name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(client_diagnostic("delete", &describe(&full_name), &e)),
        }
    }

    fn import_state(&self, id: &str) -> ResourceResult<ResourceState> {
        let (scope, name) = parse_scoped_import_id(id, SCOPES)?;
        let mut state = ResourceState::new();
        state.set("name", json!(name));
        state.set(SCOPE, flatten_scope(&scope));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(data: Value) -> ResourceState {
        let mut state = ResourceState::new();
        state.set("name", json!("git-creds"));
        state.set(SCOPE, json!([{"cluster_group": [{"cluster_group": "default"}]}]));
        state.set(SPEC, json!([{"data": data}]));
        state
    }

    #[test]
    fn test_username_password_is_encoded() {
        let state = config(json!([{"username_password": [{"username": "bot", "password": "s3cret"}]}]));
        let secret = construct_source_secret(&state, None).unwrap();

        assert_eq!(secret.spec.source_secret_type, SourceSecretType::UsernamePassword);
        let data = secret.spec.data.username_password_data.unwrap();
        assert_eq!(data.username, "bot");
        assert_eq!(data.password, "czNjcmV0");
        assert!(secret.spec.data.ssh_key.is_none());
    }

    #[test]
    fn test_ssh_key_is_encoded() {
        let state = config(json!([{"ssh_key": [{"identity": "key", "known_hosts": "hosts"}]}]));
        let secret = construct_source_secret(&state, None).unwrap();

        assert_eq!(secret.spec.source_secret_type, SourceSecretType::Ssh);
        let data = secret.spec.data.ssh_key.unwrap();
        assert_eq!(data.identity, "a2V5");
        assert_eq!(data.known_hosts, "aG9zdHM=");
    }

    #[test]
    fn test_flatten_keeps_configured_secrets() {
        let state = config(json!([{"username_password": [{"username": "bot", "password": "s3cret"}]}]));
        let mut secret = construct_source_secret(&state, None).unwrap();
        // Masked response
        if let Some(data) = secret.spec.data.username_password_data.as_mut() {
            data.password.clear();
        }

        let flattened = flatten_source_secret(&secret, &secret.full_name.scope(), &state);
        let credential = data_block(&flattened)
            .unwrap()
            .get_block(USERNAME_PASSWORD)
            .unwrap();
        assert_eq!(credential.get_string("username"), Some("bot".to_string()));
        assert_eq!(credential.get_string("password"), Some("s3cret".to_string()));

        let again = construct_source_secret(&flattened, None).unwrap();
        assert_eq!(again.full_name, construct_source_secret(&state, None).unwrap().full_name);
    }

    #[test]
    fn test_requires_exactly_one_credential() {
        let resource = SourceSecretResource::new();

        let diags = resource.validate(&config(json!([{}])));
        assert!(diags[0].summary.contains("no credential block found"));

        let diags = resource.validate(&config(json!([{
            "username_password": [{"username": "a", "password": "b"}],
            "ssh_key": [{"identity": "c", "known_hosts": "d"}]
        }])));
        assert!(diags[0].summary.contains("only one of"));
    }

    #[test]
    fn test_workspace_scope_rejected() {
        let mut state = config(json!([{"ssh_key": [{"identity": "k", "known_hosts": "h"}]}]));
        state.set(SCOPE, json!([{"workspace": [{"workspace": "apps"}]}]));
        let diags = SourceSecretResource::new().validate(&state);
        assert_eq!(diags.len(), 1);
        assert!(diags[0].summary.contains("workspace scope is not supported"));
    }
}
