//! Tanzu Mission Control API Client for Terraform Provider

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use thiserror::Error;
use tmc_models::auth::{AuthorizeRequest, AuthorizeResponse, AUTHORIZE_PATH};
use tmc_models::cluster::{Cluster, ClusterFullName, ClusterRequest, ClusterResponse};
use tmc_models::helm_repository::{HelmRepository, HelmRepositoryFullName, HelmRepositoryResponse};
use tmc_models::management_cluster::{
    ManagementCluster, ManagementClusterFullName, ManagementClusterRequest,
    ManagementClusterResponse,
};
use tmc_models::policy::{Policy, PolicyFullName, PolicyRequest, PolicyResponse};
use tmc_models::provisioner::{
    Provisioner, ProvisionerFullName, ProvisionerRequest, ProvisionerResponse,
};
use tmc_models::scope::{Scope, ScopedFullName};
use tmc_models::source_secret::{
    SourceSecret, SourceSecretFullName, SourceSecretRequest, SourceSecretResponse,
};
use tracing::debug;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Resource not found: {0}")]
    NotFound(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

type Query<'a> = [(&'a str, String)];

/// Prefix bare host names with https://
pub fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.to_string()
    } else {
        format!("https://{}", endpoint)
    }
}

fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}

/// Tanzu Mission Control API Client
#[derive(Clone)]
pub struct TmcClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    org_id: Option<String>,
}

impl TmcClient {
    /// Create a new client
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_options(endpoint, false)
    }

    /// Create a new client, optionally accepting unverified TLS certificates
    pub fn with_options(endpoint: &str, insecure: bool) -> Result<Self> {
        if endpoint.trim().is_empty() {
            return Err(ClientError::InvalidConfig("endpoint must not be empty".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .danger_accept_invalid_certs(insecure)
            .build()?;

        Ok(Self {
            client,
            base_url: normalize_endpoint(endpoint),
            token: None,
            org_id: None,
        })
    }

    /// Set authentication token
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = Some(token.to_string());
        self
    }

    /// Organization id stamped into full names of new entities
    pub fn with_org_id(mut self, org_id: Option<String>) -> Self {
        self.org_id = org_id.filter(|id| !id.is_empty());
        self
    }

    pub fn org_id(&self) -> Option<&str> {
        self.org_id.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Exchange a VMware Cloud API token for an access token
    pub async fn authenticate(&mut self, cloud_endpoint: &str, api_token: &str) -> Result<String> {
        let url = format!("{}{}", normalize_endpoint(cloud_endpoint), AUTHORIZE_PATH);
        debug!(url = %url, "exchanging API token for access token");

        let response = self
            .client
            .post(&url)
            .form(&AuthorizeRequest {
                refresh_token: api_token.to_string(),
            })
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 400 || status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ClientError::AuthFailed);
        }

        let response: AuthorizeResponse = self.handle_response(&url, response).await?;

        self.token = Some(response.access_token.clone());
        Ok(response.access_token)
    }

    /// Build headers for requests
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers
    }

    /// GET request
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &Query<'_>) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(&url)
            .headers(self.headers())
            .query(query)
            .send()
            .await?;

        self.handle_response(&url, response).await
    }

    /// POST request
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "POST");
        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(body)
            .send()
            .await?;

        self.handle_response(&url, response).await
    }

    /// PUT request
    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "PUT");
        let response = self
            .client
            .put(&url)
            .headers(self.headers())
            .json(body)
            .send()
            .await?;

        self.handle_response(&url, response).await
    }

    /// DELETE request
    pub async fn delete(&self, path: &str, query: &Query<'_>) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url = %url, "DELETE");
        let response = self
            .client
            .delete(&url)
            .headers(self.headers())
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status.as_u16() == 404 {
            Err(ClientError::NotFound(url))
        } else if status.as_u16() == 401 {
            Err(ClientError::AuthFailed)
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Fetch a plain-text document, such as an agent installer manifest
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).headers(self.headers()).send().await?;
        let status = response.status();

        if status.is_success() {
            Ok(response.text().await?)
        } else if status.as_u16() == 404 {
            Err(ClientError::NotFound(url.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Handle API response
    async fn handle_response<T: DeserializeOwned>(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            Ok(serde_json::from_str(&body)?)
        } else if status.as_u16() == 401 {
            Err(ClientError::AuthFailed)
        } else if status.as_u16() == 404 {
            Err(ClientError::NotFound(url.to_string()))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(ClientError::Api {
                status: status.as_u16(),
                message,
            })
        }
    }
}

// ============================================================================
// API Paths
// ============================================================================

fn cluster_query(management_cluster_name: &str, provisioner_name: &str) -> Vec<(&'static str, String)> {
    vec![
        ("fullName.managementClusterName", management_cluster_name.to_string()),
        ("fullName.provisionerName", provisioner_name.to_string()),
    ]
}

/// Collection path and query for policies attached to `scope`
fn policies_path(scope: &Scope) -> (String, Vec<(&'static str, String)>) {
    match scope {
        Scope::Cluster(cluster) => (
            format!("/v1alpha1/clusters/{}/policies", segment(&cluster.name)),
            cluster_query(&cluster.management_cluster_name, &cluster.provisioner_name),
        ),
        Scope::ClusterGroup(group) => (
            format!("/v1alpha1/clustergroups/{}/policies", segment(&group.name)),
            Vec::new(),
        ),
        Scope::Workspace(workspace) => (
            format!("/v1alpha1/workspaces/{}/policies", segment(&workspace.name)),
            Vec::new(),
        ),
        Scope::Organization(_) => ("/v1alpha1/organization/policies".to_string(), Vec::new()),
    }
}

/// Collection path and query for source secrets attached to `scope`
fn source_secrets_path(scope: &Scope) -> Result<(String, Vec<(&'static str, String)>)> {
    match scope {
        Scope::Cluster(cluster) => Ok((
            format!("/v1alpha1/clusters/{}/fluxcd/sourcesecrets", segment(&cluster.name)),
            cluster_query(&cluster.management_cluster_name, &cluster.provisioner_name),
        )),
        Scope::ClusterGroup(group) => Ok((
            format!("/v1alpha1/clustergroups/{}/fluxcd/sourcesecrets", segment(&group.name)),
            Vec::new(),
        )),
        other => Err(ClientError::InvalidConfig(format!(
            "source secrets cannot be attached to a {} scope",
            other.kind()
        ))),
    }
}

// ============================================================================
// API Methods
// ============================================================================

impl TmcClient {
    // Cluster operations
    pub async fn create_cluster(&self, cluster: &Cluster) -> Result<Cluster> {
        let request = ClusterRequest {
            cluster: cluster.clone(),
        };
        let response: ClusterResponse = self.post("/v1alpha1/clusters", &request).await?;
        Ok(response.cluster)
    }

    pub async fn get_cluster(&self, full_name: &ClusterFullName) -> Result<Cluster> {
        let path = format!("/v1alpha1/clusters/{}", segment(&full_name.name));
        let query = cluster_query(&full_name.management_cluster_name, &full_name.provisioner_name);
        let response: ClusterResponse = self.get(&path, &query).await?;
        Ok(response.cluster)
    }

    pub async fn update_cluster(&self, cluster: &Cluster) -> Result<Cluster> {
        let path = format!("/v1alpha1/clusters/{}", segment(&cluster.full_name.name));
        let request = ClusterRequest {
            cluster: cluster.clone(),
        };
        let response: ClusterResponse = self.put(&path, &request).await?;
        Ok(response.cluster)
    }

    pub async fn delete_cluster(&self, full_name: &ClusterFullName, force: bool) -> Result<()> {
        let path = format!("/v1alpha1/clusters/{}", segment(&full_name.name));
        let mut query = cluster_query(&full_name.management_cluster_name, &full_name.provisioner_name);
        if force {
            query.push(("force", "true".to_string()));
        }
        self.delete(&path, &query).await
    }

    // Management cluster operations
    pub async fn create_management_cluster(
        &self,
        management_cluster: &ManagementCluster,
    ) -> Result<ManagementCluster> {
        let request = ManagementClusterRequest {
            management_cluster: management_cluster.clone(),
        };
        let response: ManagementClusterResponse =
            self.post("/v1alpha1/managementclusters", &request).await?;
        Ok(response.management_cluster)
    }

    pub async fn get_management_cluster(
        &self,
        full_name: &ManagementClusterFullName,
    ) -> Result<ManagementCluster> {
        let path = format!("/v1alpha1/managementclusters/{}", segment(&full_name.name));
        let response: ManagementClusterResponse = self.get(&path, &[]).await?;
        Ok(response.management_cluster)
    }

    pub async fn update_management_cluster(
        &self,
        management_cluster: &ManagementCluster,
    ) -> Result<ManagementCluster> {
        let path = format!(
            "/v1alpha1/managementclusters/{}",
            segment(&management_cluster.full_name.name)
        );
        let request = ManagementClusterRequest {
            management_cluster: management_cluster.clone(),
        };
        let response: ManagementClusterResponse = self.put(&path, &request).await?;
        Ok(response.management_cluster)
    }

    pub async fn delete_management_cluster(
        &self,
        full_name: &ManagementClusterFullName,
        force: bool,
    ) -> Result<()> {
        let path = format!("/v1alpha1/managementclusters/{}", segment(&full_name.name));
        let query = [("force", force.to_string())];
        self.delete(&path, &query).await
    }

    // Provisioner operations
    pub async fn create_provisioner(&self, provisioner: &Provisioner) -> Result<Provisioner> {
        let path = format!(
            "/v1alpha1/managementclusters/{}/provisioners",
            segment(&provisioner.full_name.management_cluster_name)
        );
        let request = ProvisionerRequest {
            provisioner: provisioner.clone(),
        };
        let response: ProvisionerResponse = self.post(&path, &request).await?;
        Ok(response.provisioner)
    }

    pub async fn get_provisioner(&self, full_name: &ProvisionerFullName) -> Result<Provisioner> {
        let path = format!(
            "/v1alpha1/managementclusters/{}/provisioners/{}",
            segment(&full_name.management_cluster_name),
            segment(&full_name.name)
        );
        let response: ProvisionerResponse = self.get(&path, &[]).await?;
        Ok(response.provisioner)
    }

    pub async fn update_provisioner(&self, provisioner: &Provisioner) -> Result<Provisioner> {
        let path = format!(
            "/v1alpha1/managementclusters/{}/provisioners/{}",
            segment(&provisioner.full_name.management_cluster_name),
            segment(&provisioner.full_name.name)
        );
        let request = ProvisionerRequest {
            provisioner: provisioner.clone(),
        };
        let response: ProvisionerResponse = self.put(&path, &request).await?;
        Ok(response.provisioner)
    }

    pub async fn delete_provisioner(&self, full_name: &ProvisionerFullName) -> Result<()> {
        let path = format!(
            "/v1alpha1/managementclusters/{}/provisioners/{}",
            segment(&full_name.management_cluster_name),
            segment(&full_name.name)
        );
        self.delete(&path, &[]).await
    }

    // Policy operations
    pub async fn create_policy(&self, policy: &Policy) -> Result<Policy> {
        let (path, query) = policies_path(&policy.full_name.scope());
        let request = PolicyRequest {
            policy: policy.clone(),
        };
        // Cluster-scoped collections take the parent names as query parameters
        let path = with_query(&path, &query);
        let response: PolicyResponse = self.post(&path, &request).await?;
        Ok(response.policy)
    }

    pub async fn get_policy(&self, full_name: &PolicyFullName) -> Result<Policy> {
        let (base, query) = policies_path(&full_name.scope());
        let path = format!("{}/{}", base, segment(&full_name.name));
        let response: PolicyResponse = self.get(&path, &query).await?;
        Ok(response.policy)
    }

    pub async fn update_policy(&self, policy: &Policy) -> Result<Policy> {
        let (base, query) = policies_path(&policy.full_name.scope());
        let path = with_query(&format!("{}/{}", base, segment(&policy.full_name.name)), &query);
        let request = PolicyRequest {
            policy: policy.clone(),
        };
        let response: PolicyResponse = self.put(&path, &request).await?;
        Ok(response.policy)
    }

    pub async fn delete_policy(&self, full_name: &PolicyFullName) -> Result<()> {
        let (base, query) = policies_path(&full_name.scope());
        let path = format!("{}/{}", base, segment(&full_name.name));
        self.delete(&path, &query).await
    }

    // Helm repository operations
    pub async fn get_helm_repository(
        &self,
        full_name: &HelmRepositoryFullName,
    ) -> Result<HelmRepository> {
        let path = format!(
            "/v1alpha1/clusters/{}/namespaces/{}/fluxcd/helmrepositories/{}",
            segment(&full_name.cluster_name),
            segment(&full_name.namespace_name),
            segment(&full_name.name)
        );
        let query = cluster_query(&full_name.management_cluster_name, &full_name.provisioner_name);
        let response: HelmRepositoryResponse = self.get(&path, &query).await?;
        Ok(response.helm_repository)
    }

    // Source secret operations
    pub async fn create_source_secret(&self, secret: &SourceSecret) -> Result<SourceSecret> {
        let (path, query) = source_secrets_path(&secret.full_name.scope())?;
        let request = SourceSecretRequest {
            source_secret: secret.clone(),
        };
        let response: SourceSecretResponse =
            self.post(&with_query(&path, &query), &request).await?;
        Ok(response.source_secret)
    }

    pub async fn get_source_secret(&self, full_name: &SourceSecretFullName) -> Result<SourceSecret> {
        let (base, query) = source_secrets_path(&full_name.scope())?;
        let path = format!("{}/{}", base, segment(&full_name.name));
        let response: SourceSecretResponse = self.get(&path, &query).await?;
        Ok(response.source_secret)
    }

    pub async fn update_source_secret(&self, secret: &SourceSecret) -> Result<SourceSecret> {
        let (base, query) = source_secrets_path(&secret.full_name.scope())?;
        let path = with_query(&format!("{}/{}", base, segment(&secret.full_name.name)), &query);
        let request = SourceSecretRequest {
            source_secret: secret.clone(),
        };
        let response: SourceSecretResponse = self.put(&path, &request).await?;
        Ok(response.source_secret)
    }

    pub async fn delete_source_secret(&self, full_name: &ScopedFullName) -> Result<()> {
        let (base, query) = source_secrets_path(&full_name.scope())?;
        let path = format!("{}/{}", base, segment(&full_name.name));
        self.delete(&path, &query).await
    }
}

/// Append an encoded query string to `path` for requests with a body
fn with_query(path: &str, query: &Query<'_>) -> String {
    if query.is_empty() {
        return path.to_string();
    }
    let encoded: Vec<String> = query
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    format!("{}?{}", path, encoded.join("&"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tmc_models::scope::{ClusterGroupFullName, OrganizationFullName};

    #[test]
    fn test_client_creation() {
        let client = TmcClient::new("myorg.tmc.cloud.vmware.com").unwrap();
        assert!(client.token.is_none());
        assert_eq!(client.base_url(), "https://myorg.tmc.cloud.vmware.com");
    }

    #[test]
    fn test_client_rejects_empty_endpoint() {
        assert!(matches!(
            TmcClient::new("  "),
            Err(ClientError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_client_with_token() {
        let client = TmcClient::new("http://localhost:8080/")
            .unwrap()
            .with_token("test-token");
        assert_eq!(client.token, Some("test-token".to_string()));
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_policy_paths_per_scope() {
        let cluster = Scope::Cluster(ClusterFullName::new("mc", "prov", "dev"));
        let (path, query) = policies_path(&cluster);
        assert_eq!(path, "/v1alpha1/clusters/dev/policies");
        assert_eq!(query.len(), 2);

        let group = Scope::ClusterGroup(ClusterGroupFullName {
            org_id: None,
            name: "team a".to_string(),
        });
        assert_eq!(policies_path(&group).0, "/v1alpha1/clustergroups/team%20a/policies");

        let org = Scope::Organization(OrganizationFullName::default());
        assert_eq!(policies_path(&org).0, "/v1alpha1/organization/policies");
    }

    #[test]
    fn test_source_secret_rejects_workspace() {
        let scope = Scope::Workspace(Default::default());
        assert!(source_secrets_path(&scope).is_err());
    }

    #[test]
    fn test_with_query() {
        let query = cluster_query("attached", "attached");
        assert_eq!(
            with_query("/v1alpha1/clusters/dev/policies", &query),
            "/v1alpha1/clusters/dev/policies?fullName.managementClusterName=attached&fullName.provisionerName=attached"
        );
        assert_eq!(with_query("/x", &[]), "/x");
    }
}
