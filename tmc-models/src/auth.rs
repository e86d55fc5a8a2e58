//! VMware Cloud Services token exchange types

use serde::{Deserialize, Serialize};

/// Path of the API-token authorize endpoint on the cloud services console
pub const AUTHORIZE_PATH: &str = "/csp/gateway/am/api/auth/api-tokens/authorize";

/// Default cloud services console host
pub const DEFAULT_CLOUD_ENDPOINT: &str = "console.cloud.vmware.com";

/// Form body sent to the authorize endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeRequest {
    pub refresh_token: String,
}

/// Access token granted in exchange for an API token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizeResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_response_minimal() {
        let resp: AuthorizeResponse =
            serde_json::from_str(r#"{"access_token":"abc","expires_in":1799}"#).unwrap();
        assert_eq!(resp.access_token, "abc");
        assert_eq!(resp.expires_in, Some(1799));
        assert!(resp.token_type.is_none());
    }
}
