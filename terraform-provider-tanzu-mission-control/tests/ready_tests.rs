//! Ready Wait Tests
//! Polling cluster and management cluster phases against the mock TMC API

mod common;

use axum::http::Method;
use common::{MockTmc, ACCESS_TOKEN};
use serde_json::{json, Value};
use std::time::Duration;
use terraform_provider_tmc::client::TmcClient;
use terraform_provider_tmc::resources::{cluster, management_cluster};
use tmc_models::cluster::ClusterFullName;
use tmc_models::management_cluster::ManagementClusterFullName;

const CLUSTER_PATH: &str = "/v1alpha1/clusters/dev";
const INTERVAL: Duration = Duration::from_millis(20);

fn client(mock: &MockTmc) -> TmcClient {
    TmcClient::new(&mock.base_url).unwrap().with_token(ACCESS_TOKEN)
}

fn cluster_in(phase: &str) -> Value {
    json!({"cluster": {
        "fullName": {"managementClusterName": "attached", "provisionerName": "attached", "name": "dev"},
        "meta": {"uid": "c:01"},
        "spec": {"clusterGroupName": "default"},
        "status": {"phase": phase}
    }})
}

fn attached_dev() -> ClusterFullName {
    ClusterFullName::new("attached", "attached", "dev")
}

#[tokio::test]
async fn test_wait_for_ready_after_pending() {
    let mock = MockTmc::start();
    mock.push_sequence(
        CLUSTER_PATH,
        vec![cluster_in("PENDING"), cluster_in("PENDING"), cluster_in("READY")],
    );

    cluster::wait_for_ready(&client(&mock), &attached_dev(), Duration::from_secs(5), INTERVAL)
        .await
        .unwrap();

    assert_eq!(mock.requests_to(Method::GET, CLUSTER_PATH).len(), 3);
}

#[tokio::test]
async fn test_wait_for_ready_reports_error_phase() {
    let mock = MockTmc::start();
    mock.push_sequence(CLUSTER_PATH, vec![cluster_in("ERROR")]);

    let diags = cluster::wait_for_ready(
        &client(&mock),
        &attached_dev(),
        Duration::from_millis(200),
        INTERVAL,
    )
    .await
    .unwrap_err();

    assert_eq!(diags[0].summary, "Cluster did not become ready");
    let detail = diags[0].detail.clone().unwrap();
    assert!(detail.contains("ERROR phase"), "unexpected detail: {}", detail);
    // Polling continued after the first ERROR response
    assert!(mock.requests_to(Method::GET, CLUSTER_PATH).len() > 1);
}

#[tokio::test]
async fn test_wait_for_ready_on_missing_cluster() {
    let mock = MockTmc::start();

    let diags = cluster::wait_for_ready(
        &client(&mock),
        &attached_dev(),
        Duration::from_millis(100),
        INTERVAL,
    )
    .await
    .unwrap_err();

    let detail = diags[0].detail.clone().unwrap();
    assert!(detail.contains("Resource not found"), "unexpected detail: {}", detail);
}

#[tokio::test]
async fn test_zero_timeout_skips_wait() {
    let mock = MockTmc::start();

    cluster::wait_for_ready(&client(&mock), &attached_dev(), Duration::ZERO, INTERVAL)
        .await
        .unwrap();
    assert!(mock.requests().is_empty());
}

#[tokio::test]
async fn test_management_cluster_wait_for_ready() {
    let mock = MockTmc::start();
    let body = |phase: &str| {
        json!({"managementCluster": {
            "fullName": {"name": "tkgs-mc"},
            "spec": {
                "kubernetesProviderType": "VMWARE_TANZU_KUBERNETES_GRID_SERVICE",
                "defaultClusterGroup": "default"
            },
            "status": {"phase": phase}
        }})
    };
    mock.push_sequence(
        "/v1alpha1/managementclusters/tkgs-mc",
        vec![body("PROCESSING"), body("READY")],
    );

    let full_name = ManagementClusterFullName {
        org_id: None,
        name: "tkgs-mc".to_string(),
    };
    management_cluster::wait_for_ready(
        &client(&mock),
        &full_name,
        Duration::from_secs(5),
        INTERVAL,
    )
    .await
    .unwrap();

    assert_eq!(
        mock.requests_to(Method::GET, "/v1alpha1/managementclusters/tkgs-mc")
            .len(),
        2
    );
}
