//! Common test utilities and helpers

#![allow(dead_code)]

use ageplane_api::config::AgePlaneConfig;
use ageplane_api::kubernetes::naming::{deployment_name, namespace_name};
use ageplane_api::kubernetes::{ClusterApi, CustomerProvisioner, InMemoryCluster, WorkloadProfile};
use ageplane_api::AppState;
use ageplane_common::{CreateCustomerRequest, CustomerConfig};
use axum::body::Body;
use axum::http::Response;
use std::collections::BTreeMap;
use std::sync::Arc;

pub const TEST_API_KEY: &str = "test-api-key";

/// Provisioner over a fresh in-memory cluster
pub fn memory_provisioner() -> (Arc<InMemoryCluster>, CustomerProvisioner) {
    let cluster = Arc::new(InMemoryCluster::new());
    let provisioner = CustomerProvisioner::new(
        cluster.clone() as Arc<dyn ClusterApi>,
        WorkloadProfile::default(),
    );
    (cluster, provisioner)
}

/// Application state over a fresh in-memory cluster
pub fn memory_state(api_key: &str) -> (Arc<InMemoryCluster>, Arc<AppState>) {
    let mut config = AgePlaneConfig::default();
    config.auth.api_key = api_key.to_string();
    memory_state_with(config)
}

pub fn memory_state_with(config: AgePlaneConfig) -> (Arc<InMemoryCluster>, Arc<AppState>) {
    let cluster = Arc::new(InMemoryCluster::new());
    let state = Arc::new(AppState::new(config, cluster.clone() as Arc<dyn ClusterApi>));
    (cluster, state)
}

pub fn create_request(name: &str) -> CreateCustomerRequest {
    CreateCustomerRequest {
        name: name.to_string(),
        ..Default::default()
    }
}

/// The request from the API docs example
pub fn acme_request() -> CreateCustomerRequest {
    let mut config = CustomerConfig::default();
    config.resources.requests.cpu = Some("200m".to_string());
    config.resources.requests.memory = Some("256Mi".to_string());
    config.resources.limits.cpu = Some("1".to_string());
    config.resources.limits.memory = Some("1Gi".to_string());
    config.storage.size = Some("10Gi".to_string());
    config.backup_enabled = true;

    CreateCustomerRequest {
        name: "acme-corp".to_string(),
        display_name: "ACME Corporation".to_string(),
        image_tag: Some("v1".to_string()),
        config,
        labels: BTreeMap::from([("environment".to_string(), "production".to_string())]),
    }
}

/// Mark the customer's operator pod ready
pub async fn mark_ready(cluster: &InMemoryCluster, customer: &str) {
    cluster
        .set_ready_replicas(&namespace_name(customer), &deployment_name(customer), 1)
        .await
        .expect("deployment should exist");
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body should be readable");
    serde_json::from_slice(&bytes).expect("body should be JSON")
}
