//! Status projection
//!
//! Rebuilds a [`CustomerInstance`] from the namespace and deployment that
//! back it. [`project`] is pure; [`load_snapshot`] does the reads.

use super::error::{ProvisionError, ProvisionResult};
use super::naming;
use super::platform::ClusterApi;
use super::resources::{ANNOTATION_CONFIG, ANNOTATION_DISPLAY_NAME};
use ageplane_common::{
    CustomerConfig, CustomerInstance, InstancePhase, InstanceStatus, ResourceRequirements,
};
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Container, Namespace};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;

/// Label prefixes surfaced on the logical instance
const VISIBLE_LABEL_PREFIXES: [&str; 2] = ["app.kubernetes.io/", "postgres-operator."];

/// Physical state of one customer instance at a point in time
#[derive(Debug, Clone)]
pub struct InstanceSnapshot {
    pub namespace: Namespace,
    pub deployment: Deployment,
}

/// Read the namespace and deployment of a customer
///
/// A missing namespace means the customer does not exist. A missing
/// deployment inside an existing namespace is a retrieval failure.
pub async fn load_snapshot(
    cluster: &dyn ClusterApi,
    customer: &str,
) -> ProvisionResult<InstanceSnapshot> {
    let namespace_name = naming::namespace_name(customer);
    let namespace = match cluster.get_namespace(&namespace_name).await {
        Ok(ns) => ns,
        Err(e) if e.is_not_found() => return Err(ProvisionError::NotFound(customer.to_string())),
        Err(e) => return Err(ProvisionError::upstream("Failed to get namespace", e)),
    };

    let deployment = cluster
        .get_deployment(&namespace_name, &naming::deployment_name(customer))
        .await
        .map_err(|e| ProvisionError::upstream("Failed to get deployment", e))?;

    Ok(InstanceSnapshot {
        namespace,
        deployment,
    })
}

/// Phase as a function of the workload's replica counts
pub fn derive_phase(replicas: i32, ready_replicas: i32) -> InstancePhase {
    if ready_replicas > 0 {
        InstancePhase::Running
    } else if replicas > 0 {
        InstancePhase::Creating
    } else {
        InstancePhase::Failed
    }
}

/// Version tag of an image reference
///
/// `registry:5000/operator` has no tag; the text after the last colon is a
/// port because it contains a slash.
pub fn image_tag(image: &str) -> Option<&str> {
    image
        .rsplit_once(':')
        .map(|(_, tail)| tail)
        .filter(|tail| !tail.is_empty() && !tail.contains('/'))
}

/// Project a snapshot onto the logical instance
pub fn project(
    customer: &str,
    snapshot: &InstanceSnapshot,
    container_name: &str,
    now: DateTime<Utc>,
) -> CustomerInstance {
    let namespace = &snapshot.namespace;
    let deployment = &snapshot.deployment;
    let annotations = namespace.metadata.annotations.clone().unwrap_or_default();

    let status = deployment.status.clone().unwrap_or_default();
    let (replicas, ready_replicas) = replica_counts(deployment);
    let phase = derive_phase(replicas, ready_replicas);

    let container = primary_container(deployment, container_name);

    let mut config: CustomerConfig = annotations
        .get(ANNOTATION_CONFIG)
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();
    if let Some(resources) = container.and_then(|c| c.resources.as_ref()) {
        config.resources.requests = sizing(resources.requests.as_ref());
        config.resources.limits = sizing(resources.limits.as_ref());
    }

    let labels: BTreeMap<String, String> = namespace
        .metadata
        .labels
        .iter()
        .flatten()
        .filter(|(key, _)| VISIBLE_LABEL_PREFIXES.iter().any(|p| key.starts_with(p)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let created_at = namespace
        .metadata
        .creation_timestamp
        .as_ref()
        .map(|t| t.0)
        .unwrap_or(now);

    let updated_at = status
        .conditions
        .iter()
        .flatten()
        .filter_map(|c| c.last_update_time.as_ref().map(|t| t.0))
        .max()
        .or_else(|| deployment.metadata.creation_timestamp.as_ref().map(|t| t.0))
        .unwrap_or(created_at);

    CustomerInstance {
        id: customer.to_string(),
        name: customer.to_string(),
        display_name: annotations
            .get(ANNOTATION_DISPLAY_NAME)
            .cloned()
            .unwrap_or_default(),
        image_tag: container
            .and_then(|c| c.image.as_deref())
            .and_then(image_tag)
            .unwrap_or_default()
            .to_string(),
        namespace: naming::namespace_name(customer),
        status: InstanceStatus {
            phase,
            message: phase_message(phase, deployment),
            ready: ready_replicas > 0,
            replicas,
            ready_replicas,
            last_updated: now,
        },
        config,
        labels,
        created_at,
        updated_at,
    }
}

/// Replica counts used for the phase
///
/// Until the deployment controller has observed the current generation the
/// status says nothing about it, so the desired replica count stands in.
pub fn replica_counts(deployment: &Deployment) -> (i32, i32) {
    let status = deployment.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);

    let stale = match (
        deployment.metadata.generation,
        status.and_then(|s| s.observed_generation),
    ) {
        (Some(generation), Some(observed)) => observed < generation,
        (Some(_), None) => true,
        (None, _) => false,
    };

    match status.and_then(|s| s.replicas) {
        Some(replicas) if !stale => (replicas, ready),
        _ => {
            let desired = deployment
                .spec
                .as_ref()
                .and_then(|spec| spec.replicas)
                .unwrap_or(1);
            (desired, ready)
        }
    }
}

/// The container whose image carries the customer's version
fn primary_container<'a>(deployment: &'a Deployment, container_name: &str) -> Option<&'a Container> {
    let containers = &deployment.spec.as_ref()?.template.spec.as_ref()?.containers;
    containers
        .iter()
        .find(|c| c.name == container_name)
        .or_else(|| containers.first())
}

fn sizing(quantities: Option<&BTreeMap<String, Quantity>>) -> ResourceRequirements {
    let get = |key: &str| quantities.and_then(|q| q.get(key)).map(|q| q.0.clone());
    ResourceRequirements {
        cpu: get("cpu"),
        memory: get("memory"),
    }
}

fn phase_message(phase: InstancePhase, deployment: &Deployment) -> String {
    let failing = deployment
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.status == "False" && c.message.is_some())
        })
        .and_then(|c| c.message.clone());

    match (phase, failing) {
        (InstancePhase::Running, _) => "Operator is running".to_string(),
        (_, Some(message)) => message,
        (InstancePhase::Creating, None) => "Waiting for operator pods to become ready".to_string(),
        _ => "Operator deployment has no replicas".to_string(),
    }
}
