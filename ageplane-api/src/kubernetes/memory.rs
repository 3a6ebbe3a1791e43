//! In-memory cluster
//!
//! A local stand-in for the Kubernetes API server that keeps objects in
//! process memory. Used by the test suite and by the `memory` cluster mode
//! for local development. Namespace deletion cascades, resource versions are
//! checked on replace, and failures or delays can be injected per operation.
//! New deployments have no status until a simulated controller sync.

use super::error::{PlatformError, PlatformResult};
use super::platform::ClusterApi;
use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentStatus};
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Platform calls that can be observed and failed on purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetNamespace,
    ListNamespaces,
    CreateNamespace,
    DeleteNamespace,
    CreateServiceAccount,
    CreateClusterRole,
    DeleteClusterRole,
    CreateClusterRoleBinding,
    DeleteClusterRoleBinding,
    GetDeployment,
    CreateDeployment,
    ReplaceDeployment,
    Ping,
}

impl Operation {
    /// Whether the call changes cluster state
    pub fn is_mutation(&self) -> bool {
        !matches!(
            self,
            Self::GetNamespace | Self::ListNamespaces | Self::GetDeployment | Self::Ping
        )
    }
}

type NamespacedKey = (String, String);

#[derive(Default)]
struct ClusterState {
    namespaces: BTreeMap<String, Namespace>,
    service_accounts: BTreeMap<NamespacedKey, ServiceAccount>,
    cluster_roles: BTreeMap<String, ClusterRole>,
    cluster_role_bindings: BTreeMap<String, ClusterRoleBinding>,
    deployments: BTreeMap<NamespacedKey, Deployment>,
    next_version: u64,
    failures: HashMap<Operation, PlatformError>,
    delays: HashMap<Operation, Duration>,
    calls: Vec<Operation>,
}

impl ClusterState {
    /// Record the call and return an injected failure if one is armed
    fn enter(&mut self, op: Operation) -> PlatformResult<()> {
        self.calls.push(op);
        match self.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn stamp(&mut self, meta: &mut ObjectMeta) {
        self.next_version += 1;
        meta.resource_version = Some(self.next_version.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(uuid::Uuid::new_v4().to_string());
        }
        if meta.creation_timestamp.is_none() {
            meta.creation_timestamp = Some(Time(Utc::now()));
        }
    }

    fn require_namespace(&self, namespace: &str) -> PlatformResult<()> {
        if self.namespaces.contains_key(namespace) {
            Ok(())
        } else {
            Err(PlatformError::not_found("Namespace", namespace))
        }
    }
}

/// Kubernetes double backed by process memory
#[derive(Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
    latency_ms: AtomicU64,
}

impl InMemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`, simulating a slow API server
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Delay only calls of `op`, on top of the general latency
    pub async fn delay_operation(&self, op: Operation, delay: Duration) {
        self.state.lock().await.delays.insert(op, delay);
    }

    async fn begin(&self, op: Operation) -> PlatformResult<MutexGuard<'_, ClusterState>> {
        let extra = self.state.lock().await.delays.get(&op).copied();
        let delay = Duration::from_millis(self.latency_ms.load(Ordering::Relaxed))
            + extra.unwrap_or_default();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.enter(op)?;
        Ok(state)
    }

    /// Make every subsequent call of `op` fail with `err`
    pub async fn inject_failure(&self, op: Operation, err: PlatformError) {
        self.state.lock().await.failures.insert(op, err);
    }

    pub async fn clear_failures(&self) {
        let mut state = self.state.lock().await;
        state.failures.clear();
        state.delays.clear();
    }

    /// Every call made so far, in order
    pub async fn calls(&self) -> Vec<Operation> {
        self.state.lock().await.calls.clone()
    }

    /// Number of state-changing calls made so far
    pub async fn mutation_count(&self) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|op| op.is_mutation())
            .count()
    }

    /// Store a namespace as-is, bypassing the create path
    pub async fn insert_namespace(&self, mut namespace: Namespace) {
        let mut state = self.state.lock().await;
        state.stamp(&mut namespace.metadata);
        let name = namespace.metadata.name.clone().unwrap_or_default();
        state.namespaces.insert(name, namespace);
    }

    /// Mutate a deployment's status in place, as a controller would
    ///
    /// The sync observes the current generation and starts from the desired
    /// replica count when the status is still empty.
    pub async fn update_deployment_status<F>(
        &self,
        namespace: &str,
        name: &str,
        update: F,
    ) -> PlatformResult<()>
    where
        F: FnOnce(&mut DeploymentStatus),
    {
        let mut state = self.state.lock().await;
        let key = (namespace.to_string(), name.to_string());
        let deployment = state
            .deployments
            .get_mut(&key)
            .ok_or_else(|| PlatformError::not_found("Deployment", name))?;

        let generation = deployment.metadata.generation;
        let desired = deployment.spec.as_ref().and_then(|spec| spec.replicas).unwrap_or(1);
        let status = deployment.status.get_or_insert_with(Default::default);
        status.observed_generation = generation;
        status.replicas.get_or_insert(desired);
        status.ready_replicas.get_or_insert(0);

        update(status);
        Ok(())
    }

    /// Simulate pods becoming ready
    pub async fn set_ready_replicas(
        &self,
        namespace: &str,
        name: &str,
        ready: i32,
    ) -> PlatformResult<()> {
        self.update_deployment_status(namespace, name, |status| {
            status.ready_replicas = Some(ready);
            status.available_replicas = Some(ready);
        })
        .await
    }

    pub async fn set_replicas(&self, namespace: &str, name: &str, replicas: i32) -> PlatformResult<()> {
        self.update_deployment_status(namespace, name, |status| {
            status.replicas = Some(replicas);
        })
        .await
    }

    pub async fn namespace_count(&self) -> usize {
        self.state.lock().await.namespaces.len()
    }

    pub async fn has_cluster_role(&self, name: &str) -> bool {
        self.state.lock().await.cluster_roles.contains_key(name)
    }

    pub async fn has_cluster_role_binding(&self, name: &str) -> bool {
        self.state.lock().await.cluster_role_bindings.contains_key(name)
    }

    pub async fn has_service_account(&self, namespace: &str, name: &str) -> bool {
        self.state
            .lock()
            .await
            .service_accounts
            .contains_key(&(namespace.to_string(), name.to_string()))
    }
}

/// Match a selector of comma-separated `key`, `key=value`, `key==value` or `key!=value` terms
fn matches_selector(labels: Option<&BTreeMap<String, String>>, selector: &str) -> bool {
    let empty = BTreeMap::new();
    let labels = labels.unwrap_or(&empty);

    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
                labels.get(key.trim()).map(String::as_str) == Some(value.trim())
            } else if let Some(key) = term.strip_prefix('!') {
                !labels.contains_key(key.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

/// Reject a deployment whose pod template does not match its own selector
fn check_selector(deployment: &Deployment) -> PlatformResult<()> {
    let Some(spec) = deployment.spec.as_ref() else {
        return Ok(());
    };
    let template_labels = spec.template.metadata.as_ref().and_then(|m| m.labels.as_ref());

    let mismatched: Vec<&String> = spec
        .selector
        .match_labels
        .iter()
        .flatten()
        .filter(|(key, value)| template_labels.and_then(|l| l.get(*key)) != Some(*value))
        .map(|(key, _)| key)
        .collect();

    if mismatched.is_empty() {
        Ok(())
    } else {
        Err(PlatformError::Api {
            code: 422,
            message: format!(
                "Deployment '{}' is invalid: selector does not match template labels ({:?})",
                name_of(&deployment.metadata),
                mismatched
            ),
        })
    }
}

fn name_of(meta: &ObjectMeta) -> String {
    meta.name.clone().unwrap_or_default()
}

#[async_trait]
impl ClusterApi for InMemoryCluster {
    async fn get_namespace(&self, name: &str) -> PlatformResult<Namespace> {
        let mut state = self.begin(Operation::GetNamespace).await?;
        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| PlatformError::not_found("Namespace", name))
    }

    async fn list_namespaces(&self, label_selector: &str) -> PlatformResult<Vec<Namespace>> {
        let mut state = self.begin(Operation::ListNamespaces).await?;
        Ok(state
            .namespaces
            .values()
            .filter(|ns| matches_selector(ns.metadata.labels.as_ref(), label_selector))
            .cloned()
            .collect())
    }

    async fn create_namespace(&self, namespace: &Namespace) -> PlatformResult<Namespace> {
        let mut state = self.begin(Operation::CreateNamespace).await?;

        let name = name_of(&namespace.metadata);
        if state.namespaces.contains_key(&name) {
            return Err(PlatformError::already_exists("Namespace", &name));
        }

        let mut stored = namespace.clone();
        state.stamp(&mut stored.metadata);
        state.namespaces.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_namespace(&self, name: &str) -> PlatformResult<()> {
        let mut state = self.begin(Operation::DeleteNamespace).await?;

        if state.namespaces.remove(name).is_none() {
            return Err(PlatformError::not_found("Namespace", name));
        }

        state.service_accounts.retain(|(ns, _), _| ns != name);
        state.deployments.retain(|(ns, _), _| ns != name);
        Ok(())
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> PlatformResult<ServiceAccount> {
        let mut state = self.begin(Operation::CreateServiceAccount).await?;
        state.require_namespace(namespace)?;

        let key = (namespace.to_string(), name_of(&account.metadata));
        if state.service_accounts.contains_key(&key) {
            return Err(PlatformError::already_exists("ServiceAccount", &key.1));
        }

        let mut stored = account.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        state.stamp(&mut stored.metadata);
        state.service_accounts.insert(key, stored.clone());
        Ok(stored)
    }

    async fn create_cluster_role(&self, role: &ClusterRole) -> PlatformResult<ClusterRole> {
        let mut state = self.begin(Operation::CreateClusterRole).await?;

        let name = name_of(&role.metadata);
        if state.cluster_roles.contains_key(&name) {
            return Err(PlatformError::already_exists("ClusterRole", &name));
        }

        let mut stored = role.clone();
        state.stamp(&mut stored.metadata);
        state.cluster_roles.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_cluster_role(&self, name: &str) -> PlatformResult<()> {
        let mut state = self.begin(Operation::DeleteClusterRole).await?;
        state
            .cluster_roles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found("ClusterRole", name))
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> PlatformResult<ClusterRoleBinding> {
        let mut state = self.begin(Operation::CreateClusterRoleBinding).await?;

        let name = name_of(&binding.metadata);
        if state.cluster_role_bindings.contains_key(&name) {
            return Err(PlatformError::already_exists("ClusterRoleBinding", &name));
        }

        let mut stored = binding.clone();
        state.stamp(&mut stored.metadata);
        state.cluster_role_bindings.insert(name, stored.clone());
        Ok(stored)
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> PlatformResult<()> {
        let mut state = self.begin(Operation::DeleteClusterRoleBinding).await?;
        state
            .cluster_role_bindings
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found("ClusterRoleBinding", name))
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> PlatformResult<Deployment> {
        let mut state = self.begin(Operation::GetDeployment).await?;
        state
            .deployments
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| PlatformError::not_found("Deployment", name))
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> PlatformResult<Deployment> {
        let mut state = self.begin(Operation::CreateDeployment).await?;
        state.require_namespace(namespace)?;

        let key = (namespace.to_string(), name_of(&deployment.metadata));
        if state.deployments.contains_key(&key) {
            return Err(PlatformError::already_exists("Deployment", &key.1));
        }

        check_selector(deployment)?;

        let mut stored = deployment.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.generation = Some(1);
        stored.status = None;
        state.stamp(&mut stored.metadata);

        state.deployments.insert(key, stored.clone());
        Ok(stored)
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> PlatformResult<Deployment> {
        let mut state = self.begin(Operation::ReplaceDeployment).await?;

        let name = name_of(&deployment.metadata);
        let key = (namespace.to_string(), name.clone());
        let current = state
            .deployments
            .get(&key)
            .cloned()
            .ok_or_else(|| PlatformError::not_found("Deployment", &name))?;

        if let Some(version) = &deployment.metadata.resource_version {
            if current.metadata.resource_version.as_ref() != Some(version) {
                return Err(PlatformError::Conflict(format!(
                    "Deployment '{}' was modified; resource version {} is stale",
                    name, version
                )));
            }
        }

        check_selector(deployment)?;

        let mut stored = deployment.clone();
        stored.metadata.uid = current.metadata.uid.clone();
        stored.metadata.creation_timestamp = current.metadata.creation_timestamp.clone();
        stored.metadata.namespace = Some(namespace.to_string());
        stored.metadata.generation = current.metadata.generation.map(|g| g + 1);
        stored.status = current.status.clone();
        state.stamp(&mut stored.metadata);

        state.deployments.insert(key, stored.clone());
        Ok(stored)
    }

    async fn ping(&self) -> PlatformResult<()> {
        self.begin(Operation::Ping).await.map(drop)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;

    fn namespace(name: &str, labels: &[(&str, &str)]) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                labels: Some(
                    labels
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn deployment(name: &str) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_namespace_twice_conflicts() {
        let cluster = InMemoryCluster::new();
        let created = cluster.create_namespace(&namespace("a", &[])).await.unwrap();
        assert!(created.metadata.creation_timestamp.is_some());
        assert!(created.metadata.uid.is_some());

        let err = cluster.create_namespace(&namespace("a", &[])).await.unwrap_err();
        assert!(err.is_already_exists());
    }

    #[tokio::test]
    async fn test_namespace_delete_cascades() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("a", &[])).await.unwrap();
        cluster.create_deployment("a", &deployment("d")).await.unwrap();

        cluster.delete_namespace("a").await.unwrap();
        assert!(cluster.get_deployment("a", "d").await.unwrap_err().is_not_found());
        assert!(cluster.delete_namespace("a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_new_deployment_has_no_status_until_synced() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("a", &[])).await.unwrap();
        let created = cluster.create_deployment("a", &deployment("d")).await.unwrap();
        assert!(created.status.is_none());
        assert_eq!(created.metadata.generation, Some(1));

        cluster.set_ready_replicas("a", "d", 0).await.unwrap();
        let status = cluster.get_deployment("a", "d").await.unwrap().status.unwrap();
        assert_eq!(status.replicas, Some(1));
        assert_eq!(status.ready_replicas, Some(0));
        assert_eq!(status.observed_generation, Some(1));
    }

    #[tokio::test]
    async fn test_replace_rejects_template_outside_selector() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("a", &[])).await.unwrap();

        let mut d = deployment("d");
        let labels = BTreeMap::from([("app".to_string(), "op".to_string())]);
        let spec = d.spec.as_mut().unwrap();
        spec.selector.match_labels = Some(labels.clone());
        spec.template.metadata = Some(ObjectMeta {
            labels: Some(labels),
            ..Default::default()
        });
        let mut stored = cluster.create_deployment("a", &d).await.unwrap();

        stored
            .spec
            .as_mut()
            .unwrap()
            .template
            .metadata
            .as_mut()
            .unwrap()
            .labels
            .as_mut()
            .unwrap()
            .insert("app".to_string(), "other".to_string());

        let err = cluster.replace_deployment("a", &stored).await.unwrap_err();
        assert!(matches!(err, PlatformError::Api { code: 422, .. }));
    }

    #[tokio::test]
    async fn test_operation_delay_applies_to_one_operation() {
        let cluster = InMemoryCluster::new();
        cluster
            .delay_operation(Operation::CreateNamespace, Duration::from_millis(200))
            .await;

        let slow = tokio::time::timeout(
            Duration::from_millis(50),
            cluster.create_namespace(&namespace("a", &[])),
        )
        .await;
        assert!(slow.is_err());
        assert_eq!(cluster.namespace_count().await, 0);

        let fast = tokio::time::timeout(Duration::from_millis(50), cluster.ping()).await;
        assert!(matches!(fast, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_replace_with_stale_version_conflicts() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("a", &[])).await.unwrap();
        let first = cluster.create_deployment("a", &deployment("d")).await.unwrap();

        cluster.replace_deployment("a", &first).await.unwrap();
        let err = cluster.replace_deployment("a", &first).await.unwrap_err();
        assert!(matches!(err, PlatformError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_create_in_missing_namespace_fails() {
        let cluster = InMemoryCluster::new();
        let err = cluster.create_deployment("nope", &deployment("d")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_label_selector_filters_namespaces() {
        let cluster = InMemoryCluster::new();
        cluster.create_namespace(&namespace("a", &[("client", "a")])).await.unwrap();
        cluster.create_namespace(&namespace("b", &[("client", "b")])).await.unwrap();
        cluster.create_namespace(&namespace("c", &[])).await.unwrap();

        assert_eq!(cluster.list_namespaces("client").await.unwrap().len(), 2);
        assert_eq!(cluster.list_namespaces("client=b").await.unwrap().len(), 1);
        assert_eq!(cluster.list_namespaces("client!=b").await.unwrap().len(), 2);
        assert_eq!(cluster.list_namespaces("").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure_is_returned_and_recorded() {
        let cluster = InMemoryCluster::new();
        cluster
            .inject_failure(Operation::Ping, PlatformError::Transport("down".into()))
            .await;

        assert!(cluster.ping().await.is_err());
        assert_eq!(cluster.calls().await, vec![Operation::Ping]);
        assert_eq!(cluster.mutation_count().await, 0);

        cluster.clear_failures().await;
        assert!(cluster.ping().await.is_ok());
    }
}
