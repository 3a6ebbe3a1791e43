//! Cluster platform seam
//!
//! The provisioning engine only ever talks to the cluster through
//! [`ClusterApi`], so the live kube-rs client and the in-memory double are
//! interchangeable.

use super::error::PlatformResult;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};

/// Calls the provisioning engine makes against the cluster
///
/// Create calls return the object as stored by the platform (with uid,
/// resource version and creation timestamp filled in).
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_namespace(&self, name: &str) -> PlatformResult<Namespace>;

    /// List namespaces matching a label selector such as `key` or `key=value`
    async fn list_namespaces(&self, label_selector: &str) -> PlatformResult<Vec<Namespace>>;

    async fn create_namespace(&self, namespace: &Namespace) -> PlatformResult<Namespace>;

    /// Delete a namespace and, by cascade, everything inside it
    async fn delete_namespace(&self, name: &str) -> PlatformResult<()>;

    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> PlatformResult<ServiceAccount>;

    async fn create_cluster_role(&self, role: &ClusterRole) -> PlatformResult<ClusterRole>;

    async fn delete_cluster_role(&self, name: &str) -> PlatformResult<()>;

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> PlatformResult<ClusterRoleBinding>;

    async fn delete_cluster_role_binding(&self, name: &str) -> PlatformResult<()>;

    async fn get_deployment(&self, namespace: &str, name: &str) -> PlatformResult<Deployment>;

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> PlatformResult<Deployment>;

    /// Replace a deployment; fails with `Conflict` when its resource version is stale
    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> PlatformResult<Deployment>;

    /// Cheap reachability probe used by readiness checks
    async fn ping(&self) -> PlatformResult<()>;

    /// Short backend description for logs and the service descriptor
    fn backend(&self) -> &'static str;
}
