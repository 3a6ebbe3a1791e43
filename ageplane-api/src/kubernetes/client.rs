//! Kubernetes client wrapper
//!
//! Wraps the kube-rs Client and implements [`ClusterApi`] on top of it.

use super::error::{PlatformError, PlatformResult};
use super::platform::ClusterApi;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{Namespace, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::api::{Api, DeleteParams, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::path::Path;

/// Wrapper around kube-rs Client
#[derive(Clone)]
pub struct K8sClient {
    inner: Client,
    api_server: String,
}

impl K8sClient {
    /// Create client from a kubeconfig file with optional context
    pub async fn from_kubeconfig(path: &Path, context: Option<&str>) -> PlatformResult<Self> {
        let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
            PlatformError::InvalidConfig(format!(
                "Failed to read kubeconfig {}: {}",
                path.display(),
                e
            ))
        })?;

        let config = Config::from_custom_kubeconfig(
            kubeconfig,
            &KubeConfigOptions {
                context: context.map(String::from),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| PlatformError::InvalidConfig(format!("Failed to create config: {}", e)))?;

        Self::from_config(config)
    }

    /// Create client from in-cluster configuration (for running inside K8s)
    pub fn from_incluster() -> PlatformResult<Self> {
        let config = Config::incluster().map_err(|e| {
            PlatformError::InvalidConfig(format!("Failed to get in-cluster config: {}", e))
        })?;

        Self::from_config(config)
    }

    /// Try in-cluster configuration first, then the default kubeconfig
    pub async fn infer() -> PlatformResult<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| PlatformError::InvalidConfig(format!("Failed to infer config: {}", e)))?;

        Self::from_config(config)
    }

    fn from_config(config: Config) -> PlatformResult<Self> {
        let api_server = config.cluster_url.to_string();

        let client = Client::try_from(config)
            .map_err(|e| PlatformError::InvalidConfig(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            inner: client,
            api_server,
        })
    }

    /// Get the inner kube-rs Client
    pub fn inner(&self) -> &Client {
        &self.inner
    }

    /// Get API server URL
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.inner.clone())
    }

    fn cluster_roles(&self) -> Api<ClusterRole> {
        Api::all(self.inner.clone())
    }

    fn cluster_role_bindings(&self) -> Api<ClusterRoleBinding> {
        Api::all(self.inner.clone())
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.inner.clone(), namespace)
    }
}

fn object_name(meta: &k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta) -> &str {
    meta.name.as_deref().unwrap_or_default()
}

#[async_trait]
impl ClusterApi for K8sClient {
    async fn get_namespace(&self, name: &str) -> PlatformResult<Namespace> {
        self.namespaces()
            .get(name)
            .await
            .map_err(|e| PlatformError::from_kube(e, "Namespace", name))
    }

    async fn list_namespaces(&self, label_selector: &str) -> PlatformResult<Vec<Namespace>> {
        let params = ListParams::default().labels(label_selector);
        let list = self
            .namespaces()
            .list(&params)
            .await
            .map_err(|e| PlatformError::from_kube(e, "Namespace", label_selector))?;

        Ok(list.items)
    }

    async fn create_namespace(&self, namespace: &Namespace) -> PlatformResult<Namespace> {
        self.namespaces()
            .create(&PostParams::default(), namespace)
            .await
            .map_err(|e| PlatformError::from_kube(e, "Namespace", object_name(&namespace.metadata)))
    }

    async fn delete_namespace(&self, name: &str) -> PlatformResult<()> {
        self.namespaces()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| PlatformError::from_kube(e, "Namespace", name))?;

        Ok(())
    }

    async fn create_service_account(
        &self,
        namespace: &str,
        account: &ServiceAccount,
    ) -> PlatformResult<ServiceAccount> {
        let accounts: Api<ServiceAccount> = Api::namespaced(self.inner.clone(), namespace);
        accounts
            .create(&PostParams::default(), account)
            .await
            .map_err(|e| {
                PlatformError::from_kube(e, "ServiceAccount", object_name(&account.metadata))
            })
    }

    async fn create_cluster_role(&self, role: &ClusterRole) -> PlatformResult<ClusterRole> {
        self.cluster_roles()
            .create(&PostParams::default(), role)
            .await
            .map_err(|e| PlatformError::from_kube(e, "ClusterRole", object_name(&role.metadata)))
    }

    async fn delete_cluster_role(&self, name: &str) -> PlatformResult<()> {
        self.cluster_roles()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| PlatformError::from_kube(e, "ClusterRole", name))?;

        Ok(())
    }

    async fn create_cluster_role_binding(
        &self,
        binding: &ClusterRoleBinding,
    ) -> PlatformResult<ClusterRoleBinding> {
        self.cluster_role_bindings()
            .create(&PostParams::default(), binding)
            .await
            .map_err(|e| {
                PlatformError::from_kube(e, "ClusterRoleBinding", object_name(&binding.metadata))
            })
    }

    async fn delete_cluster_role_binding(&self, name: &str) -> PlatformResult<()> {
        self.cluster_role_bindings()
            .delete(name, &DeleteParams::default())
            .await
            .map_err(|e| PlatformError::from_kube(e, "ClusterRoleBinding", name))?;

        Ok(())
    }

    async fn get_deployment(&self, namespace: &str, name: &str) -> PlatformResult<Deployment> {
        self.deployments(namespace)
            .get(name)
            .await
            .map_err(|e| PlatformError::from_kube(e, "Deployment", name))
    }

    async fn create_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> PlatformResult<Deployment> {
        self.deployments(namespace)
            .create(&PostParams::default(), deployment)
            .await
            .map_err(|e| {
                PlatformError::from_kube(e, "Deployment", object_name(&deployment.metadata))
            })
    }

    async fn replace_deployment(
        &self,
        namespace: &str,
        deployment: &Deployment,
    ) -> PlatformResult<Deployment> {
        let name = object_name(&deployment.metadata);
        self.deployments(namespace)
            .replace(name, &PostParams::default(), deployment)
            .await
            .map_err(|e| PlatformError::from_kube(e, "Deployment", name))
    }

    async fn ping(&self) -> PlatformResult<()> {
        self.inner
            .apiserver_version()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;

        Ok(())
    }

    fn backend(&self) -> &'static str {
        "kubernetes"
    }
}
