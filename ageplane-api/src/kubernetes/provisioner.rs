//! Customer instance provisioning
//!
//! Entry points for create, get, list, update and delete. Creation and
//! deletion run as an ordered list of steps with one recorded outcome per
//! step. Nothing is rolled back: a failed step leaves the earlier steps in
//! place and the report says which ones ran.
//!
//! Create and delete bound every platform call by the deadline, so a slow
//! step ends up in the report as a failure. Get, list and update bound the
//! whole call.

use super::directory::{InstanceIndex, LabelScanIndex, ListFilter};
use super::error::{PlatformError, PlatformResult, ProvisionError, ProvisionResult};
use super::mutation;
use super::naming::ResourceNames;
use super::platform::ClusterApi;
use super::resources::{ResourceBuilder, WorkloadProfile};
use super::status::{self, InstanceSnapshot};
use crate::validation;
use ageplane_common::{CreateCustomerRequest, CustomerInstance, UpdateCustomerRequest};
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on a single platform step, or on a whole read/update
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Multi-step operations that produce a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create => write!(f, "create"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// One physical resource of a customer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProvisionStep {
    Namespace,
    ServiceAccount,
    ClusterRole,
    ClusterRoleBinding,
    Deployment,
}

impl ProvisionStep {
    /// Creation order
    pub const CREATE_ORDER: [ProvisionStep; 5] = [
        Self::Namespace,
        Self::ServiceAccount,
        Self::ClusterRole,
        Self::ClusterRoleBinding,
        Self::Deployment,
    ];

    /// Deletion order; namespaced resources go with their namespace
    pub const DELETE_ORDER: [ProvisionStep; 3] =
        [Self::Namespace, Self::ClusterRole, Self::ClusterRoleBinding];

    fn resource_name(self, names: &ResourceNames) -> &str {
        match self {
            Self::Namespace => &names.namespace,
            Self::ServiceAccount => &names.service_account,
            Self::ClusterRole => &names.cluster_role,
            Self::ClusterRoleBinding => &names.cluster_role_binding,
            Self::Deployment => &names.deployment,
        }
    }
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Namespace => "namespace",
            Self::ServiceAccount => "service-account",
            Self::ClusterRole => "cluster-role",
            Self::ClusterRoleBinding => "cluster-role-binding",
            Self::Deployment => "deployment",
        };
        write!(f, "{}", s)
    }
}

/// What happened to one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "error", rename_all = "kebab-case")]
pub enum StepOutcome {
    Completed,
    /// Deletion found nothing to delete
    AlreadyAbsent,
    Failed(String),
    /// An earlier step failed and creation stopped
    NotAttempted,
}

impl StepOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: ProvisionStep,
    pub resource: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

/// Per-step outcome of a create or delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationReport {
    pub operation: OperationKind,
    pub customer: String,
    pub steps: Vec<StepRecord>,
}

impl OperationReport {
    fn new(operation: OperationKind, customer: &str) -> Self {
        Self {
            operation,
            customer: customer.to_string(),
            steps: Vec::new(),
        }
    }

    fn record(&mut self, step: ProvisionStep, names: &ResourceNames, outcome: StepOutcome) {
        self.steps.push(StepRecord {
            step,
            resource: step.resource_name(names).to_string(),
            outcome,
        });
    }

    pub fn succeeded(&self) -> bool {
        !self.steps.iter().any(|s| s.outcome.is_failure())
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| s.outcome.is_failure())
    }

    /// Steps whose resource is known to exist (create) or be gone (delete)
    pub fn completed_steps(&self) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(|s| {
            matches!(s.outcome, StepOutcome::Completed | StepOutcome::AlreadyAbsent)
        })
    }
}

impl fmt::Display for OperationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures: Vec<String> = self
            .failed_steps()
            .map(|s| match &s.outcome {
                StepOutcome::Failed(err) => format!("{} ({})", s.step, err),
                _ => s.step.to_string(),
            })
            .collect();
        let completed: Vec<String> = self.completed_steps().map(|s| s.step.to_string()).collect();

        if failures.is_empty() {
            return write!(f, "{} of customer '{}' completed", self.operation, self.customer);
        }

        write!(
            f,
            "{} of customer '{}' partially failed: {}",
            self.operation,
            self.customer,
            failures.join(", ")
        )?;
        if !completed.is_empty() {
            write!(f, "; completed steps: {}", completed.join(", "))?;
        }
        Ok(())
    }
}

/// Orchestrates the lifecycle of customer instances
pub struct CustomerProvisioner {
    cluster: Arc<dyn ClusterApi>,
    index: Arc<dyn InstanceIndex>,
    profile: WorkloadProfile,
    deadline: Duration,
}

impl CustomerProvisioner {
    pub fn new(cluster: Arc<dyn ClusterApi>, profile: WorkloadProfile) -> Self {
        Self {
            index: Arc::new(LabelScanIndex::new(cluster.clone())),
            cluster,
            profile,
            deadline: DEFAULT_OPERATION_TIMEOUT,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_index(mut self, index: Arc<dyn InstanceIndex>) -> Self {
        self.index = index;
        self
    }

    pub fn cluster(&self) -> &Arc<dyn ClusterApi> {
        &self.cluster
    }

    /// Run an operation under the configured deadline
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> ProvisionResult<T>
    where
        F: Future<Output = ProvisionResult<T>>,
    {
        match tokio::time::timeout(self.deadline, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, deadline = ?self.deadline, "Operation timed out");
                Err(ProvisionError::upstream(
                    format!("Failed to {} customer instance", operation),
                    PlatformError::Timeout(self.deadline),
                ))
            }
        }
    }

    /// Run one platform call under the configured deadline
    async fn step<T, F>(&self, fut: F) -> PlatformResult<T>
    where
        F: Future<Output = PlatformResult<T>>,
    {
        tokio::time::timeout(self.deadline, fut)
            .await
            .unwrap_or_else(|_| Err(PlatformError::Timeout(self.deadline)))
    }

    fn check_name(customer: &str) -> ProvisionResult<()> {
        validation::validate_customer_name(customer).map_err(|e| match e {
            ageplane_common::Error::Validation(msg) => ProvisionError::InvalidName(msg),
            other => ProvisionError::InvalidName(other.to_string()),
        })
    }

    /// Provision a new customer instance
    pub async fn create(&self, request: &CreateCustomerRequest) -> ProvisionResult<CustomerInstance> {
        Self::check_name(&request.name)?;
        self.create_inner(request).await
    }

    async fn create_inner(&self, request: &CreateCustomerRequest) -> ProvisionResult<CustomerInstance> {
        let customer = request.name.as_str();
        let builder = ResourceBuilder::new(&self.profile, request);
        let names = builder.names().clone();

        match self.step(self.cluster.get_namespace(&names.namespace)).await {
            Ok(_) => return Err(ProvisionError::AlreadyExists(customer.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(ProvisionError::upstream("Failed to check namespace", e)),
        }

        let mut report = OperationReport::new(OperationKind::Create, customer);
        let mut namespace = None;
        let mut deployment = None;

        for (position, step) in ProvisionStep::CREATE_ORDER.into_iter().enumerate() {
            let result = match step {
                ProvisionStep::Namespace => self
                    .step(self.cluster.create_namespace(&builder.namespace()))
                    .await
                    .map(|ns| namespace = Some(ns)),
                ProvisionStep::ServiceAccount => self
                    .step(
                        self.cluster
                            .create_service_account(&names.namespace, &builder.service_account()),
                    )
                    .await
                    .map(drop),
                ProvisionStep::ClusterRole => self
                    .step(self.cluster.create_cluster_role(&builder.cluster_role()))
                    .await
                    .map(drop),
                ProvisionStep::ClusterRoleBinding => self
                    .step(
                        self.cluster
                            .create_cluster_role_binding(&builder.cluster_role_binding()),
                    )
                    .await
                    .map(drop),
                ProvisionStep::Deployment => self
                    .step(
                        self.cluster
                            .create_deployment(&names.namespace, &builder.deployment()),
                    )
                    .await
                    .map(|d| deployment = Some(d)),
            };

            match result {
                Ok(()) => {
                    info!(customer, step = %step, resource = step.resource_name(&names), "Created resource");
                    report.record(step, &names, StepOutcome::Completed);
                }
                Err(err) => {
                    warn!(customer, step = %step, error = %err, "Provisioning step failed");

                    if position == 0 {
                        return Err(if err.is_already_exists() {
                            ProvisionError::AlreadyExists(customer.to_string())
                        } else {
                            ProvisionError::upstream("Failed to create namespace", err)
                        });
                    }

                    report.record(step, &names, StepOutcome::Failed(err.to_string()));
                    for remaining in &ProvisionStep::CREATE_ORDER[position + 1..] {
                        report.record(*remaining, &names, StepOutcome::NotAttempted);
                    }
                    return Err(ProvisionError::PartialFailure(report));
                }
            }
        }

        let (Some(namespace), Some(deployment)) = (namespace, deployment) else {
            return Err(ProvisionError::upstream(
                "Platform returned no objects",
                PlatformError::Transport("empty create response".to_string()),
            ));
        };

        info!(customer, "Customer instance provisioned");
        let snapshot = InstanceSnapshot {
            namespace,
            deployment,
        };
        Ok(status::project(
            customer,
            &snapshot,
            &self.profile.container_name,
            Utc::now(),
        ))
    }

    /// Current state of one customer instance
    pub async fn get(&self, customer: &str) -> ProvisionResult<CustomerInstance> {
        Self::check_name(customer)?;
        self.bounded("get", self.get_inner(customer)).await
    }

    async fn get_inner(&self, customer: &str) -> ProvisionResult<CustomerInstance> {
        let snapshot = status::load_snapshot(self.cluster.as_ref(), customer).await?;
        Ok(status::project(
            customer,
            &snapshot,
            &self.profile.container_name,
            Utc::now(),
        ))
    }

    /// All customer instances, sorted by name
    ///
    /// Instances that cannot be projected are logged and left out.
    pub async fn list(&self, filter: &ListFilter) -> ProvisionResult<Vec<CustomerInstance>> {
        self.bounded("list", self.list_inner(filter)).await
    }

    async fn list_inner(&self, filter: &ListFilter) -> ProvisionResult<Vec<CustomerInstance>> {
        let keys = self
            .index
            .customer_keys()
            .await
            .map_err(|e| ProvisionError::upstream("Failed to list customer instances", e))?;

        let results = join_all(keys.iter().map(|key| self.get_inner(key))).await;

        let mut instances = Vec::with_capacity(keys.len());
        for (key, result) in keys.iter().zip(results) {
            match result {
                Ok(instance) if filter.matches(instance.status.phase) => instances.push(instance),
                Ok(_) => {}
                Err(e) => warn!(customer = %key, error = %e, "Skipping customer instance"),
            }
        }

        Ok(instances)
    }

    /// Apply a partial update to the customer's workload
    pub async fn update(
        &self,
        customer: &str,
        update: &UpdateCustomerRequest,
    ) -> ProvisionResult<CustomerInstance> {
        Self::check_name(customer)?;
        self.bounded("update", self.update_inner(customer, update)).await
    }

    async fn update_inner(
        &self,
        customer: &str,
        update: &UpdateCustomerRequest,
    ) -> ProvisionResult<CustomerInstance> {
        let names = ResourceNames::for_customer(customer);

        let mut deployment = match self
            .cluster
            .get_deployment(&names.namespace, &names.deployment)
            .await
        {
            Ok(d) => d,
            Err(e) if e.is_not_found() => return Err(ProvisionError::NotFound(customer.to_string())),
            Err(e) => return Err(ProvisionError::upstream("Failed to get deployment", e)),
        };

        if mutation::apply_update(&mut deployment, update, &self.profile.container_name) {
            deployment = self
                .cluster
                .replace_deployment(&names.namespace, &deployment)
                .await
                .map_err(|e| ProvisionError::upstream("Failed to update deployment", e))?;
            info!(customer, "Customer instance updated");
        } else {
            debug!(customer, "Update request changed nothing");
        }

        let namespace = match self.cluster.get_namespace(&names.namespace).await {
            Ok(ns) => ns,
            Err(e) if e.is_not_found() => return Err(ProvisionError::NotFound(customer.to_string())),
            Err(e) => return Err(ProvisionError::upstream("Failed to get namespace", e)),
        };

        let snapshot = InstanceSnapshot {
            namespace,
            deployment,
        };
        Ok(status::project(
            customer,
            &snapshot,
            &self.profile.container_name,
            Utc::now(),
        ))
    }

    /// Delete every resource of a customer instance
    ///
    /// Deleting an absent customer succeeds; each step reports `AlreadyAbsent`.
    /// A failed or timed-out step does not stop the remaining ones.
    pub async fn delete(&self, customer: &str) -> ProvisionResult<OperationReport> {
        Self::check_name(customer)?;
        self.delete_inner(customer).await
    }

    async fn delete_inner(&self, customer: &str) -> ProvisionResult<OperationReport> {
        let names = ResourceNames::for_customer(customer);
        let mut report = OperationReport::new(OperationKind::Delete, customer);

        for step in ProvisionStep::DELETE_ORDER {
            let name = step.resource_name(&names);
            let result = match step {
                ProvisionStep::Namespace => self.step(self.cluster.delete_namespace(name)).await,
                ProvisionStep::ClusterRole => {
                    self.step(self.cluster.delete_cluster_role(name)).await
                }
                ProvisionStep::ClusterRoleBinding => {
                    self.step(self.cluster.delete_cluster_role_binding(name)).await
                }
                ProvisionStep::ServiceAccount | ProvisionStep::Deployment => Ok(()),
            };

            let outcome = match result {
                Ok(()) => {
                    info!(customer, step = %step, resource = name, "Deleted resource");
                    StepOutcome::Completed
                }
                Err(e) if e.is_not_found() => {
                    debug!(customer, step = %step, resource = name, "Resource already absent");
                    StepOutcome::AlreadyAbsent
                }
                Err(e) => {
                    warn!(customer, step = %step, error = %e, "Deletion step failed");
                    StepOutcome::Failed(e.to_string())
                }
            };
            report.record(step, &names, outcome);
        }

        if report.succeeded() {
            info!(customer, "Customer instance deleted");
            Ok(report)
        } else {
            Err(ProvisionError::PartialFailure(report))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> ResourceNames {
        ResourceNames::for_customer("acme")
    }

    #[test]
    fn test_report_display_lists_failures_and_completions() {
        let mut report = OperationReport::new(OperationKind::Create, "acme");
        report.record(ProvisionStep::Namespace, &names(), StepOutcome::Completed);
        report.record(
            ProvisionStep::ServiceAccount,
            &names(),
            StepOutcome::Failed("boom".to_string()),
        );

        let text = report.to_string();
        assert!(text.contains("service-account (boom)"));
        assert!(text.contains("completed steps: namespace"));
        assert!(!report.succeeded());
    }

    #[test]
    fn test_report_serializes_outcomes() {
        let mut report = OperationReport::new(OperationKind::Delete, "acme");
        report.record(ProvisionStep::Namespace, &names(), StepOutcome::AlreadyAbsent);
        report.record(
            ProvisionStep::ClusterRole,
            &names(),
            StepOutcome::Failed("forbidden".to_string()),
        );

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["operation"], "delete");
        assert_eq!(json["steps"][0]["step"], "namespace");
        assert_eq!(json["steps"][0]["outcome"], "already-absent");
        assert_eq!(json["steps"][0]["resource"], "postgres-operator-acme");
        assert_eq!(json["steps"][1]["outcome"], "failed");
        assert_eq!(json["steps"][1]["error"], "forbidden");
    }

    #[test]
    fn test_delete_order_skips_namespaced_resources() {
        assert_eq!(ProvisionStep::DELETE_ORDER[0], ProvisionStep::Namespace);
        assert!(!ProvisionStep::DELETE_ORDER.contains(&ProvisionStep::Deployment));
    }
}
