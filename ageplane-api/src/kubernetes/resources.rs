//! Resource builders for customer instances
//!
//! Turns a [`CreateCustomerRequest`] into the Kubernetes objects that make up
//! one customer instance. Building is infallible: anything the API server
//! would reject surfaces when the object is submitted.

use super::naming::{self, ResourceNames};
use ageplane_common::{CreateCustomerRequest, CustomerConfig};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Capabilities, Container, EnvVar, EnvVarSource, HTTPGetAction, Namespace,
    ObjectFieldSelector, PodSpec, PodTemplateSpec, Probe, ResourceRequirements,
    SecurityContext, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const LABEL_NAME: &str = "app.kubernetes.io/name";
pub const LABEL_INSTANCE: &str = "app.kubernetes.io/instance";
pub const LABEL_CLIENT: &str = "app.kubernetes.io/client";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";
pub const LABEL_CONTROL_PLANE: &str = "postgres-operator.crunchydata.com/control-plane";

pub const ANNOTATION_DISPLAY_NAME: &str = "ageplane.io/display-name";
pub const ANNOTATION_CONFIG: &str = "ageplane.io/config";

pub const DEFAULT_CPU_REQUEST: &str = "100m";
pub const DEFAULT_MEMORY_REQUEST: &str = "128Mi";
pub const DEFAULT_CPU_LIMIT: &str = "500m";
pub const DEFAULT_MEMORY_LIMIT: &str = "512Mi";

const HEALTH_PATH: &str = "/healthz";
const READY_PATH: &str = "/readyz";

/// Fixed, build-wide settings for the managed workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadProfile {
    /// Value of `app.kubernetes.io/name`
    pub product_name: String,
    /// Value of `app.kubernetes.io/managed-by` on namespaces
    pub managed_by: String,
    /// Image without tag
    pub base_image: String,
    pub image_pull_policy: String,
    /// Name of the container whose image carries the customer's version
    pub container_name: String,
    pub probe_port: i32,
    /// Value of `PGO_INSTALLER`
    pub installer: String,
    /// Pinned images advertised to the operator as `RELATED_IMAGE_*`
    pub related_images: Vec<RelatedImage>,
}

/// A `RELATED_IMAGE_<name>` environment entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedImage {
    pub name: String,
    pub image: String,
}

impl RelatedImage {
    fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
        }
    }
}

impl Default for WorkloadProfile {
    fn default() -> Self {
        const CRUNCHY: &str = "registry.developers.crunchydata.com/crunchydata";
        Self {
            product_name: "postgres-age-operator".to_string(),
            managed_by: "age-api-server".to_string(),
            base_image: "localhost/postgres-age-operator".to_string(),
            image_pull_policy: "Never".to_string(),
            container_name: "operator".to_string(),
            probe_port: 8081,
            installer: "api-server".to_string(),
            related_images: vec![
                RelatedImage::new("POSTGRES_16", "localhost/postgres-age-patroni"),
                RelatedImage::new("POSTGRES_17", "localhost/postgres-age-patroni"),
                RelatedImage::new(
                    "PGBACKREST",
                    &format!("{}/crunchy-pgbackrest:ubi9-2.54.2-2520", CRUNCHY),
                ),
                RelatedImage::new(
                    "PGBOUNCER",
                    &format!("{}/crunchy-pgbouncer:ubi9-1.24-2520", CRUNCHY),
                ),
                RelatedImage::new(
                    "PGEXPORTER",
                    &format!("{}/crunchy-postgres-exporter:ubi9-0.17.1-2520", CRUNCHY),
                ),
                RelatedImage::new(
                    "PGUPGRADE",
                    &format!("{}/crunchy-upgrade:ubi9-17.5-2520", CRUNCHY),
                ),
                RelatedImage::new(
                    "STANDALONE_PGADMIN",
                    &format!("{}/crunchy-pgadmin4:ubi9-9.2-2520", CRUNCHY),
                ),
                RelatedImage::new(
                    "COLLECTOR",
                    &format!("{}/postgres-operator:ubi9-5.8.2-0", CRUNCHY),
                ),
            ],
        }
    }
}

impl WorkloadProfile {
    /// Full image reference for a version tag
    pub fn image_for(&self, tag: &str) -> String {
        format!("{}:{}", self.base_image, tag)
    }
}

/// Builds the objects for one customer
pub struct ResourceBuilder<'a> {
    profile: &'a WorkloadProfile,
    request: &'a CreateCustomerRequest,
    names: ResourceNames,
}

impl<'a> ResourceBuilder<'a> {
    pub fn new(profile: &'a WorkloadProfile, request: &'a CreateCustomerRequest) -> Self {
        Self {
            profile,
            request,
            names: ResourceNames::for_customer(&request.name),
        }
    }

    pub fn names(&self) -> &ResourceNames {
        &self.names
    }

    /// Labels shared by every object of the instance
    fn ownership_labels(&self) -> BTreeMap<String, String> {
        let customer = &self.request.name;
        BTreeMap::from([
            (LABEL_NAME.to_string(), self.profile.product_name.clone()),
            (LABEL_INSTANCE.to_string(), naming::instance_label(customer)),
            (LABEL_CLIENT.to_string(), customer.clone()),
        ])
    }

    fn selector_labels(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (LABEL_NAME.to_string(), self.profile.product_name.clone()),
            (LABEL_INSTANCE.to_string(), naming::instance_label(&self.request.name)),
        ])
    }

    fn workload_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.ownership_labels();
        labels.insert(
            LABEL_CONTROL_PLANE.to_string(),
            naming::namespace_name(&self.request.name),
        );
        labels
    }

    pub fn namespace(&self) -> Namespace {
        let mut labels = self.ownership_labels();
        labels.insert(LABEL_MANAGED_BY.to_string(), self.profile.managed_by.clone());

        // Caller labels never replace the ownership labels
        for (key, value) in &self.request.labels {
            labels.entry(key.clone()).or_insert_with(|| value.clone());
        }

        let mut annotations = BTreeMap::new();
        if !self.request.display_name.is_empty() {
            annotations.insert(
                ANNOTATION_DISPLAY_NAME.to_string(),
                self.request.display_name.clone(),
            );
        }
        annotations.insert(
            ANNOTATION_CONFIG.to_string(),
            serde_json::to_string(&self.request.config).unwrap_or_default(),
        );

        Namespace {
            metadata: ObjectMeta {
                name: Some(self.names.namespace.clone()),
                labels: Some(labels),
                annotations: Some(annotations),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn service_account(&self) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some(self.names.service_account.clone()),
                namespace: Some(self.names.namespace.clone()),
                labels: Some(self.ownership_labels()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn cluster_role(&self) -> ClusterRole {
        ClusterRole {
            metadata: ObjectMeta {
                name: Some(self.names.cluster_role.clone()),
                labels: Some(self.ownership_labels()),
                ..Default::default()
            },
            rules: Some(operator_policy_rules()),
            ..Default::default()
        }
    }

    pub fn cluster_role_binding(&self) -> ClusterRoleBinding {
        ClusterRoleBinding {
            metadata: ObjectMeta {
                name: Some(self.names.cluster_role_binding.clone()),
                labels: Some(self.ownership_labels()),
                ..Default::default()
            },
            role_ref: RoleRef {
                api_group: "rbac.authorization.k8s.io".to_string(),
                kind: "ClusterRole".to_string(),
                name: self.names.cluster_role.clone(),
            },
            subjects: Some(vec![Subject {
                kind: "ServiceAccount".to_string(),
                name: self.names.service_account.clone(),
                namespace: Some(self.names.namespace.clone()),
                ..Default::default()
            }]),
        }
    }

    pub fn deployment(&self) -> Deployment {
        let labels = self.workload_labels();

        Deployment {
            metadata: ObjectMeta {
                name: Some(self.names.deployment.clone()),
                namespace: Some(self.names.namespace.clone()),
                labels: Some(labels.clone()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                strategy: Some(DeploymentStrategy {
                    type_: Some("Recreate".to_string()),
                    ..Default::default()
                }),
                selector: LabelSelector {
                    match_labels: Some(self.selector_labels()),
                    ..Default::default()
                },
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(labels),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        service_account_name: Some(self.names.service_account.clone()),
                        containers: vec![self.operator_container()],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn operator_container(&self) -> Container {
        Container {
            name: self.profile.container_name.clone(),
            image: Some(self.profile.image_for(self.request.image_tag_or_default())),
            image_pull_policy: Some(self.profile.image_pull_policy.clone()),
            resources: Some(resource_requirements(&self.request.config)),
            env: Some(self.environment()),
            security_context: Some(locked_down_security_context()),
            liveness_probe: Some(http_probe(HEALTH_PATH, self.profile.probe_port, 15, 20)),
            readiness_probe: Some(http_probe(READY_PATH, self.profile.probe_port, 5, 10)),
            ..Default::default()
        }
    }

    fn environment(&self) -> Vec<EnvVar> {
        let plain = |name: &str, value: String| EnvVar {
            name: name.to_string(),
            value: Some(value),
            ..Default::default()
        };

        let mut env = vec![
            plain("PGO_INSTALLER", self.profile.installer.clone()),
            plain(
                "PGO_INSTALLER_ORIGIN",
                format!("api-server-customer-{}", self.request.name),
            ),
            EnvVar {
                name: "PGO_NAMESPACE".to_string(),
                value_from: Some(EnvVarSource {
                    field_ref: Some(ObjectFieldSelector {
                        field_path: "metadata.namespace".to_string(),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            },
            plain("CRUNCHY_DEBUG", "false".to_string()),
        ];

        env.extend(
            self.profile
                .related_images
                .iter()
                .map(|related| plain(&format!("RELATED_IMAGE_{}", related.name), related.image.clone())),
        );

        env
    }
}

/// Requests and limits with per-field overrides from the customer config
pub fn resource_requirements(config: &CustomerConfig) -> ResourceRequirements {
    let pick = |custom: &Option<String>, default: &str| {
        Quantity(
            custom
                .as_deref()
                .filter(|value| !value.is_empty())
                .unwrap_or(default)
                .to_string(),
        )
    };

    let resources = &config.resources;
    let requests = BTreeMap::from([
        ("cpu".to_string(), pick(&resources.requests.cpu, DEFAULT_CPU_REQUEST)),
        ("memory".to_string(), pick(&resources.requests.memory, DEFAULT_MEMORY_REQUEST)),
    ]);
    let limits = BTreeMap::from([
        ("cpu".to_string(), pick(&resources.limits.cpu, DEFAULT_CPU_LIMIT)),
        ("memory".to_string(), pick(&resources.limits.memory, DEFAULT_MEMORY_LIMIT)),
    ]);

    ResourceRequirements {
        requests: Some(requests),
        limits: Some(limits),
        ..Default::default()
    }
}

/// Policy granted to every customer's operator
pub fn operator_policy_rules() -> Vec<PolicyRule> {
    let rule = |group: &str, resources: &[&str], verbs: &[&str]| PolicyRule {
        api_groups: Some(vec![group.to_string()]),
        resources: Some(resources.iter().map(|r| r.to_string()).collect()),
        verbs: verbs.iter().map(|v| v.to_string()).collect(),
        ..Default::default()
    };

    vec![
        rule(
            "",
            &[
                "configmaps",
                "endpoints",
                "events",
                "persistentvolumeclaims",
                "pods",
                "secrets",
                "serviceaccounts",
                "services",
            ],
            &["*"],
        ),
        rule(
            "apps",
            &["daemonsets", "deployments", "replicasets", "statefulsets"],
            &["*"],
        ),
        rule("batch", &["cronjobs", "jobs"], &["*"]),
        rule(
            "postgres-operator.crunchydata.com",
            &["postgresclusters", "pgadmins", "pgupgrades"],
            &["*"],
        ),
        rule("", &["nodes"], &["get", "list"]),
        rule("policy", &["poddisruptionbudgets"], &["*"]),
        rule("rbac.authorization.k8s.io", &["rolebindings", "roles"], &["*"]),
    ]
}

fn locked_down_security_context() -> SecurityContext {
    SecurityContext {
        allow_privilege_escalation: Some(false),
        capabilities: Some(Capabilities {
            drop: Some(vec!["ALL".to_string()]),
            ..Default::default()
        }),
        read_only_root_filesystem: Some(true),
        run_as_non_root: Some(true),
        ..Default::default()
    }
}

fn http_probe(path: &str, port: i32, initial_delay: i32, period: i32) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some(path.to_string()),
            port: IntOrString::Int(port),
            ..Default::default()
        }),
        initial_delay_seconds: Some(initial_delay),
        period_seconds: Some(period),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ageplane_common::{ResourceConfig, ResourceRequirements as Sizing};

    fn request(name: &str) -> CreateCustomerRequest {
        CreateCustomerRequest {
            name: name.to_string(),
            ..Default::default()
        }
    }

    fn container(deployment: &Deployment) -> &Container {
        &deployment.spec.as_ref().unwrap().template.spec.as_ref().unwrap().containers[0]
    }

    fn quantity<'a>(map: &'a Option<BTreeMap<String, Quantity>>, key: &str) -> &'a str {
        &map.as_ref().unwrap()[key].0
    }

    #[test]
    fn test_namespace_labels_protect_ownership_keys() {
        let profile = WorkloadProfile::default();
        let mut req = request("acme");
        req.labels.insert("team".to_string(), "platform".to_string());
        req.labels.insert(LABEL_CLIENT.to_string(), "someone-else".to_string());

        let ns = ResourceBuilder::new(&profile, &req).namespace();
        let labels = ns.metadata.labels.unwrap();

        assert_eq!(ns.metadata.name.as_deref(), Some("postgres-operator-acme"));
        assert_eq!(labels[LABEL_CLIENT], "acme");
        assert_eq!(labels[LABEL_NAME], "postgres-age-operator");
        assert_eq!(labels[LABEL_INSTANCE], "acme-age");
        assert_eq!(labels[LABEL_MANAGED_BY], "age-api-server");
        assert_eq!(labels["team"], "platform");
    }

    #[test]
    fn test_namespace_annotations_carry_display_name_and_config() {
        let profile = WorkloadProfile::default();
        let mut req = request("acme");
        req.display_name = "ACME Corp".to_string();
        req.config.backup_enabled = true;

        let ns = ResourceBuilder::new(&profile, &req).namespace();
        let annotations = ns.metadata.annotations.unwrap();
        assert_eq!(annotations[ANNOTATION_DISPLAY_NAME], "ACME Corp");

        let stored: CustomerConfig = serde_json::from_str(&annotations[ANNOTATION_CONFIG]).unwrap();
        assert!(stored.backup_enabled);
    }

    #[test]
    fn test_deployment_defaults() {
        let profile = WorkloadProfile::default();
        let req = request("acme");
        let deployment = ResourceBuilder::new(&profile, &req).deployment();

        let spec = deployment.spec.as_ref().unwrap();
        assert_eq!(spec.replicas, Some(1));
        assert_eq!(spec.strategy.as_ref().unwrap().type_.as_deref(), Some("Recreate"));

        let c = container(&deployment);
        assert_eq!(c.name, "operator");
        assert_eq!(c.image.as_deref(), Some("localhost/postgres-age-operator:latest"));
        assert_eq!(c.image_pull_policy.as_deref(), Some("Never"));

        let resources = c.resources.as_ref().unwrap();
        assert_eq!(quantity(&resources.requests, "cpu"), "100m");
        assert_eq!(quantity(&resources.requests, "memory"), "128Mi");
        assert_eq!(quantity(&resources.limits, "cpu"), "500m");
        assert_eq!(quantity(&resources.limits, "memory"), "512Mi");
    }

    #[test]
    fn test_resource_overrides_apply_per_field() {
        let config = CustomerConfig {
            resources: ResourceConfig {
                requests: Sizing {
                    cpu: Some("250m".to_string()),
                    memory: None,
                },
                limits: Sizing {
                    cpu: None,
                    memory: Some("1Gi".to_string()),
                },
            },
            ..Default::default()
        };

        let resources = resource_requirements(&config);
        assert_eq!(quantity(&resources.requests, "cpu"), "250m");
        assert_eq!(quantity(&resources.requests, "memory"), "128Mi");
        assert_eq!(quantity(&resources.limits, "cpu"), "500m");
        assert_eq!(quantity(&resources.limits, "memory"), "1Gi");
    }

    #[test]
    fn test_container_is_locked_down() {
        let profile = WorkloadProfile::default();
        let req = request("acme");
        let deployment = ResourceBuilder::new(&profile, &req).deployment();
        let security = container(&deployment).security_context.as_ref().unwrap();

        assert_eq!(security.allow_privilege_escalation, Some(false));
        assert_eq!(security.read_only_root_filesystem, Some(true));
        assert_eq!(security.run_as_non_root, Some(true));
        assert_eq!(
            security.capabilities.as_ref().unwrap().drop,
            Some(vec!["ALL".to_string()])
        );
    }

    #[test]
    fn test_environment_advertises_related_images() {
        let profile = WorkloadProfile::default();
        let req = request("acme");
        let deployment = ResourceBuilder::new(&profile, &req).deployment();
        let env = container(&deployment).env.as_ref().unwrap();

        let value = |name: &str| {
            env.iter()
                .find(|var| var.name == name)
                .and_then(|var| var.value.clone())
        };

        assert_eq!(value("PGO_INSTALLER_ORIGIN").as_deref(), Some("api-server-customer-acme"));
        assert_eq!(value("RELATED_IMAGE_POSTGRES_17").as_deref(), Some("localhost/postgres-age-patroni"));
        assert!(env.iter().any(|var| var.name == "PGO_NAMESPACE" && var.value_from.is_some()));
    }

    #[test]
    fn test_binding_points_at_service_account() {
        let profile = WorkloadProfile::default();
        let req = request("acme");
        let binding = ResourceBuilder::new(&profile, &req).cluster_role_binding();

        assert_eq!(binding.role_ref.name, "postgres-operator-acme");
        let subject = &binding.subjects.unwrap()[0];
        assert_eq!(subject.name, "acme-pgo-age");
        assert_eq!(subject.namespace.as_deref(), Some("postgres-operator-acme"));
    }

    #[test]
    fn test_policy_is_identical_for_every_customer() {
        let profile = WorkloadProfile::default();
        let a = request("alpha");
        let b = request("beta");
        assert_eq!(
            ResourceBuilder::new(&profile, &a).cluster_role().rules,
            ResourceBuilder::new(&profile, &b).cluster_role().rules
        );
    }
}
