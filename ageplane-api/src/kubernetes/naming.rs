//! Resource naming for customer instances
//!
//! Every cluster object that belongs to a customer carries the customer name
//! verbatim, so names stay readable and two customers can never collide.

/// Prefix shared by customer namespaces and cluster-scoped RBAC objects
pub const NAMESPACE_PREFIX: &str = "postgres-operator-";

/// Suffix for namespaced objects (service account, deployment)
pub const WORKLOAD_SUFFIX: &str = "-pgo-age";

/// Namespace holding all of a customer's namespaced resources
pub fn namespace_name(customer: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, customer)
}

pub fn service_account_name(customer: &str) -> String {
    format!("{}{}", customer, WORKLOAD_SUFFIX)
}

pub fn cluster_role_name(customer: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, customer)
}

pub fn cluster_role_binding_name(customer: &str) -> String {
    format!("{}{}", NAMESPACE_PREFIX, customer)
}

pub fn deployment_name(customer: &str) -> String {
    format!("{}{}", customer, WORKLOAD_SUFFIX)
}

/// Value of the `app.kubernetes.io/instance` label
pub fn instance_label(customer: &str) -> String {
    format!("{}-age", customer)
}

/// Recover the customer name from a namespace name
///
/// Returns `None` for namespaces that do not follow the customer pattern.
pub fn customer_from_namespace(namespace: &str) -> Option<&str> {
    namespace
        .strip_prefix(NAMESPACE_PREFIX)
        .filter(|customer| !customer.is_empty())
}

/// All derived names for one customer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNames {
    pub namespace: String,
    pub service_account: String,
    pub cluster_role: String,
    pub cluster_role_binding: String,
    pub deployment: String,
}

impl ResourceNames {
    pub fn for_customer(customer: &str) -> Self {
        Self {
            namespace: namespace_name(customer),
            service_account: service_account_name(customer),
            cluster_role: cluster_role_name(customer),
            cluster_role_binding: cluster_role_binding_name(customer),
            deployment: deployment_name(customer),
        }
    }
}
