//! Common types shared between ageplane-api and ageplane-cli

pub mod api;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Image tag used when a customer does not pin one
pub const DEFAULT_IMAGE_TAG: &str = "latest";

/// Maximum length of a customer name
pub const MAX_CUSTOMER_NAME_LENGTH: usize = 20;

/// A customer's provisioned operator instance.
///
/// Never stored on its own: every value of this type is rebuilt from the
/// cluster resources that back the customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInstance {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_tag: String,
    pub namespace: String,
    pub status: InstanceStatus,
    #[serde(default)]
    pub config: CustomerConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Sizing and feature options for a customer instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerConfig {
    #[serde(default)]
    pub resources: ResourceConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub high_availability: bool,
    #[serde(default)]
    pub backup_enabled: bool,
    #[serde(default)]
    pub monitoring_enabled: bool,
}

/// Compute requests and limits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default)]
    pub requests: ResourceRequirements,
    #[serde(default)]
    pub limits: ResourceRequirements,
}

/// CPU and memory quantities in Kubernetes notation ("250m", "1Gi")
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRequirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

/// Storage sizing
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_size: Option<String>,
}

/// Observed state of a customer instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatus {
    pub phase: InstancePhase,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub ready: bool,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    pub last_updated: DateTime<Utc>,
}

/// Lifecycle phase of a customer instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstancePhase {
    Creating,
    Running,
    Failed,
    Updating,
    Deleting,
    Deleted,
}

impl std::fmt::Display for InstancePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "Creating"),
            Self::Running => write!(f, "Running"),
            Self::Failed => write!(f, "Failed"),
            Self::Updating => write!(f, "Updating"),
            Self::Deleting => write!(f, "Deleting"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

impl std::str::FromStr for InstancePhase {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "creating" => Ok(Self::Creating),
            "running" => Ok(Self::Running),
            "failed" => Ok(Self::Failed),
            "updating" => Ok(Self::Updating),
            "deleting" => Ok(Self::Deleting),
            "deleted" => Ok(Self::Deleted),
            other => Err(Error::Validation(format!("Unknown instance phase '{}'", other))),
        }
    }
}

/// Request to create a new customer instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCustomerRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(default)]
    pub config: CustomerConfig,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl CreateCustomerRequest {
    /// Image tag to deploy, falling back to [`DEFAULT_IMAGE_TAG`]
    pub fn image_tag_or_default(&self) -> &str {
        match self.image_tag.as_deref() {
            Some(tag) if !tag.is_empty() => tag,
            _ => DEFAULT_IMAGE_TAG,
        }
    }
}

/// Partial update of a customer instance
///
/// Only `image_tag` and `labels` reach the workload. The other fields are
/// accepted for compatibility with clients that send the full document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCustomerRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<CustomerConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// One page of customer instances
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerListResponse {
    pub customers: Vec<CustomerInstance>,
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

/// Common error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Customer instance not found: {0}")]
    CustomerNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("System error: {0}")]
    System(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
