//! Provisioning error types and ApiError mapping
//!
//! `PlatformError` describes a failed call against the cluster API.
//! `ProvisionError` is what the provisioning engine returns to callers.

use super::provisioner::OperationReport;
use crate::error::ApiError;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single call against the cluster platform
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The addressed object does not exist
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// An object with the same name already exists
    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    /// Write rejected because the object changed since it was read
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other status returned by the API server
    #[error("Kubernetes API error ({code}): {message}")]
    Api { code: u16, message: String },

    /// Could not talk to the API server at all
    #[error("Transport error: {0}")]
    Transport(String),

    /// The operation deadline elapsed
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Client configuration could not be loaded
    #[error("Invalid cluster configuration: {0}")]
    InvalidConfig(String),
}

impl PlatformError {
    pub fn not_found(kind: &str, name: &str) -> Self {
        Self::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(kind: &str, name: &str) -> Self {
        Self::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Translate a kube-rs error, keeping the kind/name of the addressed object
    pub fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::already_exists(kind, name)
            }
            kube::Error::Api(ae) if ae.code == 409 => Self::Conflict(ae.message),
            kube::Error::Api(ae) => Self::Api {
                code: ae.code,
                message: ae.message,
            },
            other => Self::Transport(other.to_string()),
        }
    }
}

/// Result type alias for cluster platform calls
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Errors returned by the provisioning engine
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Customer name violates the naming constraints
    #[error("Invalid customer name: {0}")]
    InvalidName(String),

    /// A customer instance with this name already exists
    #[error("Customer instance '{0}' already exists")]
    AlreadyExists(String),

    /// No customer instance with this name
    #[error("Customer instance '{0}' not found")]
    NotFound(String),

    /// A multi-step operation stopped part way; the report says which steps ran
    #[error("{0}")]
    PartialFailure(OperationReport),

    /// The cluster platform rejected or failed a call
    #[error("{context}: {source}")]
    Upstream {
        context: String,
        #[source]
        source: PlatformError,
    },
}

impl ProvisionError {
    pub fn upstream(context: impl Into<String>, source: PlatformError) -> Self {
        Self::Upstream {
            context: context.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<ProvisionError> for ApiError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::InvalidName(msg) => ApiError::InvalidName(msg),
            ProvisionError::AlreadyExists(name) => ApiError::Conflict(format!(
                "Customer instance '{}' already exists",
                name
            )),
            ProvisionError::NotFound(name) => {
                ApiError::NotFound(format!("Customer instance '{}' not found", name))
            }
            ProvisionError::PartialFailure(report) => ApiError::PartialFailure(report),
            ProvisionError::Upstream {
                context,
                source: PlatformError::Timeout(deadline),
            } => ApiError::UpstreamTimeout(format!("{}: timed out after {:?}", context, deadline)),
            ProvisionError::Upstream { context, source } => {
                ApiError::Upstream(format!("{}: {}", context, source))
            }
        }
    }
}

impl From<ProvisionError> for ageplane_common::Error {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::NotFound(name) => ageplane_common::Error::CustomerNotFound(name),
            ProvisionError::InvalidName(msg) => ageplane_common::Error::Validation(msg),
            other => ageplane_common::Error::System(other.to_string()),
        }
    }
}

/// Result type alias for provisioning operations
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;
