//! Kubernetes provisioning engine
//!
//! Maps one logical customer instance onto a namespace, a service account,
//! a cluster role with its binding, and an operator deployment:
//! - naming of every resource from the customer name
//! - building the resource specs
//! - ordered creation and deletion with per-step reports
//! - status projection back onto the logical instance
//! - listing by ownership label
//! - partial updates of the workload

pub mod client;
pub mod directory;
pub mod error;
pub mod memory;
pub mod mutation;
pub mod naming;
pub mod platform;
pub mod provisioner;
pub mod resources;
pub mod status;

pub use client::K8sClient;
pub use directory::{InstanceIndex, LabelScanIndex, ListFilter};
pub use error::{PlatformError, PlatformResult, ProvisionError, ProvisionResult};
pub use memory::InMemoryCluster;
pub use platform::ClusterApi;
pub use provisioner::{
    CustomerProvisioner, OperationKind, OperationReport, ProvisionStep, StepOutcome, StepRecord,
};
pub use resources::{RelatedImage, WorkloadProfile};
pub use status::InstanceSnapshot;
