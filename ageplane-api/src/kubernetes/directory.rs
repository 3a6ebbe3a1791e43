//! Instance directory
//!
//! Finds the customers that exist on the cluster by scanning for namespaces
//! carrying the ownership label.

use super::error::PlatformResult;
use super::naming;
use super::platform::ClusterApi;
use super::resources::LABEL_CLIENT;
use ageplane_common::InstancePhase;
use async_trait::async_trait;
use std::sync::Arc;

/// Source of customer keys
#[async_trait]
pub trait InstanceIndex: Send + Sync {
    /// All known customer keys, sorted and without duplicates
    async fn customer_keys(&self) -> PlatformResult<Vec<String>>;
}

/// Index that lists labelled namespaces on every call
pub struct LabelScanIndex {
    cluster: Arc<dyn ClusterApi>,
}

impl LabelScanIndex {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl InstanceIndex for LabelScanIndex {
    async fn customer_keys(&self) -> PlatformResult<Vec<String>> {
        let namespaces = self.cluster.list_namespaces(LABEL_CLIENT).await?;

        let mut keys: Vec<String> = namespaces
            .iter()
            .filter_map(|ns| ns.metadata.name.as_deref())
            .filter_map(naming::customer_from_namespace)
            .map(String::from)
            .collect();

        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}

/// Filter for listing customer instances
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListFilter {
    pub phase: Option<InstancePhase>,
}

impl ListFilter {
    pub fn with_phase(phase: InstancePhase) -> Self {
        Self { phase: Some(phase) }
    }

    pub fn matches(&self, phase: InstancePhase) -> bool {
        self.phase.map_or(true, |wanted| wanted == phase)
    }
}
