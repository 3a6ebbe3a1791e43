//! Application State
//!
//! Shared state for the ageplane API server

use std::sync::Arc;

use crate::config::AgePlaneConfig;
use crate::health::HealthChecker;
use crate::kubernetes::{ClusterApi, CustomerProvisioner};
use crate::middleware::rate_limit::{RateLimitSettings, RateLimiter};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AgePlaneConfig>,
    pub provisioner: Arc<CustomerProvisioner>,
    pub health: Arc<HealthChecker>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Wire the provisioning engine and middleware state from configuration
    pub fn new(config: AgePlaneConfig, cluster: Arc<dyn ClusterApi>) -> Self {
        let provisioner = CustomerProvisioner::new(cluster, config.workload.clone())
            .with_deadline(config.cluster.operation_timeout());
        let rate_limiter = RateLimiter::new(RateLimitSettings::from(&config.rate_limit));

        Self {
            config: Arc::new(config),
            provisioner: Arc::new(provisioner),
            health: Arc::new(HealthChecker::new(env!("CARGO_PKG_VERSION"))),
            rate_limiter: Arc::new(rate_limiter),
        }
    }

    pub fn cluster(&self) -> &dyn ClusterApi {
        self.provisioner.cluster().as_ref()
    }
}
