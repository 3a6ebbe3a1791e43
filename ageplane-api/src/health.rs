//! Health check and readiness probes
//!
//! Liveness only says the process is up. Readiness also requires the
//! cluster API to answer.

use crate::kubernetes::ClusterApi;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Overall system health status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Individual component health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub latency_ms: Option<u64>,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Liveness probe response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    pub alive: bool,
    pub timestamp: i64,
}

/// Readiness probe response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub reason: Option<String>,
    pub timestamp: i64,
    pub components: Vec<ComponentHealth>,
}

/// Health checker for system components
pub struct HealthChecker {
    start_time: Instant,
    version: String,
}

impl HealthChecker {
    pub fn new(version: &str) -> Self {
        Self {
            start_time: Instant::now(),
            version: version.to_string(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn health(&self) -> HealthResponse {
        HealthResponse {
            status: HealthStatus::Healthy,
            version: self.version.clone(),
            uptime_seconds: self.uptime_seconds(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Simple liveness check - is the service running?
    pub fn liveness(&self) -> LivenessResponse {
        LivenessResponse {
            alive: true,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Check that the cluster API answers
    pub async fn check_cluster(&self, cluster: &dyn ClusterApi) -> ComponentHealth {
        let start = Instant::now();
        let name = format!("cluster ({})", cluster.backend());

        match cluster.ping().await {
            Ok(()) => ComponentHealth {
                name,
                status: HealthStatus::Healthy,
                message: Some("Connected".to_string()),
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
            Err(e) => ComponentHealth {
                name,
                status: HealthStatus::Unhealthy,
                message: Some(format!("Connection failed: {}", e)),
                latency_ms: Some(start.elapsed().as_millis() as u64),
            },
        }
    }

    /// Readiness: every component must be healthy
    pub async fn readiness(&self, cluster: &dyn ClusterApi) -> ReadinessResponse {
        let components = vec![self.check_cluster(cluster).await];
        let unhealthy: Vec<&str> = components
            .iter()
            .filter(|c| c.status != HealthStatus::Healthy)
            .map(|c| c.name.as_str())
            .collect();

        ReadinessResponse {
            ready: unhealthy.is_empty(),
            reason: (!unhealthy.is_empty()).then(|| format!("Unhealthy: {}", unhealthy.join(", "))),
            timestamp: chrono::Utc::now().timestamp(),
            components,
        }
    }
}
