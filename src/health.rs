/// Health report types for the cache layer
///
/// Produced by `CacheService::health_check`. Each instance is probed
/// independently; the aggregate status only says how many probes passed.

use crate::backend::ServerInfo;
use crate::service::PerformanceStats;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Health of one instance or of the whole layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All probes passed
    Healthy,

    /// Some instances pass, some fail (aggregate only)
    Degraded,

    /// No probe passed
    Unhealthy,
}

impl HealthStatus {
    /// Aggregates instance results into an overall status
    pub fn aggregate(healthy: usize, total: usize) -> Self {
        if healthy == total {
            HealthStatus::Healthy
        } else if healthy > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Unhealthy
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        };
        f.write_str(s)
    }
}

/// Probe result for one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceHealth {
    /// Probe outcome
    pub status: HealthStatus,

    /// Whether a connection handle could be obtained
    pub connected: bool,

    /// Whether the write-read-delete round trip returned the written value
    pub test_passed: bool,

    /// Failure detail, when the probe did not pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Server-side details, when the instance was reachable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerInfo>,

    /// Configured instance name
    pub instance_name: String,

    /// Declared capacity in MB
    pub max_memory_mb: u64,

    /// Probe duration in milliseconds
    pub response_time_ms: f64,
}

/// Full health-check report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Aggregate status across all instances
    pub overall_status: HealthStatus,

    /// Number of instances whose probe passed
    pub healthy_instances: usize,

    /// Number of configured instances
    pub total_instances: usize,

    /// Per-instance probe results, keyed by instance id
    pub instances: HashMap<String, InstanceHealth>,

    /// Performance counters at the time of the check
    pub performance: PerformanceStats,

    /// Whether multi-instance routing is active
    pub multi_instance: bool,

    /// When the check ran
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_status() {
        assert_eq!(HealthStatus::aggregate(3, 3), HealthStatus::Healthy);
        assert_eq!(HealthStatus::aggregate(2, 3), HealthStatus::Degraded);
        assert_eq!(HealthStatus::aggregate(0, 3), HealthStatus::Unhealthy);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}
