use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use crate::models::health::{HealthCheckResponse, HealthStatus, ServiceHealth};

/// Responses slower than this are reported as degraded.
const SLOW_RESPONSE_MS: u64 = 1_000;

/// Dependencies whose failure makes the whole service unhealthy.
const CRITICAL: [&str; 2] = ["database", "message_broker"];

#[async_trait]
pub trait HealthProbe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Round-trip time in milliseconds, or why the dependency is unreachable.
    async fn probe(&self) -> Result<u64, String>;
}

#[derive(Clone, Default)]
pub struct HealthChecker {
    probes: Vec<Arc<dyn HealthProbe>>,
}

impl HealthChecker {
    pub fn new(probes: Vec<Arc<dyn HealthProbe>>) -> Self {
        Self { probes }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        for probe in &self.probes {
            let health = match probe.probe().await {
                Ok(elapsed) if elapsed > SLOW_RESPONSE_MS => {
                    warn!(dependency = probe.name(), response_time_ms = elapsed, "Health check slow");
                    ServiceHealth::degraded(elapsed)
                }
                Ok(elapsed) => {
                    debug!(dependency = probe.name(), response_time_ms = elapsed, "Health check passed");
                    ServiceHealth::healthy(elapsed)
                }
                Err(e) => {
                    warn!(dependency = probe.name(), error = %e, "Health check failed");
                    ServiceHealth::unhealthy(e)
                }
            };
            checks.insert(probe.name().to_string(), health);
        }

        HealthCheckResponse {
            status: Self::determine_overall_status(&checks),
            timestamp: Utc::now(),
            checks,
        }
    }

    fn determine_overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
        let critical_unhealthy = checks
            .iter()
            .filter(|(name, _)| CRITICAL.contains(&name.as_str()))
            .any(|(_, health)| health.status == HealthStatus::Unhealthy);

        let has_degraded = checks
            .values()
            .any(|health| health.status != HealthStatus::Healthy);

        if critical_unhealthy {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}
