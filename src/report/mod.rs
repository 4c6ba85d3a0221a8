use chrono::{DateTime, Local};
use serde::Serialize;

use crate::errors::HealthCheckError;
use crate::types::{CheckName, CheckResults, HealthStatus};

/// Aggregated health report for one poll cycle
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub timestamp: DateTime<Local>,
    pub container_name: String,
    pub overall_status: HealthStatus,
    pub checks: CheckResults,
}

/// Combine per-check results into one report stamped with the current time.
///
/// The overall status is the worst status present. Fails with an invariant
/// error when `results` is empty.
pub fn aggregate(container_name: &str, results: CheckResults) -> Result<HealthReport, HealthCheckError> {
    aggregate_at(container_name, results, Local::now())
}

pub fn aggregate_at(
    container_name: &str,
    results: CheckResults,
    timestamp: DateTime<Local>,
) -> Result<HealthReport, HealthCheckError> {
    let overall_status = HealthStatus::worst(results.values().map(|r| r.status)).ok_or_else(|| {
        HealthCheckError::Invariant("cannot aggregate a poll cycle with no check results".to_string())
    })?;
    Ok(HealthReport {
        timestamp,
        container_name: container_name.to_string(),
        overall_status,
        checks: results,
    })
}

impl HealthReport {
    pub fn status_of(&self, check: CheckName) -> Option<HealthStatus> {
        self.checks.get(&check).map(|r| r.status)
    }

    /// Check if the report has any issues to report
    pub fn has_issues(&self) -> bool {
        self.overall_status != HealthStatus::Healthy
    }

    /// Get a summary of how many checks landed in each status
    pub fn summary(&self) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for result in self.checks.values() {
            match result.status {
                HealthStatus::Healthy => summary.healthy_count += 1,
                HealthStatus::Warning => summary.warning_count += 1,
                HealthStatus::Unhealthy => summary.unhealthy_count += 1,
                HealthStatus::Error => summary.error_count += 1,
            }
        }
        summary
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReportSummary {
    pub healthy_count: usize,
    pub warning_count: usize,
    pub unhealthy_count: usize,
    pub error_count: usize,
}

impl ReportSummary {
    pub fn total_checks(&self) -> usize {
        self.healthy_count + self.warning_count + self.unhealthy_count + self.error_count
    }

    pub fn total_issues(&self) -> usize {
        self.warning_count + self.unhealthy_count + self.error_count
    }

    pub fn has_issues(&self) -> bool {
        self.total_issues() > 0
    }
}
