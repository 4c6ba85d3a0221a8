//! Threshold evaluation.
//!
//! Severity is two-tier and multiplicative: a sample at or under its limit is
//! healthy, a sample up to `limit * warning_multiplier` is a warning, anything
//! beyond that is unhealthy.

use crate::errors::HealthCheckError;
use crate::types::{HealthStatus, MetricSample, ThresholdName, Thresholds};

pub const DEFAULT_WARNING_MULTIPLIER: f64 = 1.2;

/// Maps one observed value against its limit.
///
/// Fails with a configuration error when the limit is not a finite positive
/// number or the multiplier is below 1.
pub fn evaluate(
    metric: ThresholdName,
    observed: f64,
    limit: f64,
    warning_multiplier: f64,
) -> Result<HealthStatus, HealthCheckError> {
    if !limit.is_finite() || limit <= 0.0 {
        return Err(HealthCheckError::config(format!(
            "Invalid threshold value for {}: {}",
            metric, limit
        )));
    }
    if !warning_multiplier.is_finite() || warning_multiplier < 1.0 {
        return Err(HealthCheckError::config(format!(
            "Invalid warning multiplier: {}",
            warning_multiplier
        )));
    }

    Ok(tier(observed, limit, warning_multiplier))
}

fn tier(observed: f64, limit: f64, warning_multiplier: f64) -> HealthStatus {
    if observed <= limit {
        HealthStatus::Healthy
    } else if observed <= limit * warning_multiplier {
        HealthStatus::Warning
    } else {
        HealthStatus::Unhealthy
    }
}

/// Immutable thresholds plus escalation factor, built once at startup.
#[derive(Debug, Clone, Copy)]
pub struct ThresholdEvaluator {
    thresholds: Thresholds,
    warning_multiplier: f64,
}

impl ThresholdEvaluator {
    /// Validates every threshold up front so `evaluate_sample` cannot fail later.
    pub fn new(thresholds: Thresholds, warning_multiplier: f64) -> Result<Self, HealthCheckError> {
        for threshold in thresholds.iter() {
            evaluate(threshold.name, 0.0, threshold.limit, warning_multiplier)?;
        }
        Ok(Self {
            thresholds,
            warning_multiplier,
        })
    }

    pub fn thresholds(&self) -> &Thresholds {
        &self.thresholds
    }

    pub fn warning_multiplier(&self) -> f64 {
        self.warning_multiplier
    }

    pub fn evaluate_sample(&self, sample: &MetricSample) -> HealthStatus {
        tier(sample.value, self.thresholds.get(sample.name).limit, self.warning_multiplier)
    }
}
