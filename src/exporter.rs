//! Prometheus export of the latest health report.
//!
//! Gauges mirror the most recent [`HealthReport`]; a gauge whose check could not
//! produce a value this cycle is removed rather than left at its last reading.
//! The error counter grows by each cycle's per-pattern log matches. Served on
//! `/metrics` next to a small `/health` liveness endpoint for the reporter itself.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use prometheus::{Encoder, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::report::HealthReport;
use crate::types::{CheckName, HealthStatus};

/// Collection of Prometheus metrics derived from health reports.
#[derive(Clone)]
pub struct ReportMetrics {
    registry: Registry,
    pub container_up: GaugeVec,
    pub cpu_usage: GaugeVec,
    pub memory_usage: GaugeVec,
    pub disk_usage: GaugeVec,
    pub restart_count: GaugeVec,
    pub health_status: GaugeVec,
    pub api_response_time: GaugeVec,
    pub api_health: GaugeVec,
    pub api_last_status_code: GaugeVec,
    pub error_count: IntCounterVec,
}

fn gauge_vec(registry: &Registry, name: &str, help: &str, labels: &[&str]) -> Result<GaugeVec> {
    let gauge = GaugeVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

impl ReportMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();
        let c = &["container_name"];
        let ce = &["container_name", "endpoint"];

        let error_count = IntCounterVec::new(
            Opts::new("container_error_total", "Container log error matches by pattern"),
            &["container_name", "error_type"],
        )?;
        registry.register(Box::new(error_count.clone()))?;

        Ok(Self {
            container_up: gauge_vec(&registry, "container_up", "Container running status (1 for running, 0 otherwise)", c)?,
            cpu_usage: gauge_vec(&registry, "container_cpu_usage_percent", "Container CPU usage percentage", c)?,
            memory_usage: gauge_vec(&registry, "container_memory_usage_percent", "Container memory usage percentage", c)?,
            disk_usage: gauge_vec(&registry, "container_disk_usage_percent", "Container disk usage percentage", c)?,
            restart_count: gauge_vec(&registry, "container_restart_count", "Container restart count", c)?,
            health_status: gauge_vec(
                &registry,
                "container_health_status",
                "Overall health (0 healthy, 1 warning, 2 unhealthy, 3 error)",
                c,
            )?,
            api_response_time: gauge_vec(&registry, "api_response_time_seconds", "API endpoint response time in seconds", ce)?,
            api_health: gauge_vec(&registry, "api_health_status", "API endpoint health status (1 for healthy, 0 otherwise)", ce)?,
            api_last_status_code: gauge_vec(&registry, "api_last_status_code", "Last HTTP status code returned by the endpoint", ce)?,
            error_count,
            registry,
        })
    }

    /// Update every metric from one report.
    pub fn record(&self, report: &HealthReport) {
        let name = report.container_name.as_str();
        self.health_status
            .with_label_values(&[name])
            .set(report.overall_status.rank() as f64);

        if let Some(running) = report.checks.get(&CheckName::ContainerRunning) {
            let up = if running.status == HealthStatus::Healthy { 1.0 } else { 0.0 };
            self.container_up.with_label_values(&[name]).set(up);
        }

        let resources = report
            .checks
            .get(&CheckName::Resources)
            .and_then(|r| r.details.get("metrics"));
        let gauges = [
            ("cpu_percent", &self.cpu_usage),
            ("memory_percent", &self.memory_usage),
            ("disk_percent", &self.disk_usage),
        ];
        for (key, gauge) in gauges {
            set_or_clear(gauge, &[name], resources.and_then(|m| m.get(key)).and_then(|v| v.as_f64()));
        }

        let restarts = report
            .checks
            .get(&CheckName::RestartCount)
            .and_then(|r| r.details.get("restart_count"))
            .and_then(|v| v.as_f64());
        set_or_clear(&self.restart_count, &[name], restarts);

        if let Some(endpoints) = report
            .checks
            .get(&CheckName::ApiHealth)
            .and_then(|r| r.details.get("endpoints"))
            .and_then(|v| v.as_array())
        {
            for endpoint in endpoints {
                let Some(url) = endpoint.get("url").and_then(|v| v.as_str()) else {
                    continue;
                };
                let labels = [name, url];
                let healthy = endpoint.get("status").and_then(|v| v.as_str()) == Some("healthy");
                self.api_health
                    .with_label_values(&labels)
                    .set(if healthy { 1.0 } else { 0.0 });
                // A connection failure is reported as 503.
                let code = endpoint.get("status_code").and_then(|v| v.as_f64()).unwrap_or(503.0);
                self.api_last_status_code.with_label_values(&labels).set(code);
                let rt = endpoint.get("response_time").and_then(|v| v.as_f64());
                set_or_clear(&self.api_response_time, &labels, rt);
            }
        }

        if let Some(found) = report
            .checks
            .get(&CheckName::Logs)
            .and_then(|r| r.details.get("errors_found"))
            .and_then(|v| v.as_object())
        {
            for (pattern, count) in found {
                if let Some(n) = count.as_u64() {
                    self.error_count.with_label_values(&[name, pattern.as_str()]).inc_by(n);
                }
            }
        }
        debug!(container = name, "prometheus metrics updated");
    }

    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .context("Failed to encode metrics")?;
        String::from_utf8(buffer).context("Metrics output was not UTF-8")
    }
}

fn set_or_clear(gauge: &GaugeVec, labels: &[&str], value: Option<f64>) {
    match value {
        Some(v) => gauge.with_label_values(labels).set(v),
        None => {
            // absent labels are fine
            let _ = gauge.remove_label_values(labels);
        }
    }
}

/// Error type for metrics endpoint failures.
#[derive(Debug)]
pub struct MetricsError;

impl IntoResponse for MetricsError {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
    }
}

async fn metrics_handler(State(metrics): State<Arc<ReportMetrics>>) -> Result<String, MetricsError> {
    metrics.encode().map_err(|e| {
        error!("metrics encoding failed: {}", e);
        MetricsError
    })
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Local::now().to_rfc3339(),
    }))
}

pub fn router(metrics: Arc<ReportMetrics>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .with_state(metrics)
}

/// Bind the first free port in `start..start + attempts`.
pub async fn bind_first_available(host: &str, start: u16, attempts: u16) -> Result<TcpListener> {
    let end = start.saturating_add(attempts);
    for port in start..end {
        match TcpListener::bind((host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) => debug!(port, "port unavailable: {}", e),
        }
    }
    Err(anyhow!(
        "No available ports found in range {}-{}",
        start,
        end.saturating_sub(1)
    ))
}

/// Serve metrics until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, metrics: Arc<ReportMetrics>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!("metrics exporter listening on http://{}", addr);
    axum::serve(listener, router(metrics))
        .with_graceful_shutdown(shutdown)
        .await
        .context("metrics server failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::HealthCheckError;
    use crate::report::aggregate;
    use crate::types::{CheckResult, CheckResults};
    use serde_json::json;

    fn sample_report() -> HealthReport {
        let mut checks = CheckResults::new();
        checks.insert(
            CheckName::ContainerRunning,
            CheckResult::new(CheckName::ContainerRunning, HealthStatus::Healthy),
        );
        checks.insert(
            CheckName::Resources,
            CheckResult::new(CheckName::Resources, HealthStatus::Warning).with_detail(
                "metrics",
                json!({"cpu_percent": 80.5, "memory_percent": 40.0, "disk_percent": 12.25}),
            ),
        );
        checks.insert(
            CheckName::RestartCount,
            CheckResult::new(CheckName::RestartCount, HealthStatus::Healthy).with_detail("restart_count", 2),
        );
        checks.insert(
            CheckName::ApiHealth,
            CheckResult::new(CheckName::ApiHealth, HealthStatus::Error).with_detail(
                "endpoints",
                json!([
                    {"url": "http://web/health", "status": "healthy", "status_code": 200, "response_time": 0.25},
                    {"url": "http://web/down", "status": "error", "error": "connection refused"}
                ]),
            ),
        );
        checks.insert(
            CheckName::Logs,
            CheckResult::new(CheckName::Logs, HealthStatus::Warning)
                .with_detail("errors_found", json!({"ERROR": 3})),
        );
        aggregate("web", checks).unwrap()
    }

    #[test]
    fn test_record_and_encode() {
        let metrics = ReportMetrics::new().unwrap();
        metrics.record(&sample_report());

        assert_eq!(metrics.container_up.with_label_values(&["web"]).get(), 1.0);
        assert_eq!(metrics.cpu_usage.with_label_values(&["web"]).get(), 80.5);
        assert_eq!(metrics.disk_usage.with_label_values(&["web"]).get(), 12.25);
        assert_eq!(metrics.restart_count.with_label_values(&["web"]).get(), 2.0);
        assert_eq!(metrics.health_status.with_label_values(&["web"]).get(), 3.0);
        assert_eq!(
            metrics.api_health.with_label_values(&["web", "http://web/health"]).get(),
            1.0
        );
        assert_eq!(
            metrics.api_last_status_code.with_label_values(&["web", "http://web/down"]).get(),
            503.0
        );
        assert_eq!(metrics.error_count.with_label_values(&["web", "ERROR"]).get(), 3);

        let text = metrics.encode().unwrap();
        assert!(text.contains("container_cpu_usage_percent"));
        assert!(text.contains("api_response_time_seconds"));
    }

    #[test]
    fn test_error_counter_accumulates() {
        let metrics = ReportMetrics::new().unwrap();
        let report = sample_report();
        metrics.record(&report);
        metrics.record(&report);
        assert_eq!(metrics.error_count.with_label_values(&["web", "ERROR"]).get(), 6);
    }

    #[test]
    fn test_failed_checks_clear_stale_gauges() {
        let metrics = ReportMetrics::new().unwrap();
        metrics.record(&sample_report());

        let mut checks = CheckResults::new();
        checks.insert(
            CheckName::Resources,
            CheckResult::error(CheckName::Resources, &HealthCheckError::Timeout(std::time::Duration::from_secs(10))),
        );
        checks.insert(
            CheckName::RestartCount,
            CheckResult::error(CheckName::RestartCount, &HealthCheckError::RuntimeUnreachable("socket".into())),
        );
        checks.insert(
            CheckName::ApiHealth,
            CheckResult::new(CheckName::ApiHealth, HealthStatus::Error).with_detail(
                "endpoints",
                json!([{"url": "http://web/health", "status": "error", "error": "timed out after 1s"}]),
            ),
        );
        metrics.record(&aggregate("web", checks).unwrap());

        let text = metrics.encode().unwrap();
        assert!(!text.contains("container_cpu_usage_percent{"));
        assert!(!text.contains("container_disk_usage_percent{"));
        assert!(!text.contains("container_restart_count{"));
        assert!(!text.contains(r#"api_response_time_seconds{container_name="web",endpoint="http://web/health"}"#));
        assert_eq!(
            metrics.api_health.with_label_values(&["web", "http://web/health"]).get(),
            0.0
        );
        assert_eq!(metrics.health_status.with_label_values(&["web"]).get(), 3.0);
    }

    #[tokio::test]
    async fn test_bind_skips_taken_port() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        match bind_first_available("127.0.0.1", port, 2).await {
            Ok(listener) => assert_ne!(listener.local_addr().unwrap().port(), port),
            // the neighbouring port may be taken too on a busy host
            Err(e) => assert!(e.to_string().contains("No available ports")),
        }
    }

    #[tokio::test]
    async fn test_bind_fails_when_range_exhausted() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let err = bind_first_available("127.0.0.1", port, 1).await.unwrap_err();
        assert!(err.to_string().contains(&port.to_string()));
    }
}
