use std::time::{Duration, Instant};

use reqwest::{Client, Method};
use serde_json::json;
use tracing::{debug, error, warn};

use crate::errors::HealthCheckError;
use crate::evaluator::ThresholdEvaluator;
use crate::types::{CheckName, CheckResult, Config, EndpointSpec, HealthStatus, MetricSample, ThresholdName};

/// Outcome of probing one endpoint, after retries.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointProbe {
    pub url: String,
    pub method: String,
    pub expected_status: u16,
    pub status: HealthStatus,
    pub status_code: Option<u16>,
    pub response_time: Option<f64>,
    pub attempts: u32,
    pub error: Option<String>,
}

impl EndpointProbe {
    fn to_json(&self) -> serde_json::Value {
        let mut obj = json!({
            "url": self.url,
            "method": self.method,
            "status": self.status,
            "expected_status": self.expected_status,
            "attempts": self.attempts,
        });
        if let Some(code) = self.status_code {
            obj["status_code"] = json!(code);
        }
        if let Some(rt) = self.response_time {
            obj["response_time"] = json!(rt);
        }
        if let Some(err) = &self.error {
            obj["error"] = json!(err);
        }
        obj
    }
}

pub fn build_http_client(timeout: Duration) -> Result<Client, HealthCheckError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| HealthCheckError::config(format!("Failed to build HTTP client: {}", e)))
}

fn classify_request_error(err: reqwest::Error, timeout: Duration) -> HealthCheckError {
    if err.is_timeout() {
        HealthCheckError::Timeout(timeout)
    } else {
        HealthCheckError::Network(err.to_string())
    }
}

/// One request; returns the status code and elapsed seconds.
async fn probe_once(
    client: &Client,
    endpoint: &EndpointSpec,
    timeout: Duration,
) -> Result<(u16, f64), HealthCheckError> {
    let method = Method::from_bytes(endpoint.method.to_ascii_uppercase().as_bytes())
        .map_err(|e| HealthCheckError::config(format!("Invalid method {}: {}", endpoint.method, e)))?;
    let start = Instant::now();
    let response = client
        .request(method, &endpoint.url)
        .send()
        .await
        .map_err(|e| classify_request_error(e, timeout))?;
    let elapsed = start.elapsed().as_secs_f64();
    Ok((response.status().as_u16(), elapsed))
}

/// Probe one endpoint, retrying on failure or unexpected status up to the configured attempt count
pub async fn probe_endpoint(
    client: &Client,
    endpoint: &EndpointSpec,
    cfg: &Config,
    evaluator: &ThresholdEvaluator,
) -> EndpointProbe {
    let attempts = cfg.api_retry_attempts.max(1);
    let mut last_code = None;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match probe_once(client, endpoint, cfg.api_timeout).await {
            Ok((code, elapsed)) if code == endpoint.expected_status => {
                let sample = MetricSample::new(ThresholdName::ResponseTime, elapsed);
                let status = evaluator.evaluate_sample(&sample);
                if status != HealthStatus::Healthy {
                    warn!(url = %endpoint.url, response_time = elapsed, "response time exceeds threshold");
                }
                return EndpointProbe {
                    url: endpoint.url.clone(),
                    method: endpoint.method.clone(),
                    expected_status: endpoint.expected_status,
                    status,
                    status_code: Some(code),
                    response_time: Some((elapsed * 1000.0).round() / 1000.0),
                    attempts: attempt,
                    error: None,
                };
            }
            Ok((code, _)) => {
                last_code = Some(code);
                last_error = format!("expected status {}, got {}", endpoint.expected_status, code);
            }
            Err(e) => {
                last_code = None;
                last_error = e.to_string();
            }
        }
        debug!(url = %endpoint.url, attempt, attempts, "endpoint probe failed: {}", last_error);
        if attempt < attempts && !cfg.api_retry_delay.is_zero() {
            tokio::time::sleep(cfg.api_retry_delay).await;
        }
    }

    error!(url = %endpoint.url, attempts, "API check failed: {}", last_error);
    EndpointProbe {
        url: endpoint.url.clone(),
        method: endpoint.method.clone(),
        expected_status: endpoint.expected_status,
        status: HealthStatus::Error,
        status_code: last_code,
        response_time: None,
        attempts,
        error: Some(last_error),
    }
}

/// Probe every configured endpoint; the check takes the worst endpoint status
pub async fn analyze_endpoints(
    client: &Client,
    cfg: &Config,
    evaluator: &ThresholdEvaluator,
) -> CheckResult {
    let mut probes = Vec::with_capacity(cfg.endpoints.len());
    for endpoint in &cfg.endpoints {
        probes.push(probe_endpoint(client, endpoint, cfg, evaluator).await);
    }
    endpoints_result(&probes)
}

pub fn endpoints_result(probes: &[EndpointProbe]) -> CheckResult {
    let status = HealthStatus::worst(probes.iter().map(|p| p.status)).unwrap_or(HealthStatus::Healthy);
    let endpoints: Vec<serde_json::Value> = probes.iter().map(EndpointProbe::to_json).collect();
    CheckResult::new(CheckName::ApiHealth, status).with_detail("endpoints", endpoints)
}
