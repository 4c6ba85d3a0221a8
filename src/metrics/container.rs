use tracing::{info, warn};

use crate::evaluator::ThresholdEvaluator;
use crate::runtime::{ContainerInspect, ContainerRuntime};
use crate::types::{CheckName, CheckResult, Config, HealthStatus, MetricSample, ThresholdName};
use super::base::{error_result, with_retry, RuntimeCallPolicy};

/// Container state results: `container_running` and `restart_count`.
pub struct ContainerStateResults {
    pub running: CheckResult,
    pub restarts: CheckResult,
}

/// Inspect the container once and derive both state checks from it
pub async fn analyze_container_state<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    cfg: &Config,
    evaluator: &ThresholdEvaluator,
) -> ContainerStateResults {
    let name = cfg.container_name.as_str();
    match with_retry(RuntimeCallPolicy::from_config(cfg), || runtime.inspect(name)).await {
        Ok(inspect) => ContainerStateResults {
            running: running_result(name, &inspect),
            restarts: restart_result(name, &inspect, evaluator),
        },
        Err(e) => ContainerStateResults {
            running: error_result(name, CheckName::ContainerRunning, &e),
            restarts: error_result(name, CheckName::RestartCount, &e),
        },
    }
}

pub fn running_result(container: &str, inspect: &ContainerInspect) -> CheckResult {
    info!(container, status = %inspect.status, "container status");
    let status = if inspect.running {
        HealthStatus::Healthy
    } else {
        warn!(container, status = %inspect.status, "container is not running");
        HealthStatus::Unhealthy
    };
    CheckResult::new(CheckName::ContainerRunning, status).with_detail("state", inspect.status.clone())
}

pub fn restart_result(
    container: &str,
    inspect: &ContainerInspect,
    evaluator: &ThresholdEvaluator,
) -> CheckResult {
    let sample = MetricSample::new(ThresholdName::RestartCount, inspect.restart_count as f64);
    let status = evaluator.evaluate_sample(&sample);
    if status != HealthStatus::Healthy {
        warn!(
            container,
            restart_count = inspect.restart_count,
            limit = evaluator.thresholds().restart_count,
            "restart count exceeds threshold"
        );
    }
    CheckResult::new(CheckName::RestartCount, status).with_detail("restart_count", inspect.restart_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_with_env, MockEnvironment};
    use crate::runtime::MockRuntime;
    use crate::types::Thresholds;

    fn create_test_config() -> Config {
        let env = MockEnvironment::new().with_var("CONTAINER_NAME", "web");
        load_config_with_env(&env).unwrap()
    }

    fn evaluator() -> ThresholdEvaluator {
        ThresholdEvaluator::new(Thresholds::default(), 1.2).unwrap()
    }

    #[tokio::test]
    async fn test_running_container_is_healthy() {
        let runtime = MockRuntime::new().with_inspect("running", 1);
        let out = analyze_container_state(&runtime, &create_test_config(), &evaluator()).await;
        assert_eq!(out.running.status, HealthStatus::Healthy);
        assert_eq!(out.running.details["state"], "running");
        assert_eq!(out.restarts.status, HealthStatus::Healthy);
        assert_eq!(out.restarts.details["restart_count"], 1);
    }

    #[tokio::test]
    async fn test_stopped_container_is_unhealthy() {
        let runtime = MockRuntime::new().with_inspect("exited", 0);
        let out = analyze_container_state(&runtime, &create_test_config(), &evaluator()).await;
        assert_eq!(out.running.status, HealthStatus::Unhealthy);
        assert_eq!(out.running.details["state"], "exited");
    }

    #[tokio::test]
    async fn test_restart_count_tiers() {
        let cfg = create_test_config();
        let warn = MockRuntime::new().with_inspect("running", 4);
        let out = analyze_container_state(&warn, &cfg, &evaluator()).await;
        // 3 < 4 <= 3.6 is false, so 4 is past the warning band
        assert_eq!(out.restarts.status, HealthStatus::Unhealthy);

        let ev = ThresholdEvaluator::new(Thresholds { restart_count: 10.0, ..Thresholds::default() }, 1.2).unwrap();
        let warn = MockRuntime::new().with_inspect("running", 11);
        let out = analyze_container_state(&warn, &cfg, &ev).await;
        assert_eq!(out.restarts.status, HealthStatus::Warning);
    }

    #[tokio::test]
    async fn test_inspect_retried_after_connection_refused() {
        let env = MockEnvironment::new()
            .with_var("CONTAINER_NAME", "web")
            .with_var("RUNTIME_RETRY_ATTEMPTS", "3")
            .with_var("RUNTIME_RETRY_DELAY_MS", "0");
        let cfg = load_config_with_env(&env).unwrap();
        let runtime = MockRuntime::new().with_inspect("running", 0).failing_first(1);
        let out = analyze_container_state(&runtime, &cfg, &evaluator()).await;
        assert_eq!(runtime.calls(), 2);
        assert_eq!(out.running.status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_inspect_gives_up_after_retry_attempts() {
        let env = MockEnvironment::new()
            .with_var("CONTAINER_NAME", "web")
            .with_var("RUNTIME_RETRY_ATTEMPTS", "2")
            .with_var("RUNTIME_RETRY_DELAY_MS", "0");
        let cfg = load_config_with_env(&env).unwrap();
        let runtime = MockRuntime::new().with_inspect("running", 0).failing_first(5);
        let out = analyze_container_state(&runtime, &cfg, &evaluator()).await;
        assert_eq!(runtime.calls(), 2);
        assert_eq!(out.running.status, HealthStatus::Error);
        assert!(out.running.details["message"].as_str().unwrap().contains("connection refused"));
    }

    #[tokio::test]
    async fn test_missing_container_is_error_not_unhealthy() {
        let runtime = MockRuntime::new().missing_container();
        let out = analyze_container_state(&runtime, &create_test_config(), &evaluator()).await;
        assert_eq!(out.running.status, HealthStatus::Error);
        assert_eq!(out.restarts.status, HealthStatus::Error);
        assert!(out.running.details["message"].as_str().unwrap().contains("web"));
        assert_eq!(runtime.calls(), 1);
    }
}
