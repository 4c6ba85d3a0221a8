use anyhow::Result;
use futures::future::join_all;
use reqwest::Client;
use tracing::debug;

use crate::evaluator::ThresholdEvaluator;
use crate::metrics;
use crate::runtime::ContainerRuntime;
use crate::types::{CheckResult, CheckResults, Config};

/// The closed set of health dimensions probed each poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    ContainerState,
    Resources,
    Endpoints,
    Logs,
}

impl Check {
    pub const ALL: [Check; 4] = [Check::ContainerState, Check::Resources, Check::Endpoints, Check::Logs];

    /// Endpoints run only when enabled; logs only with at least one pattern.
    pub fn enabled(&self, cfg: &Config) -> bool {
        match self {
            Check::ContainerState | Check::Resources => true,
            Check::Endpoints => cfg.api_check_enabled && !cfg.endpoints.is_empty(),
            Check::Logs => !cfg.error_patterns.is_empty(),
        }
    }
}

/// Runs every enabled check against one container
pub struct HealthCollector<'a, R: ContainerRuntime + ?Sized> {
    runtime: &'a R,
    config: &'a Config,
    evaluator: ThresholdEvaluator,
    http: Client,
}

impl<'a, R: ContainerRuntime + ?Sized> HealthCollector<'a, R> {
    /// Fails only on configuration problems.
    pub fn new(runtime: &'a R, config: &'a Config) -> Result<Self> {
        let evaluator = ThresholdEvaluator::new(config.thresholds, config.warning_multiplier)?;
        let http = metrics::build_http_client(config.api_timeout)?;
        Ok(Self {
            runtime,
            config,
            evaluator,
            http,
        })
    }

    pub fn evaluator(&self) -> &ThresholdEvaluator {
        &self.evaluator
    }

    pub fn enabled_checks(&self) -> Vec<Check> {
        Check::ALL.into_iter().filter(|c| c.enabled(self.config)).collect()
    }

    pub async fn run_check(&self, check: Check) -> Vec<CheckResult> {
        debug!(?check, container = %self.config.container_name, "running check");
        match check {
            Check::ContainerState => {
                let state = metrics::analyze_container_state(self.runtime, self.config, &self.evaluator).await;
                vec![state.running, state.restarts]
            }
            Check::Resources => {
                vec![metrics::analyze_resources(self.runtime, self.config, &self.evaluator).await]
            }
            Check::Endpoints => {
                vec![metrics::analyze_endpoints(&self.http, self.config, &self.evaluator).await]
            }
            Check::Logs => vec![metrics::analyze_logs(self.runtime, self.config).await],
        }
    }

    /// One poll cycle. Checks run concurrently and each contains its own failures,
    /// so the cycle always yields a result for every enabled check.
    pub async fn collect(&self) -> CheckResults {
        let outputs = join_all(self.enabled_checks().into_iter().map(|c| self.run_check(c))).await;
        outputs
            .into_iter()
            .flatten()
            .map(|r| (r.check_name, r))
            .collect()
    }
}
