use tracing::warn;

use crate::parsing::{scan_for_patterns, PatternScan};
use crate::runtime::ContainerRuntime;
use crate::types::{CheckName, CheckResult, Config, HealthStatus};
use super::base::{error_result, with_retry, RuntimeCallPolicy};

/// Scan the tail of the container log for configured error patterns
pub async fn analyze_logs<R: ContainerRuntime + ?Sized>(runtime: &R, cfg: &Config) -> CheckResult {
    let name = cfg.container_name.as_str();
    let policy = RuntimeCallPolicy::from_config(cfg);
    match with_retry(policy, || runtime.logs(name, cfg.log_tail_lines)).await {
        Ok(lines) => {
            let scan = scan_for_patterns(lines.iter().map(|l| l.as_str()), &cfg.error_patterns, cfg.max_log_matches);
            logs_result(name, &scan)
        }
        Err(e) => error_result(name, CheckName::Logs, &e),
    }
}

pub fn logs_result(container: &str, scan: &PatternScan) -> CheckResult {
    let status = if scan.error_count == 0 {
        HealthStatus::Healthy
    } else {
        warn!(container, error_count = scan.error_count, "error patterns found in logs");
        HealthStatus::Warning
    };
    let errors_found: serde_json::Map<String, serde_json::Value> = scan
        .per_pattern
        .iter()
        .map(|(pattern, count)| (pattern.clone(), serde_json::Value::from(*count)))
        .collect();
    CheckResult::new(CheckName::Logs, status)
        .with_detail("error_count", scan.error_count)
        .with_detail("errors_found", serde_json::Value::Object(errors_found))
        .with_detail("matches", scan.matches.clone())
        .with_detail("truncated", scan.truncated)
}
