use serde_json::json;
use tracing::warn;

use crate::errors::CheckOutcome;
use crate::evaluator::ThresholdEvaluator;
use crate::parsing::{compute_cpu_percent, compute_disk_percent, compute_memory_percent, round2};
use crate::runtime::{ContainerRuntime, ContainerStatsSnapshot, DiskUsage};
use crate::types::{CheckName, CheckResult, Config, HealthStatus, MetricSample, ThresholdName};
use super::base::{error_result, with_retry, RuntimeCallPolicy};

/// CPU, memory and disk samples for one poll cycle.
pub fn resource_samples(stats: &ContainerStatsSnapshot, disk: &DiskUsage) -> [MetricSample; 3] {
    [
        MetricSample::new(
            ThresholdName::CpuPercent,
            compute_cpu_percent(&stats.cpu, &stats.precpu, stats.online_cpus),
        ),
        MetricSample::new(
            ThresholdName::MemoryPercent,
            compute_memory_percent(stats.memory_usage, stats.memory_limit),
        ),
        MetricSample::new(
            ThresholdName::DiskPercent,
            compute_disk_percent(disk.total_bytes, disk.available_bytes),
        ),
    ]
}

/// Analyze container resource usage against the cpu/memory/disk thresholds
pub async fn analyze_resources<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    cfg: &Config,
    evaluator: &ThresholdEvaluator,
) -> CheckResult {
    let name = cfg.container_name.as_str();
    match read_counters(runtime, cfg).await {
        Ok((stats, disk)) => evaluate_resources(name, &resource_samples(&stats, &disk), evaluator),
        Err(e) => error_result(name, CheckName::Resources, &e),
    }
}

async fn read_counters<R: ContainerRuntime + ?Sized>(
    runtime: &R,
    cfg: &Config,
) -> CheckOutcome<(ContainerStatsSnapshot, DiskUsage)> {
    let policy = RuntimeCallPolicy::from_config(cfg);
    let stats = with_retry(policy, || runtime.stats(&cfg.container_name)).await?;
    let disk = with_retry(policy, || runtime.disk_usage()).await?;
    Ok((stats, disk))
}

/// The check takes the worst status of its samples.
pub fn evaluate_resources(
    container: &str,
    samples: &[MetricSample],
    evaluator: &ThresholdEvaluator,
) -> CheckResult {
    let mut metrics = serde_json::Map::new();
    let mut breaches = Vec::new();
    let mut status = HealthStatus::Healthy;

    for sample in samples {
        let sample_status = evaluator.evaluate_sample(sample);
        metrics.insert(sample.name.to_string(), json!(round2(sample.value)));
        if sample_status != HealthStatus::Healthy {
            let limit = evaluator.thresholds().get(sample.name).limit;
            warn!(
                container,
                metric = %sample.name,
                value = sample.value,
                limit,
                "{} usage exceeds threshold",
                sample.name
            );
            breaches.push(json!({
                "metric": sample.name,
                "value": round2(sample.value),
                "threshold": limit,
                "status": sample_status,
            }));
        }
        status = status.max(sample_status);
    }

    CheckResult::new(CheckName::Resources, status)
        .with_detail("metrics", serde_json::Value::Object(metrics))
        .with_detail("breaches", breaches)
}
