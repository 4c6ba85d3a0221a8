//! The poll loop: collect, aggregate, publish, sleep, until told to stop.

use anyhow::Result;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::collector::HealthCollector;
use crate::exporter::ReportMetrics;
use crate::report::{aggregate, HealthReport};
use crate::runtime::ContainerRuntime;
use crate::sink::emit_report;
use crate::types::Config;

/// Collect and aggregate one cycle, then hand the report to every sink.
///
/// Sink failures are logged; only an aggregation invariant violation fails the cycle.
pub async fn run_cycle<R: ContainerRuntime + ?Sized>(
    collector: &HealthCollector<'_, R>,
    cfg: &Config,
    metrics: Option<&ReportMetrics>,
) -> Result<HealthReport> {
    let results = collector.collect().await;
    let report = aggregate(&cfg.container_name, results)?;

    if let Err(e) = emit_report(cfg, &report).await {
        warn!("failed to emit report: {:#}", e);
    }
    if let Some(metrics) = metrics {
        metrics.record(&report);
    }
    Ok(report)
}

/// Run cycles every `check_interval` (once with `run_once`) until `shutdown` turns true.
///
/// A cycle still in flight when shutdown arrives is dropped without publishing
/// anything. Returns the number of reports published.
pub async fn run<R: ContainerRuntime + ?Sized>(
    collector: &HealthCollector<'_, R>,
    cfg: &Config,
    metrics: Option<&ReportMetrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<usize> {
    let mut published = 0;
    loop {
        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => {
                info!("poll cycle cancelled");
                break;
            }
            report = run_cycle(collector, cfg, metrics) => {
                report?;
                published += 1;
            }
        }

        if cfg.run_once {
            break;
        }

        tokio::select! {
            _ = shutdown.wait_for(|stop| *stop) => break,
            _ = tokio::time::sleep(cfg.check_interval) => {}
        }
    }
    Ok(published)
}
