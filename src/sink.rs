use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::report::HealthReport;
use crate::types::{Config, HealthStatus};

pub fn report_file_name(report: &HealthReport) -> String {
    format!("health_check_{}.json", report.timestamp.format("%Y%m%d_%H%M%S"))
}

/// Write the report as pretty JSON under `output_dir`, creating the directory if needed.
pub async fn write_report_file(output_dir: &Path, report: &HealthReport) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    let path = output_dir.join(report_file_name(report));
    let body = report.to_json_pretty().context("Failed to serialize health report")?;
    tokio::fs::write(&path, body)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

pub fn print_report(report: &HealthReport) -> Result<()> {
    let body = report.to_json_pretty().context("Failed to serialize health report")?;
    println!("{}", body);
    Ok(())
}

/// Hand one report to the console and, when enabled, the output directory.
pub async fn emit_report(cfg: &Config, report: &HealthReport) -> Result<()> {
    print_report(report)?;
    if cfg.save_output_files {
        let path = write_report_file(Path::new(&cfg.output_dir), report).await?;
        info!("Results saved to: {}", path.display());
    }

    let summary = report.summary();
    match report.overall_status {
        HealthStatus::Healthy => info!(
            container = %report.container_name,
            checks = summary.total_checks(),
            "overall status healthy"
        ),
        status => warn!(
            container = %report.container_name,
            %status,
            issues = summary.total_issues(),
            "overall status degraded"
        ),
    }
    Ok(())
}
