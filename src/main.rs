use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{error, info};

use docker_health_reporter::collector::HealthCollector;
use docker_health_reporter::config::load_config;
use docker_health_reporter::exporter::{self, ReportMetrics};
use docker_health_reporter::logging::init_tracing;
use docker_health_reporter::poller;
use docker_health_reporter::runtime::DockerRuntime;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = load_config()?;
    init_tracing(&cfg)?;
    info!(
        container = %cfg.container_name,
        interval = ?cfg.check_interval,
        "starting docker health reporter"
    );

    let runtime = DockerRuntime::connect()?;
    let collector = HealthCollector::new(&runtime, &cfg)?;
    info!("enabled checks = {:?}", collector.enabled_checks());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // Exporter startup failure is fatal, same as an invalid config.
    let metrics = if cfg.metrics_enabled {
        let metrics = Arc::new(ReportMetrics::new()?);
        let listener = exporter::bind_first_available("0.0.0.0", cfg.prometheus_port, cfg.max_port_attempts)
            .await
            .context("Failed to start metrics exporter")?;
        let mut rx = shutdown_rx.clone();
        let server_metrics = metrics.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = rx.wait_for(|stop| *stop).await;
            };
            if let Err(e) = exporter::serve(listener, server_metrics, shutdown).await {
                error!("{:#}", e);
            }
        });
        Some(metrics)
    } else {
        None
    };

    let published = poller::run(&collector, &cfg, metrics.as_deref(), shutdown_rx).await?;
    info!(reports = published, "health reporter stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
