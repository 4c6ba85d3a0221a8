//! Container runtime access.
//!
//! Collectors only ever talk to [`ContainerRuntime`]; [`DockerRuntime`] is the
//! production implementation over the local Docker socket. All runtime
//! operations are read-only.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{InspectContainerOptions, LogsOptions, StatsOptions};
use bollard::Docker;
use futures::StreamExt;
use sysinfo::Disks;
use tracing::debug;

use crate::errors::{CheckOutcome, HealthCheckError};
use crate::parsing::CpuCounters;

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerInspect {
    pub status: String,
    pub running: bool,
    pub restart_count: u64,
}

/// One stats read: current and previous CPU counters plus memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerStatsSnapshot {
    pub cpu: CpuCounters,
    pub precpu: CpuCounters,
    pub online_cpus: u64,
    pub memory_usage: u64,
    pub memory_limit: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn inspect(&self, container: &str) -> CheckOutcome<ContainerInspect>;

    async fn stats(&self, container: &str) -> CheckOutcome<ContainerStatsSnapshot>;

    /// The `tail` most recent lines of stdout and stderr, oldest first.
    async fn logs(&self, container: &str, tail: usize) -> CheckOutcome<Vec<String>>;

    /// Usage of the filesystem backing the container's host.
    async fn disk_usage(&self) -> CheckOutcome<DiskUsage>;
}

#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> CheckOutcome<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            HealthCheckError::RuntimeUnreachable(format!(
                "Failed to connect to Docker daemon. Is Docker running? ({})",
                e
            ))
        })?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn map_docker_error(container: &str, err: bollard::errors::Error) -> HealthCheckError {
    match err {
        bollard::errors::Error::DockerResponseServerError { status_code: 404, .. } => {
            HealthCheckError::ContainerNotFound(container.to_string())
        }
        other => HealthCheckError::RuntimeUnreachable(other.to_string()),
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn inspect(&self, container: &str) -> CheckOutcome<ContainerInspect> {
        let inspect = self
            .docker
            .inspect_container(container, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_docker_error(container, e))?;

        let state = inspect.state.unwrap_or_default();
        let status = state
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let running = state.running.unwrap_or(false);
        let restart_count = inspect.restart_count.unwrap_or(0).max(0) as u64;
        debug!(container, %status, restart_count, "inspected container");

        Ok(ContainerInspect {
            status,
            running,
            restart_count,
        })
    }

    async fn stats(&self, container: &str) -> CheckOutcome<ContainerStatsSnapshot> {
        // one_shot=false so the daemon fills precpu_stats from its previous read
        let mut stream = self.docker.stats(
            container,
            Some(StatsOptions {
                stream: false,
                one_shot: false,
            }),
        );

        let stats = match stream.next().await {
            Some(Ok(stats)) => stats,
            Some(Err(e)) => return Err(map_docker_error(container, e)),
            None => {
                return Err(HealthCheckError::RuntimeUnreachable(format!(
                    "empty stats stream for {}",
                    container
                )))
            }
        };

        Ok(ContainerStatsSnapshot {
            cpu: CpuCounters {
                total_usage: stats.cpu_stats.cpu_usage.total_usage,
                system_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
            },
            precpu: CpuCounters {
                total_usage: stats.precpu_stats.cpu_usage.total_usage,
                system_usage: stats.precpu_stats.system_cpu_usage.unwrap_or(0),
            },
            online_cpus: stats.cpu_stats.online_cpus.unwrap_or(1),
            memory_usage: stats.memory_stats.usage.unwrap_or(0),
            memory_limit: stats.memory_stats.limit.unwrap_or(0),
        })
    }

    async fn logs(&self, container: &str, tail: usize) -> CheckOutcome<Vec<String>> {
        let mut stream = self.docker.logs(
            container,
            Some(LogsOptions::<String> {
                stdout: true,
                stderr: true,
                tail: tail.to_string(),
                ..Default::default()
            }),
        );

        let mut lines = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_docker_error(container, e))?;
            let text = chunk.to_string();
            lines.extend(text.lines().map(|l| l.to_string()));
        }
        if lines.len() > tail {
            lines.drain(..lines.len() - tail);
        }
        Ok(lines)
    }

    async fn disk_usage(&self) -> CheckOutcome<DiskUsage> {
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .map(|d| DiskUsage {
                total_bytes: d.total_space(),
                available_bytes: d.available_space(),
            })
            .ok_or_else(|| HealthCheckError::RuntimeUnreachable("no filesystem mounted at /".to_string()))
    }
}

/// In-memory runtime for testing. Each operation returns its configured
/// outcome; unset operations report the runtime as unreachable.
#[derive(Debug, Default)]
pub struct MockRuntime {
    inspect: Option<ContainerInspect>,
    stats: Option<ContainerStatsSnapshot>,
    logs: Option<Vec<String>>,
    disk: Option<DiskUsage>,
    missing: bool,
    transient_failures: u32,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_inspect(mut self, status: &str, restart_count: u64) -> Self {
        self.inspect = Some(ContainerInspect {
            status: status.to_string(),
            running: status == "running",
            restart_count,
        });
        self
    }

    pub fn with_stats(mut self, stats: ContainerStatsSnapshot) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_logs<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.logs = Some(lines.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_disk(mut self, total_bytes: u64, available_bytes: u64) -> Self {
        self.disk = Some(DiskUsage {
            total_bytes,
            available_bytes,
        });
        self
    }

    /// Every container lookup fails with not-found.
    pub fn missing_container(mut self) -> Self {
        self.missing = true;
        self
    }

    /// The first `n` container calls fail with a network error.
    pub fn failing_first(mut self, n: u32) -> Self {
        self.transient_failures = n;
        self
    }

    /// Every container call waits `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Container calls made so far, failed ones included.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    async fn answer<T: Clone>(&self, container: &str, value: &Option<T>) -> CheckOutcome<T> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.transient_failures {
            return Err(HealthCheckError::Network("connection refused".to_string()));
        }
        self.lookup(container, value)
    }

    fn lookup<T: Clone>(&self, container: &str, value: &Option<T>) -> CheckOutcome<T> {
        if self.missing {
            return Err(HealthCheckError::ContainerNotFound(container.to_string()));
        }
        value
            .clone()
            .ok_or_else(|| HealthCheckError::RuntimeUnreachable("mock runtime has no data".to_string()))
    }
}

#[async_trait]
impl ContainerRuntime for MockRuntime {
    async fn inspect(&self, container: &str) -> CheckOutcome<ContainerInspect> {
        self.answer(container, &self.inspect).await
    }

    async fn stats(&self, container: &str) -> CheckOutcome<ContainerStatsSnapshot> {
        self.answer(container, &self.stats).await
    }

    async fn logs(&self, container: &str, tail: usize) -> CheckOutcome<Vec<String>> {
        let mut lines = self.answer(container, &self.logs).await?;
        if lines.len() > tail {
            lines.drain(..lines.len() - tail);
        }
        Ok(lines)
    }

    async fn disk_usage(&self) -> CheckOutcome<DiskUsage> {
        self.disk
            .ok_or_else(|| HealthCheckError::RuntimeUnreachable("mock runtime has no disk".to_string()))
    }
}
