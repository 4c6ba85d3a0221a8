use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Config {
    pub container_name: String,
    pub thresholds: Thresholds,
    pub warning_multiplier: f64,
    pub api_check_enabled: bool,
    pub endpoints: Vec<EndpointSpec>,
    pub api_timeout: Duration,
    pub api_retry_attempts: u32,
    pub api_retry_delay: Duration,
    pub runtime_timeout: Duration,
    pub runtime_retry_attempts: u32,
    pub runtime_retry_delay: Duration,
    pub error_patterns: Vec<String>,
    pub log_tail_lines: usize,
    pub max_log_matches: usize,
    pub check_interval: Duration,
    pub run_once: bool,
    pub output_dir: String,
    pub save_output_files: bool,
    pub metrics_enabled: bool,
    pub prometheus_port: u16,
    pub max_port_attempts: u16,
    pub log_level: String,
    /// File name under `output_dir` that receives a copy of every log line.
    pub log_file: Option<String>,
}

/// Metrics that carry a configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdName {
    CpuPercent,
    MemoryPercent,
    DiskPercent,
    ResponseTime,
    RestartCount,
}

impl ThresholdName {
    pub const ALL: [ThresholdName; 5] = [
        ThresholdName::CpuPercent,
        ThresholdName::MemoryPercent,
        ThresholdName::DiskPercent,
        ThresholdName::ResponseTime,
        ThresholdName::RestartCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdName::CpuPercent => "cpu_percent",
            ThresholdName::MemoryPercent => "memory_percent",
            ThresholdName::DiskPercent => "disk_percent",
            ThresholdName::ResponseTime => "response_time",
            ThresholdName::RestartCount => "restart_count",
        }
    }
}

impl fmt::Display for ThresholdName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Threshold {
    pub name: ThresholdName,
    pub limit: f64,
}

/// The full set of configured limits, one per [`ThresholdName`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
    pub response_time: f64,
    pub restart_count: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 75.0,
            memory_percent: 80.0,
            disk_percent: 90.0,
            response_time: 1.5,
            restart_count: 3.0,
        }
    }
}

impl Thresholds {
    pub fn get(&self, name: ThresholdName) -> Threshold {
        let limit = match name {
            ThresholdName::CpuPercent => self.cpu_percent,
            ThresholdName::MemoryPercent => self.memory_percent,
            ThresholdName::DiskPercent => self.disk_percent,
            ThresholdName::ResponseTime => self.response_time,
            ThresholdName::RestartCount => self.restart_count,
        };
        Threshold { name, limit }
    }

    pub fn iter(&self) -> impl Iterator<Item = Threshold> + '_ {
        ThresholdName::ALL.iter().map(move |n| self.get(*n))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub name: ThresholdName,
    pub value: f64,
}

impl MetricSample {
    pub fn new(name: ThresholdName, value: f64) -> Self {
        Self { name, value }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_expected_status() -> u16 {
    200
}

impl EndpointSpec {
    pub fn get<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            method: default_method(),
            expected_status: default_expected_status(),
        }
    }
}

/// Tri-state verdict plus ERROR for "could not determine".
///
/// Variant order is the precedence order: derived `Ord` makes
/// `Healthy < Warning < Unhealthy < Error`, so the worst status of a set is its max.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
    Error,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Warning => "warning",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Error => "error",
        }
    }

    pub fn rank(&self) -> u8 {
        *self as u8
    }

    pub fn worst<I: IntoIterator<Item = HealthStatus>>(statuses: I) -> Option<HealthStatus> {
        statuses.into_iter().max()
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckName {
    ContainerRunning,
    Resources,
    ApiHealth,
    Logs,
    RestartCount,
}

impl CheckName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckName::ContainerRunning => "container_running",
            CheckName::Resources => "resources",
            CheckName::ApiHealth => "api_health",
            CheckName::Logs => "logs",
            CheckName::RestartCount => "restart_count",
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluated outcome of one check for one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub check_name: CheckName,
    pub status: HealthStatus,
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl CheckResult {
    pub fn new(check_name: CheckName, status: HealthStatus) -> Self {
        Self {
            check_name,
            status,
            details: serde_json::Map::new(),
        }
    }

    /// ERROR result carrying a human-readable reason.
    pub fn error<M: fmt::Display>(check_name: CheckName, message: M) -> Self {
        Self::new(check_name, HealthStatus::Error).with_detail("message", message.to_string())
    }

    pub fn with_detail<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<serde_json::Value>,
    {
        self.details.insert(key.into(), value.into());
        self
    }
}

impl Serialize for CheckResult {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.details.len() + 1))?;
        map.serialize_entry("status", &self.status)?;
        for (k, v) in &self.details {
            if k != "status" {
                map.serialize_entry(k, v)?;
            }
        }
        map.end()
    }
}

/// Ordered check_name -> result mapping handed to the aggregator.
pub type CheckResults = BTreeMap<CheckName, CheckResult>;
