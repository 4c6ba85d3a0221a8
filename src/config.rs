use anyhow::{Context, Result};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::HealthCheckError;
use crate::parsing::{parse_bool, parse_json_string_list};
use crate::types::{Config, EndpointSpec, Thresholds};

const DEFAULT_ERROR_PATTERNS: [&str; 3] = ["ERROR", "FATAL", "Exception"];
const ALLOWED_METHODS: [&str; 4] = ["GET", "POST", "HEAD", "PUT"];

/// Trait for abstracting environment variable access
pub trait EnvironmentProvider {
    fn get_var(&self, key: &str) -> Option<String>;
}

/// Production implementation using std::env
pub struct SystemEnvironment;

impl EnvironmentProvider for SystemEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

/// Mock implementation for testing
#[derive(Debug, Default)]
pub struct MockEnvironment {
    vars: HashMap<String, String>,
}

impl MockEnvironment {
    pub fn new() -> Self {
        Self {
            vars: HashMap::new(),
        }
    }

    pub fn set_var<K, V>(&mut self, key: K, value: V) -> &mut Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.vars.insert(key.into(), value.into());
        self
    }

    pub fn with_var<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.set_var(key, value);
        self
    }
}

impl EnvironmentProvider for MockEnvironment {
    fn get_var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Loads `.env` (if present) and then the process environment.
pub fn load_config() -> Result<Config> {
    let _ = dotenv::dotenv();
    let cfg = load_config_with_env(&SystemEnvironment)?;
    validate_config(&cfg)?;
    Ok(cfg)
}

fn parse_var<E, T>(env: &E, key: &str, default: T) -> Result<T>
where
    E: EnvironmentProvider,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env.get_var(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {}", key)),
        _ => Ok(default),
    }
}

fn bool_var<E: EnvironmentProvider>(env: &E, key: &str, default: bool) -> bool {
    env.get_var(key).map(|v| parse_bool(&v)).unwrap_or(default)
}

pub fn load_config_with_env<E: EnvironmentProvider>(env: &E) -> Result<Config> {
    let container_name = env
        .get_var("CONTAINER_NAME")
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "test_container".to_string());

    let defaults = Thresholds::default();
    let thresholds = Thresholds {
        cpu_percent: parse_var(env, "CPU_PERCENT_THRESHOLD", defaults.cpu_percent)?,
        memory_percent: parse_var(env, "MEMORY_PERCENT_THRESHOLD", defaults.memory_percent)?,
        disk_percent: parse_var(env, "DISK_PERCENT_THRESHOLD", defaults.disk_percent)?,
        response_time: parse_var(env, "RESPONSE_TIME_THRESHOLD", defaults.response_time)?,
        restart_count: parse_var(env, "RESTART_COUNT_THRESHOLD", defaults.restart_count)?,
    };
    let warning_multiplier: f64 = parse_var(env, "WARNING_MULTIPLIER", 1.2)?;

    let api_check_enabled = bool_var(env, "API_CHECK_ENABLED", false);
    let endpoints = match env.get_var("API_ENDPOINTS").filter(|s| !s.trim().is_empty()) {
        Some(raw) => serde_json::from_str::<Vec<EndpointSpec>>(&raw)
            .context("Invalid API_ENDPOINTS (expected JSON list of {url, method, expected_status})")?,
        None => {
            let host = env.get_var("FLASK_HOST").unwrap_or_else(|| "0.0.0.0".to_string());
            let port: u16 = parse_var(env, "FLASK_PORT", 5001)?;
            vec![EndpointSpec::get(format!("http://{}:{}/health", host, port))]
        }
    };
    let api_timeout = Duration::from_secs(parse_var(env, "API_TIMEOUT", 5u64)?);
    let api_retry_attempts: u32 = parse_var(env, "API_RETRY_ATTEMPTS", 3)?;
    let api_retry_delay = Duration::from_millis(parse_var(env, "API_RETRY_DELAY_MS", 500u64)?);
    let runtime_timeout = Duration::from_secs(parse_var(env, "RUNTIME_TIMEOUT", 10u64)?);
    let runtime_retry_attempts: u32 = parse_var(env, "RUNTIME_RETRY_ATTEMPTS", 3)?;
    let runtime_retry_delay = Duration::from_millis(parse_var(env, "RUNTIME_RETRY_DELAY_MS", 500u64)?);

    // Malformed pattern lists fall back to the defaults rather than failing startup.
    let error_patterns = env
        .get_var("ERROR_PATTERNS")
        .and_then(|raw| parse_json_string_list(&raw))
        .unwrap_or_else(|| DEFAULT_ERROR_PATTERNS.iter().map(|s| s.to_string()).collect());
    let log_tail_lines: usize = parse_var(env, "LOG_TAIL_LINES", 1000)?;
    let max_log_matches: usize = parse_var(env, "MAX_LOG_MATCHES", 50)?;

    let check_interval = Duration::from_secs(parse_var(env, "CHECK_INTERVAL", 60u64)?);
    let run_once = bool_var(env, "RUN_ONCE", false);

    let output_dir = env.get_var("OUTPUT_DIR").unwrap_or_else(|| "./output".to_string());
    let save_output_files = bool_var(env, "SAVE_OUTPUT_FILES", false);

    let metrics_enabled = bool_var(env, "METRICS_ENABLED", true);
    let prometheus_port: u16 = parse_var(env, "PROMETHEUS_PORT", 8000)?;
    let max_port_attempts: u16 = parse_var(env, "MAX_PORT_ATTEMPTS", 10)?;

    let log_level = env.get_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());
    // An empty LOG_FILE turns file logging off.
    let log_file = match env.get_var("LOG_FILE") {
        Some(name) if name.trim().is_empty() => None,
        Some(name) => Some(name.trim().to_string()),
        None => Some("docker_healthcheck.log".to_string()),
    };

    Ok(Config {
        container_name,
        thresholds,
        warning_multiplier,
        api_check_enabled,
        endpoints,
        api_timeout,
        api_retry_attempts,
        api_retry_delay,
        runtime_timeout,
        runtime_retry_attempts,
        runtime_retry_delay,
        error_patterns,
        log_tail_lines,
        max_log_matches,
        check_interval,
        run_once,
        output_dir,
        save_output_files,
        metrics_enabled,
        prometheus_port,
        max_port_attempts,
        log_level,
        log_file,
    })
}

/// Pre-flight checks. Any failure here must stop the process before the first poll cycle.
pub fn validate_config(cfg: &Config) -> Result<(), HealthCheckError> {
    if cfg.container_name.is_empty() {
        return Err(HealthCheckError::config("CONTAINER_NAME must not be empty"));
    }

    for threshold in cfg.thresholds.iter() {
        if !threshold.limit.is_finite() || threshold.limit <= 0.0 {
            return Err(HealthCheckError::config(format!(
                "Invalid threshold value for {}: {}",
                threshold.name, threshold.limit
            )));
        }
    }

    if !cfg.warning_multiplier.is_finite() || cfg.warning_multiplier < 1.0 {
        return Err(HealthCheckError::config(format!(
            "WARNING_MULTIPLIER must be a finite number >= 1.0, got {}",
            cfg.warning_multiplier
        )));
    }

    if cfg.check_interval.as_secs() < 1 {
        return Err(HealthCheckError::config("Check interval must be positive"));
    }
    if cfg.api_retry_attempts < 1 {
        return Err(HealthCheckError::config("API_RETRY_ATTEMPTS must be at least 1"));
    }
    if cfg.runtime_retry_attempts < 1 {
        return Err(HealthCheckError::config("RUNTIME_RETRY_ATTEMPTS must be at least 1"));
    }
    if cfg.api_timeout.is_zero() || cfg.runtime_timeout.is_zero() {
        return Err(HealthCheckError::config("Timeouts must be positive"));
    }
    if cfg.log_tail_lines < 1 || cfg.max_log_matches < 1 {
        return Err(HealthCheckError::config("LOG_TAIL_LINES and MAX_LOG_MATCHES must be positive"));
    }

    if cfg.prometheus_port < 1024 {
        return Err(HealthCheckError::config("Invalid Prometheus port number"));
    }
    if cfg.max_port_attempts < 1 {
        return Err(HealthCheckError::config("Max port attempts must be positive"));
    }
    if cfg.prometheus_port as u32 + cfg.max_port_attempts as u32 > 65535 {
        return Err(HealthCheckError::config(
            "Port range exceeds maximum valid port number (65535)",
        ));
    }

    for endpoint in &cfg.endpoints {
        validate_endpoint(endpoint)?;
    }
    Ok(())
}

fn validate_endpoint(endpoint: &EndpointSpec) -> Result<(), HealthCheckError> {
    let url = reqwest::Url::parse(&endpoint.url).map_err(|e| {
        HealthCheckError::config(format!("Invalid endpoint URL {}: {}", endpoint.url, e))
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(HealthCheckError::config(format!(
            "Endpoint URL {} must use http or https",
            endpoint.url
        )));
    }
    if !ALLOWED_METHODS.contains(&endpoint.method.to_ascii_uppercase().as_str()) {
        return Err(HealthCheckError::config(format!(
            "Unsupported method {} for {}",
            endpoint.method, endpoint.url
        )));
    }
    if !(100..=599).contains(&endpoint.expected_status) {
        return Err(HealthCheckError::config(format!(
            "Invalid expected status {} for {}",
            endpoint.expected_status, endpoint.url
        )));
    }
    Ok(())
}
