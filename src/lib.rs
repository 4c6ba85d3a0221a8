// Public modules
pub mod types;
pub mod errors;
pub mod config;
pub mod parsing;
pub mod evaluator;
pub mod runtime;
pub mod metrics;
pub mod collector;
pub mod report;
pub mod sink;
pub mod exporter;
pub mod logging;
pub mod poller;

// Re-export commonly used items
pub use types::*;
pub use errors::{CheckOutcome, HealthCheckError};
pub use config::{load_config, load_config_with_env, validate_config, EnvironmentProvider, SystemEnvironment, MockEnvironment};
pub use parsing::{compute_cpu_percent, compute_memory_percent, compute_disk_percent, scan_for_patterns, PatternScan};
pub use evaluator::{evaluate, ThresholdEvaluator, DEFAULT_WARNING_MULTIPLIER};
pub use runtime::{ContainerRuntime, DockerRuntime, MockRuntime};
pub use metrics::*;
pub use collector::{Check, HealthCollector};
pub use report::{aggregate, HealthReport, ReportSummary};
pub use sink::{emit_report, write_report_file};
pub use exporter::ReportMetrics;
pub use poller::{run, run_cycle};
