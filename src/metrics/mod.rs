// Health check analyzers, one per check dimension
pub mod container;
pub mod resources;
pub mod endpoints;
pub mod logs;
pub mod base;

// Re-export commonly used items
pub use container::{analyze_container_state, ContainerStateResults};
pub use resources::{analyze_resources, evaluate_resources, resource_samples};
pub use endpoints::{analyze_endpoints, build_http_client, probe_endpoint, EndpointProbe};
pub use logs::analyze_logs;
pub use base::{with_retry, with_timeout, RuntimeCallPolicy};
