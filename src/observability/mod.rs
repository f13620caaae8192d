pub mod context;
pub mod health;
pub mod logging;
pub mod metrics;

pub use context::{current_request_id, RequestId};
pub use health::{DependencyCheck, DiagnosticReport, HealthChecker, HealthStatus, ReadinessReport};
pub use logging::{build_subscriber, init_logging, JsonLogFormatter, LogConfig, NOISY_TARGETS};
pub use metrics::{get_metrics, init_metrics, LatencyTimer, Metrics, METRICS};
