use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

use crate::error::{AppError, Result};

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Global metrics instance.
pub static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Metrics collector for dependency probes and health reports.
///
/// Recording is a no-op until a recorder is installed with [`init_metrics`].
#[derive(Debug, Clone, Default)]
pub struct Metrics;

impl Metrics {
    pub fn new() -> Self {
        Self
    }

    pub fn record_probe(&self, dependency: &str, outcome: &'static str, duration_ms: f64) {
        counter!("probe_checks_total", "dependency" => dependency.to_string(), "outcome" => outcome).increment(1);
        histogram!("probe_duration_ms", "dependency" => dependency.to_string()).record(duration_ms);
    }

    pub fn record_health_report(&self, kind: &'static str, verdict: &'static str) {
        counter!("health_reports_total", "kind" => kind, "verdict" => verdict).increment(1);
    }
}

/// Timer for measuring operation latency.
pub struct LatencyTimer {
    start: Instant,
}

impl LatencyTimer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for LatencyTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Installs the Prometheus recorder and returns its handle.
///
/// Safe to call more than once; later calls return the first handle.
pub fn init_metrics() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| AppError::Config(format!("failed to install Prometheus recorder: {e}")))?;
    describe_metrics();

    METRICS.get_or_init(Metrics::new);
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

fn describe_metrics() {
    describe_counter!("probe_checks_total", Unit::Count, "Dependency probe executions by outcome");
    describe_histogram!("probe_duration_ms", Unit::Milliseconds, "Dependency probe latency in milliseconds");
    describe_counter!("health_reports_total", Unit::Count, "Health reports produced by kind and verdict");
}

/// Returns the global metrics instance.
pub fn get_metrics() -> &'static Metrics {
    METRICS.get_or_init(Metrics::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_timer() {
        let timer = LatencyTimer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10.0);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = Metrics::new();
        metrics.record_probe("database", "ok", 1.5);
        metrics.record_health_report("readiness", "ready");
    }
}
