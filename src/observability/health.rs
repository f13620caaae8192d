use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use futures::future::join_all;
use serde::ser::{Serialize, SerializeMap, Serializer};
use tracing::{debug, warn};

use super::metrics::{get_metrics, LatencyTimer};
use crate::error::AppError;
use crate::probes::{DependencyProbe, ProbeResult};

/// Report key holding the overall verdict.
const RESERVED_KEY: &str = "status";

/// Overall verdict of the diagnostic report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Ok,
    Degraded,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Ok => "ok",
            HealthStatus::Degraded => "degraded",
        }
    }
}

/// Result of probing one registered dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyCheck {
    pub name: String,
    pub result: ProbeResult,
}

/// Informational report served by `/health`. Never gates traffic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub status: HealthStatus,
    pub dependencies: Vec<DependencyCheck>,
    expose_error_details: bool,
}

impl DiagnosticReport {
    pub fn new(dependencies: Vec<DependencyCheck>, expose_error_details: bool) -> Self {
        let status = if dependencies.iter().all(|d| d.result.is_ok()) {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        Self {
            status,
            dependencies,
            expose_error_details,
        }
    }

    fn describe(&self, result: &ProbeResult) -> String {
        match result {
            ProbeResult::Ok => "ok".to_string(),
            ProbeResult::Error { detail } if self.expose_error_details && !detail.is_empty() => {
                format!("error: {detail}")
            }
            ProbeResult::Error { .. } => "error".to_string(),
            ProbeResult::Unavailable => "not available".to_string(),
        }
    }
}

impl Serialize for DiagnosticReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dependencies.len() + 1))?;
        map.serialize_entry(RESERVED_KEY, self.status.as_str())?;
        for dependency in &self.dependencies {
            map.serialize_entry(&dependency.name, &self.describe(&dependency.result))?;
        }
        map.end()
    }
}

/// Traffic-gating report served by `/healthz/ready`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessReport {
    pub ready: bool,
    /// Dependency name and whether its probe returned `Ok`.
    pub dependencies: Vec<(String, bool)>,
}

impl ReadinessReport {
    pub fn new(checks: Vec<DependencyCheck>) -> Self {
        let dependencies: Vec<(String, bool)> = checks
            .into_iter()
            .map(|check| (check.name, check.result.is_ok()))
            .collect();
        let ready = dependencies.iter().all(|(_, up)| *up);
        Self {
            ready,
            dependencies,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        if self.ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl Serialize for ReadinessReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dependencies.len() + 1))?;
        map.serialize_entry(RESERVED_KEY, if self.ready { "ready" } else { "not ready" })?;
        for (name, up) in &self.dependencies {
            map.serialize_entry(name, if *up { "up" } else { "down" })?;
        }
        map.end()
    }
}

struct RegisteredProbe {
    name: String,
    probe: Arc<dyn DependencyProbe>,
}

/// Runs the registered dependency probes and aggregates their outcomes.
pub struct HealthChecker {
    probes: Vec<RegisteredProbe>,
    probe_timeout: Duration,
    expose_error_details: bool,
}

impl HealthChecker {
    pub fn new(probe_timeout: Duration) -> Self {
        Self {
            probes: Vec::new(),
            probe_timeout,
            expose_error_details: true,
        }
    }

    /// Registers `probe` under `name`, replacing any probe with the same name.
    ///
    /// `status` is reserved for the overall verdict and empty names are
    /// rejected.
    pub fn with_probe(
        mut self,
        name: impl Into<String>,
        probe: Arc<dyn DependencyProbe>,
    ) -> crate::error::Result<Self> {
        let name = name.into();
        if name.trim().is_empty() || name == RESERVED_KEY {
            return Err(AppError::Config(format!(
                "invalid dependency name {name:?}: must be non-empty and not {RESERVED_KEY:?}"
            )));
        }
        self.probes.retain(|registered| registered.name != name);
        self.probes.push(RegisteredProbe { name, probe });
        Ok(self)
    }

    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_error_details = expose;
        self
    }

    pub fn dependency_names(&self) -> Vec<&str> {
        self.probes.iter().map(|p| p.name.as_str()).collect()
    }

    /// Runs every probe concurrently on the calling task.
    ///
    /// Probes are polled together rather than spawned, so the caller's
    /// request id stays bound while they run.
    pub async fn run_probes(&self) -> Vec<DependencyCheck> {
        join_all(self.probes.iter().map(|registered| self.run_probe(registered))).await
    }

    async fn run_probe(&self, registered: &RegisteredProbe) -> DependencyCheck {
        let timer = LatencyTimer::new();
        let result = tokio::time::timeout(self.probe_timeout, registered.probe.probe())
            .await
            .unwrap_or_else(|_| ProbeResult::error("timeout"));
        let elapsed_ms = timer.elapsed_ms();

        get_metrics().record_probe(&registered.name, result.outcome(), elapsed_ms);
        match &result {
            ProbeResult::Ok => debug!(dependency = %registered.name, elapsed_ms, "Dependency probe succeeded"),
            ProbeResult::Error { detail } => warn!(
                dependency = %registered.name,
                detail = %detail,
                elapsed_ms,
                "Dependency probe failed"
            ),
            ProbeResult::Unavailable => warn!(dependency = %registered.name, "Dependency not available"),
        }

        DependencyCheck {
            name: registered.name.clone(),
            result,
        }
    }

    /// Diagnostic check: `ok` only when every probe is `Ok`.
    pub async fn check_diagnostic(&self) -> DiagnosticReport {
        let report = DiagnosticReport::new(self.run_probes().await, self.expose_error_details);
        get_metrics().record_health_report("diagnostic", report.status.as_str());
        report
    }

    /// Readiness check: ready only when every probe is `Ok`.
    pub async fn check_readiness(&self) -> ReadinessReport {
        let report = ReadinessReport::new(self.run_probes().await);
        get_metrics().record_health_report(
            "readiness",
            if report.ready { "ready" } else { "not_ready" },
        );
        if !report.ready {
            warn!("Readiness check failed");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probes::MockDependencyProbe;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Instant;

    fn mock(result: ProbeResult) -> Arc<dyn DependencyProbe> {
        let mut probe = MockDependencyProbe::new();
        probe.expect_probe().times(1).return_const(result);
        Arc::new(probe)
    }

    fn checker(database: ProbeResult, redis: ProbeResult) -> HealthChecker {
        HealthChecker::new(Duration::from_secs(1))
            .with_probe("database", mock(database))
            .unwrap()
            .with_probe("redis", mock(redis))
            .unwrap()
    }

    struct SlowProbe(Duration);

    #[async_trait]
    impl DependencyProbe for SlowProbe {
        async fn probe(&self) -> ProbeResult {
            tokio::time::sleep(self.0).await;
            ProbeResult::Ok
        }
    }

    #[tokio::test]
    async fn test_all_ok_diagnostic() {
        let report = checker(ProbeResult::Ok, ProbeResult::Ok).check_diagnostic().await;
        assert_eq!(report.status, HealthStatus::Ok);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"status": "ok", "database": "ok", "redis": "ok"})
        );
    }

    #[tokio::test]
    async fn test_error_and_unavailable_degrade_diagnostic() {
        let report = checker(ProbeResult::error("connection refused"), ProbeResult::Unavailable)
            .check_diagnostic()
            .await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "status": "degraded",
                "database": "error: connection refused",
                "redis": "not available"
            })
        );
    }

    #[tokio::test]
    async fn test_hidden_error_details() {
        let report = checker(ProbeResult::error("password authentication failed"), ProbeResult::Ok)
            .with_error_details(false)
            .check_diagnostic()
            .await;
        assert_eq!(serde_json::to_value(&report).unwrap()["database"], "error");
    }

    #[tokio::test]
    async fn test_readiness_all_ok() {
        let report = checker(ProbeResult::Ok, ProbeResult::Ok).check_readiness().await;
        assert!(report.ready);
        assert_eq!(report.status_code(), StatusCode::OK);
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({"status": "ready", "database": "up", "redis": "up"})
        );
    }

    #[tokio::test]
    async fn test_readiness_any_failure_is_not_ready() {
        for (database, redis) in [
            (ProbeResult::error("boom"), ProbeResult::Ok),
            (ProbeResult::Ok, ProbeResult::Unavailable),
        ] {
            let report = checker(database.clone(), redis.clone()).check_readiness().await;
            assert!(!report.ready);
            assert_eq!(report.status_code(), StatusCode::SERVICE_UNAVAILABLE);
            let body = serde_json::to_value(&report).unwrap();
            assert_eq!(body["status"], "not ready");
            assert_eq!(body["database"], if database.is_ok() { "up" } else { "down" });
            assert_eq!(body["redis"], if redis.is_ok() { "up" } else { "down" });
        }
    }

    #[tokio::test]
    async fn test_no_probes_is_healthy() {
        let checker = HealthChecker::new(Duration::from_secs(1));
        assert_eq!(checker.check_diagnostic().await.status, HealthStatus::Ok);
        assert!(checker.check_readiness().await.ready);
    }

    #[tokio::test]
    async fn test_timeout_becomes_error() {
        let checker = HealthChecker::new(Duration::from_millis(50))
            .with_probe("database", Arc::new(SlowProbe(Duration::from_secs(5))))
            .unwrap()
            .with_probe("redis", mock(ProbeResult::Ok))
            .unwrap();
        let checks = checker.run_probes().await;
        assert_eq!(checks[0].result, ProbeResult::error("timeout"));
        assert_eq!(checks[1].result, ProbeResult::Ok);
    }

    #[tokio::test]
    async fn test_probes_run_concurrently() {
        let checker = HealthChecker::new(Duration::from_secs(5))
            .with_probe("a", Arc::new(SlowProbe(Duration::from_millis(300))))
            .unwrap()
            .with_probe("b", Arc::new(SlowProbe(Duration::from_millis(300))))
            .unwrap()
            .with_probe("c", Arc::new(SlowProbe(Duration::from_millis(300))))
            .unwrap();
        let started = Instant::now();
        let checks = checker.run_probes().await;
        assert!(checks.iter().all(|c| c.result.is_ok()));
        assert!(started.elapsed() < Duration::from_millis(800));
    }

    #[test]
    fn test_registering_same_name_replaces_probe() {
        let checker = HealthChecker::new(Duration::from_secs(1))
            .with_probe("database", Arc::new(SlowProbe(Duration::ZERO)))
            .unwrap()
            .with_probe("redis", Arc::new(SlowProbe(Duration::ZERO)))
            .unwrap()
            .with_probe("database", Arc::new(SlowProbe(Duration::ZERO)))
            .unwrap();
        assert_eq!(checker.dependency_names(), vec!["redis", "database"]);
    }

    #[test]
    fn test_reserved_and_empty_names_are_rejected() {
        let result = HealthChecker::new(Duration::from_secs(1))
            .with_probe("status", Arc::new(SlowProbe(Duration::ZERO)));
        assert!(matches!(result, Err(AppError::Config(_))));

        let result = HealthChecker::new(Duration::from_secs(1))
            .with_probe("  ", Arc::new(SlowProbe(Duration::ZERO)));
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
