pub mod cache;
pub mod database;

pub use cache::CacheProbe;
pub use database::DatabaseProbe;

use async_trait::async_trait;

/// Outcome of checking one dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Ok,
    Error { detail: String },
    /// The client was never constructed, so no check was attempted.
    Unavailable,
}

impl ProbeResult {
    pub fn error(detail: impl Into<String>) -> Self {
        ProbeResult::Error {
            detail: detail.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ProbeResult::Ok)
    }

    /// Short label used for metrics and logs.
    pub fn outcome(&self) -> &'static str {
        match self {
            ProbeResult::Ok => "ok",
            ProbeResult::Error { .. } => "error",
            ProbeResult::Unavailable => "unavailable",
        }
    }
}

/// A cheap connectivity check against one external dependency.
///
/// Implementations must not panic and must not return early with an error:
/// every failure is reported as [`ProbeResult::Error`]. The key a probe is
/// reported under is chosen when it is registered with the health checker.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DependencyProbe: Send + Sync {
    async fn probe(&self) -> ProbeResult;
}
