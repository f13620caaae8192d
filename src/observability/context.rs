//! Request-scoped correlation identifier.
//!
//! The identifier lives in tokio task-local storage so it is visible to all
//! code polled as part of the request future, survives `.await` points and
//! worker-thread migration, and disappears when the request future completes.
//!
//! Task locals are not inherited by `tokio::spawn` or `spawn_blocking`. Use
//! [`spawn`] and [`spawn_blocking`] from this module to carry the current
//! identifier into work started on behalf of a request.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio::task_local;
use uuid::Uuid;

task_local! {
    static REQUEST_ID: RequestId;
}

/// Correlation identifier for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Generates a random UUID v4 identifier.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    /// Returns the identifier bound to the current task, if any.
    pub fn current() -> Option<Self> {
        REQUEST_ID.try_with(Clone::clone).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Runs `fut` with this identifier bound for its whole lifetime.
    pub async fn scope<F>(self, fut: F) -> F::Output
    where
        F: Future,
    {
        REQUEST_ID.scope(self, fut).await
    }

    /// Runs the synchronous closure `f` with this identifier bound.
    pub fn sync_scope<F, R>(self, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        REQUEST_ID.sync_scope(self, f)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// The current correlation identifier as an owned string.
pub fn current_request_id() -> Option<String> {
    REQUEST_ID.try_with(|id| id.as_str().to_string()).ok()
}

/// Spawns `fut` on the runtime, carrying over the caller's request id.
pub fn spawn<F>(fut: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match RequestId::current() {
        Some(id) => tokio::spawn(id.scope(fut)),
        None => tokio::spawn(fut),
    }
}

/// Runs `f` on the blocking pool, carrying over the caller's request id.
pub fn spawn_blocking<F, R>(f: F) -> JoinHandle<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    match RequestId::current() {
        Some(id) => tokio::task::spawn_blocking(move || id.sync_scope(f)),
        None => tokio::task::spawn_blocking(f),
    }
}
