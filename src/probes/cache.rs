use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::{DependencyProbe, ProbeResult};
use crate::config::RedisSettings;

/// Redis connectivity probe.
///
/// Holds one [`ConnectionManager`], established on first use and shared by
/// every probe call. If no connection can be established the probe reports
/// [`ProbeResult::Unavailable`] and retries on the next call. A connection
/// that drops is discarded so the next call dials again.
pub struct CacheProbe {
    client: Option<redis::Client>,
    connection: Mutex<Option<ConnectionManager>>,
    connect_timeout: Duration,
}

impl CacheProbe {
    /// Builds the client and attempts an initial connection and `PING`.
    pub async fn connect(settings: &RedisSettings, connect_timeout: Duration) -> Self {
        let client = match redis::Client::open(settings.cache_url()) {
            Ok(client) => client,
            Err(e) => {
                error!(exception = %e, "Invalid Redis configuration: {}", e);
                return Self::unavailable();
            }
        };

        let probe = Self {
            client: Some(client),
            connection: Mutex::new(None),
            connect_timeout,
        };

        info!(
            host = %settings.host,
            port = settings.port,
            db = settings.cache_db,
            "Initializing Redis app cache connection"
        );
        match probe.probe().await {
            ProbeResult::Ok => info!("Successfully connected to Redis and pinged"),
            other => warn!(outcome = other.outcome(), "Redis not reachable at startup"),
        }
        probe
    }

    pub fn unavailable() -> Self {
        Self {
            client: None,
            connection: Mutex::new(None),
            connect_timeout: Duration::ZERO,
        }
    }

    /// Drops the shared connection.
    pub async fn close(&self) {
        if self.connection.lock().await.take().is_some() {
            info!("Redis app cache connection closed");
        }
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        let client = self.client.as_ref()?;
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.as_ref() {
            return Some(connection.clone());
        }

        match tokio::time::timeout(
            self.connect_timeout,
            ConnectionManager::new(client.clone()),
        )
        .await
        {
            Ok(Ok(connection)) => {
                *slot = Some(connection.clone());
                Some(connection)
            }
            Ok(Err(e)) => {
                warn!(exception = %e, "Failed to connect to Redis: {}", e);
                None
            }
            Err(_) => {
                warn!("Timed out connecting to Redis");
                None
            }
        }
    }
}

#[async_trait]
impl DependencyProbe for CacheProbe {
    async fn probe(&self) -> ProbeResult {
        let Some(mut connection) = self.connection().await else {
            return ProbeResult::Unavailable;
        };

        match redis::cmd("PING")
            .query_async::<_, String>(&mut connection)
            .await
        {
            Ok(reply) if reply == "PONG" => ProbeResult::Ok,
            Ok(reply) => ProbeResult::error(format!("unexpected PING reply {reply:?}")),
            Err(e) => {
                if e.is_connection_dropped() || e.is_io_error() || e.is_timeout() {
                    self.connection.lock().await.take();
                    warn!(exception = %e, "Redis connection lost, reconnecting on next check");
                }
                ProbeResult::error(e.to_string())
            }
        }
    }
}
