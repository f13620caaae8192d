use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info, warn};

use super::{DependencyProbe, ProbeResult};
use crate::config::DatabaseSettings;

/// Postgres connectivity probe. Owns the application's connection pool.
#[derive(Debug, Clone)]
pub struct DatabaseProbe {
    pool: Option<PgPool>,
}

impl DatabaseProbe {
    /// Builds a lazily-connecting pool from settings.
    ///
    /// A missing or unparsable URL leaves the probe without a pool, and it
    /// then reports [`ProbeResult::Unavailable`].
    pub fn connect(settings: &DatabaseSettings) -> Self {
        let Some(url) = settings.url.as_deref() else {
            warn!("Database URL not configured; database probe is unavailable");
            return Self::unavailable();
        };

        match PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout())
            .connect_lazy(url)
        {
            Ok(pool) => {
                info!(max_connections = settings.max_connections, "Database pool created");
                Self::from_pool(pool)
            }
            Err(e) => {
                error!(exception = %e, "Failed to create database pool: {}", e);
                Self::unavailable()
            }
        }
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool: Some(pool) }
    }

    pub fn unavailable() -> Self {
        Self { pool: None }
    }

    pub fn pool(&self) -> Option<&PgPool> {
        self.pool.as_ref()
    }

    /// Closes the pool, waiting for checked-out connections to be returned.
    pub async fn close(&self) {
        if let Some(pool) = &self.pool {
            pool.close().await;
            info!("Database pool closed");
        }
    }
}

#[async_trait]
impl DependencyProbe for DatabaseProbe {
    async fn probe(&self) -> ProbeResult {
        let Some(pool) = &self.pool else {
            return ProbeResult::Unavailable;
        };

        match sqlx::query_scalar::<_, i32>("SELECT 1").fetch_one(pool).await {
            Ok(1) => ProbeResult::Ok,
            Ok(other) => ProbeResult::error(format!("unexpected probe result {other}")),
            Err(e) => ProbeResult::error(e.to_string()),
        }
    }
}
