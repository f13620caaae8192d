use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cors: CorsSettings,
    pub health: HealthSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub name: String,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Prefix the health routes are nested under. Empty or `/` mounts them at the root.
    pub api_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Postgres URL. When unset the database probe reports `not available`.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub cache_db: u32,
}

impl RedisSettings {
    /// Builds the connection URL for the application cache database.
    pub fn cache_url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.cache_db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.cache_db),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsSettings {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    pub probe_timeout_ms: u64,
    /// Whether `/health` includes the raw dependency error text.
    pub expose_error_details: bool,
}

impl HealthSettings {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = Self::defaults()?
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cors.allowed_origins"),
            );

        builder.build()?.try_deserialize()
    }

    /// Settings built from the defaults alone, without files or environment.
    pub fn from_defaults() -> Result<Self, config::ConfigError> {
        Self::defaults()?.build()?.try_deserialize()
    }

    fn defaults(
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("application.name", "probe-service")?
            .set_default("application.environment", "development")?
            .set_default("application.host", "0.0.0.0")?
            .set_default("application.port", 8000)?
            .set_default("application.log_level", "info")?
            .set_default("application.api_prefix", "/api/v1")?
            .set_default("database.max_connections", 5)?
            .set_default("database.acquire_timeout_secs", 5)?
            .set_default("redis.host", "localhost")?
            .set_default("redis.port", 6379)?
            .set_default("redis.cache_db", 1)?
            .set_default("cors.allowed_origins", Vec::<String>::new())?
            .set_default("health.probe_timeout_ms", 2000)?
            .set_default("health.expose_error_details", true)
    }
}
