//! Market API configuration module.
//!
//! Configuration is loaded from environment variables (and a `.env` file in
//! development) with fallback to defaults.

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use market_db::DbConfig;

/// Market API configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Bind host
    pub host: String,

    /// HTTP port
    pub port: u16,

    /// How long in-flight requests get to finish after a shutdown signal
    pub grace_close_delay: Duration,

    /// Per-request timeout applied by the HTTP layer
    pub request_timeout: Duration,

    /// Log filter used when `RUST_LOG` is not set
    pub log_level: String,

    /// Pricing API base URL
    pub skinport_api_url: String,

    /// Timeout for one pricing API call
    pub skinport_timeout: Duration,

    /// `max-age` sent with `GET /items`
    pub request_cache_ttl: Duration,

    /// Expiry of cached price lists
    pub skinport_cache_ttl: Duration,

    pub redis_host: String,
    pub redis_port: u16,
    pub redis_db: i64,

    /// PostgreSQL pool settings
    pub database: DbConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let config = AppConfig {
            host: string("HOST", "0.0.0.0"),
            port: parse(&lookup, "PORT", 3000)?,
            grace_close_delay: Duration::from_millis(parse(&lookup, "GRACE_CLOSE_DELAY", 500)?),
            request_timeout: Duration::from_secs(parse(&lookup, "REQUEST_TIMEOUT_SECS", 30)?),
            log_level: string("LOG_LEVEL", "info"),

            skinport_api_url: string("SKINPORT_API_URL", "https://api.skinport.com/v1"),
            skinport_timeout: Duration::from_millis(parse(&lookup, "PLUGIN_TIMEOUT", 10_000)?),
            request_cache_ttl: Duration::from_secs(parse(&lookup, "REQUEST_CACHE_TTL_SEC", 60)?),
            skinport_cache_ttl: Duration::from_millis(parse(
                &lookup,
                "SKINPORT_CACHE_TTL_MS",
                300_000,
            )?),

            redis_host: string("REDIS_HOST", "localhost"),
            redis_port: parse(&lookup, "REDIS_PORT", 6379)?,
            redis_db: parse(&lookup, "REDIS_DB", 0)?,

            database: DbConfig::new(
                string("PSQL_HOST", "localhost"),
                parse(&lookup, "PSQL_PORT", 5432)?,
                string("PSQL_USERNAME", "postgres"),
                string("PSQL_PASSWORD", ""),
                string("PSQL_DATABASE", "postgres"),
            )
            .max_connections(parse(&lookup, "PSQL_MAX_CONNECTIONS", 10)?)
            .run_migrations(parse(&lookup, "RUN_MIGRATIONS", false)?),
        };

        if config.skinport_api_url.trim().is_empty() {
            return Err(ConfigError::MissingRequired("SKINPORT_API_URL".to_string()));
        }

        Ok(config)
    }

    /// Address the HTTP server binds to.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::InvalidValue("HOST".to_string()))
    }

    /// `redis://host:port/db`
    pub fn redis_url(&self) -> String {
        format!(
            "redis://{}:{}/{}",
            self.redis_host, self.redis_port, self.redis_db
        )
    }
}

fn parse<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.port, 3000);
        assert_eq!(config.grace_close_delay, Duration::from_millis(500));
        assert_eq!(config.request_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.skinport_cache_ttl, Duration::from_millis(300_000));
        assert_eq!(config.skinport_api_url, "https://api.skinport.com/v1");
        assert_eq!(config.redis_url(), "redis://localhost:6379/0");
        assert_eq!(config.database.port, 5432);
        assert!(!config.database.run_migrations);
        assert_eq!(config.bind_addr().unwrap().port(), 3000);
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "8080"),
            ("REDIS_DB", "2"),
            ("PSQL_HOST", "db"),
            ("SKINPORT_CACHE_TTL_MS", "1000"),
            ("RUN_MIGRATIONS", "true"),
        ])
        .unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.redis_url(), "redis://localhost:6379/2");
        assert_eq!(config.database.host, "db");
        assert_eq!(config.skinport_cache_ttl, Duration::from_secs(1));
        assert!(config.database.run_migrations);
    }

    #[test]
    fn test_invalid_value_names_the_key() {
        let err = config_from(&[("PSQL_PORT", "postgres")]).unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for PSQL_PORT");
    }

    #[test]
    fn test_empty_pricing_url_rejected() {
        assert!(matches!(
            config_from(&[("SKINPORT_API_URL", " ")]),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
