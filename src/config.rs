use crate::search::{RetryPolicy, SearchConfig, SearchError, SearchResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable naming an extra configuration file
pub const CONFIG_PATH_ENV: &str = "CATALOG_SEARCH_CONFIG";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Search backend connection
    #[serde(default)]
    pub backend: BackendConfig,

    /// Result cache
    #[serde(default)]
    pub cache: CacheConfig,

    /// Catalog store used for facet enrichment
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Search analytics
    #[serde(default)]
    pub analytics: AnalyticsConfig,

    /// Query building, faceting and scoring
    #[serde(default)]
    pub search: SearchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from the embedded defaults, an optional file and
    /// the environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| "config/catalog-search".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: CATALOG_SEARCH__)
            .add_source(
                config::Environment::with_prefix("CATALOG_SEARCH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Reject impossible values before anything connects
    pub fn validate(&self) -> SearchResult<()> {
        self.search.validate()?;
        self.backend.retry_policy().validate()?;
        if self.backend.health_check_interval_secs == 0 {
            return Err(SearchError::InvalidConfiguration(
                "backend.health_check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.cache.enabled && self.cache.backend == CacheBackend::Redis && self.cache.redis_url.is_none() {
            return Err(SearchError::InvalidConfiguration(
                "cache.redis_url is required for the redis cache backend".to_string(),
            ));
        }
        if self.catalog.backend == CatalogBackend::Http && self.catalog.base_url.is_none() {
            return Err(SearchError::InvalidConfiguration(
                "catalog.base_url is required for the http catalog backend".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the search cluster
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Environment variable holding the basic-auth user
    pub username_env: Option<String>,

    /// Environment variable holding the basic-auth password
    pub password_env: Option<String>,

    /// Per HTTP call timeout
    #[serde(default = "default_backend_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Cluster health poll interval
    #[serde(default = "default_health_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            username_env: None,
            password_env: None,
            request_timeout_ms: default_backend_timeout_ms(),
            health_check_interval_secs: default_health_interval(),
            retry: RetryConfig::default(),
        }
    }
}

impl BackendConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_millis(self.retry.initial_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    /// Resolve basic-auth credentials from the configured variables
    pub fn credentials(&self) -> (Option<String>, Option<String>) {
        let read = |name: &Option<String>| name.as_ref().and_then(|var| std::env::var(var).ok());
        (read(&self.username_env), read(&self.password_env))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            multiplier: default_multiplier(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: CacheBackend,

    /// Redis connection string
    pub redis_url: Option<String>,

    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,

    /// Entry bound for the in-memory cache
    #[serde(default = "default_cache_capacity")]
    pub max_capacity: u64,

    #[serde(default = "default_cache_prefix")]
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::default(),
            redis_url: None,
            ttl_secs: default_cache_ttl(),
            max_capacity: default_cache_capacity(),
            key_prefix: default_cache_prefix(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CatalogBackend {
    #[default]
    Memory,
    Http,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub backend: CatalogBackend,

    /// Catalog service base URL
    pub base_url: Option<String>,

    #[serde(default = "default_catalog_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            backend: CatalogBackend::default(),
            base_url: None,
            timeout_ms: default_catalog_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Events buffered before new ones are dropped
    #[serde(default = "default_analytics_queue")]
    pub queue_size: usize,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_size: default_analytics_queue(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Enable Prometheus metrics
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            prometheus_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_backend_url() -> String {
    "http://localhost:9200".to_string()
}

fn default_backend_timeout_ms() -> u64 {
    2_000
}

fn default_health_interval() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_cache_ttl() -> u64 {
    300
}

fn default_cache_capacity() -> u64 {
    10_000
}

fn default_cache_prefix() -> String {
    "catalog-search".to_string()
}

fn default_catalog_timeout_ms() -> u64 {
    500
}

fn default_analytics_queue() -> usize {
    1_024
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        assert_eq!(default_http_port(), 8080);
        assert_eq!(default_log_level(), "info");
        assert!(default_true());
        assert_eq!(CacheBackend::default(), CacheBackend::Memory);
    }

    #[test]
    fn test_embedded_defaults_parse_and_validate() {
        let config: Config = config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        config.validate().unwrap();
        assert_eq!(config.search.products_index, "products");
        assert_eq!(config.backend.retry.max_attempts, 3);
        assert_eq!(config.search.price_ranges.len(), 6);
    }

    #[test]
    fn test_retry_policy_conversion() {
        let backend = BackendConfig::default();
        let policy = backend.retry_policy();
        assert_eq!(policy.initial_delay, Duration::from_millis(100));
        assert_eq!(policy.max_delay, Duration::from_millis(2_000));
    }

    #[test]
    fn test_validation_rejects_impossible_values() {
        let mut config = Config::default();
        config.backend.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.cache.backend = CacheBackend::Redis;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.catalog.backend = CatalogBackend::Http;
        assert!(config.validate().is_err());
    }
}
