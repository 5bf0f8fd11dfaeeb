//! Configuration for the orchestrator.
//!
//! A single TOML file, loaded directly with the `toml` crate (no generic
//! config-merging framework), environment overrides layered on top, and a
//! `validate()` pass before the orchestrator starts.

use std::collections::HashMap;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infrastructure::logging::config::LogConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),
    #[error("Failed to read configuration: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub queue: QueueConfig,
    pub rate_limiting: RateLimitingConfig,
    pub injection: InjectionConfig,
    pub jaeger: JaegerConfig,
    pub redis: RedisConfig,
    pub initialization: InitializationConfig,
    pub logging: LogConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            rate_limiting: RateLimitingConfig::default(),
            injection: InjectionConfig::default(),
            jaeger: JaegerConfig::default(),
            redis: RedisConfig::default(),
            initialization: InitializationConfig::default(),
            logging: LogConfig::default(),
            database: DatabaseConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub ready_key: String,
    pub delayed_key: String,
    pub workers: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            ready_key: "queue:ready".to_string(),
            delayed_key: "queue:delayed".to_string(),
            workers: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitingConfig {
    pub max_concurrent_restarts: u32,
    pub max_concurrent_builds: u32,
    pub max_concurrent_algo_execution: u32,
    pub token_wait_timeout_secs: u64,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            max_concurrent_restarts: 5,
            max_concurrent_builds: 2,
            max_concurrent_algo_execution: 4,
            token_wait_timeout_secs: 600,
        }
    }
}

/// Pool configuration for one namespace prefix (e.g. `ts` -> `ts0..ts9`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespacePrefixConfig {
    /// Size of the index range for this prefix.
    pub count: u32,
    /// Regex with exactly two capture groups: prefix, index.
    pub extract_pattern: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectionConfig {
    pub namespace_config: HashMap<String, NamespacePrefixConfig>,
    pub benchmark: Vec<String>,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        let mut namespace_config = HashMap::new();
        namespace_config.insert(
            "ts".to_string(),
            NamespacePrefixConfig {
                count: 10,
                extract_pattern: r"^(ts)(\d+)$".to_string(),
            },
        );
        Self {
            namespace_config,
            benchmark: vec!["sock-shop".to_string(), "train-ticket".to_string()],
        }
    }
}

/// Tracer export configuration. No exporter is wired up by this crate; the
/// surface is parsed and validated anyway, and its absence is logged rather
/// than silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JaegerConfig {
    pub endpoint: Option<String>,
    pub service_name: String,
    pub service_version: String,
}

impl Default for JaegerConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            service_name: "task-orchestration-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Retained for compatibility with the distilled spec's vocabulary; this
/// implementation backs the queue, bucket and lock state with SQLite
/// (see `DatabaseConfig`), not Redis. Parsed and validated, logged once at
/// startup, unused by the storage layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "unused".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitializationConfig {
    pub data_path: String,
}

impl Default for InitializationConfig {
    fn default() -> Self {
        Self {
            data_path: ".orchestrator/seed".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: ".orchestrator/orchestrator.db".to_string(),
            max_connections: 5,
            connect_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn load() -> Result<Self, ConfigError> {
        let path = Path::new("orchestrator.toml");
        if path.exists() {
            Self::from_file(path)
        } else {
            let mut config = Config::default();
            config.apply_env_overrides();
            config.validate()?;
            Ok(config)
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ORCHESTRATOR_DATABASE_PATH") {
            self.database.path = val;
        }
        if let Ok(val) = std::env::var("ORCHESTRATOR_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("ORCHESTRATOR_HTTP_PORT") {
            if let Ok(v) = val.parse() {
                self.http.port = v;
            }
        }
        if let Ok(val) = std::env::var("ORCHESTRATOR_QUEUE_WORKERS") {
            if let Ok(v) = val.parse() {
                self.queue.workers = v;
            }
        }
        if let Ok(val) = std::env::var("ORCHESTRATOR_REDIS_HOST") {
            self.redis.host = val;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.queue.workers == 0 {
            return Err(ConfigError::ValidationError {
                field: "queue.workers".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        if self.rate_limiting.max_concurrent_restarts == 0 {
            return Err(ConfigError::ValidationError {
                field: "rate_limiting.max_concurrent_restarts".to_string(),
                reason: "must be greater than 0 (use namespace pool size to throttle, not zero capacity)".to_string(),
            });
        }

        for (prefix, ns_config) in &self.injection.namespace_config {
            let re = Regex::new(&ns_config.extract_pattern).map_err(|e| {
                ConfigError::ValidationError {
                    field: format!("injection.namespace_config.{prefix}.extract_pattern"),
                    reason: format!("does not compile: {e}"),
                }
            })?;
            if re.captures_len() != 3 {
                return Err(ConfigError::ValidationError {
                    field: format!("injection.namespace_config.{prefix}.extract_pattern"),
                    reason: format!(
                        "must have exactly two capture groups (prefix, index), found {}",
                        re.captures_len().saturating_sub(1)
                    ),
                });
            }
            if ns_config.count == 0 {
                return Err(ConfigError::ValidationError {
                    field: format!("injection.namespace_config.{prefix}.count"),
                    reason: "must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Look up the pool size and compiled extraction regex for a namespace
    /// prefix declared in configuration.
    pub fn namespace_pool(&self, prefix: &str) -> Option<(u32, Regex)> {
        let ns = self.injection.namespace_config.get(prefix)?;
        Regex::new(&ns.extract_pattern)
            .ok()
            .map(|re| (ns.count, re))
    }

    pub fn sample_toml() -> String {
        toml::to_string_pretty(&Config::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = Config::default();
        config.validate().expect("default config must be valid");
    }

    #[test]
    fn rejects_zero_workers() {
        let mut config = Config::default();
        config.queue.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_pattern_without_two_capture_groups() {
        let mut config = Config::default();
        config.injection.namespace_config.insert(
            "bad".to_string(),
            NamespacePrefixConfig {
                count: 3,
                extract_pattern: r"^bad\d+$".to_string(),
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_pattern_that_does_not_compile() {
        let mut config = Config::default();
        config.injection.namespace_config.insert(
            "broken".to_string(),
            NamespacePrefixConfig {
                count: 3,
                extract_pattern: r"^(broken\d+$".to_string(),
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn round_trips_through_toml() {
        let config = Config::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("parse");
        assert_eq!(config, parsed);
    }
}
