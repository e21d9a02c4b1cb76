//! Configuration file parsing for `quarry.toml`.
//!
//! ```rust
//! use quarry_query::config::QuarryConfig;
//! use quarry_query::Dialect;
//!
//! let config: QuarryConfig = r#"
//!     [database]
//!     dialect = "postgres"
//!     url = "postgres://localhost/app"
//!
//!     [retry]
//!     max_retries = 5
//!
//!     [environments.test.database]
//!     url = "postgres://localhost/app_test"
//! "#
//! .parse()
//! .unwrap();
//!
//! assert_eq!(config.database.dialect, Dialect::Postgres);
//! let config = config.with_environment("test");
//! assert_eq!(config.database_url(), Some("postgres://localhost/app_test"));
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, QueryError, QueryResult};
use crate::retry::RetryConfig;
use crate::sql::Dialect;

/// Main configuration structure for `quarry.toml`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuarryConfig {
    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Read retry policy.
    #[serde(default)]
    pub retry: RetrySection,

    /// Debug/logging settings.
    #[serde(default)]
    pub debug: DebugConfig,

    /// Environment-specific overrides.
    #[serde(default)]
    pub environments: HashMap<String, EnvironmentOverride>,
}

impl QuarryConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> QueryResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            QueryError::new(
                ErrorCode::MissingConfiguration,
                format!("Cannot read config file '{}'", path.display()),
            )
            .with_source(e)
        })?;

        content.parse()
    }

    /// Get the database URL.
    pub fn database_url(&self) -> Option<&str> {
        self.database.url.as_deref()
    }

    /// Apply environment-specific overrides.
    pub fn with_environment(mut self, env: &str) -> Self {
        if let Some(overrides) = self.environments.remove(env) {
            if let Some(db) = overrides.database {
                if let Some(url) = db.url {
                    self.database.url = Some(url);
                }
                if let Some(dialect) = db.dialect {
                    self.database.dialect = dialect;
                }
            }
            if let Some(retry) = overrides.retry {
                self.retry = retry;
            }
            if let Some(debug) = overrides.debug {
                if let Some(log_queries) = debug.log_queries {
                    self.debug.log_queries = log_queries;
                }
                if let Some(threshold) = debug.slow_query_threshold_ms {
                    self.debug.slow_query_threshold_ms = threshold;
                }
            }
        }
        self
    }

    /// The retry policy as a runtime config.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.retry.max_retries)
            .initial_delay(Duration::from_millis(self.retry.initial_delay_ms))
            .max_delay(Duration::from_millis(self.retry.max_delay_ms))
            .backoff_multiplier(self.retry.backoff_multiplier)
            .jitter(self.retry.jitter)
    }
}

impl FromStr for QuarryConfig {
    type Err = QueryError;

    /// Parse TOML, expanding `${ENV_VAR}` references first.
    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let expanded = expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| {
            QueryError::configuration(format!("Invalid quarry.toml: {}", e.message())).with_source(e)
        })
    }
}

/// Database configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQL dialect of the target database.
    #[serde(default)]
    pub dialect: Dialect,

    /// Connection URL (supports `${ENV_VAR}` interpolation).
    pub url: Option<String>,
}

/// Retry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetrySection {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// First backoff delay.
    pub initial_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    /// Exponential factor.
    pub backoff_multiplier: f64,
    /// Add up to 25% random jitter.
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Debug configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct DebugConfig {
    /// Log every compiled statement at `debug` level.
    pub log_queries: bool,
    /// Statements slower than this are logged at `warn` level.
    pub slow_query_threshold_ms: u64,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_queries: false,
            slow_query_threshold_ms: 1000,
        }
    }
}

impl DebugConfig {
    /// Slow-query threshold as a duration.
    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }
}

/// Environment-specific configuration overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentOverride {
    /// Database overrides.
    pub database: Option<DatabaseOverride>,
    /// Replacement retry policy.
    pub retry: Option<RetrySection>,
    /// Debug overrides.
    pub debug: Option<DebugOverride>,
}

/// Database overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseOverride {
    /// Dialect override.
    pub dialect: Option<Dialect>,
    /// URL override.
    pub url: Option<String>,
}

/// Debug overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DebugOverride {
    /// Query logging override.
    pub log_queries: Option<bool>,
    /// Threshold override.
    pub slow_query_threshold_ms: Option<u64>,
}

/// Replace `${VAR}` with the variable's value; unset variables are left as written.
fn expand_env_vars(content: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return content.to_string();
    };

    re.replace_all(content, |caps: &regex_lite::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
