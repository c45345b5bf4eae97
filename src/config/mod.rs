use crate::circuit_breaker::{BackoffPolicy, CircuitBreakerConfig, RetryConfig, MAX_COOLDOWN_SECS};
use crate::error::{Result, RouterError};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Environment variable that forces offline mode when set to `1` or `true`
pub const OFFLINE_MODE_ENV: &str = "ANALYSIS_OFFLINE_MODE";

/// Main router configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Circuit breaker for the primary provider
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry policy for primary calls
    #[serde(default)]
    pub retry: RetryConfig,
    /// Remote analysis provider
    #[serde(default)]
    pub primary: PrimaryConfig,
    /// Operator override: answer every request from the fallback
    #[serde(default)]
    pub offline_mode: bool,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// Remote provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryConfig {
    /// URL the analysis request is POSTed to
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Model identifier forwarded to the provider
    #[serde(default)]
    pub model: Option<String>,
    /// Deadline for a single attempt, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    30
}

fn default_endpoint() -> String {
    "http://localhost:9000/v1/analyze".to_string()
}

fn default_api_key_env() -> String {
    "ANALYSIS_API_KEY".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for PrimaryConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key_env: default_api_key_env(),
            model: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl PrimaryConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resolve the API key from the environment; empty values count as absent
    pub fn api_key(&self) -> Option<SecretString> {
        std::env::var(&self.api_key_env)
            .ok()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .map(SecretString::new)
    }
}

impl RouterConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RouterError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| RouterError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Apply overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(OFFLINE_MODE_ENV) {
            let value = value.trim().to_ascii_lowercase();
            if value == "1" || value == "true" {
                info!(env = OFFLINE_MODE_ENV, "Offline mode forced by environment");
                self.offline_mode = true;
            }
        }
    }

    /// Longest a request can spend on the primary before falling back:
    /// every attempt timing out, plus the largest possible backoff between them
    pub fn primary_budget(&self) -> Duration {
        let attempts = self.retry.max_attempts.max(1);
        let backoff = BackoffPolicy::from_config(&self.retry).total_ceiling(attempts - 1);
        self.primary
            .request_timeout()
            .saturating_mul(attempts)
            .saturating_add(backoff)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.timeout_secs == 0 {
            return Err(RouterError::Config(
                "Server timeout_secs must be > 0".to_string(),
            ));
        }

        if self.circuit_breaker.failure_threshold == 0 {
            return Err(RouterError::Config(
                "Circuit breaker failure_threshold must be > 0".to_string(),
            ));
        }

        if self.circuit_breaker.cooldown_secs == 0 {
            return Err(RouterError::Config(
                "Circuit breaker cooldown_secs must be > 0".to_string(),
            ));
        }

        if self.circuit_breaker.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(RouterError::Config(format!(
                "Circuit breaker cooldown_secs ({}) must not exceed {}",
                self.circuit_breaker.cooldown_secs, MAX_COOLDOWN_SECS
            )));
        }

        if self.retry.max_attempts == 0 {
            return Err(RouterError::Config(
                "Retry max_attempts must be > 0".to_string(),
            ));
        }

        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(RouterError::Config(format!(
                "Retry base_delay_ms ({}) must not exceed max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }

        if self.primary.request_timeout_secs == 0 {
            return Err(RouterError::Config(
                "Primary request_timeout_secs must be > 0".to_string(),
            ));
        }

        // The server deadline must leave room to answer from the fallback
        let budget = self.primary_budget();
        let deadline = Duration::from_secs(self.server.timeout_secs);
        if budget >= deadline {
            return Err(RouterError::Config(format!(
                "Primary budget ({:?} = {} attempts of {}s plus backoff) must be shorter than server timeout_secs ({})",
                budget,
                self.retry.max_attempts,
                self.primary.request_timeout_secs,
                self.server.timeout_secs
            )));
        }

        if !self.offline_mode {
            let url = url::Url::parse(&self.primary.endpoint).map_err(|e| {
                RouterError::Config(format!(
                    "Invalid primary endpoint '{}': {}",
                    self.primary.endpoint, e
                ))
            })?;

            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(RouterError::Config(format!(
                    "Primary endpoint must use http:// or https://: {}",
                    self.primary.endpoint
                )));
            }
        }

        Ok(())
    }
}
