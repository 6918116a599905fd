//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! The bearer credential never lives in the TOML; it is read from
//! INVITE_AUTH_TOKEN or the file named by `client.auth_file`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use common::Secret;
use invite_client::{HeaderInjection, HttpSubmitterConfig};
use invite_pool::RecordPaths;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolConfig,
    pub client: ClientConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Worker pool tuning
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_workers: usize,
    pub delay_secs: f64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
    pub max_claim_attempts: u32,
    /// Per-request timeout; derived from `retry_delay_secs` when absent
    pub request_timeout_secs: Option<f64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 3,
            delay_secs: 3.0,
            max_retries: 20,
            retry_delay_secs: 8.0,
            max_claim_attempts: invite_pool::scheduler::DEFAULT_MAX_CLAIM_ATTEMPTS,
            request_timeout_secs: None,
        }
    }
}

/// Endpoint and client identity
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    pub endpoint: String,
    pub device_id: String,
    pub user_agent: String,
    #[serde(default = "default_device_id_header")]
    pub device_id_header: String,
    #[serde(default = "default_auth_file")]
    pub auth_file: PathBuf,
    #[serde(default)]
    pub headers: Vec<HeaderInjection>,
}

/// Record file locations
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub used: PathBuf,
    pub success: PathBuf,
    pub invalid: PathBuf,
}

impl Default for FilesConfig {
    fn default() -> Self {
        let paths = RecordPaths::in_dir(Path::new(""));
        Self {
            used: paths.used,
            success: paths.success,
            invalid: paths.invalid,
        }
    }
}

/// Prometheus exporter
#[derive(Debug, Default, Deserialize)]
pub struct MetricsConfig {
    /// Exporter is disabled when absent
    #[serde(default)]
    pub listen_addr: Option<SocketAddr>,
}

fn default_device_id_header() -> String {
    "OAI-Device-Id".into()
}

fn default_auth_file() -> PathBuf {
    PathBuf::from("auth.txt")
}

/// Floor for the derived request timeout.
const MIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

fn seconds(field: &str, value: f64) -> common::Result<Duration> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        common::Error::Config(format!(
            "{field} must be a finite, non-negative number of seconds, got: {value}"
        ))
    })
}

fn require(field: &str, value: &str) -> common::Result<()> {
    if value.trim().is_empty() {
        return Err(common::Error::Config(format!("{field} must not be empty")));
    }
    Ok(())
}

impl Config {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        let pool = &self.pool;
        if pool.max_workers == 0 {
            return Err(common::Error::Config(
                "max_workers must be greater than 0".into(),
            ));
        }
        if pool.max_retries == 0 {
            return Err(common::Error::Config(
                "max_retries must be greater than 0".into(),
            ));
        }
        if pool.max_claim_attempts == 0 {
            return Err(common::Error::Config(
                "max_claim_attempts must be greater than 0".into(),
            ));
        }
        seconds("delay_secs", pool.delay_secs)?;
        seconds("retry_delay_secs", pool.retry_delay_secs)?;
        if let Some(timeout) = pool.request_timeout_secs {
            if seconds("request_timeout_secs", timeout)?.is_zero() {
                return Err(common::Error::Config(
                    "request_timeout_secs must be greater than 0".into(),
                ));
            }
        }

        let client = &self.client;
        if !client.endpoint.starts_with("http://") && !client.endpoint.starts_with("https://") {
            return Err(common::Error::Config(format!(
                "endpoint must start with http:// or https://, got: {}",
                client.endpoint
            )));
        }
        require("device_id", &client.device_id)?;
        require("user_agent", &client.user_agent)?;
        require("device_id_header", &client.device_id_header)?;
        for header in &client.headers {
            require("header name", &header.name)?;
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("invite-runner.toml")
    }

    pub fn record_paths(&self) -> RecordPaths {
        RecordPaths {
            used: self.files.used.clone(),
            success: self.files.success.clone(),
            invalid: self.files.invalid.clone(),
        }
    }

    /// Client settings with the resolved credential.
    pub fn submitter_config(&self, credential: Secret<String>) -> HttpSubmitterConfig {
        let client = &self.client;
        HttpSubmitterConfig {
            endpoint: client.endpoint.clone(),
            credential,
            device_id_header: client.device_id_header.clone(),
            device_id: client.device_id.clone(),
            user_agent: client.user_agent.clone(),
            headers: client.headers.clone(),
            timeout: self.pool.request_timeout(),
        }
    }
}

// Durations below were checked by `Config::validate`.
impl PoolConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_secs_f64(self.delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay_secs)
    }

    /// Explicit value, else four retry delays but never under a second.
    pub fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            Some(secs) => Duration::from_secs_f64(secs),
            None => self
                .retry_delay()
                .saturating_mul(4)
                .max(MIN_REQUEST_TIMEOUT),
        }
    }
}
