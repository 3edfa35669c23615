//! Runner configuration.
//!
//! Configuration is loaded from environment variables. Command-line flags
//! override individual fields after loading.

use std::collections::HashMap;
use std::env;
use std::time::Duration;
use thiserror::Error;

/// Default probe container image.
pub const DEFAULT_PROBE_IMAGE: &str = "netcheck-probe:latest";

/// Default path of the probe executable inside the image.
pub const DEFAULT_PROBE_COMMAND: &str = "/netcheck-probe";

/// Default interval between pod status fetches in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default lower bound of the poll deadline in seconds.
pub const DEFAULT_POLL_TIMEOUT_SECONDS: u64 = 30;

/// Default probe timeout in seconds when a test omits `timeout`.
pub const DEFAULT_CHECK_TIMEOUT_SECONDS: u64 = 5;

/// Default number of pods exercised in parallel per target.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Probe image used when a test has no `probeImage` override.
    pub probe_image: String,

    /// Probe executable inside the image.
    pub probe_command: String,

    /// Interval between pod status fetches while polling.
    pub poll_interval: Duration,

    /// Minimum poll deadline for every check.
    pub poll_timeout: Duration,

    /// Probe timeout for tests that do not set one.
    pub check_timeout: Duration,

    /// Pods exercised in parallel per target (1 = sequential).
    pub concurrency: usize,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Kubeconfig context. `None` tries in-cluster configuration first.
    pub kube_context: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            probe_image: DEFAULT_PROBE_IMAGE.to_string(),
            probe_command: DEFAULT_PROBE_COMMAND.to_string(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            poll_timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECONDS),
            check_timeout: Duration::from_secs(DEFAULT_CHECK_TIMEOUT_SECONDS),
            concurrency: DEFAULT_CONCURRENCY,
            log_json: false,
            kube_context: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid probe image configuration: {0}")]
    InvalidProbeImage(String),

    #[error("Invalid poll interval configuration: {0}")]
    InvalidPollInterval(String),

    #[error("Invalid poll timeout configuration: {0}")]
    InvalidPollTimeout(String),

    #[error("Invalid check timeout configuration: {0}")]
    InvalidCheckTimeout(String),

    #[error("Invalid concurrency configuration: {0}")]
    InvalidConcurrency(String),

    #[error("Invalid log format configuration: {0}")]
    InvalidLogFormat(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let probe_image = vars
            .get("NETCHECK_PROBE_IMAGE")
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROBE_IMAGE.to_string());
        if probe_image.trim().is_empty() {
            return Err(ConfigError::InvalidProbeImage(
                "NETCHECK_PROBE_IMAGE must not be empty".to_string(),
            ));
        }

        let probe_command = vars
            .get("NETCHECK_PROBE_COMMAND")
            .filter(|c| !c.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_PROBE_COMMAND.to_string());

        let poll_interval_ms = parse_positive(
            vars,
            "NETCHECK_POLL_INTERVAL_MS",
            DEFAULT_POLL_INTERVAL_MS,
            ConfigError::InvalidPollInterval,
        )?;

        let poll_timeout_seconds = parse_positive(
            vars,
            "NETCHECK_POLL_TIMEOUT_SECONDS",
            DEFAULT_POLL_TIMEOUT_SECONDS,
            ConfigError::InvalidPollTimeout,
        )?;

        let check_timeout_seconds = parse_positive(
            vars,
            "NETCHECK_CHECK_TIMEOUT_SECONDS",
            DEFAULT_CHECK_TIMEOUT_SECONDS,
            ConfigError::InvalidCheckTimeout,
        )?;

        let concurrency = parse_positive(
            vars,
            "NETCHECK_CONCURRENCY",
            DEFAULT_CONCURRENCY as u64,
            ConfigError::InvalidConcurrency,
        )?;
        let concurrency = usize::try_from(concurrency).map_err(|e| {
            ConfigError::InvalidConcurrency(format!("NETCHECK_CONCURRENCY out of range: {e}"))
        })?;

        let log_json = match vars.get("NETCHECK_LOG_JSON").map(|v| v.trim().to_lowercase()) {
            None => false,
            Some(value) => match value.as_str() {
                "" | "0" | "false" | "no" => false,
                "1" | "true" | "yes" => true,
                other => {
                    return Err(ConfigError::InvalidLogFormat(format!(
                        "NETCHECK_LOG_JSON must be true or false, got '{other}'"
                    )))
                }
            },
        };

        let kube_context = vars
            .get("KUBE_CONTEXT")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());

        Ok(Config {
            probe_image,
            probe_command,
            poll_interval: Duration::from_millis(poll_interval_ms),
            poll_timeout: Duration::from_secs(poll_timeout_seconds),
            check_timeout: Duration::from_secs(check_timeout_seconds),
            concurrency,
            log_json,
            kube_context,
        })
    }
}

fn parse_positive(
    vars: &HashMap<String, String>,
    name: &str,
    default: u64,
    error: fn(String) -> ConfigError,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: u64 = value_str.trim().parse().map_err(|e| {
        error(format!(
            "{name} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(error(format!("{name} must be greater than 0")));
    }

    Ok(value)
}
