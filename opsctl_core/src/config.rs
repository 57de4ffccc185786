//! # Configuration
//!
//! `opsctl` reads an optional TOML file. Every section and key is optional;
//! command-line flags override the file, and the port-claim timings can also
//! be overridden from the environment.
//!
//! ```toml
//! [server]
//! bind_addr = "127.0.0.1:8080"
//! production = false
//! shutdown_port = 8080
//!
//! [logging]
//! filter = "info,opsctl_http=debug"
//! log_to_file = false
//!
//! [logging.loggers]
//! "app::db" = "warn"
//! "app::http" = "inherit"
//!
//! [port_claim]
//! deadline_ms = 500
//! poll_ms = 50
//! notify_timeout_ms = 200
//! ```

use crate::level::LevelSetting;
use crate::port_claim::{DEFAULT_DEADLINE, DEFAULT_NOTIFY_TIMEOUT, DEFAULT_POLL_INTERVAL};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;

/// Overrides `[port_claim] deadline_ms`.
pub const DEADLINE_ENV: &str = "OPSCTL_PORT_CLAIM_DEADLINE_MS";
/// Overrides `[port_claim] poll_ms`.
pub const POLL_ENV: &str = "OPSCTL_PORT_CLAIM_POLL_MS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OpsctlConfig {
    pub server: ServerSection,
    pub logging: LoggingSection,
    pub port_claim: PortClaimSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind_addr: Option<SocketAddr>,
    pub production: bool,
    pub shutdown_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub filter: String,
    pub log_to_file: bool,
    pub log_dir: Option<PathBuf>,
    pub loggers: BTreeMap<String, LevelSetting>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            log_to_file: false,
            log_dir: None,
            loggers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortClaimSection {
    pub deadline_ms: u64,
    pub poll_ms: u64,
    pub notify_timeout_ms: u64,
}

impl Default for PortClaimSection {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE.as_millis() as u64,
            poll_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            notify_timeout_ms: DEFAULT_NOTIFY_TIMEOUT.as_millis() as u64,
        }
    }
}

impl PortClaimSection {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms)
    }

    pub fn notify_timeout(&self) -> Duration {
        Duration::from_millis(self.notify_timeout_ms)
    }

    /// Apply `OPSCTL_PORT_CLAIM_DEADLINE_MS` / `OPSCTL_PORT_CLAIM_POLL_MS`.
    /// Unset or unparsable values leave the current setting alone.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(ms) = env_millis(DEADLINE_ENV) {
            self.deadline_ms = ms;
        }
        if let Some(ms) = env_millis(POLL_ENV) {
            self.poll_ms = ms;
        }
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_ms == 0 {
            return Err(ConfigError::Invalid("port_claim.poll_ms must be > 0".into()));
        }
        if self.poll_ms > self.deadline_ms {
            return Err(ConfigError::Invalid(format!(
                "port_claim.poll_ms ({}) exceeds deadline_ms ({})",
                self.poll_ms, self.deadline_ms
            )));
        }
        Ok(())
    }
}

fn env_millis(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl OpsctlConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: OpsctlConfig = toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.port_claim.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    /// Load `path` if given, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Port-claim timings with environment overrides applied and validated.
    pub fn port_claim_timings(&self) -> Result<PortClaimSection, ConfigError> {
        let timings = self.port_claim.with_env_overrides();
        timings.validate()?;
        Ok(timings)
    }
}
