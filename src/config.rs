//! Configuration parsing, validation, and credential loading.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::events::EventKind;
use crate::launcher::LaunchConfig;
use crate::{AppError, Result};

/// Environment variable consulted when no password is configured.
pub const PASSWORD_ENV_VAR: &str = "TORINO_CONTROL_PASSWORD";

/// Where and how to reach the control endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ControlConfig {
    /// TCP control port.
    #[serde(default = "default_address")]
    pub address: String,
    /// Unix socket or named pipe; takes precedence over `address`.
    #[serde(default)]
    pub socket_path: Option<PathBuf>,
    /// File holding `PORT=<ip>:<port>`; takes precedence over `address`.
    #[serde(default)]
    pub port_file: Option<PathBuf>,
    /// Control password; falls back to [`PASSWORD_ENV_VAR`].
    #[serde(default)]
    pub password: Option<String>,
    /// Per-command timeout; 0 means no timeout.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            socket_path: None,
            port_file: None,
            password: None,
            command_timeout_seconds: default_command_timeout(),
        }
    }
}

/// Daemon launch settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct LaunchSection {
    /// Daemon binary; platform default when absent.
    #[serde(default)]
    pub executable: Option<PathBuf>,
    /// Configuration file passed with `-f`.
    #[serde(default)]
    pub torrc: Option<PathBuf>,
    /// Data directory; temporary when absent.
    #[serde(default)]
    pub data_directory: Option<PathBuf>,
    /// Extra `--Option value` arguments, overriding launcher defaults.
    #[serde(default)]
    pub extra_args: BTreeMap<String, String>,
    /// Maximum time to reach 100% bootstrap.
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_seconds: u64,
    /// Make the daemon exit with this process.
    #[serde(default = "default_true")]
    pub take_ownership: bool,
}

impl Default for LaunchSection {
    fn default() -> Self {
        Self {
            executable: None,
            torrc: None,
            data_directory: None,
            extra_args: BTreeMap::new(),
            startup_timeout_seconds: default_startup_timeout(),
            take_ownership: true,
        }
    }
}

/// Event kinds the `watch` command subscribes to by default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WatchConfig {
    /// Event kind names, e.g. `"CIRC"`.
    #[serde(default)]
    pub events: Vec<String>,
}

fn default_address() -> String {
    "127.0.0.1:9051".into()
}

fn default_command_timeout() -> u64 {
    30
}

fn default_startup_timeout() -> u64 {
    120
}

fn default_true() -> bool {
    true
}

/// Resolved control endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEndpoint {
    /// TCP address.
    Tcp(SocketAddr),
    /// Local socket path.
    Local(PathBuf),
    /// Port file to read the TCP address from.
    PortFile(PathBuf),
}

/// Configuration parsed from `torino.toml`.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct TorinoConfig {
    /// Control endpoint settings.
    #[serde(default)]
    pub control: ControlConfig,
    /// Daemon launch settings.
    #[serde(default)]
    pub launch: LaunchSection,
    /// Default event subscriptions.
    #[serde(default)]
    pub watch: WatchConfig,
}

impl TorinoConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Control endpoint, by precedence: socket path, port file, address.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when `address` is not `ip:port`.
    pub fn endpoint(&self) -> Result<ControlEndpoint> {
        if let Some(path) = &self.control.socket_path {
            return Ok(ControlEndpoint::Local(path.clone()));
        }
        if let Some(path) = &self.control.port_file {
            return Ok(ControlEndpoint::PortFile(path.clone()));
        }
        self.control
            .address
            .parse()
            .map(ControlEndpoint::Tcp)
            .map_err(|err| {
                AppError::Config(format!(
                    "control.address '{}' invalid: {err}",
                    self.control.address
                ))
            })
    }

    /// Configured password, else the [`PASSWORD_ENV_VAR`] value.
    #[must_use]
    pub fn password(&self) -> Option<String> {
        if let Some(password) = &self.control.password {
            return Some(password.clone());
        }
        match env::var(PASSWORD_ENV_VAR) {
            Ok(value) if !value.is_empty() => Some(value),
            _ => {
                debug!(var = PASSWORD_ENV_VAR, "no control password configured");
                None
            }
        }
    }

    /// Per-command timeout, if any.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        (self.control.command_timeout_seconds > 0)
            .then(|| Duration::from_secs(self.control.command_timeout_seconds))
    }

    /// Parsed `[watch] events`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for an unknown kind name.
    pub fn watch_kinds(&self) -> Result<Vec<EventKind>> {
        self.watch
            .events
            .iter()
            .map(|name| {
                name.trim()
                    .to_ascii_uppercase()
                    .parse()
                    .map_err(|_| AppError::Config(format!("watch.events: unknown event kind '{name}'")))
            })
            .collect()
    }

    /// Launcher settings derived from `[launch]`.
    #[must_use]
    pub fn launch_config(&self) -> LaunchConfig {
        LaunchConfig {
            executable: self.launch.executable.clone(),
            torrc: self.launch.torrc.clone(),
            data_directory: self.launch.data_directory.clone(),
            extra_args: self.launch.extra_args.clone(),
            startup_timeout: Duration::from_secs(self.launch.startup_timeout_seconds),
            take_ownership: self.launch.take_ownership,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.control.socket_path.is_none() && self.control.port_file.is_none() {
            self.endpoint()?;
        }
        if self.launch.startup_timeout_seconds == 0 {
            return Err(AppError::Config(
                "launch.startup_timeout_seconds must be greater than zero".into(),
            ));
        }
        self.watch_kinds()?;
        Ok(())
    }
}
