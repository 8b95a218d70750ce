//! Daemon process launcher.
//!
//! Starts the daemon with:
//! - `kill_on_drop(true)` so the process never outlives its handle.
//! - A control port on an automatically chosen loopback port, written to a
//!   file inside the data directory, and cookie authentication.
//! - A bootstrap progress stream fed from the daemon's stdout
//!   (`Bootstrapped N%` lines), with `[warn]`/`[err]` lines forwarded to
//!   the log.
//! - A startup timeout: if bootstrap does not reach 100% in time, the
//!   process is killed and `AppError::Launch("startup timeout …")` is
//!   returned.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::{AppError, Result};

/// File the daemon writes its control endpoint to, inside the data directory.
pub const CONTROL_PORT_FILE: &str = "control_port";

/// Cookie file name, inside the data directory.
pub const COOKIE_FILE: &str = "control_auth_cookie";

/// Executable used when none is configured.
#[must_use]
pub fn default_executable() -> &'static str {
    if cfg!(windows) {
        "tor.exe"
    } else {
        "tor"
    }
}

// ── Configuration ────────────────────────────────────────────────────────────

/// How to start the daemon.
#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Daemon binary; [`default_executable`] when `None`.
    pub executable: Option<PathBuf>,
    /// Configuration file passed with `-f`.
    pub torrc: Option<PathBuf>,
    /// Data directory; a temporary directory is created when `None`.
    pub data_directory: Option<PathBuf>,
    /// Extra `--Option value` arguments. These override the launcher's own.
    pub extra_args: BTreeMap<String, String>,
    /// Maximum time to reach 100% bootstrap.
    pub startup_timeout: Duration,
    /// Make the daemon exit when this process exits.
    pub take_ownership: bool,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            executable: None,
            torrc: None,
            data_directory: None,
            extra_args: BTreeMap::new(),
            startup_timeout: Duration::from_secs(120),
            take_ownership: true,
        }
    }
}

/// Normalize an option name to its command-line spelling.
fn option_flag(name: &str) -> String {
    if name.starts_with('-') || name.starts_with("__") {
        name.to_owned()
    } else {
        format!("--{name}")
    }
}

/// Build the daemon's argument list.
///
/// Caller-supplied `extra_args` replace launcher defaults of the same name.
#[must_use]
pub fn build_args(config: &LaunchConfig, data_dir: &Path, owner_pid: u32) -> Vec<String> {
    let mut options: BTreeMap<String, String> = BTreeMap::new();
    let path = |name: &str| data_dir.join(name).to_string_lossy().into_owned();

    options.insert("--DataDirectory".into(), data_dir.to_string_lossy().into_owned());
    options.insert("--ControlPort".into(), "auto".into());
    options.insert("--ControlPortWriteToFile".into(), path(CONTROL_PORT_FILE));
    options.insert("--SocksPort".into(), "auto".into());
    options.insert("--CookieAuthentication".into(), "1".into());
    options.insert("--CookieAuthFile".into(), path(COOKIE_FILE));
    if config.take_ownership {
        options.insert("__OwningControllerProcess".into(), owner_pid.to_string());
    }
    for (name, value) in &config.extra_args {
        options.insert(option_flag(name), value.clone());
    }

    let mut args = Vec::with_capacity(options.len() * 2 + 2);
    if let Some(torrc) = &config.torrc {
        args.push("-f".to_owned());
        args.push(torrc.to_string_lossy().into_owned());
    }
    for (flag, value) in options {
        args.push(flag);
        args.push(value);
    }
    args
}

// ── Output parsing ───────────────────────────────────────────────────────────

fn bootstrap_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"Bootstrapped (\d{1,3})%").ok())
        .as_ref()
}

fn problem_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[(warn|err)\]").ok())
        .as_ref()
}

/// Bootstrap percentage announced by a log line, capped at 100.
#[must_use]
pub fn parse_bootstrap(line: &str) -> Option<u8> {
    let captures = bootstrap_pattern()?.captures(line)?;
    let percent: u8 = captures.get(1)?.as_str().parse().ok()?;
    Some(percent.min(100))
}

/// Severity (`warn` or `err`) of a problem log line.
#[must_use]
pub fn problem_severity(line: &str) -> Option<&str> {
    problem_pattern()?
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Parse the control port file: a `PORT=<ip>:<port>` line.
///
/// # Errors
///
/// Returns [`AppError::Launch`] when the file is missing or holds no valid
/// `PORT=` line.
pub async fn read_port_file(path: &Path) -> Result<SocketAddr> {
    let text = tokio::fs::read_to_string(path).await.map_err(|err| {
        AppError::Launch(format!("cannot read port file {}: {err}", path.display()))
    })?;
    parse_port_file(&text)
}

fn parse_port_file(text: &str) -> Result<SocketAddr> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("PORT="))
        .find_map(|addr| addr.parse().ok())
        .ok_or_else(|| AppError::Launch("port file holds no valid PORT= line".into()))
}

// ── Process handle ───────────────────────────────────────────────────────────

#[derive(Debug)]
enum DataDir {
    Temporary(TempDir),
    Provided(PathBuf),
}

impl DataDir {
    fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Provided(path) => path,
        }
    }
}

/// A running daemon started by [`DaemonProcess::spawn`].
///
/// A temporary data directory is removed when the handle drops.
#[derive(Debug)]
pub struct DaemonProcess {
    child: Child,
    data_dir: DataDir,
    progress: watch::Receiver<u8>,
    startup_timeout: Duration,
}

impl DaemonProcess {
    /// Start the daemon and begin following its output.
    ///
    /// # Errors
    ///
    /// - `AppError::Launch("failed to create data directory: …")`.
    /// - `AppError::Launch("failed to spawn daemon: …")` on OS spawn failure.
    pub async fn spawn(config: &LaunchConfig) -> Result<Self> {
        let data_dir = match &config.data_directory {
            Some(path) => {
                tokio::fs::create_dir_all(path).await.map_err(|err| {
                    AppError::Launch(format!("failed to create data directory: {err}"))
                })?;
                DataDir::Provided(path.clone())
            }
            None => DataDir::Temporary(
                tempfile::Builder::new()
                    .prefix("torino-")
                    .tempdir()
                    .map_err(|err| {
                        AppError::Launch(format!("failed to create data directory: {err}"))
                    })?,
            ),
        };

        let executable = config
            .executable
            .clone()
            .unwrap_or_else(|| PathBuf::from(default_executable()));
        let args = build_args(config, data_dir.path(), std::process::id());
        debug!(executable = %executable.display(), ?args, "spawning daemon");

        let mut child = Command::new(&executable)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                AppError::Launch(format!(
                    "failed to spawn daemon {}: {err}",
                    executable.display()
                ))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Launch("failed to capture daemon stdout".into()))?;
        let (progress_tx, progress) = watch::channel(0);
        let pid = child.id();
        tokio::spawn(follow_output(stdout, progress_tx).instrument(info_span!("daemon_output", pid)));

        info!(pid, data_dir = %data_dir.path().display(), "daemon started");
        Ok(Self {
            child,
            data_dir,
            progress,
            startup_timeout: config.startup_timeout,
        })
    }

    /// Bootstrap progress in percent, updated as the daemon reports it.
    #[must_use]
    pub fn progress(&self) -> watch::Receiver<u8> {
        self.progress.clone()
    }

    /// Wait until bootstrap reaches 100%.
    ///
    /// # Errors
    ///
    /// - `AppError::Launch("daemon exited before bootstrap …")` when output
    ///   ends first.
    /// - `AppError::Launch("startup timeout …")` when the window elapses;
    ///   the process is killed.
    pub async fn wait_bootstrapped(&mut self) -> Result<()> {
        let mut progress = self.progress.clone();
        let waited = tokio::time::timeout(self.startup_timeout, progress.wait_for(|p| *p >= 100))
            .await
            .map(|reached| reached.map(|_| ()));
        match waited {
            Ok(Ok(())) => {
                info!("daemon bootstrap complete");
                Ok(())
            }
            Ok(Err(_closed)) => {
                let status = self.child.wait().await.map_or_else(
                    |err| format!("wait error: {err}"),
                    |status| status.to_string(),
                );
                Err(AppError::Launch(format!(
                    "daemon exited before bootstrap completed ({status})"
                )))
            }
            Err(_elapsed) => {
                self.child.kill().await.ok();
                Err(AppError::Launch(format!(
                    "startup timeout: bootstrap incomplete after {:?}",
                    self.startup_timeout
                )))
            }
        }
    }

    /// Data directory in use.
    #[must_use]
    pub fn data_directory(&self) -> &Path {
        self.data_dir.path()
    }

    /// Cookie file written by the daemon.
    #[must_use]
    pub fn cookie_file(&self) -> PathBuf {
        self.data_dir.path().join(COOKIE_FILE)
    }

    /// Control endpoint the daemon bound.
    ///
    /// # Errors
    ///
    /// See [`read_port_file`].
    pub async fn control_endpoint(&self) -> Result<SocketAddr> {
        read_port_file(&self.data_dir.path().join(CONTROL_PORT_FILE)).await
    }

    /// Process id, while running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Kill the process and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the kill fails.
    pub async fn kill(&mut self) -> Result<()> {
        self.child.kill().await.map_err(AppError::from)
    }
}

async fn follow_output(stdout: ChildStdout, progress: watch::Sender<u8>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Some(percent) = parse_bootstrap(&line) {
                    info!(percent, "daemon bootstrap progress");
                    progress.send_replace(percent);
                } else if let Some(severity) = problem_severity(&line) {
                    warn!(severity, line = line.as_str(), "daemon reported a problem");
                } else {
                    debug!(line = line.as_str(), "daemon output");
                }
            }
            Ok(None) => {
                debug!("daemon output closed");
                break;
            }
            Err(err) => {
                warn!(error = %err, "daemon output unreadable");
                break;
            }
        }
    }
}
