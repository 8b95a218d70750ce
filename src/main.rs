#![forbid(unsafe_code)]

//! `torino`: command-line front end for a Tor control port.
//!
//! Loads an optional configuration file, connects and authenticates, then
//! runs one subcommand: watching events, querying info, resolving a name,
//! sending a signal, or launching a daemon.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use torino::config::ControlEndpoint;
use torino::controller::Signal;
use torino::launcher::{self, DaemonProcess};
use torino::{AppError, Controller, Event, EventKind, Result, TorinoConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "torino", about = "Tor control port client", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Debug, Subcommand)]
enum Cmd {
    /// Subscribe to events and print them until interrupted.
    Watch {
        /// Event kinds; defaults to `[watch] events` from the config.
        events: Vec<String>,
        /// Print events as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Query GETINFO keys.
    Info {
        /// Keys such as `version` or `process/pid`.
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Resolve a host name (or an address, with `--reverse`).
    Resolve {
        /// Host name or address.
        host: String,
        /// Reverse lookup.
        #[arg(long)]
        reverse: bool,
    },
    /// Send a signal such as NEWNYM or RELOAD.
    Signal {
        /// Signal name.
        name: String,
    },
    /// Launch a daemon, wait for bootstrap, and keep it running until interrupted.
    Launch,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    let config = match &args.config {
        Some(path) => TorinoConfig::load_from_path(path)?,
        None => TorinoConfig::default(),
    };

    match args.command {
        Cmd::Watch { events, json } => watch(&config, &events, json).await,
        Cmd::Info { keys } => {
            let controller = connect(&config).await?;
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            let values = bounded(&config, controller.get_info(&keys)).await?;
            for (key, value) in values {
                println!("{key}={value}");
            }
            controller.close().await
        }
        Cmd::Resolve { host, reverse } => {
            let controller = connect(&config).await?;
            let cancel = CancellationToken::new();
            if let Some(limit) = config.command_timeout() {
                let timer = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(limit).await;
                    timer.cancel();
                });
            }
            let resolved = controller.resolve(&host, reverse, &cancel).await?;
            println!("{resolved}");
            controller.close().await
        }
        Cmd::Signal { name } => {
            let signal: Signal = name.parse()?;
            let controller = connect(&config).await?;
            bounded(&config, controller.signal(signal)).await?;
            info!(%signal, "signal sent");
            controller.close().await
        }
        Cmd::Launch => launch(&config).await,
    }
}

async fn connect(config: &TorinoConfig) -> Result<Controller> {
    let controller = match config.endpoint()? {
        ControlEndpoint::Tcp(addr) => Controller::connect_tcp(addr).await?,
        ControlEndpoint::Local(path) => Controller::connect_local(path).await?,
        ControlEndpoint::PortFile(path) => {
            let addr = launcher::read_port_file(&path).await?;
            Controller::connect_tcp(addr).await?
        }
    };
    let password = config.password();
    bounded(config, controller.authenticate(password.as_deref())).await?;
    Ok(controller)
}

/// Apply the configured command timeout to `op`.
async fn bounded<T>(config: &TorinoConfig, op: impl Future<Output = Result<T>>) -> Result<T> {
    match config.command_timeout() {
        Some(limit) => tokio::time::timeout(limit, op).await.map_err(|_| {
            AppError::Timeout(format!("no reply within {limit:?}"))
        })?,
        None => op.await,
    }
}

async fn watch(config: &TorinoConfig, names: &[String], json: bool) -> Result<()> {
    let kinds: Vec<EventKind> = if names.is_empty() {
        config.watch_kinds()?
    } else {
        names
            .iter()
            .map(|n| n.to_ascii_uppercase().parse())
            .collect::<Result<_>>()?
    };
    if kinds.is_empty() {
        return Err(AppError::Config(
            "no event kinds given and [watch] events is empty".into(),
        ));
    }

    let controller = connect(config).await?;
    for kind in kinds {
        controller
            .add_handler(kind, move |event: &Event| {
                if json {
                    let line = serde_json::to_string(event)
                        .map_err(|err| AppError::Protocol(format!("cannot encode event: {err}")))?;
                    println!("{line}");
                } else {
                    println!("{}", event.raw());
                }
                Ok(())
            })
            .await?;
    }
    info!(kinds = ?controller.subscribed_kinds(), "watching events");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, closing connection");
            controller.close().await
        }
        () = controller.closed() => {
            warn!("daemon closed the control connection");
            Ok(())
        }
    }
}

async fn launch(config: &TorinoConfig) -> Result<()> {
    let launch_config = config.launch_config();
    let mut daemon = DaemonProcess::spawn(&launch_config).await?;

    let mut progress = daemon.progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let percent = *progress.borrow_and_update();
            println!("bootstrap {percent}%");
            if percent >= 100 {
                break;
            }
        }
    });
    daemon.wait_bootstrapped().await?;
    reporter.abort();

    let endpoint = wait_for_endpoint(&daemon).await?;
    println!("control port {endpoint}");
    println!("cookie file {}", daemon.cookie_file().display());

    let controller = Controller::connect_tcp(endpoint).await?;
    controller.authenticate(None).await?;
    if launch_config.take_ownership {
        controller.take_ownership().await?;
    }
    let version = controller.version().await?;
    info!(version = version.as_str(), "daemon ready");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, stopping daemon");
            controller.close().await.ok();
            daemon.kill().await
        }
        () = controller.closed() => {
            warn!("daemon closed the control connection");
            Ok(())
        }
    }
}

/// The port file can lag behind bootstrap output slightly.
async fn wait_for_endpoint(daemon: &DaemonProcess) -> Result<std::net::SocketAddr> {
    let mut last_err = None;
    for _ in 0..20 {
        match daemon.control_endpoint().await {
            Ok(addr) => return Ok(addr),
            Err(err) => last_err = Some(err),
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    Err(last_err.unwrap_or_else(|| AppError::Launch("control port file never appeared".into())))
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
