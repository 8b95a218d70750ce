//! Information and configuration queries, signals.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::controller::Controller;
use crate::protocol::command::Command;
use crate::protocol::reply::{Divider, Response};
use crate::protocol::tokenizer;
use crate::{AppError, Result};

/// Signals accepted by `SIGNAL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Leave dormant mode.
    Active,
    /// Enter dormant mode.
    Dormant,
    /// Reload configuration.
    Reload,
    /// Controlled shutdown.
    Shutdown,
    /// Dump statistics to the log.
    Dump,
    /// Switch logging to debug level.
    Debug,
    /// Immediate shutdown.
    Halt,
    /// Same as `RELOAD`.
    Hup,
    /// Same as `SHUTDOWN`.
    Int,
    /// Same as `DUMP`.
    Usr1,
    /// Same as `DEBUG`.
    Usr2,
    /// Same as `HALT`.
    Term,
    /// Use fresh circuits for new connections.
    NewNym,
    /// Forget cached DNS results.
    ClearDnsCache,
    /// Log a heartbeat message.
    Heartbeat,
}

impl Signal {
    /// Every signal, in wire-table order.
    pub const ALL: [Self; 15] = [
        Self::Active,
        Self::Dormant,
        Self::Reload,
        Self::Shutdown,
        Self::Dump,
        Self::Debug,
        Self::Halt,
        Self::Hup,
        Self::Int,
        Self::Usr1,
        Self::Usr2,
        Self::Term,
        Self::NewNym,
        Self::ClearDnsCache,
        Self::Heartbeat,
    ];

    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Dormant => "DORMANT",
            Self::Reload => "RELOAD",
            Self::Shutdown => "SHUTDOWN",
            Self::Dump => "DUMP",
            Self::Debug => "DEBUG",
            Self::Halt => "HALT",
            Self::Hup => "HUP",
            Self::Int => "INT",
            Self::Usr1 => "USR1",
            Self::Usr2 => "USR2",
            Self::Term => "TERM",
            Self::NewNym => "NEWNYM",
            Self::ClearDnsCache => "CLEARDNSCACHE",
            Self::Heartbeat => "HEARTBEAT",
        }
    }
}

impl FromStr for Signal {
    type Err = AppError;

    /// Case-insensitive parse of a wire name.
    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|sig| sig.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AppError::Protocol(format!("unknown signal '{s}'")))
    }
}

impl Display for Signal {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `key=value` lines of a reply, skipping the closing `OK`.
///
/// Data-block values lose the line break that follows `key=`. Lines
/// without `=` map to `None`.
fn key_values(reply: &Response) -> Vec<(String, Option<String>)> {
    reply
        .iter()
        .filter(|e| !(e.divider() == Divider::Space && e.content() == "OK"))
        .map(|e| match e.content().split_once('=') {
            Some((key, value)) if e.divider() == Divider::Plus => (
                key.to_owned(),
                Some(value.strip_prefix('\n').unwrap_or(value).to_owned()),
            ),
            Some((key, value)) => (key.to_owned(), Some(tokenizer::unquote(value))),
            None => (e.content().to_owned(), None),
        })
        .collect()
}

fn join_keys(keys: &[&str]) -> Result<String> {
    if keys.is_empty() {
        return Err(AppError::Protocol("at least one key is required".into()));
    }
    if let Some(bad) = keys.iter().find(|k| k.is_empty() || k.contains(char::is_whitespace)) {
        return Err(AppError::Protocol(format!("invalid key '{bad}'")));
    }
    Ok(keys.join(" "))
}

impl Controller {
    /// `GETINFO` for one or more keys, in reply order.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] for unknown keys and
    /// [`AppError::Protocol`] for an empty or malformed key list.
    pub async fn get_info(&self, keys: &[&str]) -> Result<Vec<(String, String)>> {
        let reply = self
            .send_command(Command::GetInfo, Some(&join_keys(keys)?))
            .await?;
        Ok(key_values(&reply)
            .into_iter()
            .map(|(key, value)| (key, value.unwrap_or_default()))
            .collect())
    }

    /// `GETINFO` for a single key.
    ///
    /// # Errors
    ///
    /// As [`get_info`](Self::get_info), plus [`AppError::Protocol`] when the
    /// reply does not carry the key.
    pub async fn get_info_value(&self, key: &str) -> Result<String> {
        self.get_info(&[key])
            .await?
            .into_iter()
            .find_map(|(k, v)| (k == key).then_some(v))
            .ok_or_else(|| AppError::Protocol(format!("GETINFO reply lacks '{key}'")))
    }

    /// `GETCONF`; `None` values are at their default.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] for unknown options.
    pub async fn get_conf(&self, keys: &[&str]) -> Result<Vec<(String, Option<String>)>> {
        let reply = self
            .send_command(Command::GetConf, Some(&join_keys(keys)?))
            .await?;
        Ok(key_values(&reply))
    }

    /// `SETCONF`; a `None` value resets the option to its default.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] when the daemon rejects a value.
    pub async fn set_conf(&self, settings: &[(&str, Option<&str>)]) -> Result<()> {
        let keys: Vec<&str> = settings.iter().map(|(k, _)| *k).collect();
        join_keys(&keys)?;
        let args: Vec<String> = settings
            .iter()
            .map(|(key, value)| match value {
                Some(value) => format!("{key}={}", tokenizer::quote(value)),
                None => (*key).to_owned(),
            })
            .collect();
        self.send_command(Command::SetConf, Some(&args.join(" ")))
            .await
            .map(|_| ())
    }

    /// Send a signal to the daemon.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] when the daemon rejects it.
    pub async fn signal(&self, signal: Signal) -> Result<()> {
        self.send_command(Command::Signal, Some(signal.as_str()))
            .await
            .map(|_| ())
    }

    /// Make the daemon exit when this connection closes.
    ///
    /// # Errors
    ///
    /// Propagates command failures.
    pub async fn take_ownership(&self) -> Result<()> {
        self.send_command(Command::TakeOwnership, None)
            .await
            .map(|_| ())
    }

    /// Daemon version; fetched once per connection.
    ///
    /// # Errors
    ///
    /// Propagates the `GETINFO` failure.
    pub async fn version(&self) -> Result<String> {
        self.inner
            .version
            .get_or_try_init(|| self.get_info_value("version"))
            .await
            .cloned()
    }

    /// Daemon process id; fetched once per connection.
    ///
    /// # Errors
    ///
    /// Propagates the `GETINFO` failure, or [`AppError::Protocol`] when the
    /// value is not a number.
    pub async fn pid(&self) -> Result<u32> {
        self.inner
            .pid
            .get_or_try_init(|| async {
                let raw = self.get_info_value("process/pid").await?;
                raw.parse()
                    .map_err(|_| AppError::Protocol(format!("invalid process id '{raw}'")))
            })
            .await
            .copied()
    }

    /// User the daemon runs as; fetched once per connection.
    ///
    /// # Errors
    ///
    /// Propagates the `GETINFO` failure.
    pub async fn user(&self) -> Result<String> {
        self.inner
            .user
            .get_or_try_init(|| self.get_info_value("process/user"))
            .await
            .cloned()
    }
}
