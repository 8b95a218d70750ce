//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

use crate::protocol::reply::ReplyCode;

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every failure mode of the control client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// A line did not match the wire grammar, or the stream ended mid-message.
    Format(String),
    /// A well-formed line carried semantically invalid content.
    Protocol(String),
    /// The daemon answered a command with a non-success status code.
    Command {
        /// Status code of the reply's leading entry.
        code: ReplyCode,
        /// Reply content, verbatim.
        message: String,
    },
    /// A caller-initiated cancellation fired while waiting.
    Cancelled,
    /// A caller-imposed deadline elapsed; the connection stays usable.
    Timeout(String),
    /// The reader loop terminated; the connection is no longer usable.
    ConnectionClosed(String),
    /// Authentication could not be negotiated.
    Auth(String),
    /// The daemon reported that an address could not be resolved.
    Unresolved(String),
    /// Every started hidden-service descriptor upload failed.
    Publication(String),
    /// Launching or supervising the daemon process failed.
    Launch(String),
    /// Configuration parsing or validation failure.
    Config(String),
    /// File-system or socket I/O failure.
    Io(String),
}

impl AppError {
    /// Whether this error means the connection can no longer carry commands.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Format(_) | Self::ConnectionClosed(_) | Self::Io(_))
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Format(msg) => write!(f, "format: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Command { code, message } => {
                write!(f, "command: {} {message}", code.as_u16())
            }
            Self::Cancelled => write!(f, "cancelled: wait aborted by caller"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::ConnectionClosed(msg) => write!(f, "connection closed: {msg}"),
            Self::Auth(msg) => write!(f, "auth: {msg}"),
            Self::Unresolved(msg) => write!(f, "unresolved: {msg}"),
            Self::Publication(msg) => write!(f, "publication: {msg}"),
            Self::Launch(msg) => write!(f, "launch: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
