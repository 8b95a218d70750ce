//! Reply data model: status codes, dividers, entries, and responses.
//!
//! A [`ResponseEntry`] is one logical protocol line. A [`Response`] is the
//! ordered, non-empty group of entries produced by one read cycle of the
//! wire engine (see [`crate::protocol::reader`]).

use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDateTime;

use crate::protocol::tokenizer;
use crate::{AppError, Result};

// ── Status codes ──────────────────────────────────────────────────────────────

/// Closed enumeration of the status codes the daemon emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyCode {
    /// `250`: command succeeded.
    Ok,
    /// `251`: command succeeded but was unnecessary.
    UnnecessaryOperation,
    /// `451`: resource exhausted.
    Exhausted,
    /// `500`: syntax error, protocol.
    SyntaxError,
    /// `510`: unrecognized command.
    UnrecognizedCommand,
    /// `511`: unimplemented command.
    UnimplementedCommand,
    /// `512`: syntax error in command argument.
    SyntaxErrorArgument,
    /// `513`: unrecognized command argument.
    UnrecognizedArgument,
    /// `514`: authentication required.
    AuthenticationRequired,
    /// `515`: bad authentication.
    BadAuthentication,
    /// `550`: unspecified daemon error.
    UnspecifiedTorError,
    /// `551`: internal error.
    InternalError,
    /// `552`: unrecognized entity.
    UnrecognizedEntity,
    /// `553`: invalid configuration value.
    InvalidConfigurationValue,
    /// `554`: invalid descriptor.
    InvalidDescriptor,
    /// `555`: unmanaged entity.
    UnmanagedEntity,
    /// `650`: asynchronous event notification.
    AsyncEventNotification,
}

impl ReplyCode {
    /// Numeric value of the code.
    #[must_use]
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Ok => 250,
            Self::UnnecessaryOperation => 251,
            Self::Exhausted => 451,
            Self::SyntaxError => 500,
            Self::UnrecognizedCommand => 510,
            Self::UnimplementedCommand => 511,
            Self::SyntaxErrorArgument => 512,
            Self::UnrecognizedArgument => 513,
            Self::AuthenticationRequired => 514,
            Self::BadAuthentication => 515,
            Self::UnspecifiedTorError => 550,
            Self::InternalError => 551,
            Self::UnrecognizedEntity => 552,
            Self::InvalidConfigurationValue => 553,
            Self::InvalidDescriptor => 554,
            Self::UnmanagedEntity => 555,
            Self::AsyncEventNotification => 650,
        }
    }

    /// Map a numeric value onto a known code.
    #[must_use]
    pub fn from_u16(value: u16) -> Option<Self> {
        let code = match value {
            250 => Self::Ok,
            251 => Self::UnnecessaryOperation,
            451 => Self::Exhausted,
            500 => Self::SyntaxError,
            510 => Self::UnrecognizedCommand,
            511 => Self::UnimplementedCommand,
            512 => Self::SyntaxErrorArgument,
            513 => Self::UnrecognizedArgument,
            514 => Self::AuthenticationRequired,
            515 => Self::BadAuthentication,
            550 => Self::UnspecifiedTorError,
            551 => Self::InternalError,
            552 => Self::UnrecognizedEntity,
            553 => Self::InvalidConfigurationValue,
            554 => Self::InvalidDescriptor,
            555 => Self::UnmanagedEntity,
            650 => Self::AsyncEventNotification,
            _ => return None,
        };
        Some(code)
    }

    /// Success codes end a command exchange without raising.
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Ok | Self::UnnecessaryOperation)
    }
}

impl FromStr for ReplyCode {
    type Err = AppError;

    /// Parse the three-character status field of a line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Format`] for non-numeric or unknown codes.
    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u16>()
            .ok()
            .and_then(Self::from_u16)
            .ok_or_else(|| AppError::Format(format!("unknown status code '{s}'")))
    }
}

impl Display for ReplyCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

// ── Divider ───────────────────────────────────────────────────────────────────

/// The fourth character of a line, describing the reply's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Divider {
    /// `-`: more lines follow for this reply.
    Dash,
    /// `+`: a raw data block follows, terminated by a lone `.`.
    Plus,
    /// ` `: final (or only) line of the reply.
    Space,
}

impl Divider {
    /// Parse a divider character.
    #[must_use]
    pub fn from_char(ch: char) -> Option<Self> {
        match ch {
            '-' => Some(Self::Dash),
            '+' => Some(Self::Plus),
            ' ' => Some(Self::Space),
            _ => None,
        }
    }

    /// The wire character for this divider.
    #[must_use]
    pub fn as_char(self) -> char {
        match self {
            Self::Dash => '-',
            Self::Plus => '+',
            Self::Space => ' ',
        }
    }
}

// ── ResponseEntry ─────────────────────────────────────────────────────────────

/// One logical protocol line with its derived tokens and pairs.
///
/// Lookups never fail: a missing positional or named field reads as the
/// empty string, because the daemon routinely omits optional fields. The
/// typed accessors (`get_int`, `get_float`, …) turn that sentinel into
/// [`AppError::Protocol`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEntry {
    status: ReplyCode,
    divider: Divider,
    content: String,
    tokens: Vec<String>,
    pairs: HashMap<String, String>,
}

impl ResponseEntry {
    /// Build an entry and derive its tokens and pairs from `content`.
    #[must_use]
    pub fn new(status: ReplyCode, divider: Divider, content: impl Into<String>) -> Self {
        let content = content.into();
        let tokens = tokenizer::tokenize(&content);
        let pairs = tokenizer::pairs(&tokens);
        Self {
            status,
            divider,
            content,
            tokens,
            pairs,
        }
    }

    /// Status code of the line.
    #[must_use]
    pub fn status(&self) -> ReplyCode {
        self.status
    }

    /// Divider of the line.
    #[must_use]
    pub fn divider(&self) -> Divider {
        self.divider
    }

    /// Raw content following the divider.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Quote-aware whitespace tokens of the content.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// `key=value` pairs found in the content.
    #[must_use]
    pub fn pairs(&self) -> &HashMap<String, String> {
        &self.pairs
    }

    /// Look up `@N` (positional) or a pair key; empty string when absent.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        if let Some(index) = key.strip_prefix('@') {
            return index
                .parse::<usize>()
                .ok()
                .and_then(|i| self.tokens.get(i))
                .map_or("", String::as_str);
        }
        self.pairs.get(key).map_or("", String::as_str)
    }

    /// Look up a field that must be present.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the field is absent or empty.
    pub fn get_required(&self, key: &str) -> Result<&str> {
        let value = self.get(key);
        if value.is_empty() {
            return Err(AppError::Protocol(format!(
                "missing field '{key}' in '{}'",
                self.content
            )));
        }
        Ok(value)
    }

    /// Comma-separated list value; empty when the field is absent.
    #[must_use]
    pub fn get_array(&self, key: &str) -> Vec<&str> {
        let value = self.get(key);
        if value.is_empty() {
            return Vec::new();
        }
        value.split(',').collect()
    }

    /// Field value with surrounding quotes removed and escapes resolved.
    #[must_use]
    pub fn get_unquoted(&self, key: &str) -> String {
        tokenizer::unquote(self.get(key))
    }

    /// Parse a required field with [`FromStr`].
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the field is absent or fails to parse.
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> Result<T> {
        let value = self.get_required(key)?;
        value.parse::<T>().map_err(|_| {
            AppError::Protocol(format!(
                "field '{key}' has unparseable value '{value}' for {}",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Required integer field.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when absent or not an integer.
    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.get_parsed(key)
    }

    /// Required floating-point field.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when absent or not a number.
    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.get_parsed(key)
    }

    /// Required enumerated field.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when absent or not a known variant.
    pub fn get_enum<T: FromStr>(&self, key: &str) -> Result<T> {
        self.get_parsed(key)
    }

    /// Required timestamp field in the daemon's `"YYYY-MM-DD HH:MM:SS"` form.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when absent or malformed.
    pub fn get_iso_time(&self, key: &str) -> Result<NaiveDateTime> {
        let raw = tokenizer::unquote(self.get_required(key)?);
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
            .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S"))
            .map_err(|err| {
                AppError::Protocol(format!("field '{key}' is not a timestamp ('{raw}'): {err}"))
            })
    }
}

impl Display for ResponseEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.status, self.divider.as_char(), self.content)
    }
}

// ── Response ──────────────────────────────────────────────────────────────────

/// A non-empty, ordered group of entries forming one reply or one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    entries: Vec<ResponseEntry>,
}

impl Response {
    /// A response consisting of one entry.
    #[must_use]
    pub fn single(entry: ResponseEntry) -> Self {
        Self {
            entries: vec![entry],
        }
    }

    /// Build a response from accumulated entries.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Format`] when `entries` is empty.
    pub fn new(entries: Vec<ResponseEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(AppError::Format("response must contain an entry".into()));
        }
        Ok(Self { entries })
    }

    /// All entries in arrival order.
    #[must_use]
    pub fn entries(&self) -> &[ResponseEntry] {
        &self.entries
    }

    /// The leading entry, which determines how the response is routed.
    #[must_use]
    pub fn first(&self) -> &ResponseEntry {
        &self.entries[0]
    }

    /// The final entry.
    #[must_use]
    pub fn last(&self) -> &ResponseEntry {
        &self.entries[self.entries.len() - 1]
    }

    /// Status code of the leading entry.
    #[must_use]
    pub fn status(&self) -> ReplyCode {
        self.first().status()
    }

    /// Whether the leading entry reports `250 OK`.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status() == ReplyCode::Ok
    }

    /// Whether this response is an asynchronous event notification.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.status() == ReplyCode::AsyncEventNotification
    }

    /// Whether this response closes a logical reply.
    ///
    /// A response ending in a `+` data block is followed on the wire by the
    /// reply's closing status line.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.last().divider() != Divider::Plus
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always `false`; kept for API symmetry with `len`.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, ResponseEntry> {
        self.entries.iter()
    }

    /// Find the first entry whose leading token equals `keyword`.
    #[must_use]
    pub fn entry_starting_with(&self, keyword: &str) -> Option<&ResponseEntry> {
        self.entries.iter().find(|e| e.get("@0") == keyword)
    }

    /// Append the entries of a continuation response.
    pub(crate) fn extend(&mut self, other: Response) {
        self.entries.extend(other.entries);
    }
}

impl std::ops::Index<usize> for Response {
    type Output = ResponseEntry;

    fn index(&self, index: usize) -> &Self::Output {
        &self.entries[index]
    }
}

impl IntoIterator for Response {
    type Item = ResponseEntry;
    type IntoIter = std::vec::IntoIter<ResponseEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Response {
    type Item = &'a ResponseEntry;
    type IntoIter = std::slice::Iter<'a, ResponseEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
