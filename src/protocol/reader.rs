//! Wire engine: assembles protocol lines into [`Response`]s.
//!
//! Each call to [`ReplyReader::receive`] runs one read cycle:
//!
//! | First line divider | Behaviour                                              |
//! |--------------------|--------------------------------------------------------|
//! | ` `                | standalone reply, emitted immediately                  |
//! | `-`                | accumulate until a ` ` line closes the reply           |
//! | `+`                | read raw lines until a lone `.`, emit one data entry   |
//!
//! A `+` line reached after `-` lines closes the cycle too; the data entry
//! is appended after the accumulated lines.
//!
//! The end of the stream is always a [`AppError::Format`] ("received empty
//! socket content"), whether it happens between replies or in the middle of
//! one. An empty *line* is ordinary data inside a `+` block.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio_util::codec::FramedRead;
use tracing::trace;

use crate::protocol::codec::ControlCodec;
use crate::protocol::reply::{Divider, ReplyCode, Response, ResponseEntry};
use crate::{AppError, Result};

/// Message used when the transport reaches EOF.
pub const EMPTY_CONTENT: &str = "received empty socket content";

/// Message used when a line does not start with `code divider`.
pub const MALFORMED_BEGINNING: &str = "badly formatted reply line: beginning is malformed";

/// Line that terminates a `+` data block.
const DATA_TERMINATOR: &str = ".";

/// Reads [`Response`]s from the read half of a control connection.
#[derive(Debug)]
pub struct ReplyReader<R> {
    lines: FramedRead<R, ControlCodec>,
}

impl<R> ReplyReader<R>
where
    R: AsyncRead + Unpin,
{
    /// Wrap the read half of a transport.
    pub fn new(reader: R) -> Self {
        Self {
            lines: FramedRead::new(reader, ControlCodec::new()),
        }
    }

    /// Read exactly one [`Response`] from the transport.
    ///
    /// # Errors
    ///
    /// - [`AppError::Format`] with [`EMPTY_CONTENT`] when the stream ends.
    /// - [`AppError::Format`] with [`MALFORMED_BEGINNING`] when a line does
    ///   not match `code(3 alnum) divider content`.
    /// - [`AppError::Format`] when the status code is unknown or a line
    ///   exceeds the codec limit.
    /// - [`AppError::Io`] on transport failures.
    pub async fn receive(&mut self) -> Result<Response> {
        let mut accumulated: Vec<ResponseEntry> = Vec::new();

        loop {
            let line = self.next_line().await?;
            let (status, divider, content) = parse_line(&line)?;

            match divider {
                Divider::Space => {
                    let entry = ResponseEntry::new(status, divider, content);
                    if accumulated.is_empty() {
                        return Ok(Response::single(entry));
                    }
                    accumulated.push(entry);
                    return Response::new(accumulated);
                }
                Divider::Dash => {
                    accumulated.push(ResponseEntry::new(status, divider, content));
                }
                Divider::Plus => {
                    let block = self.read_data_block(content).await?;
                    accumulated.push(ResponseEntry::new(status, divider, block));
                    return Response::new(accumulated);
                }
            }
        }
    }

    /// Collect raw lines up to the `.` terminator, joined by `\n`.
    async fn read_data_block(&mut self, first: &str) -> Result<String> {
        let mut block = String::from(first);
        loop {
            let line = self.next_line().await?;
            if line == DATA_TERMINATOR {
                return Ok(block);
            }
            block.push('\n');
            block.push_str(&line);
        }
    }

    async fn next_line(&mut self) -> Result<String> {
        match self.lines.next().await {
            Some(Ok(line)) => {
                trace!(line = %line, "control reader: line received");
                Ok(line)
            }
            Some(Err(err)) => Err(err),
            None => Err(AppError::Format(EMPTY_CONTENT.into())),
        }
    }
}

/// Split a line into status code, divider, and content.
///
/// # Errors
///
/// Returns [`AppError::Format`] when the line is shorter than four bytes,
/// its first three characters are not ASCII alphanumerics, its fourth is not
/// a divider, or the status code is unknown.
pub fn parse_line(line: &str) -> Result<(ReplyCode, Divider, &str)> {
    let bytes = line.as_bytes();
    let well_formed = bytes.len() >= 4
        && bytes[..3].iter().all(u8::is_ascii_alphanumeric)
        && matches!(bytes[3], b'-' | b'+' | b' ');
    if !well_formed {
        return Err(AppError::Format(MALFORMED_BEGINNING.into()));
    }

    let status: ReplyCode = line[..3].parse()?;
    let divider = Divider::from_char(char::from(bytes[3]))
        .ok_or_else(|| AppError::Format(MALFORMED_BEGINNING.into()))?;
    Ok((status, divider, &line[4..]))
}
