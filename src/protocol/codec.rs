//! Line codec for the control-port byte stream.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a configurable maximum line
//! length so a misbehaving peer cannot make the reader allocate without
//! bound. Inbound lines may be terminated by `\r\n` or `\n`; the terminator
//! is stripped. Outbound lines are always terminated by `\r\n`.
//!
//! # Usage
//!
//! ```rust,ignore
//! use tokio_util::codec::{FramedRead, FramedWrite};
//! use torino::protocol::codec::ControlCodec;
//!
//! let (read_half, write_half) = tokio::io::split(stream);
//! let lines = FramedRead::new(read_half, ControlCodec::new());
//! let commands = FramedWrite::new(write_half, ControlCodec::new());
//! ```

use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum inbound line length accepted by the codec: 1 MiB.
///
/// This bounds a single physical line. Data blocks introduced by a `+`
/// divider span many lines and are not limited as a whole.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Line codec for the control protocol.
#[derive(Debug)]
pub struct ControlCodec(LinesCodec);

impl ControlCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for ControlCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for ControlCodec {
    type Item = String;
    type Error = AppError;

    /// Decode the next line from `src`, or `Ok(None)` while buffering.
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    /// Decode the final, possibly unterminated, line at EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for ControlCodec {
    type Error = AppError;

    /// Encode `item` followed by `\r\n`.
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.len() + 2);
        dst.put(item.as_bytes());
        dst.put_slice(b"\r\n");
        Ok(())
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Format(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
