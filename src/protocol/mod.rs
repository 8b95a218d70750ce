//! Control-protocol wire handling.
//!
//! Lines on the wire have the shape `code(3) divider content`, terminated by
//! `\r\n` or `\n`. This module turns those lines into typed replies and
//! formats outbound commands.
//!
//! Submodules:
//! - `tokenizer`: quote-aware splitting of content into tokens and pairs.
//! - `reply`: [`ReplyCode`](reply::ReplyCode), [`ResponseEntry`](reply::ResponseEntry),
//!   and [`Response`](reply::Response).
//! - `codec`: [`LinesCodec`](tokio_util::codec::LinesCodec)-based line framing.
//! - `reader`: the read cycle that groups lines into responses.
//! - `command`: command names and outbound line formatting.

pub mod codec;
pub mod command;
pub mod reader;
pub mod reply;
pub mod tokenizer;
