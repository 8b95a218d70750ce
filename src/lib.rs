#![forbid(unsafe_code)]

//! `torino`: async client for the Tor control protocol.
//!
//! - [`protocol`]: tokenizer, reply model, line codec, wire engine, commands.
//! - [`events`]: event kinds, typed payloads, classification.
//! - [`controller`]: connection, dispatch, command correlation,
//!   subscriptions, and the derived resolve / publication waits.
//! - [`launcher`]: starting a daemon and following its bootstrap.

pub mod config;
pub mod controller;
pub mod errors;
pub mod events;
pub mod launcher;
pub mod protocol;

pub use config::TorinoConfig;
pub use controller::Controller;
pub use errors::{AppError, Result};
pub use events::{Event, EventKind, EventPayload};
