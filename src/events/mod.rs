//! Event classification.
//!
//! [`classify`] turns an asynchronous [`Response`] into an [`Event`]: the
//! kind is read from the leading token of the first entry and, for kinds
//! with a modelled shape, the fields are extracted into an
//! [`EventPayload`]. Classification is a pure function and never touches
//! connection state.

pub mod kind;
pub mod payload;

use serde::Serialize;

pub use kind::EventKind;
pub use payload::EventPayload;

use crate::protocol::reply::{Response, ResponseEntry};
use crate::{AppError, Result};

/// A classified asynchronous notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    kind: EventKind,
    #[serde(skip)]
    response: Response,
    payload: EventPayload,
}

impl Event {
    /// The event's kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// The leading entry, holding the kind token and the event fields.
    #[must_use]
    pub fn entry(&self) -> &ResponseEntry {
        self.response.first()
    }

    /// The full response the event was built from.
    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    /// Kind-specific typed fields.
    #[must_use]
    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Raw content of the leading entry.
    #[must_use]
    pub fn raw(&self) -> &str {
        self.entry().content()
    }

    /// Positional (`@N`) or named field of the leading entry.
    #[must_use]
    pub fn get(&self, key: &str) -> &str {
        self.entry().get(key)
    }
}

/// Classify an asynchronous response into an [`Event`].
///
/// # Errors
///
/// Returns [`AppError::Protocol`] when the response is not asynchronous,
/// when its leading token is not a known event kind, or when a modelled
/// field of a known kind is missing or malformed.
pub fn classify(response: &Response) -> Result<Event> {
    if !response.is_async() {
        return Err(AppError::Protocol(format!(
            "cannot classify non-event reply with status {}",
            response.status()
        )));
    }

    let kind: EventKind = kind_token(response.first().content()).parse()?;
    let payload = extract(kind, response)?;

    Ok(Event {
        kind,
        response: response.clone(),
        payload,
    })
}

/// Leading word of the first physical line; data-block events carry their
/// body after a line break.
fn kind_token(content: &str) -> &str {
    content.split([' ', '\n']).next().unwrap_or_default()
}

fn extract(kind: EventKind, response: &Response) -> Result<EventPayload> {
    let entry = response.first();
    let payload = match kind {
        EventKind::AddrMap => EventPayload::AddrMap(payload::parse_addr_map(entry)?),
        EventKind::HsDesc => EventPayload::HsDesc(payload::parse_hs_desc(entry)?),
        EventKind::Bw => EventPayload::Bandwidth(payload::parse_bandwidth(entry)?),
        EventKind::Circ => EventPayload::Circuit(payload::parse_circuit(entry)?),
        EventKind::Stream => EventPayload::Stream(payload::parse_stream(entry)?),
        EventKind::OrConn => EventPayload::OrConn(payload::parse_or_conn(entry)?),
        EventKind::Guard => EventPayload::Guard(payload::parse_guard(entry)?),
        EventKind::Signal => EventPayload::Signal {
            name: entry.get_required("@1")?.to_owned(),
        },
        EventKind::NetworkLiveness => EventPayload::NetworkLiveness {
            up: payload::parse_network_liveness(entry)?,
        },
        EventKind::ConfChanged => EventPayload::ConfChanged(payload::parse_conf_changed(response)),
        k if k.is_log() => EventPayload::Log(payload::parse_log(entry)),
        k if k.is_status() => EventPayload::Status(payload::parse_status(entry)?),
        _ => EventPayload::Untyped,
    };
    Ok(payload)
}
