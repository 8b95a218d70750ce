//! Typed views over event entries.
//!
//! Each payload is extracted from the leading entry of an event response
//! using the positional (`@N`) and named lookups of
//! [`ResponseEntry`]. Optional fields come back as `None` when the daemon
//! omitted them; required fields raise [`AppError::Protocol`].

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::protocol::reply::{Response, ResponseEntry};
use crate::protocol::tokenizer;
use crate::AppError;

/// Declare an enumeration whose variants map one-to-one onto wire words.
macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
        pub enum $name {
            $(
                #[doc = concat!("`", $wire, "`")]
                #[serde(rename = $wire)]
                $variant,
            )+
        }

        impl $name {
            /// Wire spelling of the value.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = AppError;

            fn from_str(s: &str) -> Result<Self, AppError> {
                match s {
                    $($wire => Ok(Self::$variant),)+
                    other => Err(AppError::Protocol(format!(
                        concat!("unknown ", stringify!($name), " '{}'"),
                        other
                    ))),
                }
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

wire_enum!(
    /// Circuit status reported by `CIRC`.
    CircStatus {
        Launched => "LAUNCHED",
        Built => "BUILT",
        GuardWait => "GUARD_WAIT",
        Extended => "EXTENDED",
        Failed => "FAILED",
        Closed => "CLOSED",
    }
);

wire_enum!(
    /// Circuit purpose reported by `CIRC`.
    CircPurpose {
        General => "GENERAL",
        HsClientIntro => "HS_CLIENT_INTRO",
        HsClientRend => "HS_CLIENT_REND",
        HsServiceIntro => "HS_SERVICE_INTRO",
        HsServiceRend => "HS_SERVICE_REND",
        Testing => "TESTING",
        Controller => "CONTROLLER",
        MeasureTimeout => "MEASURE_TIMEOUT",
    }
);

wire_enum!(
    /// Stream status reported by `STREAM`.
    StreamStatus {
        New => "NEW",
        NewResolve => "NEWRESOLVE",
        Remap => "REMAP",
        SentConnect => "SENTCONNECT",
        SentResolve => "SENTRESOLVE",
        Succeeded => "SUCCEEDED",
        Failed => "FAILED",
        Closed => "CLOSED",
        Detached => "DETACHED",
        ControllerWait => "CONTROLLER_WAIT",
        XoffSent => "XOFF_SENT",
        XoffReceived => "XOFF_RECV",
        XonSent => "XON_SENT",
        XonReceived => "XON_RECV",
    }
);

wire_enum!(
    /// Relay connection status reported by `ORCONN`.
    OrConnStatus {
        New => "NEW",
        Launched => "LAUNCHED",
        Connected => "CONNECTED",
        Failed => "FAILED",
        Closed => "CLOSED",
    }
);

wire_enum!(
    /// Descriptor action reported by `HS_DESC`.
    HsDescAction {
        Requested => "REQUESTED",
        Upload => "UPLOAD",
        Received => "RECEIVED",
        Uploaded => "UPLOADED",
        Ignore => "IGNORE",
        Failed => "FAILED",
        Created => "CREATED",
    }
);

wire_enum!(
    /// Authentication type reported by `HS_DESC`.
    HsDescAuthType {
        NoAuth => "NO_AUTH",
        BasicAuth => "BASIC_AUTH",
        StealthAuth => "STEALTH_AUTH",
        Unknown => "UNKNOWN",
    }
);

wire_enum!(
    /// Severity of a `STATUS_*` report.
    StatusSeverity {
        Notice => "NOTICE",
        Warn => "WARN",
        Err => "ERR",
    }
);

// ── Payloads ──────────────────────────────────────────────────────────────────

/// `ADDRMAP Address NewAddress Expiry [error=…] [EXPIRES=…] [CACHED=…]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddrMap {
    /// Address that was looked up.
    pub address: String,
    /// Mapped address, or `<error>` when resolution failed.
    pub new_address: String,
    /// Local expiry time; `None` for `NEVER`.
    pub expiry: Option<NaiveDateTime>,
    /// Error code reported for a failed resolution.
    pub error: Option<String>,
    /// UTC expiry time, when reported.
    pub utc_expiry: Option<NaiveDateTime>,
    /// Whether the mapping is cached.
    pub cached: Option<bool>,
}

impl AddrMap {
    /// Whether the daemon failed to resolve the address.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.new_address == "<error>"
    }
}

/// `HS_DESC Action HSAddress AuthType HsDir [DescriptorID] [REASON=…] …`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HsDesc {
    /// What happened to the descriptor.
    pub action: HsDescAction,
    /// Service address without the `.onion` suffix, or `UNKNOWN`.
    pub address: String,
    /// Client authorization type.
    pub auth_type: HsDescAuthType,
    /// Hidden-service directory involved.
    pub directory: String,
    /// Descriptor identifier, when reported.
    pub descriptor_id: Option<String>,
    /// Failure reason for `FAILED` actions.
    pub reason: Option<String>,
    /// Directory index, when reported.
    pub hsdir_index: Option<String>,
}

/// `BW BytesRead BytesWritten`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bandwidth {
    /// Bytes read in the last second.
    pub read: u64,
    /// Bytes written in the last second.
    pub written: u64,
}

/// `CIRC CircuitID CircStatus [Path] [BUILD_FLAGS=…] [PURPOSE=…] [REASON=…]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Circuit {
    /// Circuit identifier.
    pub id: String,
    /// New circuit status.
    pub status: CircStatus,
    /// Relays on the path, in order.
    pub path: Vec<String>,
    /// Build flags.
    pub build_flags: Vec<String>,
    /// Circuit purpose, verbatim.
    pub purpose: Option<String>,
    /// Reason for `FAILED`/`CLOSED`.
    pub reason: Option<String>,
}

impl Circuit {
    /// Purpose as a known [`CircPurpose`]; `None` when absent or newer than this crate.
    #[must_use]
    pub fn purpose_kind(&self) -> Option<CircPurpose> {
        self.purpose.as_deref().and_then(|p| p.parse().ok())
    }
}

/// `STREAM StreamID StreamStatus CircuitID Target [REASON=…] [PURPOSE=…]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamEvent {
    /// Stream identifier.
    pub id: String,
    /// New stream status.
    pub status: StreamStatus,
    /// Circuit the stream is attached to (`0` when unattached).
    pub circuit_id: String,
    /// Target `host:port`.
    pub target: String,
    /// Reason for `FAILED`/`CLOSED`/`DETACHED`.
    pub reason: Option<String>,
    /// Stream purpose.
    pub purpose: Option<String>,
}

/// `ORCONN Target Status [REASON=…] [NCIRCS=…] [ID=…]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrConn {
    /// Relay the connection goes to.
    pub target: String,
    /// New connection status.
    pub status: OrConnStatus,
    /// Reason for `FAILED`/`CLOSED`.
    pub reason: Option<String>,
    /// Number of circuits on the connection.
    pub circuit_count: Option<u32>,
}

/// `GUARD Type Name Status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Guard {
    /// Guard type, usually `ENTRY`.
    pub guard_type: String,
    /// Relay fingerprint and optional nickname.
    pub name: String,
    /// New guard status.
    pub status: String,
}

/// `STATUS_* Severity Action [Arguments]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// Severity of the report.
    pub severity: StatusSeverity,
    /// Status action, e.g. `BOOTSTRAP`.
    pub action: String,
    /// Raw arguments following the action.
    pub arguments: String,
}

/// A daemon log line delivered through `DEBUG`/`INFO`/`NOTICE`/`WARN`/`ERR`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogMessage {
    /// Message text; multi-line for data-block log events.
    pub message: String,
}

/// `CONF_CHANGED` followed by one `Key[=Value]` line per changed option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfChanged {
    /// Changed options; `None` means reset to default.
    pub changes: Vec<(String, Option<String>)>,
}

/// Kind-specific data carried by an [`Event`](crate::events::Event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// `ADDRMAP`.
    AddrMap(AddrMap),
    /// `HS_DESC`.
    HsDesc(HsDesc),
    /// `BW`.
    Bandwidth(Bandwidth),
    /// `CIRC`.
    Circuit(Circuit),
    /// `STREAM`.
    Stream(StreamEvent),
    /// `ORCONN`.
    OrConn(OrConn),
    /// `GUARD`.
    Guard(Guard),
    /// `SIGNAL`.
    Signal {
        /// Signal name.
        name: String,
    },
    /// `NETWORK_LIVENESS`.
    NetworkLiveness {
        /// `true` for `UP`.
        up: bool,
    },
    /// Log kinds.
    Log(LogMessage),
    /// `STATUS_CLIENT`, `STATUS_GENERAL`, `STATUS_SERVER`.
    Status(StatusReport),
    /// `CONF_CHANGED`.
    ConfChanged(ConfChanged),
    /// Kinds whose fields are read through the generic entry lookups.
    Untyped,
}

// ── Extraction ────────────────────────────────────────────────────────────────

/// Named or positional field that may legitimately be missing.
fn optional(entry: &ResponseEntry, key: &str) -> Option<String> {
    let value = entry.get(key);
    (!value.is_empty()).then(|| value.to_owned())
}

/// Positional token at `index` unless it is a `key=value` pair.
fn optional_positional(entry: &ResponseEntry, index: usize) -> Option<String> {
    entry
        .tokens()
        .get(index)
        .filter(|t| !t.contains('='))
        .cloned()
}

/// Text following the leading event-kind token.
fn after_kind(content: &str) -> &str {
    content
        .split_once([' ', '\n'])
        .map_or("", |(_, rest)| rest)
        .trim_start_matches(' ')
}

pub(crate) fn parse_addr_map(entry: &ResponseEntry) -> Result<AddrMap, AppError> {
    let expiry = match entry.get("@3") {
        "" | "NEVER" => None,
        _ => Some(entry.get_iso_time("@3")?),
    };
    let utc_expiry = match entry.get("EXPIRES") {
        "" | "\"NEVER\"" | "NEVER" => None,
        _ => Some(entry.get_iso_time("EXPIRES")?),
    };
    let cached = match entry.get_unquoted("CACHED").as_str() {
        "YES" => Some(true),
        "NO" => Some(false),
        _ => None,
    };
    Ok(AddrMap {
        address: entry.get_required("@1")?.to_owned(),
        new_address: entry.get_required("@2")?.to_owned(),
        expiry,
        error: optional(entry, "error").or_else(|| optional(entry, "ERROR")),
        utc_expiry,
        cached,
    })
}

pub(crate) fn parse_hs_desc(entry: &ResponseEntry) -> Result<HsDesc, AppError> {
    Ok(HsDesc {
        action: entry.get_enum("@1")?,
        address: entry.get_required("@2")?.to_owned(),
        auth_type: entry.get_enum("@3")?,
        directory: entry.get_required("@4")?.to_owned(),
        descriptor_id: optional_positional(entry, 5),
        reason: optional(entry, "REASON"),
        hsdir_index: optional(entry, "HSDIR_INDEX"),
    })
}

pub(crate) fn parse_bandwidth(entry: &ResponseEntry) -> Result<Bandwidth, AppError> {
    Ok(Bandwidth {
        read: entry.get_parsed("@1")?,
        written: entry.get_parsed("@2")?,
    })
}

pub(crate) fn parse_circuit(entry: &ResponseEntry) -> Result<Circuit, AppError> {
    let path = optional_positional(entry, 3)
        .map(|p| p.split(',').map(str::to_owned).collect())
        .unwrap_or_default();
    Ok(Circuit {
        id: entry.get_required("@1")?.to_owned(),
        status: entry.get_enum("@2")?,
        path,
        build_flags: entry
            .get_array("BUILD_FLAGS")
            .into_iter()
            .map(str::to_owned)
            .collect(),
        purpose: optional(entry, "PURPOSE"),
        reason: optional(entry, "REASON"),
    })
}

pub(crate) fn parse_stream(entry: &ResponseEntry) -> Result<StreamEvent, AppError> {
    Ok(StreamEvent {
        id: entry.get_required("@1")?.to_owned(),
        status: entry.get_enum("@2")?,
        circuit_id: entry.get_required("@3")?.to_owned(),
        target: entry.get_required("@4")?.to_owned(),
        reason: optional(entry, "REASON"),
        purpose: optional(entry, "PURPOSE"),
    })
}

pub(crate) fn parse_or_conn(entry: &ResponseEntry) -> Result<OrConn, AppError> {
    let circuit_count = match entry.get("NCIRCS") {
        "" => None,
        _ => Some(entry.get_parsed("NCIRCS")?),
    };
    Ok(OrConn {
        target: entry.get_required("@1")?.to_owned(),
        status: entry.get_enum("@2")?,
        reason: optional(entry, "REASON"),
        circuit_count,
    })
}

pub(crate) fn parse_guard(entry: &ResponseEntry) -> Result<Guard, AppError> {
    Ok(Guard {
        guard_type: entry.get_required("@1")?.to_owned(),
        name: entry.get_required("@2")?.to_owned(),
        status: entry.get_required("@3")?.to_owned(),
    })
}

pub(crate) fn parse_status(entry: &ResponseEntry) -> Result<StatusReport, AppError> {
    let rest = after_kind(entry.content());
    let arguments = rest
        .split_once(' ')
        .and_then(|(_, after_severity)| after_severity.trim_start().split_once(' '))
        .map_or("", |(_, args)| args.trim_start());
    Ok(StatusReport {
        severity: entry.get_enum("@1")?,
        action: entry.get_required("@2")?.to_owned(),
        arguments: arguments.to_owned(),
    })
}

pub(crate) fn parse_log(entry: &ResponseEntry) -> LogMessage {
    LogMessage {
        message: after_kind(entry.content()).to_owned(),
    }
}

pub(crate) fn parse_conf_changed(response: &Response) -> ConfChanged {
    let changes = response
        .iter()
        .skip(1)
        .filter(|e| e.content() != "OK")
        .map(|e| match e.content().split_once('=') {
            Some((key, value)) => (key.to_owned(), Some(tokenizer::unquote(value))),
            None => (e.content().to_owned(), None),
        })
        .collect();
    ConfChanged { changes }
}

pub(crate) fn parse_network_liveness(entry: &ResponseEntry) -> Result<bool, AppError> {
    match entry.get_required("@1")? {
        "UP" => Ok(true),
        "DOWN" => Ok(false),
        other => Err(AppError::Protocol(format!(
            "unknown network liveness '{other}'"
        ))),
    }
}
