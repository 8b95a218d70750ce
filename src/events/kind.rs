//! Event kind taxonomy.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::Serialize;

use crate::AppError;

/// Symbolic tag of an asynchronous event notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "&'static str")]
pub enum EventKind {
    /// `ADDRMAP`: address mapping added or resolved.
    AddrMap,
    /// `AUTHDIR_NEWDESCS`: new descriptors accepted by an authority.
    AuthDirNewDescs,
    /// `BUILDTIMEOUT_SET`: circuit build timeout changed.
    BuildTimeoutSet,
    /// `BW`: bandwidth used in the last second.
    Bw,
    /// `CIRC`: circuit status changed.
    Circ,
    /// `CIRC_MINOR`: minor circuit event.
    CircMinor,
    /// `CLIENTS_SEEN`: bridge client statistics.
    ClientsSeen,
    /// `CONF_CHANGED`: configuration changed.
    ConfChanged,
    /// `DEBUG`: debug-level log message.
    Debug,
    /// `DESCCHANGED`: our descriptor changed.
    DescChanged,
    /// `ERR`: error-level log message.
    Err,
    /// `GUARD`: entry guard status changed.
    Guard,
    /// `INFO`: info-level log message.
    Info,
    /// `NEWCONSENSUS`: new consensus available.
    NewConsensus,
    /// `NEWDESC`: new descriptors available.
    NewDesc,
    /// `NOTICE`: notice-level log message.
    Notice,
    /// `NS`: network status changed.
    Ns,
    /// `ORCONN`: relay connection status changed.
    OrConn,
    /// `SIGNAL`: signal received.
    Signal,
    /// `STATUS_CLIENT`: client status report.
    StatusClient,
    /// `STATUS_GENERAL`: general status report.
    StatusGeneral,
    /// `STATUS_SERVER`: server status report. `STATUS_SEVER` is accepted as an alias.
    StatusServer,
    /// `STREAM`: stream status changed.
    Stream,
    /// `STREAM_BW`: stream bandwidth.
    StreamBw,
    /// `WARN`: warning-level log message.
    Warn,
    /// `TRANSPORT_LAUNCHED`: pluggable transport launched.
    TransportLaunched,
    /// `CONN_BW`: connection bandwidth.
    ConnBw,
    /// `CIRC_BW`: circuit bandwidth.
    CircBw,
    /// `CELL_STATS`: cell statistics.
    CellStats,
    /// `TB_EMPTY`: token bucket emptied.
    TbEmpty,
    /// `HS_DESC`: hidden-service descriptor activity.
    HsDesc,
    /// `HS_DESC_CONTENT`: hidden-service descriptor content.
    HsDescContent,
    /// `NETWORK_LIVENESS`: network reachability changed.
    NetworkLiveness,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 33] = [
        Self::AddrMap,
        Self::AuthDirNewDescs,
        Self::BuildTimeoutSet,
        Self::Bw,
        Self::Circ,
        Self::CircMinor,
        Self::ClientsSeen,
        Self::ConfChanged,
        Self::Debug,
        Self::DescChanged,
        Self::Err,
        Self::Guard,
        Self::Info,
        Self::NewConsensus,
        Self::NewDesc,
        Self::Notice,
        Self::Ns,
        Self::OrConn,
        Self::Signal,
        Self::StatusClient,
        Self::StatusGeneral,
        Self::StatusServer,
        Self::Stream,
        Self::StreamBw,
        Self::Warn,
        Self::TransportLaunched,
        Self::ConnBw,
        Self::CircBw,
        Self::CellStats,
        Self::TbEmpty,
        Self::HsDesc,
        Self::HsDescContent,
        Self::NetworkLiveness,
    ];

    /// Canonical wire name, as sent in `SETEVENTS`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AddrMap => "ADDRMAP",
            Self::AuthDirNewDescs => "AUTHDIR_NEWDESCS",
            Self::BuildTimeoutSet => "BUILDTIMEOUT_SET",
            Self::Bw => "BW",
            Self::Circ => "CIRC",
            Self::CircMinor => "CIRC_MINOR",
            Self::ClientsSeen => "CLIENTS_SEEN",
            Self::ConfChanged => "CONF_CHANGED",
            Self::Debug => "DEBUG",
            Self::DescChanged => "DESCCHANGED",
            Self::Err => "ERR",
            Self::Guard => "GUARD",
            Self::Info => "INFO",
            Self::NewConsensus => "NEWCONSENSUS",
            Self::NewDesc => "NEWDESC",
            Self::Notice => "NOTICE",
            Self::Ns => "NS",
            Self::OrConn => "ORCONN",
            Self::Signal => "SIGNAL",
            Self::StatusClient => "STATUS_CLIENT",
            Self::StatusGeneral => "STATUS_GENERAL",
            Self::StatusServer => "STATUS_SERVER",
            Self::Stream => "STREAM",
            Self::StreamBw => "STREAM_BW",
            Self::Warn => "WARN",
            Self::TransportLaunched => "TRANSPORT_LAUNCHED",
            Self::ConnBw => "CONN_BW",
            Self::CircBw => "CIRC_BW",
            Self::CellStats => "CELL_STATS",
            Self::TbEmpty => "TB_EMPTY",
            Self::HsDesc => "HS_DESC",
            Self::HsDescContent => "HS_DESC_CONTENT",
            Self::NetworkLiveness => "NETWORK_LIVENESS",
        }
    }

    /// Whether this kind carries a daemon log line.
    #[must_use]
    pub fn is_log(self) -> bool {
        matches!(
            self,
            Self::Debug | Self::Info | Self::Notice | Self::Warn | Self::Err
        )
    }

    /// Whether this kind carries a `STATUS_*` report.
    #[must_use]
    pub fn is_status(self) -> bool {
        matches!(
            self,
            Self::StatusClient | Self::StatusGeneral | Self::StatusServer
        )
    }
}

impl FromStr for EventKind {
    type Err = AppError;

    /// Parse a wire name; deprecated spellings map onto their canonical kind.
    fn from_str(s: &str) -> Result<Self, AppError> {
        if s == "STATUS_SEVER" {
            return Ok(Self::StatusServer);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AppError::Protocol(format!("unrecognized event kind '{s}'")))
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<EventKind> for &'static str {
    fn from(kind: EventKind) -> Self {
        kind.as_str()
    }
}
