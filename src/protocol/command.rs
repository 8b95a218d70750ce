//! Outbound command names and line formatting.

use std::fmt::{Display, Formatter};

use crate::{AppError, Result};

/// Control-port commands understood by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// `SETCONF`
    SetConf,
    /// `RESETCONF`
    ResetConf,
    /// `GETCONF`
    GetConf,
    /// `SETEVENTS`
    SetEvents,
    /// `AUTHENTICATE`
    Authenticate,
    /// `SAVECONF`
    SaveConf,
    /// `SIGNAL`
    Signal,
    /// `MAPADDRESS`
    MapAddress,
    /// `GETINFO`
    GetInfo,
    /// `EXTENDCIRCUIT`
    ExtendCircuit,
    /// `SETCIRCUITPURPOSE`
    SetCircuitPurpose,
    /// `ATTACHSTREAM`
    AttachStream,
    /// `REDIRECTSTREAM`
    RedirectStream,
    /// `CLOSESTREAM`
    CloseStream,
    /// `CLOSECIRCUIT`
    CloseCircuit,
    /// `QUIT`
    Quit,
    /// `USEFEATURE`
    UseFeature,
    /// `RESOLVE`
    Resolve,
    /// `PROTOCOLINFO`
    ProtocolInfo,
    /// `LOADCONF`
    LoadConf,
    /// `TAKEOWNERSHIP`
    TakeOwnership,
    /// `DROPGUARDS`
    DropGuards,
    /// `HSFETCH`
    HsFetch,
    /// `ADD_ONION`
    AddOnion,
    /// `DEL_ONION`
    DelOnion,
    /// `DROPOWNERSHIP`
    DropOwnership,
}

impl Command {
    /// Wire name of the command.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetConf => "SETCONF",
            Self::ResetConf => "RESETCONF",
            Self::GetConf => "GETCONF",
            Self::SetEvents => "SETEVENTS",
            Self::Authenticate => "AUTHENTICATE",
            Self::SaveConf => "SAVECONF",
            Self::Signal => "SIGNAL",
            Self::MapAddress => "MAPADDRESS",
            Self::GetInfo => "GETINFO",
            Self::ExtendCircuit => "EXTENDCIRCUIT",
            Self::SetCircuitPurpose => "SETCIRCUITPURPOSE",
            Self::AttachStream => "ATTACHSTREAM",
            Self::RedirectStream => "REDIRECTSTREAM",
            Self::CloseStream => "CLOSESTREAM",
            Self::CloseCircuit => "CLOSECIRCUIT",
            Self::Quit => "QUIT",
            Self::UseFeature => "USEFEATURE",
            Self::Resolve => "RESOLVE",
            Self::ProtocolInfo => "PROTOCOLINFO",
            Self::LoadConf => "LOADCONF",
            Self::TakeOwnership => "TAKEOWNERSHIP",
            Self::DropGuards => "DROPGUARDS",
            Self::HsFetch => "HSFETCH",
            Self::AddOnion => "ADD_ONION",
            Self::DelOnion => "DEL_ONION",
            Self::DropOwnership => "DROPOWNERSHIP",
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the command line `NAME[ args]` without its `\r\n` terminator.
///
/// Empty or whitespace-only arguments are omitted.
///
/// # Errors
///
/// Returns [`AppError::Protocol`] when `args` contains a line break, which
/// would split the command into two on the wire.
pub fn format_command(command: Command, args: Option<&str>) -> Result<String> {
    match args.map(str::trim).filter(|a| !a.is_empty()) {
        None => Ok(command.as_str().to_owned()),
        Some(args) => {
            if args.contains(['\r', '\n']) {
                return Err(AppError::Protocol(format!(
                    "arguments for {command} must not contain line breaks"
                )));
            }
            Ok(format!("{command} {args}"))
        }
    }
}
