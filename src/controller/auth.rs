//! `PROTOCOLINFO` discovery and `AUTHENTICATE`.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;

use tracing::{debug, info};

use crate::controller::Controller;
use crate::protocol::command::Command;
use crate::protocol::reply::Response;
use crate::protocol::tokenizer;
use crate::{AppError, Result};

/// Authentication method advertised by the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMethod {
    /// No authentication required.
    Null,
    /// Password hashed in the daemon's configuration.
    HashedPassword,
    /// Contents of the cookie file, hex encoded.
    Cookie,
    /// HMAC challenge over the cookie; not negotiated by this client.
    SafeCookie,
}

impl FromStr for AuthMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NULL" => Ok(Self::Null),
            "HASHEDPASSWORD" => Ok(Self::HashedPassword),
            "COOKIE" => Ok(Self::Cookie),
            "SAFECOOKIE" => Ok(Self::SafeCookie),
            other => Err(AppError::Protocol(format!("unknown auth method '{other}'"))),
        }
    }
}

/// Parsed `PROTOCOLINFO` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtocolInfo {
    /// Methods the daemon accepts; unknown methods are skipped.
    pub methods: Vec<AuthMethod>,
    /// Cookie file for [`AuthMethod::Cookie`].
    pub cookie_file: Option<PathBuf>,
    /// Daemon version string.
    pub version: Option<String>,
}

impl ProtocolInfo {
    /// Extract the `AUTH` and `VERSION` lines from a reply.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when the `AUTH` line is missing.
    pub fn from_reply(reply: &Response) -> Result<Self> {
        let auth = reply
            .entry_starting_with("AUTH")
            .ok_or_else(|| AppError::Protocol("PROTOCOLINFO reply lacks AUTH line".into()))?;

        let methods = auth
            .get_array("METHODS")
            .into_iter()
            .filter_map(|m| match m.parse() {
                Ok(method) => Some(method),
                Err(_) => {
                    debug!(method = m, "skipping unknown auth method");
                    None
                }
            })
            .collect();
        let cookie_file = Some(auth.get_unquoted("COOKIEFILE"))
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let version = reply
            .entry_starting_with("VERSION")
            .map(|e| e.get_unquoted("Tor"))
            .filter(|v| !v.is_empty());

        Ok(Self {
            methods,
            cookie_file,
            version,
        })
    }

    /// Pick the method to use: password when one is supplied and accepted,
    /// then cookie, then none.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] when no usable method is offered.
    pub fn choose(&self, have_password: bool) -> Result<AuthMethod> {
        let offered = |m| self.methods.contains(&m);
        if have_password && offered(AuthMethod::HashedPassword) {
            Ok(AuthMethod::HashedPassword)
        } else if offered(AuthMethod::Cookie) && self.cookie_file.is_some() {
            Ok(AuthMethod::Cookie)
        } else if offered(AuthMethod::Null) {
            Ok(AuthMethod::Null)
        } else if offered(AuthMethod::HashedPassword) {
            Err(AppError::Auth("daemon requires a password".into()))
        } else {
            Err(AppError::Auth(format!(
                "no supported authentication method among {:?}",
                self.methods
            )))
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02X}");
    }
    hex
}

impl Controller {
    /// Query the daemon's protocol information.
    ///
    /// # Errors
    ///
    /// Propagates command failures; see [`ProtocolInfo::from_reply`].
    pub async fn protocol_info(&self) -> Result<ProtocolInfo> {
        let reply = self.send_command(Command::ProtocolInfo, Some("1")).await?;
        ProtocolInfo::from_reply(&reply)
    }

    /// Negotiate and perform authentication.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Auth`] when no method applies, the cookie file
    /// cannot be read, or the daemon rejects the credentials.
    pub async fn authenticate(&self, password: Option<&str>) -> Result<AuthMethod> {
        let info = self.protocol_info().await?;
        let method = info.choose(password.is_some())?;

        let credential = match method {
            AuthMethod::HashedPassword => Some(tokenizer::quote(password.unwrap_or_default())),
            AuthMethod::Cookie => {
                let path = info.cookie_file.as_deref().ok_or_else(|| {
                    AppError::Auth("cookie authentication offered without a cookie file".into())
                })?;
                let cookie = tokio::fs::read(path).await.map_err(|err| {
                    AppError::Auth(format!("cannot read cookie file {}: {err}", path.display()))
                })?;
                Some(hex_encode(&cookie))
            }
            AuthMethod::Null | AuthMethod::SafeCookie => None,
        };

        match self
            .send_command(Command::Authenticate, credential.as_deref())
            .await
        {
            Ok(_) => {
                info!(?method, "authenticated to control port");
                Ok(method)
            }
            Err(AppError::Command { code, message }) => Err(AppError::Auth(format!(
                "daemon rejected credentials ({code}): {message}"
            ))),
            Err(err) => Err(err),
        }
    }
}
