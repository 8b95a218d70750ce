//! Hidden services: `ADD_ONION`, `DEL_ONION`, and publication tracking.

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::controller::waiter::{ConfirmationSet, Step};
use crate::controller::Controller;
use crate::events::payload::{HsDesc, HsDescAction};
use crate::events::{EventKind, EventPayload};
use crate::protocol::command::Command;
use crate::protocol::reply::Response;
use crate::{AppError, Result};

/// Key algorithm requested when the daemon generates a new key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyBlob {
    /// Let the daemon pick its preferred algorithm.
    Best,
    /// Legacy 1024-bit RSA.
    Rsa1024,
    /// Ed25519 (v3 services).
    Ed25519V3,
}

impl KeyBlob {
    fn as_str(self) -> &'static str {
        match self {
            Self::Best => "BEST",
            Self::Rsa1024 => "RSA1024",
            Self::Ed25519V3 => "ED25519-V3",
        }
    }
}

/// Service key: generated by the daemon or supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnionKey {
    /// `NEW:<blob>`
    New(KeyBlob),
    /// `RSA1024:<base64 key>`
    Rsa1024(String),
    /// `ED25519-V3:<base64 key>`
    Ed25519V3(String),
}

impl Display for OnionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New(blob) => write!(f, "NEW:{}", blob.as_str()),
            Self::Rsa1024(key) => write!(f, "RSA1024:{key}"),
            Self::Ed25519V3(key) => write!(f, "ED25519-V3:{key}"),
        }
    }
}

/// `ADD_ONION` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnionFlag {
    /// Do not return the generated private key.
    DiscardPk,
    /// Keep the service after this control connection closes.
    Detach,
}

impl OnionFlag {
    fn as_str(self) -> &'static str {
        match self {
            Self::DiscardPk => "DiscardPK",
            Self::Detach => "Detach",
        }
    }
}

/// One `Port=` argument: a virtual port and an optional local target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    /// Port advertised by the service.
    pub virtual_port: u16,
    /// `host:port` or `unix:path`; `None` forwards to the same local port.
    pub target: Option<String>,
}

impl Display for PortMapping {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.target {
            Some(target) => write!(f, "Port={},{target}", self.virtual_port),
            None => write!(f, "Port={}", self.virtual_port),
        }
    }
}

/// Parameters of an `ADD_ONION` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnionRequest {
    key: OnionKey,
    flags: Vec<OnionFlag>,
    ports: Vec<PortMapping>,
    max_streams: Option<u16>,
}

impl OnionRequest {
    /// Start a request for `key` with no ports.
    #[must_use]
    pub fn new(key: OnionKey) -> Self {
        Self {
            key,
            flags: Vec::new(),
            ports: Vec::new(),
            max_streams: None,
        }
    }

    /// Map `virtual_port` to the same port on the local host.
    #[must_use]
    pub fn port(mut self, virtual_port: u16) -> Self {
        self.ports.push(PortMapping {
            virtual_port,
            target: None,
        });
        self
    }

    /// Map `virtual_port` to `target`.
    #[must_use]
    pub fn port_to(mut self, virtual_port: u16, target: impl Into<String>) -> Self {
        self.ports.push(PortMapping {
            virtual_port,
            target: Some(target.into()),
        });
        self
    }

    /// Add a flag; duplicates are ignored.
    #[must_use]
    pub fn flag(mut self, flag: OnionFlag) -> Self {
        if !self.flags.contains(&flag) {
            self.flags.push(flag);
        }
        self
    }

    /// Limit concurrent streams per rendezvous circuit.
    #[must_use]
    pub fn max_streams(mut self, max: u16) -> Self {
        self.max_streams = Some(max);
        self
    }

    /// Arguments of the `ADD_ONION` line.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Protocol`] when no port is mapped or a target
    /// contains whitespace.
    pub fn to_args(&self) -> Result<String> {
        if self.ports.is_empty() {
            return Err(AppError::Protocol(
                "hidden service needs at least one port mapping".into(),
            ));
        }
        if let Some(bad) = self
            .ports
            .iter()
            .filter_map(|p| p.target.as_deref())
            .find(|t| t.contains(char::is_whitespace))
        {
            return Err(AppError::Protocol(format!(
                "port target '{bad}' must not contain whitespace"
            )));
        }

        let mut args = vec![self.key.to_string()];
        if !self.flags.is_empty() {
            let flags: Vec<&str> = self.flags.iter().map(|f| f.as_str()).collect();
            args.push(format!("Flags={}", flags.join(",")));
        }
        if let Some(max) = self.max_streams {
            args.push(format!("MaxStreams={max}"));
        }
        args.extend(self.ports.iter().map(ToString::to_string));
        Ok(args.join(" "))
    }
}

/// A service created by `ADD_ONION`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HiddenService {
    /// Service address without the `.onion` suffix.
    pub service_id: String,
    /// `TYPE:blob` of a generated key, unless discarded.
    pub private_key: Option<String>,
}

impl HiddenService {
    /// Full `.onion` host name.
    #[must_use]
    pub fn onion_address(&self) -> String {
        format!("{}.onion", self.service_id)
    }

    fn from_reply(reply: &Response) -> Result<Self> {
        // Base64 key padding carries extra '=', so split on the first one.
        let field = |name: &str| {
            reply
                .iter()
                .filter_map(|e| e.content().split_once('='))
                .find_map(|(key, value)| (key == name && !value.is_empty()).then_some(value))
        };
        let service_id = field("ServiceID")
            .ok_or_else(|| AppError::Protocol("ADD_ONION reply lacks ServiceID".into()))?;
        Ok(Self {
            service_id: service_id.to_owned(),
            private_key: field("PrivateKey").map(str::to_owned),
        })
    }
}

/// Descriptor upload bookkeeping for one service.
///
/// Uploads are attributed to the service by the `UPLOAD` action, which
/// names the address. `UPLOADED` and `FAILED` are matched by directory
/// only, since the daemon may report their address as `UNKNOWN`. Events
/// seen before the address is known are replayed once it is.
#[derive(Debug, Default)]
struct PublicationTracker {
    address: Option<String>,
    buffered: Vec<HsDesc>,
    uploads: ConfirmationSet,
    settled: bool,
}

impl PublicationTracker {
    fn observe(&mut self, desc: &HsDesc) -> Option<Result<()>> {
        if self.settled {
            return None;
        }
        if self.address.is_none() {
            self.buffered.push(desc.clone());
            return None;
        }
        self.apply(desc);
        self.verdict()
    }

    fn set_address(&mut self, address: &str) -> Option<Result<()>> {
        self.address = Some(address.to_owned());
        for desc in std::mem::take(&mut self.buffered) {
            self.apply(&desc);
        }
        self.verdict()
    }

    fn apply(&mut self, desc: &HsDesc) {
        match desc.action {
            HsDescAction::Upload if self.address.as_deref() == Some(desc.address.as_str()) => {
                self.uploads.start(&desc.directory);
            }
            HsDescAction::Uploaded => self.uploads.confirm(&desc.directory),
            HsDescAction::Failed => self.uploads.fail(&desc.directory),
            _ => {}
        }
    }

    fn verdict(&mut self) -> Option<Result<()>> {
        let published = self.uploads.outcome()?;
        self.settled = true;
        let address = self.address.as_deref().unwrap_or_default();
        if published {
            Some(Ok(()))
        } else {
            Some(Err(AppError::Publication(format!(
                "every descriptor upload for {address} failed ({} directories)",
                self.uploads.started()
            ))))
        }
    }
}

impl Controller {
    /// Create a hidden service with `ADD_ONION`.
    ///
    /// With `wait_for_publication`, a descriptor watch is registered before
    /// the command is sent and the call returns once every directory that
    /// started an upload for this service has answered. One successful
    /// upload is enough; the service is left in place when all fail.
    ///
    /// # Errors
    ///
    /// - [`AppError::Command`] when the daemon rejects the request.
    /// - [`AppError::Publication`] when every started upload failed.
    /// - [`AppError::Cancelled`] when `cancel` fires first.
    /// - [`AppError::Protocol`] for an invalid request or reply.
    pub async fn create_hidden_service(
        &self,
        request: &OnionRequest,
        wait_for_publication: bool,
        cancel: &CancellationToken,
    ) -> Result<HiddenService> {
        let args = request.to_args()?;
        if !wait_for_publication {
            let reply = self
                .send_command_cancellable(Command::AddOnion, Some(&args), cancel)
                .await?;
            return HiddenService::from_reply(&reply);
        }

        let tracker = Arc::new(Mutex::new(PublicationTracker::default()));
        let observer = Arc::clone(&tracker);
        let wait = self
            .watch(EventKind::HsDesc, move |event| {
                let EventPayload::HsDesc(desc) = event.payload() else {
                    return Step::Pending;
                };
                let mut tracker = observer.lock().unwrap_or_else(PoisonError::into_inner);
                tracker.observe(desc).map_or(Step::Pending, Step::Done)
            })
            .await?;

        let created = match self
            .send_command_cancellable(Command::AddOnion, Some(&args), cancel)
            .await
            .and_then(|reply| HiddenService::from_reply(&reply))
        {
            Ok(service) => service,
            Err(err) => {
                wait.dismiss().await;
                return Err(err);
            }
        };
        info!(service_id = %created.service_id, "hidden service created, awaiting publication");

        let early = tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_address(&created.service_id);
        match early {
            Some(outcome) => {
                wait.dismiss().await;
                outcome?;
            }
            None => wait.wait(cancel).await?,
        }
        debug!(service_id = %created.service_id, "hidden service descriptor published");
        Ok(created)
    }

    /// Remove a hidden service created on this connection, or a detached
    /// one, with `DEL_ONION`.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Command`] when the daemon does not know the
    /// service.
    pub async fn remove_hidden_service(&self, service_id: &str) -> Result<()> {
        let service_id = service_id.trim_end_matches(".onion");
        self.send_command(Command::DelOnion, Some(service_id))
            .await
            .map(|_| ())
    }
}
