//! Control connection.
//!
//! A [`Controller`] owns one duplex connection to the daemon's control
//! endpoint. Opening it starts two background tasks:
//!
//! - the **reader** (see [`dispatch`]) is the only consumer of the read half.
//!   It assembles logical replies and routes them to the reply queue or,
//!   after classification, to the event queue;
//! - the **dispatcher** drains the event queue and invokes subscribed
//!   handlers in registration order.
//!
//! Commands are written by foreground callers through the correlator, which
//! holds the command channel lock for the whole send/await round-trip so at
//! most one command is ever outstanding.
//!
//! Dropping the last [`Controller`] clone cancels both tasks.

mod auth;
mod correlator;
mod dispatch;
mod info;
mod onion;
mod resolve;
mod subscriptions;
mod waiter;

use std::fmt::{Debug, Formatter};
use std::path::Path;
use std::sync::{Arc, OnceLock};

use interprocess::local_socket::tokio::{prelude::*, Stream as LocalStream};
use interprocess::local_socket::{GenericFilePath, ToFsName};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, mpsc, Mutex, OnceCell};
use tokio_util::codec::FramedWrite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};

use crate::protocol::codec::ControlCodec;
use crate::protocol::reader::ReplyReader;
use crate::protocol::reply::Response;
use crate::{AppError, Result};

pub use auth::{AuthMethod, ProtocolInfo};
pub use info::Signal;
pub use onion::{HiddenService, KeyBlob, OnionFlag, OnionKey, OnionRequest, PortMapping};
pub use subscriptions::{Handler, HandlerFailure, HandlerId};
pub use waiter::{ConfirmationSet, EventWait, Step};

use subscriptions::Subscriptions;

/// Capacity of the handler-failure broadcast channel.
const FAILURE_CHANNEL_CAPACITY: usize = 64;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Write half plus reply queue, locked together for one command round-trip.
pub(crate) struct CommandChannel {
    writer: FramedWrite<BoxedWriter, ControlCodec>,
    replies: mpsc::UnboundedReceiver<Response>,
    /// A command was written but its reply was never taken.
    in_flight: bool,
    /// Replies still owed to abandoned commands.
    orphaned: usize,
}

struct Inner {
    channel: Mutex<CommandChannel>,
    subscriptions: Arc<Subscriptions>,
    failures: broadcast::Sender<HandlerFailure>,
    shutdown: CancellationToken,
    close_reason: Arc<OnceLock<String>>,
    version: OnceCell<String>,
    pid: OnceCell<u32>,
    user: OnceCell<String>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Handle to a control connection. Cheap to clone; clones share the
/// connection.
#[derive(Clone)]
pub struct Controller {
    inner: Arc<Inner>,
}

impl Debug for Controller {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("closed", &self.is_closed())
            .field("subscribed", &self.subscribed_kinds())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Connect to a TCP control port.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the connection cannot be established.
    pub async fn connect_tcp<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        if let Ok(peer) = stream.peer_addr() {
            info!(%peer, "connected to control port");
        }
        Ok(Self::from_stream(stream))
    }

    /// Connect to a control socket on the file system (Unix socket or
    /// Windows named pipe path).
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] when the path is not a valid socket name or
    /// the connection cannot be established.
    pub async fn connect_local(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .to_fs_name::<GenericFilePath>()
            .map_err(|err| AppError::Io(format!("invalid control socket path: {err}")))?;
        let stream = LocalStream::connect(name).await?;
        info!(path = %path.display(), "connected to control socket");
        Ok(Self::from_stream(stream))
    }

    /// Take over an already-open transport and start the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);

        let shutdown = CancellationToken::new();
        let close_reason = Arc::new(OnceLock::new());
        let subscriptions = Arc::new(Subscriptions::default());

        tokio::spawn(
            dispatch::run_reader(
                ReplyReader::new(read_half),
                reply_tx,
                event_tx,
                shutdown.clone(),
                Arc::clone(&close_reason),
            )
            .instrument(info_span!("control_reader")),
        );
        tokio::spawn(
            dispatch::run_dispatcher(
                event_rx,
                Arc::clone(&subscriptions),
                failures.clone(),
                shutdown.clone(),
            )
            .instrument(info_span!("event_dispatcher")),
        );

        let writer: BoxedWriter = Box::new(write_half);
        Self {
            inner: Arc::new(Inner {
                channel: Mutex::new(CommandChannel {
                    writer: FramedWrite::new(writer, ControlCodec::new()),
                    replies: reply_rx,
                    in_flight: false,
                    orphaned: 0,
                }),
                subscriptions,
                failures,
                shutdown,
                close_reason,
                version: OnceCell::new(),
                pid: OnceCell::new(),
                user: OnceCell::new(),
            }),
        }
    }

    /// Send `QUIT` and shut the connection down.
    ///
    /// The background tasks stop even when `QUIT` fails.
    ///
    /// # Errors
    ///
    /// Returns the `QUIT` failure, if any. Closing an already-closed
    /// connection succeeds.
    pub async fn close(&self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        let quit = self
            .send_command(crate::protocol::command::Command::Quit, None)
            .await;
        self.shut_down("closed by caller");
        quit.map(|_| ())
    }

    /// Whether the connection can no longer carry commands.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    /// Wait until the connection is shut down, by either side.
    pub async fn closed(&self) {
        self.inner.shutdown.cancelled().await;
    }

    fn shut_down(&self, reason: &str) {
        if self.inner.close_reason.set(reason.to_owned()).is_ok() {
            debug!(reason, "control connection shutting down");
        }
        self.inner.shutdown.cancel();
    }

    /// Error describing why the connection is closed.
    pub(crate) fn closed_error(&self) -> AppError {
        let reason = self
            .inner
            .close_reason
            .get()
            .map_or("connection shut down", String::as_str);
        AppError::ConnectionClosed(reason.to_owned())
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }
}
