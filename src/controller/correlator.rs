//! Command/reply correlation.
//!
//! Replies arrive strictly in send order, so the reply to a command is the
//! next reply that is not owed to an earlier, abandoned command. The
//! command channel lock is held from the write until the reply is taken;
//! this is what keeps a single command outstanding per connection.

use futures_util::SinkExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::protocol::command::{format_command, Command};
use crate::protocol::reply::Response;
use crate::{AppError, Result};

impl Controller {
    /// Send a command and wait for its reply.
    ///
    /// # Errors
    ///
    /// - [`AppError::Command`] when the daemon answers with a non-success
    ///   status.
    /// - [`AppError::ConnectionClosed`] when the connection is or becomes
    ///   closed before the reply arrives.
    /// - [`AppError::Protocol`] when `args` contains a line break.
    /// - [`AppError::Io`] when writing fails.
    pub async fn send_command(&self, command: Command, args: Option<&str>) -> Result<Response> {
        self.send_command_cancellable(command, args, &CancellationToken::new())
            .await
    }

    /// [`send_command`](Self::send_command) that gives up when `cancel`
    /// fires.
    ///
    /// A command cancelled after it was written still has a reply on its
    /// way; the next command skips it.
    ///
    /// # Errors
    ///
    /// As [`send_command`](Self::send_command), plus [`AppError::Cancelled`].
    pub async fn send_command_cancellable(
        &self,
        command: Command,
        args: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<Response> {
        let line = format_command(command, args)?;

        let mut channel = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(AppError::Cancelled),
            guard = self.inner.channel.lock() => guard,
        };
        if self.is_closed() {
            return Err(self.closed_error());
        }

        if channel.in_flight {
            channel.in_flight = false;
            channel.orphaned += 1;
        }
        while let Ok(stale) = channel.replies.try_recv() {
            channel.orphaned = channel.orphaned.saturating_sub(1);
            warn!(%command, stale = %stale.first(), "discarding stale reply");
        }

        debug!(line = %line, "sending command");
        if let Err(err) = channel.writer.send(line).await {
            warn!(%command, error = %err, "command write failed");
            return Err(err);
        }
        channel.in_flight = true;

        let response = loop {
            let received = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!(%command, "command wait cancelled");
                    return Err(AppError::Cancelled);
                }
                received = channel.replies.recv() => received,
                () = self.inner.shutdown.cancelled() => None,
            };
            let Some(response) = received else {
                return Err(self.closed_error());
            };
            if channel.orphaned > 0 {
                channel.orphaned -= 1;
                warn!(%command, stale = %response.first(), "discarding reply to abandoned command");
                continue;
            }
            break response;
        };
        channel.in_flight = false;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(AppError::Command {
                code: response.status(),
                message: response.first().content().to_owned(),
            })
        }
    }
}
