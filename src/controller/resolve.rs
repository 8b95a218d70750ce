//! Address resolution through `RESOLVE` and `ADDRMAP` events.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::controller::waiter::Step;
use crate::controller::Controller;
use crate::events::EventKind;
use crate::protocol::command::Command;
use crate::{AppError, Result};

/// `ADDRMAP` target reported for failed lookups.
const RESOLVE_FAILED: &str = "<error>";

impl Controller {
    /// Resolve `address` through the daemon.
    ///
    /// The `RESOLVE` reply only acknowledges the request; the answer arrives
    /// later as an `ADDRMAP` event for the same address. No timeout is
    /// applied: fire `cancel` to give up.
    ///
    /// With `reverse`, `address` is an IP and the result is a host name.
    ///
    /// # Errors
    ///
    /// - [`AppError::Unresolved`] when the daemon reports a failed lookup.
    /// - [`AppError::Cancelled`] when `cancel` fires first.
    /// - [`AppError::Command`] when the daemon rejects the request.
    pub async fn resolve(
        &self,
        address: &str,
        reverse: bool,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let address = address.trim();
        if address.is_empty() || address.contains(char::is_whitespace) {
            return Err(AppError::Protocol(format!(
                "cannot resolve '{address}': expected a single host name or address"
            )));
        }

        let wanted = address.to_owned();
        let wait = self
            .watch(EventKind::AddrMap, move |event| {
                if !event.get("@1").eq_ignore_ascii_case(&wanted) {
                    return Step::Pending;
                }
                let mapped = event.get("@2");
                if mapped == RESOLVE_FAILED {
                    Step::Done(Err(AppError::Unresolved(format!(
                        "daemon could not resolve {wanted}"
                    ))))
                } else {
                    Step::Done(Ok(mapped.to_owned()))
                }
            })
            .await?;

        let args = if reverse {
            format!("mode=reverse {address}")
        } else {
            address.to_owned()
        };
        if let Err(err) = self
            .send_command_cancellable(Command::Resolve, Some(&args), cancel)
            .await
        {
            wait.dismiss().await;
            return Err(err);
        }

        let resolved = wait.wait(cancel).await?;
        debug!(address, resolved = resolved.as_str(), reverse, "address resolved");
        Ok(resolved)
    }
}
