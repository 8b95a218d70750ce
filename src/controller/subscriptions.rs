//! Event subscription table and `SETEVENTS` synchronization.
//!
//! The daemon's subscription list is replace-the-whole-set, so every time a
//! kind gains its first handler or loses its last one, the complete list of
//! kinds with at least one handler is re-sent.
//!
//! Two locks are involved:
//!
//! - `table` (std `RwLock`) guards the map itself. It is only ever held for
//!   plain map operations, never across an await. The dispatcher takes a
//!   read lock just long enough to copy the handler list for one kind.
//! - `update` (tokio `Mutex`) serializes add/remove calls, including their
//!   `SETEVENTS` round-trip, so two concurrent updates cannot send their
//!   lists out of order.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::controller::Controller;
use crate::events::{Event, EventKind};
use crate::protocol::command::Command;
use crate::Result;

/// Event callback. Runs on the dispatcher task and must not block.
pub type Handler = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync>;

/// Identifies one registration returned by [`Controller::add_handler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl Display for HandlerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A handler returned an error or panicked while processing an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    /// Kind of the event being delivered.
    pub kind: EventKind,
    /// Registration that failed.
    pub handler: HandlerId,
    /// Error text or panic payload.
    pub message: String,
}

#[derive(Default)]
pub(crate) struct Subscriptions {
    table: RwLock<BTreeMap<EventKind, Vec<(HandlerId, Handler)>>>,
    next_id: AtomicU64,
    update: Mutex<()>,
}

impl Subscriptions {
    /// Copy of the handlers registered for `kind`, in registration order.
    pub(crate) fn snapshot(&self, kind: EventKind) -> Vec<(HandlerId, Handler)> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.get(&kind).cloned().unwrap_or_default()
    }

    /// Kinds with at least one handler, in canonical order.
    pub(crate) fn active_kinds(&self) -> Vec<EventKind> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.keys().copied().collect()
    }

    /// Register `handler`; the flag is `true` when `kind` had no handler.
    fn insert(&self, kind: EventKind, handler: Handler) -> (HandlerId, bool) {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let handlers = table.entry(kind).or_default();
        let first = handlers.is_empty();
        handlers.push((id, handler));
        (id, first)
    }

    /// Unregister `id`; `None` when it was not registered, otherwise whether
    /// `kind` is now without handlers.
    fn remove(&self, kind: EventKind, id: HandlerId) -> Option<bool> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let handlers = table.get_mut(&kind)?;
        let position = handlers.iter().position(|(existing, _)| *existing == id)?;
        handlers.remove(position);
        let emptied = handlers.is_empty();
        if emptied {
            table.remove(&kind);
        }
        Some(emptied)
    }
}

impl Controller {
    /// Register `handler` for events of `kind`.
    ///
    /// When `kind` had no handler before, the full subscription list is sent
    /// with `SETEVENTS`; if that command fails the registration is undone.
    ///
    /// # Errors
    ///
    /// Propagates the `SETEVENTS` failure.
    pub async fn add_handler<F>(&self, kind: EventKind, handler: F) -> Result<HandlerId>
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        let subscriptions = &self.inner.subscriptions;
        let _update = subscriptions.update.lock().await;

        let (id, first) = subscriptions.insert(kind, Arc::new(handler));
        debug!(%kind, handler = %id, first, "handler registered");
        if first {
            if let Err(err) = self.sync_events().await {
                subscriptions.remove(kind, id);
                warn!(%kind, error = %err, "subscription rejected, registration rolled back");
                return Err(err);
            }
        }
        Ok(id)
    }

    /// Unregister a handler. Returns `false` when `id` was not registered
    /// for `kind`.
    ///
    /// When `kind` loses its last handler the shrunken list is sent with
    /// `SETEVENTS`. The handler is removed locally even if that fails.
    ///
    /// # Errors
    ///
    /// Propagates the `SETEVENTS` failure.
    pub async fn remove_handler(&self, kind: EventKind, id: HandlerId) -> Result<bool> {
        let subscriptions = &self.inner.subscriptions;
        let _update = subscriptions.update.lock().await;

        let Some(emptied) = subscriptions.remove(kind, id) else {
            return Ok(false);
        };
        debug!(%kind, handler = %id, emptied, "handler removed");
        if emptied {
            self.sync_events().await?;
        }
        Ok(true)
    }

    /// Kinds that currently have at least one handler.
    #[must_use]
    pub fn subscribed_kinds(&self) -> Vec<EventKind> {
        self.inner.subscriptions.active_kinds()
    }

    /// Receive every handler failure from now on.
    #[must_use]
    pub fn handler_failures(&self) -> broadcast::Receiver<HandlerFailure> {
        self.inner.failures.subscribe()
    }

    /// Send the complete subscription list. Callers hold the update lock.
    async fn sync_events(&self) -> Result<()> {
        let names: Vec<&str> = self
            .inner
            .subscriptions
            .active_kinds()
            .into_iter()
            .map(EventKind::as_str)
            .collect();
        self.send_command(Command::SetEvents, Some(&names.join(" ")))
            .await
            .map(|_| ())
    }
}
