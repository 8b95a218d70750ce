//! Request-then-await-event coordination.
//!
//! [`Controller::watch`] registers a handler that feeds every event of one
//! kind to a step function until the step reports a result. The caller then
//! performs its action (usually a command) and awaits the [`EventWait`].
//! Registering before acting guarantees the confirming event cannot be
//! missed.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::controller::{Controller, HandlerId};
use crate::events::{Event, EventKind};
use crate::{AppError, Result};

/// Outcome of feeding one event to a watch step.
#[derive(Debug)]
pub enum Step<T> {
    /// Keep watching.
    Pending,
    /// The wait is over.
    Done(Result<T>),
}

/// A registered watch awaiting its result.
///
/// Dropping an unfinished wait unregisters its handler in the background.
#[derive(Debug)]
pub struct EventWait<T> {
    controller: Controller,
    kind: EventKind,
    id: Option<HandlerId>,
    result: oneshot::Receiver<Result<T>>,
}

struct WatchState<F, T> {
    step: F,
    tx: Option<oneshot::Sender<Result<T>>>,
}

impl Controller {
    /// Start feeding events of `kind` to `step`.
    ///
    /// `step` runs on the dispatcher task. After it returns [`Step::Done`]
    /// it is not called again.
    ///
    /// # Errors
    ///
    /// Propagates the `SETEVENTS` failure from [`Controller::add_handler`].
    pub async fn watch<T, F>(&self, kind: EventKind, step: F) -> Result<EventWait<T>>
    where
        T: Send + 'static,
        F: FnMut(&Event) -> Step<T> + Send + 'static,
    {
        let (tx, result) = oneshot::channel();
        let state = Mutex::new(WatchState { step, tx: Some(tx) });

        let id = self
            .add_handler(kind, move |event| {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                if state.tx.is_none() {
                    return Ok(());
                }
                if let Step::Done(outcome) = (state.step)(event) {
                    if let Some(tx) = state.tx.take() {
                        // The waiter may already be gone.
                        let _ = tx.send(outcome);
                    }
                }
                Ok(())
            })
            .await?;

        Ok(EventWait {
            controller: self.clone(),
            kind,
            id: Some(id),
            result,
        })
    }
}

impl<T> EventWait<T> {
    /// Wait for the step's result, then unregister.
    ///
    /// # Errors
    ///
    /// - [`AppError::Cancelled`] when `cancel` fires first.
    /// - [`AppError::ConnectionClosed`] when the connection closes first.
    /// - Whatever error the step reported.
    pub async fn wait(mut self, cancel: &CancellationToken) -> Result<T> {
        let outcome = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(AppError::Cancelled),
            received = &mut self.result => {
                received.unwrap_or_else(|_| Err(self.controller.closed_error()))
            }
            () = self.controller.shutdown_token().cancelled() => Err(self.controller.closed_error()),
        };
        self.unregister().await;
        outcome
    }

    /// Abandon the wait and unregister its handler.
    pub async fn dismiss(mut self) {
        self.unregister().await;
    }

    async fn unregister(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if self.controller.is_closed() {
            return;
        }
        if let Err(err) = self.controller.remove_handler(self.kind, id).await {
            debug!(kind = %self.kind, error = %err, "watch handler removal failed");
        }
    }
}

impl<T> Drop for EventWait<T> {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        if self.controller.is_closed() {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let controller = self.controller.clone();
            let kind = self.kind;
            runtime.spawn(async move {
                if let Err(err) = controller.remove_handler(kind, id).await {
                    debug!(%kind, error = %err, "watch handler removal failed");
                }
            });
        }
    }
}

/// Tracks a bounded set of parties that each start an operation and later
/// confirm or fail it.
///
/// The set settles once every started party has confirmed or failed. It
/// succeeds when at least one confirmed and fails when all failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmationSet {
    started: HashSet<String>,
    confirmed: HashSet<String>,
    failed: HashSet<String>,
}

impl ConfirmationSet {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `party` started.
    pub fn start(&mut self, party: &str) {
        self.started.insert(party.to_owned());
    }

    /// Record that `party` confirmed. Ignored unless it started.
    pub fn confirm(&mut self, party: &str) {
        if self.started.contains(party) {
            self.failed.remove(party);
            self.confirmed.insert(party.to_owned());
        }
    }

    /// Record that `party` failed. Ignored unless it started.
    pub fn fail(&mut self, party: &str) {
        if self.started.contains(party) && !self.confirmed.contains(party) {
            self.failed.insert(party.to_owned());
        }
    }

    /// Number of parties that started.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.len()
    }

    /// `Some(true)` when settled with a confirmation, `Some(false)` when
    /// every started party failed, `None` while unsettled or empty.
    #[must_use]
    pub fn outcome(&self) -> Option<bool> {
        let settled = self.confirmed.len() + self.failed.len();
        if self.started.is_empty() || settled < self.started.len() {
            return None;
        }
        Some(!self.confirmed.is_empty())
    }
}
