//! Reader and dispatcher loops.
//!
//! The reader never calls handler code and never awaits anything except the
//! transport and the shutdown token, so a slow handler cannot starve command
//! replies.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};

use tokio::io::AsyncRead;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::controller::subscriptions::{HandlerFailure, Subscriptions};
use crate::events::{classify, Event};
use crate::protocol::reader::ReplyReader;
use crate::protocol::reply::Response;
use crate::{AppError, Result};

/// Read one logical message: a wire-engine response plus any continuation
/// responses needed to reach its closing status line.
pub(crate) async fn receive_message<R>(reader: &mut ReplyReader<R>) -> Result<Response>
where
    R: AsyncRead + Unpin,
{
    let mut response = reader.receive().await?;
    while !response.is_complete() {
        let continuation = reader.receive().await?;
        response.extend(continuation);
    }
    Ok(response)
}

/// Loop A: sole consumer of the transport.
///
/// Exits on shutdown or on the first read or classification error. The
/// grammar has no resynchronization point, so such an error is recorded as
/// the close reason and the shutdown token fires.
/// Dropping the queue senders on exit wakes any waiting correlator.
pub(crate) async fn run_reader<R>(
    mut reader: ReplyReader<R>,
    reply_tx: mpsc::UnboundedSender<Response>,
    event_tx: mpsc::UnboundedSender<Event>,
    shutdown: CancellationToken,
    close_reason: Arc<OnceLock<String>>,
) where
    R: AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!("control reader: shutdown received, stopping");
                break;
            }

            received = receive_message(&mut reader) => {
                let response = match received {
                    Ok(response) => response,
                    Err(err) => {
                        warn!(error = %err, "control reader: read failed, closing connection");
                        fail(&close_reason, &shutdown, &err);
                        break;
                    }
                };

                if response.is_async() {
                    let event = match classify(&response) {
                        Ok(event) => event,
                        Err(err) => {
                            warn!(
                                error = %err,
                                raw = response.first().content(),
                                "control reader: unclassifiable event, closing connection"
                            );
                            fail(&close_reason, &shutdown, &err);
                            break;
                        }
                    };
                    trace!(kind = %event.kind(), "control reader: event queued");
                    if event_tx.send(event).is_err() {
                        debug!("control reader: event queue closed, stopping");
                        break;
                    }
                } else {
                    trace!(status = %response.status(), "control reader: reply queued");
                    if reply_tx.send(response).is_err() {
                        debug!("control reader: reply queue closed, stopping");
                        break;
                    }
                }
            }
        }
    }
}

/// Record `err` as the close reason and shut the connection down.
fn fail(close_reason: &OnceLock<String>, shutdown: &CancellationToken, err: &AppError) {
    // A caller-initiated close may already have set a reason.
    let _ = close_reason.set(err.to_string());
    shutdown.cancel();
}

/// Loop B: fan events out to their subscribers.
///
/// Handlers for one event run sequentially in registration order against a
/// snapshot of the subscriber list. Errors and panics are logged and
/// broadcast, never propagated.
pub(crate) async fn run_dispatcher(
    mut event_rx: mpsc::UnboundedReceiver<Event>,
    subscriptions: Arc<Subscriptions>,
    failures: broadcast::Sender<HandlerFailure>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;

            () = shutdown.cancelled() => {
                debug!("event dispatcher: shutdown received, stopping");
                break;
            }

            next = event_rx.recv() => {
                let Some(event) = next else {
                    debug!("event dispatcher: event queue closed, stopping");
                    break;
                };
                deliver(&event, &subscriptions, &failures);
            }
        }
    }
}

fn deliver(
    event: &Event,
    subscriptions: &Subscriptions,
    failures: &broadcast::Sender<HandlerFailure>,
) {
    for (id, handler) in subscriptions.snapshot(event.kind()) {
        let message = match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(Ok(())) => continue,
            Ok(Err(err)) => err.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };
        warn!(
            kind = %event.kind(),
            handler = %id,
            error = message.as_str(),
            "event dispatcher: handler failed"
        );
        // No receivers is fine.
        let _ = failures.send(HandlerFailure {
            kind: event.kind(),
            handler: id,
            message,
        });
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {msg}")
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        format!("handler panicked: {msg}")
    } else {
        "handler panicked".to_owned()
    }
}
