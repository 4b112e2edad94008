//! Per-connection reader/writer pair.
//!
//! ```text
//!   socket ──► reader (this task) ──► Session::on_text ──► handler / reply
//!                                                              │
//!   socket ◄── writer (spawned)  ◄── mailbox ◄─────────────────┘
//!                  ▲   ▲
//!          ping ───┘   └─── optional protocol heartbeat
//! ```
//!
//! The reader refreshes an inactivity deadline on every inbound frame
//! (pongs included). Every write carries its own deadline. Whichever
//! side stops first fires the connection's close signal, which stops the
//! other one; the reader then unregisters from its hub exactly once.

use std::future;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, StreamExt};
use thiserror::Error;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use yijing_protocol::ProtocolError;

use crate::config::ConnectionConfig;
use crate::hub_task::{Hub, Member};
use crate::types::{ConnectionHandle, ConnectionId, Mailbox};

/// Protocol-specific behavior plugged into the generic connection tasks.
///
/// `on_text` runs inside the reader task and must not block for long:
/// a slow handler stalls that connection's reads.
pub trait Session: Send + Sync + 'static {
    type Message: Send + 'static;

    /// Handle one inbound text frame.
    fn on_text(&self, text: &str);

    /// Serialize one mailbox message for the wire.
    fn encode(&self, msg: &Self::Message) -> Result<String, ProtocolError>;

    /// Period of an extra protocol-level heartbeat written by the writer.
    fn heartbeat_interval(&self) -> Option<Duration> {
        None
    }

    /// Frame to write when the protocol heartbeat fires.
    fn heartbeat(&self) -> Option<String> {
        None
    }

    fn on_write_failed(&self) {}

    /// Runs once after the reader stops. `lost` is true when the
    /// connection died on a deadline or transport error.
    fn on_disconnect(&self, _lost: bool) {}
}

/// Deadlines applied by the connection tasks.
#[derive(Debug, Clone, Copy)]
pub struct Deadlines {
    pub read: Duration,
    pub write: Duration,
    pub ping: Duration,
}

impl From<&ConnectionConfig> for Deadlines {
    fn from(c: &ConnectionConfig) -> Self {
        Deadlines {
            read: c.read_timeout(),
            write: c.write_timeout(),
            ping: c.ping_interval(),
        }
    }
}

#[derive(Debug, Error)]
enum WriteError {
    #[error("write deadline exceeded")]
    Deadline,

    #[error("transport error: {0}")]
    Transport(#[from] axum::Error),
}

#[derive(Debug)]
enum ReadExit {
    Eof,
    ClosedByPeer,
    Deadline,
    Shutdown,
    Transport(axum::Error),
}

type WsStream = SplitStream<WebSocket>;

/// Drive one accepted socket until it dies, then deregister it.
///
/// The caller has already registered the member owning `handle` with `hub`.
pub async fn run_connection<S: Session, T: Member>(
    socket: WebSocket,
    hub: Hub<T>,
    handle: ConnectionHandle<S::Message>,
    mailbox: Mailbox<S::Message>,
    session: Arc<S>,
    deadlines: Deadlines,
) {
    let id = handle.id().clone();
    let (sink, stream) = socket.split();

    let writer = {
        let id = id.clone();
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            write_loop(&id, sink, mailbox, session.as_ref(), deadlines).await;
        })
    };

    let exit = read_loop(&id, stream, handle.shutdown_token(), session.as_ref(), deadlines.read).await;
    let lost = match &exit {
        ReadExit::Eof | ReadExit::ClosedByPeer | ReadExit::Shutdown => {
            info!(hub = hub.name(), conn = %id, reason = ?exit, "reader finished");
            false
        }
        ReadExit::Deadline | ReadExit::Transport(_) => {
            warn!(hub = hub.name(), conn = %id, reason = ?exit, "connection lost");
            true
        }
    };

    // Cleanup, reached exactly once whatever ended the reader.
    session.on_disconnect(lost);
    if let Err(e) = hub.unregister(id.clone()).await {
        warn!(conn = %id, error = %e, "could not unregister connection");
    }
    handle.close();

    if let Err(e) = writer.await {
        warn!(conn = %id, error = %e, "writer task failed");
    }
}

async fn read_loop<S: Session>(
    id: &ConnectionId,
    mut stream: WsStream,
    shutdown: CancellationToken,
    session: &S,
    read_timeout: Duration,
) -> ReadExit {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => return ReadExit::Shutdown,
            next = timeout(read_timeout, stream.next()) => next,
        };

        let msg = match next {
            Err(_) => return ReadExit::Deadline,
            Ok(None) => return ReadExit::Eof,
            Ok(Some(Err(e))) => return ReadExit::Transport(e),
            Ok(Some(Ok(msg))) => msg,
        };

        match msg {
            Message::Text(text) => session.on_text(&text),
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => session.on_text(&text),
                Err(_) => warn!(conn = %id, "dropping non UTF-8 binary frame"),
            },
            // Liveness only; the deadline was refreshed by receiving it.
            Message::Ping(_) | Message::Pong(_) => debug!(conn = %id, "liveness frame"),
            Message::Close(_) => return ReadExit::ClosedByPeer,
        }
    }
}

async fn write_loop<S, K>(
    id: &ConnectionId,
    mut sink: K,
    mut mailbox: Mailbox<S::Message>,
    session: &S,
    deadlines: Deadlines,
) where
    S: Session,
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    let shutdown = mailbox.shutdown.clone();
    let mut ping = ticker(deadlines.ping);
    let mut heartbeat = session.heartbeat_interval().map(ticker);

    loop {
        let outcome = tokio::select! {
            _ = shutdown.cancelled() => break,
            msg = mailbox.inbound.recv() => {
                let Some(msg) = msg else { break };
                match session.encode(&msg) {
                    Ok(text) => write(&mut sink, Message::Text(text), deadlines.write).await,
                    Err(e) => {
                        warn!(conn = %id, error = %e, "dropping unencodable message");
                        Ok(())
                    }
                }
            }
            _ = ping.tick() => write(&mut sink, Message::Ping(Vec::new()), deadlines.write).await,
            _ = tick_optional(&mut heartbeat) => match session.heartbeat() {
                Some(text) => write(&mut sink, Message::Text(text), deadlines.write).await,
                None => Ok(()),
            },
        };

        if let Err(e) = outcome {
            warn!(conn = %id, error = %e, "write failed, closing connection");
            session.on_write_failed();
            break;
        }
    }

    // Best effort; the peer may already be gone.
    let _ = timeout(deadlines.write, sink.send(Message::Close(None))).await;
    let _ = timeout(deadlines.write, sink.close()).await;
    shutdown.cancel();
    debug!(conn = %id, "writer finished");
}

async fn write<K>(sink: &mut K, msg: Message, deadline: Duration) -> Result<(), WriteError>
where
    K: Sink<Message, Error = axum::Error> + Unpin,
{
    match timeout(deadline, sink.send(msg)).await {
        Ok(result) => result.map_err(WriteError::from),
        Err(_) => Err(WriteError::Deadline),
    }
}

/// Interval whose first tick is one full period away.
fn ticker(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn tick_optional(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending::<()>().await,
    }
}
