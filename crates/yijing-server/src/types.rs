//! Shared types for the hub server.
//!
//! This module defines:
//! - `ConnectionId`: identity assigned to each accepted socket
//! - `ConnectionHandle` / `Mailbox`: the two ends of a connection's
//!   bounded outbound queue, plus its close signal
//! - `DeliveryError`: why a non-blocking delivery failed

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Identifier for a connected socket, e.g. `client_1718000000123456789`.
///
/// Derived from the wall clock in nanoseconds and forced strictly
/// increasing, so two accepts in the same instant never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

static LAST_ID_NANOS: AtomicU64 = AtomicU64::new(0);

impl ConnectionId {
    pub fn generate(prefix: &str) -> Self {
        let now = chrono::Utc::now()
            .timestamp_nanos_opt()
            .map_or(0, |n| n.max(0) as u64);
        let prev = LAST_ID_NANOS
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |last| {
                Some(now.max(last + 1))
            })
            .unwrap_or(now);
        ConnectionId(format!("{}_{}", prefix, now.max(prev + 1)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        ConnectionId(s.to_string())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a non-blocking delivery did not happen.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("mailbox full")]
    Full,

    #[error("mailbox closed")]
    Closed,
}

/// Sender side of a connection: what the registry and handlers hold.
///
/// Cloning is cheap. Closing is shared: once any clone calls
/// [`ConnectionHandle::close`], the writer sends a close frame and both
/// connection tasks wind down.
#[derive(Debug)]
pub struct ConnectionHandle<M> {
    id: ConnectionId,
    outbound: mpsc::Sender<M>,
    shutdown: CancellationToken,
}

impl<M> Clone for ConnectionHandle<M> {
    fn clone(&self) -> Self {
        ConnectionHandle {
            id: self.id.clone(),
            outbound: self.outbound.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<M> ConnectionHandle<M> {
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Enqueue without waiting. A full or closed mailbox is reported to
    /// the caller; the writer task is never blocked on.
    pub fn try_deliver(&self, msg: M) -> Result<(), DeliveryError> {
        if self.shutdown.is_cancelled() {
            return Err(DeliveryError::Closed);
        }
        self.outbound.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Close the mailbox and the transport behind it. Idempotent.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled() || self.outbound.is_closed()
    }

    pub(crate) fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

/// Receiver side of a connection, owned by its writer task.
#[derive(Debug)]
pub struct Mailbox<M> {
    pub(crate) inbound: mpsc::Receiver<M>,
    pub(crate) shutdown: CancellationToken,
}

impl<M> Mailbox<M> {
    /// Pop one queued message without waiting.
    pub fn try_recv(&mut self) -> Option<M> {
        self.inbound.try_recv().ok()
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// Create both ends of a connection's outbound queue.
pub fn connection<M>(id: ConnectionId, capacity: usize) -> (ConnectionHandle<M>, Mailbox<M>) {
    let (tx, rx) = mpsc::channel(capacity);
    let shutdown = CancellationToken::new();
    (
        ConnectionHandle {
            id,
            outbound: tx,
            shutdown: shutdown.clone(),
        },
        Mailbox {
            inbound: rx,
            shutdown,
        },
    )
}
