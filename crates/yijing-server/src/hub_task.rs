//! Central hub loop.
//!
//! Each hub task owns one registry of [`Member`]s and processes every
//! `HubCommand` from its inbox, plus a periodic tick:
//!
//! - `Register`   : insert, then deliver the welcome message (if any).
//! - `Unregister` : remove if present and close the member; a no-op otherwise.
//! - `Broadcast`  : non-blocking delivery to every member; members whose
//!   mailbox is full or closed are evicted once the pass is over.
//! - tick         : log the registry size and broadcast a heartbeat (if any).
//!
//! Every removal is announced to the remaining members when the message
//! type has a farewell.
//!
//! The registry is only ever written from inside this loop. Status
//! routes read it through [`Hub::len`], which takes the read lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::types::{ConnectionHandle, ConnectionId, DeliveryError};

/// What a hub needs to know about the messages it fans out.
pub trait HubMessage: Clone + Send + Sync + fmt::Debug + 'static {
    /// Sent to a member right after it is registered.
    fn welcome(_id: &ConnectionId) -> Option<Self> {
        None
    }

    /// Sent to the remaining members after `_id` was removed.
    fn farewell(_id: &ConnectionId) -> Option<Self> {
        None
    }

    /// Broadcast on every tick.
    fn heartbeat(_clients: usize) -> Option<Self> {
        None
    }
}

/// A registry entry: something the hub can deliver to and close.
///
/// Delivery must never block; a full or closed mailbox is reported back
/// and the hub sheds the member.
pub trait Member: Clone + Send + Sync + 'static {
    type Message: HubMessage;

    fn id(&self) -> &ConnectionId;

    fn deliver(&self, msg: Self::Message) -> Result<(), DeliveryError>;

    fn close(&self);
}

impl<M: HubMessage> Member for ConnectionHandle<M> {
    type Message = M;

    fn id(&self) -> &ConnectionId {
        ConnectionHandle::id(self)
    }

    fn deliver(&self, msg: M) -> Result<(), DeliveryError> {
        self.try_deliver(msg)
    }

    fn close(&self) {
        ConnectionHandle::close(self)
    }
}

/// Registry of live members.
///
/// Written only by the owning hub loop; anyone else takes the read lock
/// briefly to count or look up.
pub type Registry<T> = Arc<RwLock<HashMap<ConnectionId, T>>>;

/// Requests flowing into a hub loop.
///
/// A single inbox keeps each producer's commands in order, so an
/// unregister can never overtake the register it follows.
pub enum HubCommand<T: Member> {
    Register(T),
    Unregister(ConnectionId),
    Broadcast(T::Message),
}

pub type HubTx<T> = mpsc::Sender<HubCommand<T>>;
pub type HubRx<T> = mpsc::Receiver<HubCommand<T>>;

#[derive(Debug, Error)]
#[error("{0} hub loop is no longer running")]
pub struct HubError(pub &'static str);

/// Cloneable front door to a running hub loop.
pub struct Hub<T: Member> {
    name: &'static str,
    commands: HubTx<T>,
    registry: Registry<T>,
}

impl<T: Member> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Hub {
            name: self.name,
            commands: self.commands.clone(),
            registry: Arc::clone(&self.registry),
        }
    }
}

impl<T: Member> fmt::Debug for Hub<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<T: Member> Hub<T> {
    /// Spawn the hub loop on the current runtime.
    pub fn spawn(name: &'static str, inbox_capacity: usize, tick: Duration) -> Self {
        let registry: Registry<T> = Arc::new(RwLock::new(HashMap::new()));
        let (tx, rx): (HubTx<T>, HubRx<T>) = mpsc::channel(inbox_capacity);

        {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                run_hub_loop(name, rx, registry, tick).await;
            });
        }

        Hub {
            name,
            commands: tx,
            registry,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub async fn register(&self, member: T) -> Result<(), HubError> {
        self.submit(HubCommand::Register(member)).await
    }

    pub async fn unregister(&self, id: ConnectionId) -> Result<(), HubError> {
        self.submit(HubCommand::Unregister(id)).await
    }

    pub async fn broadcast(&self, msg: T::Message) -> Result<(), HubError> {
        self.submit(HubCommand::Broadcast(msg)).await
    }

    /// Current number of registered members.
    pub async fn len(&self) -> usize {
        self.registry.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, id: &ConnectionId) -> bool {
        self.registry.read().await.contains_key(id)
    }

    async fn submit(&self, cmd: HubCommand<T>) -> Result<(), HubError> {
        self.commands.send(cmd).await.map_err(|_| HubError(self.name))
    }
}

/// Run a hub processing loop until every `Hub` handle is dropped.
pub async fn run_hub_loop<T: Member>(
    name: &'static str,
    mut inbox: HubRx<T>,
    registry: Registry<T>,
    tick: Duration,
) {
    let mut ticker = interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = inbox.recv() => {
                let Some(cmd) = cmd else { break };
                match cmd {
                    HubCommand::Register(member) => register(name, &registry, member).await,
                    HubCommand::Unregister(id) => unregister(name, &registry, &id).await,
                    HubCommand::Broadcast(msg) => broadcast(name, &registry, msg).await,
                }
            }
            _ = ticker.tick() => {
                let clients = registry.read().await.len();
                info!(hub = name, clients, "hub heartbeat");
                if let Some(msg) = <T::Message as HubMessage>::heartbeat(clients) {
                    broadcast(name, &registry, msg).await;
                }
            }
        }
    }

    info!(hub = name, "hub loop shutting down (inbox closed)");
}

async fn register<T: Member>(name: &str, registry: &Registry<T>, member: T) {
    let id = member.id().clone();
    registry.write().await.insert(id.clone(), member.clone());
    info!(hub = name, conn = %id, "connection registered");

    if let Some(welcome) = <T::Message as HubMessage>::welcome(&id) {
        if let Err(e) = member.deliver(welcome) {
            warn!(hub = name, conn = %id, error = %e, "welcome not delivered, closing connection");
            member.close();
        }
    }
}

async fn unregister<T: Member>(name: &str, registry: &Registry<T>, id: &ConnectionId) {
    let mut guard = registry.write().await;
    match guard.remove(id) {
        Some(member) => {
            member.close();
            info!(hub = name, conn = %id, "connection unregistered");
            announce_departure(name, &guard, id);
        }
        None => debug!(hub = name, conn = %id, "unregister of unknown connection ignored"),
    }
}

/// Deliver `msg` to everyone; shed members that cannot keep up.
async fn broadcast<T: Member>(name: &str, registry: &Registry<T>, msg: T::Message) {
    let mut guard = registry.write().await;

    let mut slow = Vec::new();
    for (id, member) in guard.iter() {
        match member.deliver(msg.clone()) {
            Ok(()) => {}
            Err(DeliveryError::Full) => {
                warn!(hub = name, conn = %id, "mailbox full, evicting slow consumer");
                slow.push(id.clone());
            }
            Err(DeliveryError::Closed) => {
                debug!(hub = name, conn = %id, "mailbox already closed, removing");
                slow.push(id.clone());
            }
        }
    }

    // A later unregister from the reader's cleanup finds nothing and is a no-op.
    for id in slow {
        if let Some(member) = guard.remove(&id) {
            member.close();
            info!(hub = name, conn = %id, "connection removed after failed broadcast");
            announce_departure(name, &guard, &id);
        }
    }
}

/// Best effort: a member that misses its farewell is shed by the next broadcast.
fn announce_departure<T: Member>(name: &str, members: &HashMap<ConnectionId, T>, gone: &ConnectionId) {
    let Some(msg) = <T::Message as HubMessage>::farewell(gone) else {
        return;
    };
    for (id, member) in members {
        if let Err(e) = member.deliver(msg.clone()) {
            debug!(hub = name, conn = %id, error = %e, "farewell not delivered");
        }
    }
}
