//! Bot-protocol transport (`/onebot/ws`).
//!
//! Inbound frames are actions answered with exactly one response each;
//! outbound traffic also carries lifecycle, heartbeat and message events.
//! Live adapters are tracked by their own [`Hub`], under the same
//! single-writer discipline as the generic transport.

mod adapter;
mod events;
mod handlers;
mod stats;

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use tracing::{error, info, warn};
use yijing_core::{DivineResult, DivineTarget};
use yijing_protocol::wire_types::lifecycle;

use crate::connection::{run_connection, Deadlines};
use crate::hub_task::{Hub, HubError, HubMessage};
use crate::server::AppState;
use crate::types::{connection, ConnectionId};

pub use adapter::BotAdapter;
pub use events::{divination_event, divination_message, next_message_id};
pub use handlers::{default_handlers, ActionHandler, HandlerTable};
pub use stats::{BotStats, Counter};

/// What the bot hub fans out. Each variant is rendered per adapter, so
/// identity and counters stay with the connection it reaches.
#[derive(Debug, Clone)]
pub enum BotBroadcast {
    Divination {
        target: DivineTarget,
        result: Arc<DivineResult>,
    },
}

/// Bot connections get no hub welcome or hub heartbeat; the adapter
/// sends its own lifecycle and heartbeat events.
impl HubMessage for BotBroadcast {}

/// Serve one upgraded `/onebot/ws` socket until it disconnects.
pub async fn serve_bot(socket: WebSocket, state: AppState) {
    let id = ConnectionId::generate("onebot");
    let (handle, mailbox) = connection(id.clone(), state.config.connection.mailbox_capacity);
    let adapter = Arc::new(BotAdapter::new(handle.clone(), &state.config.onebot));

    if let Err(e) = state.bots.register(Arc::clone(&adapter)).await {
        error!(conn = %id, error = %e, "cannot register bot connection");
        return;
    }

    if let Err(e) = adapter.send_lifecycle_event(lifecycle::CONNECT) {
        warn!(conn = %id, error = %e, "lifecycle event not delivered");
    }
    adapter.mark_online();
    info!(conn = %id, self_id = adapter.self_id(), "bot connected");

    let deadlines = Deadlines::from(&state.config.connection);
    run_connection(socket, state.bots.clone(), handle, mailbox, adapter, deadlines).await;
}

/// Push a divination result to every connected bot as a message event
/// for `target`. Bots that cannot keep up are evicted by the hub.
pub async fn broadcast_divination(
    bots: &Hub<Arc<BotAdapter>>,
    target: DivineTarget,
    result: &DivineResult,
) -> Result<(), HubError> {
    bots.broadcast(BotBroadcast::Divination {
        target,
        result: Arc::new(result.clone()),
    })
    .await
}
