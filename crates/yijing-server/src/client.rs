//! Generic event transport (`/ws`).
//!
//! Each accepted socket is registered with the event hub, which sends it
//! a `connect` welcome carrying its id and tells everyone else with a
//! `disconnect` envelope when it leaves. Inbound envelopes:
//!
//! - `divine`    : run the oracle, answer with a `divine` result or an `error`.
//! - `heartbeat` : answer with a heartbeat echo carrying the client id.
//! - anything else is logged and ignored.

use std::sync::Arc;

use axum::extract::ws::WebSocket;
use tracing::{debug, error, info, warn};
use yijing_core::{DivinePayload, DivineRequest, Envelope};
use yijing_protocol::wire_types::SERVER_NAME;
use yijing_protocol::{decode_envelope, encode_envelope, ProtocolError};

use crate::connection::{run_connection, Deadlines, Session};
use crate::divination::Oracle;
use crate::hub_task::HubMessage;
use crate::server::AppState;
use crate::types::{connection, ConnectionHandle, ConnectionId};

impl HubMessage for Envelope {
    fn welcome(id: &ConnectionId) -> Option<Self> {
        Some(Envelope::connect(id.as_str()))
    }

    fn farewell(id: &ConnectionId) -> Option<Self> {
        Some(Envelope::disconnect(id.as_str()))
    }

    fn heartbeat(clients: usize) -> Option<Self> {
        Some(Envelope::hub_heartbeat(
            chrono::Utc::now().timestamp(),
            SERVER_NAME,
            clients,
        ))
    }
}

/// Session state of one generic-transport connection.
pub struct EnvelopeSession {
    handle: ConnectionHandle<Envelope>,
    oracle: Arc<dyn Oracle>,
}

impl EnvelopeSession {
    pub fn new(handle: ConnectionHandle<Envelope>, oracle: Arc<dyn Oracle>) -> Self {
        EnvelopeSession { handle, oracle }
    }

    fn reply(&self, envelope: Envelope) {
        let kind = envelope.kind();
        if let Err(e) = self.handle.try_deliver(envelope) {
            warn!(conn = %self.handle.id(), kind, error = %e, "reply not delivered");
        }
    }

    fn divine(&self, request: &DivineRequest) {
        match self.oracle.divine(request) {
            Ok(result) => {
                info!(conn = %self.handle.id(), result = %result.id, "divination served");
                self.reply(Envelope::divine_result(result));
            }
            Err(e) => {
                error!(conn = %self.handle.id(), error = %e, "divination failed");
                self.reply(Envelope::error(e.to_string(), "divination failed"));
            }
        }
    }
}

impl Session for EnvelopeSession {
    type Message = Envelope;

    fn on_text(&self, text: &str) {
        let envelope = match decode_envelope(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(conn = %self.handle.id(), error = %e, "dropping undecodable frame");
                return;
            }
        };

        match envelope {
            Envelope::Divine(DivinePayload::Request(request)) => self.divine(&request),
            Envelope::Divine(DivinePayload::Result(_)) => self.divine(&DivineRequest::default()),
            Envelope::Heartbeat(_) => self.reply(Envelope::heartbeat_reply(
                chrono::Utc::now().timestamp(),
                self.handle.id().as_str(),
            )),
            other => debug!(conn = %self.handle.id(), kind = other.kind(), "ignoring envelope"),
        }
    }

    fn encode(&self, msg: &Envelope) -> Result<String, ProtocolError> {
        encode_envelope(msg)
    }
}

/// Serve one upgraded `/ws` socket until it disconnects.
pub async fn serve_client(socket: WebSocket, state: AppState) {
    let id = ConnectionId::generate("client");
    let (handle, mailbox) = connection(id.clone(), state.config.connection.mailbox_capacity);

    if let Err(e) = state.events.register(handle.clone()).await {
        error!(conn = %id, error = %e, "cannot register connection");
        return;
    }

    info!(conn = %id, "client connected");

    let session = Arc::new(EnvelopeSession::new(handle.clone(), Arc::clone(&state.oracle)));
    let deadlines = Deadlines::from(&state.config.connection);
    run_connection(socket, state.events.clone(), handle, mailbox, session, deadlines).await;
}
