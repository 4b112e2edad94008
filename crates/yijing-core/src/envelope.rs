//! Generic envelopes for the basic real-time transport.
//!
//! Wire shape is `{"type": <kind>, "data": <payload>}` in both
//! directions. The `type` discriminator selects the payload struct.

use serde::{Deserialize, Serialize};

use crate::divine::{DivineRequest, DivineResult};

/// A tagged message on the generic transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Envelope {
    /// Welcome message carrying the assigned connection id.
    Connect(ConnectionInfo),

    /// A connection left.
    Disconnect(ConnectionInfo),

    /// Divination request (inbound) or result (outbound).
    Divine(DivinePayload),

    /// Hub-wide heartbeat, or a per-connection heartbeat echo.
    Heartbeat(HeartbeatInfo),

    /// Something went wrong serving a request.
    Error(ErrorInfo),
}

/// Identity of a connection on the generic transport.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Payload of a `divine` envelope.
///
/// Clients send a (possibly empty) request; the server answers with the
/// full result record. A result always carries `id`, so it is tried first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DivinePayload {
    Result(DivineResult),
    Request(DivineRequest),
}

/// Heartbeat payload.
///
/// The hub fills `server` and `clients`; a reply to a client heartbeat
/// fills `client_id` instead.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeartbeatInfo {
    #[serde(default)]
    pub timestamp: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

/// Error payload.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(default)]
    pub error: String,

    #[serde(default)]
    pub message: String,
}

impl Envelope {
    /// Welcome envelope sent right after registration.
    pub fn connect(id: impl Into<String>) -> Self {
        Envelope::Connect(ConnectionInfo {
            id: id.into(),
            name: None,
        })
    }

    /// Announces to the remaining clients that `id` left.
    pub fn disconnect(id: impl Into<String>) -> Self {
        Envelope::Disconnect(ConnectionInfo {
            id: id.into(),
            name: None,
        })
    }

    /// Hub heartbeat carrying the current registry size.
    pub fn hub_heartbeat(timestamp: i64, server: impl Into<String>, clients: usize) -> Self {
        Envelope::Heartbeat(HeartbeatInfo {
            timestamp,
            server: Some(server.into()),
            clients: Some(clients),
            client_id: None,
        })
    }

    /// Reply to a heartbeat sent by one client.
    pub fn heartbeat_reply(timestamp: i64, client_id: impl Into<String>) -> Self {
        Envelope::Heartbeat(HeartbeatInfo {
            timestamp,
            server: None,
            clients: None,
            client_id: Some(client_id.into()),
        })
    }

    pub fn divine_result(result: DivineResult) -> Self {
        Envelope::Divine(DivinePayload::Result(result))
    }

    pub fn error(error: impl Into<String>, message: impl Into<String>) -> Self {
        Envelope::Error(ErrorInfo {
            error: error.into(),
            message: message.into(),
        })
    }

    /// The wire discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Connect(_) => "connect",
            Envelope::Disconnect(_) => "disconnect",
            Envelope::Divine(_) => "divine",
            Envelope::Heartbeat(_) => "heartbeat",
            Envelope::Error(_) => "error",
        }
    }
}
