//! Bot-protocol events (outbound pushes, no response expected).
//!
//! Every event carries `time`, `self_id` and `post_type`; the rest of the
//! object depends on the variant:
//!
//! ```text
//! post_type = "meta_event"
//!   meta_event_type = "lifecycle"  -> sub_type
//!   meta_event_type = "heartbeat"  -> status, interval
//! post_type = "message"
//!   message_type = "private"       -> sub_type, message_id, user_id, message, ...
//!   message_type = "group"         -> sub_type, message_id, group_id, user_id, message, ...
//! ```

use serde::{Deserialize, Serialize};

use crate::action::ActionResponse;
use crate::segment::Message;
use crate::status::BotStatus;

/// A pushed event with its common header.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unix seconds.
    pub time: i64,
    pub self_id: i64,

    #[serde(flatten)]
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "post_type", rename_all = "snake_case")]
pub enum EventKind {
    MetaEvent(MetaEvent),
    Message(MessageEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "meta_event_type", rename_all = "snake_case")]
pub enum MetaEvent {
    Lifecycle(LifecycleEvent),
    Heartbeat(HeartbeatEvent),
}

/// `sub_type` is one of `connect`, `enable`, `disable`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub sub_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub status: BotStatus,
    /// Declared heartbeat interval in milliseconds.
    pub interval: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum MessageEvent {
    Private(PrivateMessage),
    Group(GroupMessage),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateMessage {
    pub sub_type: String,
    pub message_id: i32,
    pub user_id: i64,
    pub message: Message,
    pub raw_message: String,
    pub font: i32,
    pub sender: Sender,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMessage {
    pub sub_type: String,
    pub message_id: i32,
    pub group_id: i64,
    pub user_id: i64,
    pub message: Message,
    pub raw_message: String,
    pub font: i32,
    pub sender: Sender,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: i64,
    pub nickname: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub card: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub role: String,
}

impl Event {
    pub fn lifecycle(time: i64, self_id: i64, sub_type: impl Into<String>) -> Self {
        Event {
            time,
            self_id,
            kind: EventKind::MetaEvent(MetaEvent::Lifecycle(LifecycleEvent {
                sub_type: sub_type.into(),
            })),
        }
    }

    pub fn heartbeat(time: i64, self_id: i64, status: BotStatus, interval_ms: i64) -> Self {
        Event {
            time,
            self_id,
            kind: EventKind::MetaEvent(MetaEvent::Heartbeat(HeartbeatEvent {
                status,
                interval: interval_ms,
            })),
        }
    }

    pub fn message(time: i64, self_id: i64, message: MessageEvent) -> Self {
        Event {
            time,
            self_id,
            kind: EventKind::Message(message),
        }
    }

    /// The `post_type` discriminator, for logging.
    pub fn post_type(&self) -> &'static str {
        match self.kind {
            EventKind::MetaEvent(_) => "meta_event",
            EventKind::Message(_) => "message",
        }
    }
}

/// Anything written to a bot-protocol connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BotFrame {
    Response(ActionResponse),
    Event(Event),
}
