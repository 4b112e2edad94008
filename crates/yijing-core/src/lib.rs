//! yijing-core
//!
//! Pure message model for the divination hub:
//! - generic envelopes exchanged on the basic real-time transport
//! - bot-protocol actions, responses and pushed events
//! - message segments, status/stats blocks
//! - divination records forwarded by the hub

pub mod envelope;
pub mod action;
pub mod event;
pub mod segment;
pub mod status;
pub mod divine;

pub use envelope::{ConnectionInfo, DivinePayload, Envelope, ErrorInfo, HeartbeatInfo};

pub use action::{retcode, Action, ActionResponse, ActionStatus};

pub use event::{
    BotFrame,
    Event,
    EventKind,
    GroupMessage,
    HeartbeatEvent,
    LifecycleEvent,
    MessageEvent,
    MetaEvent,
    PrivateMessage,
    Sender,
};

pub use segment::{Message, Segment};
pub use status::{BotStatus, LoginInfo, StatsSnapshot, VersionInfo};
pub use divine::{DivineRequest, DivineResult, DivineTarget};
