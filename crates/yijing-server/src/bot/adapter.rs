//! One bot-protocol connection: identity, counters, status flags and the
//! action handler table.
//!
//! Lifecycle is `Connecting -> Online`. There is no reconnecting state;
//! every accept builds a fresh adapter and counters die with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use yijing_core::{
    Action, ActionResponse, BotFrame, BotStatus, DivineResult, DivineTarget, Event,
};
use yijing_protocol::{decode_action, encode_bot_frame, encode_event, ProtocolError};

use crate::config::OneBotConfig;
use crate::connection::Session;
use crate::hub_task::Member;
use crate::types::{ConnectionHandle, ConnectionId, DeliveryError};

use super::events::divination_event;
use super::handlers::{default_handlers, ActionHandler, HandlerTable};
use super::stats::BotStats;
use super::BotBroadcast;

pub struct BotAdapter {
    handle: ConnectionHandle<BotFrame>,
    self_id: i64,
    nickname: String,
    heartbeat_interval: Duration,
    stats: BotStats,
    online: AtomicBool,
    handlers: HandlerTable,
}

impl BotAdapter {
    /// New adapter in the `Connecting` state with the built-in handlers.
    pub fn new(handle: ConnectionHandle<BotFrame>, config: &OneBotConfig) -> Self {
        let mut adapter = BotAdapter {
            handle,
            self_id: config.self_id,
            nickname: config.nickname.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            stats: BotStats::default(),
            online: AtomicBool::new(false),
            handlers: HandlerTable::new(),
        };
        for (action, handler) in default_handlers() {
            adapter.register_handler(action, handler);
        }
        adapter
    }

    pub fn id(&self) -> &ConnectionId {
        self.handle.id()
    }

    pub fn self_id(&self) -> i64 {
        self.self_id
    }

    pub fn nickname(&self) -> &str {
        &self.nickname
    }

    pub fn stats(&self) -> &BotStats {
        &self.stats
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::Relaxed)
    }

    /// `Connecting -> Online`.
    pub fn mark_online(&self) {
        self.online.store(true, Ordering::Relaxed);
    }

    /// Add or replace the handler for `action`.
    pub fn register_handler(&mut self, action: impl Into<String>, handler: ActionHandler) {
        self.handlers.insert(action.into(), handler);
    }

    /// Run the handler registered for `action.action`. Unknown names get
    /// the 1404 response; nothing here closes the connection.
    pub fn handle_action(&self, action: &Action) -> ActionResponse {
        match self.handlers.get(&action.action) {
            Some(handler) => handler(self, action),
            None => {
                warn!(conn = %self.id(), action = %action.action, "unsupported action");
                ActionResponse::unsupported(action)
            }
        }
    }

    pub fn status(&self) -> BotStatus {
        let online = self.is_online();
        BotStatus {
            app_initialized: true,
            app_enabled: true,
            plugins_good: true,
            app_good: true,
            online,
            good: online,
            stat: None,
        }
    }

    /// Status block with a snapshot of the live counters.
    pub fn status_with_stats(&self) -> BotStatus {
        BotStatus {
            stat: Some(self.stats.snapshot()),
            ..self.status()
        }
    }

    pub fn heartbeat_event(&self) -> Event {
        Event::heartbeat(
            chrono::Utc::now().timestamp(),
            self.self_id,
            self.status_with_stats(),
            self.heartbeat_interval.as_millis() as i64,
        )
    }

    pub fn send_lifecycle_event(&self, sub_type: &str) -> Result<(), DeliveryError> {
        let event = Event::lifecycle(chrono::Utc::now().timestamp(), self.self_id, sub_type);
        self.push(BotFrame::Event(event))
    }

    /// Push a divination result to one target on this connection.
    pub fn send_divination(
        &self,
        target: DivineTarget,
        result: &DivineResult,
    ) -> Result<(), DeliveryError> {
        let event = divination_event(
            chrono::Utc::now().timestamp(),
            self.self_id,
            &self.nickname,
            target,
            result,
        );
        self.push(BotFrame::Event(event))?;
        self.stats.message_sent.inc();
        Ok(())
    }

    /// Enqueue a frame on this connection, counting it as sent or lost.
    pub fn push(&self, frame: BotFrame) -> Result<(), DeliveryError> {
        match self.handle.try_deliver(frame) {
            Ok(()) => {
                self.stats.packet_sent.inc();
                Ok(())
            }
            Err(e) => {
                self.stats.packet_lost.inc();
                warn!(conn = %self.id(), error = %e, "bot frame not delivered");
                Err(e)
            }
        }
    }
}

/// Hub broadcasts reach a bot through its adapter, so forwarded events
/// are counted like any other frame.
impl Member for Arc<BotAdapter> {
    type Message = BotBroadcast;

    fn id(&self) -> &ConnectionId {
        self.handle.id()
    }

    fn deliver(&self, msg: BotBroadcast) -> Result<(), DeliveryError> {
        match msg {
            BotBroadcast::Divination { target, result } => self.send_divination(target, &result),
        }
    }

    fn close(&self) {
        self.handle.close();
    }
}

impl Session for BotAdapter {
    type Message = BotFrame;

    fn on_text(&self, text: &str) {
        let action = match decode_action(text) {
            Ok(action) => action,
            Err(e) => {
                // No response: decoding precedes dispatch.
                warn!(conn = %self.id(), error = %e, "dropping malformed action");
                return;
            }
        };
        self.stats.packet_received.inc();
        debug!(conn = %self.id(), action = %action.action, "action received");

        let response = self.handle_action(&action);
        let _ = self.push(BotFrame::Response(response));
    }

    fn encode(&self, frame: &BotFrame) -> Result<String, ProtocolError> {
        encode_bot_frame(frame)
    }

    fn heartbeat_interval(&self) -> Option<Duration> {
        Some(self.heartbeat_interval)
    }

    fn heartbeat(&self) -> Option<String> {
        match encode_event(&self.heartbeat_event()) {
            Ok(text) => {
                self.stats.packet_sent.inc();
                Some(text)
            }
            Err(e) => {
                warn!(conn = %self.id(), error = %e, "cannot encode heartbeat event");
                None
            }
        }
    }

    fn on_write_failed(&self) {
        self.stats.packet_lost.inc();
    }

    fn on_disconnect(&self, lost: bool) {
        self.stats.disconnect_times.inc();
        if lost {
            self.stats.lost_times.inc();
        }
        self.online.store(false, Ordering::Relaxed);
        info!(conn = %self.id(), stats = ?self.stats.snapshot(), "bot disconnected");
    }
}
