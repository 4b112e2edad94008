//! Live per-adapter counters.
//!
//! Counters are bumped from both connection tasks and read by
//! `get_status` and heartbeat events, so they are atomics rather than a
//! snapshot taken at creation.

use std::sync::atomic::{AtomicI64, Ordering};

use yijing_core::StatsSnapshot;

#[derive(Debug, Default)]
pub struct BotStats {
    pub packet_received: Counter,
    pub packet_sent: Counter,
    pub packet_lost: Counter,
    pub message_received: Counter,
    pub message_sent: Counter,
    pub disconnect_times: Counter,
    pub lost_times: Counter,
}

#[derive(Debug, Default)]
pub struct Counter(AtomicI64);

impl Counter {
    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl BotStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            packet_received: self.packet_received.get(),
            packet_sent: self.packet_sent.get(),
            packet_lost: self.packet_lost.get(),
            message_received: self.message_received.get(),
            message_sent: self.message_sent.get(),
            disconnect_times: self.disconnect_times.get(),
            lost_times: self.lost_times.get(),
        }
    }
}
