//! Status, statistics and identity payloads returned by bot actions.

use serde::{Deserialize, Serialize};

/// Counters of one adapter at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub packet_received: i64,
    pub packet_sent: i64,
    pub packet_lost: i64,
    pub message_received: i64,
    pub message_sent: i64,
    pub disconnect_times: i64,
    pub lost_times: i64,
}

/// Status block, returned by `get_status` and carried by heartbeat events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotStatus {
    pub app_initialized: bool,
    pub app_enabled: bool,
    pub plugins_good: bool,
    pub app_good: bool,
    pub online: bool,
    pub good: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat: Option<StatsSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub app_name: String,
    pub app_version: String,
    pub protocol_version: String,
    pub onebot_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginInfo {
    pub user_id: i64,
    pub nickname: String,
}
