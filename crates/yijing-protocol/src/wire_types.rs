//! Wire constants shared by both transports.

/// Bot protocol version spoken on `/onebot/ws`.
pub const ONEBOT_VERSION: &str = "11";

/// Implementation name reported by `get_version_info` and the status route.
pub const IMPLEMENTATION: &str = "yijing-onebot";

/// Server name carried by hub heartbeats on the generic transport.
pub const SERVER_NAME: &str = "yijing-api";

/// Largest text frame the codec accepts, in bytes.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Declared interval of bot heartbeat events, in milliseconds.
pub const HEARTBEAT_INTERVAL_MS: i64 = 5000;

/// Action names with built-in handlers.
pub mod actions {
    pub const SEND_PRIVATE_MSG: &str = "send_private_msg";
    pub const SEND_GROUP_MSG: &str = "send_group_msg";
    pub const SEND_MSG: &str = "send_msg";
    pub const GET_LOGIN_INFO: &str = "get_login_info";
    pub const GET_STATUS: &str = "get_status";
    pub const GET_VERSION_INFO: &str = "get_version_info";
    pub const CAN_SEND_IMAGE: &str = "can_send_image";
    pub const CAN_SEND_RECORD: &str = "can_send_record";
}

/// Values of `message_type`.
pub mod message_types {
    pub const PRIVATE: &str = "private";
    pub const GROUP: &str = "group";
}

/// Values of lifecycle `sub_type`.
pub mod lifecycle {
    pub const CONNECT: &str = "connect";
}

/// Frame length check applied before any parsing.
pub fn validate_frame_len(len: usize) -> bool {
    len > 0 && len <= MAX_FRAME_LEN
}
