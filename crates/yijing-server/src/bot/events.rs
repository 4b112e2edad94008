//! Building bot events that carry a divination result.

use std::sync::atomic::{AtomicI32, Ordering};

use yijing_core::{
    DivineResult, DivineTarget, Event, GroupMessage, Message, MessageEvent, PrivateMessage,
    Segment, Sender,
};

/// Process-wide message id source, shared by send actions and pushed events.
static NEXT_MESSAGE_ID: AtomicI32 = AtomicI32::new(1);

pub fn next_message_id() -> i32 {
    NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed)
}

/// Text, then the image reference when there is one, then the date.
pub fn divination_message(result: &DivineResult) -> Message {
    let mut message = Message::new();
    if result.bengua.is_empty() {
        message.push(Segment::text("Today's hexagram"));
    } else {
        message.push(Segment::text(format!("Today's hexagram: {}", result.bengua)));
    }
    if !result.imagepath.is_empty() {
        message.push(Segment::image(result.imagepath.clone()));
    }
    message.push(Segment::text(format!("Date: {}", result.date)));
    message
}

/// Wrap a result into a group or private message event for one target.
pub fn divination_event(
    time: i64,
    self_id: i64,
    nickname: &str,
    target: DivineTarget,
    result: &DivineResult,
) -> Event {
    let message = divination_message(result);
    let raw_message = message.to_string();
    let message_id = next_message_id();

    let body = match target {
        DivineTarget::Group(group_id) => MessageEvent::Group(GroupMessage {
            sub_type: "normal".to_string(),
            message_id,
            group_id,
            user_id: self_id,
            message,
            raw_message,
            font: 0,
            sender: Sender {
                user_id: self_id,
                nickname: nickname.to_string(),
                card: nickname.to_string(),
                role: "member".to_string(),
            },
        }),
        DivineTarget::Private(user_id) => MessageEvent::Private(PrivateMessage {
            sub_type: "friend".to_string(),
            message_id,
            user_id,
            message,
            raw_message,
            font: 0,
            sender: Sender {
                user_id: self_id,
                nickname: nickname.to_string(),
                card: String::new(),
                role: "friend".to_string(),
            },
        }),
    };

    Event::message(time, self_id, body)
}
