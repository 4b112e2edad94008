//! Built-in action handlers.
//!
//! Each handler validates its own parameters: a missing required field
//! yields `retcode 1400` naming the field, never a dropped connection.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};
use yijing_core::{retcode, Action, ActionResponse, LoginInfo, Message, Segment, VersionInfo};
use yijing_protocol::wire_types::{actions, message_types, IMPLEMENTATION, ONEBOT_VERSION};

use super::adapter::BotAdapter;
use super::events::next_message_id;

/// A registered action handler.
pub type ActionHandler = Arc<dyn Fn(&BotAdapter, &Action) -> ActionResponse + Send + Sync>;

/// Action name -> handler.
pub type HandlerTable = HashMap<String, ActionHandler>;

/// The handler table every adapter starts with.
pub fn default_handlers() -> HandlerTable {
    let mut table = HandlerTable::new();
    table.insert(actions::SEND_PRIVATE_MSG.into(), Arc::new(send_private_msg) as ActionHandler);
    table.insert(actions::SEND_GROUP_MSG.into(), Arc::new(send_group_msg) as ActionHandler);
    table.insert(actions::SEND_MSG.into(), Arc::new(send_msg) as ActionHandler);
    table.insert(actions::GET_LOGIN_INFO.into(), Arc::new(get_login_info) as ActionHandler);
    table.insert(actions::GET_STATUS.into(), Arc::new(get_status) as ActionHandler);
    table.insert(actions::GET_VERSION_INFO.into(), Arc::new(get_version_info) as ActionHandler);
    table.insert(actions::CAN_SEND_IMAGE.into(), Arc::new(can_send_image) as ActionHandler);
    table.insert(actions::CAN_SEND_RECORD.into(), Arc::new(can_send_record) as ActionHandler);
    table
}

fn send_private_msg(bot: &BotAdapter, action: &Action) -> ActionResponse {
    let user_id = match action.require("user_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let message = match message_param(action) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    info!(bot_id = bot.self_id(), user_id = %user_id, message = %message, "send private message");
    sent(bot, action)
}

fn send_group_msg(bot: &BotAdapter, action: &Action) -> ActionResponse {
    let group_id = match action.require("group_id") {
        Ok(v) => v,
        Err(resp) => return resp,
    };
    let message = match message_param(action) {
        Ok(m) => m,
        Err(resp) => return resp,
    };

    info!(bot_id = bot.self_id(), group_id = %group_id, message = %message, "send group message");
    sent(bot, action)
}

/// Dispatch on `message_type` to the private or group variant.
fn send_msg(bot: &BotAdapter, action: &Action) -> ActionResponse {
    let message_type = match action.params.get("message_type") {
        Some(Value::String(t)) => t.as_str(),
        _ => {
            return ActionResponse::failed(
                retcode::BAD_REQUEST,
                "missing parameter message_type",
                action.echo.clone(),
            )
        }
    };

    match message_type {
        message_types::PRIVATE => send_private_msg(bot, action),
        message_types::GROUP => send_group_msg(bot, action),
        other => {
            warn!(bot_id = bot.self_id(), message_type = other, "unsupported message type");
            ActionResponse::failed(
                retcode::BAD_REQUEST,
                format!("unsupported message_type {}", other),
                action.echo.clone(),
            )
        }
    }
}

/// `message` is either plain text or an array of segments.
fn message_param(action: &Action) -> Result<Message, ActionResponse> {
    match action.require("message")? {
        Value::String(text) => Ok(Message(vec![Segment::text(text.as_str())])),
        value @ Value::Array(_) => serde_json::from_value(value.clone()).map_err(|e| {
            ActionResponse::failed(
                retcode::BAD_REQUEST,
                format!("invalid parameter message: {}", e),
                action.echo.clone(),
            )
        }),
        _ => Err(ActionResponse::failed(
            retcode::BAD_REQUEST,
            "invalid parameter message",
            action.echo.clone(),
        )),
    }
}

fn sent(bot: &BotAdapter, action: &Action) -> ActionResponse {
    bot.stats().message_sent.inc();
    ActionResponse::ok(json!({ "message_id": next_message_id() }), action.echo.clone())
}

fn get_login_info(bot: &BotAdapter, action: &Action) -> ActionResponse {
    success(
        LoginInfo {
            user_id: bot.self_id(),
            nickname: bot.nickname().to_string(),
        },
        action,
    )
}

/// Status block with the live counters injected.
fn get_status(bot: &BotAdapter, action: &Action) -> ActionResponse {
    success(bot.status_with_stats(), action)
}

fn get_version_info(_bot: &BotAdapter, action: &Action) -> ActionResponse {
    success(
        VersionInfo {
            app_name: IMPLEMENTATION.to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: ONEBOT_VERSION.to_string(),
            onebot_version: ONEBOT_VERSION.to_string(),
        },
        action,
    )
}

fn can_send_image(_bot: &BotAdapter, action: &Action) -> ActionResponse {
    ActionResponse::ok(json!({ "yes": true }), action.echo.clone())
}

fn can_send_record(_bot: &BotAdapter, action: &Action) -> ActionResponse {
    ActionResponse::ok(json!({ "yes": false }), action.echo.clone())
}

fn success<T: Serialize>(data: T, action: &Action) -> ActionResponse {
    match serde_json::to_value(data) {
        Ok(value) => ActionResponse::ok(value, action.echo.clone()),
        Err(e) => ActionResponse::failed(
            retcode::INTERNAL_ERROR,
            format!("failed to encode response: {}", e),
            action.echo.clone(),
        ),
    }
}
