//! Bot-protocol actions (inbound RPC) and their responses.
//!
//! Every [`Action`] yields exactly one [`ActionResponse`]. The `echo`
//! value is opaque to the server and is copied back unchanged so the
//! client can correlate responses.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Return codes used by the bot protocol.
pub mod retcode {
    /// Request handled.
    pub const OK: i64 = 0;

    /// Missing or malformed parameter.
    pub const BAD_REQUEST: i64 = 1400;

    /// No handler registered for the action name.
    pub const UNSUPPORTED_ACTION: i64 = 1404;

    /// Handler produced data that could not be encoded.
    pub const INTERNAL_ERROR: i64 = 1500;
}

/// An inbound action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action: String,

    #[serde(default)]
    pub params: Map<String, Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Value>,
}

impl Action {
    pub fn new(action: impl Into<String>) -> Self {
        Action {
            action: action.into(),
            params: Map::new(),
            echo: None,
        }
    }

    /// Builder-style parameter insertion, mostly for tests and tools.
    pub fn param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn echo(mut self, echo: impl Into<Value>) -> Self {
        self.echo = Some(echo.into());
        self
    }

    /// Look up a required parameter, producing the standard 1400 response
    /// naming the field when it is absent.
    pub fn require(&self, key: &str) -> Result<&Value, ActionResponse> {
        self.params.get(key).ok_or_else(|| {
            ActionResponse::failed(
                retcode::BAD_REQUEST,
                format!("missing parameter {}", key),
                self.echo.clone(),
            )
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Success,
    Failed,
}

/// Response to one [`Action`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub status: ActionStatus,
    pub retcode: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub wording: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub echo: Option<Value>,
}

impl ActionResponse {
    /// Successful response carrying `data`.
    pub fn ok(data: Value, echo: Option<Value>) -> Self {
        ActionResponse {
            status: ActionStatus::Success,
            retcode: retcode::OK,
            data: Some(data),
            message: String::new(),
            wording: String::new(),
            echo,
        }
    }

    /// Failed response with a retcode and a short message.
    pub fn failed(retcode: i64, message: impl Into<String>, echo: Option<Value>) -> Self {
        ActionResponse {
            status: ActionStatus::Failed,
            retcode,
            data: None,
            message: message.into(),
            wording: String::new(),
            echo,
        }
    }

    /// Response for an action name with no registered handler.
    pub fn unsupported(action: &Action) -> Self {
        ActionResponse::failed(retcode::UNSUPPORTED_ACTION, "not supported", action.echo.clone())
            .with_wording(format!("action {} is not implemented", action.action))
    }

    pub fn with_wording(mut self, wording: impl Into<String>) -> Self {
        self.wording = wording.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ActionStatus::Success
    }
}
