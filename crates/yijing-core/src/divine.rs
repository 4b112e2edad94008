//! Divination records.
//!
//! The hub never looks inside a [`DivineResult`]; it only wraps it into
//! envelopes or bot events.

use serde::{Deserialize, Serialize};

/// A complete divination result as produced by the engine.
///
/// Field names follow the established wire format (including the
/// historical `hasdonyao` spelling).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DivineResult {
    pub id: String,
    pub date: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ganzhinian: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ganzhiyue: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ganzhiri: String,

    /// Primary hexagram name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bengua: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub benguadesc: String,

    /// Changed hexagram, only meaningful when `hasdonyao` is set.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub biangua: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bianguadesc: String,
    #[serde(default)]
    pub hasdonyao: bool,

    /// Full URL of the rendered hexagram image.
    #[serde(default)]
    pub imagepath: String,

    pub created_at: i64,
}

/// What a client asks for. Only `"today"` is meaningful at the moment;
/// an empty request means the same.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DivineRequest {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Forward the result to this group over the bot protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,

    /// Forward the result to this user over the bot protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
}

/// Where a forwarded result goes on the bot protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivineTarget {
    Group(i64),
    Private(i64),
}

impl DivineRequest {
    /// Group wins when both ids are given.
    pub fn target(&self) -> Option<DivineTarget> {
        match (self.group_id, self.user_id) {
            (Some(group_id), _) => Some(DivineTarget::Group(group_id)),
            (None, Some(user_id)) => Some(DivineTarget::Private(user_id)),
            (None, None) => None,
        }
    }
}
