//! Message segments for bot-protocol message events.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One piece of a chat message. Serialized as `{"type": ..., "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Segment {
    Text { text: String },
    Image { file: String },
    At { qq: i64 },
    Reply { id: i32 },
}

impl Segment {
    pub fn text(text: impl Into<String>) -> Self {
        Segment::Text { text: text.into() }
    }

    pub fn image(file: impl Into<String>) -> Self {
        Segment::Image { file: file.into() }
    }
}

/// An ordered list of segments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message(pub Vec<Segment>);

impl Message {
    pub fn new() -> Self {
        Message::default()
    }

    pub fn push(&mut self, segment: Segment) {
        self.0.push(segment);
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }
}

/// Raw CQ-code rendering, used for `raw_message`.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            match segment {
                Segment::Text { text } => write!(f, "{}", text)?,
                Segment::Image { file } => write!(f, "[CQ:image,file={}]", file)?,
                Segment::At { qq } => write!(f, "[CQ:at,qq={}]", qq)?,
                Segment::Reply { id } => write!(f, "[CQ:reply,id={}]", id)?,
            }
        }
        Ok(())
    }
}
