//! Seam to the divination engine.
//!
//! The hub treats results as opaque records: it forwards them, it never
//! looks inside. Hexagram generation and image rendering live behind
//! the [`Oracle`] trait.

use chrono::{DateTime, Local};
use thiserror::Error;
use yijing_core::{DivineRequest, DivineResult};

#[derive(Debug, Error)]
pub enum DivinationError {
    #[error("unsupported divination type: {0}")]
    UnsupportedKind(String),

    #[error("divination engine failed: {0}")]
    Engine(String),
}

/// Produces a divination result for a trigger.
pub trait Oracle: Send + Sync + 'static {
    fn divine(&self, request: &DivineRequest) -> Result<DivineResult, DivinationError>;
}

/// Daily oracle: one result per calendar day, with the image reference
/// pointing at `<public_url>/output/<date>.png`.
#[derive(Debug, Clone)]
pub struct DailyOracle {
    public_url: String,
}

impl DailyOracle {
    pub fn new(public_url: impl Into<String>) -> Self {
        DailyOracle {
            public_url: public_url.into(),
        }
    }

    fn result_at(&self, now: DateTime<Local>) -> DivineResult {
        let date = now.format("%Y-%m-%d").to_string();
        DivineResult {
            id: format!("divine_{}", now.timestamp_nanos_opt().unwrap_or_default()),
            imagepath: format!("{}/output/{}.png", self.public_url, date),
            date,
            created_at: now.timestamp(),
            ..Default::default()
        }
    }
}

impl Oracle for DailyOracle {
    fn divine(&self, request: &DivineRequest) -> Result<DivineResult, DivinationError> {
        match request.kind.as_deref() {
            None | Some("today") => Ok(self.result_at(Local::now())),
            Some(other) => Err(DivinationError::UnsupportedKind(other.to_string())),
        }
    }
}
