//! Display events recorded after each shuffle attempt.
//!
//! Events feed the recency filter and pool-health reporting; this crate
//! writes them through the `ActivityLog` collaborator and reads them back
//! only as "images shown within the last H hours".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Trigger;

/// How a shuffle attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    /// Image was transferred and is on screen
    Displayed,
    /// Transfer was attempted and failed
    Failed,
}

impl EventOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventOutcome::Displayed => "displayed",
            EventOutcome::Failed => "failed",
        }
    }
}

/// One display event for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayEvent {
    pub device_id: String,
    pub image_id: String,
    /// Category the weighted selector rolled, when applicable
    #[serde(default)]
    pub category: Option<String>,
    pub trigger: Trigger,
    pub outcome: EventOutcome,
    pub started_at: DateTime<Utc>,
}

impl DisplayEvent {
    /// Event for a successful display starting now
    pub fn displayed(
        device_id: impl Into<String>,
        image_id: impl Into<String>,
        category: Option<String>,
        trigger: Trigger,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            image_id: image_id.into(),
            category,
            trigger,
            outcome: EventOutcome::Displayed,
            started_at,
        }
    }

    /// Event for a failed transfer
    pub fn failed(
        device_id: impl Into<String>,
        image_id: impl Into<String>,
        trigger: Trigger,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            image_id: image_id.into(),
            category: None,
            trigger,
            outcome: EventOutcome::Failed,
            started_at,
        }
    }
}
