//! Per-device state: identity, selection, and schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default shuffle frequency in minutes for newly-enabled devices
pub const DEFAULT_FREQUENCY_MINUTES: u32 = 60;

/// Last-known power/screen state of a display device.
///
/// Cache-only: nothing in this crate probes a device to refresh it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    On,
    Off,
    Unknown,
}

/// What initiated a shuffle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Fired by the per-device recurring timer
    Scheduled,
    /// Requested by an operator or the configuration surface
    Manual,
    /// Re-displayed after the screen came back on
    Resumed,
}

impl Trigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Scheduled => "scheduled",
            Trigger::Manual => "manual",
            Trigger::Resumed => "resumed",
        }
    }
}

/// Persisted per-device state (selection + schedule + identity)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Human-readable name for logs and the CLI
    pub name: String,

    /// Network address the transfer collaborator connects to
    pub address: String,

    /// Optional MAC for wake-capable transfer collaborators
    #[serde(default)]
    pub mac: Option<String>,

    /// Permanent tagset selection
    #[serde(default)]
    pub selected_tagset: Option<String>,

    /// Temporary tagset override, takes precedence until expiry
    #[serde(default)]
    pub override_tagset: Option<String>,

    /// When the override stops applying; past values are treated as absent
    #[serde(default)]
    pub override_expiry: Option<DateTime<Utc>>,

    /// Whether the auto-scheduler runs for this device
    #[serde(default)]
    pub auto_enabled: bool,

    /// Minutes between scheduled shuffles
    #[serde(default = "default_frequency")]
    pub frequency_minutes: u32,

    /// When the next scheduled shuffle fires; survives process restart
    #[serde(default)]
    pub next_run: Option<DateTime<Utc>>,

    /// Image currently on screen, excluded from the next selection
    #[serde(default)]
    pub current_image: Option<String>,
}

fn default_frequency() -> u32 {
    DEFAULT_FREQUENCY_MINUTES
}

impl DeviceState {
    /// Create device state with identity fields only
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            frequency_minutes: DEFAULT_FREQUENCY_MINUTES,
            ..Default::default()
        }
    }

    /// Whether the override applies at the given instant
    pub fn override_active(&self, now: DateTime<Utc>) -> bool {
        match (&self.override_tagset, self.override_expiry) {
            (Some(_), Some(expiry)) => expiry > now,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_new_device_defaults() {
        let dev = DeviceState::new("Living Room", "192.168.1.50");
        assert_eq!(dev.frequency_minutes, DEFAULT_FREQUENCY_MINUTES);
        assert!(!dev.auto_enabled);
        assert!(dev.next_run.is_none());
        assert!(dev.selected_tagset.is_none());
    }

    #[test]
    fn test_override_active_unexpired() {
        let now = Utc::now();
        let mut dev = DeviceState::new("TV", "host");
        dev.override_tagset = Some("party".to_string());
        dev.override_expiry = Some(now + Duration::minutes(30));
        assert!(dev.override_active(now));
    }

    #[test]
    fn test_override_active_expired() {
        let now = Utc::now();
        let mut dev = DeviceState::new("TV", "host");
        dev.override_tagset = Some("party".to_string());
        dev.override_expiry = Some(now - Duration::minutes(10));
        assert!(!dev.override_active(now));
    }

    #[test]
    fn test_override_without_expiry_is_inactive() {
        let mut dev = DeviceState::new("TV", "host");
        dev.override_tagset = Some("party".to_string());
        assert!(!dev.override_active(Utc::now()));
    }

    #[test]
    fn test_trigger_as_str() {
        assert_eq!(Trigger::Scheduled.as_str(), "scheduled");
        assert_eq!(Trigger::Manual.as_str(), "manual");
        assert_eq!(Trigger::Resumed.as_str(), "resumed");
    }

    #[test]
    fn test_frequency_serde_default() {
        let dev: DeviceState =
            serde_json::from_str(r#"{"name": "TV", "address": "host"}"#).unwrap();
        assert_eq!(dev.frequency_minutes, DEFAULT_FREQUENCY_MINUTES);
    }
}
