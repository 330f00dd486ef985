//! The versioned persisted state document.
//!
//! Everything that must survive a process restart lives in one
//! `ShufflerState` struct: the global tagset table and the per-device
//! selection/schedule records. Mutations go through the `TagsetStore` and
//! `DeviceScheduler` APIs, which persist the whole document atomically after
//! each change.
//!
//! `effective_selection` is the single expiry-aware resolver; every call
//! site that needs "which tagset applies right now" goes through it so lazy
//! override expiry cannot diverge between code paths.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{DeviceState, Tagset};

/// Current on-disk schema version
pub const STATE_VERSION: u32 = 1;

/// Full persisted state for one artloop instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShufflerState {
    pub version: u32,

    /// Named rule sets, shared by all devices
    #[serde(default)]
    pub tagsets: BTreeMap<String, Tagset>,

    /// Per-device selection and schedule state, keyed by device id
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceState>,
}

impl Default for ShufflerState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            tagsets: BTreeMap::new(),
            devices: BTreeMap::new(),
        }
    }
}

impl ShufflerState {
    /// Resolve the tagset name that applies to a device at `now`.
    ///
    /// Precedence: unexpired override, then the permanent selection, then
    /// the first-defined tagset when selections are unset but tagsets
    /// exist, then none (no filtering). Expired overrides are treated as
    /// absent here; `reconcile_overrides` clears them from the document.
    pub fn effective_selection(&self, device_id: &str, now: DateTime<Utc>) -> Option<&str> {
        let device = self.devices.get(device_id)?;

        if device.override_active(now) {
            return device.override_tagset.as_deref();
        }
        if let Some(selected) = device.selected_tagset.as_deref() {
            return Some(selected);
        }
        self.tagsets.keys().next().map(String::as_str)
    }

    /// Clear overrides whose expiry has already passed.
    ///
    /// Returns the ids of devices whose override was cleared. Called at
    /// load time so a process restart reconciles stale overrides before the
    /// first tick, and from the expiry timers when they fire.
    pub fn reconcile_overrides(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let mut cleared = Vec::new();
        for (id, device) in self.devices.iter_mut() {
            let expired = matches!(device.override_expiry, Some(expiry) if expiry <= now);
            if device.override_tagset.is_some() && (expired || device.override_expiry.is_none()) {
                // An override without an expiry is malformed; drop it too.
                device.override_tagset = None;
                device.override_expiry = None;
                cleared.push(id.clone());
            }
        }
        cleared
    }

    /// First device id that references the tagset as selected or override
    pub fn tagset_referenced_by(&self, name: &str) -> Option<&str> {
        self.devices
            .iter()
            .find(|(_, d)| {
                d.selected_tagset.as_deref() == Some(name)
                    || d.override_tagset.as_deref() == Some(name)
            })
            .map(|(id, _)| id.as_str())
    }
}
