//! Tagset store - rule-set resolution and mutation.
//!
//! `resolve_active` never fails: any inconsistency (dangling reference,
//! missing tagset) degrades to "no filtering, uniform weights" with a
//! warning, because a device that keeps cycling unfiltered art beats one
//! that stops dead over a stale name.
//!
//! Override expiry is lazy: `ShufflerState::effective_selection` treats a
//! past expiry as absent, and the expiry timers here only reconcile the
//! persisted document. Timers are re-derived from `override_expiry` at
//! process start so restarts cannot resurrect a stale override.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

use crate::domain::Tagset;
use crate::error::{ArtloopError, Result};
use crate::observer::Observers;
use crate::store::{ShufflerState, StateStore};

/// Rules in effect for one device at one instant
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActiveRules {
    /// Tagset name the rules came from, if any
    pub tagset_name: Option<String>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    /// Clamped weights for the include categories
    pub weights: HashMap<String, f64>,
}

impl ActiveRules {
    /// No include filter, no exclude filter, uniform weights
    pub fn unfiltered() -> Self {
        Self::default()
    }
}

/// Owns tagset definitions and per-device selection state
pub struct TagsetStore {
    state: Arc<Mutex<ShufflerState>>,
    store: StateStore,
    observers: Observers,
    expiry_timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TagsetStore {
    pub fn new(state: Arc<Mutex<ShufflerState>>, store: StateStore, observers: Observers) -> Self {
        Self {
            state,
            store,
            observers,
            expiry_timers: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the rules in effect for a device. Never fails.
    pub fn resolve_active(&self, device_id: &str, now: DateTime<Utc>) -> ActiveRules {
        let state = self.state.lock().expect("state lock poisoned");

        let Some(name) = state.effective_selection(device_id, now) else {
            return ActiveRules::unfiltered();
        };

        match state.tagsets.get(name) {
            Some(tagset) => {
                let weights = tagset
                    .include
                    .iter()
                    .map(|cat| (cat.clone(), tagset.weight_of(cat)))
                    .collect();
                ActiveRules {
                    tagset_name: Some(name.to_string()),
                    include: tagset.include.clone(),
                    exclude: tagset.exclude.clone(),
                    weights,
                }
            }
            None => {
                tracing::warn!(
                    device_id,
                    tagset = name,
                    "active tagset does not exist, degrading to unfiltered selection"
                );
                ActiveRules::unfiltered()
            }
        }
    }

    /// Create or replace a tagset. Out-of-range weights are clamped with a
    /// warning, never rejected.
    pub fn upsert(&self, name: &str, mut tagset: Tagset) -> Result<()> {
        for note in tagset.normalize() {
            tracing::warn!(tagset = name, "{note}");
        }
        let snapshot = {
            let mut state = self.state.lock().expect("state lock poisoned");
            state.tagsets.insert(name.to_string(), tagset);
            state.clone()
        };
        self.store.save(&snapshot)?;
        self.observers.notify_tagset_changed(name);
        Ok(())
    }

    /// Delete a tagset. Refused while any device references it.
    pub fn delete(&self, name: &str) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if !state.tagsets.contains_key(name) {
                return Err(ArtloopError::TagsetNotFound(name.to_string()));
            }
            if let Some(device) = state.tagset_referenced_by(name) {
                return Err(ArtloopError::TagsetInUse(format!(
                    "'{name}' is referenced by device {device}"
                )));
            }
            state.tagsets.remove(name);
            state.clone()
        };
        self.store.save(&snapshot)?;
        self.observers.notify_tagset_changed(name);
        Ok(())
    }

    /// Set or clear a device's permanent selection
    pub fn select(&self, device_id: &str, tagset: Option<&str>) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if let Some(name) = tagset
                && !state.tagsets.contains_key(name)
            {
                return Err(ArtloopError::TagsetNotFound(name.to_string()));
            }
            let device = state
                .devices
                .get_mut(device_id)
                .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?;
            device.selected_tagset = tagset.map(String::from);
            state.clone()
        };
        self.store.save(&snapshot)?;
        self.observers.notify_device_schedule_changed(device_id);
        Ok(())
    }

    /// Apply a temporary override for a strictly positive duration.
    ///
    /// The expiry timer clears the override and reverts to the permanent
    /// selection when it fires.
    pub fn set_override(&self, device_id: &str, tagset: &str, duration: Duration) -> Result<()> {
        if duration <= Duration::zero() {
            return Err(ArtloopError::InvalidOverride(format!(
                "duration must be positive, got {duration}"
            )));
        }
        let expiry = Utc::now() + duration;
        let snapshot = {
            let mut state = self.state.lock().expect("state lock poisoned");
            if !state.tagsets.contains_key(tagset) {
                return Err(ArtloopError::TagsetNotFound(tagset.to_string()));
            }
            let device = state
                .devices
                .get_mut(device_id)
                .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?;
            device.override_tagset = Some(tagset.to_string());
            device.override_expiry = Some(expiry);
            state.clone()
        };
        self.store.save(&snapshot)?;
        self.arm_expiry_timer(device_id, expiry);
        tracing::info!(device_id, tagset, %expiry, "override applied");
        self.observers.notify_device_schedule_changed(device_id);
        Ok(())
    }

    /// Clear a device's override immediately
    pub fn clear_override(&self, device_id: &str) -> Result<()> {
        let snapshot = {
            let mut state = self.state.lock().expect("state lock poisoned");
            let device = state
                .devices
                .get_mut(device_id)
                .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?;
            device.override_tagset = None;
            device.override_expiry = None;
            state.clone()
        };
        if let Some(handle) = self
            .expiry_timers
            .lock()
            .expect("timer lock poisoned")
            .remove(device_id)
        {
            handle.abort();
        }
        self.store.save(&snapshot)?;
        self.observers.notify_device_schedule_changed(device_id);
        Ok(())
    }

    /// Reconcile persisted overrides at process start.
    ///
    /// Already-elapsed overrides are cleared immediately (before the first
    /// tick can run); live ones get a timer for their remaining duration.
    pub fn restore_expiry_timers(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        let (cleared, live): (Vec<String>, Vec<(String, DateTime<Utc>)>) = {
            let mut state = self.state.lock().expect("state lock poisoned");
            let cleared = state.reconcile_overrides(now);
            let live = state
                .devices
                .iter()
                .filter_map(|(id, d)| d.override_expiry.map(|e| (id.clone(), e)))
                .collect();
            if !cleared.is_empty() {
                let snapshot = state.clone();
                drop(state);
                self.store.save(&snapshot)?;
            }
            (cleared, live)
        };

        for device_id in &cleared {
            tracing::info!(device_id, "cleared stale override at startup");
            self.observers.notify_device_schedule_changed(device_id);
        }
        for (device_id, expiry) in live {
            self.arm_expiry_timer(&device_id, expiry);
        }
        Ok(cleared)
    }

    fn arm_expiry_timer(&self, device_id: &str, expiry: DateTime<Utc>) {
        let state = self.state.clone();
        let store = self.store.clone();
        let observers = self.observers.clone();
        let id = device_id.to_string();
        let timer_key = id.clone();

        let handle = tokio::spawn(async move {
            let now = Utc::now();
            if expiry > now
                && let Ok(sleep_for) = (expiry - now).to_std()
            {
                tokio::time::sleep(sleep_for).await;
            }

            let snapshot = {
                let mut st = state.lock().expect("state lock poisoned");
                let cleared = st.reconcile_overrides(Utc::now());
                if cleared.contains(&id) {
                    Some(st.clone())
                } else {
                    None
                }
            };
            if let Some(snap) = snapshot {
                if let Err(err) = store.save(&snap) {
                    tracing::warn!(device_id = %id, %err, "failed to persist override expiry");
                }
                tracing::info!(device_id = %id, "override expired, reverted to selected tagset");
                observers.notify_device_schedule_changed(&id);
            }
        });

        let mut timers = self.expiry_timers.lock().expect("timer lock poisoned");
        if let Some(old) = timers.insert(timer_key, handle) {
            old.abort();
        }
    }
}
