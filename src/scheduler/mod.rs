//! Per-device auto-scheduler.
//!
//! Each enabled device gets one timer task that sleeps until the persisted
//! `next_run`, runs a guarded shuffle, then re-anchors `next_run = now +
//! frequency`. `next_run` survives restarts; a wake-up that finds it more
//! than one interval in the past re-anchors instead of firing a catch-up
//! burst (laptop-style suspend, clock jumps).
//!
//! All mutations go through the shared state document and are persisted
//! before observers hear about them.

pub mod shuffle;

pub use shuffle::ShuffleOutcome;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinHandle;

use crate::activity::ActivityLog;
use crate::domain::Trigger;
use crate::error::{ArtloopError, Result};
use crate::guard::ExecutionGuard;
use crate::library::ImageLibrary;
use crate::observer::Observers;
use crate::selection::RecencyWindows;
use crate::store::{ShufflerState, StateStore};
use crate::tagsets::TagsetStore;
use crate::transfer::{DeviceTransfer, PowerStateSource};

/// Everything a shuffle needs, shared between the scheduler, the CLI, and
/// the health reporter
pub struct SchedulerContext {
    pub state: Arc<Mutex<ShufflerState>>,
    pub store: StateStore,
    pub tagsets: Arc<TagsetStore>,
    pub library: Arc<dyn ImageLibrary>,
    pub transfer: Arc<dyn DeviceTransfer>,
    pub power: Arc<dyn PowerStateSource>,
    pub activity: Arc<dyn ActivityLog>,
    pub guard: Arc<ExecutionGuard>,
    pub observers: Observers,
    pub windows: RecencyWindows,
    /// Delay before the single transfer retry
    pub retry_delay: std::time::Duration,
}

impl SchedulerContext {
    /// Persist the current state document
    fn persist(&self) -> Result<()> {
        let snapshot = self.state.lock().expect("state lock poisoned").clone();
        self.store.save(&snapshot)
    }
}

/// Owns the per-device timer tasks
pub struct DeviceScheduler {
    ctx: Arc<SchedulerContext>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl DeviceScheduler {
    pub fn new(ctx: Arc<SchedulerContext>) -> Self {
        Self {
            ctx,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn context(&self) -> &Arc<SchedulerContext> {
        &self.ctx
    }

    /// Manually shuffle now. Skips the recency filter and the power gate;
    /// still guarded against concurrent transfers.
    pub async fn run_once(&self, device_id: &str) -> Result<ShuffleOutcome> {
        shuffle::shuffle_device(&self.ctx, device_id, Trigger::Manual, false).await
    }

    /// Enable auto shuffle for a device.
    ///
    /// Anchors `next_run = now + frequency`, arms the timer, and fires one
    /// immediate shuffle (power-gated) so enabling has a visible effect.
    pub async fn enable(&self, device_id: &str) -> Result<ShuffleOutcome> {
        let frequency = {
            let mut state = self.ctx.state.lock().expect("state lock poisoned");
            let device = state
                .devices
                .get_mut(device_id)
                .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?;
            device.auto_enabled = true;
            device.next_run = Some(Utc::now() + Duration::minutes(device.frequency_minutes as i64));
            device.frequency_minutes
        };
        self.ctx.persist()?;
        self.arm_timer(device_id);
        self.ctx.observers.notify_device_schedule_changed(device_id);
        tracing::info!(device_id, frequency_minutes = frequency, "auto shuffle enabled");

        shuffle::shuffle_device(&self.ctx, device_id, Trigger::Scheduled, true).await
    }

    /// Disable auto shuffle: cancel the timer and clear `next_run`
    pub fn disable(&self, device_id: &str) -> Result<()> {
        {
            let mut state = self.ctx.state.lock().expect("state lock poisoned");
            let device = state
                .devices
                .get_mut(device_id)
                .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?;
            device.auto_enabled = false;
            device.next_run = None;
        }
        self.ctx.persist()?;
        if let Some(handle) = self
            .timers
            .lock()
            .expect("timer lock poisoned")
            .remove(device_id)
        {
            handle.abort();
        }
        self.ctx.observers.notify_device_schedule_changed(device_id);
        tracing::info!(device_id, "auto shuffle disabled");
        Ok(())
    }

    /// Change the shuffle frequency.
    ///
    /// Takes effect immediately: when auto shuffle is enabled the next run
    /// is re-anchored to `now + frequency` rather than letting the old
    /// interval play out.
    pub fn set_frequency(&self, device_id: &str, minutes: u32) -> Result<()> {
        if minutes == 0 {
            return Err(ArtloopError::Config(
                "frequency must be at least one minute".to_string(),
            ));
        }
        let enabled = {
            let mut state = self.ctx.state.lock().expect("state lock poisoned");
            let device = state
                .devices
                .get_mut(device_id)
                .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?;
            device.frequency_minutes = minutes;
            if device.auto_enabled {
                device.next_run = Some(Utc::now() + Duration::minutes(minutes as i64));
            }
            device.auto_enabled
        };
        self.ctx.persist()?;
        if enabled {
            self.arm_timer(device_id);
        }
        self.ctx.observers.notify_device_schedule_changed(device_id);
        tracing::info!(device_id, minutes, "shuffle frequency changed");
        Ok(())
    }

    /// Pool-health snapshot for a device
    pub fn pool_health(&self, device_id: &str) -> Result<crate::health::PoolHealth> {
        crate::health::pool_health(&self.ctx, device_id)
    }

    /// Rebuild timers from persisted state at process start.
    ///
    /// Clears stale overrides before any tick can run, re-anchors drifted
    /// schedules, and arms a timer per enabled device. Returns the ids of
    /// devices whose schedule had drifted.
    pub fn restore(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.ctx.tagsets.restore_expiry_timers(now)?;

        let mut drifted = Vec::new();
        let enabled: Vec<String> = {
            let mut state = self.ctx.state.lock().expect("state lock poisoned");
            let mut enabled = Vec::new();
            for (id, device) in state.devices.iter_mut() {
                if !device.auto_enabled {
                    continue;
                }
                let interval = Duration::minutes(device.frequency_minutes as i64);
                match device.next_run {
                    Some(next) if next < now - interval => {
                        let diag = ArtloopError::ScheduleDrift(format!(
                            "next_run for {id} was {}m overdue",
                            (now - next).num_minutes()
                        ));
                        tracing::warn!(device_id = %id, %diag, "re-anchoring schedule");
                        device.next_run = Some(now + interval);
                        drifted.push(id.clone());
                    }
                    Some(_) => {}
                    None => {
                        device.next_run = Some(now + interval);
                    }
                }
                enabled.push(id.clone());
            }
            enabled
        };
        self.ctx.persist()?;

        for device_id in &enabled {
            self.arm_timer(device_id);
        }
        tracing::info!(
            devices = enabled.len(),
            drifted = drifted.len(),
            "schedules restored"
        );
        Ok(drifted)
    }

    /// Cancel all timers and wait for the tasks to wind down
    pub async fn shutdown(&self) {
        let handles: Vec<JoinHandle<()>> = {
            let mut timers = self.timers.lock().expect("timer lock poisoned");
            timers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in &handles {
            handle.abort();
        }
        let _ = futures::future::join_all(handles).await;
    }

    fn arm_timer(&self, device_id: &str) {
        let ctx = self.ctx.clone();
        let id = device_id.to_string();
        let handle = tokio::spawn(timer_loop(ctx, id));

        let mut timers = self.timers.lock().expect("timer lock poisoned");
        if let Some(old) = timers.insert(device_id.to_string(), handle) {
            old.abort();
        }
    }
}

async fn timer_loop(ctx: Arc<SchedulerContext>, device_id: String) {
    loop {
        let now = Utc::now();
        let schedule = {
            let state = ctx.state.lock().expect("state lock poisoned");
            state.devices.get(&device_id).and_then(|d| {
                d.auto_enabled
                    .then(|| (d.next_run, Duration::minutes(d.frequency_minutes as i64)))
            })
        };
        let Some((next_run, interval)) = schedule else {
            return;
        };

        let target = match next_run {
            // More than one interval overdue: re-anchor, no catch-up burst
            Some(next) if next < now - interval => {
                let diag = ArtloopError::ScheduleDrift(format!(
                    "next_run for {device_id} was {}m overdue",
                    (now - next).num_minutes()
                ));
                tracing::warn!(device_id = %device_id, %diag, "re-anchoring schedule");
                let target = now + interval;
                reanchor(&ctx, &device_id, target);
                target
            }
            Some(next) => next,
            None => {
                let target = now + interval;
                reanchor(&ctx, &device_id, target);
                target
            }
        };

        if let Ok(sleep_for) = (target - Utc::now()).to_std() {
            tokio::time::sleep(sleep_for).await;
        }

        match shuffle::shuffle_device(&ctx, &device_id, Trigger::Scheduled, true).await {
            Ok(outcome) => {
                tracing::debug!(device_id = %device_id, %outcome, "scheduled shuffle finished")
            }
            Err(err) => {
                tracing::error!(device_id = %device_id, %err, "scheduled shuffle failed")
            }
        }

        let now = Utc::now();
        let still_enabled = {
            let mut state = ctx.state.lock().expect("state lock poisoned");
            match state.devices.get_mut(&device_id) {
                Some(device) if device.auto_enabled => {
                    device.next_run =
                        Some(now + Duration::minutes(device.frequency_minutes as i64));
                    true
                }
                _ => false,
            }
        };
        if !still_enabled {
            return;
        }
        if let Err(err) = ctx.persist() {
            tracing::warn!(device_id = %device_id, %err, "failed to persist next_run");
        }
        ctx.observers.notify_device_schedule_changed(&device_id);
    }
}

/// Write a new `next_run` and persist it, logging instead of failing:
/// the timer keeps its in-memory schedule even when the disk write fails
fn reanchor(ctx: &SchedulerContext, device_id: &str, target: DateTime<Utc>) {
    {
        let mut state = ctx.state.lock().expect("state lock poisoned");
        if let Some(device) = state.devices.get_mut(device_id) {
            device.next_run = Some(target);
        }
    }
    if let Err(err) = ctx.persist() {
        tracing::warn!(device_id, %err, "failed to persist re-anchored next_run");
    }
    ctx.observers.notify_device_schedule_changed(device_id);
}


#[cfg(test)]
mod tests {
    use super::test_support::ContextBuilder;
    use super::*;
    use crate::domain::{ImageRecord, PowerState};
    use tempfile::TempDir;

    fn img(id: &str) -> ImageRecord {
        ImageRecord::new(id, Vec::new())
    }

    #[tokio::test]
    async fn test_enable_anchors_and_fires_immediately() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg"), img("b.jpg")])
            .build();
        built.power.note_power("tv-1", PowerState::On);
        let scheduler = DeviceScheduler::new(built.ctx.clone());

        let outcome = scheduler.enable("tv-1").await.unwrap();
        assert!(matches!(outcome, ShuffleOutcome::Displayed { .. }));

        let state = built.ctx.state.lock().unwrap();
        let device = &state.devices["tv-1"];
        assert!(device.auto_enabled);
        let next = device.next_run.expect("next_run anchored");
        assert!(next > Utc::now());
        assert!(next <= Utc::now() + Duration::minutes(device.frequency_minutes as i64));
    }

    #[tokio::test]
    async fn test_enable_with_screen_off_still_schedules() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg")])
            .build();
        built.power.note_power("tv-1", PowerState::Off);
        let scheduler = DeviceScheduler::new(built.ctx.clone());

        let outcome = scheduler.enable("tv-1").await.unwrap();
        assert_eq!(outcome, ShuffleOutcome::SkippedPowerOff);
        assert!(built.ctx.state.lock().unwrap().devices["tv-1"].next_run.is_some());
    }

    #[tokio::test]
    async fn test_enable_unknown_device() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp).build();
        let scheduler = DeviceScheduler::new(built.ctx);
        assert!(matches!(
            scheduler.enable("ghost").await,
            Err(ArtloopError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_disable_clears_schedule() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg")])
            .build();
        let scheduler = DeviceScheduler::new(built.ctx.clone());
        scheduler.enable("tv-1").await.unwrap();

        scheduler.disable("tv-1").unwrap();

        let state = built.ctx.state.lock().unwrap();
        assert!(!state.devices["tv-1"].auto_enabled);
        assert!(state.devices["tv-1"].next_run.is_none());
        drop(state);
        assert!(scheduler.timers.lock().unwrap().is_empty());

        // Persisted too
        let persisted = built.ctx.store.load().unwrap();
        assert!(!persisted.devices["tv-1"].auto_enabled);
    }

    #[tokio::test]
    async fn test_set_frequency_rejects_zero() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp).device("tv-1").build();
        let scheduler = DeviceScheduler::new(built.ctx);
        assert!(matches!(
            scheduler.set_frequency("tv-1", 0),
            Err(ArtloopError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_set_frequency_reanchors_when_enabled() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg")])
            .build();
        let scheduler = DeviceScheduler::new(built.ctx.clone());
        scheduler.enable("tv-1").await.unwrap();

        scheduler.set_frequency("tv-1", 5).unwrap();

        let state = built.ctx.state.lock().unwrap();
        let device = &state.devices["tv-1"];
        assert_eq!(device.frequency_minutes, 5);
        let next = device.next_run.unwrap();
        assert!(next <= Utc::now() + Duration::minutes(5));
    }

    #[tokio::test]
    async fn test_set_frequency_while_disabled_keeps_next_run_empty() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp).device("tv-1").build();
        let scheduler = DeviceScheduler::new(built.ctx.clone());

        scheduler.set_frequency("tv-1", 30).unwrap();

        let state = built.ctx.state.lock().unwrap();
        assert_eq!(state.devices["tv-1"].frequency_minutes, 30);
        assert!(state.devices["tv-1"].next_run.is_none());
    }

    #[tokio::test]
    async fn test_timer_fires_when_next_run_arrives() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg"), img("b.jpg")])
            .build();
        built.power.note_power("tv-1", PowerState::On);
        {
            let mut state = built.ctx.state.lock().unwrap();
            let device = state.devices.get_mut("tv-1").unwrap();
            device.auto_enabled = true;
            device.next_run = Some(Utc::now() + Duration::milliseconds(50));
        }
        let scheduler = DeviceScheduler::new(built.ctx.clone());
        scheduler.arm_timer("tv-1");

        tokio::time::sleep(std::time::Duration::from_millis(500)).await;

        assert_eq!(built.transfer.calls().len(), 1);
        // next_run was re-anchored a full interval ahead
        let next = built.ctx.state.lock().unwrap().devices["tv-1"].next_run.unwrap();
        assert!(next > Utc::now() + Duration::minutes(30));
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_drifted_next_run_reanchors_without_firing() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg")])
            .build();
        built.power.note_power("tv-1", PowerState::On);
        {
            let mut state = built.ctx.state.lock().unwrap();
            let device = state.devices.get_mut("tv-1").unwrap();
            device.auto_enabled = true;
            // Two intervals overdue, as after a long suspend
            device.next_run = Some(Utc::now() - Duration::minutes(120));
        }
        let scheduler = DeviceScheduler::new(built.ctx.clone());
        scheduler.arm_timer("tv-1");

        tokio::time::sleep(std::time::Duration::from_millis(300)).await;

        assert!(built.transfer.calls().is_empty());
        let next = built.ctx.state.lock().unwrap().devices["tv-1"].next_run.unwrap();
        assert!(next > Utc::now());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_restore_reanchors_drifted_schedules() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .device("tv-2")
            .images(vec![img("a.jpg")])
            .build();
        let now = Utc::now();
        {
            let mut state = built.ctx.state.lock().unwrap();
            let drifted = state.devices.get_mut("tv-1").unwrap();
            drifted.auto_enabled = true;
            drifted.next_run = Some(now - Duration::hours(5));
            let healthy = state.devices.get_mut("tv-2").unwrap();
            healthy.auto_enabled = true;
            healthy.next_run = Some(now + Duration::minutes(10));
        }
        let scheduler = DeviceScheduler::new(built.ctx.clone());

        let drifted = scheduler.restore(now).unwrap();
        assert_eq!(drifted, vec!["tv-1".to_string()]);

        let state = built.ctx.state.lock().unwrap();
        assert!(state.devices["tv-1"].next_run.unwrap() > now);
        // Healthy schedule left alone
        assert_eq!(state.devices["tv-2"].next_run.unwrap(), now + Duration::minutes(10));
        drop(state);
        assert_eq!(scheduler.timers.lock().unwrap().len(), 2);
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_restore_anchors_missing_next_run() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp).device("tv-1").build();
        {
            let mut state = built.ctx.state.lock().unwrap();
            state.devices.get_mut("tv-1").unwrap().auto_enabled = true;
        }
        let scheduler = DeviceScheduler::new(built.ctx.clone());

        let drifted = scheduler.restore(Utc::now()).unwrap();
        assert!(drifted.is_empty());
        assert!(built.ctx.state.lock().unwrap().devices["tv-1"].next_run.is_some());
        scheduler.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_clears_timer_table() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg")])
            .build();
        let scheduler = DeviceScheduler::new(built.ctx.clone());
        scheduler.enable("tv-1").await.unwrap();

        scheduler.shutdown().await;
        assert!(scheduler.timers.lock().unwrap().is_empty());
    }
}
