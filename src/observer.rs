//! Observer interface for configuration surfaces.
//!
//! The scheduler and tagset store announce changes through this trait so a
//! UI can refresh; the concrete transport (push, poll, websocket) is an
//! external concern.

use std::sync::{Arc, RwLock};

/// Receives notifications about state changes. All methods default to no-ops
/// so implementors only override what they care about.
pub trait ScheduleObserver: Send + Sync {
    /// A tagset was created, updated, or deleted
    fn on_tagset_changed(&self, _name: &str) {}

    /// A device's selection, override, or schedule changed
    fn on_device_schedule_changed(&self, _device_id: &str) {}

    /// An image was successfully displayed on a device
    fn on_image_displayed(&self, _device_id: &str, _image_id: &str) {}
}

/// Registered observers, shared between the store and the scheduler
#[derive(Default, Clone)]
pub struct Observers {
    inner: Arc<RwLock<Vec<Arc<dyn ScheduleObserver>>>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, observer: Arc<dyn ScheduleObserver>) {
        self.inner.write().expect("observer lock poisoned").push(observer);
    }

    pub fn notify_tagset_changed(&self, name: &str) {
        for obs in self.inner.read().expect("observer lock poisoned").iter() {
            obs.on_tagset_changed(name);
        }
    }

    pub fn notify_device_schedule_changed(&self, device_id: &str) {
        for obs in self.inner.read().expect("observer lock poisoned").iter() {
            obs.on_device_schedule_changed(device_id);
        }
    }

    pub fn notify_image_displayed(&self, device_id: &str, image_id: &str) {
        for obs in self.inner.read().expect("observer lock poisoned").iter() {
            obs.on_image_displayed(device_id, image_id);
        }
    }
}
