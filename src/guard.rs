//! Per-device execution guard.
//!
//! Display devices cannot handle two concurrent transfers, so every code
//! path that uploads to a device (manual trigger or scheduled tick) must go
//! through `run_guarded`. Contention policy: a second caller for the same
//! device is **rejected** (`GuardOutcome::Busy`), not queued; the caller
//! logs the skip and tries again on its next trigger. Different devices
//! never contend with each other.
//!
//! The lock is released when the operation future completes, including on
//! failure, so a failed transfer can never wedge a device's scheduling.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Result of a guarded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome<T> {
    /// The operation ran to completion while holding the device lock
    Completed(T),
    /// Another operation for the same device was already in flight
    Busy,
}

impl<T> GuardOutcome<T> {
    pub fn is_busy(&self) -> bool {
        matches!(self, GuardOutcome::Busy)
    }

    /// The completed value, if any
    pub fn into_completed(self) -> Option<T> {
        match self {
            GuardOutcome::Completed(value) => Some(value),
            GuardOutcome::Busy => None,
        }
    }
}

/// Owns the per-device lock table. Construct once and share.
#[derive(Default)]
pub struct ExecutionGuard {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExecutionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, device_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("guard lock table poisoned");
        locks
            .entry(device_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Run `operation` while holding the device's transfer lock.
    ///
    /// Rejects immediately when the lock is already held.
    pub async fn run_guarded<T, F>(&self, device_id: &str, operation: F) -> GuardOutcome<T>
    where
        F: Future<Output = T>,
    {
        let lock = self.lock_for(device_id);
        match lock.try_lock() {
            Ok(_held) => GuardOutcome::Completed(operation.await),
            Err(_) => {
                tracing::info!(device_id, "transfer already in flight, rejecting");
                GuardOutcome::Busy
            }
        }
    }
}
