//! Recency preference across two independent time horizons.
//!
//! "Recent" = shown on this device within the same-device window, or shown
//! on any other device within the cross-device window. The preference is
//! soft: when everything in a pool is recent the caller falls back to the
//! unfiltered pool rather than blocking selection. Manual shuffles skip
//! the filter entirely.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::activity::ActivityLog;
use crate::error::Result;

/// The two recency horizons, in hours
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecencyWindows {
    /// Hours an image stays "recent" on the device it was shown on
    #[serde(default = "default_same_device_hours")]
    pub same_device_hours: u32,
    /// Hours an image stays "recent" after being shown on any other device
    #[serde(default = "default_cross_device_hours")]
    pub cross_device_hours: u32,
}

fn default_same_device_hours() -> u32 {
    120
}

fn default_cross_device_hours() -> u32 {
    24
}

impl Default for RecencyWindows {
    fn default() -> Self {
        Self {
            same_device_hours: default_same_device_hours(),
            cross_device_hours: default_cross_device_hours(),
        }
    }
}

/// Recently-shown image ids for one device, split by horizon
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecentImages {
    /// Shown on this device within the same-device window
    pub same_device: HashSet<String>,
    /// Shown on other devices within the cross-device window
    pub cross_device: HashSet<String>,
}

impl RecentImages {
    pub fn contains(&self, image_id: &str) -> bool {
        self.same_device.contains(image_id) || self.cross_device.contains(image_id)
    }

    /// Number of distinct recent images across both horizons
    pub fn len(&self) -> usize {
        self.same_device.union(&self.cross_device).count()
    }

    pub fn is_empty(&self) -> bool {
        self.same_device.is_empty() && self.cross_device.is_empty()
    }

    /// The subset of `pool` that is not recent
    pub fn fresh<'a>(&self, pool: &'a [String]) -> Vec<&'a String> {
        pool.iter().filter(|id| !self.contains(id)).collect()
    }
}

/// Query both horizons for a device.
///
/// The device's own displays within the cross-device window are subtracted
/// from the cross-device set so they are not double-counted against the
/// (usually longer) same-device window.
pub fn recent_for(
    log: &dyn ActivityLog,
    windows: RecencyWindows,
    device_id: &str,
    now: DateTime<Utc>,
) -> Result<RecentImages> {
    let same_device = log.recent_images(Some(device_id), windows.same_device_hours, now)?;
    let anywhere = log.recent_images(None, windows.cross_device_hours, now)?;
    let own_recent = log.recent_images(Some(device_id), windows.cross_device_hours, now)?;

    let cross_device = anywhere
        .into_iter()
        .filter(|id| !own_recent.contains(id))
        .collect();

    Ok(RecentImages {
        same_device,
        cross_device,
    })
}
