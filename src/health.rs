//! Pool-health reporting.
//!
//! Answers "is this device's pool big enough for its shuffle frequency"
//! without touching any state: everything is derived from the library, the
//! active rules, and the event history at call time.

use std::collections::HashSet;

use chrono::Utc;
use serde::Serialize;

use crate::error::{ArtloopError, Result};
use crate::scheduler::SchedulerContext;
use crate::selection::{build_pools, recent_for};

/// Snapshot of one device's candidate pool
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolHealth {
    /// Eligible images under the active rules
    pub pool_size: usize,
    /// Eligible images shown on this device within the same-device window
    pub same_device_recent: usize,
    /// Eligible images shown elsewhere within the cross-device window
    pub cross_device_recent: usize,
    /// Eligible images that are not recent on either horizon
    pub available: usize,
    /// Hours of shuffling before the fresh supply runs out at the current
    /// frequency
    pub variety_hours: f64,
}

/// Compute the pool-health snapshot for a device
pub fn pool_health(ctx: &SchedulerContext, device_id: &str) -> Result<PoolHealth> {
    let now = Utc::now();

    let frequency_minutes = {
        let state = ctx.state.lock().expect("state lock poisoned");
        state
            .devices
            .get(device_id)
            .map(|d| d.frequency_minutes)
            .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?
    };

    let rules = ctx.tagsets.resolve_active(device_id, now);
    let images = ctx.library.list_images()?;
    // current_image stays in: health counts the whole eligible pool
    let pools = build_pools(&images, ctx.library.as_ref(), &rules, None);

    let pool_ids: HashSet<&str> = pools
        .categories()
        .flat_map(|cat| pools.pool(cat).unwrap_or(&[]))
        .map(|id| id.as_str())
        .collect();

    let recent = recent_for(ctx.activity.as_ref(), ctx.windows, device_id, now)?;
    let same_device_recent = pool_ids
        .iter()
        .filter(|id| recent.same_device.contains(**id))
        .count();
    let cross_device_recent = pool_ids
        .iter()
        .filter(|id| recent.cross_device.contains(**id))
        .count();
    let available = pool_ids.iter().filter(|id| !recent.contains(id)).count();

    let variety_hours = available as f64 * frequency_minutes as f64 / 60.0;

    Ok(PoolHealth {
        pool_size: pool_ids.len(),
        same_device_recent,
        cross_device_recent,
        available,
        variety_hours,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ActivityLog;
    use crate::domain::{DisplayEvent, ImageRecord, Tagset, Trigger};
    use crate::scheduler::test_support::ContextBuilder;
    use chrono::Duration;
    use tempfile::TempDir;

    fn img(id: &str, cats: &[&str]) -> ImageRecord {
        ImageRecord::new(id, cats.iter().map(|s| s.to_string()).collect())
    }

    #[tokio::test]
    async fn test_health_counts_pool_and_recency() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![
                img("a.jpg", &["zebra"]),
                img("b.jpg", &["zebra"]),
                img("c.jpg", &["zebra"]),
                img("out.jpg", &["monkey"]),
            ])
            .tagset("zebras", Tagset::with_include(vec!["zebra".to_string()]))
            .select("tv-1", "zebras")
            .build();

        let now = Utc::now();
        built
            .activity
            .record_event(&DisplayEvent::displayed(
                "tv-1",
                "a.jpg",
                None,
                Trigger::Scheduled,
                now - Duration::hours(2),
            ))
            .unwrap();
        built
            .activity
            .record_event(&DisplayEvent::displayed(
                "tv-2",
                "b.jpg",
                None,
                Trigger::Scheduled,
                now - Duration::hours(2),
            ))
            .unwrap();

        let health = pool_health(&built.ctx, "tv-1").unwrap();
        assert_eq!(health.pool_size, 3);
        assert_eq!(health.same_device_recent, 1);
        assert_eq!(health.cross_device_recent, 1);
        assert_eq!(health.available, 1);
        // One fresh image at the default 60 minute frequency
        assert!((health.variety_hours - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_health_ignores_recent_images_outside_pool() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .images(vec![img("a.jpg", &["zebra"]), img("out.jpg", &["monkey"])])
            .tagset("zebras", Tagset::with_include(vec!["zebra".to_string()]))
            .select("tv-1", "zebras")
            .build();

        built
            .activity
            .record_event(&DisplayEvent::displayed(
                "tv-1",
                "out.jpg",
                None,
                Trigger::Manual,
                Utc::now(),
            ))
            .unwrap();

        let health = pool_health(&built.ctx, "tv-1").unwrap();
        assert_eq!(health.pool_size, 1);
        assert_eq!(health.same_device_recent, 0);
        assert_eq!(health.available, 1);
    }

    #[tokio::test]
    async fn test_health_unknown_device() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp).build();
        assert!(matches!(
            pool_health(&built.ctx, "ghost"),
            Err(ArtloopError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_health_empty_pool() {
        let temp = TempDir::new().unwrap();
        let built = ContextBuilder::new(&temp)
            .device("tv-1")
            .tagset("zebras", Tagset::with_include(vec!["zebra".to_string()]))
            .select("tv-1", "zebras")
            .build();

        let health = pool_health(&built.ctx, "tv-1").unwrap();
        assert_eq!(health.pool_size, 0);
        assert_eq!(health.available, 0);
        assert_eq!(health.variety_hours, 0.0);
    }
}
