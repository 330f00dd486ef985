//! The guarded shuffle pipeline.
//!
//! One pipeline serves both triggers: resolve rules, build pools, apply
//! the recency preference (scheduled runs only), draw, transfer, record.
//! Transfer gets exactly one retry after a delay; a second failure
//! surfaces as `ArtloopError::Transfer` and the scheduler keeps its
//! normal cadence. The device's transfer lock is held for the whole
//! pipeline so a slow upload cannot race a manual trigger.

use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::domain::{DisplayEvent, PowerState, Trigger};
use crate::error::{ArtloopError, Result};
use crate::guard::GuardOutcome;
use crate::selection::{build_pools, recent_for, select_image};

use super::SchedulerContext;

/// How one shuffle attempt ended, for logs and the CLI
#[derive(Debug, Clone, PartialEq)]
pub enum ShuffleOutcome {
    /// An image was transferred and is now on screen
    Displayed {
        image_id: String,
        category: Option<String>,
    },
    /// The only eligible image is already on screen; nothing was sent
    NoShuffle,
    /// No image matched the active rules
    NoCandidates,
    /// Screen is not known to be on; scheduled run skipped
    SkippedPowerOff,
    /// Another transfer for this device was already in flight
    SkippedBusy,
}

impl std::fmt::Display for ShuffleOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShuffleOutcome::Displayed { image_id, category } => match category {
                Some(cat) => write!(f, "displayed {image_id} ({cat})"),
                None => write!(f, "displayed {image_id}"),
            },
            ShuffleOutcome::NoShuffle => write!(f, "no shuffle: current image is the only candidate"),
            ShuffleOutcome::NoCandidates => write!(f, "no image matches the active rules"),
            ShuffleOutcome::SkippedPowerOff => write!(f, "skipped: screen is not on"),
            ShuffleOutcome::SkippedBusy => write!(f, "skipped: transfer already in flight"),
        }
    }
}

/// Run one shuffle for a device.
///
/// `gate_on_power` is set for scheduled ticks: the run is skipped unless
/// the last-known power state is On. Manual runs bypass the gate and the
/// recency filter.
pub(crate) async fn shuffle_device(
    ctx: &SchedulerContext,
    device_id: &str,
    trigger: Trigger,
    gate_on_power: bool,
) -> Result<ShuffleOutcome> {
    if gate_on_power {
        let power = ctx.power.last_known(device_id);
        if power != PowerState::On {
            tracing::info!(device_id, power = ?power, "screen not known to be on, skipping shuffle");
            return Ok(ShuffleOutcome::SkippedPowerOff);
        }
    }

    match ctx
        .guard
        .run_guarded(device_id, run_pipeline(ctx, device_id, trigger))
        .await
    {
        GuardOutcome::Completed(result) => result,
        GuardOutcome::Busy => Ok(ShuffleOutcome::SkippedBusy),
    }
}

async fn run_pipeline(
    ctx: &SchedulerContext,
    device_id: &str,
    trigger: Trigger,
) -> Result<ShuffleOutcome> {
    let now = Utc::now();

    let (address, current_image) = {
        let state = ctx.state.lock().expect("state lock poisoned");
        let device = state
            .devices
            .get(device_id)
            .ok_or_else(|| ArtloopError::DeviceNotFound(device_id.to_string()))?;
        (device.address.clone(), device.current_image.clone())
    };

    let rules = ctx.tagsets.resolve_active(device_id, now);
    let images = ctx.library.list_images()?;
    let pools = build_pools(&images, ctx.library.as_ref(), &rules, current_image.as_deref());

    if pools.only_current_remains() {
        tracing::info!(device_id, "only the current image is eligible, leaving it up");
        return Ok(ShuffleOutcome::NoShuffle);
    }

    let recent = if trigger == Trigger::Scheduled {
        Some(recent_for(ctx.activity.as_ref(), ctx.windows, device_id, now)?)
    } else {
        None
    };

    let selection = {
        let mut rng = StdRng::from_entropy();
        select_image(&mut rng, &pools, &rules.weights, recent.as_ref())
    };
    let Some(selection) = selection else {
        tracing::warn!(
            device_id,
            tagset = rules.tagset_name.as_deref().unwrap_or("-"),
            "no image matches the active rules"
        );
        return Ok(ShuffleOutcome::NoCandidates);
    };

    if selection.used_fallback {
        tracing::info!(
            device_id,
            "every candidate in the rolled category is recent, drawing from the full pool"
        );
    }

    // Pool building already checked the asset, but the file can disappear
    // between the check and the transfer
    let asset = ctx.library.asset_path(&selection.image_id).ok_or_else(|| {
        ArtloopError::Transfer(format!(
            "asset for {} disappeared before transfer",
            selection.image_id
        ))
    })?;
    let record = images.iter().find(|img| img.id == selection.image_id);
    let matte = record.and_then(|r| r.matte.as_deref());
    let photo_filter = record.and_then(|r| r.photo_filter.as_deref());

    let started_at = Utc::now();
    if let Err(first) = ctx
        .transfer
        .transfer(&address, &asset, matte, photo_filter)
        .await
    {
        tracing::warn!(device_id, image = %selection.image_id, %first, "transfer failed, retrying once");
        tokio::time::sleep(ctx.retry_delay).await;
        if let Err(second) = ctx
            .transfer
            .transfer(&address, &asset, matte, photo_filter)
            .await
        {
            ctx.activity.record_event(&DisplayEvent::failed(
                device_id,
                &selection.image_id,
                trigger,
                started_at,
            ))?;
            return Err(second);
        }
    }

    ctx.activity.record_event(&DisplayEvent::displayed(
        device_id,
        &selection.image_id,
        selection.category.clone(),
        trigger,
        started_at,
    ))?;

    let snapshot = {
        let mut state = ctx.state.lock().expect("state lock poisoned");
        if let Some(device) = state.devices.get_mut(device_id) {
            device.current_image = Some(selection.image_id.clone());
        }
        state.clone()
    };
    ctx.store.save(&snapshot)?;
    ctx.observers.notify_image_displayed(device_id, &selection.image_id);

    tracing::info!(
        device_id,
        image = %selection.image_id,
        category = selection.category.as_deref().unwrap_or("-"),
        trigger = trigger.as_str(),
        "image displayed"
    );

    Ok(ShuffleOutcome::Displayed {
        image_id: selection.image_id,
        category: selection.category,
    })
}
