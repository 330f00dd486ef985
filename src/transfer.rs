//! Device transfer and power-state collaborators.
//!
//! The wire protocol is opaque to the selection core: `DeviceTransfer`
//! either puts the image on screen or fails, and retry policy beyond the
//! pipeline's single retry lives behind this seam. `PowerStateCache` is
//! cache-only - the scheduler must never probe a device just to decide
//! whether to skip a tick, since the probe itself can wake the panel.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::PowerState;
use crate::error::{ArtloopError, Result};

/// Pushes an image to a display device
#[async_trait]
pub trait DeviceTransfer: Send + Sync {
    /// Transfer the asset and make it the displayed image.
    ///
    /// `matte` and `photo_filter` are passed through untouched; failures
    /// surface as `ArtloopError::Transfer`.
    async fn transfer(
        &self,
        address: &str,
        asset: &Path,
        matte: Option<&str>,
        photo_filter: Option<&str>,
    ) -> Result<()>;
}

/// Last-known power state, readable without touching the network
pub trait PowerStateSource: Send + Sync {
    fn last_known(&self, device_id: &str) -> PowerState;
}

/// HTTP transfer adapter: POSTs the asset bytes to the device's art
/// endpoint.
pub struct HttpTransfer {
    client: reqwest::Client,
    port: u16,
}

impl HttpTransfer {
    pub fn new(port: u16) -> Self {
        Self {
            client: reqwest::Client::new(),
            port,
        }
    }
}

#[async_trait]
impl DeviceTransfer for HttpTransfer {
    async fn transfer(
        &self,
        address: &str,
        asset: &Path,
        matte: Option<&str>,
        photo_filter: Option<&str>,
    ) -> Result<()> {
        let bytes = tokio::fs::read(asset).await.map_err(|e| {
            ArtloopError::Transfer(format!("failed to read asset {}: {e}", asset.display()))
        })?;

        let mut url = format!("http://{address}:{}/api/art", self.port);
        let mut params = Vec::new();
        if let Some(matte) = matte {
            params.push(format!("matte={matte}"));
        }
        if let Some(filter) = photo_filter {
            params.push(format!("filter={filter}"));
        }
        if !params.is_empty() {
            url = format!("{url}?{}", params.join("&"));
        }

        let response = self
            .client
            .post(&url)
            .body(bytes)
            .send()
            .await
            .map_err(|e| ArtloopError::Transfer(format!("{address} unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(ArtloopError::Transfer(format!(
                "{address} rejected transfer: HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Shared cache of last-known device power states
#[derive(Default, Clone)]
pub struct PowerStateCache {
    inner: Arc<Mutex<std::collections::HashMap<String, PowerState>>>,
}

impl PowerStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an observed power state (from a poll, a power command, or a
    /// successful transfer)
    pub fn note_power(&self, device_id: &str, state: PowerState) {
        self.inner
            .lock()
            .expect("power cache poisoned")
            .insert(device_id.to_string(), state);
    }
}

impl PowerStateSource for PowerStateCache {
    fn last_known(&self, device_id: &str) -> PowerState {
        self.inner
            .lock()
            .expect("power cache poisoned")
            .get(device_id)
            .copied()
            .unwrap_or(PowerState::Unknown)
    }
}

/// Test transfer that records calls and can fail the first N attempts
#[derive(Default)]
pub struct RecordingTransfer {
    calls: Mutex<Vec<(String, String)>>,
    failures_remaining: Mutex<u32>,
}

impl RecordingTransfer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` transfer attempts before succeeding
    pub fn fail_next(&self, count: u32) {
        *self.failures_remaining.lock().expect("transfer mock poisoned") = count;
    }

    /// (address, asset filename) pairs, in call order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().expect("transfer mock poisoned").clone()
    }
}

#[async_trait]
impl DeviceTransfer for RecordingTransfer {
    async fn transfer(
        &self,
        address: &str,
        asset: &Path,
        _matte: Option<&str>,
        _photo_filter: Option<&str>,
    ) -> Result<()> {
        let filename = asset
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        self.calls
            .lock()
            .expect("transfer mock poisoned")
            .push((address.to_string(), filename));

        let mut failures = self.failures_remaining.lock().expect("transfer mock poisoned");
        if *failures > 0 {
            *failures -= 1;
            return Err(ArtloopError::Transfer("injected failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_power_cache_defaults_to_unknown() {
        let cache = PowerStateCache::new();
        assert_eq!(cache.last_known("tv-1"), PowerState::Unknown);
    }

    #[test]
    fn test_power_cache_round_trip() {
        let cache = PowerStateCache::new();
        cache.note_power("tv-1", PowerState::On);
        cache.note_power("tv-2", PowerState::Off);
        assert_eq!(cache.last_known("tv-1"), PowerState::On);
        assert_eq!(cache.last_known("tv-2"), PowerState::Off);
    }

    #[tokio::test]
    async fn test_recording_transfer_records_calls() {
        let transfer = RecordingTransfer::new();
        transfer
            .transfer("192.168.1.50", &PathBuf::from("/lib/a.jpg"), None, None)
            .await
            .unwrap();
        assert_eq!(
            transfer.calls(),
            vec![("192.168.1.50".to_string(), "a.jpg".to_string())]
        );
    }

    #[tokio::test]
    async fn test_recording_transfer_injected_failures() {
        let transfer = RecordingTransfer::new();
        transfer.fail_next(1);
        let err = transfer
            .transfer("host", &PathBuf::from("a.jpg"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtloopError::Transfer(_)));
        // Next attempt succeeds
        transfer
            .transfer("host", &PathBuf::from("a.jpg"), None, None)
            .await
            .unwrap();
        assert_eq!(transfer.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_http_transfer_missing_asset_is_transfer_error() {
        let transfer = HttpTransfer::new(8002);
        let err = transfer
            .transfer("127.0.0.1", &PathBuf::from("/does/not/exist.jpg"), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtloopError::Transfer(_)));
    }
}
