//! State persistence.
//!
//! The whole `ShufflerState` document is written in one atomic step
//! (temp file + fsync + rename) so a crash mid-write can never leave a
//! partially-updated document behind. The state directory is keyed by a
//! hash of the library path, letting several instances coexist on one
//! machine without stepping on each other.

pub mod state;

pub use state::{STATE_VERSION, ShufflerState};

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::{ArtloopError, Result};

const STATE_FILENAME: &str = "state.json";

/// Loads and saves the persisted state document
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Open the store at the default location for the given library path.
    ///
    /// The store lives at `~/.artloop/<library-hash>/state.json`.
    pub fn open(library_dir: &Path) -> Result<Self> {
        let hash = library_hash(library_dir);
        let base = dirs::home_dir()
            .ok_or_else(|| ArtloopError::Storage("cannot determine home directory".to_string()))?
            .join(".artloop")
            .join(hash);
        Self::open_at(&base)
    }

    /// Open the store at a specific directory. Useful for tests.
    pub fn open_at(base_dir: &Path) -> Result<Self> {
        fs::create_dir_all(base_dir).map_err(|e| {
            ArtloopError::Storage(format!(
                "failed to create state directory {}: {e}",
                base_dir.display()
            ))
        })?;
        Ok(Self {
            path: base_dir.join(STATE_FILENAME),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state document, returning the default when none exists yet
    pub fn load(&self) -> Result<ShufflerState> {
        if !self.path.exists() {
            return Ok(ShufflerState::default());
        }
        let raw = fs::read_to_string(&self.path)?;
        let state: ShufflerState = serde_json::from_str(&raw)?;
        if state.version > STATE_VERSION {
            return Err(ArtloopError::Storage(format!(
                "state file version {} is newer than supported version {}",
                state.version, STATE_VERSION
            )));
        }
        Ok(state)
    }

    /// Persist the whole document atomically
    pub fn save(&self, state: &ShufflerState) -> Result<()> {
        let json = serde_json::to_string_pretty(state)?;
        let tmp_path = self.path.with_extension("json.tmp");

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(json.as_bytes())?;
        tmp.sync_all()?;
        drop(tmp);

        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Short stable hash of the library path, used as the state directory name
fn library_hash(path: &Path) -> String {
    let digest = Sha256::digest(path.to_string_lossy().as_bytes());
    hex::encode(&digest[..8])
}
