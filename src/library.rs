//! Image library collaborators.
//!
//! The library owns the image files and their category assignments; this
//! crate only enumerates records and checks that assets still exist.
//! `JsonLibrary` reads the shared `metadata.json` document maintained by
//! the library manager, with a plain directory scan as fallback when no
//! metadata file is present (everything untagged).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::domain::ImageRecord;
use crate::error::{ArtloopError, Result};

/// Read-only view of the image library
pub trait ImageLibrary: Send + Sync {
    /// Enumerate all known images
    fn list_images(&self) -> Result<Vec<ImageRecord>>;

    /// Path to the underlying asset, or None when the file is missing
    fn asset_path(&self, id: &str) -> Option<PathBuf>;
}

const METADATA_FILENAME: &str = "metadata.json";
const ASSET_DIRNAME: &str = "library";

#[derive(Debug, Default, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    images: BTreeMap<String, MetadataImage>,
}

#[derive(Debug, Default, Deserialize)]
struct MetadataImage {
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    matte: Option<String>,
    #[serde(default, rename = "filter")]
    photo_filter: Option<String>,
}

/// Library rooted at a directory holding `metadata.json` and `library/`
#[derive(Debug, Clone)]
pub struct JsonLibrary {
    root: PathBuf,
}

impl JsonLibrary {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILENAME)
    }

    fn asset_dir(&self) -> PathBuf {
        self.root.join(ASSET_DIRNAME)
    }

    /// Scan the asset directory directly when no metadata file exists
    fn scan_assets(&self) -> Result<Vec<ImageRecord>> {
        let pattern = format!("{}/*", self.asset_dir().display());
        let mut records = Vec::new();
        for entry in glob::glob(&pattern)
            .map_err(|e| ArtloopError::Storage(format!("bad glob pattern: {e}")))?
        {
            let path = entry.map_err(|e| ArtloopError::Storage(e.to_string()))?;
            if !path.is_file() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                records.push(ImageRecord::new(name, Vec::new()));
            }
        }
        Ok(records)
    }
}

impl ImageLibrary for JsonLibrary {
    fn list_images(&self) -> Result<Vec<ImageRecord>> {
        let metadata_path = self.metadata_path();
        if !metadata_path.exists() {
            return self.scan_assets();
        }

        let raw = std::fs::read_to_string(&metadata_path)?;
        let metadata: MetadataFile = serde_json::from_str(&raw)?;

        let records = metadata
            .images
            .into_iter()
            .map(|(filename, img)| {
                // The library writes the literal string "none" for no filter
                let photo_filter = img
                    .photo_filter
                    .filter(|f| !f.eq_ignore_ascii_case("none"));
                ImageRecord {
                    id: filename,
                    categories: img.tags,
                    matte: img.matte,
                    photo_filter,
                }
            })
            .collect();
        Ok(records)
    }

    fn asset_path(&self, id: &str) -> Option<PathBuf> {
        let path = self.asset_dir().join(id);
        path.exists().then_some(path)
    }
}

/// In-memory library for tests and demos; every record's asset "exists"
#[derive(Debug, Clone, Default)]
pub struct MemoryLibrary {
    images: Vec<ImageRecord>,
    missing: Vec<String>,
}

impl MemoryLibrary {
    pub fn new(images: Vec<ImageRecord>) -> Self {
        Self {
            images,
            missing: Vec::new(),
        }
    }

    /// Mark an asset as missing on disk while keeping its record listed
    pub fn mark_missing(&mut self, id: impl Into<String>) {
        self.missing.push(id.into());
    }
}

impl ImageLibrary for MemoryLibrary {
    fn list_images(&self) -> Result<Vec<ImageRecord>> {
        Ok(self.images.clone())
    }

    fn asset_path(&self, id: &str) -> Option<PathBuf> {
        if self.missing.iter().any(|m| m == id) {
            return None;
        }
        self.images
            .iter()
            .any(|img| img.id == id)
            .then(|| PathBuf::from(format!("/memory/{id}")))
    }
}
