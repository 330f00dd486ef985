//! Image records as consumed from the external library.
//!
//! Images are read-only to this crate: the library owns the files and the
//! category assignments. An image with no categories at all belongs to the
//! reserved "none" category so untagged images can still be targeted by
//! rules.

use serde::{Deserialize, Serialize};

/// Reserved category for images that carry no categories of their own
pub const NONE_CATEGORY: &str = "none";

/// A single image in the library
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Identifier - filename within the library
    pub id: String,

    /// Categories (tags) assigned by the library; unordered, may be empty
    #[serde(default)]
    pub categories: Vec<String>,

    /// Optional matte passed through to the transfer collaborator
    #[serde(default)]
    pub matte: Option<String>,

    /// Optional photo filter passed through to the transfer collaborator
    #[serde(default)]
    pub photo_filter: Option<String>,
}

impl ImageRecord {
    /// Create an image record with categories and no matte/filter
    pub fn new(id: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            id: id.into(),
            categories,
            matte: None,
            photo_filter: None,
        }
    }

    /// Categories used for rule matching: the image's own, or ["none"]
    pub fn effective_categories(&self) -> Vec<&str> {
        if self.categories.is_empty() {
            vec![NONE_CATEGORY]
        } else {
            self.categories.iter().map(String::as_str).collect()
        }
    }

    /// Whether the image matches the given category (including "none")
    pub fn has_category(&self, category: &str) -> bool {
        self.effective_categories().contains(&category)
    }
}
