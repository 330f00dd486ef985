//! Named rule sets: include/exclude categories plus per-category weights.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Lowest accepted category weight; lower values are clamped up
pub const MIN_WEIGHT: f64 = 0.1;
/// Highest accepted category weight; higher values are clamped down
pub const MAX_WEIGHT: f64 = 10.0;
/// Weight used for categories with no configured weight
pub const DEFAULT_WEIGHT: f64 = 1.0;

/// A named rule set controlling which images a device may display
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Tagset {
    /// Categories to include, in priority order (order breaks weight ties)
    #[serde(default)]
    pub include: Vec<String>,

    /// Categories to exclude; any match disqualifies an image
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Optional per-category selection weights; missing = 1.0
    #[serde(default)]
    pub weights: HashMap<String, f64>,
}

impl Tagset {
    /// Create a tagset with include categories only
    pub fn with_include(include: Vec<String>) -> Self {
        Self {
            include,
            ..Default::default()
        }
    }

    /// Weight for a category, defaulting and clamping into [0.1, 10.0]
    pub fn weight_of(&self, category: &str) -> f64 {
        self.weights
            .get(category)
            .copied()
            .map(|w| w.clamp(MIN_WEIGHT, MAX_WEIGHT))
            .unwrap_or(DEFAULT_WEIGHT)
    }

    /// Clamp out-of-range weights and drop weights for categories that are
    /// not in the include list. Returns human-readable notes for anything
    /// that was repaired; the caller logs them as warnings.
    pub fn normalize(&mut self) -> Vec<String> {
        let mut notes = Vec::new();

        let stray: Vec<String> = self
            .weights
            .keys()
            .filter(|cat| !self.include.contains(cat))
            .cloned()
            .collect();
        for cat in stray {
            self.weights.remove(&cat);
            notes.push(format!("weight for '{cat}' ignored: not in include list"));
        }

        for (cat, weight) in self.weights.iter_mut() {
            if *weight < MIN_WEIGHT || *weight > MAX_WEIGHT {
                let clamped = weight.clamp(MIN_WEIGHT, MAX_WEIGHT);
                notes.push(format!(
                    "weight {weight} for '{cat}' out of range, clamped to {clamped}"
                ));
                *weight = clamped;
            }
        }

        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagset_with_weights(include: &[&str], weights: &[(&str, f64)]) -> Tagset {
        Tagset {
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: Vec::new(),
            weights: weights
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_weight_of_default() {
        let ts = Tagset::with_include(vec!["zebra".to_string()]);
        assert_eq!(ts.weight_of("zebra"), DEFAULT_WEIGHT);
    }

    #[test]
    fn test_weight_of_configured() {
        let ts = tagset_with_weights(&["zebra"], &[("zebra", 4.0)]);
        assert_eq!(ts.weight_of("zebra"), 4.0);
    }

    #[test]
    fn test_weight_of_clamps_on_read() {
        let ts = tagset_with_weights(&["zebra", "lion"], &[("zebra", 99.0), ("lion", 0.001)]);
        assert_eq!(ts.weight_of("zebra"), MAX_WEIGHT);
        assert_eq!(ts.weight_of("lion"), MIN_WEIGHT);
    }

    #[test]
    fn test_normalize_clamps_and_reports() {
        let mut ts = tagset_with_weights(&["zebra"], &[("zebra", 50.0)]);
        let notes = ts.normalize();
        assert_eq!(notes.len(), 1);
        assert_eq!(ts.weight_of("zebra"), MAX_WEIGHT);
    }

    #[test]
    fn test_normalize_drops_stray_weights() {
        let mut ts = tagset_with_weights(&["zebra"], &[("lion", 2.0)]);
        let notes = ts.normalize();
        assert_eq!(notes.len(), 1);
        assert!(!ts.weights.contains_key("lion"));
    }

    #[test]
    fn test_normalize_clean_tagset_is_silent() {
        let mut ts = tagset_with_weights(&["zebra", "lion"], &[("zebra", 4.0)]);
        assert!(ts.normalize().is_empty());
    }
}
