//! Candidate pool builder.
//!
//! Partitions the eligible portion of the library into per-category pools
//! for one rule set. A multi-category image lands in exactly one pool: the
//! highest-weighted of its matching categories, ties broken by position in
//! the include list. The assignment is recomputed per invocation and never
//! persisted.

use crate::domain::ImageRecord;
use crate::library::ImageLibrary;
use crate::tagsets::ActiveRules;

/// Per-category pools for one selection, in include-list order.
///
/// When the rule set has no include categories every non-excluded image is
/// eligible and lands in a single implicit pool.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePools {
    pools: Vec<(String, Vec<String>)>,
    /// Distinct eligible images, counting the currently-displayed one
    pub eligible_count: usize,
    /// Whether the currently-displayed image was itself eligible
    pub current_was_eligible: bool,
    /// True when include was empty and a single implicit pool was built
    pub implicit: bool,
}

impl CandidatePools {
    /// Categories in stable order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.pools.iter().map(|(cat, _)| cat.as_str())
    }

    /// Candidate ids for a category
    pub fn pool(&self, category: &str) -> Option<&[String]> {
        self.pools
            .iter()
            .find(|(cat, _)| cat == category)
            .map(|(_, ids)| ids.as_slice())
    }

    /// Total candidates across all pools (current image already removed)
    pub fn candidate_count(&self) -> usize {
        self.pools.iter().map(|(_, ids)| ids.len()).sum()
    }

    /// No candidates remain in any pool
    pub fn is_empty(&self) -> bool {
        self.candidate_count() == 0
    }

    /// The only eligible image is the one already on screen; selection
    /// should report "no shuffle performed" rather than re-display it
    pub fn only_current_remains(&self) -> bool {
        self.is_empty() && self.eligible_count == 1 && self.current_was_eligible
    }
}

/// Build per-category candidate pools under the given rules.
///
/// Images matching an exclude category or whose asset is missing are
/// dropped entirely. `current_image` counts as eligible but is removed
/// from every pool.
pub fn build_pools(
    images: &[ImageRecord],
    library: &dyn ImageLibrary,
    rules: &ActiveRules,
    current_image: Option<&str>,
) -> CandidatePools {
    let implicit = rules.include.is_empty();
    let mut pools: Vec<(String, Vec<String>)> = if implicit {
        vec![(String::new(), Vec::new())]
    } else {
        rules
            .include
            .iter()
            .map(|cat| (cat.clone(), Vec::new()))
            .collect()
    };

    let mut eligible_count = 0;
    let mut current_was_eligible = false;

    for image in images {
        if rules.exclude.iter().any(|cat| image.has_category(cat)) {
            continue;
        }
        if library.asset_path(&image.id).is_none() {
            tracing::debug!(image = %image.id, "skipping image with missing asset");
            continue;
        }

        let pool_index = if implicit {
            Some(0)
        } else {
            best_matching_index(image, rules)
        };
        let Some(index) = pool_index else {
            continue;
        };

        eligible_count += 1;
        if current_image == Some(image.id.as_str()) {
            current_was_eligible = true;
            continue;
        }
        pools[index].1.push(image.id.clone());
    }

    CandidatePools {
        pools,
        eligible_count,
        current_was_eligible,
        implicit,
    }
}

/// Index into the include list of the best matching category:
/// argmax(weight), earliest include position on ties. None when the image
/// matches no include category.
fn best_matching_index(image: &ImageRecord, rules: &ActiveRules) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, cat) in rules.include.iter().enumerate() {
        if !image.has_category(cat) {
            continue;
        }
        let weight = rules.weights.get(cat).copied().unwrap_or(1.0);
        match best {
            Some((_, best_weight)) if weight <= best_weight => {}
            _ => best = Some((index, weight)),
        }
    }
    best.map(|(index, _)| index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibrary;
    use std::collections::HashMap;

    fn img(id: &str, cats: &[&str]) -> ImageRecord {
        ImageRecord::new(id, cats.iter().map(|s| s.to_string()).collect())
    }

    fn rules(include: &[&str], exclude: &[&str], weights: &[(&str, f64)]) -> ActiveRules {
        ActiveRules {
            tagset_name: Some("test".to_string()),
            include: include.iter().map(|s| s.to_string()).collect(),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            weights: weights
                .iter()
                .map(|(k, v)| (k.to_string(), *v))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_exclude_drops_image() {
        let images = vec![img("a.jpg", &["zebra"]), img("b.jpg", &["zebra", "nsfw"])];
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&["zebra"], &["nsfw"], &[]), None);
        assert_eq!(pools.pool("zebra").unwrap(), &["a.jpg".to_string()]);
        assert_eq!(pools.eligible_count, 1);
    }

    #[test]
    fn test_missing_asset_dropped() {
        let images = vec![img("a.jpg", &["zebra"]), img("gone.jpg", &["zebra"])];
        let mut lib = MemoryLibrary::new(images.clone());
        lib.mark_missing("gone.jpg");
        let pools = build_pools(&images, &lib, &rules(&["zebra"], &[], &[]), None);
        assert_eq!(pools.pool("zebra").unwrap(), &["a.jpg".to_string()]);
    }

    #[test]
    fn test_multi_category_goes_to_highest_weight() {
        // Weights {A:4, B:2}: image in both always lands in A
        let images = vec![img("both.jpg", &["a", "b"])];
        let lib = MemoryLibrary::new(images.clone());
        let r = rules(&["a", "b"], &[], &[("a", 4.0), ("b", 2.0)]);
        for _ in 0..10 {
            let pools = build_pools(&images, &lib, &r, None);
            assert_eq!(pools.pool("a").unwrap(), &["both.jpg".to_string()]);
            assert!(pools.pool("b").unwrap().is_empty());
        }
    }

    #[test]
    fn test_weight_tie_breaks_by_include_order() {
        let images = vec![img("both.jpg", &["b", "a"])];
        let lib = MemoryLibrary::new(images.clone());
        // Equal weights: first include entry wins, consistently
        let r = rules(&["a", "b"], &[], &[("a", 2.0), ("b", 2.0)]);
        for _ in 0..10 {
            let pools = build_pools(&images, &lib, &r, None);
            assert_eq!(pools.pool("a").unwrap(), &["both.jpg".to_string()]);
            assert!(pools.pool("b").unwrap().is_empty());
        }
    }

    #[test]
    fn test_no_matching_include_drops_image() {
        let images = vec![img("a.jpg", &["monkey"])];
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&["zebra"], &[], &[]), None);
        assert!(pools.is_empty());
        assert_eq!(pools.eligible_count, 0);
    }

    #[test]
    fn test_empty_include_builds_implicit_pool() {
        let images = vec![img("a.jpg", &["zebra"]), img("b.jpg", &[])];
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&[], &[], &[]), None);
        assert!(pools.implicit);
        assert_eq!(pools.candidate_count(), 2);
    }

    #[test]
    fn test_exclude_none_drops_untagged_images() {
        let images = vec![img("plain.jpg", &[]), img("a.jpg", &["zebra"])];
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&[], &["none"], &[]), None);
        assert_eq!(pools.candidate_count(), 1);
        assert_eq!(pools.eligible_count, 1);
    }

    #[test]
    fn test_untagged_image_matches_none_category() {
        let images = vec![img("plain.jpg", &[])];
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&["none"], &[], &[]), None);
        assert_eq!(pools.pool("none").unwrap(), &["plain.jpg".to_string()]);
    }

    #[test]
    fn test_current_image_removed_from_pools() {
        let images = vec![img("a.jpg", &["zebra"]), img("b.jpg", &["zebra"])];
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&["zebra"], &[], &[]), Some("a.jpg"));
        assert_eq!(pools.pool("zebra").unwrap(), &["b.jpg".to_string()]);
        assert_eq!(pools.eligible_count, 2);
        assert!(pools.current_was_eligible);
    }

    #[test]
    fn test_only_current_remains() {
        let images = vec![img("a.jpg", &["zebra"])];
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&["zebra"], &[], &[]), Some("a.jpg"));
        assert!(pools.only_current_remains());
    }

    #[test]
    fn test_empty_pool_is_not_only_current() {
        let images: Vec<ImageRecord> = Vec::new();
        let lib = MemoryLibrary::new(images.clone());
        let pools = build_pools(&images, &lib, &rules(&["zebra"], &[], &[]), Some("a.jpg"));
        assert!(pools.is_empty());
        assert!(!pools.only_current_remains());
    }
}
