//! Weighted two-stage selection.
//!
//! Stage one rolls a category proportional to its configured weight,
//! re-rolling (with the empty category removed and the total recomputed)
//! whenever the rolled pool has no candidates. Stage two draws uniformly
//! among the category's images. Category share of selections therefore
//! converges to weight(c)/Σweight regardless of how many images each
//! category holds.
//!
//! The recency preference is applied within the rolled category: when
//! nothing in the pool is fresh, the full pool is used instead (recency is
//! a soft preference and must never block selection).

use rand::Rng;
use rand::seq::SliceRandom;

use super::pool::CandidatePools;
use super::recency::RecentImages;

/// A completed selection
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub image_id: String,
    /// The rolled category; None for the implicit single pool
    pub category: Option<String>,
    /// Fresh candidates in the rolled pool at selection time
    pub fresh_count: usize,
    /// True when recency was attempted but everything was recent
    pub used_fallback: bool,
}

/// Draw an image from the pools. Returns None when no category has any
/// candidate left.
pub fn select_image<R: Rng>(
    rng: &mut R,
    pools: &CandidatePools,
    weights: &std::collections::HashMap<String, f64>,
    recent: Option<&RecentImages>,
) -> Option<Selection> {
    let mut remaining: Vec<&str> = pools.categories().collect();

    while !remaining.is_empty() {
        let category_weights: Vec<f64> = remaining
            .iter()
            .map(|cat| weights.get(*cat).copied().unwrap_or(1.0))
            .collect();
        let total: f64 = category_weights.iter().sum();
        if total <= 0.0 {
            break;
        }

        let roll = rng.r#gen::<f64>() * total;
        let mut cumulative = 0.0;
        let mut rolled = *remaining.last().expect("remaining is non-empty");
        for (cat, weight) in remaining.iter().zip(&category_weights) {
            cumulative += weight;
            if roll < cumulative {
                rolled = cat;
                break;
            }
        }

        let candidates = pools.pool(rolled).unwrap_or(&[]);
        if candidates.is_empty() {
            tracing::debug!(category = rolled, "rolled category has no candidates, re-rolling");
            remaining.retain(|cat| *cat != rolled);
            continue;
        }

        let (image_id, fresh_count, used_fallback) = match recent {
            Some(recent) => {
                let fresh = recent.fresh(candidates);
                if fresh.is_empty() {
                    let id = candidates.choose(rng).expect("candidates is non-empty");
                    (id.clone(), 0, true)
                } else {
                    let count = fresh.len();
                    let id = *fresh.as_slice().choose(rng).expect("fresh is non-empty");
                    (id.clone(), count, false)
                }
            }
            None => {
                let id = candidates.choose(rng).expect("candidates is non-empty");
                (id.clone(), 0, false)
            }
        };

        return Some(Selection {
            image_id,
            category: (!pools.implicit).then(|| rolled.to_string()),
            fresh_count,
            used_fallback,
        });
    }

    None
}
