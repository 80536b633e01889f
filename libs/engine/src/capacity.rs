//! Remaining-capacity derivation and the selectable filter.

use tracing::debug;

use crate::resource::CapacityCounts;

/// Anything that carries capacity figures.
pub trait Capacity {
    fn counts(&self) -> &CapacityCounts;

    fn remaining_capacity(&self) -> u64 {
        remaining_capacity(self.counts())
    }

    fn is_selectable(&self) -> bool {
        self.remaining_capacity() > 0
    }
}

/// Derive remaining capacity, never below zero.
///
/// A precomputed `remaining` wins over `total - allocated`. A missing
/// `allocated` counts as zero; with neither `remaining` nor `total` the
/// capacity is unknown and treated as zero.
pub fn remaining_capacity(counts: &CapacityCounts) -> u64 {
    if let Some(remaining) = counts.remaining {
        if let Some(total) = counts.total {
            let derived = total.saturating_sub(counts.allocated.unwrap_or(0));
            if derived != remaining {
                debug!(
                    remaining,
                    derived, "Precomputed remaining capacity disagrees with total - allocated"
                );
            }
        }
        return clamp(remaining);
    }

    match counts.total {
        Some(total) => clamp(total.saturating_sub(counts.allocated.unwrap_or(0))),
        None => 0,
    }
}

fn clamp(value: i64) -> u64 {
    if value < 0 {
        debug!(value, "Negative remaining capacity clamped to zero");
    }
    value.max(0) as u64
}

/// Items that may be offered for a new assignment, in input order.
pub fn selectable<C: Capacity>(items: &[C]) -> Vec<&C> {
    items.iter().filter(|item| item.is_selectable()).collect()
}
