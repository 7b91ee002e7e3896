//! Distance metrics.
//!
//! Two metrics are supported: squared Euclidean distance and inner product.
//!
//! ## Important nuance
//!
//! Internally every metric is a *distance*: smaller is better. For inner
//! product that distance is the negated dot product. Results handed back to
//! callers use the metric's natural value instead: squared L2 distance
//! (ascending) or the inner-product score (descending). [`Metric::to_output`]
//! does the conversion.

use crate::precision::Element;
use crate::simd;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Distance metric for dense vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    /// Squared Euclidean (L2) distance.
    L2,
    /// Inner product (maximum inner product search).
    InnerProduct,
}

impl Metric {
    /// Internal distance between a full-precision query and a stored row.
    ///
    /// Smaller is always closer.
    #[inline]
    #[must_use]
    pub fn distance<E: Element>(self, query: &[f32], row: &[E]) -> f32 {
        match self {
            Metric::L2 => simd::l2_distance_squared(query, row),
            Metric::InnerProduct => -simd::dot(query, row),
        }
    }

    /// Convert an internal distance to the value reported to callers.
    #[inline]
    #[must_use]
    pub fn to_output(self, distance: f32) -> f32 {
        match self {
            Metric::L2 => distance,
            Metric::InnerProduct => -distance,
        }
    }

    /// Whether `a` ranks at or before `b` in caller-facing order.
    #[inline]
    #[must_use]
    pub fn is_not_worse(self, a: f32, b: f32) -> bool {
        match self {
            Metric::L2 => a <= b,
            Metric::InnerProduct => a >= b,
        }
    }

    pub(crate) fn tag(self) -> u8 {
        match self {
            Metric::L2 => 0,
            Metric::InnerProduct => 1,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Metric::L2),
            1 => Some(Metric::InnerProduct),
            _ => None,
        }
    }
}

/// Total order on (distance, index) pairs: ascending distance, ties by ascending index.
#[inline]
pub(crate) fn cmp_candidates(a: (u32, f32), b: (u32, f32)) -> Ordering {
    a.1.total_cmp(&b.1).then(a.0.cmp(&b.0))
}
