//! Distance kernels.
//!
//! When the `innr` feature is enabled (default), `f32` kernels come from the
//! `innr` crate. Otherwise portable loops are used.
//!
//! The left operand is always a full-precision query; the right operand is a
//! stored row in any [`Element`] representation. `f32` rows go straight to
//! the kernel. Half-precision rows are widened in fixed-size chunks on the
//! stack and each chunk is fed to the same `f32` kernel, so accumulation
//! stays in `f32`.
//!
//! Chunk boundaries depend only on `d`, never on the worker thread that runs
//! the kernel, so results are identical across execution contexts of
//! different widths.
//!
//! ```rust
//! use cagra::simd::{dot, l2_distance_squared};
//!
//! let a = [1.0_f32, 0.0, 0.0];
//! let b = [0.5_f32, 0.5, 0.0];
//!
//! assert_eq!(dot(&a, &b), 0.5);
//! assert_eq!(l2_distance_squared(&a, &b), 0.5);
//! ```

use crate::precision::Element;

#[cfg(feature = "innr")]
use innr as kernel;

#[cfg(not(feature = "innr"))]
mod kernel {
    //! Portable fallback when innr is not available.

    #[inline]
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[inline]
    pub fn l2_distance_squared(a: &[f32], b: &[f32]) -> f32 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| {
                let d = x - y;
                d * d
            })
            .sum()
    }
}

/// Components widened per chunk for half-precision rows.
const WIDEN_CHUNK: usize = 256;

#[inline]
fn chunked<E: Element>(a: &[f32], b: &[E], f: impl Fn(&[f32], &[f32]) -> f32) -> f32 {
    if let Some(b) = E::as_f32_slice(b) {
        return f(a, b);
    }
    let mut buf = [0.0f32; WIDEN_CHUNK];
    let mut acc = 0.0f32;
    for (qa, rb) in a.chunks(WIDEN_CHUNK).zip(b.chunks(WIDEN_CHUNK)) {
        let wide = &mut buf[..rb.len()];
        E::widen_into(rb, wide);
        acc += f(qa, wide);
    }
    acc
}

/// Dot product of a full-precision query and a stored row.
#[inline]
#[must_use]
pub fn dot<E: Element>(a: &[f32], b: &[E]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    chunked(a, b, kernel::dot)
}

/// Squared L2 distance of a full-precision query and a stored row.
#[inline]
#[must_use]
pub fn l2_distance_squared<E: Element>(a: &[f32], b: &[E]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    chunked(a, b, kernel::l2_distance_squared)
}

/// L2 norm of a full-precision vector.
#[inline]
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    dot(v, v).sqrt()
}
