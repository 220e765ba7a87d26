//! Phase map to 8-bit SLM bitmap.

use std::f64::consts::TAU;

use ndarray::Array2;

use crate::metrics::normalize;
use crate::types::PhaseMap;

/// Encode a phase map as an 8-bit hologram.
///
/// Negative phases are shifted by $2\pi$ into $[0, 2\pi)$, the result is
/// min-max normalised to $[0, 255]$ and truncated. A constant phase map
/// normalises to NaN, which saturates to 0.
pub fn gen_hologram(phase: &PhaseMap) -> Array2<u8> {
    let wrapped = phase.mapv(|p| if p < 0.0 { p + TAU } else { p });
    normalize(&wrapped).mapv(|v| (v * 255.0) as u8)
}

/// Rotate a bitmap 90° clockwise, the orientation expected by the display
/// path of the SLM.
pub fn rotate_clockwise(image: &Array2<u8>) -> Array2<u8> {
    let (h, w) = image.dim();
    Array2::from_shape_fn((w, h), |(r, c)| image[[h - 1 - c, r]])
}
