//! Pixel-wise squared color distance between two canvases.
//!
//! Only R, G and B take part; alpha never contributes, since every rendered
//! canvas is opaque and only visual appearance matters.

use crate::error::{Error, Result};
use image::RgbaImage;
use serde::{Deserialize, Serialize};

/// Per-channel multipliers for [`weighted_distance`].
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelWeights {
    pub r: f64,
    pub g: f64,
    pub b: f64,
}

impl ChannelWeights {
    pub const UNIFORM: Self = Self {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn is_uniform(&self) -> bool {
        *self == Self::UNIFORM
    }
}

impl Default for ChannelWeights {
    fn default() -> Self {
        Self::UNIFORM
    }
}

fn check_dimensions(a: &RgbaImage, b: &RgbaImage) -> Result<()> {
    if a.dimensions() != b.dimensions() {
        return Err(Error::DimensionMismatch {
            left: a.dimensions(),
            right: b.dimensions(),
        });
    }
    Ok(())
}

/// Sum over all pixels of the squared R, G and B differences.
pub fn distance(a: &RgbaImage, b: &RgbaImage) -> Result<f64> {
    check_dimensions(a, b)?;

    let mut total: u64 = 0;
    for (p, q) in a.as_raw().chunks_exact(4).zip(b.as_raw().chunks_exact(4)) {
        for c in 0..3 {
            let d = p[c] as i64 - q[c] as i64;
            total += (d * d) as u64;
        }
    }
    Ok(total as f64)
}

/// Like [`distance`], but a size mismatch yields `f64::MAX` so the candidate
/// can never win a comparison.
pub fn distance_or_max(a: &RgbaImage, b: &RgbaImage) -> f64 {
    distance(a, b).unwrap_or(f64::MAX)
}

/// [`distance`] with each channel's squared difference scaled by `weights`.
/// Uniform weights take the exact integer path.
pub fn weighted_distance(a: &RgbaImage, b: &RgbaImage, weights: &ChannelWeights) -> Result<f64> {
    if weights.is_uniform() {
        return distance(a, b);
    }
    check_dimensions(a, b)?;

    let mut sums = [0u64; 3];
    for (p, q) in a.as_raw().chunks_exact(4).zip(b.as_raw().chunks_exact(4)) {
        for c in 0..3 {
            let d = p[c] as i64 - q[c] as i64;
            sums[c] += (d * d) as u64;
        }
    }
    Ok(sums[0] as f64 * weights.r + sums[1] as f64 * weights.g + sums[2] as f64 * weights.b)
}
