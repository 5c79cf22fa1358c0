//! Seam and fidelity diagnostics.

use crate::error::{Result, SeamError};
use crate::texture::{ClassMask, PixelClass, Texture};

use super::correspondence::SeamCorrespondence;

/// Colour mismatch across seam correspondences.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SeamStats {
    /// Number of correspondences measured.
    pub count: usize,
    /// Largest per-correspondence difference.
    pub max: f64,
    /// Root mean square of the per-correspondence differences.
    pub rms: f64,
}

/// Measure how far apart the two sides of every correspondence are.
///
/// The difference of one correspondence is the largest absolute channel
/// difference between the bilinearly sampled colours at its endpoints.
pub fn seam_error(texture: &Texture, correspondences: &[SeamCorrespondence]) -> SeamStats {
    if correspondences.is_empty() {
        return SeamStats::default();
    }

    let mut max: f64 = 0.0;
    let mut sum_sq = 0.0;
    for corr in correspondences {
        let a = texture.sample_bilinear(corr.a);
        let b = texture.sample_bilinear(corr.b);
        let d = a
            .iter()
            .zip(&b)
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max);
        max = max.max(d);
        sum_sq += d * d;
    }

    SeamStats {
        count: correspondences.len(),
        max,
        rms: (sum_sq / correspondences.len() as f64).sqrt(),
    }
}

/// Largest absolute channel difference between two textures over the
/// texels of one class.
///
/// # Errors
///
/// Returns an error if the textures or the mask disagree in shape.
pub fn max_deviation(a: &Texture, b: &Texture, mask: &ClassMask, class: PixelClass) -> Result<f64> {
    if a.shape() != b.shape() {
        return Err(SeamError::shape_mismatch("texture shape", a.shape(), b.shape()));
    }
    if (mask.width(), mask.height()) != (a.width(), a.height()) {
        return Err(SeamError::shape_mismatch(
            "mask resolution",
            (a.width(), a.height(), 1),
            (mask.width(), mask.height(), 1),
        ));
    }

    Ok(mask
        .indices_of(class)
        .flat_map(|t| a.texel(t).iter().zip(b.texel(t)).map(|(x, y)| (x - y).abs()))
        .fold(0.0, f64::max))
}
