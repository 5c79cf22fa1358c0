//! Seam correspondence extraction.
//!
//! Each seam edge is walked in lockstep on both of its UV segments. At every
//! sample the two texel-space positions must show the same colour, since they
//! are images of the same point on the surface.

use log::info;
use nalgebra::Point2;

use crate::error::{Result, SeamError};
use crate::mesh::{SeamEdge, TexturedMesh};
use crate::texture::{bilinear_taps, Tap, UvConvention};

/// Two texel-space positions declared equal by the mesh topology.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeamCorrespondence {
    /// Continuous texel position on the first side of the seam.
    pub a: Point2<f64>,
    /// Continuous texel position on the second side of the seam.
    pub b: Point2<f64>,
}

impl SeamCorrespondence {
    /// Bilinear taps of both endpoints.
    pub fn taps(&self, width: usize, height: usize) -> (Vec<Tap>, Vec<Tap>) {
        (
            bilinear_taps(self.a, width, height),
            bilinear_taps(self.b, width, height),
        )
    }
}

/// Options for correspondence extraction.
#[derive(Debug, Clone)]
pub struct CorrespondenceOptions {
    /// Samples per texel of seam length, measured on the longer UV segment.
    pub samples_per_texel: f64,

    /// How UVs map onto texture rows.
    pub uv_convention: UvConvention,
}

impl Default for CorrespondenceOptions {
    fn default() -> Self {
        Self {
            samples_per_texel: 8.0,
            uv_convention: UvConvention::BottomUp,
        }
    }
}

impl CorrespondenceOptions {
    /// Set the sampling density along seam edges.
    pub fn with_samples_per_texel(mut self, samples: f64) -> Self {
        self.samples_per_texel = samples;
        self
    }

    /// Set the UV convention.
    pub fn with_uv_convention(mut self, convention: UvConvention) -> Self {
        self.uv_convention = convention;
        self
    }
}

/// Extract correspondences for every seam edge of a mesh.
///
/// Every edge yields at least one correspondence; longer edges get
/// proportionally more so that no texel along a seam is left unconstrained.
///
/// # Errors
///
/// Returns an error if the sampling density is not a positive finite number
/// or the raster is empty.
pub fn extract_correspondences(
    mesh: &TexturedMesh,
    width: usize,
    height: usize,
    options: &CorrespondenceOptions,
) -> Result<Vec<SeamCorrespondence>> {
    let edges = mesh.seam_edges();
    let correspondences = correspondences_for_edges(&edges, width, height, options)?;
    info!(
        "{} seam edges, {} seam correspondences",
        edges.len(),
        correspondences.len()
    );
    Ok(correspondences)
}

/// Extract correspondences for an explicit list of seam edges.
pub fn correspondences_for_edges(
    edges: &[SeamEdge],
    width: usize,
    height: usize,
    options: &CorrespondenceOptions,
) -> Result<Vec<SeamCorrespondence>> {
    if !(options.samples_per_texel.is_finite() && options.samples_per_texel > 0.0) {
        return Err(SeamError::invalid_param(
            "samples_per_texel",
            options.samples_per_texel,
            "must be positive and finite",
        ));
    }
    if width == 0 || height == 0 {
        return Err(SeamError::invalid_param(
            "resolution",
            format!("{}x{}", width, height),
            "raster must be non-empty",
        ));
    }

    let to_texel = |uv| options.uv_convention.to_texel(uv, width, height);
    // Taps are clamped to the raster, so no edge needs more samples than a
    // path across it.
    let max_samples = (options.samples_per_texel * (width + height) as f64).ceil();
    let mut out = Vec::new();

    for edge in edges {
        let a0 = to_texel(edge.side_a[0]);
        let a1 = to_texel(edge.side_a[1]);
        let b0 = to_texel(edge.side_b[0]);
        let b1 = to_texel(edge.side_b[1]);

        let length = (a1 - a0).norm().max((b1 - b0).norm());
        if !length.is_finite() {
            return Err(SeamError::invalid_param(
                "seam edge",
                format!("{:?}", edge.positions),
                "texture coordinates must be finite",
            ));
        }
        let samples = (length * options.samples_per_texel)
            .ceil()
            .clamp(1.0, max_samples) as usize;

        out.extend((0..samples).map(|i| {
            let t = (i as f64 + 0.5) / samples as f64;
            SeamCorrespondence {
                a: a0 + (a1 - a0) * t,
                b: b0 + (b1 - b0) * t,
            }
        }));
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn edge(a: [(f64, f64); 2], b: [(f64, f64); 2]) -> SeamEdge {
        SeamEdge {
            positions: [0, 1],
            faces: [0, 1],
            side_a: [Point2::new(a[0].0, a[0].1), Point2::new(a[1].0, a[1].1)],
            side_b: [Point2::new(b[0].0, b[0].1), Point2::new(b[1].0, b[1].1)],
        }
    }

    #[test]
    fn test_density_scales_with_length() {
        // 8 texels long on a 32 texel raster
        let e = edge([(0.25, 0.25), (0.5, 0.25)], [(0.75, 0.5), (0.75, 0.75)]);
        let options = CorrespondenceOptions::default().with_samples_per_texel(2.0);
        let corrs = correspondences_for_edges(&[e.clone()], 32, 32, &options).unwrap();
        assert_eq!(corrs.len(), 16);

        let options = options.with_samples_per_texel(4.0);
        let corrs = correspondences_for_edges(&[e], 32, 32, &options).unwrap();
        assert_eq!(corrs.len(), 32);
    }

    #[test]
    fn test_tiny_edge_gets_one_sample() {
        let e = edge([(0.5, 0.5), (0.5, 0.5)], [(0.1, 0.1), (0.1, 0.1)]);
        let corrs =
            correspondences_for_edges(&[e], 16, 16, &CorrespondenceOptions::default()).unwrap();
        assert_eq!(corrs.len(), 1);
    }

    #[test]
    fn test_samples_walk_both_sides_in_lockstep() {
        // Side b runs in the opposite direction in UV space
        let e = edge([(0.0, 0.5), (1.0, 0.5)], [(1.0, 0.25), (0.0, 0.25)]);
        let options = CorrespondenceOptions::default()
            .with_samples_per_texel(1.0)
            .with_uv_convention(UvConvention::TopDown);
        let corrs = correspondences_for_edges(&[e], 4, 4, &options).unwrap();
        assert_eq!(corrs.len(), 4);

        let first = corrs[0];
        assert_relative_eq!(first.a.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(first.b.x, 3.0, epsilon = 1e-12);
        assert_relative_eq!(first.a.y, 1.5, epsilon = 1e-12);
        assert_relative_eq!(first.b.y, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_far_out_uvs_are_capped() {
        let e = edge([(0.0, 0.0), (1e13, 0.0)], [(0.0, 1.0), (1.0, 1.0)]);
        let options = CorrespondenceOptions::default().with_samples_per_texel(2.0);
        let corrs = correspondences_for_edges(&[e], 8, 4, &options).unwrap();
        assert_eq!(corrs.len(), 24);
    }

    #[test]
    fn test_non_finite_uvs_rejected() {
        let e = edge([(0.0, 0.0), (f64::INFINITY, 0.0)], [(0.0, 1.0), (1.0, 1.0)]);
        let result = correspondences_for_edges(&[e], 8, 8, &CorrespondenceOptions::default());
        assert!(matches!(result, Err(SeamError::InvalidParameter { .. })));
    }

    #[test]
    fn test_invalid_density_rejected() {
        let e = edge([(0.0, 0.0), (1.0, 0.0)], [(0.0, 1.0), (1.0, 1.0)]);
        let options = CorrespondenceOptions::default().with_samples_per_texel(0.0);
        assert!(correspondences_for_edges(&[e], 8, 8, &options).is_err());
    }
}
