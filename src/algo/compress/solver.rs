//! The compression-aware seam solver.
//!
//! Each block is modelled as a line in colour space, `c_t = (1 − w_t)·e0 +
//! w_t·e1`, with the interpolation weights `w_t` fixed by a principal
//! direction fit and snapped to the format's palette levels. The seam and
//! fidelity objective of the seamless solver is then minimized over the
//! endpoints instead of over free texel values, so the solution is one the
//! block format can express up to endpoint precision. A final quantization
//! pass produces the discrete blocks.

use log::info;
use nalgebra::DVector;
use rayon::prelude::*;

use crate::algo::correspondence::SeamCorrespondence;
use crate::algo::partition::Partitions;
use crate::algo::seamless::{
    check_mask, correspondence_taps, solve_channels, SolveReport, SolverOptions, TexelModel,
};
use crate::algo::sparse::NormalEquations;
use crate::error::{Result, SeamError};
use crate::texture::{ClassMask, Texture};

use super::quantize::{principal_extremes, segment_parameter};
use super::{quantize_block, BlockFormat, CompressedTexture, EncodedBlock};

/// Options for the compression-aware solver.
#[derive(Debug, Clone)]
pub struct CompressionOptions {
    /// Seam solver settings.
    pub solver: SolverOptions,

    /// Target block format.
    pub format: BlockFormat,

    /// Weight pulling endpoints toward their initial fit.
    pub endpoint_damping: f64,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            solver: SolverOptions::default(),
            format: BlockFormat::default(),
            endpoint_damping: 1e-4,
        }
    }
}

impl CompressionOptions {
    /// Set the solver options.
    pub fn with_solver(mut self, solver: SolverOptions) -> Self {
        self.solver = solver;
        self
    }

    /// Set the block format.
    pub fn with_format(mut self, format: BlockFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the endpoint damping weight.
    pub fn with_endpoint_damping(mut self, damping: f64) -> Self {
        self.endpoint_damping = damping;
        self
    }

    fn validate(&self) -> Result<()> {
        self.solver.validate()?;
        self.format.validate()?;
        if !(self.endpoint_damping.is_finite() && self.endpoint_damping >= 0.0) {
            return Err(SeamError::invalid_param(
                "endpoint_damping",
                self.endpoint_damping,
                "must be non-negative and finite",
            ));
        }
        Ok(())
    }
}

/// A block's colours approximated by a line segment.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockLineModel {
    /// Segment endpoints.
    pub endpoints: [Vec<f64>; 2],
    /// Interpolation weight per member, snapped to palette levels.
    pub weights: Vec<f64>,
}

impl BlockLineModel {
    /// Fit a line through member colours.
    ///
    /// The endpoints are the members furthest apart along the principal
    /// direction. Colours without variance collapse to the mean with all
    /// weights 0.
    pub fn fit<C: AsRef<[f64]>>(colors: &[C], format: &BlockFormat) -> Self {
        let colors: Vec<&[f64]> = colors.iter().map(|c| c.as_ref()).collect();
        let channels = colors.first().map_or(0, |c| c.len());

        match principal_extremes(&colors) {
            Some((hi, lo)) => {
                let e0 = colors[hi].to_vec();
                let e1 = colors[lo].to_vec();
                let top = (format.levels - 1) as f64;
                let weights = colors
                    .iter()
                    .map(|c| (segment_parameter(c, &e0, &e1) * top).round() / top)
                    .collect();
                Self {
                    endpoints: [e0, e1],
                    weights,
                }
            }
            None => {
                let mut mean = vec![0.0; channels];
                for c in &colors {
                    for (m, &v) in mean.iter_mut().zip(c.iter()) {
                        *m += v;
                    }
                }
                let n = colors.len().max(1) as f64;
                mean.iter_mut().for_each(|m| *m /= n);
                Self {
                    endpoints: [mean.clone(), mean],
                    weights: vec![0.0; colors.len()],
                }
            }
        }
    }

    /// Colour of member `i`.
    pub fn color(&self, i: usize) -> Vec<f64> {
        super::lerp(&self.endpoints[0], &self.endpoints[1], self.weights[i])
    }
}

/// Output of [`solve_compressed`].
#[derive(Debug, Clone)]
pub struct CompressedResult {
    /// The decoded compressed texture.
    pub texture: Texture,
    /// The continuous solution before quantization.
    pub continuous: Texture,
    /// The encoded blocks.
    pub compressed: CompressedTexture,
    /// Solver diagnostics.
    pub report: SolveReport,
}

/// Two endpoint unknowns per active block.
struct EndpointUnknowns {
    /// Active-block slot of each texel, `None` for Exterior texels.
    slot_of_texel: Vec<Option<usize>>,
    weight_of_texel: Vec<f64>,
    num_slots: usize,
}

impl TexelModel for EndpointUnknowns {
    fn num_unknowns(&self) -> usize {
        2 * self.num_slots
    }

    fn expand(&self, texel: usize, out: &mut Vec<(usize, f64)>) -> bool {
        let Some(slot) = self.slot_of_texel[texel] else {
            return false;
        };
        let w = self.weight_of_texel[texel];
        if w < 1.0 {
            out.push((2 * slot, 1.0 - w));
        }
        if w > 0.0 {
            out.push((2 * slot + 1, w));
        }
        true
    }
}

/// Non-Exterior members of every block, `None` for blocks without any.
fn block_members(mask: &ClassMask, partitions: &Partitions) -> Vec<Option<Vec<usize>>> {
    partitions
        .blocks()
        .iter()
        .map(|block| {
            let members: Vec<usize> = block
                .texels
                .iter()
                .copied()
                .filter(|&t| mask.get(t).is_active())
                .collect();
            (!members.is_empty()).then_some(members)
        })
        .collect()
}

fn check_partitions(
    texture: &Texture,
    partitions: &Partitions,
    format: &BlockFormat,
) -> Result<()> {
    if (partitions.width(), partitions.height()) != (texture.width(), texture.height()) {
        return Err(SeamError::shape_mismatch(
            "partition resolution",
            (texture.width(), texture.height(), 1),
            (partitions.width(), partitions.height(), 1),
        ));
    }
    if partitions.block_size() != format.block_size {
        return Err(SeamError::DimensionMismatch {
            what: "block size",
            expected: format.block_size.to_string(),
            found: partitions.block_size().to_string(),
        });
    }
    Ok(())
}

/// Remove seams while constraining every block to the block format.
///
/// Exterior texels are copied through unchanged in all returned textures.
///
/// # Errors
///
/// Returns an error if the mask or partitions do not match the texture, the
/// partition block size differs from the format's or the options are out
/// of range.
pub fn solve_compressed(
    texture: &Texture,
    mask: &ClassMask,
    partitions: &Partitions,
    correspondences: &[SeamCorrespondence],
    options: &CompressionOptions,
) -> Result<CompressedResult> {
    options.validate()?;
    check_mask(texture, mask)?;
    check_partitions(texture, partitions, &options.format)?;

    let format = &options.format;
    let members = block_members(mask, partitions);

    let fit_block = |m: &Option<Vec<usize>>| {
        m.as_ref().map(|texels| {
            let colors: Vec<&[f64]> = texels.iter().map(|&t| texture.texel(t)).collect();
            BlockLineModel::fit(&colors, format)
        })
    };
    let fits: Vec<Option<BlockLineModel>> = if options.solver.parallel {
        members.par_iter().map(fit_block).collect()
    } else {
        members.iter().map(fit_block).collect()
    };

    // Active blocks in partition order, each with its members and fit
    let active: Vec<(&Vec<usize>, &BlockLineModel)> = members
        .iter()
        .zip(&fits)
        .filter_map(|(m, f)| Some((m.as_ref()?, f.as_ref()?)))
        .collect();

    let mut model = EndpointUnknowns {
        slot_of_texel: vec![None; texture.num_texels()],
        weight_of_texel: vec![0.0; texture.num_texels()],
        num_slots: active.len(),
    };
    for (slot, (texels, fit)) in active.iter().enumerate() {
        for (&t, &w) in texels.iter().zip(&fit.weights) {
            model.slot_of_texel[t] = Some(slot);
            model.weight_of_texel[t] = w;
        }
    }

    info!(
        "compression-aware solve: {} active blocks, {} endpoint unknowns per channel",
        active.len(),
        model.num_unknowns()
    );

    let initial = |channel: usize| {
        DVector::from_iterator(
            2 * active.len(),
            active
                .iter()
                .flat_map(|(_, fit)| [fit.endpoints[0][channel], fit.endpoints[1][channel]]),
        )
    };

    let damping = options.endpoint_damping;
    let extra_rows = |system: &mut NormalEquations, channel: usize| {
        if damping <= 0.0 {
            return;
        }
        for (slot, (_, fit)) in active.iter().enumerate() {
            for j in 0..2 {
                system.add_row(&[(2 * slot + j, 1.0)], fit.endpoints[j][channel], damping);
            }
        }
    };

    let taps = correspondence_taps(correspondences, texture.width(), texture.height());
    let (solutions, report) = solve_channels(
        &model,
        texture,
        mask,
        &taps,
        &options.solver,
        initial,
        extra_rows,
    );

    let mut continuous = texture.clone();
    for (channel, x) in solutions.iter().enumerate() {
        for (slot, (texels, fit)) in active.iter().enumerate() {
            let (e0, e1) = (x[2 * slot], x[2 * slot + 1]);
            for (&t, &w) in texels.iter().zip(&fit.weights) {
                continuous.set(t, channel, (1.0 - w) * e0 + w * e1);
            }
        }
    }

    let compressed = quantize_blocks(
        &continuous,
        mask,
        partitions,
        format,
        options.solver.parallel,
    )?;
    let decoded = compressed.decode(texture)?;

    Ok(CompressedResult {
        texture: decoded,
        continuous,
        compressed,
        report,
    })
}

/// Quantize every block of a texture.
///
/// Members of a block are its non-Exterior texels; blocks without members
/// carry no data. Blocks are independent and are quantized concurrently
/// when `parallel` is set.
///
/// # Errors
///
/// Returns an error if the mask or partitions do not match the texture or
/// the format is invalid.
pub fn quantize_blocks(
    texture: &Texture,
    mask: &ClassMask,
    partitions: &Partitions,
    format: &BlockFormat,
    parallel: bool,
) -> Result<CompressedTexture> {
    format.validate()?;
    check_mask(texture, mask)?;
    check_partitions(texture, partitions, format)?;

    let members = block_members(mask, partitions);
    let encode = |m: Option<Vec<usize>>| {
        m.map(|texels| {
            let colors: Vec<&[f64]> = texels.iter().map(|&t| texture.texel(t)).collect();
            let block = quantize_block(&colors, format);
            EncodedBlock { texels, block }
        })
    };

    let blocks: Vec<Option<EncodedBlock>> = if parallel {
        members.into_par_iter().map(encode).collect()
    } else {
        members.into_iter().map(encode).collect()
    };

    let compressed = CompressedTexture::new(*format, texture.shape(), blocks);
    info!("quantized {} blocks", compressed.num_encoded());
    Ok(compressed)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    use crate::algo::partition::BlockPartitioner;
    use crate::texture::PixelClass;

    use super::*;

    fn partition(mask: &ClassMask, block_size: usize) -> Partitions {
        BlockPartitioner::new(mask.width(), mask.height(), block_size)
            .unwrap()
            .compute_partitions(mask)
            .unwrap()
    }

    /// Two 4x4 blocks side by side with constant colours, coupled along the
    /// shared vertical boundary.
    fn two_blocks() -> (Texture, ClassMask, Vec<SeamCorrespondence>) {
        let texture = Texture::from_fn(8, 4, 1, |x, _| vec![if x < 4 { 0.2 } else { 0.6 }]);
        let mut mask = ClassMask::filled(8, 4, PixelClass::Interior);
        let mut corrs = Vec::new();
        for y in 0..4 {
            mask.set(y * 8 + 3, PixelClass::Seam);
            mask.set(y * 8 + 4, PixelClass::Seam);
            corrs.push(SeamCorrespondence {
                a: Point2::new(3.0, y as f64),
                b: Point2::new(4.0, y as f64),
            });
        }
        (texture, mask, corrs)
    }

    #[test]
    fn test_line_model_fit() {
        let format = BlockFormat::default();
        let colors = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.4, 0.6]];
        let fit = BlockLineModel::fit(&colors, &format);
        assert_eq!(fit.weights.len(), 3);
        // Weights land on palette levels
        for &w in &fit.weights {
            let k = w * 3.0;
            assert_relative_eq!(k, k.round(), epsilon = 1e-12);
        }
        let extremes = fit
            .weights
            .iter()
            .filter(|&&w| w == 0.0 || w == 1.0)
            .count();
        assert_eq!(extremes, 2);
        for i in 0..2 {
            let expected = if fit.weights[i] == 0.0 {
                &fit.endpoints[0]
            } else {
                &fit.endpoints[1]
            };
            assert_eq!(&fit.color(i), expected);
            assert_eq!(expected, &colors[i]);
        }

        let flat = BlockLineModel::fit(&[vec![0.5], vec![0.5]], &format);
        assert_eq!(flat.endpoints[0], flat.endpoints[1]);
        assert_eq!(flat.weights, vec![0.0, 0.0]);
    }

    #[test]
    fn test_alpha_zero_joins_blocks() {
        let (texture, mask, corrs) = two_blocks();
        let partitions = partition(&mask, 4);
        let options = CompressionOptions::default()
            .with_solver(SolverOptions::default().with_alpha(0.0));
        let result = solve_compressed(&texture, &mask, &partitions, &corrs, &options).unwrap();

        let left = result.texture.get(3, 0);
        let right = result.texture.get(4, 0);
        assert!((left - right).abs() < 1e-9, "{} vs {}", left, right);
        assert_relative_eq!(left, 0.4, epsilon = 1.0 / 255.0);
    }

    #[test]
    fn test_fidelity_limits_the_correction() {
        let (texture, mask, corrs) = two_blocks();
        let partitions = partition(&mask, 4);
        let options = CompressionOptions::default()
            .with_solver(SolverOptions::default().with_alpha(0.5));
        let result = solve_compressed(&texture, &mask, &partitions, &corrs, &options).unwrap();

        // 4 seam rows against 16 fidelity rows at α = 0.5 halve the gap
        let gap = result.continuous.get(4, 0) - result.continuous.get(3, 0);
        assert_relative_eq!(gap, 0.4 * 0.5, epsilon = 1e-3);
        assert!(result.report.converged());
    }

    #[test]
    fn test_representable_block_survives() {
        let format = BlockFormat::default();
        let texture = Texture::from_fn(4, 4, 2, |x, _| {
            let k = x as f64 / 3.0;
            vec![1.0 - k, k]
        });
        let mask = ClassMask::filled(4, 4, PixelClass::Interior);
        let partitions = partition(&mask, 4);
        let options = CompressionOptions::default()
            .with_solver(SolverOptions::default().with_alpha(1.0));
        let result = solve_compressed(&texture, &mask, &partitions, &[], &options).unwrap();

        for t in 0..16 {
            for ch in 0..2 {
                assert_relative_eq!(result.texture.get(t, ch), texture.get(t, ch), epsilon = 1e-6);
            }
        }
        assert_eq!(result.compressed.num_encoded(), 1);
        assert_eq!(result.compressed.format(), &format);
    }

    #[test]
    fn test_exterior_texels_bit_identical() {
        let (mut texture, mut mask, corrs) = two_blocks();
        for y in 0..4 {
            mask.set(y * 8, PixelClass::Exterior);
            texture.set(y * 8, 0, 0.123_456_789);
        }
        let partitions = partition(&mask, 4);
        let result = solve_compressed(
            &texture,
            &mask,
            &partitions,
            &corrs,
            &CompressionOptions::default(),
        )
        .unwrap();

        for y in 0..4 {
            let t = y * 8;
            assert_eq!(result.texture.get(t, 0).to_bits(), texture.get(t, 0).to_bits());
            assert_eq!(result.continuous.get(t, 0).to_bits(), texture.get(t, 0).to_bits());
        }
    }

    #[test]
    fn test_quantize_blocks_idempotent() {
        let texture = Texture::from_fn(6, 5, 3, |x, y| {
            vec![x as f64 / 5.0, y as f64 / 4.0, ((x * y) % 3) as f64 / 2.0]
        });
        let mut mask = ClassMask::filled(6, 5, PixelClass::Interior);
        mask.set(0, PixelClass::Exterior);
        let partitions = partition(&mask, 4);
        let format = BlockFormat::default();

        let first = quantize_blocks(&texture, &mask, &partitions, &format, true).unwrap();
        let decoded = first.decode(&texture).unwrap();
        let second = quantize_blocks(&decoded, &mask, &partitions, &format, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.decode(&decoded).unwrap(), decoded);
    }

    #[test]
    fn test_exterior_blocks_carry_no_data() {
        let texture = Texture::new(8, 4, 1);
        let mut mask = ClassMask::new(8, 4);
        mask.set(5, PixelClass::Interior);
        let partitions = partition(&mask, 4);
        let compressed =
            quantize_blocks(&texture, &mask, &partitions, &BlockFormat::default(), true).unwrap();
        assert!(compressed.blocks()[0].is_none());
        assert_eq!(compressed.blocks()[1].as_ref().map(|b| b.texels.clone()), Some(vec![5]));
    }

    #[test]
    fn test_block_size_must_match_format() {
        let (texture, mask, corrs) = two_blocks();
        let partitions = partition(&mask, 2);
        assert!(matches!(
            solve_compressed(&texture, &mask, &partitions, &corrs, &CompressionOptions::default()),
            Err(SeamError::DimensionMismatch { .. })
        ));
    }
}
