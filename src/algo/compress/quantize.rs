//! The Block Quantizer.

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use super::{BlockFormat, CompressedBlock};

/// Total member variance below which a block is treated as a single colour.
const DEGENERATE_VARIANCE: f64 = 1e-20;

/// A refit must lower the squared error by more than this to be kept.
const MIN_IMPROVEMENT: f64 = 1e-12;

/// Encode a block of continuous colours.
///
/// Endpoints start at the two members that lie furthest apart along the
/// principal direction of the colours, are quantized to the format's
/// endpoint precision and then refined by least squares. Every member is
/// assigned the nearest palette entry.
///
/// The result is a fixed point: quantizing the decoded colours of a block
/// returns the same block. Blocks without colour variance, or whose
/// endpoints quantize to the same code, get both endpoints at the mean and
/// all indices 0.
///
/// An empty `colors` slice yields an empty block.
pub fn quantize_block<C: AsRef<[f64]>>(colors: &[C], format: &BlockFormat) -> CompressedBlock {
    let colors: Vec<&[f64]> = colors.iter().map(|c| c.as_ref()).collect();
    if colors.is_empty() {
        return CompressedBlock {
            endpoints: [Vec::new(), Vec::new()],
            indices: Vec::new(),
        };
    }

    let Some((hi, lo)) = principal_extremes(&colors) else {
        return uniform_block(&colors, format);
    };

    let e0 = encode(colors[hi], format);
    let e1 = encode(colors[lo], format);
    if e0 == e1 {
        return uniform_block(&colors, format);
    }

    let mut indices = assign_indices(&colors, &e0, &e1, format);
    indices[hi] = 0;
    indices[lo] = (format.levels - 1) as u8;

    let mut best = CompressedBlock {
        endpoints: [e0, e1],
        indices,
    };
    let mut best_error = block_error(&colors, &best, format);

    for _ in 0..format.refine_iterations {
        let Some([r0, r1]) = refit_endpoints(&colors, &best.indices, format) else {
            break;
        };
        let (e0, e1) = (encode(&r0, format), encode(&r1, format));
        if e0 == e1 {
            break;
        }
        let indices = assign_indices(&colors, &e0, &e1, format);
        let top = (format.levels - 1) as u8;
        if !indices.contains(&0) || !indices.contains(&top) {
            break;
        }

        let candidate = CompressedBlock {
            endpoints: [e0, e1],
            indices,
        };
        let error = block_error(&colors, &candidate, format);
        if error < best_error - MIN_IMPROVEMENT {
            best = candidate;
            best_error = error;
        } else {
            break;
        }
    }

    canonicalize(&mut best, format);
    best
}

/// Members with the largest and smallest projection on the principal
/// direction, or `None` if the colours have no variance.
pub(crate) fn principal_extremes(colors: &[&[f64]]) -> Option<(usize, usize)> {
    let n = colors.len();
    let channels = colors.first().map_or(0, |c| c.len());
    if n < 2 || channels == 0 {
        return None;
    }

    let mut mean = DVector::<f64>::zeros(channels);
    for c in colors {
        mean += DVector::from_column_slice(c);
    }
    mean /= n as f64;

    let mut covariance = DMatrix::<f64>::zeros(channels, channels);
    for c in colors {
        let d = DVector::from_column_slice(c) - &mean;
        covariance += &d * d.transpose();
    }
    covariance /= n as f64;

    if covariance.trace() <= DEGENERATE_VARIANCE {
        return None;
    }

    let eigen = SymmetricEigen::new(covariance);
    let (principal, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        });
    let axis = eigen.eigenvectors.column(principal);

    let mut hi = (0, f64::NEG_INFINITY);
    let mut lo = (0, f64::INFINITY);
    for (i, c) in colors.iter().enumerate() {
        let t: f64 = c.iter().zip(axis.iter()).map(|(x, a)| x * a).sum();
        if t > hi.1 {
            hi = (i, t);
        }
        if t < lo.1 {
            lo = (i, t);
        }
    }

    (hi.0 != lo.0).then_some((hi.0, lo.0))
}

/// Clamped interpolation parameter of `color` on the segment `e0 -> e1`.
pub(crate) fn segment_parameter(color: &[f64], e0: &[f64], e1: &[f64]) -> f64 {
    let mut num = 0.0;
    let mut den = 0.0;
    for ((&c, &a), &b) in color.iter().zip(e0).zip(e1) {
        num += (c - a) * (b - a);
        den += (b - a) * (b - a);
    }
    if den <= 0.0 {
        0.0
    } else {
        (num / den).clamp(0.0, 1.0)
    }
}

fn encode(color: &[f64], format: &BlockFormat) -> Vec<u16> {
    color.iter().map(|&v| format.encode_value(v)).collect()
}

fn decode(codes: &[u16], format: &BlockFormat) -> Vec<f64> {
    codes.iter().map(|&c| format.decode_value(c)).collect()
}

fn uniform_block(colors: &[&[f64]], format: &BlockFormat) -> CompressedBlock {
    let channels = colors[0].len();
    let mut mean = vec![0.0; channels];
    for c in colors {
        for (m, &v) in mean.iter_mut().zip(c.iter()) {
            *m += v;
        }
    }
    for m in &mut mean {
        *m /= colors.len() as f64;
    }

    let code = encode(&mean, format);
    CompressedBlock {
        endpoints: [code.clone(), code],
        indices: vec![0; colors.len()],
    }
}

/// Nearest palette entry for every colour. The palette is evenly spaced on
/// a line, so the nearest entry is the rounded projection.
fn assign_indices(colors: &[&[f64]], e0: &[u16], e1: &[u16], format: &BlockFormat) -> Vec<u8> {
    let a = decode(e0, format);
    let b = decode(e1, format);
    let top = (format.levels - 1) as f64;
    colors
        .iter()
        .map(|c| (segment_parameter(c, &a, &b) * top).round() as u8)
        .collect()
}

fn block_error(colors: &[&[f64]], block: &CompressedBlock, format: &BlockFormat) -> f64 {
    let palette = block.palette(format);
    colors
        .iter()
        .zip(&block.indices)
        .map(|(c, &k)| {
            c.iter()
                .zip(&palette[k as usize])
                .map(|(x, p)| (x - p) * (x - p))
                .sum::<f64>()
        })
        .sum()
}

/// Least-squares endpoints for fixed indices, solved per channel from the
/// 2x2 normal equations.
fn refit_endpoints(
    colors: &[&[f64]],
    indices: &[u8],
    format: &BlockFormat,
) -> Option<[Vec<f64>; 2]> {
    let channels = colors[0].len();
    let (mut aa, mut ab, mut bb) = (0.0, 0.0, 0.0);
    let mut rhs_a = vec![0.0; channels];
    let mut rhs_b = vec![0.0; channels];

    for (c, &k) in colors.iter().zip(indices) {
        let w = format.level_weight(k as usize);
        let v = 1.0 - w;
        aa += v * v;
        ab += v * w;
        bb += w * w;
        for ch in 0..channels {
            rhs_a[ch] += v * c[ch];
            rhs_b[ch] += w * c[ch];
        }
    }

    let det = aa * bb - ab * ab;
    if det.abs() < 1e-12 {
        return None;
    }

    let mut e0 = vec![0.0; channels];
    let mut e1 = vec![0.0; channels];
    for ch in 0..channels {
        e0[ch] = (bb * rhs_a[ch] - ab * rhs_b[ch]) / det;
        e1[ch] = (aa * rhs_b[ch] - ab * rhs_a[ch]) / det;
    }
    Some([e0, e1])
}

/// Order endpoint codes so that the first is lexicographically not smaller,
/// mirroring indices when swapping.
fn canonicalize(block: &mut CompressedBlock, format: &BlockFormat) {
    if block.endpoints[0] < block.endpoints[1] {
        block.endpoints.swap(0, 1);
        let top = (format.levels - 1) as u8;
        for k in &mut block.indices {
            *k = top - *k;
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn gradient_block() -> Vec<Vec<f64>> {
        (0..16)
            .map(|i| {
                let t = i as f64 / 15.0;
                vec![0.1 + 0.8 * t, 0.9 - 0.7 * t, 0.3 + 0.05 * (i % 3) as f64]
            })
            .collect()
    }

    #[test]
    fn test_uniform_block() {
        let colors = vec![vec![0.4, 0.4, 0.4]; 5];
        let block = quantize_block(&colors, &BlockFormat::default());
        assert!(block.is_uniform());
        assert_eq!(block.endpoints[0], vec![102, 102, 102]);
        assert_eq!(block.indices, vec![0; 5]);
    }

    #[test]
    fn test_single_member_block() {
        let block = quantize_block(&[vec![1.0, 0.0]], &BlockFormat::default());
        assert_eq!(block.endpoints, [vec![255, 0], vec![255, 0]]);
        assert_eq!(block.indices, vec![0]);
    }

    #[test]
    fn test_empty_block() {
        let block = quantize_block::<Vec<f64>>(&[], &BlockFormat::default());
        assert!(block.is_empty());
    }

    #[test]
    fn test_representable_block_is_exact() {
        let format = BlockFormat::default();
        let colors: Vec<Vec<f64>> = [0, 1, 2, 3, 3, 1]
            .iter()
            .map(|&k| vec![1.0 - k as f64 / 3.0, k as f64 / 3.0])
            .collect();
        let block = quantize_block(&colors, &format);
        assert_eq!(block.endpoints, [vec![255, 0], vec![0, 255]]);
        assert_eq!(block.indices, vec![0, 1, 2, 3, 3, 1]);

        for (decoded, original) in block.decode(&format).iter().zip(&colors) {
            for (d, o) in decoded.iter().zip(original) {
                assert_relative_eq!(d, o, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_extreme_indices_used() {
        let format = BlockFormat::default();
        let block = quantize_block(&gradient_block(), &format);
        assert!(block.indices.contains(&0));
        assert!(block.indices.contains(&3));
        assert!(block.endpoints[0] >= block.endpoints[1]);
    }

    #[test]
    fn test_error_not_worse_than_naive_endpoints() {
        let format = BlockFormat::default();
        let colors = gradient_block();
        let refs: Vec<&[f64]> = colors.iter().map(|c| c.as_slice()).collect();

        let refined = quantize_block(&colors, &format);
        let naive = quantize_block(&colors, &format.with_refine_iterations(0));
        assert!(
            block_error(&refs, &refined, &format) <= block_error(&refs, &naive, &format) + 1e-15
        );
    }

    #[test]
    fn test_requantizing_is_idempotent() {
        for format in [
            BlockFormat::default(),
            BlockFormat::bc1(),
            BlockFormat::default().with_levels(8),
        ] {
            let block = quantize_block(&gradient_block(), &format);
            let decoded = block.decode(&format);
            let again = quantize_block(&decoded, &format);
            assert_eq!(again, block, "{:?}", format);
            assert_eq!(again.decode(&format), decoded);
        }
    }

    #[test]
    fn test_noisy_block_idempotent() {
        // Deterministic pseudo-random colours
        let mut state = 0x2545_f491_u64;
        let mut next = || {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 11) as f64 / (1u64 << 53) as f64
        };
        let format = BlockFormat::default();
        for _ in 0..20 {
            let colors: Vec<Vec<f64>> = (0..16)
                .map(|_| vec![next(), next(), next(), next()])
                .collect();
            let block = quantize_block(&colors, &format);
            let again = quantize_block(&block.decode(&format), &format);
            assert_eq!(again, block);
        }
    }
}
