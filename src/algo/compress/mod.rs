//! Block compression.
//!
//! The compressed representation follows the endpoint + index scheme of GPU
//! block formats such as BC1: every block stores two endpoint colours and,
//! per member texel, an index into a palette of evenly spaced colours on the
//! segment between them. [`BlockFormat`] fixes the block size, palette size
//! and endpoint precision instead of hard-coding one codec.
//!
//! - [`quantize_block`] is the Block Quantizer: continuous colours in, one
//!   [`CompressedBlock`] out.
//! - [`quantize_blocks`] runs it over every block of a texture.
//! - [`solve_compressed`] is the compression-aware seam solver: it solves the
//!   seam objective with each block constrained to a line in colour space,
//!   then quantizes.

mod quantize;
mod solver;

pub use quantize::quantize_block;
pub use solver::{
    quantize_blocks, solve_compressed, BlockLineModel, CompressedResult, CompressionOptions,
};

use crate::error::{Result, SeamError};
use crate::texture::Texture;

/// Parameters of the target block format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFormat {
    /// Block edge length in texels.
    pub block_size: usize,

    /// Number of palette entries between and including the endpoints.
    pub levels: usize,

    /// Bits per endpoint channel.
    pub endpoint_bits: u32,

    /// Least-squares endpoint refinement passes.
    pub refine_iterations: usize,
}

impl Default for BlockFormat {
    fn default() -> Self {
        Self {
            block_size: 4,
            levels: 4,
            endpoint_bits: 8,
            refine_iterations: 2,
        }
    }
}

impl BlockFormat {
    /// 4x4 blocks, 4 levels and 5-bit endpoints, approximating BC1.
    pub fn bc1() -> Self {
        Self {
            endpoint_bits: 5,
            ..Self::default()
        }
    }

    /// Set the block edge length.
    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the palette size.
    pub fn with_levels(mut self, levels: usize) -> Self {
        self.levels = levels;
        self
    }

    /// Set the endpoint precision.
    pub fn with_endpoint_bits(mut self, bits: u32) -> Self {
        self.endpoint_bits = bits;
        self
    }

    /// Set the number of refinement passes.
    pub fn with_refine_iterations(mut self, iterations: usize) -> Self {
        self.refine_iterations = iterations;
        self
    }

    /// Check that the format can be encoded.
    ///
    /// # Errors
    ///
    /// Returns an error if the block size is zero, the palette size is
    /// outside `2..=256` or the endpoint precision is outside `1..=16`.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(SeamError::invalid_param(
                "block_size",
                self.block_size,
                "must be at least 1",
            ));
        }
        if !(2..=256).contains(&self.levels) {
            return Err(SeamError::invalid_param(
                "levels",
                self.levels,
                "must lie in 2..=256",
            ));
        }
        if !(1..=16).contains(&self.endpoint_bits) {
            return Err(SeamError::invalid_param(
                "endpoint_bits",
                self.endpoint_bits,
                "must lie in 1..=16",
            ));
        }
        Ok(())
    }

    /// Largest endpoint code.
    #[inline]
    pub fn max_code(&self) -> u16 {
        ((1u32 << self.endpoint_bits) - 1) as u16
    }

    /// Quantize a channel value in `[0, 1]` to an endpoint code.
    #[inline]
    pub fn encode_value(&self, value: f64) -> u16 {
        let max = f64::from(self.max_code());
        (value.clamp(0.0, 1.0) * max).round() as u16
    }

    /// Channel value of an endpoint code.
    #[inline]
    pub fn decode_value(&self, code: u16) -> f64 {
        f64::from(code) / f64::from(self.max_code())
    }

    /// Interpolation weight of palette entry `k` (0 at the first endpoint).
    #[inline]
    pub fn level_weight(&self, k: usize) -> f64 {
        k as f64 / (self.levels - 1) as f64
    }
}

/// One encoded block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CompressedBlock {
    /// Endpoint codes, one per channel.
    pub endpoints: [Vec<u16>; 2],

    /// Palette index per member texel.
    pub indices: Vec<u8>,
}

impl CompressedBlock {
    /// Number of member texels.
    #[inline]
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the block has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Whether both endpoints are the same colour.
    #[inline]
    pub fn is_uniform(&self) -> bool {
        self.endpoints[0] == self.endpoints[1]
    }

    /// Decoded endpoint colours.
    pub fn endpoint_colors(&self, format: &BlockFormat) -> [Vec<f64>; 2] {
        let decode = |codes: &[u16]| codes.iter().map(|&c| format.decode_value(c)).collect();
        [decode(&self.endpoints[0]), decode(&self.endpoints[1])]
    }

    /// All palette colours, first endpoint first.
    pub fn palette(&self, format: &BlockFormat) -> Vec<Vec<f64>> {
        let [e0, e1] = self.endpoint_colors(format);
        (0..format.levels)
            .map(|k| lerp(&e0, &e1, format.level_weight(k)))
            .collect()
    }

    /// Decoded colour of every member texel.
    pub fn decode(&self, format: &BlockFormat) -> Vec<Vec<f64>> {
        let palette = self.palette(format);
        self.indices
            .iter()
            .map(|&k| palette[k as usize].clone())
            .collect()
    }
}

pub(crate) fn lerp(a: &[f64], b: &[f64], w: f64) -> Vec<f64> {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (1.0 - w) * x + w * y)
        .collect()
}

/// A block together with the texels its indices refer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlock {
    /// Member texels in index order.
    pub texels: Vec<usize>,
    /// The encoded data.
    pub block: CompressedBlock,
}

/// A texture in block-compressed form.
///
/// Blocks whose texels are all Exterior carry no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedTexture {
    format: BlockFormat,
    width: usize,
    height: usize,
    channels: usize,
    blocks: Vec<Option<EncodedBlock>>,
}

impl CompressedTexture {
    pub(crate) fn new(
        format: BlockFormat,
        (width, height, channels): (usize, usize, usize),
        blocks: Vec<Option<EncodedBlock>>,
    ) -> Self {
        Self {
            format,
            width,
            height,
            channels,
            blocks,
        }
    }

    /// The block format.
    pub fn format(&self) -> &BlockFormat {
        &self.format
    }

    /// `(width, height, channels)` of the source texture.
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.channels)
    }

    /// Blocks in partition order.
    pub fn blocks(&self) -> &[Option<EncodedBlock>] {
        &self.blocks
    }

    /// Number of blocks that carry data.
    pub fn num_encoded(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    /// Decode on top of `base`.
    ///
    /// Only member texels are written; every other texel keeps the value it
    /// has in `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` has a different shape.
    pub fn decode(&self, base: &Texture) -> Result<Texture> {
        if base.shape() != self.shape() {
            return Err(SeamError::shape_mismatch(
                "texture shape",
                self.shape(),
                base.shape(),
            ));
        }

        let mut out = base.clone();
        for encoded in self.blocks.iter().flatten() {
            let colors = encoded.block.decode(&self.format);
            for (&texel, color) in encoded.texels.iter().zip(&colors) {
                out.set_texel(texel, color);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn test_format_defaults() {
        let format = BlockFormat::default();
        assert_eq!(format.block_size, 4);
        assert_eq!(format.max_code(), 255);
        assert_eq!(BlockFormat::bc1().max_code(), 31);
        assert!(format.validate().is_ok());
        assert!(format.with_levels(1).validate().is_err());
        assert!(format.with_endpoint_bits(17).validate().is_err());
        assert!(format.with_block_size(0).validate().is_err());
    }

    #[test]
    fn test_value_codes() {
        let format = BlockFormat::default();
        assert_eq!(format.encode_value(1.0), 255);
        assert_eq!(format.encode_value(-0.3), 0);
        assert_eq!(format.encode_value(2.0), 255);
        assert_eq!(format.encode_value(format.decode_value(77)), 77);
    }

    #[test]
    fn test_palette_and_decode() {
        let format = BlockFormat::default();
        let block = CompressedBlock {
            endpoints: [vec![255, 0], vec![0, 255]],
            indices: vec![0, 3, 1],
        };
        let palette = block.palette(&format);
        assert_eq!(palette.len(), 4);
        assert_eq!(palette[0], vec![1.0, 0.0]);
        assert_eq!(palette[3], vec![0.0, 1.0]);
        assert_relative_eq!(palette[1][0], 2.0 / 3.0, epsilon = 1e-12);

        let colors = block.decode(&format);
        assert_eq!(colors.len(), 3);
        assert_eq!(colors[1], vec![0.0, 1.0]);
    }

    #[test]
    fn test_decode_writes_only_members() {
        let format = BlockFormat::default();
        let base = Texture::from_raw(2, 1, 1, vec![0.3, 0.7]).unwrap();
        let compressed = CompressedTexture::new(
            format,
            base.shape(),
            vec![Some(EncodedBlock {
                texels: vec![1],
                block: CompressedBlock {
                    endpoints: [vec![0], vec![0]],
                    indices: vec![0],
                },
            })],
        );
        let out = compressed.decode(&base).unwrap();
        assert_eq!(out.get(0, 0).to_bits(), 0.3f64.to_bits());
        assert_eq!(out.get(1, 0), 0.0);

        let wrong = Texture::new(3, 1, 1);
        assert!(compressed.decode(&wrong).is_err());
    }
}
