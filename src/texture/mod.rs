//! Texture rasters and texel-space addressing.
//!
//! [`Texture`] is the fixed-resolution colour buffer every pipeline stage
//! reads and produces. Values are stored as `f64` per channel, row-major,
//! with row 0 at the top of the image. Decoding and encoding image files is
//! handled separately by [`crate::io::texture`].
//!
//! [`UvConvention`] names how texture coordinates map onto that raster. It is
//! passed explicitly to every stage that turns UVs into texel positions.

pub mod mask;

use nalgebra::Point2;

use crate::error::{Result, SeamError};

pub use mask::{classify, ClassCounts, ClassMask, PixelClass};

/// How the `v` texture coordinate maps onto image rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UvConvention {
    /// `v = 0` is the bottom row (OBJ / OpenGL).
    #[default]
    BottomUp,
    /// `v = 0` is the top row (DirectX / image order).
    TopDown,
}

impl UvConvention {
    /// Map a UV coordinate to continuous texel coordinates.
    ///
    /// Texel `(x, y)` has its centre at integer coordinates, so `u = 0`
    /// lands on `x = -0.5`, the left edge of the first column.
    #[inline]
    pub fn to_texel(self, uv: Point2<f64>, width: usize, height: usize) -> Point2<f64> {
        let x = uv.x * width as f64 - 0.5;
        let y = match self {
            UvConvention::BottomUp => (1.0 - uv.y) * height as f64 - 0.5,
            UvConvention::TopDown => uv.y * height as f64 - 0.5,
        };
        Point2::new(x, y)
    }
}

/// A bilinear tap: a texel index and its interpolation weight.
pub type Tap = (usize, f64);

/// Bilinear taps for a continuous texel position.
///
/// Coordinates are clamped to the raster, so positions past the border
/// reuse the edge texels. Taps with zero weight are dropped; the weights of
/// the returned taps always sum to one.
pub fn bilinear_taps(p: Point2<f64>, width: usize, height: usize) -> Vec<Tap> {
    let max_x = (width - 1) as f64;
    let max_y = (height - 1) as f64;
    let x = p.x.clamp(0.0, max_x);
    let y = p.y.clamp(0.0, max_y);

    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let x0 = x0 as usize;
    let y0 = y0 as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);

    let corners = [
        (x0, y0, (1.0 - fx) * (1.0 - fy)),
        (x1, y0, fx * (1.0 - fy)),
        (x0, y1, (1.0 - fx) * fy),
        (x1, y1, fx * fy),
    ];

    let mut taps: Vec<Tap> = Vec::with_capacity(4);
    for (cx, cy, w) in corners {
        if w <= 0.0 {
            continue;
        }
        let index = cy * width + cx;
        match taps.iter_mut().find(|(i, _)| *i == index) {
            Some(tap) => tap.1 += w,
            None => taps.push((index, w)),
        }
    }
    taps
}

/// A 2D colour raster with a fixed number of channels.
#[derive(Debug, Clone, PartialEq)]
pub struct Texture {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f64>,
}

impl Texture {
    /// Create a texture filled with zeros.
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width * height * channels],
        }
    }

    /// Wrap interleaved row-major samples.
    ///
    /// # Errors
    ///
    /// Returns an error if any dimension is zero or `data` has the wrong length.
    pub fn from_raw(width: usize, height: usize, channels: usize, data: Vec<f64>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SeamError::invalid_param(
                "resolution",
                format!("{}x{}", width, height),
                "texture must have at least one texel",
            ));
        }
        if channels == 0 {
            return Err(SeamError::invalid_param(
                "channels",
                channels,
                "texture must have at least one channel",
            ));
        }
        if data.len() != width * height * channels {
            return Err(SeamError::DimensionMismatch {
                what: "texture data length",
                expected: (width * height * channels).to_string(),
                found: data.len().to_string(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Build a texture by evaluating `f(x, y)` for every texel.
    pub fn from_fn<F>(width: usize, height: usize, channels: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> Vec<f64>,
    {
        let mut texture = Self::new(width, height, channels);
        for y in 0..height {
            for x in 0..width {
                let color = f(x, y);
                texture.set_texel(y * width + x, &color);
            }
        }
        texture
    }

    /// Width in texels.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height in texels.
    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// Number of colour channels per texel.
    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Total number of texels.
    #[inline]
    pub fn num_texels(&self) -> usize {
        self.width * self.height
    }

    /// `(width, height, channels)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.width, self.height, self.channels)
    }

    /// Colour of a texel.
    #[inline]
    pub fn texel(&self, index: usize) -> &[f64] {
        let start = index * self.channels;
        &self.data[start..start + self.channels]
    }

    /// Overwrite the colour of a texel.
    #[inline]
    pub fn set_texel(&mut self, index: usize, color: &[f64]) {
        let start = index * self.channels;
        self.data[start..start + self.channels].copy_from_slice(color);
    }

    /// A single channel of a single texel.
    #[inline]
    pub fn get(&self, index: usize, channel: usize) -> f64 {
        self.data[index * self.channels + channel]
    }

    /// Set a single channel of a single texel.
    #[inline]
    pub fn set(&mut self, index: usize, channel: usize, value: f64) {
        self.data[index * self.channels + channel] = value;
    }

    /// Interleaved samples.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Interpolated colour at a continuous texel position.
    pub fn sample_bilinear(&self, p: Point2<f64>) -> Vec<f64> {
        let mut color = vec![0.0; self.channels];
        for (index, w) in bilinear_taps(p, self.width, self.height) {
            for (c, value) in color.iter_mut().zip(self.texel(index)) {
                *c += w * value;
            }
        }
        color
    }
}
