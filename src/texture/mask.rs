//! Per-texel classification.
//!
//! Every texel is exactly one of [`PixelClass::Exterior`] (never sampled when
//! the mesh is rendered), [`PixelClass::Interior`] (sampled, but no seam
//! correspondence touches it) or [`PixelClass::Seam`] (a bilinear tap of at
//! least one seam correspondence). The solvers only ever change texels that
//! are not Exterior.

use log::info;
use nalgebra::Point2;

use crate::algo::correspondence::SeamCorrespondence;
use crate::mesh::TexturedMesh;

use super::{bilinear_taps, Texture, UvConvention};

/// Half the side of the square of texels a bilinear lookup can reach.
const BILINEAR_REACH: f64 = 1.0;

/// Classification of a single texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelClass {
    /// Not covered by any UV triangle.
    Exterior,
    /// Covered, away from any seam.
    Interior,
    /// Referenced by a seam correspondence.
    Seam,
}

impl PixelClass {
    /// Whether the texel is an unknown in the solvers.
    #[inline]
    pub fn is_active(self) -> bool {
        self != PixelClass::Exterior
    }
}

/// Number of texels in each class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassCounts {
    /// Exterior texels.
    pub exterior: usize,
    /// Interior texels.
    pub interior: usize,
    /// Seam texels.
    pub seam: usize,
}

impl ClassCounts {
    /// Count one more texel of the given class.
    #[inline]
    pub fn add(&mut self, class: PixelClass) {
        match class {
            PixelClass::Exterior => self.exterior += 1,
            PixelClass::Interior => self.interior += 1,
            PixelClass::Seam => self.seam += 1,
        }
    }

    /// Total number of texels counted.
    #[inline]
    pub fn total(&self) -> usize {
        self.exterior + self.interior + self.seam
    }

    /// Number of texels that are not Exterior.
    #[inline]
    pub fn active(&self) -> usize {
        self.interior + self.seam
    }
}

/// A classification for every texel of a raster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMask {
    width: usize,
    height: usize,
    classes: Vec<PixelClass>,
}

impl ClassMask {
    /// A mask with every texel Exterior.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            classes: vec![PixelClass::Exterior; width * height],
        }
    }

    /// A mask with every texel set to `class`.
    pub fn filled(width: usize, height: usize, class: PixelClass) -> Self {
        Self {
            width,
            height,
            classes: vec![class; width * height],
        }
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

    /// Class of a texel by linear index.
    #[inline]
    pub fn get(&self, index: usize) -> PixelClass {
        self.classes[index]
    }

    /// Class of a texel by coordinates.
    #[inline]
    pub fn get_xy(&self, x: usize, y: usize) -> PixelClass {
        self.classes[y * self.width + x]
    }

    /// Set the class of a texel.
    #[inline]
    pub fn set(&mut self, index: usize, class: PixelClass) {
        self.classes[index] = class;
    }

    /// All classes, row-major.
    pub fn as_slice(&self) -> &[PixelClass] {
        &self.classes
    }

    /// Texel counts per class.
    pub fn counts(&self) -> ClassCounts {
        let mut counts = ClassCounts::default();
        for &class in &self.classes {
            counts.add(class);
        }
        counts
    }

    /// Indices of all texels of a class.
    pub fn indices_of(&self, class: PixelClass) -> impl Iterator<Item = usize> + '_ {
        self.classes
            .iter()
            .enumerate()
            .filter(move |(_, &c)| c == class)
            .map(|(i, _)| i)
    }

    /// Render texels of `class` white on black as a single-channel texture.
    pub fn to_texture(&self, class: PixelClass) -> Texture {
        Texture::from_fn(self.width, self.height, 1, |x, y| {
            vec![if self.get_xy(x, y) == class { 1.0 } else { 0.0 }]
        })
    }
}

/// Classify every texel of a `width x height` raster against a mesh.
///
/// A texel is Interior when the square of texels a bilinear lookup centred on
/// it can reach overlaps a UV triangle, and Seam when it is a tap of any
/// correspondence endpoint. Seam takes precedence over Interior.
pub fn classify(
    mesh: &TexturedMesh,
    correspondences: &[SeamCorrespondence],
    width: usize,
    height: usize,
    convention: UvConvention,
) -> ClassMask {
    let mut mask = ClassMask::new(width, height);

    for face in 0..mesh.num_faces() {
        let tri = mesh
            .face_uvs(face)
            .map(|uv| convention.to_texel(uv, width, height));
        rasterize_footprint(&mut mask, &tri);
    }

    for corr in correspondences {
        for p in [corr.a, corr.b] {
            for (index, _) in bilinear_taps(p, width, height) {
                mask.set(index, PixelClass::Seam);
            }
        }
    }

    let counts = mask.counts();
    info!(
        "{} interior texels, {} seam texels, {} exterior texels",
        counts.interior, counts.seam, counts.exterior
    );

    mask
}

fn rasterize_footprint(mask: &mut ClassMask, tri: &[Point2<f64>; 3]) {
    let (w, h) = (mask.width as f64, mask.height as f64);
    let min_x = tri.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let max_x = tri.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let min_y = tri.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = tri.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);

    if max_x <= -BILINEAR_REACH
        || max_y <= -BILINEAR_REACH
        || min_x >= w - 1.0 + BILINEAR_REACH
        || min_y >= h - 1.0 + BILINEAR_REACH
    {
        return;
    }

    let x_start = (min_x - BILINEAR_REACH).floor().max(0.0) as usize;
    let y_start = (min_y - BILINEAR_REACH).floor().max(0.0) as usize;
    let x_end = ((max_x + BILINEAR_REACH).ceil() as usize).min(mask.width - 1);
    let y_end = ((max_y + BILINEAR_REACH).ceil() as usize).min(mask.height - 1);

    for y in y_start..=y_end {
        for x in x_start..=x_end {
            let index = y * mask.width + x;
            if mask.classes[index] != PixelClass::Exterior {
                continue;
            }
            let center = Point2::new(x as f64, y as f64);
            if triangle_overlaps_square(tri, center, BILINEAR_REACH) {
                mask.classes[index] = PixelClass::Interior;
            }
        }
    }
}

/// Separating-axis test between a triangle and an open axis-aligned square.
fn triangle_overlaps_square(tri: &[Point2<f64>; 3], center: Point2<f64>, half: f64) -> bool {
    let separated = |axis_x: f64, axis_y: f64| {
        let radius = half * (axis_x.abs() + axis_y.abs());
        let c = axis_x * center.x + axis_y * center.y;
        let proj = tri.map(|p| axis_x * p.x + axis_y * p.y);
        let lo = proj.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = proj.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        hi <= c - radius || lo >= c + radius
    };

    if separated(1.0, 0.0) || separated(0.0, 1.0) {
        return false;
    }

    for i in 0..3 {
        let e = tri[(i + 1) % 3] - tri[i];
        if e.norm_squared() < 1e-24 {
            continue;
        }
        if separated(-e.y, e.x) {
            return false;
        }
    }

    true
}
