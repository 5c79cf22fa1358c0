//! Face-vertex mesh with separate position and UV pools.

use nalgebra::{Point2, Point3};

use crate::error::{Result, SeamError};

use super::seams::{find_seam_edges, SeamEdge};

/// A triangle referencing one position and one UV per corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TexturedFace {
    /// Indices into [`TexturedMesh::positions`].
    pub positions: [usize; 3],
    /// Indices into [`TexturedMesh::uvs`].
    pub uvs: [usize; 3],
}

impl TexturedFace {
    /// Create a face from position and UV corner indices.
    pub fn new(positions: [usize; 3], uvs: [usize; 3]) -> Self {
        Self { positions, uvs }
    }
}

/// A triangle mesh carrying per-corner texture coordinates.
///
/// UV coordinates are stored exactly as they were read. How `v` maps onto
/// texture rows is decided by a [`crate::texture::UvConvention`] at lookup
/// time, so the mesh itself never needs flipping.
#[derive(Debug, Clone)]
pub struct TexturedMesh {
    positions: Vec<Point3<f64>>,
    uvs: Vec<Point2<f64>>,
    faces: Vec<TexturedFace>,
}

impl TexturedMesh {
    /// Build a mesh, validating every corner index.
    ///
    /// # Errors
    ///
    /// Returns [`SeamError::EmptyMesh`] if there are no faces, or an index
    /// error if a corner points outside its pool.
    pub fn new(
        positions: Vec<Point3<f64>>,
        uvs: Vec<Point2<f64>>,
        faces: Vec<TexturedFace>,
    ) -> Result<Self> {
        if faces.is_empty() {
            return Err(SeamError::EmptyMesh);
        }

        for (fi, face) in faces.iter().enumerate() {
            if let Some(&vertex) = face.positions.iter().find(|&&p| p >= positions.len()) {
                return Err(SeamError::InvalidVertexIndex { face: fi, vertex });
            }
            if let Some(&uv) = face.uvs.iter().find(|&&t| t >= uvs.len()) {
                return Err(SeamError::InvalidUvIndex { face: fi, uv });
            }
        }

        Ok(Self {
            positions,
            uvs,
            faces,
        })
    }

    /// Number of 3D positions.
    #[inline]
    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    /// Number of texture coordinates.
    #[inline]
    pub fn num_uvs(&self) -> usize {
        self.uvs.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// All 3D positions.
    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    /// All texture coordinates.
    pub fn uvs(&self) -> &[Point2<f64>] {
        &self.uvs
    }

    /// All faces.
    pub fn faces(&self) -> &[TexturedFace] {
        &self.faces
    }

    /// The three UV corners of a face.
    #[inline]
    pub fn face_uvs(&self, face: usize) -> [Point2<f64>; 3] {
        let f = &self.faces[face];
        [self.uvs[f.uvs[0]], self.uvs[f.uvs[1]], self.uvs[f.uvs[2]]]
    }

    /// Bounding box of the texture coordinates, or `None` if there are none.
    pub fn uv_bounding_box(&self) -> Option<(Point2<f64>, Point2<f64>)> {
        let first = *self.uvs.first()?;
        Some(self.uvs.iter().fold((first, first), |(mut min, mut max), uv| {
            min.x = min.x.min(uv.x);
            min.y = min.y.min(uv.y);
            max.x = max.x.max(uv.x);
            max.y = max.y.max(uv.y);
            (min, max)
        }))
    }

    /// Edges that are adjacent in 3D but split in UV space.
    ///
    /// The result is ordered by position indices, so it is stable across runs.
    pub fn seam_edges(&self) -> Vec<SeamEdge> {
        find_seam_edges(self)
    }
}
