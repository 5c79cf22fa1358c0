//! Textured triangle meshes.
//!
//! This module provides [`TexturedMesh`], a face-vertex triangle mesh whose
//! corners index into two independent pools: 3D positions and 2D texture
//! coordinates. Keeping the pools separate is what makes UV seams visible:
//! two faces can share a position edge while addressing different UVs.
//!
//! # Construction
//!
//! Meshes are typically loaded from OBJ files through [`crate::io::obj`], or
//! built directly:
//!
//! ```
//! use texseam::mesh::{TexturedFace, TexturedMesh};
//! use nalgebra::{Point2, Point3};
//!
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let uvs = vec![
//!     Point2::new(0.1, 0.1),
//!     Point2::new(0.9, 0.1),
//!     Point2::new(0.1, 0.9),
//! ];
//! let faces = vec![TexturedFace::new([0, 1, 2], [0, 1, 2])];
//!
//! let mesh = TexturedMesh::new(positions, uvs, faces).unwrap();
//! assert_eq!(mesh.num_faces(), 1);
//! assert!(mesh.seam_edges().is_empty());
//! ```

mod seams;
mod textured;

pub use seams::SeamEdge;
pub use textured::{TexturedFace, TexturedMesh};
