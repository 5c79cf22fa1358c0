//! # texseam
//!
//! Seam erasure for UV-mapped textures.
//!
//! Where a mesh's UV unwrap cuts the surface into charts, texels on the two
//! sides of a cut are sampled independently and their colours drift apart,
//! which shows up as a visible seam when the mesh is rendered. texseam finds
//! the cuts, derives point correspondences along them and solves a sparse
//! least-squares problem per colour channel that makes both sides agree
//! while staying close to the original texture. A compression-aware variant
//! solves the same problem with every block constrained to what an
//! endpoint + index block format can represent.
//!
//! ## Features
//!
//! - **Seam detection**: 3D-adjacent, UV-disjoint edges of a [`mesh::TexturedMesh`]
//! - **Texel classification**: Exterior, Interior and Seam masks
//! - **Seamless solve**: conjugate gradient on the normal equations, channels in parallel
//! - **Block compression**: PCA-based quantizer and a compression-aware solve
//! - **File formats**: OBJ meshes, PNG/JPEG/BMP/TGA textures
//!
//! ## Quick Start
//!
//! ```no_run
//! use texseam::prelude::*;
//!
//! let mesh = texseam::io::obj::load("model.obj").unwrap();
//! let texture = texseam::io::texture::load("model.png").unwrap();
//!
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let prepared = pipeline.prepare(&mesh, &texture).unwrap();
//! let output = prepared.run(PipelineVariant::Seamless).unwrap();
//!
//! texseam::io::texture::save(&output.texture, "model_s.png").unwrap();
//! ```
//!
//! ## Running Stages Individually
//!
//! ```
//! use texseam::prelude::*;
//! use nalgebra::{Point2, Point3};
//!
//! // Two triangles sharing the edge 0-2, unwrapped into separate islands
//! let positions = vec![
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.0),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let uvs = vec![
//!     Point2::new(0.1, 0.1),
//!     Point2::new(0.4, 0.1),
//!     Point2::new(0.4, 0.4),
//!     Point2::new(0.6, 0.6),
//!     Point2::new(0.9, 0.9),
//!     Point2::new(0.6, 0.9),
//! ];
//! let faces = vec![
//!     TexturedFace::new([0, 1, 2], [0, 1, 2]),
//!     TexturedFace::new([0, 2, 3], [3, 4, 5]),
//! ];
//! let mesh = TexturedMesh::new(positions, uvs, faces).unwrap();
//! assert_eq!(mesh.seam_edges().len(), 1);
//!
//! let texture = Texture::from_fn(16, 16, 3, |x, _| vec![x as f64 / 15.0; 3]);
//! let options = CorrespondenceOptions::default();
//! let corrs = extract_correspondences(&mesh, 16, 16, &options).unwrap();
//! let mask = classify(&mesh, &corrs, 16, 16, options.uv_convention);
//!
//! let result = solve_seamless(&texture, &mask, &corrs, &SolverOptions::default()).unwrap();
//! assert!(seam_error(&result.texture, &corrs).max < seam_error(&texture, &corrs).max);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algo;
pub mod error;
pub mod io;
pub mod mesh;
pub mod pipeline;
pub mod texture;

/// Prelude module for convenient imports.
///
/// This module re-exports the most commonly used types and functions:
///
/// ```
/// use texseam::prelude::*;
/// ```
pub mod prelude {
    pub use crate::algo::compress::{
        quantize_block, quantize_blocks, solve_compressed, BlockFormat, CompressedBlock,
        CompressedTexture, CompressionOptions,
    };
    pub use crate::algo::correspondence::{
        extract_correspondences, CorrespondenceOptions, SeamCorrespondence,
    };
    pub use crate::algo::metric::{max_deviation, seam_error, SeamStats};
    pub use crate::algo::partition::{Block, BlockKind, BlockPartitioner, Partitions};
    pub use crate::algo::seamless::{solve_seamless, SolveReport, SolverOptions};
    pub use crate::error::{Result, SeamError};
    pub use crate::mesh::{SeamEdge, TexturedFace, TexturedMesh};
    pub use crate::pipeline::{Pipeline, PipelineConfig, PipelineVariant, Prepared};
    pub use crate::texture::{classify, ClassMask, PixelClass, Texture, UvConvention};
}

// Re-export nalgebra types for convenience
pub use nalgebra;
