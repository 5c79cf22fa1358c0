//! Seam processing algorithms.
//!
//! The stages of the pipeline, leaf first:
//!
//! - **Correspondences**: point pairs along seam edges that must share a colour
//! - **Partitioning**: compression-block tiling of the raster
//! - **Seamless solve**: sparse least squares over free texel values
//! - **Compression**: block quantization and the compression-aware solve
//! - **Metrics**: seam mismatch and deviation from the original
//!
//! The sparse matrix and conjugate gradient code used by both solvers lives
//! in [`sparse`].

pub mod compress;
pub mod correspondence;
pub mod metric;
pub mod partition;
pub mod seamless;
pub mod sparse;
