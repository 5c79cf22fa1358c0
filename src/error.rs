//! Error types for texseam.
//!
//! Every fallible operation in the crate returns [`Result`]. Solver
//! non-convergence is deliberately absent: the solvers report it through
//! their diagnostics and keep the best iterate.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`SeamError`].
pub type Result<T> = std::result::Result<T, SeamError>;

/// Errors that can occur while loading inputs or running the pipeline.
#[derive(Error, Debug)]
pub enum SeamError {
    /// The mesh has no faces.
    #[error("mesh has no faces")]
    EmptyMesh,

    /// A face references an invalid position index.
    #[error("face {face} references invalid vertex index {vertex}")]
    InvalidVertexIndex {
        /// The face index.
        face: usize,
        /// The invalid vertex index.
        vertex: usize,
    },

    /// A face references an invalid texture coordinate index.
    #[error("face {face} references invalid uv index {uv}")]
    InvalidUvIndex {
        /// The face index.
        face: usize,
        /// The invalid uv index.
        uv: usize,
    },

    /// A face carries no texture coordinates.
    #[error("face {face} has no texture coordinates")]
    MissingUvs {
        /// The face index.
        face: usize,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading a mesh or texture from file.
    #[error("failed to load {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving a mesh or texture to file.
    #[error("failed to save {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// Two buffers that must agree in shape do not.
    #[error("{what} mismatch: expected {expected}, found {found}")]
    DimensionMismatch {
        /// What was compared.
        what: &'static str,
        /// Expected shape.
        expected: String,
        /// Actual shape.
        found: String,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },
}

impl SeamError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        SeamError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a dimension mismatch error from two `width x height x channels` shapes.
    pub(crate) fn shape_mismatch(
        what: &'static str,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    ) -> Self {
        SeamError::DimensionMismatch {
            what,
            expected: format!("{}x{}x{}", expected.0, expected.1, expected.2),
            found: format!("{}x{}x{}", found.0, found.1, found.2),
        }
    }
}
