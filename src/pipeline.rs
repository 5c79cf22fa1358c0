//! The seam removal pipeline.
//!
//! A run has two parts. [`Pipeline::prepare`] derives everything that only
//! depends on the inputs: seam correspondences, the texel classification
//! and the block partitions. [`Prepared::run`] then executes one
//! [`PipelineVariant`] on top of that shared state. Every stage returns a
//! new owned value; the input texture is never modified.
//!
//! # Example
//!
//! ```no_run
//! use texseam::pipeline::{Pipeline, PipelineConfig, PipelineVariant};
//!
//! let mesh = texseam::io::obj::load("model.obj").unwrap();
//! let texture = texseam::io::texture::load("model.png").unwrap();
//!
//! let pipeline = Pipeline::new(PipelineConfig::default());
//! let prepared = pipeline.prepare(&mesh, &texture).unwrap();
//! let output = prepared.run(PipelineVariant::Seamless).unwrap();
//! println!(
//!     "seam error {:.4} -> {:.4}",
//!     output.seam_before.max, output.seam_after.max
//! );
//! ```

use log::{info, warn};

use crate::algo::compress::{
    quantize_blocks, solve_compressed, BlockFormat, CompressedTexture, CompressionOptions,
};
use crate::algo::correspondence::{
    extract_correspondences, CorrespondenceOptions, SeamCorrespondence,
};
use crate::algo::metric::{seam_error, SeamStats};
use crate::algo::partition::{BlockPartitioner, Partitions};
use crate::algo::seamless::{solve_seamless, SolveReport, SolverOptions};
use crate::error::Result;
use crate::mesh::TexturedMesh;
use crate::texture::{classify, ClassMask, PixelClass, Texture, UvConvention};

/// Which composition of stages to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineVariant {
    /// Seam removal on free texel values.
    Seamless,
    /// Seam removal constrained to the block format, then quantization.
    SeamAwareCompressed,
    /// Seam removal on free texel values, then plain quantization.
    SeamlessThenCompressed,
}

impl PipelineVariant {
    /// All variants in the order they are usually run.
    pub const ALL: [PipelineVariant; 3] = [
        PipelineVariant::Seamless,
        PipelineVariant::SeamAwareCompressed,
        PipelineVariant::SeamlessThenCompressed,
    ];

    /// File name suffix of the variant's artifacts.
    pub fn suffix(self) -> &'static str {
        match self {
            PipelineVariant::Seamless => "s",
            PipelineVariant::SeamAwareCompressed => "sac",
            PipelineVariant::SeamlessThenCompressed => "sc",
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            PipelineVariant::Seamless => "seamless",
            PipelineVariant::SeamAwareCompressed => "seam-aware compression",
            PipelineVariant::SeamlessThenCompressed => "seamless then compressed",
        }
    }

    /// Whether the variant produces block-compressed output.
    pub fn is_compressed(self) -> bool {
        self != PipelineVariant::Seamless
    }
}

/// Configuration for every pipeline stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Correspondence sampling and UV convention.
    pub correspondence: CorrespondenceOptions,

    /// Seam solver settings, shared by all variants.
    pub solver: SolverOptions,

    /// Target block format for compressed variants.
    pub format: BlockFormat,

    /// Endpoint damping of the compression-aware solve.
    pub endpoint_damping: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            correspondence: CorrespondenceOptions::default(),
            solver: SolverOptions::default(),
            format: BlockFormat::default(),
            endpoint_damping: CompressionOptions::default().endpoint_damping,
        }
    }
}

impl PipelineConfig {
    /// Set the correspondence options.
    pub fn with_correspondence(mut self, options: CorrespondenceOptions) -> Self {
        self.correspondence = options;
        self
    }

    /// Set the solver options.
    pub fn with_solver(mut self, options: SolverOptions) -> Self {
        self.solver = options;
        self
    }

    /// Set the block format.
    pub fn with_format(mut self, format: BlockFormat) -> Self {
        self.format = format;
        self
    }

    /// Set the UV convention.
    pub fn with_uv_convention(mut self, convention: UvConvention) -> Self {
        self.correspondence.uv_convention = convention;
        self
    }

    /// Set the endpoint damping of the compression-aware solve.
    pub fn with_endpoint_damping(mut self, damping: f64) -> Self {
        self.endpoint_damping = damping;
        self
    }

    /// UV convention used by every stage.
    pub fn uv_convention(&self) -> UvConvention {
        self.correspondence.uv_convention
    }

    fn compression(&self) -> CompressionOptions {
        CompressionOptions {
            solver: self.solver.clone(),
            format: self.format,
            endpoint_damping: self.endpoint_damping,
        }
    }
}

/// Runs the pipeline stages with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    /// Create a pipeline.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// The configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Extract correspondences, classify texels and partition the raster.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the mesh has
    /// non-finite texture coordinates on a seam.
    pub fn prepare<'a>(
        &'a self,
        mesh: &TexturedMesh,
        texture: &'a Texture,
    ) -> Result<Prepared<'a>> {
        self.config.solver.validate()?;
        self.config.format.validate()?;

        if let Some((min, max)) = mesh.uv_bounding_box() {
            if min.x < 0.0 || min.y < 0.0 || max.x > 1.0 || max.y > 1.0 {
                warn!(
                    "texture coordinates span ({:.3}, {:.3})..({:.3}, {:.3}); lookups outside [0, 1] are clamped to the border",
                    min.x, min.y, max.x, max.y
                );
            }
        }

        let (width, height) = (texture.width(), texture.height());
        let correspondences =
            extract_correspondences(mesh, width, height, &self.config.correspondence)?;
        let mask = classify(
            mesh,
            &correspondences,
            width,
            height,
            self.config.uv_convention(),
        );
        let partitions = BlockPartitioner::new(width, height, self.config.format.block_size)?
            .compute_partitions(&mask)?;

        Ok(Prepared {
            config: &self.config,
            texture,
            correspondences,
            mask,
            partitions,
        })
    }
}

/// Inputs and derived state shared by all variants.
#[derive(Debug, Clone)]
pub struct Prepared<'a> {
    config: &'a PipelineConfig,
    texture: &'a Texture,
    correspondences: Vec<SeamCorrespondence>,
    mask: ClassMask,
    partitions: Partitions,
}

/// Result of running one variant.
#[derive(Debug, Clone)]
pub struct VariantOutput {
    /// The variant that produced this output.
    pub variant: PipelineVariant,
    /// The output texture, decoded if compressed.
    pub texture: Texture,
    /// The encoded blocks of compressed variants.
    pub compressed: Option<CompressedTexture>,
    /// Solver diagnostics.
    pub report: SolveReport,
    /// Seam mismatch of the input texture.
    pub seam_before: SeamStats,
    /// Seam mismatch of the output texture.
    pub seam_after: SeamStats,
}

impl Prepared<'_> {
    /// The input texture.
    pub fn texture(&self) -> &Texture {
        self.texture
    }

    /// Seam correspondences.
    pub fn correspondences(&self) -> &[SeamCorrespondence] {
        &self.correspondences
    }

    /// Texel classification.
    pub fn mask(&self) -> &ClassMask {
        &self.mask
    }

    /// Block partitions.
    pub fn partitions(&self) -> &Partitions {
        &self.partitions
    }

    /// Seam texels rendered white on black.
    pub fn seam_mask(&self) -> Texture {
        self.mask.to_texture(PixelClass::Seam)
    }

    /// Run one variant.
    ///
    /// # Errors
    ///
    /// Returns an error only if a stage rejects its inputs; solver
    /// non-convergence is reported in [`VariantOutput::report`].
    pub fn run(&self, variant: PipelineVariant) -> Result<VariantOutput> {
        let (texture, compressed, report) = match variant {
            PipelineVariant::Seamless => {
                let result = solve_seamless(
                    self.texture,
                    &self.mask,
                    &self.correspondences,
                    &self.config.solver,
                )?;
                (result.texture, None, result.report)
            }
            PipelineVariant::SeamAwareCompressed => {
                let result = solve_compressed(
                    self.texture,
                    &self.mask,
                    &self.partitions,
                    &self.correspondences,
                    &self.config.compression(),
                )?;
                (result.texture, Some(result.compressed), result.report)
            }
            PipelineVariant::SeamlessThenCompressed => {
                let seamless = solve_seamless(
                    self.texture,
                    &self.mask,
                    &self.correspondences,
                    &self.config.solver,
                )?;
                let compressed = quantize_blocks(
                    &seamless.texture,
                    &self.mask,
                    &self.partitions,
                    &self.config.format,
                    self.config.solver.parallel,
                )?;
                let texture = compressed.decode(&seamless.texture)?;
                (texture, Some(compressed), seamless.report)
            }
        };

        let seam_before = seam_error(self.texture, &self.correspondences);
        let seam_after = seam_error(&texture, &self.correspondences);
        info!(
            "{}: max seam error {:.4} -> {:.4}, rms {:.4} -> {:.4}",
            variant.name(),
            seam_before.max,
            seam_after.max,
            seam_before.rms,
            seam_after.rms
        );

        Ok(VariantOutput {
            variant,
            texture,
            compressed,
            report,
            seam_before,
            seam_after,
        })
    }
}

/// Output file stem of a variant's artifacts, e.g. `cube_s`.
pub fn artifact_stem(mesh_name: &str, variant: PipelineVariant) -> String {
    format!("{}_{}", mesh_name, variant.suffix())
}

/// Output file stem of the seam mask, e.g. `cube_mask`.
pub fn mask_stem(mesh_name: &str) -> String {
    format!("{}_mask", mesh_name)
}
