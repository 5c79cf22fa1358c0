//! Seam erasure by sparse least squares.
//!
//! For every colour channel independently, the solver minimizes
//!
//! ```text
//! E(c) = Σ_corr (c(a) − c(b))² + α · Σ_texels (c − c_original)²
//! ```
//!
//! over the values of all texels that are not Exterior, where `c(a)` and
//! `c(b)` are the bilinearly interpolated colours at the two ends of a seam
//! correspondence. Small α favours continuity across seams, large α favours
//! the original colours. The normal equations are symmetric positive
//! semi-definite and are solved with conjugate gradient, starting from the
//! original texture.
//!
//! # Example
//!
//! ```no_run
//! use texseam::algo::correspondence::{extract_correspondences, CorrespondenceOptions};
//! use texseam::algo::seamless::{solve_seamless, SolverOptions};
//! use texseam::texture::classify;
//!
//! let mesh = texseam::io::obj::load("model.obj").unwrap();
//! let texture = texseam::io::texture::load("model.png").unwrap();
//! let (w, h) = (texture.width(), texture.height());
//!
//! let options = CorrespondenceOptions::default();
//! let corrs = extract_correspondences(&mesh, w, h, &options).unwrap();
//! let mask = classify(&mesh, &corrs, w, h, options.uv_convention);
//!
//! let result = solve_seamless(&texture, &mask, &corrs, &SolverOptions::default()).unwrap();
//! println!("converged: {}", result.report.converged());
//! ```

use log::{debug, warn};
use nalgebra::DVector;
use rayon::prelude::*;

use crate::error::{Result, SeamError};
use crate::texture::{ClassMask, Tap, Texture};

use super::correspondence::SeamCorrespondence;
use super::sparse::{conjugate_gradient, NormalEquations};

/// Options for the seam solvers.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Weight of the fidelity term, in `[0, 1]`.
    pub alpha: f64,

    /// Maximum iterations for the conjugate gradient solver.
    pub max_iterations: usize,

    /// Convergence tolerance for the CG solver (relative residual).
    pub tolerance: f64,

    /// Whether to solve channels in parallel (default: true).
    pub parallel: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            alpha: 0.5,
            max_iterations: 2000,
            tolerance: 1e-10,
            parallel: true,
        }
    }
}

impl SolverOptions {
    /// Set the fidelity weight, clamped to `[0, 1]`.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha.clamp(0.0, 1.0);
        self
    }

    /// Set the maximum CG iterations.
    pub fn with_max_iterations(mut self, max_iter: usize) -> Self {
        self.max_iterations = max_iter;
        self
    }

    /// Set the convergence tolerance.
    pub fn with_tolerance(mut self, tol: f64) -> Self {
        self.tolerance = tol;
        self
    }

    /// Set whether to use parallel execution.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Create options for single-threaded execution.
    pub fn sequential(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(SeamError::invalid_param("alpha", self.alpha, "must lie in [0, 1]"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(SeamError::invalid_param(
                "tolerance",
                self.tolerance,
                "must be positive and finite",
            ));
        }
        Ok(())
    }
}

/// Solver diagnostics for one colour channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReport {
    /// Channel index.
    pub channel: usize,
    /// CG iterations performed.
    pub iterations: usize,
    /// Final relative residual.
    pub residual: f64,
    /// Whether the tolerance was reached.
    pub converged: bool,
}

/// Solver diagnostics for a whole texture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolveReport {
    /// Unknowns per channel.
    pub unknowns: usize,
    /// Least-squares rows per channel.
    pub rows: usize,
    /// Per-channel CG results.
    pub channels: Vec<ChannelReport>,
}

impl SolveReport {
    /// Whether every channel converged.
    pub fn converged(&self) -> bool {
        self.channels.iter().all(|c| c.converged)
    }

    /// Largest iteration count over channels.
    pub fn max_iterations(&self) -> usize {
        self.channels.iter().map(|c| c.iterations).max().unwrap_or(0)
    }

    /// Largest final residual over channels.
    pub fn max_residual(&self) -> f64 {
        self.channels.iter().map(|c| c.residual).fold(0.0, f64::max)
    }
}

/// Output of [`solve_seamless`].
#[derive(Debug, Clone)]
pub struct SeamlessResult {
    /// The corrected texture; a new buffer, the input is untouched.
    pub texture: Texture,
    /// Solver diagnostics.
    pub report: SolveReport,
}

/// Remove seams from a texture.
///
/// Exterior texels are not unknowns and are copied through unchanged. If a
/// channel hits the iteration cap its best iterate is used and a warning is
/// logged; this is never an error.
///
/// # Errors
///
/// Returns an error if the mask does not match the texture resolution or
/// the options are out of range.
pub fn solve_seamless(
    texture: &Texture,
    mask: &ClassMask,
    correspondences: &[SeamCorrespondence],
    options: &SolverOptions,
) -> Result<SeamlessResult> {
    options.validate()?;
    check_mask(texture, mask)?;

    let model = TexelUnknowns::new(mask);
    let taps = correspondence_taps(correspondences, texture.width(), texture.height());

    let initial = |channel: usize| {
        DVector::from_iterator(
            model.texels.len(),
            model.texels.iter().map(|&t| texture.get(t, channel)),
        )
    };

    let (solutions, report) = solve_channels(
        &model,
        texture,
        mask,
        &taps,
        options,
        initial,
        |_, _| {},
    );

    let mut out = texture.clone();
    for (channel, x) in solutions.iter().enumerate() {
        for (u, &texel) in model.texels.iter().enumerate() {
            out.set(texel, channel, x[u]);
        }
    }

    Ok(SeamlessResult {
        texture: out,
        report,
    })
}

pub(crate) fn check_mask(texture: &Texture, mask: &ClassMask) -> Result<()> {
    if (mask.width(), mask.height()) != (texture.width(), texture.height()) {
        return Err(SeamError::shape_mismatch(
            "mask resolution",
            (texture.width(), texture.height(), 1),
            (mask.width(), mask.height(), 1),
        ));
    }
    Ok(())
}

pub(crate) fn correspondence_taps(
    correspondences: &[SeamCorrespondence],
    width: usize,
    height: usize,
) -> Vec<(Vec<Tap>, Vec<Tap>)> {
    correspondences
        .iter()
        .map(|c| c.taps(width, height))
        .collect()
}

/// Expresses texel values as linear combinations of solver unknowns.
pub(crate) trait TexelModel: Sync {
    /// Number of unknowns per channel.
    fn num_unknowns(&self) -> usize;

    /// Append the expansion of `texel` to `out`. Returns `false` if the texel
    /// is held at its original value.
    fn expand(&self, texel: usize, out: &mut Vec<(usize, f64)>) -> bool;
}

/// One unknown per non-Exterior texel.
struct TexelUnknowns {
    of_texel: Vec<Option<usize>>,
    texels: Vec<usize>,
}

impl TexelUnknowns {
    fn new(mask: &ClassMask) -> Self {
        let mut of_texel = vec![None; mask.as_slice().len()];
        let mut texels = Vec::new();
        for (t, class) in mask.as_slice().iter().enumerate() {
            if class.is_active() {
                of_texel[t] = Some(texels.len());
                texels.push(t);
            }
        }
        Self { of_texel, texels }
    }
}

impl TexelModel for TexelUnknowns {
    fn num_unknowns(&self) -> usize {
        self.texels.len()
    }

    fn expand(&self, texel: usize, out: &mut Vec<(usize, f64)>) -> bool {
        match self.of_texel[texel] {
            Some(u) => {
                out.push((u, 1.0));
                true
            }
            None => false,
        }
    }
}

/// Build the seam + fidelity system for one channel.
pub(crate) fn build_channel_system<M: TexelModel>(
    model: &M,
    texture: &Texture,
    mask: &ClassMask,
    taps: &[(Vec<Tap>, Vec<Tap>)],
    channel: usize,
    alpha: f64,
) -> NormalEquations {
    let mut system = NormalEquations::new(model.num_unknowns());
    let mut row: Vec<(usize, f64)> = Vec::new();
    let mut expansion: Vec<(usize, f64)> = Vec::new();

    for (taps_a, taps_b) in taps {
        row.clear();
        let mut rhs = 0.0;
        for (side_taps, sign) in [(taps_a, 1.0), (taps_b, -1.0)] {
            for &(texel, w) in side_taps {
                expansion.clear();
                if model.expand(texel, &mut expansion) {
                    row.extend(expansion.iter().map(|&(u, c)| (u, sign * w * c)));
                } else {
                    rhs -= sign * w * texture.get(texel, channel);
                }
            }
        }
        system.add_row(&row, rhs, 1.0);
    }

    if alpha > 0.0 {
        for (texel, class) in mask.as_slice().iter().enumerate() {
            if !class.is_active() {
                continue;
            }
            expansion.clear();
            if model.expand(texel, &mut expansion) {
                system.add_row(&expansion, texture.get(texel, channel), alpha);
            }
        }
    }

    system
}

/// Build and solve every channel, in parallel when requested.
///
/// `initial` gives the CG starting point for a channel and `extra_rows` may
/// append model-specific rows before the system is finalized.
pub(crate) fn solve_channels<M, I, E>(
    model: &M,
    texture: &Texture,
    mask: &ClassMask,
    taps: &[(Vec<Tap>, Vec<Tap>)],
    options: &SolverOptions,
    initial: I,
    extra_rows: E,
) -> (Vec<DVector<f64>>, SolveReport)
where
    M: TexelModel,
    I: Fn(usize) -> DVector<f64> + Sync,
    E: Fn(&mut NormalEquations, usize) + Sync,
{
    let solve_one = |channel: usize| {
        let mut system = build_channel_system(model, texture, mask, taps, channel, options.alpha);
        extra_rows(&mut system, channel);
        let rows = system.num_rows();
        let (matrix, rhs) = system.finish();
        let x0 = initial(channel);

        let outcome = conjugate_gradient(
            &matrix,
            &rhs,
            Some(&x0),
            options.max_iterations,
            options.tolerance,
        );

        debug!(
            "channel {}: {} unknowns, {} rows, {} nonzeros, {} iterations, residual {:.3e}",
            channel,
            matrix.nrows(),
            rows,
            matrix.nnz(),
            outcome.iterations,
            outcome.residual
        );
        if !outcome.converged {
            warn!(
                "channel {} did not converge after {} iterations (residual {:.3e}); using best iterate",
                channel, outcome.iterations, outcome.residual
            );
        }

        let report = ChannelReport {
            channel,
            iterations: outcome.iterations,
            residual: outcome.residual,
            converged: outcome.converged,
        };
        (outcome.solution, report, rows)
    };

    let results: Vec<(DVector<f64>, ChannelReport, usize)> = if options.parallel {
        (0..texture.channels()).into_par_iter().map(solve_one).collect()
    } else {
        (0..texture.channels()).map(solve_one).collect()
    };

    let mut report = SolveReport {
        unknowns: model.num_unknowns(),
        rows: 0,
        channels: Vec::with_capacity(results.len()),
    };
    let mut solutions = Vec::with_capacity(results.len());
    for (x, channel_report, rows) in results {
        report.rows = report.rows.max(rows);
        report.channels.push(channel_report);
        solutions.push(x);
    }

    (solutions, report)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use nalgebra::Point2;

    use crate::texture::PixelClass;

    use super::*;

    /// A 4x1 strip: texels 0 and 3 are linked by one correspondence, texel 1
    /// is Interior and texel 2 is Exterior.
    fn strip() -> (Texture, ClassMask, Vec<SeamCorrespondence>) {
        let texture = Texture::from_raw(4, 1, 1, vec![0.2, 0.5, 0.9, 0.8]).unwrap();
        let mut mask = ClassMask::new(4, 1);
        mask.set(0, PixelClass::Seam);
        mask.set(1, PixelClass::Interior);
        mask.set(3, PixelClass::Seam);
        let corrs = vec![SeamCorrespondence {
            a: Point2::new(0.0, 0.0),
            b: Point2::new(3.0, 0.0),
        }];
        (texture, mask, corrs)
    }

    #[test]
    fn test_closed_form_two_texel_seam() {
        // (a - b)^2 + α((a - a0)^2 + (b - b0)^2): the gap shrinks to α/(2+α)
        let (texture, mask, corrs) = strip();
        let options = SolverOptions::default().with_alpha(0.5);
        let result = solve_seamless(&texture, &mask, &corrs, &options).unwrap();
        assert!(result.report.converged());

        let a = result.texture.get(0, 0);
        let b = result.texture.get(3, 0);
        let gap = 0.2 - 0.8;
        assert_relative_eq!(a - b, gap * 0.5 / 2.5, epsilon = 1e-8);
        assert_relative_eq!(a + b, 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_alpha_zero_closes_the_gap() {
        let (texture, mask, corrs) = strip();
        let options = SolverOptions::default().with_alpha(0.0);
        let result = solve_seamless(&texture, &mask, &corrs, &options).unwrap();

        let a = result.texture.get(0, 0);
        let b = result.texture.get(3, 0);
        assert_relative_eq!(a, b, epsilon = 1e-8);
        // Minimum-change solution: both meet at the mean
        assert_relative_eq!(a, 0.5, epsilon = 1e-8);
        // Interior texel without seam rows is left where it was
        assert_eq!(result.texture.get(1, 0), 0.5);
    }

    #[test]
    fn test_exterior_texels_untouched() {
        let (texture, mask, corrs) = strip();
        let result = solve_seamless(&texture, &mask, &corrs, &SolverOptions::default()).unwrap();
        assert_eq!(result.texture.get(2, 0).to_bits(), texture.get(2, 0).to_bits());
        assert_eq!(result.report.unknowns, 3);
    }

    #[test]
    fn test_exterior_taps_act_as_constants() {
        // Correspondence between an unknown texel and an Exterior one
        let texture = Texture::from_raw(2, 1, 1, vec![0.0, 1.0]).unwrap();
        let mut mask = ClassMask::new(2, 1);
        mask.set(0, PixelClass::Seam);
        let corrs = vec![SeamCorrespondence {
            a: Point2::new(0.0, 0.0),
            b: Point2::new(1.0, 0.0),
        }];
        let options = SolverOptions::default().with_alpha(1.0);
        let result = solve_seamless(&texture, &mask, &corrs, &options).unwrap();

        // (x - 1)^2 + (x - 0)^2 → x = 0.5, texel 1 stays at 1
        assert_relative_eq!(result.texture.get(0, 0), 0.5, epsilon = 1e-9);
        assert_eq!(result.texture.get(1, 0), 1.0);
    }

    #[test]
    fn test_sequential_matches_parallel() {
        let (texture, mask, corrs) = strip();
        let par = solve_seamless(&texture, &mask, &corrs, &SolverOptions::default()).unwrap();
        let seq = solve_seamless(
            &texture,
            &mask,
            &corrs,
            &SolverOptions::default().sequential(),
        )
        .unwrap();
        assert_eq!(par.texture, seq.texture);
    }

    #[test]
    fn test_iteration_cap_is_not_fatal() {
        let (texture, mask, corrs) = strip();
        let options = SolverOptions::default()
            .with_max_iterations(0)
            .with_tolerance(1e-14);
        let result = solve_seamless(&texture, &mask, &corrs, &options).unwrap();
        assert!(!result.report.converged());
        // Best iterate is the starting point
        assert_eq!(result.texture, texture);
    }

    #[test]
    fn test_mask_shape_checked() {
        let (texture, _, corrs) = strip();
        let mask = ClassMask::new(3, 1);
        assert!(matches!(
            solve_seamless(&texture, &mask, &corrs, &SolverOptions::default()),
            Err(SeamError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_out_of_range_alpha_rejected() {
        let (texture, mask, corrs) = strip();
        let options = SolverOptions {
            alpha: 1.5,
            ..Default::default()
        };
        assert!(solve_seamless(&texture, &mask, &corrs, &options).is_err());
    }
}
