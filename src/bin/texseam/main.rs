//! texseam CLI - remove texture seams from UV-mapped meshes.
//!
//! Usage: texseam [OPTIONS] <MESH> <TEXTURE>
//!
//! Writes `<name>_mask`, `<name>_s` and, with `-c`, `<name>_sac` textures
//! plus companion OBJ/MTL files, where `<name>` is the mesh file stem.
//! Run `texseam --help` for all options.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, ValueEnum};
use log::{info, warn};

use texseam::algo::compress::BlockFormat;
use texseam::algo::correspondence::CorrespondenceOptions;
use texseam::algo::seamless::SolverOptions;
use texseam::io::{self, obj};
use texseam::pipeline::{artifact_stem, mask_stem, Pipeline, PipelineConfig, PipelineVariant};
use texseam::texture::UvConvention;

#[derive(Parser)]
#[command(name = "texseam")]
#[command(author, version, about = "Remove texture seams from UV-mapped meshes", long_about = None)]
struct Cli {
    /// Input mesh (OBJ with texture coordinates)
    mesh: PathBuf,

    /// Input texture image
    texture: PathBuf,

    /// Also run seam-aware compression
    #[arg(short = 'c', long)]
    compress: bool,

    /// Also compress the seamless texture without seam awareness
    #[arg(long)]
    baseline: bool,

    /// Fidelity weight (0.0 to 1.0); lower favours seam continuity
    #[arg(long, default_value = "0.5", value_parser = parse_alpha)]
    alpha: f64,

    /// Compression block edge length
    #[arg(long, default_value = "4")]
    block_size: usize,

    /// Palette entries per compressed block
    #[arg(long, default_value = "4")]
    levels: usize,

    /// Bits per endpoint channel
    #[arg(long, default_value = "8")]
    endpoint_bits: u32,

    /// Correspondence samples per texel of seam length
    #[arg(long, default_value = "8.0")]
    samples_per_texel: f64,

    /// Maximum conjugate gradient iterations
    #[arg(long, default_value = "2000")]
    max_iterations: usize,

    /// Relative residual at which the solver stops
    #[arg(long, default_value = "1e-10")]
    tolerance: f64,

    /// Which image row v = 0 maps to
    #[arg(long, value_enum, default_value = "bottom-left")]
    uv_origin: UvOrigin,

    /// Directory for output files (default: current directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Use single-threaded execution (for benchmarking)
    #[arg(long)]
    sequential: bool,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum UvOrigin {
    /// v = 0 is the bottom row of the image (OpenGL, OBJ)
    BottomLeft,
    /// v = 0 is the top row of the image
    TopLeft,
}

impl From<UvOrigin> for UvConvention {
    fn from(origin: UvOrigin) -> Self {
        match origin {
            UvOrigin::BottomLeft => UvConvention::BottomUp,
            UvOrigin::TopLeft => UvConvention::TopDown,
        }
    }
}

fn parse_alpha(s: &str) -> Result<f64, String> {
    let alpha: f64 = s.parse().map_err(|_| format!("'{}' is not a number", s))?;
    if (0.0..=1.0).contains(&alpha) {
        Ok(alpha)
    } else {
        Err(format!("{} is not in [0, 1]", alpha))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = drop_unknown_flags(std::env::args_os().collect());
    let cli = Cli::parse_from(args);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Remove dash-arguments the CLI does not define, warning about each.
fn drop_unknown_flags(args: Vec<OsString>) -> Vec<OsString> {
    let command = Cli::command();
    let takes_value = |long: &str| {
        command
            .get_arguments()
            .find(|a| a.get_long() == Some(long))
            .map(|a| a.get_action().takes_values())
    };
    let is_known_short = |c: char| {
        matches!(c, 'h' | 'V') || command.get_arguments().any(|a| a.get_short() == Some(c))
    };

    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.into_iter();
    if let Some(program) = iter.next() {
        out.push(program);
    }

    while let Some(arg) = iter.next() {
        let text = arg.to_string_lossy().into_owned();

        if text == "--" {
            out.push(arg);
            out.extend(iter.by_ref());
            break;
        }

        if let Some(long) = text.strip_prefix("--") {
            let (name, inline_value) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            if matches!(name, "help" | "version") {
                out.push(arg);
                continue;
            }
            match takes_value(name) {
                Some(needs_value) => {
                    out.push(arg);
                    if needs_value && !inline_value {
                        if let Some(value) = iter.next() {
                            out.push(value);
                        }
                    }
                }
                None => warn!("ignoring unrecognized argument {}", text),
            }
        } else if text.len() > 1 && text.starts_with('-') && text.parse::<f64>().is_err() {
            if text.chars().skip(1).all(is_known_short) {
                out.push(arg);
            } else {
                warn!("ignoring unrecognized argument {}", text);
            }
        } else {
            out.push(arg);
        }
    }

    out
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mesh_name = cli
        .mesh
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("mesh")
        .to_string();
    let extension = io::extension_of(&cli.texture).unwrap_or_else(|| "png".to_string());
    let output_dir = cli.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let start = Instant::now();
    let mesh = obj::load(&cli.mesh)?;
    info!(
        "Loaded {}: {} vertices, {} uvs, {} faces ({:.2?})",
        cli.mesh.display(),
        mesh.num_positions(),
        mesh.num_uvs(),
        mesh.num_faces(),
        start.elapsed()
    );

    let start = Instant::now();
    let texture = io::texture::load(&cli.texture)?;
    info!(
        "Loaded {}: {}x{}, {} channels ({:.2?})",
        cli.texture.display(),
        texture.width(),
        texture.height(),
        texture.channels(),
        start.elapsed()
    );

    let solver = SolverOptions::default()
        .with_alpha(cli.alpha)
        .with_max_iterations(cli.max_iterations)
        .with_tolerance(cli.tolerance)
        .with_parallel(!cli.sequential);
    let format = BlockFormat::default()
        .with_block_size(cli.block_size)
        .with_levels(cli.levels)
        .with_endpoint_bits(cli.endpoint_bits);
    let correspondence = CorrespondenceOptions::default()
        .with_samples_per_texel(cli.samples_per_texel)
        .with_uv_convention(cli.uv_origin.into());
    let config = PipelineConfig::default()
        .with_correspondence(correspondence)
        .with_solver(solver)
        .with_format(format);

    let pipeline = Pipeline::new(config);
    let start = Instant::now();
    let prepared = pipeline.prepare(&mesh, &texture)?;
    info!("Preparing took {:.2?}", start.elapsed());

    if cli.output_dir.is_some() {
        std::fs::create_dir_all(&output_dir)?;
    }

    let mask_path = output_dir.join(format!("{}.{}", mask_stem(&mesh_name), extension));
    io::texture::save(&prepared.seam_mask(), &mask_path)?;
    info!("Saved: {}", mask_path.display());

    let mut variants = vec![PipelineVariant::Seamless];
    if cli.compress {
        variants.push(PipelineVariant::SeamAwareCompressed);
    }
    if cli.baseline {
        variants.push(PipelineVariant::SeamlessThenCompressed);
    }

    let mode = if cli.sequential { "sequential" } else { "parallel" };
    for variant in variants {
        info!("Solving {} (alpha={}, {})...", variant.name(), cli.alpha, mode);
        let start = Instant::now();
        let output = prepared.run(variant)?;
        info!(
            "Optimization took {:.2?}: {} iterations, residual {:.3e}{}",
            start.elapsed(),
            output.report.max_iterations(),
            output.report.max_residual(),
            if output.report.converged() { "" } else { " (not converged)" }
        );

        let stem = artifact_stem(&mesh_name, variant);
        save_artifacts(&output_dir, &stem, &extension, &output.texture, &mesh)?;
    }

    Ok(())
}

fn save_artifacts(
    dir: &Path,
    stem: &str,
    extension: &str,
    texture: &texseam::texture::Texture,
    mesh: &texseam::mesh::TexturedMesh,
) -> Result<(), Box<dyn std::error::Error>> {
    let texture_name = format!("{}.{}", stem, extension);
    let texture_path = dir.join(&texture_name);

    let start = Instant::now();
    io::texture::save(texture, &texture_path)?;
    info!("Saved: {} ({:.2?})", texture_path.display(), start.elapsed());

    let mesh_path = dir.join(format!("{}.obj", stem));
    let start = Instant::now();
    obj::save_with_material(mesh, &mesh_path, &texture_name)?;
    info!("Saved: {} ({:.2?})", mesh_path.display(), start.elapsed());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<OsString> {
        list.iter().map(OsString::from).collect()
    }

    #[test]
    fn test_unknown_flags_dropped() {
        let filtered = drop_unknown_flags(args(&[
            "texseam", "-x", "mesh.obj", "--frobnicate", "tex.png", "-c", "--alpha", "0.3",
        ]));
        assert_eq!(
            filtered,
            args(&["texseam", "mesh.obj", "tex.png", "-c", "--alpha", "0.3"])
        );
    }

    #[test]
    fn test_known_flags_parse() {
        let filtered = drop_unknown_flags(args(&[
            "texseam",
            "m.obj",
            "t.png",
            "--levels=8",
            "--uv-origin",
            "top-left",
            "--sequential",
        ]));
        let cli = Cli::try_parse_from(filtered).unwrap();
        assert_eq!(cli.levels, 8);
        assert!(cli.uv_origin == UvOrigin::TopLeft);
        assert!(cli.sequential);
        assert!(!cli.compress);
    }

    #[test]
    fn test_alpha_out_of_range_is_usage_error() {
        let parse = |alpha: &str| {
            Cli::try_parse_from(args(&["texseam", "m.obj", "t.png", "--alpha", alpha]))
        };
        assert!(parse("5").is_err());
        assert!(parse("-0.1").is_err());
        assert!(parse("half").is_err());
        assert_eq!(parse("1").unwrap().alpha, 1.0);
    }

    #[test]
    fn test_missing_positionals_is_usage_error() {
        let result = Cli::try_parse_from(args(&["texseam", "mesh.obj"]));
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }
}
