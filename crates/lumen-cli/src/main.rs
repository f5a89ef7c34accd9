mod bench_runner;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lumen_core::hash::hash_surface;
use lumen_core::LumenConfig;
use lumen_render::image_loader::{load_surface, save_surface};
use lumen_render::{
    asset_requests, build_passes, AssetBundle, Backend, Composer, FrameInputs, GpuRenderer,
    SmaaLookup,
};

#[derive(Parser)]
#[command(
    name = "lumen",
    version,
    about = "Lumen: fused post-processing passes and SMAA antialiasing",
    long_about = "Lumen merges chains of image effects into single shader passes.\nConfigure passes in TOML, apply them to images, inspect the fused WGSL."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply the configured passes to an image
    Render {
        /// Pipeline configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,

        /// Input image
        #[arg()]
        input: PathBuf,

        /// Output image (format follows the extension)
        #[arg(short, long)]
        output: PathBuf,

        /// Depth image for depth-based effects
        #[arg(long)]
        depth: Option<PathBuf>,

        /// Override the configured backend: cpu or gpu
        #[arg(long)]
        backend: Option<String>,

        /// Frames to render; the last one is written
        #[arg(long, default_value_t = 1)]
        frames: u32,
    },

    /// Print the fused WGSL of every configured pass
    Fuse {
        #[arg(short, long)]
        config: PathBuf,

        /// Only this pass (zero-based)
        #[arg(long)]
        pass: Option<usize>,

        /// Print program metadata as JSON instead of WGSL
        #[arg(long)]
        json: bool,
    },

    /// Write the SMAA search and area lookup textures as PNG
    Lut {
        /// Destination directory
        #[arg(default_value = "luts")]
        dir: PathBuf,
    },

    /// Time the configured pipeline at several resolutions
    Bench {
        #[arg(short, long)]
        config: PathBuf,

        #[arg(long, default_value_t = 30)]
        frames: u32,

        #[arg(long, default_value = "tests/snapshots/benchmarks.json")]
        baseline: PathBuf,

        /// Overwrite the baseline instead of comparing against it
        #[arg(long)]
        update_baseline: bool,
    },

    /// Display version and backend info
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Render {
            config,
            input,
            output,
            depth,
            backend,
            frames,
        } => cmd_render(&config, &input, &output, depth.as_deref(), backend, frames),
        Commands::Fuse { config, pass, json } => cmd_fuse(&config, pass, json),
        Commands::Lut { dir } => cmd_lut(&dir),
        Commands::Bench {
            config,
            frames,
            baseline,
            update_baseline,
        } => bench_runner::run_benchmark(config, frames, baseline, update_baseline),
        Commands::Info => cmd_info(),
    }
}

/// Parse the configuration and load every asset it references.
pub(crate) fn load_config(path: &Path) -> Result<(LumenConfig, AssetBundle)> {
    let config = LumenConfig::load_from_file(path)
        .with_context(|| format!("failed to load config: {}", path.display()))?;
    let loader = asset_requests(&config);
    let bundle = if loader.is_empty() {
        AssetBundle::default()
    } else {
        loader.load_blocking()?
    };
    Ok((config, bundle))
}

pub(crate) fn backend_for(name: &str) -> Result<Backend> {
    match name {
        "cpu" => Ok(Backend::Cpu),
        "gpu" => Ok(Backend::Gpu(Arc::new(GpuRenderer::headless()?))),
        other => anyhow::bail!("unknown backend '{other}' (expected cpu or gpu)"),
    }
}

fn cmd_render(
    config_path: &Path,
    input: &Path,
    output: &Path,
    depth: Option<&Path>,
    backend: Option<String>,
    frames: u32,
) -> Result<()> {
    let (config, bundle) = load_config(config_path)?;
    let color = load_surface(input).with_context(|| format!("failed to read {}", input.display()))?;
    let depth = depth.map(load_surface).transpose()?;

    let (width, height) = color.size();
    if let (Some(w), Some(h)) = (config.render.width, config.render.height) {
        if (w, h) != (width, height) {
            anyhow::bail!("config expects {w}x{h} but {} is {width}x{height}", input.display());
        }
    }

    let backend_name = backend.unwrap_or_else(|| config.render.backend.clone());
    let mut composer = Composer::new(width, height).with_backend(backend_for(&backend_name)?);
    for pass in build_passes(&config, &bundle)? {
        composer.add_pass(pass)?;
    }

    println!("🎨 Rendering {}", input.display());
    println!("   Passes:  {}", composer.passes().len());
    println!("   Backend: {}", backend_name);
    println!("   Size:    {}x{}", width, height);

    let start = Instant::now();
    let mut last = None;
    for index in 0..frames.max(1) {
        let mut inputs = FrameInputs::new(&color).at(index as f32 / 60.0, index);
        if let Some(depth) = &depth {
            inputs = inputs.with_depth(depth);
        }
        last = Some(composer.render(&inputs)?.clone());
    }
    let elapsed = start.elapsed();

    let result = last.context("no frame rendered")?;
    save_surface(&result, output)?;
    println!(
        "   ✓ {} frame(s) in {:.1}ms",
        frames.max(1),
        elapsed.as_secs_f64() * 1000.0
    );
    println!("   Hash:    {}", hash_surface(&result).short());
    println!("   📦 Output: {}", output.display());
    Ok(())
}

fn cmd_fuse(config_path: &Path, only: Option<usize>, json: bool) -> Result<()> {
    let (config, bundle) = load_config(config_path)?;
    let passes = build_passes(&config, &bundle)?;
    if let Some(index) = only {
        if index >= passes.len() {
            anyhow::bail!("pass {index} out of range ({} configured)", passes.len());
        }
    }

    for (index, pass) in passes.iter().enumerate() {
        if only.is_some_and(|o| o != index) {
            continue;
        }
        let program = pass.program();
        if json {
            println!("{}", program.metadata_json()?);
        } else {
            println!("// pass {index}: {} ({})", program.label(), program.id());
            println!("{}", program.source());
        }
    }
    Ok(())
}

fn cmd_lut(dir: &Path) -> Result<()> {
    let lookup = SmaaLookup::generate();
    lookup
        .save_png(dir)
        .with_context(|| format!("failed to write lookup textures to {}", dir.display()))?;
    println!("   ✓ Wrote SMAA lookup textures to {}", dir.display());
    Ok(())
}

fn cmd_info() -> Result<()> {
    println!("Lumen {}", env!("CARGO_PKG_VERSION"));
    println!(
        "   Blend functions: {}",
        lumen_core::BlendFunction::ALL
            .iter()
            .map(|f| f.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
    match GpuRenderer::headless() {
        Ok(gpu) => println!("   GPU: {}", gpu.context().adapter.get_info().name),
        Err(e) => println!("   GPU: unavailable ({e})"),
    }
    Ok(())
}
