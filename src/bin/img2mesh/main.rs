// img2mesh - Generate a 3D mesh from a single image
//
// Pipeline:
//   1. Validate parameters, refuse to overwrite outputs
//   2. Remove the background (opaque RGB inputs only)
//   3. Sample a shape with the pretrained diffusion model
//   4. Remove floaters and degenerate faces, reduce face count
//   5. Write <name>.glb, then paint and write <name>.texture.glb
//
// Usage: img2mesh -i <image> [-o out.glb] [--steps N] [--octree N] [--chunks N]
//                 [--bgmodel NAME] [--no_texture]
//
// Models are read from $HY3DGEN_MODELS (default ~/.cache/hy3dgen) and
// $U2NET_HOME (default ~/.u2net).

use clap::Parser;
use colored::Colorize;
use img2mesh::ai::OnnxModelHub;
use img2mesh::config::{self, RunArgs};
use img2mesh::{Error, TextureOutcome};
use std::path::{Path, PathBuf};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const INSTALL_HINT: &str = "Texture generation needs the paint model and its runtime. \
Check that the Hunyuan3D-2 paint weights are installed under $HY3DGEN_MODELS.";

/// Generate a 3D mesh from a single image.
#[derive(Parser, Debug)]
#[command(name = "img2mesh")]
#[command(version, about, long_about = None)]
#[command(allow_negative_numbers = true)]
struct Cli {
    /// Number of diffusion steps (at least 10)
    #[arg(long, default_value_t = config::DEFAULT_STEPS)]
    steps: i64,

    /// Octree resolution: 256, 384, 512 or 1024
    #[arg(long, default_value_t = config::DEFAULT_OCTREE)]
    octree: i64,

    /// Number of decoder queries per batch (at least 64)
    #[arg(long, default_value_t = config::DEFAULT_CHUNKS)]
    chunks: i64,

    /// Background removal model
    #[arg(long, default_value = config::DEFAULT_BG_MODEL)]
    bgmodel: String,

    /// Skip texture generation
    #[arg(long = "no_texture")]
    no_texture: bool,

    /// Input image
    #[arg(short, long)]
    input: PathBuf,

    /// Output mesh file (default: <input name>.glb)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Suppress log output
    #[arg(long, short)]
    quiet: bool,

    /// Increase log verbosity (-v for debug, -vv for trace)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn run_args(&self) -> RunArgs {
        RunArgs {
            steps: self.steps,
            octree: self.octree,
            chunks: self.chunks,
            bgmodel: self.bgmodel.clone(),
            no_texture: self.no_texture,
            input: self.input.clone(),
            output: self.output.clone(),
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    if quiet {
        return;
    }

    // RUST_LOG wins over -v
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match verbose {
            0 => "img2mesh=info",
            1 => "img2mesh=debug",
            _ => "trace",
        };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

fn report_error(e: &Error) {
    eprintln!("{}: {}", "Error".red().bold(), e);
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let hub = OnnxModelHub::from_env();
    let report = match img2mesh::run_args(&cli.run_args(), Path::new(""), &hub) {
        Ok(report) => report,
        Err(e) => {
            report_error(&e);
            std::process::exit(e.exit_code());
        }
    };

    println!("Mesh saved to {} ({} faces)", report.mesh_path.display(), report.face_count);
    match &report.texture {
        TextureOutcome::Written(path) => println!("Textured mesh saved to {}", path.display()),
        TextureOutcome::Skipped => {}
        TextureOutcome::Failed(msg) => {
            eprintln!("{}: {}", "Warning".yellow().bold(), msg);
            eprintln!("  {}: {}", "Hint".green(), INSTALL_HINT);
        }
    }
}
