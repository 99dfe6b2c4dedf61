// config/ - Run parameters
//
// RunArgs holds raw CLI values, RunConfig the validated, immutable set.
// Model locations come from the environment.

mod paths;

pub use paths::OutputPaths;

use crate::error::{Error, Result};
use std::env;
use std::path::{Path, PathBuf};

pub const VALID_OCTREE: [u32; 4] = [256, 384, 512, 1024];
pub const MIN_STEPS: i64 = 10;
pub const MIN_CHUNKS: i64 = 64;

pub const DEFAULT_STEPS: i64 = 50;
pub const DEFAULT_OCTREE: i64 = 512;
pub const DEFAULT_CHUNKS: i64 = 16000;
pub const DEFAULT_BG_MODEL: &str = "u2net";

/// Seed for the initial latent noise
pub const SEED: u64 = 2025;

/// Pretrained repository the shape and paint weights are resolved from
pub const MODEL_PATH: &str = "tencent/Hunyuan3D-2";

/// Raw, unvalidated parameters as given on the command line
#[derive(Debug, Clone)]
pub struct RunArgs {
    pub steps: i64,
    pub octree: i64,
    pub chunks: i64,
    pub bgmodel: String,
    pub no_texture: bool,
    pub input: PathBuf,
    pub output: Option<PathBuf>,
}

impl RunArgs {
    pub fn new(input: impl Into<PathBuf>) -> Self {
        Self {
            steps: DEFAULT_STEPS,
            octree: DEFAULT_OCTREE,
            chunks: DEFAULT_CHUNKS,
            bgmodel: DEFAULT_BG_MODEL.to_string(),
            no_texture: false,
            input: input.into(),
            output: None,
        }
    }
}

/// Validated parameters for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub steps: u32,
    pub octree_resolution: u32,
    pub chunk_count: usize,
    pub background_model_name: String,
    pub no_texture: bool,
    pub input_path: PathBuf,
    pub mesh_output_path: PathBuf,
    pub texture_output_path: PathBuf,
}

impl RunConfig {
    /// Validate raw arguments and resolve output paths.
    ///
    /// Derived output names are placed in `base_dir` (pass an empty path for
    /// the working directory). Nothing is loaded or written; the overwrite
    /// guard runs last.
    pub fn from_args(args: &RunArgs, base_dir: &Path) -> Result<Self> {
        if args.steps < MIN_STEPS {
            return Err(Error::Validation(format!("steps should be at least {MIN_STEPS}")));
        }
        let steps = u32::try_from(args.steps)
            .map_err(|_| Error::Validation(format!("steps should be at most {}", u32::MAX)))?;

        let octree = u32::try_from(args.octree)
            .ok()
            .filter(|o| VALID_OCTREE.contains(o))
            .ok_or_else(|| {
                let valid: Vec<String> = VALID_OCTREE.iter().map(|v| v.to_string()).collect();
                Error::Validation(format!("valid octree values: {}", valid.join(",")))
            })?;

        if args.chunks < MIN_CHUNKS {
            return Err(Error::Validation(format!("chunks cannot be lower than {MIN_CHUNKS}")));
        }
        let chunk_count = usize::try_from(args.chunks)
            .map_err(|_| Error::Validation(format!("chunks should be at most {}", usize::MAX)))?;

        if !args.input.is_file() {
            return Err(Error::NotFound(args.input.clone()));
        }

        let paths = OutputPaths::derive(&args.input, args.output.as_deref(), base_dir)?;
        paths.check_overwrite(!args.no_texture)?;

        Ok(Self {
            steps,
            octree_resolution: octree,
            chunk_count,
            background_model_name: args.bgmodel.clone(),
            no_texture: args.no_texture,
            input_path: args.input.clone(),
            mesh_output_path: paths.mesh,
            texture_output_path: paths.texture,
        })
    }

    pub fn texture_enabled(&self) -> bool {
        !self.no_texture
    }
}

/// Root directory holding pretrained shape and paint weights
pub fn models_root() -> PathBuf {
    env_dir("HY3DGEN_MODELS", ".cache/hy3dgen")
}

/// Directory holding background-removal ONNX files
pub fn u2net_home() -> PathBuf {
    env_dir("U2NET_HOME", ".u2net")
}

fn env_dir(var: &str, fallback: &str) -> PathBuf {
    match env::var_os(var) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => dirs::home_dir().unwrap_or_default().join(fallback),
    }
}
