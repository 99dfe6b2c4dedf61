// ai/ - Pretrained model services
//
// The pipeline only sees the capability traits below. OnnxModelHub builds
// the ONNX Runtime backed implementations; tests substitute their own.
//
// Expected model layout:
//   $U2NET_HOME/<bgmodel>.onnx
//   $HY3DGEN_MODELS/tencent/Hunyuan3D-2/hunyuan3d-dit-v2-0/{conditioner,denoiser,geometry_decoder}.onnx

mod rembg;
mod shapegen;
mod texgen;

pub use rembg::{OnnxBackgroundRemover, model_names};
pub use shapegen::{OnnxShapePipeline, evaluate_grid, sample_flow, sample_noise};
pub use texgen::ProjectionPainter;

use crate::config::{self, RunConfig};
use crate::error::{Error, Result};
use crate::mesh::{ExtractionAlgorithm, Mesh, TexturedMesh};
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use std::path::{Path, PathBuf};

// ImageNet normalization constants
pub(crate) const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub(crate) const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Strips the background from an image
pub trait BackgroundRemoval {
    /// Model identifiers this remover accepts
    fn model_names(&self) -> Vec<&'static str>;

    /// Return the image with an alpha channel masking out the background
    fn remove(&mut self, image: DynamicImage) -> Result<DynamicImage>;
}

/// Parameters forwarded to the shape pipeline
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub steps: u32,
    pub octree_resolution: u32,
    pub num_chunks: usize,
    pub seed: u64,
    pub algorithm: ExtractionAlgorithm,
}

impl GenerationRequest {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            steps: config.steps,
            octree_resolution: config.octree_resolution,
            num_chunks: config.chunk_count,
            seed: config::SEED,
            algorithm: ExtractionAlgorithm::default(),
        }
    }
}

/// Image-conditioned mesh generator; may return several candidates
pub trait MeshGeneration {
    fn generate(&mut self, image: &DynamicImage, request: &GenerationRequest) -> Result<Vec<Mesh>>;
}

/// Colours a mesh from its source image
pub trait TexturePainting {
    fn paint(&mut self, mesh: &Mesh, image: &DynamicImage) -> Result<TexturedMesh>;
}

/// Lazily constructs model services; nothing is loaded until asked for
pub trait ModelHub {
    /// Background model names accepted by `background_remover`, without loading any
    fn background_model_names(&self) -> Vec<&'static str>;
    fn background_remover(&self, model_name: &str) -> Result<Box<dyn BackgroundRemoval>>;
    fn mesh_generator(&self) -> Result<Box<dyn MeshGeneration>>;
    fn texture_painter(&self) -> Result<Box<dyn TexturePainting>>;
}

/// ONNX Runtime backed services rooted at the configured model directories
#[derive(Debug, Clone)]
pub struct OnnxModelHub {
    pub u2net_home: PathBuf,
    pub models_root: PathBuf,
    pub model_path: String,
}

impl OnnxModelHub {
    pub fn from_env() -> Self {
        Self {
            u2net_home: config::u2net_home(),
            models_root: config::models_root(),
            model_path: config::MODEL_PATH.to_string(),
        }
    }
}

impl ModelHub for OnnxModelHub {
    fn background_model_names(&self) -> Vec<&'static str> {
        model_names()
    }

    fn background_remover(&self, model_name: &str) -> Result<Box<dyn BackgroundRemoval>> {
        Ok(Box::new(OnnxBackgroundRemover::new(&self.u2net_home, model_name)))
    }

    fn mesh_generator(&self) -> Result<Box<dyn MeshGeneration>> {
        Ok(Box::new(OnnxShapePipeline::from_pretrained(&self.models_root, &self.model_path)?))
    }

    fn texture_painter(&self) -> Result<Box<dyn TexturePainting>> {
        Ok(Box::new(ProjectionPainter::default()))
    }
}

/// Open an ONNX session, failing with a model error when the file is absent
pub(crate) fn open_session(path: &Path) -> Result<Session> {
    if !path.is_file() {
        return Err(Error::model(format!("model file {} not found", path.display())));
    }
    tracing::debug!("loading {}", path.display());
    Ok(Session::builder()?.commit_from_file(path)?)
}

/// Pack an RGB image into a normalized NCHW tensor.
/// Pixels are divided by `scale` before `(v - mean) / std`.
pub(crate) fn to_nchw(img: &RgbImage, scale: f32, mean: [f32; 3], std: [f32; 3]) -> Array4<f32> {
    let (w, h) = img.dimensions();
    let mut input = Array4::<f32>::zeros((1, 3, h as usize, w as usize));
    for (x, y, p) in img.enumerate_pixels() {
        for c in 0..3 {
            input[[0, c, y as usize, x as usize]] = (p[c] as f32 / scale - mean[c]) / std[c];
        }
    }
    input
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use image::Rgb;

    #[test]
    fn nchw_layout_and_normalization() {
        let mut img = RgbImage::new(3, 2);
        img.put_pixel(2, 1, Rgb([255, 0, 128]));
        let t = to_nchw(&img, 255.0, IMAGENET_MEAN, IMAGENET_STD);
        assert_eq!(t.shape(), &[1, 3, 2, 3]);
        assert_relative_eq!(t[[0, 0, 1, 2]], (1.0 - 0.485) / 0.229, epsilon = 1e-5);
        assert_relative_eq!(t[[0, 1, 1, 2]], (0.0 - 0.456) / 0.224, epsilon = 1e-5);
        assert_relative_eq!(t[[0, 0, 0, 0]], -0.485 / 0.229, epsilon = 1e-5);
    }

    #[test]
    fn missing_model_file_is_a_model_error() {
        let err = open_session(Path::new("/definitely/not/here.onnx")).unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert!(err.to_string().contains("here.onnx"));
    }

    #[test]
    fn hub_fails_to_load_absent_shape_weights() {
        let dir = tempfile::TempDir::new().unwrap();
        let hub = OnnxModelHub {
            u2net_home: dir.path().to_path_buf(),
            models_root: dir.path().to_path_buf(),
            model_path: config::MODEL_PATH.to_string(),
        };
        assert!(matches!(hub.mesh_generator(), Err(Error::Model(_))));
        assert!(hub.background_remover("u2net").is_ok());
        assert!(hub.texture_painter().is_ok());
        assert!(hub.background_model_names().contains(&"u2net"));
    }
}
