// rembg.rs - Background removal with salient-object segmentation models
//
// U2Net / ISNet / BiRefNet ONNX exports as distributed for rembg. The
// predicted mask is min-max normalized, resized to the source and used as
// its alpha channel.

use super::{BackgroundRemoval, IMAGENET_MEAN, IMAGENET_STD, open_session, to_nchw};
use crate::error::{Error, Result};
use image::{DynamicImage, GrayImage, Luma, RgbImage, RgbaImage, imageops::FilterType};
use ort::session::Session;
use ort::value::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq)]
enum MaskOutput {
    /// First output, raw saliency
    First,
    /// Last output, logits
    LastSigmoid,
}

#[derive(Debug, Clone, Copy)]
struct ModelInfo {
    name: &'static str,
    size: u32,
    mean: [f32; 3],
    std: [f32; 3],
    output: MaskOutput,
}

const HALF: [f32; 3] = [0.5, 0.5, 0.5];
const UNIT: [f32; 3] = [1.0, 1.0, 1.0];

const MODELS: &[ModelInfo] = &[
    ModelInfo { name: "u2net", size: 320, mean: IMAGENET_MEAN, std: IMAGENET_STD, output: MaskOutput::First },
    ModelInfo { name: "u2netp", size: 320, mean: IMAGENET_MEAN, std: IMAGENET_STD, output: MaskOutput::First },
    ModelInfo { name: "u2net_human_seg", size: 320, mean: IMAGENET_MEAN, std: IMAGENET_STD, output: MaskOutput::First },
    ModelInfo { name: "silueta", size: 320, mean: IMAGENET_MEAN, std: IMAGENET_STD, output: MaskOutput::First },
    ModelInfo { name: "isnet-general-use", size: 1024, mean: HALF, std: UNIT, output: MaskOutput::First },
    ModelInfo { name: "isnet-anime", size: 1024, mean: HALF, std: UNIT, output: MaskOutput::First },
    ModelInfo { name: "birefnet-general", size: 1024, mean: IMAGENET_MEAN, std: IMAGENET_STD, output: MaskOutput::LastSigmoid },
    ModelInfo { name: "birefnet-general-lite", size: 1024, mean: IMAGENET_MEAN, std: IMAGENET_STD, output: MaskOutput::LastSigmoid },
];

/// Names of every supported background model
pub fn model_names() -> Vec<&'static str> {
    MODELS.iter().map(|m| m.name).collect()
}

fn model_info(name: &str) -> Option<ModelInfo> {
    MODELS.iter().copied().find(|m| m.name == name)
}

/// Remover for one named model; the session opens on first use
pub struct OnnxBackgroundRemover {
    home: PathBuf,
    name: String,
    session: Option<Session>,
}

impl OnnxBackgroundRemover {
    pub fn new(home: &Path, name: &str) -> Self {
        Self { home: home.to_path_buf(), name: name.to_string(), session: None }
    }

    pub fn model_file(&self) -> PathBuf {
        self.home.join(format!("{}.onnx", self.name))
    }

    fn predict(&mut self, model: &ModelInfo, input: &RgbImage) -> Result<(Vec<f32>, usize, usize)> {
        if self.session.is_none() {
            self.session = Some(open_session(&self.model_file())?);
        }
        let Some(session) = self.session.as_mut() else {
            return Err(Error::model("background session unavailable"));
        };

        let resized = image::imageops::resize(input, model.size, model.size, FilterType::Lanczos3);
        let peak = resized.pixels().flat_map(|p| p.0).max().unwrap_or(0).max(1) as f32;
        let tensor = to_nchw(&resized, peak, model.mean, model.std);

        let input_name = session.inputs.first().map(|i| i.name.clone()).unwrap_or_else(|| "input.1".into());
        let outputs = session.run(ort::inputs![input_name => Value::from_array(tensor)?])?;
        let index = match model.output {
            MaskOutput::First => 0,
            MaskOutput::LastSigmoid => outputs.len().saturating_sub(1),
        };
        let arr = outputs[index].try_extract_array::<f32>()?;

        // (1, 1, H, W), (1, H, W) or (H, W)
        let shape = arr.shape().to_vec();
        let (h, w) = match shape.len() {
            4 => (shape[2], shape[3]),
            3 => (shape[1], shape[2]),
            2 => (shape[0], shape[1]),
            _ => return Err(Error::model(format!("unexpected mask shape {shape:?}"))),
        };
        let mut pred: Vec<f32> = arr.iter().take(h * w).copied().collect();
        if model.output == MaskOutput::LastSigmoid {
            pred.iter_mut().for_each(|v| *v = 1.0 / (1.0 + (-*v).exp()));
        }
        Ok((pred, w, h))
    }
}

impl BackgroundRemoval for OnnxBackgroundRemover {
    fn model_names(&self) -> Vec<&'static str> {
        model_names()
    }

    fn remove(&mut self, image: DynamicImage) -> Result<DynamicImage> {
        let model = model_info(&self.name)
            .ok_or_else(|| Error::model(format!("no session for background model '{}'", self.name)))?;
        info!("Removing background with {}...", model.name);

        let rgb = image.to_rgb8();
        let (pred, w, h) = self.predict(&model, &rgb)?;
        debug!("mask {}x{}", w, h);

        let mask = mask_from_prediction(&pred, w, h)?;
        let mask = image::imageops::resize(&mask, rgb.width(), rgb.height(), FilterType::Lanczos3);
        Ok(DynamicImage::ImageRgba8(apply_mask(&rgb, &mask)))
    }
}

/// Min-max normalize a prediction into an 8-bit mask
fn mask_from_prediction(pred: &[f32], w: usize, h: usize) -> Result<GrayImage> {
    if pred.len() != w * h {
        return Err(Error::model(format!("mask has {} values, expected {}", pred.len(), w * h)));
    }
    let (lo, hi) = pred.iter().fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = (hi - lo).max(1e-6);
    Ok(GrayImage::from_fn(w as u32, h as u32, |x, y| {
        let v = (pred[y as usize * w + x as usize] - lo) / range;
        Luma([(v * 255.0).clamp(0.0, 255.0) as u8])
    }))
}

/// Naive cutout: source colour with the mask as alpha
fn apply_mask(rgb: &RgbImage, mask: &GrayImage) -> RgbaImage {
    RgbaImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        image::Rgba([r, g, b, mask.get_pixel(x, y)[0]])
    })
}
