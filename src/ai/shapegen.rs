// shapegen.rs - Image-conditioned shape generation
//
// Pipeline:
//   1. Recenter the foreground, composite over white, resize to 518
//   2. Conditioner encodes the image; the unconditional branch is zeros
//   3. Flow-matching Euler integration of seeded latent noise with
//      classifier-free guidance
//   4. Geometry decoder evaluates occupancy logits on a dense grid, in chunks
//   5. Isosurface extraction at level 0

use super::{GenerationRequest, IMAGENET_MEAN, IMAGENET_STD, MeshGeneration, open_session, to_nchw};
use crate::error::{Error, Result};
use crate::mesh::{Mesh, ScalarGrid, extract_surface};
use image::{DynamicImage, GenericImageView, RgbImage, imageops::FilterType};
use ndarray::{Array1, Array3, ArrayD, Axis, concatenate};
use ort::session::Session;
use ort::value::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

const SUBFOLDER: &str = "hunyuan3d-dit-v2-0";
const CONDITION_SIZE: u32 = 518;
const BORDER_RATIO: f32 = 0.15;
const LATENT_TOKENS: usize = 3072;
const LATENT_CHANNELS: usize = 64;
const GUIDANCE_SCALE: f32 = 5.0;
const BOX_MIN: f32 = -1.01;
const BOX_MAX: f32 = 1.01;
const SURFACE_LEVEL: f32 = 0.0;

pub struct OnnxShapePipeline {
    conditioner: Session,
    denoiser: Session,
    decoder: Session,
}

impl OnnxShapePipeline {
    /// Load the three networks from `<root>/<model_path>/hunyuan3d-dit-v2-0/`
    pub fn from_pretrained(root: &Path, model_path: &str) -> Result<Self> {
        let dir = model_dir(root, model_path);
        if !dir.is_dir() {
            return Err(Error::model(format!("pretrained model directory {} not found", dir.display())));
        }
        info!("Loading shape pipeline from {}...", dir.display());
        Ok(Self {
            conditioner: open_session(&dir.join("conditioner.onnx"))?,
            denoiser: open_session(&dir.join("denoiser.onnx"))?,
            decoder: open_session(&dir.join("geometry_decoder.onnx"))?,
        })
    }

    fn encode_image(&mut self, image: &DynamicImage) -> Result<ArrayD<f32>> {
        let prepared = recenter(image);
        let prepared = image::imageops::resize(&prepared, CONDITION_SIZE, CONDITION_SIZE, FilterType::CatmullRom);
        let tensor = to_nchw(&prepared, 255.0, IMAGENET_MEAN, IMAGENET_STD);
        let outputs = self.conditioner.run(ort::inputs!["image" => Value::from_array(tensor)?])?;
        Ok(outputs[0].try_extract_array::<f32>()?.to_owned())
    }

    fn velocity(&mut self, latents: &Array3<f32>, t: f32, cond: &ArrayD<f32>) -> Result<(Array3<f32>, Array3<f32>)> {
        let batch = concatenate(Axis(0), &[latents.view(), latents.view()])?;
        let timestep = Array1::from_elem(2, t);
        let outputs = self.denoiser.run(ort::inputs![
            "latents" => Value::from_array(batch)?,
            "timestep" => Value::from_array(timestep)?,
            "cond" => Value::from_array(cond.clone())?,
        ])?;
        let v = outputs[0].try_extract_array::<f32>()?.to_owned().into_dimensionality::<ndarray::Ix3>()?;
        let cond_v = v.slice_axis(Axis(0), (0..1).into()).to_owned();
        let uncond_v = v.slice_axis(Axis(0), (1..2).into()).to_owned();
        Ok((cond_v, uncond_v))
    }

    fn decode(&mut self, latents: &Array3<f32>, points: &[[f32; 3]]) -> Result<Vec<f32>> {
        let flat: Vec<f32> = points.iter().flatten().copied().collect();
        let queries = Array3::from_shape_vec((1, points.len(), 3), flat)?;
        let outputs = self.decoder.run(ort::inputs![
            "latents" => Value::from_array(latents.clone())?,
            "queries" => Value::from_array(queries)?,
        ])?;
        let logits = outputs[0].try_extract_array::<f32>()?;
        Ok(logits.iter().copied().collect())
    }
}

impl MeshGeneration for OnnxShapePipeline {
    fn generate(&mut self, image: &DynamicImage, request: &GenerationRequest) -> Result<Vec<Mesh>> {
        let start = Instant::now();

        info!("Encoding image...");
        let cond = self.encode_image(image)?;
        let uncond = ArrayD::<f32>::zeros(cond.raw_dim());
        let cond = concatenate(Axis(0), &[cond.view(), uncond.view()])?;

        info!("Sampling latents ({} steps)...", request.steps);
        let noise = sample_noise(request.seed, (1, LATENT_TOKENS, LATENT_CHANNELS));
        let latents = sample_flow(noise, request.steps, GUIDANCE_SCALE, |x, t| self.velocity(x, t, &cond))?;

        let resolution = request.octree_resolution as usize;
        info!("Decoding volume at octree resolution {}...", resolution);
        let mut grid = ScalarGrid::cube(BOX_MIN, BOX_MAX, resolution);
        evaluate_grid(&mut grid, request.num_chunks, |points| self.decode(&latents, points))?;

        info!("Extracting surface...");
        let mesh = extract_surface(&grid, SURFACE_LEVEL, request.algorithm);
        if mesh.is_empty() {
            return Err(Error::model("decoded volume contains no surface"));
        }
        debug!(
            "{} vertices, {} faces in {:.1}s",
            mesh.vertex_count(),
            mesh.face_count(),
            start.elapsed().as_secs_f32()
        );
        Ok(vec![mesh])
    }
}

fn model_dir(root: &Path, model_path: &str) -> PathBuf {
    root.join(model_path).join(SUBFOLDER)
}

/// Standard normal noise from a fixed seed (Box-Muller)
pub fn sample_noise(seed: u64, shape: (usize, usize, usize)) -> Array3<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut next_pair = || {
        let u1 = 1.0 - rng.random::<f64>();
        let u2 = rng.random::<f64>();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = std::f64::consts::TAU * u2;
        [(r * theta.cos()) as f32, (r * theta.sin()) as f32]
    };
    let mut spare: Option<f32> = None;
    Array3::from_shape_simple_fn(shape, || match spare.take() {
        Some(v) => v,
        None => {
            let [a, b] = next_pair();
            spare = Some(b);
            a
        }
    })
}

/// Euler integration of a flow-matching velocity field from t=0 (noise) to t=1.
///
/// `velocity(x, t)` returns the conditional and unconditional predictions;
/// they are blended with guidance `scale`.
pub fn sample_flow<F>(mut latents: Array3<f32>, steps: u32, scale: f32, mut velocity: F) -> Result<Array3<f32>>
where
    F: FnMut(&Array3<f32>, f32) -> Result<(Array3<f32>, Array3<f32>)>,
{
    let steps = steps.max(1);
    for i in 0..steps {
        let t = i as f32 / steps as f32;
        let dt = 1.0 / steps as f32;
        let (cond, uncond) = velocity(&latents, t)?;
        if cond.shape() != latents.shape() || uncond.shape() != latents.shape() {
            return Err(Error::model(format!(
                "velocity shape {:?} does not match latents {:?}",
                cond.shape(),
                latents.shape()
            )));
        }
        let guided = &uncond + &((&cond - &uncond) * scale);
        latents.scaled_add(dt, &guided);
    }
    Ok(latents)
}

/// Fill every grid value by querying `decode` with at most `chunk` points at a time
pub fn evaluate_grid<F>(grid: &mut ScalarGrid, chunk: usize, mut decode: F) -> Result<()>
where
    F: FnMut(&[[f32; 3]]) -> Result<Vec<f32>>,
{
    let chunk = chunk.max(1);
    let total = grid.len();
    let mut points = Vec::with_capacity(chunk.min(total));
    let mut start = 0;
    while start < total {
        let end = (start + chunk).min(total);
        points.clear();
        points.extend((start..end).map(|i| grid.position_at(i)));
        let logits = decode(&points)?;
        if logits.len() != points.len() {
            return Err(Error::model(format!("decoder returned {} values for {} queries", logits.len(), points.len())));
        }
        grid.values_mut()[start..end].copy_from_slice(&logits);
        start = end;
    }
    Ok(())
}

/// Crop to the alpha bounding box, pad to a square with a border, composite over white
fn recenter(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let (w, h) = image.dimensions();

    let (mut x0, mut y0, mut x1, mut y1) = (w, h, 0u32, 0u32);
    for (x, y, p) in rgba.enumerate_pixels() {
        if p[3] > 0 {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    if x0 > x1 || y0 > y1 {
        (x0, y0, x1, y1) = (0, 0, w.saturating_sub(1), h.saturating_sub(1));
    }

    let (bw, bh) = (x1 - x0 + 1, y1 - y0 + 1);
    let side = ((bw.max(bh) as f32) / (1.0 - BORDER_RATIO)).ceil() as u32;
    let (ox, oy) = ((side - bw) / 2, (side - bh) / 2);

    let mut out = RgbImage::from_pixel(side, side, image::Rgb([255, 255, 255]));
    for y in 0..bh {
        for x in 0..bw {
            let p = rgba.get_pixel(x0 + x, y0 + y);
            let a = p[3] as f32 / 255.0;
            let blend = |c: u8| (c as f32 * a + 255.0 * (1.0 - a)).round() as u8;
            out.put_pixel(ox + x, oy + y, image::Rgb([blend(p[0]), blend(p[1]), blend(p[2])]));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ExtractionAlgorithm, length};
    use approx::assert_relative_eq;
    use image::{Rgba, RgbaImage};

    #[test]
    fn noise_is_seeded() {
        let a = sample_noise(2025, (1, 16, 8));
        let b = sample_noise(2025, (1, 16, 8));
        let c = sample_noise(7, (1, 16, 8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn odd_sized_noise_is_a_prefix_of_the_stream() {
        let odd = sample_noise(2025, (1, 3, 5));
        let even = sample_noise(2025, (1, 4, 5));
        assert_eq!(odd.shape(), &[1, 3, 5]);
        let odd: Vec<f32> = odd.iter().copied().collect();
        let even: Vec<f32> = even.iter().copied().collect();
        assert_eq!(odd[..], even[..15]);
        assert!(odd.iter().all(|v| v.is_finite() && *v != 0.0));
    }

    #[test]
    fn noise_is_roughly_standard() {
        let n = sample_noise(2025, (1, 3072, 8));
        let mean = n.mean().unwrap();
        let var = n.mapv(|v| (v - mean) * (v - mean)).mean().unwrap();
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.1, "var {var}");
    }

    #[test]
    fn constant_velocity_integrates_exactly() {
        let x0 = Array3::<f32>::zeros((1, 2, 2));
        let ones = Array3::<f32>::ones((1, 2, 2));
        let mut calls = Vec::new();
        let out = sample_flow(x0, 10, 5.0, |_, t| {
            calls.push(t);
            Ok((ones.clone(), ones.clone()))
        })
        .unwrap();
        assert_eq!(calls.len(), 10);
        assert_relative_eq!(calls[0], 0.0);
        assert_relative_eq!(calls[9], 0.9, epsilon = 1e-6);
        for v in out.iter() {
            assert_relative_eq!(*v, 1.0, epsilon = 1e-5);
        }
    }

    #[test]
    fn guidance_extrapolates_from_unconditional() {
        let x0 = Array3::<f32>::zeros((1, 1, 1));
        let out = sample_flow(x0, 1, 5.0, |_, _| {
            Ok((Array3::from_elem((1, 1, 1), 1.0), Array3::from_elem((1, 1, 1), 0.5)))
        })
        .unwrap();
        // 0.5 + 5 * (1.0 - 0.5)
        assert_relative_eq!(out[[0, 0, 0]], 3.0);
    }

    #[test]
    fn velocity_shape_mismatch_is_rejected() {
        let x0 = Array3::<f32>::zeros((1, 2, 2));
        let err = sample_flow(x0, 3, 1.0, |_, _| Ok((Array3::zeros((1, 1, 1)), Array3::zeros((1, 1, 1)))));
        assert!(matches!(err, Err(Error::Model(_))));
    }

    #[test]
    fn grid_is_evaluated_in_chunks() {
        let mut grid = ScalarGrid::cube(-1.0, 1.0, 8);
        let mut sizes = Vec::new();
        evaluate_grid(&mut grid, 100, |pts| {
            sizes.push(pts.len());
            Ok(pts.iter().map(|p| 0.5 - length(*p)).collect())
        })
        .unwrap();
        assert_eq!(sizes.iter().sum::<usize>(), 729);
        assert!(sizes.iter().all(|&s| s <= 100));
        assert_eq!(sizes.len(), 8);

        let mesh = extract_surface(&grid, 0.0, ExtractionAlgorithm::default());
        assert!(!mesh.is_empty());
    }

    #[test]
    fn short_decoder_output_fails() {
        let mut grid = ScalarGrid::cube(-1.0, 1.0, 2);
        let err = evaluate_grid(&mut grid, 64, |pts| Ok(vec![0.0; pts.len() - 1]));
        assert!(matches!(err, Err(Error::Model(_))));
    }

    #[test]
    fn recenter_pads_foreground_on_white() {
        let mut img = RgbaImage::new(100, 50);
        for y in 10..30 {
            for x in 20..60 {
                img.put_pixel(x, y, Rgba([255, 0, 0, 255]));
            }
        }
        let out = recenter(&DynamicImage::ImageRgba8(img));
        // 40 px wide foreground with a 15% border
        assert_eq!(out.width(), 48);
        assert_eq!(out.height(), 48);
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(24, 24).0, [255, 0, 0]);
    }

    #[test]
    fn missing_model_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = OnnxShapePipeline::from_pretrained(dir.path(), "tencent/Hunyuan3D-2").err().unwrap();
        assert!(err.to_string().contains("hunyuan3d-dit-v2-0"));
    }
}
