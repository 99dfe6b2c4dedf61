// pipeline.rs - One generation run, end to end
//
//   validate -> overwrite guard -> load image -> [remove background]
//     -> generate -> cleanup -> write mesh -> [paint -> write texture]
//
// Everything before model loading is pure; a failing check leaves the
// filesystem untouched and loads nothing.

use crate::ai::{GenerationRequest, ModelHub};
use crate::config::{RunArgs, RunConfig};
use crate::error::{Error, Result};
use crate::mesh::{self, glb};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// What happened to the optional texture stage
#[derive(Debug, Clone, PartialEq)]
pub enum TextureOutcome {
    /// Texturing was disabled
    Skipped,
    Written(PathBuf),
    /// Painting or writing failed; the mesh output is still valid
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    pub mesh_path: PathBuf,
    pub face_count: usize,
    pub texture: TextureOutcome,
    /// Non-fatal problems, also logged as they happen
    pub warnings: Vec<String>,
}

/// Validate raw arguments against `base_dir`, then run
pub fn run_args(args: &RunArgs, base_dir: &Path, hub: &dyn ModelHub) -> Result<RunReport> {
    let config = RunConfig::from_args(args, base_dir)?;
    run(&config, hub)
}

/// Run a validated configuration
pub fn run(config: &RunConfig, hub: &dyn ModelHub) -> Result<RunReport> {
    let start = Instant::now();
    debug!("{:?}", config);

    let paths = crate::config::OutputPaths {
        mesh: config.mesh_output_path.clone(),
        texture: config.texture_output_path.clone(),
    };
    let mut warnings = Vec::new();
    if config.texture_enabled() && paths.texture_nested_in_mesh() {
        warnings.push(format!(
            "texture output {} is nested under the mesh output; it will not be writable",
            paths.texture.display()
        ));
    }
    let known = hub.background_model_names();
    if !known.contains(&config.background_model_name.as_str()) {
        warnings.push(format!(
            "invalid background remover model '{}'; valid options are {}",
            config.background_model_name,
            known.join(",")
        ));
    }
    for w in &warnings {
        warn!("{w}");
    }

    let image = load_image(config, hub)?;

    let mut generator = hub.mesh_generator()?;
    let request = GenerationRequest::from_config(config);
    let mesh = generator
        .generate(&image, &request)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::model("shape pipeline returned no mesh"))?;
    info!("Generated {} faces", mesh.face_count());

    let mesh = mesh::cleanup(mesh);

    info!("Writing {}...", config.mesh_output_path.display());
    glb::write_mesh(&config.mesh_output_path, &mesh)?;

    let texture = if config.texture_enabled() {
        match paint(config, hub, &mesh, &image) {
            Ok(path) => TextureOutcome::Written(path),
            Err(e) => {
                warn!("{e}");
                TextureOutcome::Failed(e.to_string())
            }
        }
    } else {
        TextureOutcome::Skipped
    };

    info!("Done in {:.1}s", start.elapsed().as_secs_f32());
    Ok(RunReport {
        mesh_path: config.mesh_output_path.clone(),
        face_count: mesh.face_count(),
        texture,
        warnings,
    })
}

/// Decode the input; strip the background only from opaque colour images
fn load_image(config: &RunConfig, hub: &dyn ModelHub) -> Result<DynamicImage> {
    info!("Loading {}...", config.input_path.display());
    let image = image::open(&config.input_path)?;
    if !needs_background_removal(&image) {
        debug!("input has {:?}, keeping it as is", image.color());
        return Ok(image);
    }

    let mut remover = hub.background_remover(&config.background_model_name)?;
    remover.remove(image)
}

fn needs_background_removal(image: &DynamicImage) -> bool {
    let color = image.color();
    color.has_color() && !color.has_alpha()
}

/// Texture stage; any failure is reported as a texture error
fn paint(config: &RunConfig, hub: &dyn ModelHub, mesh: &mesh::Mesh, image: &DynamicImage) -> Result<PathBuf> {
    let textured = hub
        .texture_painter()
        .and_then(|mut painter| painter.paint(mesh, image))
        .map_err(into_texture_error)?;
    info!("Writing {}...", config.texture_output_path.display());
    glb::write_textured(&config.texture_output_path, &textured).map_err(into_texture_error)?;
    Ok(config.texture_output_path.clone())
}

fn into_texture_error(e: Error) -> Error {
    match e {
        Error::Texture(_) => e,
        other => Error::texture(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, RgbImage, RgbaImage};

    #[test]
    fn only_opaque_colour_images_are_cut_out() {
        assert!(needs_background_removal(&DynamicImage::ImageRgb8(RgbImage::new(2, 2))));
        assert!(!needs_background_removal(&DynamicImage::ImageRgba8(RgbaImage::new(2, 2))));
        assert!(!needs_background_removal(&DynamicImage::ImageLuma8(GrayImage::new(2, 2))));
    }

    #[test]
    fn texture_errors_keep_their_kind() {
        let e = into_texture_error(Error::model("boom"));
        assert!(matches!(&e, Error::Texture(m) if m.contains("boom")));
        let e = into_texture_error(Error::texture("paint"));
        assert_eq!(e.to_string(), "texture generation failed: paint");
    }
}
