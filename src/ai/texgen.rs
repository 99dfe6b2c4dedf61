// texgen.rs - Vertex colours projected from the conditioning image
//
// The image is a front view: mesh X/Y bounds map onto the foreground's
// bounding box (Y up). Vertices that land on background take the mean
// foreground colour.

use super::TexturePainting;
use crate::error::{Error, Result};
use crate::mesh::{Mesh, TexturedMesh};
use image::{DynamicImage, RgbaImage};
use tracing::info;

const ALPHA_THRESHOLD: u8 = 128;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectionPainter;

struct Foreground {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
    mean: [u8; 3],
}

fn foreground(img: &RgbaImage) -> Option<Foreground> {
    let (mut x0, mut y0, mut x1, mut y1) = (u32::MAX, u32::MAX, 0, 0);
    let mut sum = [0u64; 3];
    let mut count = 0u64;
    for (x, y, p) in img.enumerate_pixels() {
        if p[3] < ALPHA_THRESHOLD {
            continue;
        }
        x0 = x0.min(x);
        y0 = y0.min(y);
        x1 = x1.max(x);
        y1 = y1.max(y);
        for c in 0..3 {
            sum[c] += p[c] as u64;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some(Foreground { x0, y0, x1, y1, mean: sum.map(|s| (s / count) as u8) })
}

impl TexturePainting for ProjectionPainter {
    fn paint(&mut self, mesh: &Mesh, image: &DynamicImage) -> Result<TexturedMesh> {
        let (min, max) = mesh.bounds().ok_or_else(|| Error::texture("cannot paint an empty mesh"))?;
        let rgba = image.to_rgba8();
        let fg = foreground(&rgba).ok_or_else(|| Error::texture("image has no foreground to project"))?;
        info!("Painting {} vertices...", mesh.vertex_count());

        let w = (max[0] - min[0]).max(f32::EPSILON);
        let h = (max[1] - min[1]).max(f32::EPSILON);
        let (bw, bh) = ((fg.x1 - fg.x0) as f32, (fg.y1 - fg.y0) as f32);

        let colors = mesh
            .positions
            .iter()
            .map(|p| {
                let u = ((p[0] - min[0]) / w).clamp(0.0, 1.0);
                let v = ((max[1] - p[1]) / h).clamp(0.0, 1.0);
                let px = fg.x0 + (u * bw).round() as u32;
                let py = fg.y0 + (v * bh).round() as u32;
                let s = rgba.get_pixel(px, py);
                if s[3] < ALPHA_THRESHOLD {
                    [fg.mean[0], fg.mean[1], fg.mean[2], 255]
                } else {
                    [s[0], s[1], s[2], 255]
                }
            })
            .collect();

        Ok(TexturedMesh::new(mesh.clone(), colors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    /// Red top half, blue bottom half, inset in a transparent frame
    fn split_image() -> DynamicImage {
        let mut img = RgbaImage::new(20, 20);
        for y in 5..15 {
            for x in 5..15 {
                let c = if y < 10 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) };
                img.put_pixel(x, y, c);
            }
        }
        DynamicImage::ImageRgba8(img)
    }

    fn quad() -> Mesh {
        Mesh::new(
            vec![[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn top_of_mesh_takes_top_of_image() {
        let out = ProjectionPainter.paint(&quad(), &split_image()).unwrap();
        assert_eq!(out.colors.len(), 4);
        assert_eq!(out.colors[0], [0, 0, 255, 255]);
        assert_eq!(out.colors[1], [0, 0, 255, 255]);
        assert_eq!(out.colors[2], [255, 0, 0, 255]);
        assert_eq!(out.colors[3], [255, 0, 0, 255]);
        assert_eq!(out.mesh.faces, quad().faces);
    }

    #[test]
    fn background_samples_use_mean_colour() {
        // Foreground only on the diagonal corners of its bounding box
        let mut img = RgbaImage::new(4, 4);
        img.put_pixel(0, 0, Rgba([200, 0, 0, 255]));
        img.put_pixel(3, 3, Rgba([0, 0, 100, 255]));
        let out = ProjectionPainter.paint(&quad(), &DynamicImage::ImageRgba8(img)).unwrap();
        assert_eq!(out.colors[0], [100, 0, 50, 255]);
        assert_eq!(out.colors[1], [0, 0, 100, 255]);
        assert_eq!(out.colors[2], [100, 0, 50, 255]);
        assert_eq!(out.colors[3], [200, 0, 0, 255]);
    }

    #[test]
    fn empty_mesh_is_an_error() {
        let err = ProjectionPainter.paint(&Mesh::default(), &split_image()).unwrap_err();
        assert!(matches!(err, Error::Texture(_)));
    }

    #[test]
    fn transparent_image_is_an_error() {
        let img = DynamicImage::ImageRgba8(RgbaImage::new(8, 8));
        assert!(matches!(ProjectionPainter.paint(&quad(), &img), Err(Error::Texture(_))));
    }
}
