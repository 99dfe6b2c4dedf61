// mesh/ - Triangle mesh types and cleanup
//
// Indexed triangle meshes with f32 positions. Cleanup filters are pure
// Mesh -> Mesh transforms; glb serialization lives beside them.

mod decimate;
mod extract;
mod filters;
pub mod glb;

pub use decimate::{DecimateStats, decimate};
pub use extract::{ExtractionAlgorithm, ScalarGrid, extract_surface};
pub use filters::{DegenerateFaceRemover, FaceReducer, FloaterRemover, MeshFilter, cleanup};

use std::ops::{Add, Mul, Sub};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub faces: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(positions: Vec<[f32; 3]>, faces: Vec<[u32; 3]>) -> Self {
        Self { positions, faces }
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    /// Axis-aligned bounds over all vertices
    pub fn bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        bounds_of(self.positions.iter())
    }

    /// Bounds over vertices referenced by faces only
    pub fn face_bounds(&self) -> Option<([f32; 3], [f32; 3])> {
        bounds_of(self.faces.iter().flatten().map(|&i| &self.positions[i as usize]))
    }

    pub fn face_area(&self, face: [u32; 3]) -> f32 {
        let [a, b, c] = face.map(|i| self.positions[i as usize]);
        0.5 * length(cross(sub(b, a), sub(c, a)))
    }

    /// Drop vertices no face references, renumbering faces
    pub fn compact(mut self) -> Self {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut positions = Vec::with_capacity(self.positions.len());
        for face in &mut self.faces {
            for idx in face.iter_mut() {
                let slot = &mut remap[*idx as usize];
                if *slot == u32::MAX {
                    *slot = positions.len() as u32;
                    positions.push(self.positions[*idx as usize]);
                }
                *idx = *slot;
            }
        }
        self.positions = positions;
        self
    }
}

/// Mesh with one RGBA colour per vertex and a flat base material
#[derive(Debug, Clone, PartialEq)]
pub struct TexturedMesh {
    pub mesh: Mesh,
    pub colors: Vec<[u8; 4]>,
}

impl TexturedMesh {
    pub fn new(mesh: Mesh, colors: Vec<[u8; 4]>) -> Self {
        debug_assert_eq!(mesh.positions.len(), colors.len());
        Self { mesh, colors }
    }
}

fn bounds_of<'a>(points: impl Iterator<Item = &'a [f32; 3]>) -> Option<([f32; 3], [f32; 3])> {
    let mut it = points.peekable();
    it.peek()?;
    let mut min = [f32::MAX; 3];
    let mut max = [f32::MIN; 3];
    for p in it {
        for k in 0..3 {
            min[k] = min[k].min(p[k]);
            max[k] = max[k].max(p[k]);
        }
    }
    Some((min, max))
}

// Small vector helpers shared by the filters, extractor and decimator.
// Generic so the decimator can run them in f64.

#[inline]
pub(crate) fn sub<T: Copy + Sub<Output = T>>(a: [T; 3], b: [T; 3]) -> [T; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub(crate) fn cross<T: Copy + Sub<Output = T> + Mul<Output = T>>(a: [T; 3], b: [T; 3]) -> [T; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub(crate) fn dot<T: Copy + Add<Output = T> + Mul<Output = T>>(a: [T; 3], b: [T; 3]) -> T {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub(crate) fn length(a: [f32; 3]) -> f32 {
    dot(a, a).sqrt()
}

pub(crate) fn diagonal(bounds: ([f32; 3], [f32; 3])) -> f32 {
    length(sub(bounds.1, bounds.0))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::Mesh;

    /// Closed axis-aligned cube: 8 corners, 12 faces, outward winding
    pub fn cube(center: [f32; 3], half: f32) -> Mesh {
        let [cx, cy, cz] = center;
        let p = |x: f32, y: f32, z: f32| [cx + x * half, cy + y * half, cz + z * half];
        let positions = vec![
            p(-1.0, -1.0, -1.0),
            p(1.0, -1.0, -1.0),
            p(1.0, 1.0, -1.0),
            p(-1.0, 1.0, -1.0),
            p(-1.0, -1.0, 1.0),
            p(1.0, -1.0, 1.0),
            p(1.0, 1.0, 1.0),
            p(-1.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1], [0, 3, 2],
            [4, 5, 6], [4, 6, 7],
            [0, 1, 5], [0, 5, 4],
            [2, 3, 7], [2, 7, 6],
            [1, 2, 6], [1, 6, 5],
            [0, 4, 7], [0, 7, 3],
        ];
        Mesh::new(positions, faces)
    }

    /// Merge meshes into one, offsetting indices
    pub fn merge(parts: &[Mesh]) -> Mesh {
        let mut out = Mesh::default();
        for part in parts {
            let base = out.positions.len() as u32;
            out.positions.extend_from_slice(&part.positions);
            out.faces.extend(part.faces.iter().map(|f| f.map(|i| i + base)));
        }
        out
    }

    /// Flat grid of (n x n) quads in the XY plane, 2*n*n faces
    pub fn grid(n: usize) -> Mesh {
        let mut positions = Vec::new();
        for y in 0..=n {
            for x in 0..=n {
                positions.push([x as f32 / n as f32, y as f32 / n as f32, 0.0]);
            }
        }
        let idx = |x: usize, y: usize| (y * (n + 1) + x) as u32;
        let mut faces = Vec::new();
        for y in 0..n {
            for x in 0..n {
                faces.push([idx(x, y), idx(x + 1, y), idx(x + 1, y + 1)]);
                faces.push([idx(x, y), idx(x + 1, y + 1), idx(x, y + 1)]);
            }
        }
        Mesh::new(positions, faces)
    }
}
