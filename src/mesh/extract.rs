// extract.rs - Isosurface extraction from a sampled scalar field
//
// Values above `level` are inside. Each grid cell is split into six
// tetrahedra around its main diagonal; the split is the same in every cell
// so neighbouring cells agree on shared faces and the surface is closed.

use super::{Mesh, cross, dot, sub};
use std::collections::HashMap;

/// Surface extraction variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionAlgorithm {
    /// Marching-cubes family: per-cell marching tetrahedra
    #[default]
    MarchingTetrahedra,
}

/// Dense scalar field sampled on a regular grid, x fastest
#[derive(Debug, Clone)]
pub struct ScalarGrid {
    dims: [usize; 3],
    origin: [f32; 3],
    cell_size: f32,
    values: Vec<f32>,
}

impl ScalarGrid {
    pub fn new(dims: [usize; 3], origin: [f32; 3], cell_size: f32) -> Self {
        Self { dims, origin, cell_size, values: vec![0.0; dims[0] * dims[1] * dims[2]] }
    }

    /// Cube of `resolution + 1` points per axis spanning `[min, max]`
    pub fn cube(min: f32, max: f32, resolution: usize) -> Self {
        let n = resolution + 1;
        Self::new([n; 3], [min; 3], (max - min) / resolution as f32)
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    pub fn position(&self, x: usize, y: usize, z: usize) -> [f32; 3] {
        [
            self.origin[0] + x as f32 * self.cell_size,
            self.origin[1] + y as f32 * self.cell_size,
            self.origin[2] + z as f32 * self.cell_size,
        ]
    }

    /// Position of the point at flat index `i`
    pub fn position_at(&self, i: usize) -> [f32; 3] {
        let x = i % self.dims[0];
        let y = (i / self.dims[0]) % self.dims[1];
        let z = i / (self.dims[0] * self.dims[1]);
        self.position(x, y, z)
    }

    pub fn values_mut(&mut self) -> &mut [f32] {
        &mut self.values
    }

    pub fn fill_with(&mut self, f: impl Fn([f32; 3]) -> f32) {
        for i in 0..self.values.len() {
            self.values[i] = f(self.position_at(i));
        }
    }
}

// Corner offsets of a cell
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0], [1, 0, 0], [1, 1, 0], [0, 1, 0],
    [0, 0, 1], [1, 0, 1], [1, 1, 1], [0, 1, 1],
];

// Kuhn split: every tetrahedron walks from corner 0 to corner 6 along cell edges
const TETS: [[usize; 4]; 6] = [
    [0, 1, 2, 6], [0, 3, 2, 6], [0, 3, 7, 6],
    [0, 4, 7, 6], [0, 4, 5, 6], [0, 1, 5, 6],
];

/// Extract the `level` isosurface; triangles face away from the inside
pub fn extract_surface(grid: &ScalarGrid, level: f32, algorithm: ExtractionAlgorithm) -> Mesh {
    match algorithm {
        ExtractionAlgorithm::MarchingTetrahedra => marching_tetrahedra(grid, level),
    }
}

struct Builder<'a> {
    grid: &'a ScalarGrid,
    level: f32,
    edge_verts: HashMap<(usize, usize), u32>,
    mesh: Mesh,
}

impl Builder<'_> {
    fn edge_vertex(&mut self, a: usize, b: usize) -> u32 {
        let key = (a.min(b), a.max(b));
        if let Some(&v) = self.edge_verts.get(&key) {
            return v;
        }
        let (va, vb) = (self.grid.values[a], self.grid.values[b]);
        let t = if (vb - va).abs() > f32::EPSILON { ((self.level - va) / (vb - va)).clamp(0.0, 1.0) } else { 0.5 };
        let (pa, pb) = (self.grid.position_at(a), self.grid.position_at(b));
        let p = [
            pa[0] + (pb[0] - pa[0]) * t,
            pa[1] + (pb[1] - pa[1]) * t,
            pa[2] + (pb[2] - pa[2]) * t,
        ];
        let idx = self.mesh.positions.len() as u32;
        self.mesh.positions.push(p);
        self.edge_verts.insert(key, idx);
        idx
    }

    /// Emit a triangle wound so its normal points from `inside` toward `outside`
    fn triangle(&mut self, tri: [u32; 3], inside: [f32; 3], outside: [f32; 3]) {
        let [a, b, c] = tri.map(|i| self.mesh.positions[i as usize]);
        let n = cross(sub(b, a), sub(c, a));
        if dot(n, sub(outside, inside)) < 0.0 {
            self.mesh.faces.push([tri[0], tri[2], tri[1]]);
        } else {
            self.mesh.faces.push(tri);
        }
    }

    fn tetrahedron(&mut self, pts: [usize; 4]) {
        let inside: Vec<usize> = pts.iter().copied().filter(|&p| self.grid.values[p] > self.level).collect();
        let outside: Vec<usize> = pts.iter().copied().filter(|&p| self.grid.values[p] <= self.level).collect();
        if inside.is_empty() || outside.is_empty() {
            return;
        }
        let ci = centroid(self.grid, &inside);
        let co = centroid(self.grid, &outside);

        match inside.len() {
            1 | 3 => {
                let (lone, rest) = if inside.len() == 1 { (inside[0], &outside) } else { (outside[0], &inside) };
                let tri = [
                    self.edge_vertex(lone, rest[0]),
                    self.edge_vertex(lone, rest[1]),
                    self.edge_vertex(lone, rest[2]),
                ];
                self.triangle(tri, ci, co);
            }
            _ => {
                let e00 = self.edge_vertex(inside[0], outside[0]);
                let e01 = self.edge_vertex(inside[0], outside[1]);
                let e11 = self.edge_vertex(inside[1], outside[1]);
                let e10 = self.edge_vertex(inside[1], outside[0]);
                self.triangle([e00, e01, e11], ci, co);
                self.triangle([e00, e11, e10], ci, co);
            }
        }
    }
}

fn centroid(grid: &ScalarGrid, pts: &[usize]) -> [f32; 3] {
    let mut c = [0.0f32; 3];
    for &p in pts {
        let q = grid.position_at(p);
        for k in 0..3 {
            c[k] += q[k];
        }
    }
    c.map(|v| v / pts.len() as f32)
}

fn marching_tetrahedra(grid: &ScalarGrid, level: f32) -> Mesh {
    let [nx, ny, nz] = grid.dims;
    let mut b = Builder { grid, level, edge_verts: HashMap::new(), mesh: Mesh::default() };
    if nx < 2 || ny < 2 || nz < 2 {
        return b.mesh;
    }

    for z in 0..nz - 1 {
        for y in 0..ny - 1 {
            for x in 0..nx - 1 {
                let corners = CORNERS.map(|[dx, dy, dz]| grid.index(x + dx, y + dy, z + dz));
                let above = corners.iter().filter(|&&c| grid.values[c] > level).count();
                if above == 0 || above == 8 {
                    continue;
                }
                for tet in TETS {
                    b.tetrahedron(tet.map(|k| corners[k]));
                }
            }
        }
    }
    b.mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::length;
    use approx::assert_relative_eq;

    fn sphere(resolution: usize, radius: f32) -> (ScalarGrid, Mesh) {
        let mut grid = ScalarGrid::cube(-1.0, 1.0, resolution);
        grid.fill_with(|p| radius - length(p));
        let mesh = extract_surface(&grid, 0.0, ExtractionAlgorithm::default());
        (grid, mesh)
    }

    #[test]
    fn grid_indexing() {
        let grid = ScalarGrid::cube(-1.0, 1.0, 4);
        assert_eq!(grid.dims(), [5, 5, 5]);
        assert_eq!(grid.len(), 125);
        let i = grid.index(1, 2, 3);
        assert_eq!(grid.position_at(i), grid.position(1, 2, 3));
        assert_relative_eq!(grid.position(4, 4, 4)[0], 1.0);
    }

    #[test]
    fn sphere_vertices_lie_on_radius() {
        let (grid, mesh) = sphere(24, 0.63);
        assert!(mesh.face_count() > 100);
        let cell = 2.0 / 24.0;
        for p in &mesh.positions {
            assert!((length(*p) - 0.63).abs() < cell, "{p:?}");
        }
        assert_eq!(grid.dims(), [25; 3]);
    }

    #[test]
    fn sphere_is_closed() {
        let (_, mesh) = sphere(16, 0.63);
        let mut edges: HashMap<(u32, u32), usize> = HashMap::new();
        for f in &mesh.faces {
            for k in 0..3 {
                let (a, b) = (f[k], f[(k + 1) % 3]);
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        assert!(edges.values().all(|&n| n == 2));
    }

    #[test]
    fn sphere_faces_point_outward() {
        let (_, mesh) = sphere(16, 0.63);
        for f in &mesh.faces {
            let [a, b, c] = f.map(|i| mesh.positions[i as usize]);
            let n = cross(sub(b, a), sub(c, a));
            let centre = [(a[0] + b[0] + c[0]) / 3.0, (a[1] + b[1] + c[1]) / 3.0, (a[2] + b[2] + c[2]) / 3.0];
            assert!(dot(n, centre) > -1e-9);
        }
    }

    #[test]
    fn uniform_field_has_no_surface() {
        let mut grid = ScalarGrid::cube(-1.0, 1.0, 8);
        grid.fill_with(|_| -1.0);
        assert!(extract_surface(&grid, 0.0, ExtractionAlgorithm::default()).is_empty());
    }
}
