// filters.rs - Post-generation mesh cleanup
//
// Floater removal, degenerate-face removal, face reduction. Each filter
// consumes a mesh and returns a new one; `cleanup` runs them in order.

use super::{Mesh, decimate, diagonal};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// A pure mesh-to-mesh cleanup step
pub trait MeshFilter {
    fn name(&self) -> &'static str;
    fn apply(&self, mesh: Mesh) -> Mesh;
}

/// Run floater removal, degenerate-face removal and face reduction in that order
pub fn cleanup(mesh: Mesh) -> Mesh {
    let filters: [&dyn MeshFilter; 3] = [
        &FloaterRemover::default(),
        &DegenerateFaceRemover::default(),
        &FaceReducer::default(),
    ];
    filters.iter().fold(mesh, |mesh, filter| {
        let before = mesh.face_count();
        let out = filter.apply(mesh);
        info!("{}: {} -> {} faces", filter.name(), before, out.face_count());
        out
    })
}

// ============================================================================
// Floater removal
// ============================================================================

/// Removes disconnected fragments that are small relative to the whole mesh.
///
/// Components are vertex-connected. A component survives when its bounding
/// box diagonal is at least `min_diameter_ratio` of the mesh diagonal; the
/// largest component always survives.
#[derive(Debug, Clone)]
pub struct FloaterRemover {
    pub min_diameter_ratio: f32,
}

impl Default for FloaterRemover {
    fn default() -> Self {
        Self { min_diameter_ratio: 0.1 }
    }
}

impl MeshFilter for FloaterRemover {
    fn name(&self) -> &'static str {
        "floater removal"
    }

    fn apply(&self, mesh: Mesh) -> Mesh {
        let Some(total) = mesh.face_bounds() else { return mesh };
        let threshold = diagonal(total) * self.min_diameter_ratio;

        let labels = vertex_components(&mesh);
        let mut extents: BTreeMap<u32, ([f32; 3], [f32; 3], usize)> = BTreeMap::new();
        for face in &mesh.faces {
            let entry = extents
                .entry(labels[face[0] as usize])
                .or_insert(([f32::MAX; 3], [f32::MIN; 3], 0));
            entry.2 += 1;
            for &i in face {
                let p = mesh.positions[i as usize];
                for k in 0..3 {
                    entry.0[k] = entry.0[k].min(p[k]);
                    entry.1[k] = entry.1[k].max(p[k]);
                }
            }
        }

        // Ties go to the component holding the lowest vertex index
        let largest = extents
            .iter()
            .max_by_key(|&(&label, e)| (e.2, Reverse(label)))
            .map(|(&label, _)| label);
        let keep: HashSet<u32> = extents
            .iter()
            .filter(|&(label, e)| Some(*label) == largest || diagonal((e.0, e.1)) >= threshold)
            .map(|(&label, _)| label)
            .collect();

        debug!("{} components, keeping {}", extents.len(), keep.len());

        let Mesh { positions, faces } = mesh;
        let faces = faces
            .into_iter()
            .filter(|f| keep.contains(&labels[f[0] as usize]))
            .collect();
        Mesh::new(positions, faces).compact()
    }
}

/// Union-find over face edges; returns the root label of every vertex
fn vertex_components(mesh: &Mesh) -> Vec<u32> {
    fn find(parent: &mut [u32], mut x: u32) -> u32 {
        while parent[x as usize] != x {
            parent[x as usize] = parent[parent[x as usize] as usize];
            x = parent[x as usize];
        }
        x
    }

    let mut parent: Vec<u32> = (0..mesh.positions.len() as u32).collect();
    for face in &mesh.faces {
        for (a, b) in [(face[0], face[1]), (face[1], face[2])] {
            let (ra, rb) = (find(&mut parent, a), find(&mut parent, b));
            if ra != rb {
                parent[ra.max(rb) as usize] = ra.min(rb);
            }
        }
    }
    (0..parent.len() as u32).map(|v| find(&mut parent, v)).collect()
}

// ============================================================================
// Degenerate faces
// ============================================================================

/// Welds coincident vertices and drops zero-area, repeated-index and
/// duplicated faces, then unreferenced vertices.
#[derive(Debug, Clone)]
pub struct DegenerateFaceRemover {
    /// Faces with area at or below this fraction of the squared mesh diagonal are dropped
    pub relative_area_epsilon: f32,
}

impl Default for DegenerateFaceRemover {
    fn default() -> Self {
        Self { relative_area_epsilon: 1e-12 }
    }
}

impl MeshFilter for DegenerateFaceRemover {
    fn name(&self) -> &'static str {
        "degenerate face removal"
    }

    fn apply(&self, mesh: Mesh) -> Mesh {
        let Some(bounds) = mesh.face_bounds() else { return mesh };
        let min_area = diagonal(bounds).powi(2) * self.relative_area_epsilon;

        let mesh = weld_exact(mesh);
        let mut seen = HashSet::with_capacity(mesh.faces.len());
        let total = mesh.faces.len();
        let faces: Vec<[u32; 3]> = mesh
            .faces
            .iter()
            .copied()
            .filter(|&[a, b, c]| a != b && b != c && a != c)
            .filter(|&f| mesh.face_area(f) > min_area)
            .filter(|f| {
                let mut key = *f;
                key.sort_unstable();
                seen.insert(key)
            })
            .collect();

        if faces.len() < total {
            debug!("dropped {} degenerate faces", total - faces.len());
        }
        Mesh::new(mesh.positions, faces).compact()
    }
}

/// Merge vertices with bit-identical positions
fn weld_exact(mesh: Mesh) -> Mesh {
    let mut index: HashMap<[u32; 3], u32> = HashMap::with_capacity(mesh.positions.len());
    let mut positions = Vec::with_capacity(mesh.positions.len());
    let remap: Vec<u32> = mesh
        .positions
        .iter()
        .map(|p| {
            let key = p.map(|c| if c == 0.0 { 0 } else { c.to_bits() });
            *index.entry(key).or_insert_with(|| {
                positions.push(*p);
                positions.len() as u32 - 1
            })
        })
        .collect();
    let faces = mesh.faces.iter().map(|f| f.map(|i| remap[i as usize])).collect();
    Mesh::new(positions, faces)
}

// ============================================================================
// Face reduction
// ============================================================================

/// Quadric edge-collapse decimation down to a face budget
#[derive(Debug, Clone)]
pub struct FaceReducer {
    pub max_faces: usize,
}

impl Default for FaceReducer {
    fn default() -> Self {
        Self { max_faces: 40_000 }
    }
}

impl MeshFilter for FaceReducer {
    fn name(&self) -> &'static str {
        "face reduction"
    }

    fn apply(&self, mesh: Mesh) -> Mesh {
        if mesh.face_count() <= self.max_faces {
            return mesh;
        }
        let (out, stats) = decimate(&mesh, self.max_faces);
        debug!("{} collapses, {} rejected", stats.collapses, stats.rejected);
        out
    }
}
