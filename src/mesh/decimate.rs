// decimate.rs - Quadric error metric edge collapse
//
// Garland-Heckbert simplification. Candidates carry the collapse stamps of
// both endpoints; a candidate whose stamps no longer match is stale and
// skipped. Boundary edges get perpendicular constraint planes so open
// borders do not shrink.

use super::{Mesh, cross, dot, sub};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

const BOUNDARY_WEIGHT: f64 = 1000.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecimateStats {
    pub collapses: usize,
    pub rejected: usize,
}

/// Symmetric 4x4 error quadric, upper triangle
#[derive(Debug, Clone, Copy, Default)]
struct Quadric([f64; 10]);

impl Quadric {
    fn from_plane(n: [f64; 3], d: f64, weight: f64) -> Self {
        let [a, b, c] = n;
        Self([a * a, a * b, a * c, a * d, b * b, b * c, b * d, c * c, c * d, d * d].map(|v| v * weight))
    }

    fn add(&self, o: &Quadric) -> Quadric {
        let mut out = self.0;
        for (v, w) in out.iter_mut().zip(o.0) {
            *v += w;
        }
        Quadric(out)
    }

    fn evaluate(&self, p: [f64; 3]) -> f64 {
        let [a, b, c, d, e, f, g, h, i, j] = self.0;
        let [x, y, z] = p;
        a * x * x + 2.0 * b * x * y + 2.0 * c * x * z + 2.0 * d * x
            + e * y * y + 2.0 * f * y * z + 2.0 * g * y
            + h * z * z + 2.0 * i * z
            + j
    }

    /// Minimiser of the quadric, or None when the 3x3 system is singular
    fn optimal_point(&self) -> Option<[f64; 3]> {
        let [a, b, c, d, e, f, g, h, i, _] = self.0;
        let det = a * (e * h - f * f) - b * (b * h - f * c) + c * (b * f - e * c);
        if det.abs() < 1e-12 {
            return None;
        }
        let inv = 1.0 / det;
        let m00 = (e * h - f * f) * inv;
        let m01 = (c * f - b * h) * inv;
        let m02 = (b * f - c * e) * inv;
        let m11 = (a * h - c * c) * inv;
        let m12 = (b * c - a * f) * inv;
        let m22 = (a * e - b * b) * inv;
        Some([
            -(m00 * d + m01 * g + m02 * i),
            -(m01 * d + m11 * g + m12 * i),
            -(m02 * d + m12 * g + m22 * i),
        ])
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    cost: f64,
    v1: u32,
    v2: u32,
    stamps: (u32, u32),
    target: [f64; 3],
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cost == other.cost
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Reversed so BinaryHeap pops the cheapest collapse first
    fn cmp(&self, other: &Self) -> Ordering {
        other.cost.total_cmp(&self.cost)
    }
}

struct Decimator {
    pos: Vec<[f64; 3]>,
    faces: Vec<[u32; 3]>,
    face_alive: Vec<bool>,
    vert_faces: Vec<Vec<u32>>,
    removed: Vec<bool>,
    stamp: Vec<u32>,
    quadrics: Vec<Quadric>,
    heap: BinaryHeap<Candidate>,
    alive: usize,
}

/// Collapse edges until at most `target_faces` remain or no valid collapse is left
pub fn decimate(mesh: &Mesh, target_faces: usize) -> (Mesh, DecimateStats) {
    let mut d = Decimator::new(mesh);
    let mut stats = DecimateStats::default();

    while d.alive > target_faces {
        let Some(c) = d.heap.pop() else { break };
        let (v1, v2) = (c.v1 as usize, c.v2 as usize);
        if d.removed[v1] || d.removed[v2] || (d.stamp[v1], d.stamp[v2]) != c.stamps {
            continue;
        }
        if !d.can_collapse(c.v1, c.v2, c.target) {
            stats.rejected += 1;
            continue;
        }
        d.collapse(c.v1, c.v2, c.target);
        stats.collapses += 1;
    }

    (d.into_mesh(), stats)
}

impl Decimator {
    fn new(mesh: &Mesh) -> Self {
        let pos: Vec<[f64; 3]> = mesh.positions.iter().map(|p| p.map(f64::from)).collect();
        let n = pos.len();
        let mut vert_faces = vec![Vec::new(); n];
        let mut quadrics = vec![Quadric::default(); n];
        let mut edge_faces: HashMap<(u32, u32), Vec<u32>> = HashMap::new();

        for (fi, face) in mesh.faces.iter().enumerate() {
            for k in 0..3 {
                vert_faces[face[k] as usize].push(fi as u32);
                let (a, b) = (face[k], face[(k + 1) % 3]);
                edge_faces.entry((a.min(b), a.max(b))).or_default().push(fi as u32);
            }
            if let Some((normal, area)) = plane(&pos, face) {
                let d = -dot(normal, pos[face[0] as usize]);
                let q = Quadric::from_plane(normal, d, area);
                for &v in face {
                    quadrics[v as usize] = quadrics[v as usize].add(&q);
                }
            }
        }

        for (&(a, b), faces) in &edge_faces {
            if faces.len() != 1 {
                continue;
            }
            let Some((normal, _)) = plane(&pos, &mesh.faces[faces[0] as usize]) else { continue };
            let (pa, pb) = (pos[a as usize], pos[b as usize]);
            let edge = sub(pb, pa);
            let len2 = dot(edge, edge);
            let side = cross(edge, normal);
            let side_len = dot(side, side).sqrt();
            if side_len < 1e-12 {
                continue;
            }
            let side = side.map(|v| v / side_len);
            let q = Quadric::from_plane(side, -dot(side, pa), BOUNDARY_WEIGHT * len2);
            quadrics[a as usize] = quadrics[a as usize].add(&q);
            quadrics[b as usize] = quadrics[b as usize].add(&q);
        }

        let mut d = Self {
            pos,
            faces: mesh.faces.clone(),
            face_alive: vec![true; mesh.faces.len()],
            vert_faces,
            removed: vec![false; n],
            stamp: vec![0; n],
            quadrics,
            heap: BinaryHeap::with_capacity(edge_faces.len()),
            alive: mesh.faces.len(),
        };
        let mut edges: Vec<(u32, u32)> = edge_faces.into_keys().collect();
        edges.sort_unstable();
        for (a, b) in edges {
            d.push_candidate(a, b);
        }
        d
    }

    fn push_candidate(&mut self, a: u32, b: u32) {
        let q = self.quadrics[a as usize].add(&self.quadrics[b as usize]);
        let (pa, pb) = (self.pos[a as usize], self.pos[b as usize]);
        let mid = [(pa[0] + pb[0]) * 0.5, (pa[1] + pb[1]) * 0.5, (pa[2] + pb[2]) * 0.5];
        let target = q.optimal_point().unwrap_or_else(|| {
            [pa, pb, mid]
                .into_iter()
                .min_by(|x, y| q.evaluate(*x).total_cmp(&q.evaluate(*y)))
                .unwrap_or(mid)
        });
        self.heap.push(Candidate {
            cost: q.evaluate(target).max(0.0),
            v1: a,
            v2: b,
            stamps: (self.stamp[a as usize], self.stamp[b as usize]),
            target,
        });
    }

    fn neighbors(&self, v: u32) -> Vec<u32> {
        let mut out: Vec<u32> = self.vert_faces[v as usize]
            .iter()
            .filter(|&&f| self.face_alive[f as usize])
            .flat_map(|&f| self.faces[f as usize])
            .filter(|&u| u != v)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Link condition plus a fold-over check on every face that moves
    fn can_collapse(&self, v1: u32, v2: u32, target: [f64; 3]) -> bool {
        let shared_faces = self.vert_faces[v1 as usize]
            .iter()
            .filter(|&&f| self.face_alive[f as usize] && self.faces[f as usize].contains(&v2))
            .count();
        if shared_faces == 0 {
            return false;
        }
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        let common = n1.iter().filter(|v| n2.binary_search(v).is_ok()).count();
        if common != shared_faces {
            return false;
        }
        // interior edge whose merged vertex would be left with fewer than three neighbours
        if shared_faces == 2 && n1.len() + n2.len() - common - 2 < 3 {
            return false;
        }

        for &v in &[v1, v2] {
            for &f in &self.vert_faces[v as usize] {
                let face = self.faces[f as usize];
                if !self.face_alive[f as usize] || (face.contains(&v1) && face.contains(&v2)) {
                    continue;
                }
                let Some((before, _)) = plane(&self.pos, &face) else { continue };
                let moved = face.map(|u| if u == v { target } else { self.pos[u as usize] });
                let after = cross(sub(moved[1], moved[0]), sub(moved[2], moved[0]));
                if dot(after, after) < 1e-24 || dot(before, after) <= 0.0 {
                    return false;
                }
            }
        }
        true
    }

    /// Merge v2 into v1 at `target`
    fn collapse(&mut self, v1: u32, v2: u32, target: [f64; 3]) {
        self.pos[v1 as usize] = target;
        self.quadrics[v1 as usize] = self.quadrics[v1 as usize].add(&self.quadrics[v2 as usize]);
        self.removed[v2 as usize] = true;

        let moved = std::mem::take(&mut self.vert_faces[v2 as usize]);
        for f in moved {
            if !self.face_alive[f as usize] {
                continue;
            }
            let face = &mut self.faces[f as usize];
            if face.contains(&v1) {
                self.face_alive[f as usize] = false;
                self.alive -= 1;
            } else {
                for u in face.iter_mut() {
                    if *u == v2 {
                        *u = v1;
                    }
                }
                self.vert_faces[v1 as usize].push(f);
            }
        }
        let alive = &self.face_alive;
        self.vert_faces[v1 as usize].retain(|&f| alive[f as usize]);

        self.stamp[v1 as usize] += 1;
        self.stamp[v2 as usize] += 1;
        for u in self.neighbors(v1) {
            self.push_candidate(v1, u);
        }
    }

    fn into_mesh(self) -> Mesh {
        let positions = self.pos.iter().map(|p| p.map(|c| c as f32)).collect();
        let faces = self
            .faces
            .iter()
            .zip(&self.face_alive)
            .filter(|(_, alive)| **alive)
            .map(|(f, _)| *f)
            .collect();
        Mesh::new(positions, faces).compact()
    }
}

/// Unit normal and area of a face, None when degenerate
fn plane(pos: &[[f64; 3]], face: &[u32; 3]) -> Option<([f64; 3], f64)> {
    let [a, b, c] = face.map(|i| pos[i as usize]);
    let n = cross(sub(b, a), sub(c, a));
    let len = dot(n, n).sqrt();
    if len < 1e-12 {
        return None;
    }
    Some((n.map(|v| v / len), len * 0.5))
}
