// glb.rs - Binary glTF 2.0 export
//
// Layout: 12-byte header, JSON chunk (space padded), BIN chunk (zero
// padded). One scene, one node, one triangle primitive.

use super::{Mesh, TexturedMesh};
use crate::error::Result;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

const MAGIC: u32 = 0x4654_6C67; // "glTF"
const VERSION: u32 = 2;
const CHUNK_JSON: u32 = 0x4E4F_534A;
const CHUNK_BIN: u32 = 0x004E_4942;

const ARRAY_BUFFER: u32 = 34962;
const ELEMENT_ARRAY_BUFFER: u32 = 34963;
const FLOAT: u32 = 5126;
const UNSIGNED_INT: u32 = 5125;
const UNSIGNED_BYTE: u32 = 5121;
const TRIANGLES: u32 = 4;

const GENERATOR: &str = concat!("img2mesh ", env!("CARGO_PKG_VERSION"));

/// Serialize geometry only
pub fn to_glb(mesh: &Mesh) -> Vec<u8> {
    encode(mesh, None)
}

/// Serialize geometry with per-vertex colour and a material
pub fn textured_to_glb(mesh: &TexturedMesh) -> Vec<u8> {
    encode(&mesh.mesh, Some(&mesh.colors))
}

pub fn write_mesh(path: &Path, mesh: &Mesh) -> Result<()> {
    write_file(path, &to_glb(mesh))
}

pub fn write_textured(path: &Path, mesh: &TexturedMesh) -> Result<()> {
    write_file(path, &textured_to_glb(mesh))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(bytes)?;
    out.flush()?;
    Ok(())
}

struct BinBuilder {
    data: Vec<u8>,
    views: Vec<Value>,
}

impl BinBuilder {
    /// Append a 4-byte aligned buffer view, returning its index
    fn view(&mut self, bytes: &[u8], target: u32) -> usize {
        let offset = self.data.len();
        self.data.extend_from_slice(bytes);
        while self.data.len() % 4 != 0 {
            self.data.push(0);
        }
        self.views.push(json!({
            "buffer": 0,
            "byteOffset": offset,
            "byteLength": bytes.len(),
            "target": target,
        }));
        self.views.len() - 1
    }
}

fn encode(mesh: &Mesh, colors: Option<&[[u8; 4]]>) -> Vec<u8> {
    let mut bin = BinBuilder { data: Vec::new(), views: Vec::new() };
    let mut accessors = Vec::new();
    let mut attributes = serde_json::Map::new();

    let positions: Vec<u8> = mesh.positions.iter().flatten().flat_map(|v| v.to_le_bytes()).collect();
    let view = bin.view(&positions, ARRAY_BUFFER);
    let (min, max) = mesh.bounds().unwrap_or(([0.0; 3], [0.0; 3]));
    accessors.push(json!({
        "bufferView": view,
        "componentType": FLOAT,
        "count": mesh.positions.len(),
        "type": "VEC3",
        "min": min,
        "max": max,
    }));
    attributes.insert("POSITION".into(), json!(accessors.len() - 1));

    if let Some(colors) = colors {
        let bytes: Vec<u8> = colors.iter().flatten().copied().collect();
        let view = bin.view(&bytes, ARRAY_BUFFER);
        accessors.push(json!({
            "bufferView": view,
            "componentType": UNSIGNED_BYTE,
            "normalized": true,
            "count": colors.len(),
            "type": "VEC4",
        }));
        attributes.insert("COLOR_0".into(), json!(accessors.len() - 1));
    }

    let indices: Vec<u8> = mesh.faces.iter().flatten().flat_map(|i| i.to_le_bytes()).collect();
    let view = bin.view(&indices, ELEMENT_ARRAY_BUFFER);
    accessors.push(json!({
        "bufferView": view,
        "componentType": UNSIGNED_INT,
        "count": mesh.faces.len() * 3,
        "type": "SCALAR",
    }));

    let mut primitive = json!({
        "attributes": attributes,
        "indices": accessors.len() - 1,
        "mode": TRIANGLES,
    });
    let mut doc = json!({
        "asset": { "version": "2.0", "generator": GENERATOR },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "mesh": 0 }],
        "accessors": accessors,
        "bufferViews": bin.views,
        "buffers": [{ "byteLength": bin.data.len() }],
    });
    if colors.is_some() {
        primitive["material"] = json!(0);
        doc["materials"] = json!([{
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 1.0, 1.0, 1.0],
                "metallicFactor": 0.0,
                "roughnessFactor": 1.0,
            },
            "doubleSided": false,
        }]);
    }
    doc["meshes"] = json!([{ "primitives": [primitive] }]);

    let mut json_bytes = doc.to_string().into_bytes();
    while json_bytes.len() % 4 != 0 {
        json_bytes.push(b' ');
    }

    let total = 12 + 8 + json_bytes.len() + 8 + bin.data.len();
    let mut out = Vec::with_capacity(total);
    for word in [MAGIC, VERSION, total as u32, json_bytes.len() as u32, CHUNK_JSON] {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.extend_from_slice(&json_bytes);
    out.extend_from_slice(&(bin.data.len() as u32).to_le_bytes());
    out.extend_from_slice(&CHUNK_BIN.to_le_bytes());
    out.extend_from_slice(&bin.data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::fixtures::cube;

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    fn json_chunk(bytes: &[u8]) -> Value {
        let len = u32_at(bytes, 12) as usize;
        serde_json::from_slice(&bytes[20..20 + len]).unwrap()
    }

    #[test]
    fn header_and_chunks() {
        let bytes = to_glb(&cube([0.0; 3], 1.0));
        assert_eq!(&bytes[0..4], b"glTF");
        assert_eq!(u32_at(&bytes, 4), 2);
        assert_eq!(u32_at(&bytes, 8) as usize, bytes.len());
        assert_eq!(&bytes[16..20], b"JSON");
        let json_len = u32_at(&bytes, 12) as usize;
        assert_eq!(json_len % 4, 0);
        let bin_at = 20 + json_len;
        assert_eq!(&bytes[bin_at + 4..bin_at + 8], b"BIN\0");
        // 8 vec3 positions + 36 u32 indices
        assert_eq!(u32_at(&bytes, bin_at) as usize, 8 * 12 + 36 * 4);
        assert_eq!(bytes.len() % 4, 0);
    }

    #[test]
    fn accessors_describe_mesh() {
        let doc = json_chunk(&to_glb(&cube([0.0; 3], 1.0)));
        let prim = &doc["meshes"][0]["primitives"][0];
        let pos = &doc["accessors"][prim["attributes"]["POSITION"].as_u64().unwrap() as usize];
        assert_eq!(pos["count"], 8);
        assert_eq!(pos["min"], json!([-1.0, -1.0, -1.0]));
        let idx = &doc["accessors"][prim["indices"].as_u64().unwrap() as usize];
        assert_eq!(idx["count"], 36);
        assert!(prim.get("material").is_none());
        assert!(doc.get("materials").is_none());
    }

    #[test]
    fn textured_adds_colour_and_material() {
        let mesh = cube([0.0; 3], 1.0);
        let colors = vec![[255, 0, 0, 255]; mesh.positions.len()];
        let doc = json_chunk(&textured_to_glb(&TexturedMesh::new(mesh, colors)));
        let prim = &doc["meshes"][0]["primitives"][0];
        let color = &doc["accessors"][prim["attributes"]["COLOR_0"].as_u64().unwrap() as usize];
        assert_eq!(color["type"], "VEC4");
        assert_eq!(color["normalized"], true);
        assert_eq!(prim["material"], 0);
        assert_eq!(doc["materials"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nope").join("a.glb");
        assert!(write_mesh(&path, &cube([0.0; 3], 1.0)).is_err());
    }
}
