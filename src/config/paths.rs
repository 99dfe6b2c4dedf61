// paths.rs - Output path derivation and overwrite guard

use crate::error::{Error, Result};
use std::path::{self, Path, PathBuf};

const MESH_SUFFIX: &str = ".glb";
const TEXTURE_SUFFIX: &str = ".texture.glb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub mesh: PathBuf,
    pub texture: PathBuf,
}

impl OutputPaths {
    /// Derive mesh and texture paths.
    ///
    /// With an explicit output the texture file is placed *inside* the
    /// absolute mesh path, e.g. `out/a.glb` gives `/abs/out/a.glb/a.texture.glb`.
    /// Without one, both names come from the input stem and land in `base_dir`.
    pub fn derive(input: &Path, output: Option<&Path>, base_dir: &Path) -> Result<Self> {
        match output {
            Some(mesh) => {
                let texture = path::absolute(mesh)?.join(format!("{}{TEXTURE_SUFFIX}", base_name(mesh)));
                Ok(Self { mesh: mesh.to_path_buf(), texture })
            }
            None => {
                let base = base_name(input);
                Ok(Self {
                    mesh: base_dir.join(format!("{base}{MESH_SUFFIX}")),
                    texture: base_dir.join(format!("{base}{TEXTURE_SUFFIX}")),
                })
            }
        }
    }

    /// Refuse to clobber existing outputs. The texture path only matters when texturing.
    pub fn check_overwrite(&self, texture_enabled: bool) -> Result<()> {
        if self.mesh.is_file() {
            return Err(Error::Conflict(self.mesh.clone()));
        }
        if texture_enabled && self.texture.is_file() {
            return Err(Error::Conflict(self.texture.clone()));
        }
        Ok(())
    }

    /// True when the texture file would sit under the mesh file as if it were a directory
    pub fn texture_nested_in_mesh(&self) -> bool {
        match path::absolute(&self.mesh) {
            Ok(mesh) => self.texture.starts_with(mesh),
            Err(_) => false,
        }
    }
}

/// File name up to its first dot: `cat.v2.png` -> `cat`
fn base_name(path: &Path) -> String {
    let name = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}
