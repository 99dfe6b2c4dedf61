//! img2mesh: single-image 3D mesh generation.
//!
//! A run validates its parameters, strips the background from the input
//! image, samples a shape with a pretrained image-conditioned diffusion
//! model, cleans the extracted surface and writes it as binary glTF. An
//! optional second file carries the mesh with colours painted from the
//! source image.
//!
//! Model services sit behind the traits in [`ai`] so that [`pipeline::run`]
//! can be driven by any implementation.

pub mod ai;
pub mod config;
pub mod error;
pub mod mesh;
pub mod pipeline;

pub use config::{RunArgs, RunConfig};
pub use error::{Error, Result};
pub use pipeline::{RunReport, TextureOutcome, run, run_args};
