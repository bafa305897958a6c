//! CPU-side asset data for the renderer.
//!
//! This crate holds what the scene hands to the GPU upload path:
//! - RGBA8 texture payloads decoded with the `image` crate
//! - Material parameters
//! - Model geometry split into per-material meshes
//! - Uniform and push-constant layouts shared with the shaders

mod error;
pub mod material;
pub mod model;
pub mod texture;
pub mod ubo;

pub use error::{ResourceError, ResourceResult};
pub use material::MaterialData;
pub use model::{MeshData, ModelData};
pub use texture::TextureData;
pub use ubo::{FrameUniforms, LightUniform, ModelPushConstants};

// Re-exported so callers can build geometry without depending on the RHI.
pub use toybox_rhi::vertex::Vertex;
