//! Scene description consumed by the renderer.
//!
//! This crate provides:
//! - A flat node list where each node is tagged with its kind
//! - Transforms, cameras and lights
//! - Ownership of the models, materials and textures nodes refer to

pub mod camera;
pub mod light;
mod scene;
pub mod transform;

pub use camera::{Camera, Projection};
pub use light::{DirectionalLight, Light, LightKind};
pub use scene::{NodeKind, Scene, SceneNode};
pub use transform::Transform;
