//! The scene value handed to the renderer.
//!
//! Nodes form a flat list. What a node is comes from its [`NodeKind`]
//! payload, and the assets models refer to (geometry, materials, textures)
//! are owned by the scene and addressed by index.

use glam::Vec3;
use toybox_core::{FatalError, ensure_fatal};
use toybox_resources::ubo::{LightUniform, MAX_LIGHTS};
use toybox_resources::{MaterialData, ModelData, TextureData};
use tracing::debug;

use crate::camera::Camera;
use crate::light::{DirectionalLight, Light};
use crate::transform::Transform;

/// What a node carries.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    /// Draws `Scene::models[model]`.
    Model { model: usize },
    Camera(Camera),
    Light(Light),
    Empty,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub name: String,
    pub transform: Transform,
    pub kind: NodeKind,
}

impl SceneNode {
    pub fn new(name: impl Into<String>, transform: Transform, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            transform,
            kind,
        }
    }
}

/// Everything the renderer draws, before any GPU handle exists.
#[derive(Clone, Debug)]
pub struct Scene {
    pub nodes: Vec<SceneNode>,
    pub models: Vec<ModelData>,
    pub materials: Vec<MaterialData>,
    pub textures: Vec<TextureData>,
    pub ambient_color: Vec3,
    pub ambient_intensity: f32,
    pub sun: DirectionalLight,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            models: Vec::new(),
            materials: Vec::new(),
            textures: Vec::new(),
            ambient_color: Vec3::ONE,
            ambient_intensity: 0.1,
            sun: DirectionalLight::default(),
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_texture(&mut self, texture: TextureData) -> usize {
        self.textures.push(texture);
        self.textures.len() - 1
    }

    pub fn add_material(&mut self, material: MaterialData) -> usize {
        self.materials.push(material);
        self.materials.len() - 1
    }

    pub fn add_model(&mut self, model: ModelData) -> usize {
        self.models.push(model);
        self.models.len() - 1
    }

    pub fn add_node(&mut self, node: SceneNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// The first camera node, if any.
    pub fn active_camera(&self) -> Option<(&Transform, &Camera)> {
        self.nodes.iter().find_map(|node| match &node.kind {
            NodeKind::Camera(camera) => Some((&node.transform, camera)),
            _ => None,
        })
    }

    pub fn lights(&self) -> impl Iterator<Item = (&Transform, &Light)> {
        self.nodes.iter().filter_map(|node| match &node.kind {
            NodeKind::Light(light) => Some((&node.transform, light)),
            _ => None,
        })
    }

    /// Model nodes with the index of the model they draw.
    pub fn model_nodes(&self) -> impl Iterator<Item = (&Transform, usize)> {
        self.nodes.iter().filter_map(|node| match node.kind {
            NodeKind::Model { model } => Some((&node.transform, model)),
            _ => None,
        })
    }

    /// Shader-side lights; only the first [`MAX_LIGHTS`] are kept.
    pub fn light_uniforms(&self) -> Vec<LightUniform> {
        self.lights()
            .take(MAX_LIGHTS)
            .map(|(transform, light)| light.to_uniform(transform))
            .collect()
    }

    /// Checks every cross reference before the scene reaches the GPU.
    ///
    /// # Errors
    ///
    /// Dangling model, material or texture indices, models without geometry
    /// and out-of-range mesh geometry are fatal.
    pub fn validate(&self) -> Result<(), FatalError> {
        for node in &self.nodes {
            if let NodeKind::Model { model } = node.kind {
                ensure_fatal!(
                    model < self.models.len(),
                    "node '{}' refers to model {} of {}",
                    node.name,
                    model,
                    self.models.len()
                );
            }
        }

        for model in &self.models {
            ensure_fatal!(
                !model.vertices.is_empty() && !model.indices.is_empty(),
                "model '{}' has {} vertices and {} indices",
                model.name,
                model.vertices.len(),
                model.indices.len()
            );
            model.check_ranges()?;
            for mesh in &model.meshes {
                ensure_fatal!(
                    mesh.material_index < self.materials.len(),
                    "model '{}' refers to material {} of {}",
                    model.name,
                    mesh.material_index,
                    self.materials.len()
                );
            }
        }

        for material in &self.materials {
            if let Some(texture) = material.diffuse_texture {
                ensure_fatal!(
                    texture < self.textures.len(),
                    "material '{}' refers to texture {} of {}",
                    material.name,
                    texture,
                    self.textures.len()
                );
            }
        }

        let light_count = self.lights().count();
        if light_count > MAX_LIGHTS {
            debug!(
                "Scene has {} lights, only the first {} are used",
                light_count, MAX_LIGHTS
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_scene() -> Scene {
        let mut scene = Scene::new();
        let texture = scene.add_texture(TextureData::solid([255, 0, 0, 255]));
        let material = scene.add_material(MaterialData::new("red").with_texture(texture));
        let cube = scene.add_model(ModelData::cube(1.0, material));

        scene.add_node(SceneNode::new(
            "camera",
            Transform::new().with_position(Vec3::new(0.0, 0.0, 5.0)),
            NodeKind::Camera(Camera::default()),
        ));
        scene.add_node(SceneNode::new(
            "cube",
            Transform::new(),
            NodeKind::Model { model: cube },
        ));
        scene.add_node(SceneNode::new(
            "lamp",
            Transform::new().with_position(Vec3::Y),
            NodeKind::Light(Light::point(Vec3::ONE, 1.0, 10.0)),
        ));
        scene
    }

    #[test]
    fn test_queries() {
        let scene = sample_scene();

        let (camera_transform, _) = scene.active_camera().unwrap();
        assert_eq!(camera_transform.position, Vec3::new(0.0, 0.0, 5.0));
        assert_eq!(scene.lights().count(), 1);
        assert_eq!(scene.model_nodes().map(|(_, m)| m).collect::<Vec<_>>(), vec![0]);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_no_camera() {
        assert!(Scene::new().active_camera().is_none());
    }

    #[test]
    fn test_light_uniforms_capped() {
        let mut scene = Scene::new();
        for i in 0..12 {
            scene.add_node(SceneNode::new(
                format!("lamp{i}"),
                Transform::new(),
                NodeKind::Light(Light::point(Vec3::ONE, 1.0, 1.0)),
            ));
        }
        assert_eq!(scene.light_uniforms().len(), MAX_LIGHTS);
        assert!(scene.validate().is_ok());
    }

    #[test]
    fn test_validate_dangling_model() {
        let mut scene = sample_scene();
        scene.add_node(SceneNode::new(
            "ghost",
            Transform::new(),
            NodeKind::Model { model: 7 },
        ));
        let err = scene.validate().unwrap_err();
        assert!(err.message().contains("ghost"));
    }

    #[test]
    fn test_validate_rejects_empty_model() {
        let mut scene = sample_scene();
        scene.add_model(ModelData::single_mesh("hollow", Vec::new(), Vec::new(), 0));
        let err = scene.validate().unwrap_err();
        assert!(err.message().contains("hollow"));
        assert!(err.message().contains("0 vertices"));
    }

    #[test]
    fn test_validate_rejects_model_without_indices() {
        let mut scene = sample_scene();
        let mut model = ModelData::cube(1.0, 0);
        model.name = "unindexed".into();
        model.indices.clear();
        model.meshes.clear();
        scene.add_model(model);
        let err = scene.validate().unwrap_err();
        assert!(err.message().contains("0 indices"));
    }

    #[test]
    fn test_validate_dangling_material() {
        let mut scene = sample_scene();
        scene.models[0].meshes[0].material_index = 3;
        assert!(scene.validate().is_err());
    }

    #[test]
    fn test_validate_dangling_texture() {
        let mut scene = sample_scene();
        scene.materials[0].diffuse_texture = Some(9);
        let err = scene.validate().unwrap_err();
        assert!(err.message().contains("texture 9"));
    }
}
