//! The built-in demo scene: a few textured cubes on a floor, lit by the sun,
//! a point light and a spot light.

use std::path::Path;

use glam::{Quat, Vec3};
use tracing::{info, warn};

use toybox_core::config::SceneConfig;
use toybox_resources::{MaterialData, ModelData, TextureData};
use toybox_scene::{Camera, Light, NodeKind, Scene, SceneNode, Transform};

const CHECKER_LIGHT: [u8; 4] = [230, 230, 230, 255];
const CHECKER_DARK: [u8; 4] = [40, 40, 48, 255];

/// Builds the demo scene. Textures named in `config` replace the generated
/// checkerboards in order; unreadable files are skipped with a warning.
pub fn build_scene(config: &SceneConfig) -> Scene {
    let mut scene = Scene::new();

    let mut loaded = config.textures.iter().filter_map(|path| load_texture(path));
    let crate_texture = loaded
        .next()
        .unwrap_or_else(|| TextureData::checkerboard(256, 8, CHECKER_LIGHT, CHECKER_DARK));
    let floor_texture = loaded
        .next()
        .unwrap_or_else(|| TextureData::checkerboard(512, 16, [120, 120, 120, 255], CHECKER_DARK));

    let crate_texture = scene.add_texture(crate_texture);
    let floor_texture = scene.add_texture(floor_texture);

    let crate_material = scene.add_material(MaterialData::new("crate").with_texture(crate_texture));
    let floor_material = scene.add_material(
        MaterialData::new("floor")
            .with_texture(floor_texture)
            .with_color(Vec3::new(0.8, 0.8, 0.85)),
    );
    let tint_material =
        scene.add_material(MaterialData::new("tint").with_color(Vec3::new(0.9, 0.35, 0.2)));

    let cube = scene.add_model(ModelData::cube(1.0, crate_material));
    let tinted_cube = scene.add_model(ModelData::cube(0.6, tint_material));
    let floor = scene.add_model(ModelData::plane(12.0, floor_material));

    scene.add_node(SceneNode::new(
        "camera",
        Transform::new()
            .with_position(Vec3::new(0.0, 2.5, 6.0))
            .looking_at(Vec3::new(0.0, 0.5, 0.0)),
        NodeKind::Camera(Camera::default()),
    ));
    scene.add_node(SceneNode::new(
        "floor",
        Transform::new(),
        NodeKind::Model { model: floor },
    ));
    scene.add_node(SceneNode::new(
        "crate",
        Transform::new().with_position(Vec3::new(0.0, 0.5, 0.0)),
        NodeKind::Model { model: cube },
    ));
    scene.add_node(SceneNode::new(
        "crate-left",
        Transform::new()
            .with_position(Vec3::new(-2.0, 0.3, -1.0))
            .with_rotation(Quat::from_rotation_y(0.6)),
        NodeKind::Model { model: tinted_cube },
    ));
    scene.add_node(SceneNode::new(
        "crate-right",
        Transform::new()
            .with_position(Vec3::new(2.0, 0.75, -0.5))
            .with_scale(Vec3::splat(1.5)),
        NodeKind::Model { model: cube },
    ));
    scene.add_node(SceneNode::new(
        "lamp",
        Transform::new().with_position(Vec3::new(-1.5, 2.5, 1.5)),
        NodeKind::Light(Light::point(Vec3::new(1.0, 0.85, 0.6), 3.0, 8.0)),
    ));
    scene.add_node(SceneNode::new(
        "spot",
        Transform::new()
            .with_position(Vec3::new(2.5, 4.0, 2.5))
            .looking_at(Vec3::new(2.0, 0.0, -0.5)),
        NodeKind::Light(Light::spot(
            Vec3::new(0.6, 0.7, 1.0),
            5.0,
            12.0,
            15f32.to_radians(),
            25f32.to_radians(),
        )),
    ));

    info!(
        "Demo scene: {} node(s), {} model(s), {} material(s), {} texture(s)",
        scene.nodes.len(),
        scene.models.len(),
        scene.materials.len(),
        scene.textures.len()
    );
    scene
}

fn load_texture(path: &Path) -> Option<TextureData> {
    match TextureData::load(path) {
        Ok(texture) => Some(texture),
        Err(e) => {
            warn!("Skipping texture {}: {}", path.display(), e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_demo_scene_is_valid() {
        let scene = build_scene(&SceneConfig::default());
        scene.validate().unwrap();
        assert!(scene.active_camera().is_some());
        assert_eq!(scene.lights().count(), 2);
        assert_eq!(scene.model_nodes().count(), 4);
    }

    #[test]
    fn test_missing_texture_falls_back() {
        let config = SceneConfig {
            textures: vec![PathBuf::from("does/not/exist.png")],
        };
        let scene = build_scene(&config);
        assert_eq!(scene.textures.len(), 2);
        assert_eq!(scene.textures[0].width, 256);
    }
}
