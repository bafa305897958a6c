//! Light definitions for the scene.

use glam::Vec3;
use toybox_resources::ubo::LightUniform;

use crate::transform::Transform;

/// The single sun-like light every scene has.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Direction the light travels.
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.5, -1.0, 0.3),
            color: Vec3::ONE,
            intensity: 1.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LightKind {
    Point,
    /// Cone angles in radians, measured from the node's forward axis.
    Spot { inner_angle: f32, outer_angle: f32 },
}

/// A positioned light carried by a scene node.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub color: Vec3,
    pub intensity: f32,
    /// Attenuation radius
    pub range: f32,
}

impl Light {
    pub fn point(color: Vec3, intensity: f32, range: f32) -> Self {
        Self {
            kind: LightKind::Point,
            color,
            intensity,
            range,
        }
    }

    pub fn spot(color: Vec3, intensity: f32, range: f32, inner_angle: f32, outer_angle: f32) -> Self {
        Self {
            kind: LightKind::Spot {
                inner_angle,
                outer_angle,
            },
            color,
            intensity,
            range,
        }
    }

    /// Shader-side form of this light placed by `transform`.
    pub fn to_uniform(&self, transform: &Transform) -> LightUniform {
        match self.kind {
            LightKind::Point => {
                LightUniform::point(transform.position, self.range, self.color, self.intensity)
            }
            LightKind::Spot {
                inner_angle,
                outer_angle,
            } => LightUniform::spot(
                transform.position,
                transform.forward(),
                self.range,
                self.color,
                self.intensity,
                inner_angle,
                outer_angle,
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toybox_resources::ubo::{LIGHT_KIND_POINT, LIGHT_KIND_SPOT};

    #[test]
    fn test_point_uniform() {
        let light = Light::point(Vec3::X, 3.0, 12.0);
        let transform = Transform::new().with_position(Vec3::new(1.0, 2.0, 3.0));
        let uniform = light.to_uniform(&transform);

        assert_eq!(uniform.kind, LIGHT_KIND_POINT);
        assert_eq!(uniform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(uniform.range, 12.0);
        assert_eq!(uniform.intensity, 3.0);
    }

    #[test]
    fn test_spot_uniform_uses_node_forward() {
        let light = Light::spot(Vec3::ONE, 1.0, 10.0, 0.3, 0.5);
        let transform = Transform::new()
            .with_position(Vec3::new(0.0, 5.0, 0.0))
            .looking_at(Vec3::ZERO);
        let uniform = light.to_uniform(&transform);

        assert_eq!(uniform.kind, LIGHT_KIND_SPOT);
        assert!((uniform.direction - Vec3::NEG_Y).length() < 1e-5);
        assert_eq!(uniform.outer_angle, 0.5);
    }
}
