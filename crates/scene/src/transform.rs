//! Node placement.
//!
//! The scene is flat, so a node's transform is its world transform. Nodes
//! look down -Z with +Y up before any rotation is applied.
//!
//! ```
//! use toybox_scene::Transform;
//! use glam::Vec3;
//!
//! let camera = Transform::new()
//!     .with_position(Vec3::new(0.0, 2.0, 5.0))
//!     .looking_at(Vec3::ZERO);
//!
//! // The origin ends up in front of the camera.
//! assert!(camera.view_matrix().transform_point3(Vec3::ZERO).z < 0.0);
//! ```

use glam::{Mat4, Quat, Vec3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn new() -> Self {
        Self::IDENTITY
    }

    pub fn with_position(self, position: Vec3) -> Self {
        Self { position, ..self }
    }

    pub fn with_rotation(self, rotation: Quat) -> Self {
        Self { rotation, ..self }
    }

    pub fn with_scale(self, scale: Vec3) -> Self {
        Self { scale, ..self }
    }

    /// Rotates so [`Transform::forward`] points at `target`. A target at the
    /// node's own position leaves the rotation unchanged.
    pub fn looking_at(self, target: Vec3) -> Self {
        match (target - self.position).try_normalize() {
            Some(dir) => self.with_rotation(Quat::from_rotation_arc(Vec3::NEG_Z, dir)),
            None => self,
        }
    }

    /// Model matrix: scale, then rotate, then translate.
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// View matrix for a camera node. Scale does not affect it.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), self.rotation * Vec3::Y)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: Vec3, b: Vec3) -> bool {
        a.abs_diff_eq(b, 1e-5)
    }

    #[test]
    fn test_identity() {
        let t = Transform::default();
        assert_eq!(t, Transform::IDENTITY);
        assert_eq!(t.matrix(), Mat4::IDENTITY);
        assert_eq!(t.forward(), Vec3::NEG_Z);
    }

    #[test]
    fn test_builders_touch_one_field() {
        let t = Transform::new()
            .with_position(Vec3::new(1.0, 2.0, 3.0))
            .with_scale(Vec3::splat(2.0));

        assert_eq!(t.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(t.rotation, Quat::IDENTITY);
        assert_eq!(t.scale, Vec3::splat(2.0));
    }

    #[test]
    fn test_matrix_scales_before_translating() {
        let t = Transform::new()
            .with_position(Vec3::new(10.0, 0.0, 0.0))
            .with_scale(Vec3::splat(2.0));

        let p = t.matrix().transform_point3(Vec3::new(1.0, 1.0, 0.0));
        assert!(close(p, Vec3::new(12.0, 2.0, 0.0)));
    }

    #[test]
    fn test_looking_at() {
        let t = Transform::new()
            .with_position(Vec3::new(5.0, 0.0, 0.0))
            .looking_at(Vec3::ZERO);
        assert!(close(t.forward(), Vec3::NEG_X));

        let unchanged = Transform::new().looking_at(Vec3::ZERO);
        assert_eq!(unchanged.rotation, Quat::IDENTITY);
    }

    #[test]
    fn test_view_matrix_moves_eye_to_origin() {
        let t = Transform::new()
            .with_position(Vec3::new(0.0, 2.0, 5.0))
            .looking_at(Vec3::ZERO);
        let view = t.view_matrix();

        assert!(close(view.transform_point3(t.position), Vec3::ZERO));
        assert!(close(view.transform_point3(t.position + t.forward()), Vec3::NEG_Z));
    }

    #[test]
    fn test_view_matrix_ignores_scale() {
        let plain = Transform::new().with_position(Vec3::new(1.0, 1.0, 1.0));
        let scaled = plain.with_scale(Vec3::splat(3.0));
        assert_eq!(plain.view_matrix(), scaled.view_matrix());
    }
}
