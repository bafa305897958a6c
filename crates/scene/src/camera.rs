//! Camera lenses.
//!
//! A camera only describes its projection; where it sits and looks comes
//! from the transform of the node that carries it.

use glam::Mat4;

/// Projection type for the camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Projection {
    Perspective { fov_y: f32, near: f32, far: f32 },
    /// `height` is the visible extent in world units; width follows the aspect.
    Orthographic { height: f32, near: f32, far: f32 },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(45.0_f32.to_radians(), 0.1, 1000.0)
    }
}

impl Camera {
    pub fn perspective(fov_y: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Perspective { fov_y, near, far },
        }
    }

    pub fn orthographic(height: f32, near: f32, far: f32) -> Self {
        Self {
            projection: Projection::Orthographic { height, near, far },
        }
    }

    /// Get the projection matrix for `aspect` (with Vulkan Y-flip).
    ///
    /// A degenerate aspect (zero-height target) falls back to 1.0.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let aspect = if aspect.is_finite() && aspect > 0.0 {
            aspect
        } else {
            1.0
        };

        let mut proj = match self.projection {
            Projection::Perspective { fov_y, near, far } => {
                Mat4::perspective_rh(fov_y, aspect, near, far)
            }
            Projection::Orthographic { height, near, far } => {
                let half_h = height * 0.5;
                let half_w = half_h * aspect;
                Mat4::orthographic_rh(-half_w, half_w, -half_h, half_h, near, far)
            }
        };
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::default();
        let clip = camera
            .projection_matrix(1.0)
            .project_point3(Vec3::new(0.0, 1.0, -5.0));
        assert!(clip.y < 0.0);
    }

    #[test]
    fn test_depth_range_zero_to_one() {
        let camera = Camera::perspective(60.0_f32.to_radians(), 0.5, 50.0);
        let proj = camera.projection_matrix(16.0 / 9.0);

        let near = proj.project_point3(Vec3::new(0.0, 0.0, -0.5));
        let far = proj.project_point3(Vec3::new(0.0, 0.0, -50.0));
        assert!(near.z.abs() < 1e-5);
        assert!((far.z - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_degenerate_aspect() {
        let camera = Camera::default();
        assert_eq!(camera.projection_matrix(0.0), camera.projection_matrix(1.0));
        assert_eq!(
            camera.projection_matrix(f32::NAN),
            camera.projection_matrix(1.0)
        );
    }

    #[test]
    fn test_orthographic_width_follows_aspect() {
        let camera = Camera::orthographic(2.0, 0.1, 10.0);
        let edge = camera
            .projection_matrix(2.0)
            .project_point3(Vec3::new(2.0, 0.0, -1.0));
        assert!((edge.x - 1.0).abs() < 1e-5);
    }
}
