//! Uniform and push-constant layouts shared with the shaders.
//!
//! All structures use `#[repr(C)]` with explicit padding so the Rust layout
//! matches std140, and implement `bytemuck::Pod` for byte-level uploads.
//!
//! - [`FrameUniforms`] is set 0, binding 0: camera, lights and the material
//!   parameters for the frame. One copy lives in each frame slot.
//! - [`ModelPushConstants`] carries the per-object model matrix.
//!
//! # Example
//!
//! ```
//! use toybox_resources::ubo::{FrameUniforms, LightUniform};
//! use glam::{Mat4, Vec3};
//!
//! let mut frame = FrameUniforms::default();
//! frame.set_camera(
//!     Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y),
//!     Mat4::perspective_rh(45.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
//!     Vec3::new(0.0, 2.0, 5.0),
//! );
//! frame.set_lights(&[LightUniform::point(Vec3::Y, 10.0, Vec3::ONE, 2.0)]);
//!
//! let bytes: &[u8] = bytemuck::bytes_of(&frame);
//! assert_eq!(bytes.len(), FrameUniforms::SIZE);
//! ```

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

/// Lights the shader iterates over.
pub const MAX_LIGHTS: usize = 8;

/// `LightUniform::kind` value for a point light.
pub const LIGHT_KIND_POINT: i32 = 0;
/// `LightUniform::kind` value for a spot light.
pub const LIGHT_KIND_SPOT: i32 = 1;

/// One entry of the light array.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 12   | position |
/// | 12     | 4    | kind |
/// | 16     | 12   | direction |
/// | 28     | 4    | range |
/// | 32     | 12   | color |
/// | 44     | 4    | intensity |
/// | 48     | 4    | inner_angle |
/// | 52     | 4    | outer_angle |
/// | 56     | 8    | _padding |
///
/// Total size: 64 bytes (array stride)
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LightUniform {
    pub position: Vec3,
    pub kind: i32,
    /// Normalized; unused by point lights.
    pub direction: Vec3,
    pub range: f32,
    pub color: Vec3,
    pub intensity: f32,
    /// Cone angles in radians; unused by point lights.
    pub inner_angle: f32,
    pub outer_angle: f32,
    pub _padding: [f32; 2],
}

impl LightUniform {
    pub fn point(position: Vec3, range: f32, color: Vec3, intensity: f32) -> Self {
        Self {
            position,
            kind: LIGHT_KIND_POINT,
            range,
            color,
            intensity,
            ..Self::default()
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn spot(
        position: Vec3,
        direction: Vec3,
        range: f32,
        color: Vec3,
        intensity: f32,
        inner_angle: f32,
        outer_angle: f32,
    ) -> Self {
        Self {
            position,
            kind: LIGHT_KIND_SPOT,
            // Zero-length input stays zero instead of turning into NaN.
            direction: direction.normalize_or_zero(),
            range,
            color,
            intensity,
            inner_angle,
            outer_angle,
            _padding: [0.0; 2],
        }
    }
}

/// Per-frame uniform block (set 0, binding 0).
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | view |
/// | 64     | 64   | projection |
/// | 128    | 12   | camera_position |
/// | 140    | 4    | ambient_intensity |
/// | 144    | 12   | ambient_color |
/// | 156    | 4    | directional_intensity |
/// | 160    | 12   | directional_color |
/// | 176    | 12   | directional_direction |
/// | 192    | 12   | material_color |
/// | 208    | 12   | material_specular |
/// | 220    | 4    | material_roughness |
/// | 224    | 4    | light_count |
/// | 240    | 512  | lights |
///
/// Total size: 752 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    pub ambient_intensity: f32,
    pub ambient_color: Vec3,
    pub directional_intensity: f32,
    pub directional_color: Vec3,
    pub _pad0: f32,
    /// Direction the light travels, normalized.
    pub directional_direction: Vec3,
    pub _pad1: f32,
    pub material_color: Vec3,
    pub _pad2: f32,
    pub material_specular: Vec3,
    pub material_roughness: f32,
    pub light_count: i32,
    pub _pad3: [i32; 3],
    pub lights: [LightUniform; MAX_LIGHTS],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
            ambient_intensity: 0.1,
            ambient_color: Vec3::ONE,
            directional_intensity: 1.0,
            directional_color: Vec3::ONE,
            directional_direction: Vec3::new(0.5, -1.0, 0.3).normalize(),
            material_color: Vec3::ONE,
            material_specular: Vec3::splat(0.5),
            material_roughness: 0.5,
            ..<Self as Zeroable>::zeroed()
        }
    }
}

impl FrameUniforms {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    pub fn set_camera(&mut self, view: Mat4, projection: Mat4, position: Vec3) {
        self.view = view;
        self.projection = projection;
        self.camera_position = position;
    }

    pub fn set_directional(&mut self, direction: Vec3, color: Vec3, intensity: f32) {
        self.directional_direction = direction.normalize_or_zero();
        self.directional_color = color;
        self.directional_intensity = intensity;
    }

    pub fn set_material(&mut self, color: Vec3, specular: Vec3, roughness: f32) {
        self.material_color = color;
        self.material_specular = specular;
        self.material_roughness = roughness;
    }

    /// Copies up to [`MAX_LIGHTS`] lights; the rest are ignored.
    pub fn set_lights(&mut self, lights: &[LightUniform]) {
        let count = lights.len().min(MAX_LIGHTS);
        self.lights = [LightUniform::default(); MAX_LIGHTS];
        self.lights[..count].copy_from_slice(&lights[..count]);
        self.light_count = count as i32;
    }
}

/// Per-object push constants (vertex stage).
///
/// Total size: 64 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ModelPushConstants {
    pub model: Mat4,
}

impl ModelPushConstants {
    pub const SIZE: u32 = std::mem::size_of::<Self>() as u32;

    pub fn new(model: Mat4) -> Self {
        Self { model }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{offset_of, size_of};

    #[test]
    fn test_light_uniform_layout() {
        assert_eq!(size_of::<LightUniform>(), 64);
        assert_eq!(offset_of!(LightUniform, direction), 16);
        assert_eq!(offset_of!(LightUniform, color), 32);
        assert_eq!(offset_of!(LightUniform, inner_angle), 48);
    }

    #[test]
    fn test_frame_uniforms_layout() {
        assert_eq!(FrameUniforms::SIZE, 752);
        assert_eq!(offset_of!(FrameUniforms, camera_position), 128);
        assert_eq!(offset_of!(FrameUniforms, ambient_color), 144);
        assert_eq!(offset_of!(FrameUniforms, directional_color), 160);
        assert_eq!(offset_of!(FrameUniforms, directional_direction), 176);
        assert_eq!(offset_of!(FrameUniforms, material_color), 192);
        assert_eq!(offset_of!(FrameUniforms, material_specular), 208);
        assert_eq!(offset_of!(FrameUniforms, material_roughness), 220);
        assert_eq!(offset_of!(FrameUniforms, light_count), 224);
        assert_eq!(offset_of!(FrameUniforms, lights), 240);
    }

    #[test]
    fn test_push_constants_size() {
        assert_eq!(ModelPushConstants::SIZE, 64);
    }

    #[test]
    fn test_set_lights_caps_at_max() {
        let lights: Vec<_> = (0..10)
            .map(|i| LightUniform::point(Vec3::splat(i as f32), 5.0, Vec3::ONE, 1.0))
            .collect();

        let mut frame = FrameUniforms::default();
        frame.set_lights(&lights);

        assert_eq!(frame.light_count, MAX_LIGHTS as i32);
        assert_eq!(frame.lights[7].position, Vec3::splat(7.0));
    }

    #[test]
    fn test_set_lights_clears_stale_entries() {
        let mut frame = FrameUniforms::default();
        frame.set_lights(&[LightUniform::point(Vec3::X, 1.0, Vec3::ONE, 1.0); 3]);
        frame.set_lights(&[LightUniform::point(Vec3::Y, 1.0, Vec3::ONE, 1.0)]);

        assert_eq!(frame.light_count, 1);
        assert_eq!(frame.lights[1], LightUniform::default());
    }

    #[test]
    fn test_spot_zero_direction() {
        let light = LightUniform::spot(Vec3::ZERO, Vec3::ZERO, 1.0, Vec3::ONE, 1.0, 0.2, 0.4);
        assert_eq!(light.kind, LIGHT_KIND_SPOT);
        assert_eq!(light.direction, Vec3::ZERO);
    }

    #[test]
    fn test_bytemuck_cast() {
        let frame = FrameUniforms::default();
        assert_eq!(bytemuck::bytes_of(&frame).len(), FrameUniforms::SIZE);
    }
}
