//! Material definitions.

use glam::Vec3;

/// Surface parameters of a mesh.
///
/// `diffuse_texture` indexes the owning scene's texture list. Materials
/// without one are drawn with a white texel.
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub diffuse_texture: Option<usize>,
    /// Base colour (linear RGB), multiplied with the texture.
    pub color: Vec3,
    pub specular: Vec3,
    /// Roughness factor (0.0 = smooth, 1.0 = rough)
    pub roughness: f32,
}

impl MaterialData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_texture(mut self, texture: usize) -> Self {
        self.diffuse_texture = Some(texture);
        self
    }

    pub fn with_color(mut self, color: Vec3) -> Self {
        self.color = color;
        self
    }
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: String::from("default"),
            diffuse_texture: None,
            color: Vec3::ONE,
            specular: Vec3::splat(0.5),
            roughness: 0.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let material = MaterialData::new("floor")
            .with_texture(2)
            .with_color(Vec3::new(0.5, 0.5, 0.5));

        assert_eq!(material.name, "floor");
        assert_eq!(material.diffuse_texture, Some(2));
        assert_eq!(material.color, Vec3::splat(0.5));
        assert_eq!(material.roughness, 0.5);
    }
}
