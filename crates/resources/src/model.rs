//! Models and their meshes.
//!
//! A model owns one vertex array and one index array. Meshes are index
//! ranges into that array, each drawn with one material. The demo scene is
//! built from the procedural shapes here; file formats are not parsed.

use glam::{Vec2, Vec3};
use toybox_core::{FatalError, ensure_fatal};
use toybox_rhi::vertex::Vertex;

/// A contiguous index range drawn with one material.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshData {
    /// First index, in indices (not bytes).
    pub index_offset: u32,
    pub index_count: u32,
    /// Index into the scene's material list.
    pub material_index: usize,
}

impl MeshData {
    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}

/// CPU-side geometry of one model.
#[derive(Clone, Debug, Default)]
pub struct ModelData {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub meshes: Vec<MeshData>,
}

impl ModelData {
    /// A model whose whole index array is one mesh.
    pub fn single_mesh(
        name: impl Into<String>,
        vertices: Vec<Vertex>,
        indices: Vec<u32>,
        material_index: usize,
    ) -> Self {
        let meshes = vec![MeshData {
            index_offset: 0,
            index_count: indices.len() as u32,
            material_index,
        }];

        Self {
            name: name.into(),
            vertices,
            indices,
            meshes,
        }
    }

    /// Axis-aligned cube of edge `size`, centred on the origin.
    ///
    /// Each face has its own four vertices so normals and UVs stay flat.
    pub fn cube(size: f32, material_index: usize) -> Self {
        let h = size * 0.5;
        let faces = [
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, u, v) in faces {
            push_quad(&mut vertices, &mut indices, normal * h, u * h, v * h, normal);
        }

        Self::single_mesh("cube", vertices, indices, material_index)
    }

    /// Square in the XZ plane of side `size`, facing +Y.
    pub fn plane(size: f32, material_index: usize) -> Self {
        let h = size * 0.5;
        let mut vertices = Vec::with_capacity(4);
        let mut indices = Vec::with_capacity(6);
        push_quad(
            &mut vertices,
            &mut indices,
            Vec3::ZERO,
            Vec3::X * h,
            Vec3::NEG_Z * h,
            Vec3::Y,
        );

        Self::single_mesh("plane", vertices, indices, material_index)
    }

    pub fn triangle_count(&self) -> u32 {
        self.meshes.iter().map(MeshData::triangle_count).sum()
    }

    /// Checks that every mesh range lies inside the index array and every
    /// index names an existing vertex.
    pub fn check_ranges(&self) -> Result<(), FatalError> {
        for mesh in &self.meshes {
            let end = mesh.index_offset as usize + mesh.index_count as usize;
            ensure_fatal!(
                end <= self.indices.len(),
                "model '{}': mesh range {}..{} exceeds {} indices",
                self.name,
                mesh.index_offset,
                end,
                self.indices.len()
            );
        }

        if let Some(&max) = self.indices.iter().max() {
            ensure_fatal!(
                (max as usize) < self.vertices.len(),
                "model '{}': index {} out of range for {} vertices",
                self.name,
                max,
                self.vertices.len()
            );
        }

        Ok(())
    }
}

/// Appends a quad spanning `center ± u ± v`, wound counter-clockwise seen
/// from the side `normal` points to.
fn push_quad(
    vertices: &mut Vec<Vertex>,
    indices: &mut Vec<u32>,
    center: Vec3,
    u: Vec3,
    v: Vec3,
    normal: Vec3,
) {
    let base = vertices.len() as u32;
    let corners = [
        (center - u - v, Vec2::new(0.0, 1.0)),
        (center + u - v, Vec2::new(1.0, 1.0)),
        (center + u + v, Vec2::new(1.0, 0.0)),
        (center - u + v, Vec2::new(0.0, 0.0)),
    ];

    vertices.extend(
        corners
            .into_iter()
            .map(|(position, uv)| Vertex::new(position, Vec3::ONE, uv, normal)),
    );
    indices.extend([0, 1, 2, 2, 3, 0].map(|i| base + i));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_outward_winding(model: &ModelData) {
        for tri in model.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| model.vertices[i as usize]);
            let face_normal = (b.position - a.position).cross(c.position - a.position);
            assert!(
                face_normal.dot(a.normal) > 0.0,
                "triangle {:?} is wound against its normal",
                tri
            );
        }
    }

    #[test]
    fn test_cube_counts() {
        let cube = ModelData::cube(2.0, 0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.meshes.len(), 1);
        assert!(cube.check_ranges().is_ok());
    }

    #[test]
    fn test_cube_extent() {
        let cube = ModelData::cube(2.0, 0);
        for vertex in &cube.vertices {
            assert_eq!(vertex.position.abs().max_element(), 1.0);
        }
    }

    #[test]
    fn test_cube_winding() {
        assert_outward_winding(&ModelData::cube(1.0, 0));
    }

    #[test]
    fn test_plane() {
        let plane = ModelData::plane(10.0, 3);
        assert_eq!(plane.vertices.len(), 4);
        assert_eq!(plane.meshes[0].material_index, 3);
        assert!(plane.vertices.iter().all(|v| v.position.y == 0.0));
        assert_outward_winding(&plane);
    }

    #[test]
    fn test_check_ranges_rejects_overrun() {
        let mut model = ModelData::plane(1.0, 0);
        model.meshes[0].index_count = 12;
        let err = model.check_ranges().unwrap_err();
        assert!(err.message().contains("exceeds"));
    }

    #[test]
    fn test_check_ranges_rejects_bad_index() {
        let mut model = ModelData::plane(1.0, 0);
        model.indices[0] = 4;
        assert!(model.check_ranges().is_err());
    }
}
