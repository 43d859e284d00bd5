//! Mesh geometry representation.
//!
//! A GPU-agnostic triangle mesh populated by the USD loader and converted
//! to vertex buffers by the viewport.

use zview_math::{Aabb, Vec3};

/// Indexed triangle mesh in its own local space.
#[derive(Clone, Debug)]
pub struct Mesh {
    /// Vertex positions (one Vec3 per vertex)
    pub positions: Vec<Vec3>,

    /// Vertex normals (optional - computed by `ensure_normals` if missing)
    pub normals: Option<Vec<Vec3>>,

    /// Triangle indices (every 3 indices form a triangle)
    pub indices: Vec<u32>,

    /// Axis-aligned bounding box in mesh space
    pub bounds: Aabb,
}

impl Mesh {
    /// Create a new mesh from positions and indices, optionally with normals.
    ///
    /// Normals are NOT computed here; call `ensure_normals()` when needed.
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>, normals: Option<Vec<Vec3>>) -> Self {
        let bounds = Aabb::from_point_cloud(&positions);
        Self {
            positions,
            normals,
            indices,
            bounds,
        }
    }

    /// Smooth normals: each vertex gets the normalized sum of the
    /// (area-weighted) normals of the triangles touching it.
    ///
    /// Triangles referencing a missing vertex are skipped.
    pub fn compute_normals(&mut self) {
        let mut sums = vec![Vec3::ZERO; self.positions.len()];

        for face in self.indices.chunks_exact(3) {
            let corners = [face[0] as usize, face[1] as usize, face[2] as usize];
            let Some(normal) = self.face_normal(corners) else {
                continue;
            };
            for corner in corners {
                sums[corner] += normal;
            }
        }

        self.normals = Some(
            sums.into_iter()
                .map(|sum| sum.try_normalize().unwrap_or(Vec3::Y))
                .collect(),
        );
    }

    /// Unnormalized normal of one triangle, wound clockwise like USD.
    fn face_normal(&self, [a, b, c]: [usize; 3]) -> Option<Vec3> {
        let p0 = *self.positions.get(a)?;
        let p1 = *self.positions.get(b)?;
        let p2 = *self.positions.get(c)?;
        Some((p2 - p0).cross(p1 - p0))
    }

    /// Check if the mesh has normals.
    pub fn has_normals(&self) -> bool {
        self.normals.is_some()
    }

    /// Ensure the mesh has per-vertex normals, computing them if necessary.
    /// Face-varying normals (length != vertex count) are replaced.
    pub fn ensure_normals(&mut self) {
        match self.normals.as_ref().map(Vec::len) {
            Some(len) if len == self.positions.len() => {}
            Some(len) => {
                log::debug!(
                    "{} normals for {} vertices, recomputing",
                    len,
                    self.positions.len()
                );
                self.compute_normals();
            }
            None => self.compute_normals(),
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }
}
