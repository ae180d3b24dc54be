//! CPU-side geometry for surface tracing.
//!
//! [`TraceMesh`] holds the attributes the tracer needs — positions,
//! normals, UVs, triangle indices, and a local→world transform — plus
//! the lazily built UV spatial index. The index is owned by the
//! geometry, not by any boundary: several boundaries may query the
//! same mesh and they all share one cache.

use std::sync::Arc;

use glam::{Mat3, Mat4, Vec2, Vec3};
use parking_lot::RwLock;

use crate::error::{NestError, NestResult};
use crate::trace::UvGrid;

/// Triangle mesh queried by the surface tracer.
pub struct TraceMesh {
    positions: Vec<Vec3>,
    normals: Option<Vec<Vec3>>,
    uvs: Option<Vec<Vec2>>,
    triangles: Vec<[u32; 3]>,
    transform: Mat4,
    label: Option<String>,
    uv_index: RwLock<Option<Arc<UvGrid>>>,
}

impl TraceMesh {
    /// Create a mesh from positions and triangle indices.
    ///
    /// Indices out of range are a configuration error.
    pub fn new(positions: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> NestResult<Self> {
        let count = positions.len() as u32;
        if let Some(tri) = triangles.iter().find(|t| t.iter().any(|&i| i >= count)) {
            return Err(NestError::AttributeMismatch {
                label: "<unnamed>".to_string(),
                detail: format!("triangle {tri:?} indexes past {count} vertices"),
            });
        }
        Ok(Self {
            positions,
            normals: None,
            uvs: None,
            triangles,
            transform: Mat4::IDENTITY,
            label: None,
            uv_index: RwLock::new(None),
        })
    }

    /// Attach per-vertex normals. Must match the vertex count.
    pub fn with_normals(mut self, normals: Vec<Vec3>) -> NestResult<Self> {
        if normals.len() != self.positions.len() {
            return Err(NestError::AttributeMismatch {
                label: self.label().to_string(),
                detail: format!(
                    "{} normals for {} vertices",
                    normals.len(),
                    self.positions.len()
                ),
            });
        }
        self.normals = Some(normals);
        Ok(self)
    }

    /// Attach per-vertex UVs. Must match the vertex count.
    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> NestResult<Self> {
        if uvs.len() != self.positions.len() {
            return Err(NestError::AttributeMismatch {
                label: self.label().to_string(),
                detail: format!("{} uvs for {} vertices", uvs.len(), self.positions.len()),
            });
        }
        self.uvs = Some(uvs);
        Ok(self)
    }

    /// Set the local→world transform.
    #[must_use]
    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    /// Set a debug label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unnamed>")
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> Option<&[Vec3]> {
        self.normals.as_deref()
    }

    pub fn uvs(&self) -> Option<&[Vec2]> {
        self.uvs.as_deref()
    }

    /// UVs, or the fail-fast configuration error when the mesh has none.
    pub fn require_uvs(&self) -> NestResult<&[Vec2]> {
        self.uvs.as_deref().ok_or_else(|| NestError::MissingUv {
            label: self.label().to_string(),
        })
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    /// Triangle corner positions in local space.
    pub fn local_triangle(&self, index: usize) -> [Vec3; 3] {
        let [a, b, c] = self.triangles[index];
        [
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        ]
    }

    /// Triangle corner positions in world space.
    pub fn world_triangle(&self, index: usize) -> [Vec3; 3] {
        let [a, b, c] = self.local_triangle(index);
        [
            self.transform.transform_point3(a),
            self.transform.transform_point3(b),
            self.transform.transform_point3(c),
        ]
    }

    /// Matrix transforming local normals to world space
    /// (inverse-transpose of the transform's linear part).
    pub fn normal_matrix(&self) -> Mat3 {
        Mat3::from_mat4(self.transform).inverse().transpose()
    }

    /// The cached UV spatial index, building it on first use.
    ///
    /// Fails fast when the mesh has no UV attribute.
    pub fn uv_index(&self) -> NestResult<Arc<UvGrid>> {
        if let Some(grid) = self.uv_index.read().as_ref() {
            return Ok(Arc::clone(grid));
        }
        let grid = Arc::new(UvGrid::build(self)?);
        let mut slot = self.uv_index.write();
        // Another caller may have built it between the locks; keep the
        // existing one so shared queries stay on a single index.
        if let Some(existing) = slot.as_ref() {
            return Ok(Arc::clone(existing));
        }
        *slot = Some(Arc::clone(&grid));
        log::debug!(
            "built UV index for mesh '{}' ({} triangles)",
            self.label(),
            self.triangle_count()
        );
        Ok(grid)
    }

    /// Discard the cached UV index.
    ///
    /// Callers that mutate the UV attribute must call this before the
    /// next trace query; querying through a stale index returns results
    /// for the old parameterization. The core does not detect staleness.
    pub fn invalidate_uv_index(&self) {
        *self.uv_index.write() = None;
    }

    /// Whether the UV index is currently cached.
    pub fn has_uv_index(&self) -> bool {
        self.uv_index.read().is_some()
    }
}

impl std::fmt::Debug for TraceMesh {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceMesh")
            .field("label", &self.label)
            .field("vertices", &self.positions.len())
            .field("triangles", &self.triangles.len())
            .field("has_normals", &self.normals.is_some())
            .field("has_uvs", &self.uvs.is_some())
            .finish()
    }
}

/// Unit quad in the xy plane: positions span (0,0,0)..(1,1,0), UVs span
/// the full unit square, normals face +z. Two triangles.
pub fn unit_quad() -> TraceMesh {
    let positions = vec![
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    let uvs = vec![
        Vec2::new(0.0, 0.0),
        Vec2::new(1.0, 0.0),
        Vec2::new(1.0, 1.0),
        Vec2::new(0.0, 1.0),
    ];
    let normals = vec![Vec3::Z; 4];
    let triangles = vec![[0, 1, 2], [0, 2, 3]];
    // Attribute counts are correct by construction.
    TraceMesh::new(positions, triangles)
        .and_then(|m| m.with_uvs(uvs))
        .and_then(|m| m.with_normals(normals))
        .map(|m| m.with_label("unit_quad"))
        .expect("unit quad attributes are consistent")
}
