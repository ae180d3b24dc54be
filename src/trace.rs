//! Surface tracing between UV space and mesh surfaces.
//!
//! Maps a UV coordinate to the 3D positions and normals it corresponds
//! to on a mesh's surface, and the reverse through camera projection.
//! UV parameterizations are not required to be injective (seams,
//! mirrored islands), so a UV query returns a *set* of matches and the
//! caller disambiguates.
//!
//! Queries go through a uniform grid over the mesh's UV layout, built
//! once per mesh and cached on the geometry (see
//! [`TraceMesh::uv_index`](crate::mesh::TraceMesh::uv_index)).

use std::sync::Arc;

use glam::{Vec2, Vec3};

use crate::error::NestResult;
use crate::mesh::TraceMesh;
use crate::scene::{Camera, Ray, RayHit};

/// Barycentric containment slack. A point exactly on a triangle edge
/// belongs to the triangle.
const BARY_EPS: f32 = 1e-6;

/// Two hits closer than this in world space are the same surface point.
const DEDUP_EPS: f32 = 1e-5;

/// One surface match for a traced coordinate.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceHit {
    /// Index of the containing triangle.
    pub triangle: usize,
    /// Barycentric weights of the query point within the triangle.
    pub barycentric: Vec3,
    /// UV at the surface point.
    pub uv: Vec2,
    pub local_position: Vec3,
    pub world_position: Vec3,
    pub local_normal: Vec3,
    pub world_normal: Vec3,
}

/// Uniform grid over a mesh's UV-space triangles.
///
/// Cells hold the indices of triangles whose UV bounding box overlaps
/// them, answering "which triangles contain this UV point" in better
/// than linear time. Owned by the mesh geometry and shared by every
/// boundary that queries it.
pub struct UvGrid {
    min: Vec2,
    inv_cell: Vec2,
    nx: usize,
    ny: usize,
    cells: Vec<Vec<u32>>,
}

impl UvGrid {
    /// Build the grid from a mesh's UV triangles.
    ///
    /// Fails fast when the mesh has no UV attribute. Triangles with
    /// zero UV area cannot contain any query point and are skipped.
    pub fn build(mesh: &TraceMesh) -> NestResult<Self> {
        let uvs = mesh.require_uvs()?;
        let triangles = mesh.triangles();

        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        for tri in triangles {
            for &i in tri {
                let uv = uvs[i as usize];
                min = min.min(uv);
                max = max.max(uv);
            }
        }
        if triangles.is_empty() {
            min = Vec2::ZERO;
            max = Vec2::ONE;
        }
        // Pad degenerate extents so every cell has a finite size.
        let extent = (max - min).max(Vec2::splat(1e-6));

        let per_axis = (triangles.len() as f32).sqrt().ceil() as usize;
        let nx = per_axis.clamp(1, 64);
        let ny = nx;
        let mut cells = vec![Vec::new(); nx * ny];
        let inv_cell = Vec2::new(nx as f32 / extent.x, ny as f32 / extent.y);

        for (index, tri) in triangles.iter().enumerate() {
            let [a, b, c] = [uvs[tri[0] as usize], uvs[tri[1] as usize], uvs[tri[2] as usize]];
            let area2 = (b - a).perp_dot(c - a).abs();
            if area2 <= f32::EPSILON {
                log::warn!(
                    "mesh '{}': triangle {index} has zero UV area, skipping in UV index",
                    mesh.label()
                );
                continue;
            }
            let tri_min = a.min(b).min(c);
            let tri_max = a.max(b).max(c);
            let (x0, y0) = Self::cell_of(tri_min, min, inv_cell, nx, ny);
            let (x1, y1) = Self::cell_of(tri_max, min, inv_cell, nx, ny);
            for y in y0..=y1 {
                for x in x0..=x1 {
                    cells[y * nx + x].push(index as u32);
                }
            }
        }

        Ok(Self {
            min,
            inv_cell,
            nx,
            ny,
            cells,
        })
    }

    fn cell_of(uv: Vec2, min: Vec2, inv_cell: Vec2, nx: usize, ny: usize) -> (usize, usize) {
        let rel = (uv - min) * inv_cell;
        let x = (rel.x.floor().max(0.0) as usize).min(nx - 1);
        let y = (rel.y.floor().max(0.0) as usize).min(ny - 1);
        (x, y)
    }

    /// Candidate triangles for a UV point: the contents of its cell.
    /// A triangle containing the point always overlaps that cell.
    pub fn candidates(&self, uv: Vec2) -> &[u32] {
        let (x, y) = Self::cell_of(uv, self.min, self.inv_cell, self.nx, self.ny);
        &self.cells[y * self.nx + x]
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }
}

impl std::fmt::Debug for UvGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UvGrid")
            .field("nx", &self.nx)
            .field("ny", &self.ny)
            .field("min", &self.min)
            .finish()
    }
}

/// Barycentric weights of `p` within triangle `(a, b, c)` in 2D.
/// `None` when the triangle is degenerate.
fn barycentric_2d(p: Vec2, a: Vec2, b: Vec2, c: Vec2) -> Option<Vec3> {
    let v0 = b - a;
    let v1 = c - a;
    let v2 = p - a;
    let denom = v0.perp_dot(v1);
    if denom.abs() <= f32::EPSILON {
        return None;
    }
    let v = v2.perp_dot(v1) / denom;
    let w = v0.perp_dot(v2) / denom;
    Some(Vec3::new(1.0 - v - w, v, w))
}

fn bary_contains(bary: Vec3) -> bool {
    bary.x >= -BARY_EPS && bary.y >= -BARY_EPS && bary.z >= -BARY_EPS
}

/// Interpolate a full surface hit from barycentric weights within one
/// triangle. Normals fall back to the face normal when the mesh carries
/// no normal attribute.
fn hit_from_barycentric(mesh: &TraceMesh, triangle: usize, bary: Vec3) -> SurfaceHit {
    let tri = mesh.triangles()[triangle];
    let [pa, pb, pc] = mesh.local_triangle(triangle);
    let local_position = pa * bary.x + pb * bary.y + pc * bary.z;
    let world_position = mesh.transform().transform_point3(local_position);

    let local_normal = match mesh.normals() {
        Some(normals) => (normals[tri[0] as usize] * bary.x
            + normals[tri[1] as usize] * bary.y
            + normals[tri[2] as usize] * bary.z)
            .normalize_or_zero(),
        None => (pb - pa).cross(pc - pa).normalize_or_zero(),
    };
    let world_normal = (mesh.normal_matrix() * local_normal).normalize_or_zero();

    let uv = match mesh.uvs() {
        Some(uvs) => {
            uvs[tri[0] as usize] * bary.x
                + uvs[tri[1] as usize] * bary.y
                + uvs[tri[2] as usize] * bary.z
        }
        None => Vec2::ZERO,
    };

    SurfaceHit {
        triangle,
        barycentric: bary,
        uv,
        local_position,
        world_position,
        local_normal,
        world_normal,
    }
}

/// Test a single triangle for UV containment.
fn trace_triangle(mesh: &TraceMesh, uvs: &[Vec2], triangle: usize, uv: Vec2) -> Option<SurfaceHit> {
    let tri = mesh.triangles()[triangle];
    let bary = barycentric_2d(
        uv,
        uvs[tri[0] as usize],
        uvs[tri[1] as usize],
        uvs[tri[2] as usize],
    )?;
    bary_contains(bary).then(|| hit_from_barycentric(mesh, triangle, bary))
}

/// Find every surface point matching a UV coordinate.
///
/// Returns one hit per containing triangle, deduplicated so that a
/// query landing on a shared edge reports the surface point once. A
/// `hint` triangle is checked before the index and short-circuits when
/// it contains the point. An empty result is a resolution miss, not an
/// error; a mesh without UVs is a configuration error.
pub fn trace_uv(
    mesh: &TraceMesh,
    uv: Vec2,
    hint: Option<usize>,
) -> NestResult<Vec<SurfaceHit>> {
    let uvs = mesh.require_uvs()?;

    if let Some(triangle) = hint {
        if triangle < mesh.triangle_count() {
            if let Some(hit) = trace_triangle(mesh, uvs, triangle, uv) {
                return Ok(vec![hit]);
            }
        }
    }

    let grid = mesh.uv_index()?;
    let mut hits: Vec<SurfaceHit> = Vec::new();
    for &candidate in grid.candidates(uv) {
        if let Some(hit) = trace_triangle(mesh, uvs, candidate as usize, uv) {
            let duplicate = hits
                .iter()
                .any(|h| (h.world_position - hit.world_position).length() <= DEDUP_EPS);
            if !duplicate {
                hits.push(hit);
            }
        }
    }
    Ok(hits)
}

/// Möller–Trumbore ray/triangle intersection in world space.
/// Returns `(t, barycentric)` for a front- or back-facing hit.
fn intersect_triangle(ray: &Ray, a: Vec3, b: Vec3, c: Vec3) -> Option<(f32, Vec3)> {
    let e1 = b - a;
    let e2 = c - a;
    let p = ray.direction.cross(e2);
    let det = e1.dot(p);
    if det.abs() <= f32::EPSILON {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(-BARY_EPS..=1.0 + BARY_EPS).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = ray.direction.dot(q) * inv_det;
    if v < -BARY_EPS || u + v > 1.0 + BARY_EPS {
        return None;
    }
    let t = e2.dot(q) * inv_det;
    (t > BARY_EPS).then_some((t, Vec3::new(1.0 - u - v, u, v)))
}

/// Cast a world-space ray against a traced mesh.
///
/// Hits are sorted nearest-first and carry interpolated UVs when the
/// mesh has them. Intended for `Scene3d` implementations and tests; a
/// full 3D renderer will usually bring its own raycaster.
pub fn raycast_mesh(mesh: &Arc<TraceMesh>, ray: &Ray) -> Vec<RayHit> {
    let mut hits = Vec::new();
    for triangle in 0..mesh.triangle_count() {
        let [a, b, c] = mesh.world_triangle(triangle);
        if let Some((t, bary)) = intersect_triangle(ray, a, b, c) {
            let surface = hit_from_barycentric(mesh, triangle, bary);
            hits.push(RayHit {
                distance: t,
                uv: mesh.uvs().is_some().then_some(surface.uv),
                world_position: surface.world_position,
                world_normal: Some(surface.world_normal),
                mesh: Some(Arc::clone(mesh)),
                nested: None,
            });
        }
    }
    hits.sort_by(|x, y| x.distance.total_cmp(&y.distance));
    hits
}

/// Map a world-space point on a mesh's surface back to UV.
///
/// Projects the point through the camera and casts the camera ray back
/// at the mesh, so occluded parts of the surface resolve to the front-
/// most point the camera actually sees. `None` is a resolution miss.
pub fn trace_world(
    mesh: &Arc<TraceMesh>,
    world_point: Vec3,
    camera: &Camera,
) -> NestResult<Option<SurfaceHit>> {
    mesh.require_uvs()?;
    let ndc = camera.project_world(world_point);
    let ray = camera.ndc_ray(Vec2::new(ndc.x, ndc.y));
    let hits = raycast_mesh(mesh, &ray);
    let Some(nearest) = hits.first() else {
        return Ok(None);
    };
    let Some(uv) = nearest.uv else {
        return Ok(None);
    };
    // Re-trace through UV space to produce the full interpolated hit.
    Ok(trace_uv(mesh, uv, None)?.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::unit_quad;
    use glam::Mat4;

    #[test]
    fn test_quad_center_traces_to_one_match() {
        let quad = unit_quad();
        let hits = trace_uv(&quad, Vec2::new(0.5, 0.5), None).unwrap();
        // The center lies on the shared diagonal; both triangles
        // contain it but it is one surface point.
        assert_eq!(hits.len(), 1);
        let hit = hits[0];
        assert!((hit.world_position - Vec3::new(0.5, 0.5, 0.0)).length() < 1e-6);
        assert!((hit.world_normal - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_trace_outside_uv_layout_is_empty() {
        let quad = unit_quad();
        let hits = trace_uv(&quad, Vec2::new(2.0, 2.0), None).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_trace_respects_transform() {
        let quad = unit_quad().with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 3.0)));
        let hits = trace_uv(&quad, Vec2::new(0.25, 0.25), None).unwrap();
        assert_eq!(hits.len(), 1);
        assert!((hits[0].world_position - Vec3::new(0.25, 0.25, 3.0)).length() < 1e-6);
        assert!((hits[0].local_position - Vec3::new(0.25, 0.25, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_hint_short_circuits() {
        let quad = unit_quad();
        // UV (0.75, 0.25) lies in triangle 0 only.
        let hits = trace_uv(&quad, Vec2::new(0.75, 0.25), Some(0)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].triangle, 0);
        // A hint that does not contain the point falls back to the index.
        let hits = trace_uv(&quad, Vec2::new(0.75, 0.25), Some(1)).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].triangle, 0);
    }

    #[test]
    fn test_non_injective_uvs_yield_multiple_matches() {
        // Two stacked quads sharing one UV layout: every UV point maps
        // to two surface positions.
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.0, 1.0, 1.0),
        ];
        let uvs = vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let mesh = TraceMesh::new(positions, vec![[0, 1, 2], [0, 2, 3], [4, 5, 6], [4, 6, 7]])
            .unwrap()
            .with_uvs(uvs)
            .unwrap();
        let hits = trace_uv(&mesh, Vec2::new(0.25, 0.25), None).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_missing_uvs_is_configuration_error() {
        let mesh = TraceMesh::new(vec![Vec3::ZERO, Vec3::X, Vec3::Y], vec![[0, 1, 2]]).unwrap();
        assert!(trace_uv(&mesh, Vec2::new(0.1, 0.1), None).is_err());
    }

    #[test]
    fn test_raycast_quad() {
        let quad = Arc::new(unit_quad());
        let ray = Ray::new(Vec3::new(0.5, 0.5, 5.0), Vec3::new(0.0, 0.0, -1.0));
        let hits = raycast_mesh(&quad, &ray);
        assert!(!hits.is_empty());
        let hit = &hits[0];
        assert!((hit.distance - 5.0).abs() < 1e-4);
        assert!((hit.uv.unwrap() - Vec2::new(0.5, 0.5)).length() < 1e-5);
    }

    #[test]
    fn test_raycast_miss_is_empty() {
        let quad = Arc::new(unit_quad());
        let ray = Ray::new(Vec3::new(5.0, 5.0, 5.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(raycast_mesh(&quad, &ray).is_empty());
    }

    #[test]
    fn test_trace_world_round_trips_uv() {
        let quad = Arc::new(unit_quad());
        let camera = Camera::new(Vec3::new(0.5, 0.5, 5.0), Vec3::new(0.5, 0.5, 0.0));
        let hit = trace_world(&quad, Vec3::new(0.25, 0.75, 0.0), &camera)
            .unwrap()
            .unwrap();
        assert!((hit.uv - Vec2::new(0.25, 0.75)).length() < 1e-4);
        assert!((hit.world_position - Vec3::new(0.25, 0.75, 0.0)).length() < 1e-4);
    }

    #[test]
    fn test_grid_scales_with_triangle_count() {
        let quad = unit_quad();
        let grid = quad.uv_index().unwrap();
        assert!(grid.cell_count() >= 1);
        assert!(!grid.candidates(Vec2::new(0.5, 0.5)).is_empty());
    }
}
