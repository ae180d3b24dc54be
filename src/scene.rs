//! Renderer collaborator contracts.
//!
//! The nesting core does not render anything itself. The 2D and 3D
//! renderers plug in behind [`Scene2d`] and [`Scene3d`], exposing the
//! three primitives the core orchestrates: render into a target,
//! hit-test / raycast, and (for 2D scenes) a native event entry point.

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};

use crate::boundary::{BoundaryId, InvalidationQueue};
use crate::coords::Bounds;
use crate::events::pointer::PointerEvent;
use crate::mesh::TraceMesh;

/// Render destination owned by exactly one boundary.
///
/// The core never inspects the target's contents; it only sizes it and
/// releases it when the owning boundary is destroyed.
pub trait RenderTarget {
    /// Resize the backing storage to `width`x`height` pixels at the
    /// given device-pixel-ratio-like resolution.
    fn resize(&mut self, width: f32, height: f32, resolution: f32);

    /// Release GPU/backing resources. Called exactly once, on boundary
    /// destruction; no render reaches the target afterwards.
    fn release(&mut self);
}

/// Result of hit-testing a 2D scene at a local point.
#[derive(Debug, Clone, Copy)]
pub struct SceneNode2d {
    /// Renderer-side identifier of the hit node.
    pub node_id: u64,
    /// The node's rectangle in the scene's local space.
    pub rect: Bounds,
    /// Set when the node is a sprite displaying a nested boundary's
    /// output; event resolution descends through it.
    pub nested: Option<BoundaryId>,
}

/// A 2D scene-graph renderer hosted by a boundary.
pub trait Scene2d {
    /// Hit-test the scene at a point in its local space, front-most
    /// node first. `None` is a resolution miss, not an error.
    fn hit_test(&self, local: Vec2) -> Option<SceneNode2d>;

    /// Render the scene into the boundary's target. The scene may
    /// invalidate itself or other boundaries through the queue; flags
    /// are applied after this returns, never recursively.
    fn render(&mut self, target: &mut dyn RenderTarget, invalidations: &mut InvalidationQueue);

    /// The renderer's native event entry point. Receives canonical
    /// pointer events already mapped into this scene's local space.
    fn dispatch(&mut self, event: &PointerEvent);
}

/// A ray in world space with a normalized direction.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction: direction.normalize(),
        }
    }

    /// Point at parametric distance `t` along the ray.
    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }
}

/// One raycast intersection.
#[derive(Clone)]
pub struct RayHit {
    /// Distance from the ray origin.
    pub distance: f32,
    /// Interpolated UV at the hit, when the geometry carries UVs.
    pub uv: Option<Vec2>,
    pub world_position: Vec3,
    pub world_normal: Option<Vec3>,
    /// The traced geometry that was hit, when UV recovery through the
    /// surface tracer may be needed.
    pub mesh: Option<Arc<TraceMesh>>,
    /// Set when the hit surface displays a nested boundary's output.
    pub nested: Option<BoundaryId>,
}

impl std::fmt::Debug for RayHit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RayHit")
            .field("distance", &self.distance)
            .field("uv", &self.uv)
            .field("world_position", &self.world_position)
            .field("nested", &self.nested)
            .finish()
    }
}

/// A 3D scene-graph renderer hosted by a boundary.
pub trait Scene3d {
    /// Cast a world-space ray against the scene's objects. Hits are
    /// returned nearest-first; an empty set is a resolution miss.
    fn raycast(&self, ray: &Ray) -> Vec<RayHit>;

    /// Render the scene into the boundary's target.
    fn render(&mut self, target: &mut dyn RenderTarget, invalidations: &mut InvalidationQueue);
}

/// Camera projection type.
#[derive(Debug, Clone, Copy)]
pub enum Projection {
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

impl Default for Projection {
    fn default() -> Self {
        Projection::Perspective {
            fov_y: std::f32::consts::FRAC_PI_4, // 45 degrees
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Projection {
    pub fn perspective(fov_y_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Projection::Perspective {
            fov_y: fov_y_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn orthographic(width: f32, height: f32, near: f32, far: f32) -> Self {
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        Projection::Orthographic {
            left: -half_w,
            right: half_w,
            bottom: -half_h,
            top: half_h,
            near,
            far,
        }
    }

    pub fn matrix(&self) -> Mat4 {
        match self {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(*fov_y, *aspect, *near, *far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(*left, *right, *bottom, *top, *near, *far),
        }
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective { aspect: a, .. } = self {
            *a = aspect;
        }
    }
}

/// Camera of a 3D boundary's scene.
///
/// Besides the usual view/projection matrices it provides the two
/// conversions event resolution and surface tracing run on: projecting
/// a world point into NDC, and unprojecting an NDC point into a
/// world-space ray.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    pub projection: Projection,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }
}

impl Camera {
    pub fn new(position: Vec3, target: Vec3) -> Self {
        Self {
            position,
            target,
            up: Vec3::Y,
            projection: Projection::default(),
        }
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Get the projection matrix.
    pub fn projection_matrix(&self) -> Mat4 {
        self.projection.matrix()
    }

    /// Get combined view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction.
    pub fn forward(&self) -> Vec3 {
        (self.target - self.position).normalize()
    }

    /// Update aspect ratio to match a boundary's extent.
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.projection.set_aspect(width / height);
    }

    /// Project a world-space point into normalized device coordinates.
    pub fn project_world(&self, world: Vec3) -> Vec3 {
        self.view_projection_matrix().project_point3(world)
    }

    /// Unproject a 2D NDC point into a world-space ray through the
    /// camera's frustum. Inverse of [`project_world`](Self::project_world)
    /// up to the lost depth component.
    pub fn ndc_ray(&self, ndc: Vec2) -> Ray {
        let inv = self.view_projection_matrix().inverse();
        let near = inv.project_point3(Vec3::new(ndc.x, ndc.y, 0.0));
        let far = inv.project_point3(Vec3::new(ndc.x, ndc.y, 1.0));
        Ray::new(near, far - near)
    }
}
