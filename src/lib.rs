//! scene-nest - A cross-renderer nesting core for 2D and 3D scene graphs
//!
//! Lets a 2D scene-graph renderer and a 3D scene-graph renderer host
//! each other recursively: a mesh surface can display a live 2D scene
//! and a sprite can display a live 3D scene, to arbitrary depth, while
//! pointer/wheel input stays correctly mapped into each nesting level's
//! local space and each level renders only as often as needed.
//!
//! # Features
//! - Pure, invertible conversions between host, viewport, local-2D, UV,
//!   and normalized-device coordinate spaces
//! - Surface tracing between UV coordinates and mesh surfaces through a
//!   cached spatial index over the UV layout
//! - Per-boundary render scheduling with demand/always frameloops, fps
//!   ceilings, and upward invalidation propagation
//! - Host input normalization and redispatch to the innermost nested
//!   boundary, with per-boundary over/leave transition tracking
//!
//! The renderers themselves stay outside: they plug in behind the
//! [`scene::Scene2d`] and [`scene::Scene3d`] traits.

pub mod boundary;
pub mod coords;
pub mod error;
pub mod events;
pub mod mesh;
pub mod scene;
pub mod schedule;
pub mod trace;

pub use boundary::{
    Boundary, BoundaryContent, BoundaryDesc, BoundaryId, BoundaryRegistry, InvalidationQueue,
};
pub use coords::{Bounds, MISSED};
pub use error::{NestError, NestResult};
pub use events::{EventRouter, HostEvent, PointerEvent, PointerKind, ResolvedTarget};
pub use mesh::TraceMesh;
pub use scene::{Camera, Projection, Ray, RayHit, RenderTarget, Scene2d, Scene3d, SceneNode2d};
pub use schedule::{Frameloop, RenderSchedule};
pub use trace::{trace_uv, trace_world, SurfaceHit};

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
