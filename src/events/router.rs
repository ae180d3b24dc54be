//! Event resolution and redispatch through nested boundaries.
//!
//! One host event walks the boundary chain from the root inward: 2D
//! hit-test, descend through a nested sprite into a 3D scene as a
//! camera ray, raycast, hop across the hit surface's UV back into the
//! next 2D boundary, repeat. The innermost planar boundary receives the
//! locally-mapped event; every boundary that was previously "over" but
//! is no longer reached receives one synthesized leave at the missed
//! sentinel.

use std::collections::{HashMap, HashSet};

use glam::Vec2;

use crate::boundary::{BoundaryContent, BoundaryId, BoundaryRegistry};
use crate::coords::{
    host_to_viewport, local_to_ndc, local_to_uv, uv_to_local, uv_to_ndc, viewport_to_local, MISSED,
};
use crate::error::NestResult;
use crate::events::pointer::{normalize, HostEvent, PointerEvent, PointerKind};
use crate::scene::Ray;
use crate::trace::trace_world;

/// Nesting depth guard. A chain deeper than this means the boundary
/// graph has a cycle (a boundary nested inside its own output).
const MAX_DEPTH: usize = 64;

/// One boundary along a resolved chain, with the local point where the
/// event entered it (planar boundaries only; spatial hops carry a ray).
#[derive(Debug, Clone, Copy)]
pub struct ChainLink {
    pub boundary: BoundaryId,
    pub local: Option<Vec2>,
}

/// Result of resolving a host point through the boundary chain.
#[derive(Debug, Clone)]
pub struct ResolvedTarget {
    /// Every boundary the resolution passed through, outermost first.
    pub chain: Vec<ChainLink>,
    /// Innermost planar boundary and the point in its local space.
    /// `None` when the point missed the root entirely.
    pub target: Option<(BoundaryId, Vec2)>,
}

impl ResolvedTarget {
    fn empty() -> Self {
        Self {
            chain: Vec::new(),
            target: None,
        }
    }

    fn contains(&self, id: BoundaryId) -> bool {
        self.chain.iter().any(|link| link.boundary == id)
    }
}

/// What the walk carries into the next boundary.
enum Cursor {
    Point(Vec2),
    Ray(Ray),
}

/// Redispatches host input into nested boundaries.
///
/// Holds per-(pointer, boundary) over-state between events so that
/// enter/leave transitions fire even when the new event never reaches
/// the boundary that lost coverage.
pub struct EventRouter {
    root: BoundaryId,
    over: HashMap<u32, HashSet<BoundaryId>>,
}

impl EventRouter {
    pub fn new(root: BoundaryId) -> Self {
        Self {
            root,
            over: HashMap::new(),
        }
    }

    pub fn root(&self) -> BoundaryId {
        self.root
    }

    /// Resolve a host-space point to the innermost boundary it lands
    /// in, walking through every nesting hop. A miss anywhere along the
    /// chain is a normal outcome, not an error.
    pub fn resolve(
        &self,
        registry: &BoundaryRegistry,
        host_point: Vec2,
    ) -> NestResult<ResolvedTarget> {
        let root = registry.get(self.root)?;
        let point = host_to_viewport(host_point, root.bounds());
        if !root.bounds().contains_local(point) {
            return Ok(ResolvedTarget::empty());
        }

        let mut resolved = ResolvedTarget::empty();
        let mut current = self.root;
        let mut cursor = Cursor::Point(point);

        loop {
            if resolved.chain.len() >= MAX_DEPTH {
                log::warn!("boundary chain deeper than {MAX_DEPTH}, assuming a cycle; stopping");
                break;
            }
            let boundary = match registry.get(current) {
                Ok(b) => b,
                Err(_) => {
                    // A scene pointed at a destroyed boundary; treat as
                    // a miss rather than poisoning the whole event.
                    log::warn!("event resolution reached stale boundary {current:?}");
                    break;
                }
            };

            match boundary.content() {
                BoundaryContent::Planar(scene) => {
                    let Cursor::Point(local) = cursor else {
                        log::warn!("planar boundary {current:?} entered without a local point");
                        break;
                    };
                    resolved.chain.push(ChainLink {
                        boundary: current,
                        local: Some(local),
                    });
                    resolved.target = Some((current, local));

                    let Some(node) = scene.hit_test(local) else {
                        break;
                    };
                    let Some(child) = node.nested else {
                        break;
                    };
                    let child_boundary = match registry.get(child) {
                        Ok(b) => b,
                        Err(_) => {
                            log::warn!("node hosts stale nested boundary {child:?}");
                            break;
                        }
                    };
                    // Point within the hosting sprite's rectangle.
                    let rect_local = viewport_to_local(local, node.rect);
                    cursor = match child_boundary.content() {
                        BoundaryContent::Spatial { camera, .. } => {
                            Cursor::Ray(camera.ndc_ray(local_to_ndc(rect_local, node.rect)))
                        }
                        BoundaryContent::Planar(_) => {
                            // 2D-in-2D: rescale through the shared UV square.
                            Cursor::Point(uv_to_local(
                                local_to_uv(rect_local, node.rect),
                                child_boundary.bounds(),
                            ))
                        }
                    };
                    current = child;
                }
                BoundaryContent::Spatial { scene, camera } => {
                    let ray = match cursor {
                        Cursor::Ray(ray) => ray,
                        // Root spatial boundary: viewport point to ray.
                        Cursor::Point(local) => {
                            camera.ndc_ray(local_to_ndc(local, boundary.bounds()))
                        }
                    };
                    resolved.chain.push(ChainLink {
                        boundary: current,
                        local: None,
                    });

                    let hits = scene.raycast(&ray);
                    let Some(hit) = hits.first() else {
                        break;
                    };
                    let Some(child) = hit.nested else {
                        break;
                    };
                    // UV straight from the intersection when available,
                    // otherwise recovered through the surface tracer.
                    let uv = match hit.uv {
                        Some(uv) => Some(uv),
                        None => match &hit.mesh {
                            Some(mesh) => {
                                trace_world(mesh, hit.world_position, camera)?.map(|h| h.uv)
                            }
                            None => None,
                        },
                    };
                    let Some(uv) = uv else {
                        log::warn!(
                            "hit on nested surface in {current:?} carries no UV; cannot descend"
                        );
                        break;
                    };
                    cursor = match registry.get(child) {
                        Ok(b) => match b.content() {
                            BoundaryContent::Planar(_) => {
                                Cursor::Point(uv_to_local(uv, b.bounds()))
                            }
                            BoundaryContent::Spatial { camera, .. } => {
                                Cursor::Ray(camera.ndc_ray(uv_to_ndc(uv)))
                            }
                        },
                        Err(_) => break,
                    };
                    current = child;
                }
            }
        }
        Ok(resolved)
    }

    /// Route one host event: normalize, resolve, synthesize
    /// transitions, dispatch. Returns the resolution of the last
    /// canonical event for callers that want the landing point.
    pub fn route(
        &mut self,
        registry: &mut BoundaryRegistry,
        event: &HostEvent,
    ) -> NestResult<Option<ResolvedTarget>> {
        let mut last = None;
        for canonical in normalize(event) {
            let resolved = if canonical.kind.is_terminal() {
                // The pointer left the host surface; nothing is over.
                ResolvedTarget::empty()
            } else {
                self.resolve(registry, canonical.position)?
            };

            self.apply_transitions(registry, &canonical, &resolved);

            if let Some((target, local)) = resolved.target {
                dispatch_planar(registry, target, &canonical.at(local));
            }
            last = Some(resolved);
        }
        Ok(last)
    }

    /// Diff the resolved chain against the pointer's previous
    /// over-state; synthesize one leave (at the missed sentinel) per
    /// boundary that lost coverage and one over per boundary gained.
    fn apply_transitions(
        &mut self,
        registry: &mut BoundaryRegistry,
        event: &PointerEvent,
        resolved: &ResolvedTarget,
    ) {
        if event.kind == PointerKind::Wheel {
            return;
        }
        let previous = self.over.entry(event.pointer_id).or_default();

        let lost: Vec<BoundaryId> = previous
            .iter()
            .copied()
            .filter(|&id| !resolved.contains(id))
            .collect();
        for id in lost {
            previous.remove(&id);
            dispatch_planar(registry, id, &event.as_kind(PointerKind::Leave).at(MISSED));
        }

        for link in &resolved.chain {
            if previous.insert(link.boundary) {
                if let Some(local) = link.local {
                    dispatch_planar(
                        registry,
                        link.boundary,
                        &event.as_kind(PointerKind::Over).at(local),
                    );
                }
            }
        }

        if event.kind.is_terminal() {
            self.over.remove(&event.pointer_id);
        }
    }

    /// Forget a boundary's over-state, e.g. after it was destroyed.
    pub fn forget(&mut self, id: BoundaryId) {
        for set in self.over.values_mut() {
            set.remove(&id);
        }
    }
}

/// Deliver an event into a boundary's 2D scene and mark it for
/// re-render. Spatial and stale boundaries are skipped; 3D scenes have
/// no native 2D event entry point.
fn dispatch_planar(registry: &mut BoundaryRegistry, id: BoundaryId, event: &PointerEvent) {
    let Ok(boundary) = registry.get_mut(id) else {
        return;
    };
    if let BoundaryContent::Planar(scene) = boundary.content_mut() {
        scene.dispatch(event);
    }
    // Interaction implies redraw under a demand frameloop.
    let _ = registry.invalidate(id);
}
