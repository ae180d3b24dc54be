//! Render boundaries and their registry.
//!
//! A boundary is one nesting point: the place where one renderer's
//! output becomes a texture inside the other renderer. It owns its
//! render target and schedule, and holds a non-owning handle to its
//! parent for invalidation propagation. Nesting of unbounded depth is
//! a chain of boundary records walked iteratively, never a recursive
//! type.
//!
//! Boundaries live in an explicit [`BoundaryRegistry`]; the composition
//! layer drives lifecycle through `create`/`destroy`/`resize` calls.

use glam::Vec2;

use crate::coords::Bounds;
use crate::error::{NestError, NestResult};
use crate::scene::{Camera, RenderTarget, Scene2d, Scene3d};
use crate::schedule::{Frameloop, RenderSchedule};

/// Non-owning, generation-checked handle to a boundary.
///
/// Using a stale handle after `destroy` fails with
/// [`NestError::BoundaryNotFound`] instead of touching a recycled slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundaryId {
    index: u32,
    generation: u32,
}

/// Which renderer owns a boundary's scene.
pub enum BoundaryContent {
    /// A 2D scene; the renderer the core dispatches events into.
    Planar(Box<dyn Scene2d>),
    /// A 3D scene viewed through a camera.
    Spatial {
        scene: Box<dyn Scene3d>,
        camera: Camera,
    },
}

/// Invalidation requests collected during a render callback.
///
/// Render callbacks may not touch the registry (it is mid-tick), so
/// they push boundary ids here; the flags are applied after the render
/// returns. This keeps `invalidate` reentrancy-safe: a boundary
/// invalidating itself or an ancestor from its own render sets a flag
/// consumed on the *next* tick.
#[derive(Debug, Default)]
pub struct InvalidationQueue {
    ids: Vec<BoundaryId>,
}

impl InvalidationQueue {
    /// Request a re-render of `id` once the current render returns.
    pub fn invalidate(&mut self, id: BoundaryId) {
        self.ids.push(id);
    }

    fn drain(&mut self) -> impl Iterator<Item = BoundaryId> + '_ {
        self.ids.drain(..)
    }
}

type ViewportCallback = Box<dyn FnMut(f32, f32)>;

/// Per-nesting-level state: target extent, schedule, content, parent.
pub struct Boundary {
    label: Option<String>,
    bounds: Bounds,
    resolution: f32,
    frameloop: Frameloop,
    schedule: RenderSchedule,
    visible: bool,
    parent: Option<BoundaryId>,
    content: BoundaryContent,
    target: Option<Box<dyn RenderTarget>>,
    viewport_subs: Vec<ViewportCallback>,
}

impl Boundary {
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn resolution(&self) -> f32 {
        self.resolution
    }

    pub fn frameloop(&self) -> Frameloop {
        self.frameloop
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn parent(&self) -> Option<BoundaryId> {
        self.parent
    }

    pub fn schedule(&self) -> &RenderSchedule {
        &self.schedule
    }

    pub fn label(&self) -> &str {
        self.label.as_deref().unwrap_or("<unnamed>")
    }

    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub(crate) fn content(&self) -> &BoundaryContent {
        &self.content
    }

    pub(crate) fn content_mut(&mut self) -> &mut BoundaryContent {
        &mut self.content
    }
}

/// Builder for creating a boundary.
pub struct BoundaryDesc {
    bounds: Bounds,
    resolution: f32,
    frameloop: Frameloop,
    fps_limit: Option<f32>,
    parent: Option<BoundaryId>,
    content: BoundaryContent,
    target: Option<Box<dyn RenderTarget>>,
    label: Option<String>,
}

impl BoundaryDesc {
    pub fn new(bounds: Bounds, content: BoundaryContent) -> Self {
        Self {
            bounds,
            resolution: 1.0,
            frameloop: Frameloop::default(),
            fps_limit: None,
            parent: None,
            content,
            target: None,
            label: None,
        }
    }

    #[must_use]
    pub fn with_resolution(mut self, resolution: f32) -> Self {
        self.resolution = resolution;
        self
    }

    #[must_use]
    pub fn with_frameloop(mut self, frameloop: Frameloop) -> Self {
        self.frameloop = frameloop;
        self
    }

    #[must_use]
    pub fn with_fps_limit(mut self, fps_limit: f32) -> Self {
        self.fps_limit = Some(fps_limit);
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent: BoundaryId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Attach the render target up front. Without one the boundary
    /// skips rendering (accumulating requests) until
    /// [`BoundaryRegistry::attach_target`] supplies it — this is how
    /// async GPU initialization gates the first frame.
    #[must_use]
    pub fn with_target(mut self, target: Box<dyn RenderTarget>) -> Self {
        self.target = Some(target);
        self
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

struct Slot {
    generation: u32,
    boundary: Option<Boundary>,
}

/// Owner of every boundary under one host.
///
/// Single-threaded: all mutation runs from the host's event-loop turn.
pub struct BoundaryRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl BoundaryRegistry {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Number of live boundaries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Create a boundary from a descriptor.
    ///
    /// A dangling parent handle is a structural wiring mistake and
    /// fails fast.
    pub fn create(&mut self, desc: BoundaryDesc) -> NestResult<BoundaryId> {
        if let Some(parent) = desc.parent {
            self.get(parent)?;
        }
        let boundary = Boundary {
            label: desc.label,
            bounds: desc.bounds,
            resolution: desc.resolution,
            frameloop: desc.frameloop,
            schedule: RenderSchedule::new(desc.fps_limit),
            visible: true,
            parent: desc.parent,
            content: desc.content,
            target: desc.target,
            viewport_subs: Vec::new(),
        };

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    boundary: None,
                });
                (self.slots.len() - 1) as u32
            }
        };
        let id = BoundaryId {
            index,
            generation: self.slots[index as usize].generation,
        };
        log::debug!(
            "created boundary {:?} '{}' ({}x{}, {:?})",
            id,
            boundary.label(),
            boundary.bounds.width,
            boundary.bounds.height,
            boundary.frameloop
        );
        self.slots[index as usize].boundary = Some(boundary);
        self.live += 1;
        Ok(id)
    }

    /// Destroy a boundary, releasing its render target synchronously.
    ///
    /// Children of the destroyed boundary lose their parent link; no
    /// render the registry can reach references the released target
    /// afterwards.
    pub fn destroy(&mut self, id: BoundaryId) -> NestResult<()> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .ok_or(NestError::BoundaryNotFound(id))?;
        let mut boundary = slot
            .boundary
            .take()
            .ok_or(NestError::BoundaryNotFound(id))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        if let Some(target) = boundary.target.as_mut() {
            target.release();
        }
        log::debug!("destroyed boundary {:?} '{}'", id, boundary.label());

        for slot in &mut self.slots {
            if let Some(child) = slot.boundary.as_mut() {
                if child.parent == Some(id) {
                    child.parent = None;
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, id: BoundaryId) -> NestResult<&Boundary> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.boundary.as_ref())
            .ok_or(NestError::BoundaryNotFound(id))
    }

    pub fn get_mut(&mut self, id: BoundaryId) -> NestResult<&mut Boundary> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.boundary.as_mut())
            .ok_or(NestError::BoundaryNotFound(id))
    }

    /// Mark a boundary as owing a frame. Never propagates by itself;
    /// upward propagation happens only when a render actually occurs.
    pub fn invalidate(&mut self, id: BoundaryId) -> NestResult<()> {
        self.get_mut(id)?.schedule.invalidate();
        Ok(())
    }

    /// Resize a boundary's target and update its conversion bounds.
    ///
    /// Always invalidates, keeps a spatial camera's aspect in step,
    /// and fires viewport subscriptions.
    pub fn resize(
        &mut self,
        id: BoundaryId,
        width: f32,
        height: f32,
        resolution: f32,
    ) -> NestResult<()> {
        let offset = self.get(id)?.bounds.offset;
        let bounds = Bounds::new(width, height)?.with_offset(offset);
        let boundary = self.get_mut(id)?;
        boundary.bounds = bounds;
        boundary.resolution = resolution;
        if let Some(target) = boundary.target.as_mut() {
            target.resize(width, height, resolution);
        }
        if let BoundaryContent::Spatial { camera, .. } = &mut boundary.content {
            camera.set_aspect(width, height);
        }
        boundary.schedule.invalidate();
        for callback in &mut boundary.viewport_subs {
            callback(width, height);
        }
        log::debug!(
            "resized boundary {:?} to {}x{} @ {}x",
            id,
            width,
            height,
            resolution
        );
        Ok(())
    }

    /// Move a boundary within its parent space without changing its extent.
    pub fn set_offset(&mut self, id: BoundaryId, offset: Vec2) -> NestResult<()> {
        let boundary = self.get_mut(id)?;
        boundary.bounds = boundary.bounds.with_offset(offset);
        boundary.schedule.invalidate();
        Ok(())
    }

    /// Suspend or resume a boundary's render tick. A hidden boundary
    /// renders in neither mode; invalidation requests accumulate and
    /// are honored once visible again.
    pub fn set_visible(&mut self, id: BoundaryId, visible: bool) -> NestResult<()> {
        self.get_mut(id)?.visible = visible;
        Ok(())
    }

    /// Supply the render target once the backing device exists.
    pub fn attach_target(&mut self, id: BoundaryId, target: Box<dyn RenderTarget>) -> NestResult<()> {
        self.get_mut(id)?.target = Some(target);
        Ok(())
    }

    /// Current target extent of a boundary.
    ///
    /// Querying with no boundary alive at all is a wiring mistake in
    /// the calling code and fails fast.
    pub fn viewport_size(&self, id: BoundaryId) -> NestResult<(f32, f32)> {
        if self.is_empty() {
            return Err(NestError::OutsideBoundary("viewport size query"));
        }
        let bounds = self.get(id)?.bounds;
        Ok((bounds.width, bounds.height))
    }

    /// Subscribe to viewport size changes of a boundary. Callbacks run
    /// synchronously inside [`resize`](Self::resize).
    pub fn subscribe_viewport(
        &mut self,
        id: BoundaryId,
        callback: impl FnMut(f32, f32) + 'static,
    ) -> NestResult<()> {
        self.get_mut(id)?.viewport_subs.push(Box::new(callback));
        Ok(())
    }

    /// Drive one boundary for one tick. Returns whether it rendered.
    ///
    /// Gates, in order: visibility, the schedule (mode + fps ceiling),
    /// target existence. After a render the schedule is cleared and the
    /// parent is invalidated so it re-renders with the new content.
    pub fn tick(&mut self, id: BoundaryId, now_ms: f64) -> NestResult<bool> {
        let boundary = self.get_mut(id)?;
        if !boundary.visible {
            return Ok(false);
        }
        if !boundary.schedule.should_render(boundary.frameloop, now_ms) {
            return Ok(false);
        }
        let Some(target) = boundary.target.as_deref_mut() else {
            // Backing target not initialized yet; the pending request
            // stays set and the first frame renders once it arrives.
            return Ok(false);
        };

        let mut queue = InvalidationQueue::default();
        match &mut boundary.content {
            BoundaryContent::Planar(scene) => scene.render(target, &mut queue),
            BoundaryContent::Spatial { scene, .. } => scene.render(target, &mut queue),
        }
        boundary.schedule.signal_frame(now_ms);
        let parent = boundary.parent;

        for queued in queue.drain() {
            if let Ok(b) = self.get_mut(queued) {
                b.schedule.invalidate();
            } else {
                log::warn!("render of {id:?} invalidated unknown boundary {queued:?}");
            }
        }
        if let Some(parent) = parent {
            if let Ok(b) = self.get_mut(parent) {
                b.schedule.invalidate();
            }
        }
        Ok(true)
    }

    /// Ids of all live boundaries, in slot order.
    pub fn ids(&self) -> Vec<BoundaryId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, s)| s.boundary.is_some())
            .map(|(index, s)| BoundaryId {
                index: index as u32,
                generation: s.generation,
            })
            .collect()
    }
}

impl Default for BoundaryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::pointer::PointerEvent;
    use crate::scene::SceneNode2d;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingScene {
        renders: Rc<Cell<u32>>,
    }

    impl Scene2d for CountingScene {
        fn hit_test(&self, _local: glam::Vec2) -> Option<SceneNode2d> {
            None
        }
        fn render(&mut self, _target: &mut dyn RenderTarget, _inv: &mut InvalidationQueue) {
            self.renders.set(self.renders.get() + 1);
        }
        fn dispatch(&mut self, _event: &PointerEvent) {}
    }

    struct NullTarget {
        released: Rc<Cell<bool>>,
    }

    impl RenderTarget for NullTarget {
        fn resize(&mut self, _w: f32, _h: f32, _r: f32) {}
        fn release(&mut self) {
            self.released.set(true);
        }
    }

    fn planar_desc(renders: &Rc<Cell<u32>>) -> BoundaryDesc {
        BoundaryDesc::new(
            Bounds::new(100.0, 100.0).unwrap(),
            BoundaryContent::Planar(Box::new(CountingScene {
                renders: Rc::clone(renders),
            })),
        )
        .with_target(Box::new(NullTarget {
            released: Rc::new(Cell::new(false)),
        }))
    }

    #[test]
    fn test_create_get_destroy() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let id = registry.create(planar_desc(&renders)).unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get(id).is_ok());
        registry.destroy(id).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get(id),
            Err(NestError::BoundaryNotFound(_))
        ));
    }

    #[test]
    fn test_stale_handle_after_slot_reuse() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let old = registry.create(planar_desc(&renders)).unwrap();
        registry.destroy(old).unwrap();
        let new = registry.create(planar_desc(&renders)).unwrap();
        // Same slot, new generation: the old handle stays dead.
        assert!(registry.get(old).is_err());
        assert!(registry.get(new).is_ok());
    }

    #[test]
    fn test_destroy_releases_target_and_detaches_children() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let released = Rc::new(Cell::new(false));
        let parent = registry
            .create(
                BoundaryDesc::new(
                    Bounds::new(10.0, 10.0).unwrap(),
                    BoundaryContent::Planar(Box::new(CountingScene {
                        renders: Rc::clone(&renders),
                    })),
                )
                .with_target(Box::new(NullTarget {
                    released: Rc::clone(&released),
                })),
            )
            .unwrap();
        let child = registry
            .create(planar_desc(&renders).with_parent(parent))
            .unwrap();

        registry.destroy(parent).unwrap();
        assert!(released.get());
        assert_eq!(registry.get(child).unwrap().parent(), None);
    }

    #[test]
    fn test_dangling_parent_rejected() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let id = registry.create(planar_desc(&renders)).unwrap();
        registry.destroy(id).unwrap();
        let result = registry.create(planar_desc(&renders).with_parent(id));
        assert!(matches!(result, Err(NestError::BoundaryNotFound(_))));
    }

    #[test]
    fn test_tick_renders_once_in_demand_mode() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let id = registry.create(planar_desc(&renders)).unwrap();

        assert!(registry.tick(id, 0.0).unwrap());
        assert_eq!(renders.get(), 1);
        // No invalidation since the first frame: nothing renders.
        assert!(!registry.tick(id, 16.0).unwrap());
        assert_eq!(renders.get(), 1);
        registry.invalidate(id).unwrap();
        assert!(registry.tick(id, 32.0).unwrap());
        assert_eq!(renders.get(), 2);
    }

    #[test]
    fn test_hidden_boundary_accumulates_requests() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let id = registry
            .create(planar_desc(&renders).with_frameloop(Frameloop::Always))
            .unwrap();
        registry.set_visible(id, false).unwrap();
        for tick in 0..10 {
            assert!(!registry.tick(id, f64::from(tick) * 16.0).unwrap());
        }
        registry.invalidate(id).unwrap();
        assert_eq!(renders.get(), 0);
        registry.set_visible(id, true).unwrap();
        assert!(registry.tick(id, 200.0).unwrap());
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn test_no_render_without_target() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let id = registry
            .create(BoundaryDesc::new(
                Bounds::new(10.0, 10.0).unwrap(),
                BoundaryContent::Planar(Box::new(CountingScene {
                    renders: Rc::clone(&renders),
                })),
            ))
            .unwrap();

        assert!(!registry.tick(id, 0.0).unwrap());
        assert_eq!(renders.get(), 0);
        // Request survived; attaching the target lets the first frame through.
        registry
            .attach_target(
                id,
                Box::new(NullTarget {
                    released: Rc::new(Cell::new(false)),
                }),
            )
            .unwrap();
        assert!(registry.tick(id, 16.0).unwrap());
        assert_eq!(renders.get(), 1);
    }

    #[test]
    fn test_resize_invalidates_and_notifies() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let id = registry.create(planar_desc(&renders)).unwrap();
        registry.tick(id, 0.0).unwrap();
        assert!(!registry.get(id).unwrap().schedule().frame_requested());

        let seen = Rc::new(Cell::new((0.0f32, 0.0f32)));
        let seen_cb = Rc::clone(&seen);
        registry
            .subscribe_viewport(id, move |w, h| seen_cb.set((w, h)))
            .unwrap();
        registry.resize(id, 300.0, 200.0, 2.0).unwrap();

        assert!(registry.get(id).unwrap().schedule().frame_requested());
        assert_eq!(seen.get(), (300.0, 200.0));
        assert_eq!(registry.viewport_size(id).unwrap(), (300.0, 200.0));
        assert_eq!(registry.get(id).unwrap().resolution(), 2.0);
    }

    #[test]
    fn test_viewport_query_outside_any_boundary() {
        let mut registry = BoundaryRegistry::new();
        let renders = Rc::new(Cell::new(0));
        let id = registry.create(planar_desc(&renders)).unwrap();
        registry.destroy(id).unwrap();
        assert!(matches!(
            registry.viewport_size(id),
            Err(NestError::OutsideBoundary(_))
        ));
    }

    #[test]
    fn test_render_callback_reinvalidates_without_recursion() {
        struct SelfInvalidating {
            id: Rc<Cell<Option<BoundaryId>>>,
            renders: Rc<Cell<u32>>,
        }
        impl Scene2d for SelfInvalidating {
            fn hit_test(&self, _local: glam::Vec2) -> Option<SceneNode2d> {
                None
            }
            fn render(&mut self, _target: &mut dyn RenderTarget, inv: &mut InvalidationQueue) {
                self.renders.set(self.renders.get() + 1);
                if let Some(id) = self.id.get() {
                    inv.invalidate(id);
                }
            }
            fn dispatch(&mut self, _event: &PointerEvent) {}
        }

        let mut registry = BoundaryRegistry::new();
        let id_cell = Rc::new(Cell::new(None));
        let renders = Rc::new(Cell::new(0));
        let id = registry
            .create(
                BoundaryDesc::new(
                    Bounds::new(10.0, 10.0).unwrap(),
                    BoundaryContent::Planar(Box::new(SelfInvalidating {
                        id: Rc::clone(&id_cell),
                        renders: Rc::clone(&renders),
                    })),
                )
                .with_target(Box::new(NullTarget {
                    released: Rc::new(Cell::new(false)),
                })),
            )
            .unwrap();
        id_cell.set(Some(id));

        // Each tick renders exactly once; the self-invalidation is
        // consumed by the following tick, not within the same one.
        assert!(registry.tick(id, 0.0).unwrap());
        assert_eq!(renders.get(), 1);
        assert!(registry.tick(id, 16.0).unwrap());
        assert_eq!(renders.get(), 2);
    }
}
