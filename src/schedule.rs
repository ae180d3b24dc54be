//! Per-boundary render scheduling.
//!
//! Each boundary carries one [`RenderSchedule`] deciding whether a frame
//! is owed. Invalidation sets a flag consumed on the next tick; it is
//! idempotent, reentrancy-safe, and never dropped. Time is supplied by
//! the caller in milliseconds so hosts and tests drive the clock.

/// How a boundary decides when to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Frameloop {
    /// Render on every tick the boundary is visible.
    Always,
    /// Render only when invalidated.
    #[default]
    Demand,
}

/// Tracks whether a frame is owed and enforces an optional fps ceiling.
#[derive(Debug, Clone)]
pub struct RenderSchedule {
    frame_requested: bool,
    fps_limit: Option<f32>,
    last_frame_time: Option<f64>,
}

impl RenderSchedule {
    /// New schedule. Starts with a frame requested so the first tick
    /// always renders.
    pub fn new(fps_limit: Option<f32>) -> Self {
        Self {
            frame_requested: true,
            fps_limit,
            last_frame_time: None,
        }
    }

    /// Mark a frame as owed. Safe to call any number of times between
    /// renders, from event handlers or from a child boundary.
    pub fn invalidate(&mut self) {
        self.frame_requested = true;
    }

    /// Whether a frame is currently owed.
    pub fn frame_requested(&self) -> bool {
        self.frame_requested
    }

    pub fn fps_limit(&self) -> Option<f32> {
        self.fps_limit
    }

    pub fn set_fps_limit(&mut self, fps_limit: Option<f32>) {
        self.fps_limit = fps_limit;
    }

    /// Whether enough time has passed since the last frame to stay
    /// under the fps ceiling. Always true without a ceiling.
    fn fps_window_elapsed(&self, now_ms: f64) -> bool {
        match (self.fps_limit, self.last_frame_time) {
            (Some(limit), Some(last)) if limit > 0.0 => {
                // Small slack so a tick landing exactly on the frame
                // interval is not pushed to the next one.
                now_ms - last >= f64::from(1000.0 / limit) - 1e-3
            }
            _ => true,
        }
    }

    /// Render gate for one tick.
    ///
    /// In `Demand` mode a frame must have been requested; in `Always`
    /// mode the request flag is ignored. The fps ceiling applies in
    /// both modes.
    pub fn should_render(&self, mode: Frameloop, now_ms: f64) -> bool {
        let wanted = match mode {
            Frameloop::Always => true,
            Frameloop::Demand => self.frame_requested,
        };
        wanted && self.fps_window_elapsed(now_ms)
    }

    /// Record that a frame was rendered: clears the request flag and
    /// stamps the frame time. The caller propagates invalidation to the
    /// parent boundary after this, since a render actually occurred.
    pub fn signal_frame(&mut self, now_ms: f64) {
        self.frame_requested = false;
        self.last_frame_time = Some(now_ms);
    }
}

impl Default for RenderSchedule {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_always_owed() {
        let sched = RenderSchedule::new(None);
        assert!(sched.frame_requested());
        assert!(sched.should_render(Frameloop::Demand, 0.0));
    }

    #[test]
    fn test_demand_gate_clears_after_signal() {
        let mut sched = RenderSchedule::new(None);
        sched.signal_frame(0.0);
        assert!(!sched.should_render(Frameloop::Demand, 16.0));
        sched.invalidate();
        assert!(sched.should_render(Frameloop::Demand, 16.0));
    }

    #[test]
    fn test_always_ignores_request_flag() {
        let mut sched = RenderSchedule::new(None);
        sched.signal_frame(0.0);
        assert!(!sched.frame_requested());
        assert!(sched.should_render(Frameloop::Always, 1.0));
    }

    #[test]
    fn test_invalidate_idempotent() {
        let mut sched = RenderSchedule::new(None);
        sched.invalidate();
        sched.invalidate();
        sched.invalidate();
        assert!(sched.frame_requested());
        sched.signal_frame(0.0);
        assert!(!sched.frame_requested());
    }

    #[test]
    fn test_fps_ceiling_gates_both_modes() {
        let mut sched = RenderSchedule::new(Some(30.0));
        sched.signal_frame(0.0);
        sched.invalidate();
        // 1000/30 ≈ 33.3ms; 16ms later is too soon.
        assert!(!sched.should_render(Frameloop::Demand, 16.0));
        assert!(!sched.should_render(Frameloop::Always, 16.0));
        assert!(sched.should_render(Frameloop::Demand, 34.0));
        assert!(sched.should_render(Frameloop::Always, 34.0));
    }

    #[test]
    fn test_pending_request_survives_fps_gate() {
        let mut sched = RenderSchedule::new(Some(30.0));
        sched.signal_frame(0.0);
        sched.invalidate();
        assert!(!sched.should_render(Frameloop::Demand, 10.0));
        // Request was not dropped by the failed gate.
        assert!(sched.frame_requested());
        assert!(sched.should_render(Frameloop::Demand, 40.0));
    }
}
