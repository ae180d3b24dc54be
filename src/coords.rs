//! Coordinate space conversions.
//!
//! Pure, invertible mappings between the coordinate spaces a nested
//! scene travels through:
//!
//! - *host*: pixels relative to the host page/viewport
//! - *viewport*: pixels relative to a root render surface
//! - *local 2D*: pixels inside one 2D container (origin top-left, y down)
//! - *UV*: normalized 0..1 texture coordinates (origin bottom-left, y up)
//! - *NDC*: -1..1 clip-space coordinates of a 3D camera
//!
//! Every function here is a bijection with its inverse: applying a
//! mapping and then its inverse returns the original value within
//! floating-point tolerance. Mappings are parameterized by [`Bounds`]
//! and own no state. Out-of-range inputs are not errors; they map
//! outside the 0..1 / -1..1 range and callers read that as "outside
//! the surface".

use glam::Vec2;

use crate::error::{NestError, NestResult};

/// Well-known out-of-range point representing "no hit".
///
/// A resolution that finds nothing still flows through the event
/// pipeline carrying this sentinel so downstream consumers observe
/// pointer-leave correctly.
pub const MISSED: Vec2 = Vec2::new(-1.0e7, -1.0e7);

/// Check whether a point is the [`MISSED`] sentinel.
pub fn is_missed(point: Vec2) -> bool {
    point.x <= MISSED.x && point.y <= MISSED.y
}

/// Rectangular extent with an optional offset, in pixels.
///
/// Parameterizes every conversion in this module: the extent defines
/// the local-2D ↔ UV scaling and the offset places the rectangle
/// inside its parent space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub width: f32,
    pub height: f32,
    pub offset: Vec2,
}

impl Bounds {
    /// Create bounds with the given extent and no offset.
    ///
    /// Zero-area bounds are a configuration error: a conversion
    /// through them could not be inverted.
    pub fn new(width: f32, height: f32) -> NestResult<Self> {
        if width <= 0.0 || height <= 0.0 || !width.is_finite() || !height.is_finite() {
            return Err(NestError::ZeroAreaBounds { width, height });
        }
        Ok(Self {
            width,
            height,
            offset: Vec2::ZERO,
        })
    }

    /// Set the offset of this rectangle within its parent space.
    #[must_use]
    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    /// Extent as a vector.
    pub fn extent(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Whether a local-2D point lies inside the extent.
    pub fn contains_local(&self, point: Vec2) -> bool {
        point.x >= 0.0 && point.y >= 0.0 && point.x <= self.width && point.y <= self.height
    }
}

/// Host pixels → viewport pixels, given the viewport's placement on the host.
pub fn host_to_viewport(point: Vec2, viewport: Bounds) -> Vec2 {
    point - viewport.offset
}

/// Viewport pixels → host pixels.
pub fn viewport_to_host(point: Vec2, viewport: Bounds) -> Vec2 {
    point + viewport.offset
}

/// Viewport pixels → pixels local to a container placed at `bounds.offset`.
pub fn viewport_to_local(point: Vec2, bounds: Bounds) -> Vec2 {
    point - bounds.offset
}

/// Local container pixels → viewport pixels.
pub fn local_to_viewport(point: Vec2, bounds: Bounds) -> Vec2 {
    point + bounds.offset
}

/// Local-2D pixels → UV.
///
/// Local 2D has its origin at the top-left with y growing down; UV has
/// its origin at the bottom-left with y growing up, so the y axis flips.
pub fn local_to_uv(point: Vec2, bounds: Bounds) -> Vec2 {
    Vec2::new(point.x / bounds.width, 1.0 - point.y / bounds.height)
}

/// UV → local-2D pixels.
pub fn uv_to_local(uv: Vec2, bounds: Bounds) -> Vec2 {
    Vec2::new(uv.x * bounds.width, (1.0 - uv.y) * bounds.height)
}

/// UV (0..1) → normalized device coordinates (-1..1).
pub fn uv_to_ndc(uv: Vec2) -> Vec2 {
    uv * 2.0 - Vec2::ONE
}

/// Normalized device coordinates → UV.
pub fn ndc_to_uv(ndc: Vec2) -> Vec2 {
    (ndc + Vec2::ONE) * 0.5
}

/// Local-2D pixels → NDC. Composition of [`local_to_uv`] and
/// [`uv_to_ndc`]; used on every event that crosses into a 3D scene.
pub fn local_to_ndc(point: Vec2, bounds: Bounds) -> Vec2 {
    uv_to_ndc(local_to_uv(point, bounds))
}

/// NDC → local-2D pixels.
pub fn ndc_to_local(ndc: Vec2, bounds: Bounds) -> Vec2 {
    uv_to_local(ndc_to_uv(ndc), bounds)
}

/// Whether a UV coordinate lies inside the unit square.
pub fn uv_in_range(uv: Vec2) -> bool {
    uv.x >= 0.0 && uv.x <= 1.0 && uv.y >= 0.0 && uv.y <= 1.0
}

/// Whether an NDC coordinate lies inside the -1..1 square.
pub fn ndc_in_range(ndc: Vec2) -> bool {
    ndc.x >= -1.0 && ndc.x <= 1.0 && ndc.y >= -1.0 && ndc.y <= 1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Vec2, b: Vec2, extent: Vec2) {
        let tol = extent.max_element().max(1.0) * 1e-6;
        assert!(
            (a - b).abs().max_element() <= tol,
            "expected {b:?}, got {a:?} (tol {tol})"
        );
    }

    // Cheap deterministic pseudo-random stream for round-trip coverage.
    fn lcg(state: &mut u64) -> f32 {
        *state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((*state >> 33) as f32) / ((1u64 << 31) as f32)
    }

    #[test]
    fn test_zero_area_bounds_rejected() {
        assert!(Bounds::new(0.0, 100.0).is_err());
        assert!(Bounds::new(100.0, 0.0).is_err());
        assert!(Bounds::new(-5.0, 5.0).is_err());
        assert!(Bounds::new(f32::NAN, 5.0).is_err());
        assert!(Bounds::new(1.0, 1.0).is_ok());
    }

    #[test]
    fn test_round_trips_random_bounds() {
        let mut state = 0x5eed;
        for _ in 0..200 {
            let bounds = Bounds::new(lcg(&mut state) * 2000.0 + 1.0, lcg(&mut state) * 2000.0 + 1.0)
                .unwrap()
                .with_offset(Vec2::new(
                    lcg(&mut state) * 500.0 - 250.0,
                    lcg(&mut state) * 500.0 - 250.0,
                ));
            let p = Vec2::new(
                lcg(&mut state) * bounds.width * 1.5 - bounds.width * 0.25,
                lcg(&mut state) * bounds.height * 1.5 - bounds.height * 0.25,
            );
            let extent = bounds.extent();

            assert_close(viewport_to_host(host_to_viewport(p, bounds), bounds), p, extent);
            assert_close(local_to_viewport(viewport_to_local(p, bounds), bounds), p, extent);
            assert_close(uv_to_local(local_to_uv(p, bounds), bounds), p, extent);
            assert_close(ndc_to_local(local_to_ndc(p, bounds), bounds), p, extent);

            let uv = Vec2::new(lcg(&mut state) * 1.5 - 0.25, lcg(&mut state) * 1.5 - 0.25);
            assert_close(ndc_to_uv(uv_to_ndc(uv)), uv, Vec2::ONE);
            assert_close(local_to_uv(uv_to_local(uv, bounds), bounds), uv, Vec2::ONE);
        }
    }

    #[test]
    fn test_local_to_ndc_corners() {
        let bounds = Bounds::new(200.0, 100.0).unwrap();
        // Top-left in local 2D is (-1, 1) in NDC: y flips.
        assert_close(local_to_ndc(Vec2::ZERO, bounds), Vec2::new(-1.0, 1.0), Vec2::ONE);
        assert_close(
            local_to_ndc(Vec2::new(200.0, 100.0), bounds),
            Vec2::new(1.0, -1.0),
            Vec2::ONE,
        );
        assert_close(
            local_to_ndc(Vec2::new(100.0, 50.0), bounds),
            Vec2::ZERO,
            Vec2::ONE,
        );
    }

    #[test]
    fn test_out_of_bounds_maps_out_of_range() {
        let bounds = Bounds::new(100.0, 100.0).unwrap();
        let uv = local_to_uv(Vec2::new(-10.0, 150.0), bounds);
        assert!(!uv_in_range(uv));
        // No error, just an out-of-range value.
        assert!(!ndc_in_range(local_to_ndc(Vec2::new(500.0, 0.0), bounds)));
    }

    #[test]
    fn test_missed_sentinel() {
        assert!(is_missed(MISSED));
        assert!(!is_missed(Vec2::ZERO));
        let bounds = Bounds::new(64.0, 64.0).unwrap();
        assert!(!bounds.contains_local(MISSED));
    }
}
