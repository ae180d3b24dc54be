//! Crate-wide error type.

use thiserror::Error;

use crate::boundary::BoundaryId;

/// Errors produced by the nesting core.
///
/// Configuration and lifecycle problems fail fast; resolution misses
/// (no hit, no containing triangle) are not errors and are represented
/// as empty results or the missed sentinel instead.
#[derive(Error, Debug)]
pub enum NestError {
    #[error("mesh '{label}' has no UV attribute but was queried for surface tracing")]
    MissingUv { label: String },
    #[error("bounds must have a non-zero area, got {width}x{height}")]
    ZeroAreaBounds { width: f32, height: f32 },
    #[error("mesh '{label}' attribute mismatch: {detail}")]
    AttributeMismatch { label: String, detail: String },
    #[error("boundary {0:?} does not exist or was destroyed")]
    BoundaryNotFound(BoundaryId),
    #[error("{0} must be called within a boundary")]
    OutsideBoundary(&'static str),
}

pub type NestResult<T> = Result<T, NestError>;
