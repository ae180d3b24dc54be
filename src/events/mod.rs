//! Input redispatch across nesting boundaries.
//!
//! [`pointer`] defines the canonical event shape and host-event
//! normalization; [`router`] resolves the boundary chain a host event
//! travels through and delivers locally-mapped events, tracking
//! over/leave transitions per boundary.

pub mod pointer;
pub mod router;

pub use pointer::{normalize, HostEvent, Modifiers, PointerButtons, PointerEvent, PointerKind};
pub use router::{ChainLink, EventRouter, ResolvedTarget};
