//! Canonical pointer events and host-event normalization.
//!
//! Host platforms deliver input in several shapes (mouse, pointer,
//! touch lists, wheel). The router works on one canonical
//! [`PointerEvent`]; [`normalize`] folds the host variants into it,
//! synthesizing one event per changed touch point. Platform layers map
//! their native event types into [`HostEvent`].

use glam::Vec2;

/// Pointer id reserved for the mouse / primary pointer.
pub const PRIMARY_POINTER: u32 = 1;

/// What happened to the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerKind {
    Down,
    Up,
    Move,
    Over,
    Out,
    Enter,
    Leave,
    Cancel,
    Wheel,
}

impl PointerKind {
    /// Whether this event ends the pointer's presence (its over-state
    /// should be cleared everywhere).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Leave | Self::Cancel)
    }
}

/// Pressed-button bitfield, one bit per button index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PointerButtons(pub u32);

impl PointerButtons {
    pub const NONE: Self = Self(0);
    pub const PRIMARY: Self = Self(1);
    pub const SECONDARY: Self = Self(2);
    pub const MIDDLE: Self = Self(4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Modifier-key state carried through redispatch unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
}

/// The canonical normalized pointer event.
///
/// `position` is in the space of whoever holds the event: host space on
/// entry, local space after redispatch. Identity, pressure, buttons and
/// modifiers pass through the chain unchanged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerKind,
    pub pointer_id: u32,
    pub position: Vec2,
    pub pressure: f32,
    pub buttons: PointerButtons,
    pub modifiers: Modifiers,
    /// Scroll delta, present on `Wheel` events only.
    pub wheel_delta: Option<Vec2>,
}

impl PointerEvent {
    /// The same event at a different position (used when mapping into
    /// a boundary's local space).
    #[must_use]
    pub fn at(mut self, position: Vec2) -> Self {
        self.position = position;
        self
    }

    /// The same event with a different kind (used for synthesized
    /// over/leave transitions).
    #[must_use]
    pub fn as_kind(mut self, kind: PointerKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Phase of a touch point within a host touch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Started,
    Moved,
    Ended,
    Cancelled,
}

/// One changed touch point.
#[derive(Debug, Clone, Copy)]
pub struct TouchPoint {
    pub id: u32,
    pub position: Vec2,
    pub pressure: f32,
    pub phase: TouchPhase,
}

/// Host-side input event, in device-space client coordinates.
pub enum HostEvent {
    /// Mouse input; maps to the reserved primary pointer.
    Mouse {
        kind: PointerKind,
        position: Vec2,
        buttons: PointerButtons,
        modifiers: Modifiers,
    },
    /// Native pointer input (already per-pointer).
    Pointer {
        kind: PointerKind,
        pointer_id: u32,
        position: Vec2,
        pressure: f32,
        buttons: PointerButtons,
        modifiers: Modifiers,
    },
    /// Touch input carrying every changed touch point.
    Touch {
        touches: Vec<TouchPoint>,
        modifiers: Modifiers,
    },
    /// Wheel input at a position.
    Wheel {
        position: Vec2,
        delta: Vec2,
        modifiers: Modifiers,
    },
}

/// Normalize a host event into canonical pointer events.
///
/// Mouse and wheel produce one event on the primary pointer; touch
/// produces one per changed point. Touch ids are offset past the
/// primary pointer id so they never collide with the mouse.
pub fn normalize(event: &HostEvent) -> Vec<PointerEvent> {
    match event {
        HostEvent::Mouse {
            kind,
            position,
            buttons,
            modifiers,
        } => vec![PointerEvent {
            kind: *kind,
            pointer_id: PRIMARY_POINTER,
            position: *position,
            pressure: if buttons.0 != 0 { 0.5 } else { 0.0 },
            buttons: *buttons,
            modifiers: *modifiers,
            wheel_delta: None,
        }],
        HostEvent::Pointer {
            kind,
            pointer_id,
            position,
            pressure,
            buttons,
            modifiers,
        } => vec![PointerEvent {
            kind: *kind,
            pointer_id: *pointer_id,
            position: *position,
            pressure: *pressure,
            buttons: *buttons,
            modifiers: *modifiers,
            wheel_delta: None,
        }],
        HostEvent::Touch { touches, modifiers } => touches
            .iter()
            .map(|touch| PointerEvent {
                kind: match touch.phase {
                    TouchPhase::Started => PointerKind::Down,
                    TouchPhase::Moved => PointerKind::Move,
                    TouchPhase::Ended => PointerKind::Up,
                    TouchPhase::Cancelled => PointerKind::Cancel,
                },
                pointer_id: PRIMARY_POINTER + 1 + touch.id,
                position: touch.position,
                pressure: touch.pressure,
                buttons: PointerButtons::PRIMARY,
                modifiers: *modifiers,
                wheel_delta: None,
            })
            .collect(),
        HostEvent::Wheel {
            position,
            delta,
            modifiers,
        } => vec![PointerEvent {
            kind: PointerKind::Wheel,
            pointer_id: PRIMARY_POINTER,
            position: *position,
            pressure: 0.0,
            buttons: PointerButtons::NONE,
            modifiers: *modifiers,
            wheel_delta: Some(*delta),
        }],
    }
}
