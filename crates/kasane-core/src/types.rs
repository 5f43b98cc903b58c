use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Row/column coordinate in the physical key matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixPos {
    pub row: u8,
    pub col: u8,
}

impl MatrixPos {
    pub const fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }
}

/// Press/release edge of a physical key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Pressed,
    Released,
}

/// Raw transition delivered by the matrix scanner. Consumed exactly once.
#[derive(Debug, Clone, Copy)]
pub struct KeyEvent {
    pub pos: MatrixPos,
    pub edge: Edge,
    pub t: Instant,
}

impl KeyEvent {
    pub const fn new(pos: MatrixPos, edge: Edge, t: Instant) -> Self {
        Self { pos, edge, t }
    }
}

/// Index into the layout's ordered set of layers.
pub type LayerId = u8;

/// Modifier identity, kept apart from the plain code space so dispatch can
/// match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Modifier {
    LCtrl,
    LShift,
    LAlt,
    LGui,
    RCtrl,
    RShift,
    RAlt,
    RGui,
}

impl Modifier {
    /// Code forwarded to the output layer (HID usage ids E0..E7).
    pub const fn code(self) -> u16 {
        match self {
            Modifier::LCtrl => 0xE0,
            Modifier::LShift => 0xE1,
            Modifier::LAlt => 0xE2,
            Modifier::LGui => 0xE3,
            Modifier::RCtrl => 0xE4,
            Modifier::RShift => 0xE5,
            Modifier::RAlt => 0xE6,
            Modifier::RGui => 0xE7,
        }
    }
}

/// Logical keycode stored in a layout cell.
///
/// `Transparent` and `NoOp` are table sentinels: transparent cells defer to
/// the next lower-priority active layer, no-op cells stop the fallthrough
/// and resolve to nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keycode {
    Transparent,
    NoOp,
    /// Plain output code: base keys, chorded-modifier combinations, and the
    /// reserved special range the output layer interprets itself.
    Plain(u16),
    Modifier(Modifier),
    /// Layer active while the key is held.
    MomentaryLayer(LayerId),
    /// Replace the persisted default layer (press edge only).
    DefaultLayer(LayerId),
    /// Dual-role: momentary layer when held, plain code when tapped.
    LayerTap { layer: LayerId, tap: u16 },
    /// Dual-role: modifier when held, plain code when tapped.
    ModTap { modifier: Modifier, tap: u16 },
    /// Entry into the layout's composite-action table.
    Composite(u16),
}

impl Keycode {
    pub const fn is_transparent(self) -> bool {
        matches!(self, Keycode::Transparent)
    }

    pub const fn is_dual_role(self) -> bool {
        matches!(self, Keycode::LayerTap { .. } | Keycode::ModTap { .. })
    }
}

/// Event forwarded to the host output layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputEvent {
    KeyDown(u16),
    KeyUp(u16),
}

/// Notification for the optional feedback subsystem (audio/backlight).
/// Delivery never blocks event processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackKind {
    ModeEntered,
    ModeLeft,
    DefaultLayerChanged,
    BacklightStep,
    AudioOn,
    AudioOff,
}

/// Persisted configuration bits carried in the flags blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigFlag {
    NKeyRollover,
    Audio,
}

impl ConfigFlag {
    pub const fn bit(self) -> u8 {
        match self {
            ConfigFlag::NKeyRollover => 1 << 0,
            ConfigFlag::Audio => 1 << 1,
        }
    }
}

/// One entry in the layout's composite-action table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CompositeOp {
    /// Ordered layer rewrite, applied on the press edge: the listed layers
    /// are deactivated, the target activated, and the stack re-evaluated
    /// once, before any further lookup can observe it.
    ModeSwitch {
        deactivate: Vec<LayerId>,
        activate: Option<LayerId>,
        notify: Option<FeedbackKind>,
    },
    /// Hold a modifier for the duration of the press while signalling the
    /// feedback subsystem on the press edge.
    FeedbackHold {
        modifier: Modifier,
        notify: FeedbackKind,
    },
    /// Flip a persisted configuration bit (press edge only); the write is
    /// fire-and-forget.
    ToggleFlag {
        flag: ConfigFlag,
        notify: Option<FeedbackKind>,
    },
}
