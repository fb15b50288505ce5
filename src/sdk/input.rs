//! Input normalization
//!
//! Games never look at raw controllers. They ask for an [`InputSnapshot`] of
//! a slot and get the same shape whether the slot is backed by a real
//! controller, by keyboard keys in mock mode, or by nothing at all.

use std::collections::HashSet;

use enum_map::{Enum, EnumMap};
use serde::{Deserialize, Serialize};

use crate::{constants::lobby::SLOT_COUNT, gamepad::Gamepad, slot::Slot};

/// Buttons in standard controller order
///
/// The discriminant of each button is its index in the platform's button
/// list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Enum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    /// Bottom face button
    South,
    /// Right face button
    East,
    /// Left face button
    West,
    /// Top face button
    North,
    /// Left bumper
    L1,
    /// Right bumper
    R1,
    /// Left trigger, analog
    L2,
    /// Right trigger, analog
    R2,
    /// Select / back
    Select,
    /// Start / menu
    Start,
    /// Left stick click
    L3,
    /// Right stick click
    R3,
    /// D-pad up
    DUp,
    /// D-pad down
    DDown,
    /// D-pad left
    DLeft,
    /// D-pad right
    DRight,
}

impl Button {
    /// Whether the button reports a continuous value
    pub fn is_analog(self) -> bool {
        matches!(self, Self::L2 | Self::R2)
    }

    /// Whether the button is on the d-pad
    pub fn is_dpad(self) -> bool {
        matches!(self, Self::DUp | Self::DDown | Self::DLeft | Self::DRight)
    }
}

/// Stick positions, each in `-1..=1`
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Axes {
    /// Left stick, horizontal
    pub lx: f64,
    /// Left stick, vertical (down is positive)
    pub ly: f64,
    /// Right stick, horizontal
    pub rx: f64,
    /// Right stick, vertical (down is positive)
    pub ry: f64,
}

/// One slot's input at one moment
///
/// Digital buttons read `0.0` or `1.0`; the triggers carry their analog
/// value in `0..=1`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputSnapshot {
    /// Stick positions
    pub axes: Axes,
    /// Button values
    pub buttons: EnumMap<Button, f64>,
}

impl InputSnapshot {
    /// Everything released and centred
    pub fn neutral() -> Self {
        Self::default()
    }

    /// Whether `button` is held; triggers count as soon as they move
    pub fn pressed(&self, button: Button) -> bool {
        self.buttons[button] > 0.0
    }

    /// Raw value of `button`
    pub fn value(&self, button: Button) -> f64 {
        self.buttons[button]
    }
}

/// Keys standing in for one slot's controller in mock mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyLayout {
    /// Pushes the left stick up
    pub up: &'static str,
    /// Pushes the left stick left
    pub left: &'static str,
    /// Pushes the left stick down
    pub down: &'static str,
    /// Pushes the left stick right
    pub right: &'static str,
    /// Presses [`Button::South`]
    pub south: &'static str,
    /// Presses [`Button::East`]
    pub east: &'static str,
}

/// Mock-mode layouts, by slot, as keyboard `code` values
pub const MOCK_LAYOUTS: [KeyLayout; SLOT_COUNT] = [
    KeyLayout {
        up: "KeyW",
        left: "KeyA",
        down: "KeyS",
        right: "KeyD",
        south: "Space",
        east: "ShiftLeft",
    },
    KeyLayout {
        up: "ArrowUp",
        left: "ArrowLeft",
        down: "ArrowDown",
        right: "ArrowRight",
        south: "Enter",
        east: "Slash",
    },
    KeyLayout {
        up: "KeyI",
        left: "KeyJ",
        down: "KeyK",
        right: "KeyL",
        south: "KeyN",
        east: "KeyM",
    },
    KeyLayout {
        up: "KeyT",
        left: "KeyF",
        down: "KeyG",
        right: "KeyH",
        south: "KeyR",
        east: "KeyY",
    },
];

fn clamp_axis(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

fn clamp_trigger(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Builds snapshots from controllers or from held keys
#[derive(Debug, Clone, Default)]
pub struct InputNormalizer {
    keys_down: HashSet<String>,
}

impl InputNormalizer {
    /// A normalizer with no keys held
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a key press by its `code`
    pub fn key_down(&mut self, code: &str) {
        self.keys_down.insert(code.to_owned());
    }

    /// Records a key release by its `code`
    pub fn key_up(&mut self, code: &str) {
        self.keys_down.remove(code);
    }

    /// Whether the key with `code` is held
    pub fn is_key_down(&self, code: &str) -> bool {
        self.keys_down.contains(code)
    }

    /// Snapshot of a real controller; a missing controller is neutral
    pub fn from_gamepad(pad: Option<&Gamepad>) -> InputSnapshot {
        let Some(pad) = pad else {
            return InputSnapshot::neutral();
        };

        let axes = Axes {
            lx: clamp_axis(pad.axis(0)),
            ly: clamp_axis(pad.axis(1)),
            rx: clamp_axis(pad.axis(2)),
            ry: clamp_axis(pad.axis(3)),
        };
        let buttons = EnumMap::from_fn(|button: Button| {
            let state = pad.button(button.into_usize());
            if button.is_analog() {
                clamp_trigger(state.value)
            } else if state.pressed {
                1.0
            } else {
                0.0
            }
        });
        InputSnapshot { axes, buttons }
    }

    /// Snapshot of `slot`'s keyboard layout
    ///
    /// Opposing keys cancel out. Only the left stick and the south and east
    /// buttons are mapped.
    pub fn from_keys(&self, slot: Slot) -> InputSnapshot {
        let layout = &MOCK_LAYOUTS[slot.index()];
        let key = |code: &str| if self.is_key_down(code) { 1.0 } else { 0.0 };

        let mut snapshot = InputSnapshot::neutral();
        snapshot.axes.lx = key(layout.right) - key(layout.left);
        snapshot.axes.ly = key(layout.down) - key(layout.up);
        snapshot.buttons[Button::South] = key(layout.south);
        snapshot.buttons[Button::East] = key(layout.east);
        snapshot
    }
}
