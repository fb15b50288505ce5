//! Raw controller state
//!
//! Mirrors what a browser gamepad API reports: a list of connected pads, each
//! with an index, a list of buttons (digital flag plus analog value) and a
//! list of axes. Both the host (for claiming) and the SDK (for input) read
//! controllers through [`GamepadSource`].

use serde::{Deserialize, Serialize};

/// One button as reported by the platform
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonState {
    /// Digital pressed flag
    pub pressed: bool,
    /// Analog value, `0..=1` on well-behaved platforms
    pub value: f64,
}

impl ButtonState {
    /// A fully pressed digital button
    pub fn down() -> Self {
        Self {
            pressed: true,
            value: 1.0,
        }
    }

    /// An analog-only reading
    pub fn analog(value: f64) -> Self {
        Self {
            pressed: false,
            value,
        }
    }

    /// Pressed digitally or pushed past `threshold`
    pub fn is_active(&self, threshold: f64) -> bool {
        self.pressed || self.value > threshold
    }
}

/// A connected controller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gamepad {
    /// Platform index, stable while connected
    pub index: usize,
    /// Buttons in standard mapping order
    pub buttons: Vec<ButtonState>,
    /// Axes in standard mapping order
    pub axes: Vec<f64>,
}

impl Gamepad {
    /// An idle controller at `index`
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Sets button `button`, growing the list as needed
    #[must_use]
    pub fn with_button(mut self, button: usize, state: ButtonState) -> Self {
        if self.buttons.len() <= button {
            self.buttons.resize(button + 1, ButtonState::default());
        }
        self.buttons[button] = state;
        self
    }

    /// Sets axis `axis`, growing the list as needed
    #[must_use]
    pub fn with_axis(mut self, axis: usize, value: f64) -> Self {
        if self.axes.len() <= axis {
            self.axes.resize(axis + 1, 0.0);
        }
        self.axes[axis] = value;
        self
    }

    /// Button `button`, released when absent
    pub fn button(&self, button: usize) -> ButtonState {
        self.buttons.get(button).copied().unwrap_or_default()
    }

    /// Raw value of axis `axis`, `0` when absent
    pub fn axis(&self, axis: usize) -> f64 {
        self.axes.get(axis).copied().unwrap_or(0.0)
    }

    /// Whether any button is active at `threshold`
    pub fn any_active(&self, threshold: f64) -> bool {
        self.buttons.iter().any(|b| b.is_active(threshold))
    }
}

/// Access to the platform's controllers
pub trait GamepadSource {
    /// Connected controllers, in index order
    fn gamepads(&self) -> Vec<Gamepad>;

    /// The controller at `index`, if connected
    fn gamepad(&self, index: usize) -> Option<Gamepad> {
        self.gamepads().into_iter().find(|pad| pad.index == index)
    }
}

impl GamepadSource for Vec<Gamepad> {
    fn gamepads(&self) -> Vec<Gamepad> {
        self.clone()
    }
}
