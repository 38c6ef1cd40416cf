//! Input events as delivered by the toolkit
//!
//! The event loop translates backend events into [`InputEvent`]s and feeds them
//! to the seat. Coordinates are global (output) coordinates, times are
//! milliseconds from a monotonic clock, and key codes are evdev codes.

pub mod keyboard;
pub mod keymap;
pub mod pointer;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Linux evdev button codes
pub const BTN_LEFT: u32 = 0x110;
pub const BTN_RIGHT: u32 = 0x111;
pub const BTN_MIDDLE: u32 = 0x112;

bitflags! {
    /// Toolkit-level modifier flags attached to key events
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ModifierFlags: u32 {
        const SHIFT = 1 << 0;
        const LOCK = 1 << 1;
        const CONTROL = 1 << 2;
        /// Usually Alt
        const MOD1 = 1 << 3;
        const MOD2 = 1 << 4;
        const MOD3 = 1 << 5;
        /// Usually Super/Logo
        const MOD4 = 1 << 6;
        const MOD5 = 1 << 7;
    }
}

impl ModifierFlags {
    pub const ALT: ModifierFlags = ModifierFlags::MOD1;
    pub const SUPER: ModifierFlags = ModifierFlags::MOD4;
}

impl Default for ModifierFlags {
    fn default() -> Self {
        ModifierFlags::empty()
    }
}

/// Pointer button in toolkit numbering (1 = left, 2 = middle, 3 = right)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum MouseButton {
    Left,
    Middle,
    Right,
    Other(u32),
}

impl MouseButton {
    /// evdev code sent to clients
    pub fn to_evdev(self) -> u32 {
        match self {
            MouseButton::Left => BTN_LEFT,
            MouseButton::Middle => BTN_MIDDLE,
            MouseButton::Right => BTN_RIGHT,
            MouseButton::Other(n) => BTN_LEFT.saturating_add(n.saturating_sub(1)),
        }
    }
}

impl From<u32> for MouseButton {
    fn from(button: u32) -> Self {
        match button {
            1 => MouseButton::Left,
            2 => MouseButton::Middle,
            3 => MouseButton::Right,
            n => MouseButton::Other(n),
        }
    }
}

impl From<MouseButton> for u32 {
    fn from(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => 1,
            MouseButton::Middle => 2,
            MouseButton::Right => 3,
            MouseButton::Other(n) => n,
        }
    }
}

/// An input event from the toolkit event loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    /// Pointer moved to an absolute position
    Motion { time: u32, x: f64, y: f64 },

    /// Pointer button press/release at an absolute position
    Button {
        time: u32,
        x: f64,
        y: f64,
        button: MouseButton,
        pressed: bool,
    },

    /// Keyboard key press/release
    Key {
        time: u32,
        keycode: u32,
        pressed: bool,
        #[serde(default)]
        modifiers: ModifierFlags,
    },
}

impl InputEvent {
    pub fn time(&self) -> u32 {
        match self {
            InputEvent::Motion { time, .. }
            | InputEvent::Button { time, .. }
            | InputEvent::Key { time, .. } => *time,
        }
    }
}
