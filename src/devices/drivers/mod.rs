//! Device Drivers
//!
//! This module contains drivers for the fixed hardware this kernel talks to:
//! - PS/2 Keyboard (IRQ1)
//! - PS/2 Mouse (IRQ12)
//! - PIT timer (IRQ0)

pub mod pit;
pub mod ps2_keyboard;
pub mod ps2_mouse;

pub use pit::{TimerDriver, TimerState};
pub use ps2_keyboard::{KeyQueue, KeyboardDriver};
pub use ps2_mouse::{MouseDriver, MouseState};
