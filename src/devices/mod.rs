//! Device Subsystem
//!
//! Hardware device drivers and abstractions:
//! - `drivers`: PS/2 keyboard and mouse drivers, PIT timer
//! - `mouse_cursor`: cursor sprite rendering

pub mod drivers;
pub mod mouse_cursor;
