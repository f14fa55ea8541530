//! Framebuffer support: color values and the late-bound device target.

pub mod color;
pub mod target;

pub use color::Color;
pub use target::FramebufferTarget;
