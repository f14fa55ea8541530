//! # layeros
//!
//! Core of a small framebuffer-compositing kernel: interrupt plumbing
//! (IDT, 8259 PIC, IRQ dispatch), PS/2 keyboard and mouse drivers, and a
//! layered back-buffer compositor with static-plane caching.
//!
//! Everything in this crate is hardware-agnostic: port I/O goes through
//! [`hal::PortBus`], so the same drivers run against the real I/O bus in
//! the kernel binary and against a scripted bus in unit tests. The binary
//! target (`src/main.rs`) supplies the boot entry point, the interrupt
//! trampolines and the demo screen.
//!
//! ## Initialization order
//!
//! | Step | Component            | Why                                      |
//! |------|----------------------|------------------------------------------|
//! | 1    | IDT install          | gates must exist before any interrupt    |
//! | 2    | PIC remap + mask     | IRQs 0-15 moved to vectors 32-47         |
//! | 3    | driver install       | each driver unmasks its own line         |
//! | 4    | `sti`                | only after every fixed vector is wired   |

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod allocators;
pub mod compositor;
pub mod devices;
pub mod framebuffer;
pub mod hal;
pub mod interrupts;
