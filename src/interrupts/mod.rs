//! # Interrupt Handling Module
//!
//! Interrupt infrastructure for the kernel:
//!
//! - **IDT**: raw 256-entry Interrupt Descriptor Table with gate installer
//! - **PIC**: 8259 pair remapping, line masking and EOI policy
//! - **IRQ**: per-line handler registry and common dispatch
//! - **Exceptions**: terminal crash-visualization policy
//!
//! ## Interrupt Vector Layout
//!
//! | Vector | Type                   | Source                     |
//! |--------|------------------------|----------------------------|
//! | 0-31   | CPU Exceptions         | fatal, paint and halt      |
//! | 32     | Timer (IRQ0)           | PIT channel 0              |
//! | 33     | Keyboard (IRQ1)        | PS/2 port 0x60             |
//! | 44     | Mouse (IRQ12)          | PS/2 aux device            |
//!
//! ## Ordering contract
//!
//! The IDT must be installed (all gates zeroed, then the fixed vectors
//! written) and the PICs remapped before interrupts are enabled globally.
//! An early interrupt through a half-written gate is a triple fault, so
//! there is no error path here: this is boot-time, single-shot code.

pub mod exceptions;
pub mod idt;
pub mod irq;
pub mod pic;
