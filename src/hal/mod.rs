//! Port I/O abstraction
//!
//! Drivers never touch `in`/`out` directly; they go through [`PortBus`] so
//! the interrupt and PS/2 code can be exercised against a scripted bus in
//! unit tests. The kernel binary passes [`X86PortBus`].

use x86_64::instructions::port::Port;

/// Byte-wide I/O port access.
pub trait PortBus {
    fn read_u8(&mut self, port: u16) -> u8;
    fn write_u8(&mut self, port: u16, value: u8);
}

/// Real hardware bus.
pub struct X86PortBus;

impl PortBus for X86PortBus {
    #[inline]
    fn read_u8(&mut self, port: u16) -> u8 {
        unsafe { Port::<u8>::new(port).read() }
    }

    #[inline]
    fn write_u8(&mut self, port: u16, value: u8) {
        unsafe { Port::<u8>::new(port).write(value) }
    }
}

#[cfg(test)]
pub mod sim;
