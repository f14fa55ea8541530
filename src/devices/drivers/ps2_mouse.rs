//! # PS/2 Mouse Driver
//!
//! IRQ12 handler decoding 3-byte PS/2 packets into an absolute, clamped
//! cursor position.
//!
//! ## Packet format
//!
//! Standard PS/2 mice send 3-byte packets, one byte per interrupt:
//! - Byte 0: status (buttons, sign bits, overflow bits; bit 3 always set)
//! - Byte 1: X movement
//! - Byte 2: Y movement
//!
//! Movement is 9-bit two's complement: the magnitude byte plus a sign bit
//! in the status byte. The device's Y axis grows upward, the screen's grows
//! downward, so Y is applied inverted.
//!
//! ## Install sequence
//!
//! The controller bring-up follows the PS/2 protocol step by step: enable
//! the auxiliary device, set the IRQ12 bit in the controller configuration
//! byte, restore the default sampling profile, enable streaming. Every port
//! access waits for the controller with a bounded poll; an unresponsive
//! controller fails the install instead of hanging boot.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicI32, AtomicU32, Ordering};

use crate::hal::PortBus;
use crate::interrupts::irq::{InterruptHandler, IrqDispatcher};

pub const MOUSE_IRQ: u8 = 12;

const DATA_PORT: u16 = 0x60;
const STATUS_PORT: u16 = 0x64;

const CMD_ENABLE_AUX: u8 = 0xA8;
const CMD_READ_CONFIG: u8 = 0x20;
const CMD_WRITE_CONFIG: u8 = 0x60;
const CMD_AUX_PREFIX: u8 = 0xD4;
const MOUSE_SET_DEFAULTS: u8 = 0xF6;
const MOUSE_ENABLE_STREAMING: u8 = 0xF4;
const MOUSE_ACK: u8 = 0xFA;

const POLL_BUDGET: u32 = 100_000;

// =============================================================================
// PUBLISHED STATE
// =============================================================================

/// Position and counters published by the IRQ handler, read by the main
/// loop. Plain atomics: each field is independently consistent, which is
/// all a cursor needs.
pub struct MouseState {
    x: AtomicI32,
    y: AtomicI32,
    width: AtomicI32,
    height: AtomicI32,
    interrupts: AtomicU32,
}

impl MouseState {
    pub const fn new() -> Self {
        Self {
            x: AtomicI32::new(0),
            y: AtomicI32::new(0),
            width: AtomicI32::new(0),
            height: AtomicI32::new(0),
            interrupts: AtomicU32::new(0),
        }
    }

    /// Screen bounds used for clamping; position is clamped on every
    /// packet, so shrinking the bounds takes effect on the next movement.
    pub fn set_bounds(&self, width: i32, height: i32) {
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
    }

    pub fn set_position(&self, x: i32, y: i32) {
        self.x.store(x, Ordering::Relaxed);
        self.y.store(y, Ordering::Relaxed);
    }

    pub fn position(&self) -> (i32, i32) {
        (self.x.load(Ordering::Relaxed), self.y.load(Ordering::Relaxed))
    }

    pub fn interrupt_count(&self) -> u32 {
        self.interrupts.load(Ordering::Relaxed)
    }

    fn apply_delta(&self, dx: i32, dy: i32) {
        let width = self.width.load(Ordering::Relaxed);
        let height = self.height.load(Ordering::Relaxed);

        let x = (self.x.load(Ordering::Relaxed) + dx).clamp(0, width - 1);
        // Device Y grows upward, screen Y grows downward.
        let y = (self.y.load(Ordering::Relaxed) - dy).clamp(0, height - 1);

        self.x.store(x, Ordering::Relaxed);
        self.y.store(y, Ordering::Relaxed);
    }
}

// =============================================================================
// IRQ HANDLER
// =============================================================================

/// One byte per interrupt, three per packet.
pub struct MouseDriver<'a> {
    state: &'a MouseState,
    cycle: u8,
    packet: [u8; 3],
}

impl<'a> MouseDriver<'a> {
    pub fn new(state: &'a MouseState) -> Self {
        Self {
            state,
            cycle: 0,
            packet: [0; 3],
        }
    }

    fn decode_packet(&self) {
        let status = self.packet[0];
        let mut dx = self.packet[1] as i32;
        let mut dy = self.packet[2] as i32;

        // Sign bits from the status byte complete the 9-bit deltas.
        if status & 0x10 != 0 {
            dx -= 256;
        }
        if status & 0x20 != 0 {
            dy -= 256;
        }

        self.state.apply_delta(dx, dy);
    }
}

impl InterruptHandler for MouseDriver<'_> {
    fn handle(&mut self, bus: &mut dyn PortBus) {
        self.state.interrupts.fetch_add(1, Ordering::Relaxed);
        let byte = bus.read_u8(DATA_PORT);

        // The first byte of a packet must have bit 3 set; anything else
        // means the stream is out of sync, so drop it and re-align.
        if self.cycle == 0 && byte & 0x08 == 0 {
            return;
        }

        self.packet[self.cycle as usize] = byte;
        self.cycle += 1;

        if self.cycle == 3 {
            self.cycle = 0;
            self.decode_packet();
        }
    }
}

// =============================================================================
// INSTALLATION
// =============================================================================

/// Wait for the controller input buffer to drain (safe to write).
fn wait_for_write(bus: &mut dyn PortBus) -> Result<(), &'static str> {
    for _ in 0..POLL_BUDGET {
        if bus.read_u8(STATUS_PORT) & 0x02 == 0 {
            return Ok(());
        }
    }
    Err("PS/2 controller write timeout")
}

/// Wait for the controller output buffer to fill (data to read).
fn wait_for_read(bus: &mut dyn PortBus) -> Result<(), &'static str> {
    for _ in 0..POLL_BUDGET {
        if bus.read_u8(STATUS_PORT) & 0x01 != 0 {
            return Ok(());
        }
    }
    Err("PS/2 controller read timeout")
}

fn send_controller_command(bus: &mut dyn PortBus, cmd: u8) -> Result<(), &'static str> {
    wait_for_write(bus)?;
    bus.write_u8(STATUS_PORT, cmd);
    Ok(())
}

fn send_data(bus: &mut dyn PortBus, data: u8) -> Result<(), &'static str> {
    wait_for_write(bus)?;
    bus.write_u8(DATA_PORT, data);
    Ok(())
}

fn read_data(bus: &mut dyn PortBus) -> Result<u8, &'static str> {
    wait_for_read(bus)?;
    Ok(bus.read_u8(DATA_PORT))
}

/// Send a command to the mouse itself (0xD4-prefixed) and check the ACK.
fn send_mouse_command(bus: &mut dyn PortBus, cmd: u8) -> Result<(), &'static str> {
    send_controller_command(bus, CMD_AUX_PREFIX)?;
    send_data(bus, cmd)?;
    if read_data(bus)? != MOUSE_ACK {
        return Err("mouse did not ACK command");
    }
    Ok(())
}

/// Bring up the auxiliary device, register the IRQ12 handler and unmask
/// the line. On timeout the driver is left uninstalled; the caller logs
/// and carries on without a mouse.
pub fn install<'a>(
    dispatcher: &mut IrqDispatcher<'a>,
    bus: &mut dyn PortBus,
    state: &'a MouseState,
    width: i32,
    height: i32,
) -> Result<(), &'static str> {
    state.set_bounds(width, height);
    state.set_position(width / 2, height / 2);

    send_controller_command(bus, CMD_ENABLE_AUX)?;

    send_controller_command(bus, CMD_READ_CONFIG)?;
    let config = read_data(bus)?;
    // Enable the IRQ12 bit, make sure the aux clock is running.
    let config = (config | 0x02) & !0x20;
    send_controller_command(bus, CMD_WRITE_CONFIG)?;
    send_data(bus, config)?;

    send_mouse_command(bus, MOUSE_SET_DEFAULTS)?;
    send_mouse_command(bus, MOUSE_ENABLE_STREAMING)?;

    dispatcher.install_handler(MOUSE_IRQ, Box::new(MouseDriver::new(state)));
    dispatcher.pics().clear_irq_mask(bus, MOUSE_IRQ);
    Ok(())
}
