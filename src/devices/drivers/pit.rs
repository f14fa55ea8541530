//! PIT (8253/8254) channel 0 tick source.
//!
//! Programs the timer as a rate generator and counts ticks from IRQ0. The
//! tick count paces the demo loop (caret blink, periodic status updates)
//! and wakes the `hlt` idle.

use alloc::boxed::Box;
use core::sync::atomic::{AtomicU64, Ordering};

use crate::hal::PortBus;
use crate::interrupts::irq::{InterruptHandler, IrqDispatcher};

pub const TIMER_IRQ: u8 = 0;

const CHANNEL_0_PORT: u16 = 0x40;
const COMMAND_PORT: u16 = 0x43;

/// Channel 0, lobyte/hibyte access, mode 3 (square wave).
const COMMAND_RATE_GENERATOR: u8 = 0x36;

/// Base oscillator frequency in Hz.
const PIT_FREQUENCY: u32 = 1_193_182;

pub struct TimerState {
    ticks: AtomicU64,
}

impl TimerState {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

pub struct TimerDriver<'a> {
    state: &'a TimerState,
}

impl InterruptHandler for TimerDriver<'_> {
    fn handle(&mut self, _bus: &mut dyn PortBus) {
        self.state.ticks.fetch_add(1, Ordering::Relaxed);
    }
}

/// Program channel 0 to fire `hz` times a second, register the IRQ0
/// handler and unmask the line.
pub fn install<'a>(
    dispatcher: &mut IrqDispatcher<'a>,
    bus: &mut dyn PortBus,
    state: &'a TimerState,
    hz: u32,
) {
    let divisor = (PIT_FREQUENCY / hz.max(19)).min(0xFFFF) as u16;
    bus.write_u8(COMMAND_PORT, COMMAND_RATE_GENERATOR);
    bus.write_u8(CHANNEL_0_PORT, divisor as u8);
    bus.write_u8(CHANNEL_0_PORT, (divisor >> 8) as u8);

    dispatcher.install_handler(TIMER_IRQ, Box::new(TimerDriver { state }));
    dispatcher.pics().clear_irq_mask(bus, TIMER_IRQ);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimBus;

    #[test]
    fn install_programs_the_divisor_low_byte_first() {
        let state = TimerState::new();
        let mut dispatcher = IrqDispatcher::new();
        let mut bus = SimBus::new();

        install(&mut dispatcher, &mut bus, &state, 100);

        // 1193182 / 100 = 11931 = 0x2E9B
        assert_eq!(bus.writes_to(COMMAND_PORT), [COMMAND_RATE_GENERATOR]);
        assert_eq!(bus.writes_to(CHANNEL_0_PORT), [0x9B, 0x2E]);
    }

    #[test]
    fn ticks_accumulate_per_interrupt() {
        let state = TimerState::new();
        let mut driver = TimerDriver { state: &state };
        let mut bus = SimBus::new();

        for _ in 0..5 {
            driver.handle(&mut bus);
        }
        assert_eq!(state.ticks(), 5);
    }
}
