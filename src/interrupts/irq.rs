//! IRQ handler registry and common dispatch.
//!
//! Hardware interrupts all funnel into [`IrqDispatcher::dispatch`] with the
//! trapped vector number. The dispatcher owns the per-line handler table
//! (at most one handler per line) and the PIC pair, so the EOI policy is
//! applied in exactly one place.

use alloc::boxed::Box;

use crate::hal::PortBus;
use crate::interrupts::pic::{ChainedPics, PIC_1_OFFSET, PIC_2_OFFSET};

pub const IRQ_LINES: usize = 16;

/// A driver's interrupt-context entry point.
///
/// Handlers run with interrupts disabled and must be fast: read the device
/// and publish state, nothing more. The bus is the only context any of
/// this kernel's handlers consult.
pub trait InterruptHandler: Send {
    fn handle(&mut self, bus: &mut dyn PortBus);
}

pub struct IrqDispatcher<'a> {
    handlers: [Option<Box<dyn InterruptHandler + 'a>>; IRQ_LINES],
    pics: ChainedPics,
}

impl<'a> IrqDispatcher<'a> {
    pub const fn new() -> Self {
        Self {
            handlers: [
                None, None, None, None, None, None, None, None, None, None, None, None, None,
                None, None, None,
            ],
            pics: ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET),
        }
    }

    /// Remap the PIC pair and mask all lines except the cascade. Must run
    /// after the IDT is installed and before any handler is expected to
    /// fire.
    pub fn remap_and_mask(&self, bus: &mut dyn PortBus) {
        self.pics.remap(bus);
    }

    /// Register `handler` for `line` (0-15). Replaces any previous handler.
    pub fn install_handler(&mut self, line: u8, handler: Box<dyn InterruptHandler + 'a>) {
        if (line as usize) < IRQ_LINES {
            self.handlers[line as usize] = Some(handler);
        }
    }

    /// Drop the handler for `line`; further interrupts on it become no-ops.
    pub fn uninstall_handler(&mut self, line: u8) {
        if (line as usize) < IRQ_LINES {
            self.handlers[line as usize] = None;
        }
    }

    pub fn pics(&self) -> &ChainedPics {
        &self.pics
    }

    /// Route a trapped hardware interrupt. A missing handler is a no-op,
    /// never an error; the EOI is sent regardless so the line re-arms.
    pub fn dispatch(&mut self, vector: u8, bus: &mut dyn PortBus) {
        if vector < PIC_1_OFFSET || vector >= PIC_1_OFFSET + IRQ_LINES as u8 {
            return;
        }
        let line = vector - PIC_1_OFFSET;

        if let Some(handler) = self.handlers[line as usize].as_mut() {
            handler.handle(bus);
        }

        self.pics.end_of_interrupt(bus, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimBus;
    use crate::interrupts::pic::{PIC_1_COMMAND, PIC_2_COMMAND};
    use core::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler<'a> {
        hits: &'a AtomicUsize,
    }

    impl InterruptHandler for CountingHandler<'_> {
        fn handle(&mut self, _bus: &mut dyn PortBus) {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn each_vector_routes_to_exactly_its_line() {
        let counters: [AtomicUsize; IRQ_LINES] =
            core::array::from_fn(|_| AtomicUsize::new(0));
        let mut dispatcher = IrqDispatcher::new();
        for line in 0..IRQ_LINES {
            dispatcher.install_handler(
                line as u8,
                Box::new(CountingHandler { hits: &counters[line] }),
            );
        }

        let mut bus = SimBus::new();
        for line in 0..IRQ_LINES {
            dispatcher.dispatch(32 + line as u8, &mut bus);
            for (other, counter) in counters.iter().enumerate() {
                let expected = if other <= line { 1 } else { 0 };
                assert_eq!(counter.load(Ordering::Relaxed), expected);
            }
        }
    }

    #[test]
    fn missing_handler_still_acknowledges_the_pic() {
        let mut dispatcher = IrqDispatcher::new();
        let mut bus = SimBus::new();

        dispatcher.dispatch(35, &mut bus);
        assert_eq!(bus.writes, [(PIC_1_COMMAND, 0x20)]);
    }

    #[test]
    fn slave_vector_sends_both_eois() {
        let mut dispatcher = IrqDispatcher::new();
        let mut bus = SimBus::new();

        dispatcher.dispatch(44, &mut bus); // IRQ12
        assert_eq!(bus.writes, [(PIC_2_COMMAND, 0x20), (PIC_1_COMMAND, 0x20)]);
    }

    #[test]
    fn uninstall_returns_the_line_to_a_no_op() {
        let hits = AtomicUsize::new(0);
        let mut dispatcher = IrqDispatcher::new();
        dispatcher.install_handler(1, Box::new(CountingHandler { hits: &hits }));
        dispatcher.uninstall_handler(1);

        let mut bus = SimBus::new();
        dispatcher.dispatch(33, &mut bus);
        assert_eq!(hits.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn vectors_outside_the_irq_window_are_ignored() {
        let mut dispatcher = IrqDispatcher::new();
        let mut bus = SimBus::new();

        dispatcher.dispatch(31, &mut bus);
        dispatcher.dispatch(48, &mut bus);
        assert!(bus.writes.is_empty());
    }
}
