//! # PS/2 Keyboard Driver
//!
//! Handles PS/2 keyboard input via the IRQ1 interrupt.
//!
//! ## Architecture
//!
//! ```text
//! +-------------+    IRQ1     +------------------+
//! |  Keyboard   |------------>| KeyboardDriver   |
//! |  (Port 60)  |             | scancode -> char |
//! +-------------+             +--------+---------+
//!                                      |
//!                                      v
//!                              +---------------+
//!                              |   KeyQueue    |
//!                              | SPSC ring 256 |
//!                              +-------+-------+
//!                                      |
//!                                      v
//!                                  main loop
//! ```
//!
//! Decoding happens in interrupt context: make codes (top bit clear) are
//! translated through a 128-entry US-layout table, break codes and unmapped
//! keys are dropped, and the resulting ASCII byte is appended to the queue.
//! A full queue drops the keystroke silently; there is no backpressure.
//!
//! The queue is the one spot where interrupt context and the main loop
//! share mutable state, so it is a single-producer/single-consumer ring
//! with acquire/release ordering instead of a bare length counter.

use alloc::boxed::Box;
use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::hal::PortBus;
use crate::interrupts::irq::{InterruptHandler, IrqDispatcher};

pub const KEYBOARD_IRQ: u8 = 1;
pub const KEY_BUFFER_SIZE: usize = 256;

const DATA_PORT: u16 = 0x60;

/// US layout, scancode set 1 make codes. NUL entries are unmapped keys
/// (modifiers, function keys, keypad) and are dropped by the driver.
#[rustfmt::skip]
static SCANCODE_TO_ASCII: [u8; 128] = [
    /* 0x00 */ 0, 0, b'1', b'2', b'3', b'4', b'5', b'6',
    /* 0x08 */ b'7', b'8', b'9', b'0', b'-', b'=', 0x08, b'\t',
    /* 0x10 */ b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i',
    /* 0x18 */ b'o', b'p', b'[', b']', b'\n', 0, b'a', b's',
    /* 0x20 */ b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';',
    /* 0x28 */ b'\'', b'`', 0, b'\\', b'z', b'x', b'c', b'v',
    /* 0x30 */ b'b', b'n', b'm', b',', b'.', b'/', 0, b'*',
    /* 0x38 */ 0, b' ', 0, 0, 0, 0, 0, 0,
    /* 0x40 */ 0, 0, 0, 0, 0, 0, 0, 0,
    /* 0x48 */ 0, 0, 0, 0, 0, 0, 0, 0,
    /* 0x50 */ 0, 0, 0, 0, 0, 0, 0, 0,
    /* 0x58 */ 0, 0, 0, 0, 0, 0, 0, 0,
    /* 0x60 */ 0, 0, 0, 0, 0, 0, 0, 0,
    /* 0x68 */ 0, 0, 0, 0, 0, 0, 0, 0,
    /* 0x70 */ 0, 0, 0, 0, 0, 0, 0, 0,
    /* 0x78 */ 0, 0, 0, 0, 0, 0, 0, 0,
];

/// Bounded SPSC ring of decoded characters.
///
/// The producer is the IRQ1 handler, the consumer is the main loop. Head
/// and tail are monotonic counters, so every one of the
/// [`KEY_BUFFER_SIZE`] slots is usable and `len` is just their distance.
pub struct KeyQueue {
    buf: UnsafeCell<[u8; KEY_BUFFER_SIZE]>,
    head: AtomicUsize,
    tail: AtomicUsize,
}

// One writer (IRQ context), one reader (main loop); the atomics order the
// slot writes.
unsafe impl Sync for KeyQueue {}

impl KeyQueue {
    pub const fn new() -> Self {
        Self {
            buf: UnsafeCell::new([0; KEY_BUFFER_SIZE]),
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
        }
    }

    /// Producer side. A full queue drops the byte; keystrokes are lossy by
    /// contract, never an error.
    pub fn push(&self, byte: u8) {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head.wrapping_sub(tail) >= KEY_BUFFER_SIZE {
            return;
        }
        unsafe {
            (*self.buf.get())[head % KEY_BUFFER_SIZE] = byte;
        }
        self.head.store(head.wrapping_add(1), Ordering::Release);
    }

    /// Consumer side.
    pub fn pop(&self) -> Option<u8> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let byte = unsafe { (*self.buf.get())[tail % KEY_BUFFER_SIZE] };
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        Some(byte)
    }

    /// Pending characters. May be stale by the time the caller acts on it;
    /// `pop` is the authoritative check.
    pub fn len(&self) -> usize {
        let tail = self.tail.load(Ordering::Acquire);
        let head = self.head.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consumer-side drain.
    pub fn clear(&self) {
        while self.pop().is_some() {}
    }
}

/// IRQ1 handler: reads one scancode per interrupt and appends the decoded
/// character, if any.
pub struct KeyboardDriver<'a> {
    queue: &'a KeyQueue,
}

impl<'a> KeyboardDriver<'a> {
    pub fn new(queue: &'a KeyQueue) -> Self {
        Self { queue }
    }
}

impl InterruptHandler for KeyboardDriver<'_> {
    fn handle(&mut self, bus: &mut dyn PortBus) {
        let scancode = bus.read_u8(DATA_PORT);
        // Break codes have the top bit set and carry no character.
        if scancode < 0x80 {
            let ch = SCANCODE_TO_ASCII[scancode as usize];
            if ch != 0 {
                self.queue.push(ch);
            }
        }
    }
}

/// Register the driver on IRQ1 and unmask the line.
pub fn install<'a>(
    dispatcher: &mut IrqDispatcher<'a>,
    bus: &mut dyn PortBus,
    queue: &'a KeyQueue,
) {
    dispatcher.install_handler(KEYBOARD_IRQ, Box::new(KeyboardDriver::new(queue)));
    dispatcher.pics().clear_irq_mask(bus, KEYBOARD_IRQ);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimBus;

    fn feed(driver: &mut KeyboardDriver<'_>, scancode: u8) {
        let mut bus = SimBus::new();
        bus.push_read(DATA_PORT, scancode);
        driver.handle(&mut bus);
    }

    #[test]
    fn make_code_for_a_decodes_to_ascii_a() {
        let queue = KeyQueue::new();
        let mut driver = KeyboardDriver::new(&queue);

        feed(&mut driver, 0x1E);
        assert_eq!(queue.pop(), Some(b'a'));
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn break_codes_are_ignored() {
        let queue = KeyQueue::new();
        let mut driver = KeyboardDriver::new(&queue);

        feed(&mut driver, 0x9E); // release of 'a'
        assert!(queue.is_empty());
    }

    #[test]
    fn unmapped_keys_are_dropped() {
        let queue = KeyQueue::new();
        let mut driver = KeyboardDriver::new(&queue);

        feed(&mut driver, 0x01); // Esc
        feed(&mut driver, 0x3B); // F1
        assert!(queue.is_empty());
    }

    #[test]
    fn a_full_buffer_drops_the_extra_keystroke() {
        let queue = KeyQueue::new();
        let mut driver = KeyboardDriver::new(&queue);

        for _ in 0..KEY_BUFFER_SIZE {
            feed(&mut driver, 0x1E);
        }
        assert_eq!(queue.len(), KEY_BUFFER_SIZE);

        feed(&mut driver, 0x30); // 'b', no room
        assert_eq!(queue.len(), KEY_BUFFER_SIZE);

        for _ in 0..KEY_BUFFER_SIZE {
            assert_eq!(queue.pop(), Some(b'a'));
        }
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn queue_keeps_fifo_order_across_wraparound() {
        let queue = KeyQueue::new();
        for round in 0..3u8 {
            for i in 0..200u8 {
                queue.push(round.wrapping_mul(200).wrapping_add(i));
            }
            for i in 0..200u8 {
                assert_eq!(queue.pop(), Some(round.wrapping_mul(200).wrapping_add(i)));
            }
        }
    }

    #[test]
    fn number_row_and_whitespace_mappings() {
        assert_eq!(SCANCODE_TO_ASCII[0x02], b'1');
        assert_eq!(SCANCODE_TO_ASCII[0x0B], b'0');
        assert_eq!(SCANCODE_TO_ASCII[0x1C], b'\n');
        assert_eq!(SCANCODE_TO_ASCII[0x39], b' ');
        assert_eq!(SCANCODE_TO_ASCII[0x2A], 0); // left shift has no glyph
    }
}
