//! Scripted port bus for driver tests.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;

use super::PortBus;

/// In-memory bus: reads come from per-port scripts (falling back to a
/// per-port default, then 0), writes are recorded in order.
pub struct SimBus {
    reads: BTreeMap<u16, VecDeque<u8>>,
    defaults: BTreeMap<u16, u8>,
    pub writes: Vec<(u16, u8)>,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            reads: BTreeMap::new(),
            defaults: BTreeMap::new(),
            writes: Vec::new(),
        }
    }

    /// Queue one byte to be returned by the next unscripted read of `port`.
    pub fn push_read(&mut self, port: u16, value: u8) {
        self.reads.entry(port).or_default().push_back(value);
    }

    /// Value returned by reads of `port` once the script is exhausted.
    pub fn set_default_read(&mut self, port: u16, value: u8) {
        self.defaults.insert(port, value);
    }

    /// Writes seen on `port`, in order.
    pub fn writes_to(&self, port: u16) -> Vec<u8> {
        self.writes
            .iter()
            .filter(|(p, _)| *p == port)
            .map(|(_, v)| *v)
            .collect()
    }
}

impl PortBus for SimBus {
    fn read_u8(&mut self, port: u16) -> u8 {
        if let Some(queue) = self.reads.get_mut(&port) {
            if let Some(value) = queue.pop_front() {
                return value;
            }
        }
        self.defaults.get(&port).copied().unwrap_or(0)
    }

    fn write_u8(&mut self, port: u16, value: u8) {
        self.writes.push((port, value));
    }
}
