//! CPU exception policy.
//!
//! Every exception is fatal: the binary's trampolines log the vector
//! name, flood the screen with a color keyed by the exception number and
//! halt forever. There is no resumption and no unwinding, so the only job
//! of this module is naming vectors and picking colors.

pub const EXCEPTION_VECTORS: usize = 32;

static EXCEPTION_NAMES: [&str; EXCEPTION_VECTORS] = [
    "DIVIDE ERROR",
    "DEBUG",
    "NON-MASKABLE INTERRUPT",
    "BREAKPOINT",
    "OVERFLOW",
    "BOUND RANGE EXCEEDED",
    "INVALID OPCODE",
    "DEVICE NOT AVAILABLE",
    "DOUBLE FAULT",
    "COPROCESSOR SEGMENT OVERRUN",
    "INVALID TSS",
    "SEGMENT NOT PRESENT",
    "STACK-SEGMENT FAULT",
    "GENERAL PROTECTION FAULT",
    "PAGE FAULT",
    "RESERVED (15)",
    "x87 FLOATING-POINT",
    "ALIGNMENT CHECK",
    "MACHINE CHECK",
    "SIMD FLOATING-POINT",
    "VIRTUALIZATION",
    "CONTROL PROTECTION",
    "RESERVED (22)",
    "RESERVED (23)",
    "RESERVED (24)",
    "RESERVED (25)",
    "RESERVED (26)",
    "RESERVED (27)",
    "HYPERVISOR INJECTION",
    "VMM COMMUNICATION",
    "SECURITY",
    "RESERVED (31)",
];

pub fn exception_name(vector: u8) -> &'static str {
    EXCEPTION_NAMES
        .get(vector as usize)
        .copied()
        .unwrap_or("UNKNOWN")
}

/// Full-screen fill color for a given exception vector. Red tones for the
/// memory/protection faults people actually hit, distinct hues for the
/// rest so the vector is recognizable from across the room.
pub fn fault_color(vector: u8) -> u32 {
    match vector {
        0 => 0xFF_80_00_00,  // divide error: dark red
        6 => 0xFF_80_00_80,  // invalid opcode: purple
        8 => 0xFF_FF_00_00,  // double fault: bright red
        13 => 0xFF_FF_40_00, // #GP: orange-red
        14 => 0xFF_C0_00_40, // page fault: crimson
        _ => 0xFF_40_40_40 | ((vector as u32) << 16),
    }
}
