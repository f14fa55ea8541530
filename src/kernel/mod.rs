//! Bare-metal side of the kernel: boot entry, interrupt trampolines,
//! driver installation and the screen refresh loop.
//!
//! Initialization phases, in order:
//!
//! 1. heap (bump allocator over a static arena)
//! 2. interrupt system (IDT gates, PIC remap; interrupts stay disabled)
//! 3. display (adopt the boot framebuffer, build the compositor)
//! 4. input (keyboard, mouse, timer; each unmasks its own IRQ line)
//! 5. `sti`, then the refresh loop
//!
//! Interrupts are enabled only after every gate is wired and every driver
//! is registered, so nothing ever dispatches through a half-written table.

extern crate alloc;
extern crate rlibc;

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicUsize, Ordering};

use alloc::format;
use bootloader_api::{entry_point, BootInfo};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyleBuilder, Rectangle, RoundedRectangle};
use spin::{Lazy, Mutex};
use uart_16550::SerialPort;
use x86_64::instructions::segmentation::{Segment, CS};
use x86_64::structures::idt::InterruptStackFrame;

use layeros::allocators::BumpAllocator;
use layeros::compositor::{Compositor, Layer, LayerHandle};
use layeros::devices::drivers::{pit, ps2_keyboard, ps2_mouse};
use layeros::devices::drivers::{KeyQueue, MouseState, TimerState};
use layeros::framebuffer::{Color, FramebufferTarget};
use layeros::hal::X86PortBus;
use layeros::interrupts::exceptions::{exception_name, fault_color};
use layeros::interrupts::idt::{Idt, GATE_INTERRUPT};
use layeros::interrupts::irq::IrqDispatcher;

pub static SERIAL: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(0x3F8) });

macro_rules! println {
    ($($arg:tt)*) => {{
        use core::fmt::Write;
        let mut serial = $crate::kernel::SERIAL.lock();
        let _ = writeln!(serial, $($arg)*);
    }};
}

// =============================================================================
// HEAP
// =============================================================================

const HEAP_SIZE: usize = 16 * 1024 * 1024;

#[repr(align(4096))]
struct HeapArena([u8; HEAP_SIZE]);

static mut HEAP_ARENA: HeapArena = HeapArena([0; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: BumpAllocator = BumpAllocator::new();

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    println!("heap exhausted allocating {} bytes", layout.size());
    halt_loop()
}

// =============================================================================
// SHARED DRIVER STATE
// =============================================================================

static KEY_QUEUE: KeyQueue = KeyQueue::new();
static MOUSE: MouseState = MouseState::new();
static TIMER: TimerState = TimerState::new();

static DISPATCHER: Mutex<IrqDispatcher<'static>> = Mutex::new(IrqDispatcher::new());

fn irq_entry(vector: u8) {
    let mut bus = X86PortBus;
    DISPATCHER.lock().dispatch(vector, &mut bus);
}

// =============================================================================
// CRASH PAINTING
// =============================================================================

/// Device geometry saved at display init so exception context can paint
/// the screen without taking any lock. Written once, then read only.
struct CrashFb {
    addr: AtomicUsize,
    width: AtomicUsize,
    height: AtomicUsize,
    pitch: AtomicUsize,
}

static CRASH_FB: CrashFb = CrashFb {
    addr: AtomicUsize::new(0),
    width: AtomicUsize::new(0),
    height: AtomicUsize::new(0),
    pitch: AtomicUsize::new(0),
};

impl CrashFb {
    fn record(&self, (addr, width, height, pitch): (usize, usize, usize, usize)) {
        self.addr.store(addr, Ordering::Relaxed);
        self.width.store(width, Ordering::Relaxed);
        self.height.store(height, Ordering::Relaxed);
        self.pitch.store(pitch, Ordering::Release);
    }

    /// Flood the device framebuffer. Only called on the way down.
    fn paint(&self, color: u32) {
        let pitch = self.pitch.load(Ordering::Acquire);
        let addr = self.addr.load(Ordering::Relaxed);
        if addr == 0 {
            return; // faulted before the display came up
        }
        let width = self.width.load(Ordering::Relaxed);
        let height = self.height.load(Ordering::Relaxed);
        for y in 0..height {
            let row = (addr + y * pitch) as *mut u32;
            for x in 0..width {
                unsafe { row.add(x).write_volatile(color) };
            }
        }
    }
}

fn exception_entry(vector: u8) -> ! {
    println!("EXCEPTION: {} (vector {})", exception_name(vector), vector);
    CRASH_FB.paint(fault_color(vector));
    halt_loop()
}

// =============================================================================
// TRAMPOLINES
// =============================================================================

macro_rules! irq_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) {
            irq_entry($vector);
        }
    };
}

macro_rules! exception_stub {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame) -> ! {
            exception_entry($vector)
        }
    };
}

// Vectors 8, 10-14, 17, 21, 29 and 30 push an error code; the trampoline
// signature has to match or the iret frame is misread.
macro_rules! exception_stub_err {
    ($name:ident, $vector:expr) => {
        extern "x86-interrupt" fn $name(_frame: InterruptStackFrame, _code: u64) -> ! {
            exception_entry($vector)
        }
    };
}

irq_stub!(irq0, 32);
irq_stub!(irq1, 33);
irq_stub!(irq2, 34);
irq_stub!(irq3, 35);
irq_stub!(irq4, 36);
irq_stub!(irq5, 37);
irq_stub!(irq6, 38);
irq_stub!(irq7, 39);
irq_stub!(irq8, 40);
irq_stub!(irq9, 41);
irq_stub!(irq10, 42);
irq_stub!(irq11, 43);
irq_stub!(irq12, 44);
irq_stub!(irq13, 45);
irq_stub!(irq14, 46);
irq_stub!(irq15, 47);

exception_stub!(exc0, 0);
exception_stub!(exc1, 1);
exception_stub!(exc2, 2);
exception_stub!(exc3, 3);
exception_stub!(exc4, 4);
exception_stub!(exc5, 5);
exception_stub!(exc6, 6);
exception_stub!(exc7, 7);
exception_stub_err!(exc8, 8);
exception_stub!(exc9, 9);
exception_stub_err!(exc10, 10);
exception_stub_err!(exc11, 11);
exception_stub_err!(exc12, 12);
exception_stub_err!(exc13, 13);
exception_stub_err!(exc14, 14);
exception_stub!(exc15, 15);
exception_stub!(exc16, 16);
exception_stub_err!(exc17, 17);
exception_stub!(exc18, 18);
exception_stub!(exc19, 19);
exception_stub!(exc20, 20);
exception_stub_err!(exc21, 21);
exception_stub!(exc22, 22);
exception_stub!(exc23, 23);
exception_stub!(exc24, 24);
exception_stub!(exc25, 25);
exception_stub!(exc26, 26);
exception_stub!(exc27, 27);
exception_stub!(exc28, 28);
exception_stub_err!(exc29, 29);
exception_stub_err!(exc30, 30);
exception_stub!(exc31, 31);

static IDT: Lazy<Idt> = Lazy::new(|| {
    let mut idt = Idt::new();
    let cs = CS::get_reg().0;

    // CPU EXCEPTIONS (0-31)
    idt.set_gate(0, exc0 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(1, exc1 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(2, exc2 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(3, exc3 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(4, exc4 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(5, exc5 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(6, exc6 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(7, exc7 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(8, exc8 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(9, exc9 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(10, exc10 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(11, exc11 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(12, exc12 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(13, exc13 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(14, exc14 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(15, exc15 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(16, exc16 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(17, exc17 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(18, exc18 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(19, exc19 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(20, exc20 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(21, exc21 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(22, exc22 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(23, exc23 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(24, exc24 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(25, exc25 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(26, exc26 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(27, exc27 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(28, exc28 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(29, exc29 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(30, exc30 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(31, exc31 as usize as u64, cs, GATE_INTERRUPT);

    // HARDWARE INTERRUPTS (32-47 after remapping)
    idt.set_gate(32, irq0 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(33, irq1 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(34, irq2 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(35, irq3 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(36, irq4 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(37, irq5 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(38, irq6 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(39, irq7 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(40, irq8 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(41, irq9 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(42, irq10 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(43, irq11 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(44, irq12 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(45, irq13 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(46, irq14 as usize as u64, cs, GATE_INTERRUPT);
    idt.set_gate(47, irq15 as usize as u64, cs, GATE_INTERRUPT);

    idt
});

// =============================================================================
// BOOT
// =============================================================================

entry_point!(kernel_main);

fn kernel_main(boot_info: &'static mut BootInfo) -> ! {
    unsafe {
        ALLOCATOR.init(core::ptr::addr_of!(HEAP_ARENA) as usize, HEAP_SIZE);
    }
    println!("heap: {} KiB arena", HEAP_SIZE / 1024);

    // Interrupt system: gates wired and PICs remapped with every line
    // masked. The CPU flag stays clear until input is installed.
    let mut bus = X86PortBus;
    IDT.load();
    DISPATCHER.lock().remap_and_mask(&mut bus);
    println!("interrupts: IDT loaded, PIC remapped to 32/40");

    // Display.
    let framebuffer = match boot_info.framebuffer.as_mut() {
        Some(framebuffer) => framebuffer,
        None => {
            println!("no framebuffer from bootloader, halting");
            halt_loop();
        }
    };
    let target = match FramebufferTarget::from_boot_info(framebuffer) {
        Ok(target) => target,
        Err(e) => {
            println!("framebuffer rejected: {}", e);
            halt_loop();
        }
    };
    CRASH_FB.record(target.geometry());
    let (width, height) = (target.width(), target.height());
    println!("display: {}x{}", width, height);

    let mut compositor = Compositor::new(width, height);
    compositor.set_target(target);

    let screen = build_demo_screen(&mut compositor, width, height);

    // Input. A dead mouse is logged and tolerated; typing still works.
    {
        let mut dispatcher = DISPATCHER.lock();
        ps2_keyboard::install(&mut dispatcher, &mut bus, &KEY_QUEUE);
        println!("keyboard: installed on IRQ1");

        match ps2_mouse::install(&mut dispatcher, &mut bus, &MOUSE, width as i32, height as i32) {
            Ok(()) => println!("mouse: installed on IRQ12"),
            Err(e) => println!("mouse: install failed ({}), continuing without", e),
        }

        pit::install(&mut dispatcher, &mut bus, &TIMER, TICK_HZ);
        println!("timer: {} Hz on IRQ0", TICK_HZ);
    }

    x86_64::instructions::interrupts::enable();
    println!("boot complete, entering refresh loop");

    refresh_loop(compositor, screen)
}

// =============================================================================
// DEMO SCREEN
// =============================================================================

const TICK_HZ: u32 = 100;
const MARGIN: i32 = 24;

struct Screen {
    status: LayerHandle,
    console: LayerHandle,
    console_cols: usize,
    console_rows: usize,
    status_bg: u32,
}

fn build_demo_screen(compositor: &mut Compositor<'static>, width: usize, height: usize) -> Screen {
    let bg_color = Color::from_hex(0x20_2A38);
    let panel_color = bg_color.darken(0.35);
    let accent = Color::from_hex(0x58_C0FF);
    let text = Color::LIGHT_GRAY;

    // Static background: flat fill, a framed panel, the help text.
    let mut background = Layer::new(
        alloc::vec![0u32; width * height].leak(),
        width,
        height,
    );
    background.fill(bg_color.to_argb());

    let panel_width = (width as u32).saturating_sub(2 * MARGIN as u32);
    let panel_style = PrimitiveStyleBuilder::new()
        .fill_color(panel_color.to_rgb888())
        .stroke_color(accent.to_rgb888())
        .stroke_width(1)
        .build();
    RoundedRectangle::with_equal_corners(
        Rectangle::new(
            Point::new(MARGIN, MARGIN),
            Size::new(panel_width, (height as u32).saturating_sub(2 * MARGIN as u32)),
        ),
        Size::new(8, 8),
    )
    .into_styled(panel_style)
    .draw(&mut background)
    .ok();

    background.draw_string(
        MARGIN + 16,
        MARGIN + 12,
        "layeros",
        accent.to_argb(),
        None,
    );
    background.draw_string(
        MARGIN + 16,
        MARGIN + 12 + 2 * Layer::line_height(),
        "type to echo into the console, move the mouse for the cursor",
        text.to_argb(),
        None,
    );
    compositor.register(background);

    // Dynamic console: keyed-transparent until characters land on it.
    let console_cols = ((width as i32 - 2 * (MARGIN + 16)) / 8).max(8) as usize;
    let console_rows = ((height as i32 - (MARGIN + 60) - (MARGIN + 24)) / 8).max(4) as usize;
    let mut console = Layer::new(
        alloc::vec![0u32; console_cols * 8 * console_rows * 8].leak(),
        console_cols * 8,
        console_rows * 8,
    )
    .at(MARGIN + 16, MARGIN + 60)
    .with_transparent_key(0)
    .animated();
    console.fill(0);
    let console = compositor
        .register(console)
        .expect("layer slots exhausted at setup");

    // Static status bar, rewritten once per second.
    let mut status = Layer::new(
        alloc::vec![0u32; width * 16].leak(),
        width,
        16,
    )
    .at(0, height as i32 - 16);
    status.fill(panel_color.to_argb());
    let status = compositor
        .register(status)
        .expect("layer slots exhausted at setup");

    Screen {
        status,
        console,
        console_cols,
        console_rows,
        status_bg: panel_color.to_argb(),
    }
}

// =============================================================================
// REFRESH LOOP
// =============================================================================

/// Poll published input state, mutate layers, compose, flip. Sleeps with
/// `hlt` whenever a frame would be identical to the last one; the timer
/// tick bounds the sleep.
fn refresh_loop(mut compositor: Compositor<'static>, screen: Screen) -> ! {
    let fg = Color::GREEN.to_argb();
    let cell_bg = Color::from_hex(0x10_1620).to_argb();

    let mut col = 0usize;
    let mut row = 0usize;
    let mut keys_seen: u64 = 0;
    let mut last_mouse = MOUSE.position();
    let mut last_blink: u64 = 0;
    let mut last_second: u64 = u64::MAX;
    let mut caret_on = true;
    let mut needs_flip = true;

    loop {
        // Drain the keyboard queue into the console layer.
        while let Some(ch) = KEY_QUEUE.pop() {
            keys_seen += 1;
            needs_flip = true;
            let console = match compositor.layer_mut(screen.console) {
                Some(layer) => layer,
                None => break,
            };
            // Wipe the caret cell before the character logic moves it.
            console.draw_char(col as i32 * 8, row as i32 * 8, b' ', fg, Some(0));
            match ch {
                b'\n' => {
                    col = 0;
                    row += 1;
                }
                0x08 => {
                    if col > 0 {
                        col -= 1;
                        console.draw_char(col as i32 * 8, row as i32 * 8, b' ', fg, Some(0));
                    }
                }
                _ => {
                    console.draw_char(col as i32 * 8, row as i32 * 8, ch, fg, Some(cell_bg));
                    col += 1;
                    if col >= screen.console_cols {
                        col = 0;
                        row += 1;
                    }
                }
            }
            if row >= screen.console_rows {
                console.fill(0);
                col = 0;
                row = 0;
            }
        }

        let mouse = MOUSE.position();
        if mouse != last_mouse {
            last_mouse = mouse;
            needs_flip = true;
        }

        let ticks = TIMER.ticks();

        // Caret blinks at 2 Hz.
        let blink = ticks / (TICK_HZ as u64 / 4);
        if blink != last_blink {
            last_blink = blink;
            caret_on = !caret_on;
            if let Some(console) = compositor.layer_mut(screen.console) {
                let glyph = if caret_on { b'_' } else { b' ' };
                console.draw_char(col as i32 * 8, row as i32 * 8, glyph, fg, Some(0));
            }
            needs_flip = true;
        }

        // Status bar once per second; this touches a static layer, which
        // raises the dirty signal and forces one full recomposition.
        let second = ticks / TICK_HZ as u64;
        if second != last_second {
            last_second = second;
            if let Some(status) = compositor.layer_mut(screen.status) {
                let line = format!(
                    "up {:>5}s   keys {:>5}   mouse {:>4},{:<4}   irqs {:>7}",
                    second,
                    keys_seen,
                    mouse.0,
                    mouse.1,
                    MOUSE.interrupt_count(),
                );
                // Background color so shrinking numbers overwrite cleanly.
                status.draw_string(8, 4, &line, Color::WHITE.to_argb(), Some(screen.status_bg));
            }
            needs_flip = true;
        }

        if needs_flip {
            needs_flip = false;
            compositor.refresh(Some(mouse));
        } else {
            x86_64::instructions::hlt();
        }
    }
}

// =============================================================================
// FAILURE PLUMBING
// =============================================================================

fn halt_loop() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    let msg = info.message();
    let loc = info.location();
    println!("PANIC : {} | {:?}", msg, loc);

    CRASH_FB.paint(0xFF40_0000);
    halt_loop()
}
