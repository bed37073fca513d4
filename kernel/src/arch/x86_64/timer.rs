//! PIT (8254) rate generator: the kernel's sole timebase and preemption
//! source.
//!
//! Programmed once at a fixed frequency (1 kHz by default) in rate-generator
//! mode on channel 0. Every tick (IRQ0, already remapped to vector 32 by
//! `pic`) increments a tick counter, forwards to the scheduler, and invokes
//! one optional callback a caller registered with [`set_callback`].

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use spin::Mutex;

use crate::arch::x86_64::outb;

/// PIT input clock frequency.
const PIT_BASE_FREQUENCY: u32 = 1_193_182;
/// Command byte: channel 0, lobyte/hibyte access, rate generator, binary.
const PIT_COMMAND: u8 = 0x36;
const PIT_COMMAND_PORT: u16 = 0x43;
const PIT_CHANNEL0_PORT: u16 = 0x40;

/// Ticks per second the kernel runs the PIT at.
pub const DEFAULT_FREQUENCY_HZ: u32 = 1000;

static TICKS: AtomicU64 = AtomicU64::new(0);
static FREQUENCY_HZ: AtomicU64 = AtomicU64::new(DEFAULT_FREQUENCY_HZ as u64);
static CALLBACK: Mutex<Option<fn()>> = Mutex::new(None);
static READY: AtomicBool = AtomicBool::new(false);

/// Programs the PIT at `frequency_hz`, clamped so the resulting divisor fits
/// the hardware's 16-bit counter.
///
/// # Safety
///
/// Must run once, after the PIC has remapped IRQ0 to vector 32 and before
/// that line is unmasked.
pub unsafe fn init(frequency_hz: u32) {
    let frequency_hz = frequency_hz.max(1);
    let divisor = (PIT_BASE_FREQUENCY / frequency_hz).clamp(1, 65535);
    FREQUENCY_HZ.store((PIT_BASE_FREQUENCY / divisor) as u64, Ordering::Relaxed);

    // SAFETY: 0x40/0x43 are the PIT's fixed legacy I/O ports; this is the
    // documented channel-0 rate-generator programming sequence.
    unsafe {
        outb(PIT_COMMAND_PORT, PIT_COMMAND);
        outb(PIT_CHANNEL0_PORT, (divisor & 0xFF) as u8);
        outb(PIT_CHANNEL0_PORT, (divisor >> 8) as u8);
    }
    READY.store(true, Ordering::Relaxed);
}

/// Whether [`init`] has run. The logger uses this to decide whether a tick
/// count is meaningful yet.
pub fn is_ready() -> bool {
    READY.load(Ordering::Relaxed)
}

/// Registers a single callback invoked on every tick, after the scheduler
/// has been notified. Replaces any previously registered callback.
pub fn set_callback(callback: fn()) {
    *CALLBACK.lock() = Some(callback);
}

/// Called from the IRQ0 handler. Advances the tick counter, drives the
/// scheduler's preemption check, then runs the registered callback, if any.
pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    crate::sched::timer_tick();
    if let Some(callback) = *CALLBACK.lock() {
        callback();
    }
}

/// Ticks elapsed since [`init`].
pub fn get_ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Configured tick frequency, in Hz.
pub fn frequency_hz() -> u64 {
    FREQUENCY_HZ.load(Ordering::Relaxed)
}

/// Ticks converted to milliseconds at the configured frequency.
pub fn milliseconds() -> u64 {
    get_ticks() * 1000 / frequency_hz()
}

/// Ticks converted to whole seconds at the configured frequency.
pub fn seconds() -> u64 {
    get_ticks() / frequency_hz()
}

/// Busy-halts the calling thread until at least `ms` milliseconds have
/// elapsed, yielding to interrupts between checks. The CPU is not actually
/// idle-looped for the whole duration — it `hlt`s and lets any interrupt,
/// including the next tick, wake it.
pub fn sleep(ms: u64) {
    let target = milliseconds() + ms;
    while milliseconds() < target {
        crate::arch::x86_64::idle();
    }
}

/// Reads the I/O port wait hack (port 0x80) once; used to add a small,
/// hardware-backed delay when reprogramming slower devices. Unused by the
/// PIT itself but kept here as the one place the "legacy wait port" from the
/// external-interfaces list is exercised.
pub fn io_wait() {
    // SAFETY: port 0x80 is conventionally unused POST-diagnostic I/O; a
    // write to it is a no-op side effect other than the bus delay it costs.
    unsafe { outb(0x80, 0) };
}
