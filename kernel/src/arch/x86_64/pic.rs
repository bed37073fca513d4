//! Legacy 8259 PIC remap and EOI.
//!
//! The CPU's first 32 interrupt vectors are reserved for exceptions, so the
//! two cascaded 8259s are reprogrammed to deliver IRQ0..15 on vectors 32..47
//! instead of their power-on default of 8..15/0x70..0x77 (which collides with
//! the exception range). Built on `pic8259::ChainedPics` rather than the
//! hand-rolled ICW1-4 sequence the same remap needs — the crate already
//! encodes the 8259's command/data port protocol correctly.

use pic8259::ChainedPics;
use spin::Mutex;

/// First vector the master PIC's IRQ0 is remapped to.
pub const PIC_1_OFFSET: u8 = 32;
/// First vector the slave PIC's IRQ8 is remapped to.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

/// Remaps both PICs and masks every line. Callers unmask individual IRQs
/// (timer, keyboard) once their handlers are installed.
///
/// # Safety
/// Must run once, after the IDT is loaded and before interrupts are enabled.
pub unsafe fn init() {
    PICS.lock().initialize();
    // initialize() unmasks everything; start fully masked and let each
    // driver (timer, keyboard) unmask its own line when it's ready.
    PICS.lock().write_masks(0xFF, 0xFF);
}

/// Unmasks the given legacy IRQ line (0..15).
pub fn unmask(irq: u8) {
    // SAFETY: `irq` is a legacy PIC line; mask bits are independent of any
    // in-flight interrupt processing.
    unsafe {
        let mut pics = PICS.lock();
        let masks = pics.read_masks();
        let (mut m1, mut m2) = (masks[0], masks[1]);
        if irq < 8 {
            m1 &= !(1 << irq);
        } else {
            m2 &= !(1 << (irq - 8));
        }
        pics.write_masks(m1, m2);
    }
}

/// Sends end-of-interrupt for the given legacy IRQ line (0..15).
///
/// # Safety
/// Must be called exactly once per serviced IRQ, after the handler has
/// finished, with `irq` the line that actually fired.
pub unsafe fn send_eoi(irq: u8) {
    PICS.lock().notify_end_of_interrupt(PIC_1_OFFSET + irq);
}
