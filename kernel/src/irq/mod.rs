//! Exception dump-and-halt, and IRQ acknowledge + vector dispatch.
//!
//! Both entry points are called from [`crate::arch::x86_64::idt::interrupt_dispatch`]
//! with the uniform frame every `isr_common_stub` invocation built. Nothing
//! here is registerable: the dispatch table is the match statement below,
//! fixed at the two lines legacy hardware actually raises during bring-up
//! (IRQ0 timer, IRQ1 keyboard).

use crate::arch::x86_64::idt::InterruptFrame;
use crate::arch::x86_64::pic;

pub const IRQ_TIMER: u8 = 0;
pub const IRQ_KEYBOARD: u8 = 1;

/// Handles a CPU exception (vector 0..31): prints the frame and halts with
/// interrupts disabled. No recovery is attempted, per spec.
pub fn handle_exception(frame: &InterruptFrame) {
    log::error!(
        "EXCEPTION {} error_code={:#x} rip={:#x} cs={:#x} rflags={:#x} rsp={:#x} ss={:#x}",
        frame.vector,
        frame.error_code,
        frame.rip,
        frame.cs,
        frame.rflags,
        frame.rsp,
        frame.ss,
    );
    log::error!(
        "  rax={:#x} rbx={:#x} rcx={:#x} rdx={:#x} rsi={:#x} rdi={:#x} rbp={:#x}",
        frame.rax, frame.rbx, frame.rcx, frame.rdx, frame.rsi, frame.rdi, frame.rbp,
    );
    log::error!(
        "  r8={:#x} r9={:#x} r10={:#x} r11={:#x} r12={:#x} r13={:#x} r14={:#x} r15={:#x}",
        frame.r8, frame.r9, frame.r10, frame.r11, frame.r12, frame.r13, frame.r14, frame.r15,
    );
    crate::arch::x86_64::halt();
}

/// Handles a remapped legacy IRQ (`vector - 32`): dispatches by line, then
/// sends EOI. Unknown lines are acknowledged and otherwise ignored.
pub fn handle_irq(irq: u8) {
    match irq {
        IRQ_TIMER => crate::arch::x86_64::timer::tick(),
        IRQ_KEYBOARD => crate::keyboard::handle_interrupt(),
        _ => log::trace!("unhandled IRQ{irq}"),
    }

    // SAFETY: `irq` is exactly the line the PIC just raised (the vector this
    // frame's vector - 32), so the EOI targets the correct cascade.
    unsafe {
        pic::send_eoi(irq);
    }
}
