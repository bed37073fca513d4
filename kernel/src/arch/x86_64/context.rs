//! Voluntary context switch primitive.
//!
//! Only the callee-saved half of the System V ABI needs saving here: the
//! switch happens inside an ordinary function call (from the timer IRQ path
//! or a syscall), so the caller-saved registers are already dead by the time
//! we get here. Everything else a thread needs restored — its instruction
//! pointer, its stack — falls out of the stack itself: switching `rsp` and
//! `ret`-ing is how the next thread "resumes" wherever it last called
//! [`switch`].
//!
//! A freshly created thread never called `switch`, so [`Context::new`] fakes
//! one: it builds a stack that looks like `switch` had just pushed five
//! callee-saved registers and is about to `ret` into the thread's entry
//! point.

/// A suspended thread's kernel stack pointer. The callee-saved registers and
/// return address live on the stack itself, not in this struct.
#[derive(Debug, Clone, Copy)]
pub struct Context {
    rsp: u64,
}

impl Context {
    /// Build the initial context for a brand-new thread whose kernel stack
    /// spans `[stack_base, stack_base + stack_size)`. `entry` is called with
    /// the stack otherwise empty the first time this context is switched to.
    pub fn new(entry: extern "C" fn() -> !, stack_base: usize, stack_size: usize) -> Self {
        let top = (stack_base + stack_size) & !0xF;
        // SAFETY: `top` is within the caller-provided stack allocation and
        // 16-byte aligned; we only ever write below it, never above.
        unsafe {
            let mut sp = top as *mut u64;
            sp = sp.sub(1);
            *sp = entry as usize as u64; // return address `switch` will `ret` to
            for _ in 0..5 {
                sp = sp.sub(1);
                *sp = 0; // r15, r14, r13, r12, rbx — cleared callee-saved regs
            }
            Self { rsp: sp as u64 }
        }
    }

    /// Raw stack pointer, for diagnostics only.
    pub fn stack_pointer(&self) -> u64 {
        self.rsp
    }

    /// A context that is never switched into — only ever used as the `from`
    /// slot of the first [`switch`] call, which has no real thread to save
    /// the boot stack's state into.
    pub const fn dummy() -> Self {
        Self { rsp: 0 }
    }
}

/// Switches from `from`'s stack to `to`'s stack.
///
/// # Safety
///
/// `from` must point at the currently running thread's own [`Context`], and
/// `to` must be a context previously produced by [`Context::new`] or a prior
/// call to this function on a thread that is not already running elsewhere.
/// Must be called with interrupts disabled — the incoming thread resumes
/// with whatever interrupt state its stack was switched away under.
#[unsafe(naked)]
pub unsafe extern "C" fn switch(from: *mut Context, to: *const Context) {
    core::arch::naked_asm!(
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "mov [rdi], rsp",   // from.rsp = rsp
        "mov rsp, [rsi]",   // rsp = to.rsp
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "ret",
    );
}
