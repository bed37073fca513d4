//! Fast-syscall gate: MSR setup and the assembly entry trampoline.
//!
//! `SYSCALL`/`SYSRET` do none of the bookkeeping a software interrupt gate
//! gets for free — no stack switch, no register save, no interrupt masking
//! beyond `SFMASK`. [`syscall_entry`] does all of that by hand: swap onto
//! the current thread's kernel stack (via the mirror [`super::gdt`] keeps
//! alongside the TSS's `RSP0`), save the two registers the CPU repurposed
//! for the return address and flags, shuffle the six syscall-ABI argument
//! registers into System V call position, and call
//! [`crate::syscall::syscall_dispatch`].

use core::sync::atomic::AtomicU64;

use super::gdt::CURRENT_KERNEL_RSP0;
use super::msr::{self, EFER_SCE, IA32_EFER, IA32_LSTAR, IA32_SFMASK, IA32_STAR};

/// Single-CPU save slot for the user stack pointer across a syscall. Safe
/// only because this kernel never runs more than one hart (spec.md
/// Non-goals: multiprocessor bring-up).
static SAVED_USER_RSP: AtomicU64 = AtomicU64::new(0);

/// Installs the fast-syscall gate: `LSTAR` points at [`syscall_entry`],
/// `STAR` is packed so `sysret` lands on the user selectors `gdt` defines,
/// `SFMASK` clears `RFLAGS.IF` on entry (interrupts start masked, matching
/// spec.md §4.9's "entry trampoline ... enables interrupts" — i.e. the
/// trampoline, not the CPU, decides when to turn them back on), and
/// `EFER.SCE` enables the instruction pair itself.
///
/// # Safety
///
/// Must run once during bring-up, after `gdt::init` has installed the
/// selectors `STAR` references.
pub unsafe fn init() {
    // STAR[63:48] is the base the `sysret`/`syscall` selector arithmetic
    // both key off: `syscall` loads CS = base, SS = base+8 from the low
    // half; `sysret` loads CS = base+16, SS = base+8 from the high half.
    // Base 0x18 (the 32-bit user code placeholder `gdt` never actually
    // uses as a segment) makes `sysret` land on user-data (0x20) and
    // user-code64 (0x28); base 0x08 (kernel code) makes `syscall` land on
    // kernel-code (0x08) and kernel-data (0x10).
    let star = (0x18u64 << 48) | (0x08u64 << 32);
    msr::wrmsr(IA32_STAR, star);
    msr::wrmsr(IA32_LSTAR, syscall_entry as usize as u64);
    msr::wrmsr(IA32_SFMASK, 0x200); // RFLAGS.IF

    let efer = msr::rdmsr(IA32_EFER);
    msr::wrmsr(IA32_EFER, efer | EFER_SCE);
}

/// The `SYSCALL` entry point, installed via `LSTAR`.
///
/// On entry: `rax` is the syscall number, `rdi, rsi, rdx, r10, r8, r9` carry
/// six arguments, `rcx` holds the user `RIP`, `r11` holds the user
/// `RFLAGS`, and `rsp` is still the user stack. Interrupts are masked
/// (`SFMASK`) until the dispatch call below re-enables them.
#[unsafe(naked)]
pub unsafe extern "C" fn syscall_entry() -> ! {
    core::arch::naked_asm!(
        "mov [{saved_user_rsp}], rsp",
        "mov rsp, [{kernel_rsp0}]",
        "sti",
        "push r11",     // user rflags
        "push rcx",     // user rip
        "sub rsp, 8",   // alignment padding
        "push r9",      // a6 -> 7th argument, stack slot SysV expects at `call`
        // syscall ABI (rax=n, rdi,rsi,rdx,r10,r8,r9) -> SysV (rdi,rsi,rdx,rcx,r8,r9,+stack)
        "mov r9, r8",
        "mov r8, r10",
        "mov rcx, rdx",
        "mov rdx, rsi",
        "mov rsi, rdi",
        "mov rdi, rax",
        "call {dispatch}",
        "add rsp, 16",  // drop the a6 slot + padding
        "cli",
        "pop rcx",      // restore user rip
        "pop r11",      // restore user rflags
        "mov rsp, [{saved_user_rsp}]",
        "sysretq",
        saved_user_rsp = sym SAVED_USER_RSP,
        kernel_rsp0 = sym CURRENT_KERNEL_RSP0,
        dispatch = sym crate::syscall::syscall_dispatch,
    );
}
