//! Ring 0 -> Ring 3 transition, per spec.md §4.10.
//!
//! No process image loader, no fork, no return-to-kernel path: this kernel
//! launches exactly one user program and never comes back (spec.md
//! Non-goals: dynamic linking, copy-on-write or demand paging, any
//! userspace ABI beyond the enumerated syscalls).

use core::sync::atomic::{AtomicU64, Ordering};

use crate::arch::x86_64::gdt;
use crate::mm::{frame_allocator, heap, vmm, KernelError, KernelResult, PageFlags, VirtualAddress, FRAME_SIZE};
use crate::sched::ProcessId;

const USER_STACK_SIZE: usize = 64 * 1024;
const KERNEL_STACK_SIZE: usize = 8 * 1024;

/// Virtual range reserved for the one user stack this kernel ever maps:
/// canonical in the low half, far below the kernel's own identity-mapped
/// range so the two can never collide.
const USER_STACK_BOTTOM: u64 = 0x0000_7000_0000_0000;

/// Virtual address of the one user code page this kernel ever maps.
const USER_CODE_PAGE: u64 = 0x0000_6000_0000_0000;

// A tiny ring-3 demo program: `write(1, "hi", 2)` then `exit(0)`, per
// spec.md scenario S5. Written as position-independent assembly rather than
// a hand-encoded byte array — `lea`'s `rip`-relative addressing keeps the
// displacement between the instructions and the message correct regardless
// of where [`load_demo_program`] copies this span to.
core::arch::global_asm!(
    ".pushsection .rodata, \"a\"",
    ".align 8",
    ".global __demo_program_start",
    "__demo_program_start:",
    "mov rax, 1",      // write
    "mov rdi, 1",      // fd = stdout
    "lea rsi, [rip + __demo_program_msg]",
    "mov rdx, 2",      // n
    "syscall",
    "mov rax, 0",      // exit
    "xor rdi, rdi",    // status = 0
    "syscall",
    "__demo_program_msg:",
    ".ascii \"hi\"",
    ".global __demo_program_end",
    "__demo_program_end:",
    ".popsection",
);

extern "C" {
    static __demo_program_start: u8;
    static __demo_program_end: u8;
}

/// The assembled bytes of the built-in demo program, for
/// [`load_demo_program`].
pub fn demo_program_bytes() -> &'static [u8] {
    // SAFETY: both symbols are defined by the `global_asm!` block above and
    // bound the same `.rodata` span for the life of the program.
    unsafe {
        let start = &__demo_program_start as *const u8;
        let end = &__demo_program_end as *const u8;
        core::slice::from_raw_parts(start, end as usize - start as usize)
    }
}

/// Copies `code` into a freshly mapped, user-executable page at
/// [`USER_CODE_PAGE`] and returns its virtual address as an entry point for
/// [`start_usermode_process`]. `code` must fit in a single 4 KiB page.
pub fn load_demo_program(code: &[u8]) -> KernelResult<VirtualAddress> {
    assert!(code.len() <= FRAME_SIZE, "demo program must fit in one page");

    let phys = frame_allocator::alloc_frame().ok_or(KernelError::OutOfMemory)?;
    let virt = VirtualAddress::new(USER_CODE_PAGE);
    // User-executable, not writable: PageFlags::USER_DATA sets NO_EXECUTE,
    // which is wrong for a code page, so this is built directly rather than
    // reusing that preset.
    let code_flags = PageFlags::PRESENT | PageFlags::USER;
    if let Err(e) = vmm::map_page(virt, phys, code_flags) {
        let _ = frame_allocator::free_frame(phys);
        return Err(e);
    }

    // SAFETY: the PMM hands out identity-addressable physical memory (see
    // `mm::page_table`'s own raw-pointer frame dereferences); `phys` was
    // just allocated and is not yet visible to anything else, and `code`
    // fits within the single page `phys` names.
    unsafe {
        core::ptr::copy_nonoverlapping(code.as_ptr(), phys.as_u64() as *mut u8, code.len());
    }

    Ok(virt)
}

/// Entry point of the demo program, stashed by [`spawn_demo_process`] for
/// [`demo_trampoline`] to pick up: [`crate::sched::process_create`] only
/// takes a bare `extern "C" fn() -> !`, with no room to pass an argument.
static DEMO_ENTRY: AtomicU64 = AtomicU64::new(0);

extern "C" fn demo_trampoline() -> ! {
    start_usermode_process(VirtualAddress::new(DEMO_ENTRY.load(Ordering::Relaxed)))
}

/// Maps the built-in demo program and schedules it as its own process, per
/// spec.md scenario S5. Run as a dedicated process rather than inline from
/// the boot flow so its eventual `exit()` leaves the idle thread on the
/// ready queue to take over, instead of racing `schedule`'s no-op
/// short-circuit when the current thread has nowhere else to go.
pub fn spawn_demo_process() -> KernelResult<ProcessId> {
    let entry = load_demo_program(demo_program_bytes())?;
    DEMO_ENTRY.store(entry.as_u64(), Ordering::Relaxed);
    Ok(crate::sched::process_create("demo", demo_trampoline))
}

/// Maps a fresh, zeroed, user-writable stack of [`USER_STACK_SIZE`] bytes at
/// [`USER_STACK_BOTTOM`] and returns its top (the initial `rsp`).
fn map_user_stack() -> KernelResult<u64> {
    let pages = USER_STACK_SIZE / FRAME_SIZE;
    for i in 0..pages {
        let virt = VirtualAddress::new(USER_STACK_BOTTOM + (i * FRAME_SIZE) as u64);
        vmm::map_new_page(virt, PageFlags::USER_DATA)?;
    }
    Ok(USER_STACK_BOTTOM + USER_STACK_SIZE as u64)
}

/// Allocates a user stack and a kernel stack, installs the kernel stack top
/// as the TSS's `RSP0`, and drops to ring 3 at `entry`. Never returns.
///
/// `entry` must already be mapped user-executable (see
/// [`load_demo_program`]).
pub fn start_usermode_process(entry: VirtualAddress) -> ! {
    let kernel_stack_base = heap::aligned_alloc(16, KERNEL_STACK_SIZE) as usize;
    assert!(kernel_stack_base != 0, "out of memory allocating a kernel stack");
    let kernel_stack_top = (kernel_stack_base + KERNEL_STACK_SIZE) as u64;
    gdt::set_kernel_stack(kernel_stack_top);

    let user_stack_top = map_user_stack().expect("out of memory mapping the user stack");

    // SAFETY: `entry` is caller-guaranteed mapped and user-executable,
    // `user_stack_top` was just mapped user-writable above, and the
    // selectors come from the kernel's own GDT.
    unsafe {
        enter_usermode(
            entry.as_u64(),
            user_stack_top,
            gdt::USER_CODE64_SELECTOR.0 as u64,
            gdt::USER_DATA_SELECTOR.0 as u64,
        )
    }
}

/// Pushes an `iretq` frame landing at `entry` in ring 3 with a fresh stack,
/// clears every integer register, reloads the data segments to the user
/// data selector, and executes `iretq`. Never returns.
///
/// # Safety
///
/// `user_cs`/`user_ss` must be ring-3 selectors valid in the current GDT,
/// and `user_stack_top` must be a mapped, user-writable address.
#[unsafe(naked)]
unsafe extern "C" fn enter_usermode(entry: u64, user_stack_top: u64, user_cs: u64, user_ss: u64) -> ! {
    core::arch::naked_asm!(
        "push rcx",   // user_ss  -> iretq frame: ss
        "push rsi",   // user_rsp -> iretq frame: rsp
        "push 0x202", //            iretq frame: rflags (IF set)
        "push rdx",   // user_cs  -> iretq frame: cs
        "push rdi",   // entry    -> iretq frame: rip
        "mov ax, cx",
        "mov ds, ax",
        "mov es, ax",
        "mov fs, ax",
        "mov gs, ax",
        "xor eax, eax",
        "xor ebx, ebx",
        "xor ecx, ecx",
        "xor edx, edx",
        "xor esi, esi",
        "xor edi, edi",
        "xor ebp, ebp",
        "xor r8, r8",
        "xor r9, r9",
        "xor r10, r10",
        "xor r11, r11",
        "xor r12, r12",
        "xor r13, r13",
        "xor r14, r14",
        "xor r15, r15",
        "iretq",
    );
}
