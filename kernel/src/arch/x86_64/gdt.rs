//! Global Descriptor Table.
//!
//! Hand-rolled instead of built through `x86_64::structures::gdt`: that
//! builder has no way to emit a 32-bit user code segment, and this layout
//! needs one as a placeholder so the `STAR` selector arithmetic lines up.
//! `SYSRET` loads `SS = STAR[63:48]+8` and `CS = STAR[63:48]+16`; pointing
//! `STAR[63:48]` at the placeholder (0x18) makes those land on the real user
//! data (0x20) and 64-bit user code (0x28) segments without the user code
//! segment having to sit directly after `STAR`'s base.
//!
//! Selector layout:
//! ```text
//! 0x00  null
//! 0x08  kernel code (ring 0, 64-bit)
//! 0x10  kernel data (ring 0)
//! 0x18  user code placeholder (ring 3, 32-bit, never actually used)
//! 0x20  user data (ring 3)
//! 0x28  user code (ring 3, 64-bit)
//! 0x30  TSS (occupies 0x30 and 0x38)
//! ```

use core::sync::atomic::{AtomicU64, Ordering};

use lazy_static::lazy_static;
use spin::Once;
use x86_64::instructions::segmentation::{Segment, CS, DS};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::SegmentSelector;
use x86_64::structures::tss::TaskStateSegment;
use x86_64::{PrivilegeLevel, VirtAddr};

pub const DOUBLE_FAULT_IST_INDEX: u16 = 0;

pub const KERNEL_CODE_SELECTOR: SegmentSelector = SegmentSelector::new(1, PrivilegeLevel::Ring0);
pub const KERNEL_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(2, PrivilegeLevel::Ring0);
pub const USER_CODE32_SELECTOR: SegmentSelector = SegmentSelector::new(3, PrivilegeLevel::Ring3);
pub const USER_DATA_SELECTOR: SegmentSelector = SegmentSelector::new(4, PrivilegeLevel::Ring3);
pub const USER_CODE64_SELECTOR: SegmentSelector = SegmentSelector::new(5, PrivilegeLevel::Ring3);
pub const TSS_SELECTOR: SegmentSelector = SegmentSelector::new(6, PrivilegeLevel::Ring0);

const GDT_SLOTS: usize = 8; // null, kcode, kdata, ucode32, udata, ucode64, tss_lo, tss_hi

#[repr(C, align(16))]
struct RawGdt([u64; GDT_SLOTS]);

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u64,
}

fn code_descriptor(dpl: u8, long_mode: bool) -> u64 {
    let access: u64 = 0x9A | ((dpl as u64) << 5);
    let flags: u64 = if long_mode { 0xA } else { 0xC };
    flat_descriptor(access, flags)
}

fn data_descriptor(dpl: u8) -> u64 {
    let access: u64 = 0x92 | ((dpl as u64) << 5);
    flat_descriptor(access, 0xC)
}

/// Flat (base 0, limit 0xFFFFF) descriptor with the given access byte and
/// high nibble of flags (`G`/`D`or`L`/`AVL`). The CPU ignores base/limit for
/// code and data segments in long mode, but a disassembler or VM monitor
/// inspecting the table still sees a sane flat segment.
fn flat_descriptor(access: u64, flags: u64) -> u64 {
    let limit_low: u64 = 0xFFFF;
    let limit_high: u64 = 0xF;
    limit_low | (access << 40) | (limit_high << 48) | (flags << 52)
}

/// Builds the two 8-byte slots of a 64-bit TSS system descriptor.
fn tss_descriptor(base: u64, limit: u32) -> (u64, u64) {
    let limit_low = (limit as u64) & 0xFFFF;
    let limit_high = ((limit as u64) >> 16) & 0xF;
    let base_low = base & 0xFF_FFFF;
    let base_mid = (base >> 24) & 0xFF;
    let access: u64 = 0x89; // present, DPL0, type=9 (64-bit TSS, available)
    let low = limit_low | (base_low << 16) | (access << 40) | (limit_high << 48) | (base_mid << 56);
    let high = (base >> 32) & 0xFFFF_FFFF;
    (low, high)
}

lazy_static! {
    static ref TSS: TaskStateSegment = {
        let mut tss = TaskStateSegment::new();

        // Ring 3 -> Ring 0 transitions (interrupts, syscalls) switch to this
        // stack. Must be 16-byte aligned for the x86_64 ABI.
        tss.privilege_stack_table[0] = {
            const STACK_SIZE: usize = 4096 * 5;
            #[repr(align(16))]
            struct AlignedStack([u8; STACK_SIZE]);
            static mut KERNEL_STACK: AlignedStack = AlignedStack([0; STACK_SIZE]);

            let stack_start = VirtAddr::from_ptr(&raw const KERNEL_STACK);
            stack_start + STACK_SIZE as u64
        };

        tss.interrupt_stack_table[DOUBLE_FAULT_IST_INDEX as usize] = {
            const STACK_SIZE: usize = 4096 * 5;
            #[repr(align(16))]
            struct AlignedStack([u8; STACK_SIZE]);
            static mut STACK: AlignedStack = AlignedStack([0; STACK_SIZE]);

            let stack_start = VirtAddr::from_ptr(&raw const STACK);
            stack_start + STACK_SIZE as u64
        };
        tss
    };
}

static GDT_PTR: Once<GdtPointer> = Once::new();

fn build_gdt() -> &'static RawGdt {
    static mut GDT: RawGdt = RawGdt([0; GDT_SLOTS]);
    let tss_base = &*TSS as *const TaskStateSegment as u64;
    let tss_limit = (core::mem::size_of::<TaskStateSegment>() - 1) as u32;
    let (tss_lo, tss_hi) = tss_descriptor(tss_base, tss_limit);

    // SAFETY: runs once from `init()` before interrupts are enabled and
    // before any other code could observe `GDT`.
    unsafe {
        let gdt = &raw mut GDT;
        (*gdt).0[0] = 0;
        (*gdt).0[1] = code_descriptor(0, true);
        (*gdt).0[2] = data_descriptor(0);
        (*gdt).0[3] = code_descriptor(3, false);
        (*gdt).0[4] = data_descriptor(3);
        (*gdt).0[5] = code_descriptor(3, true);
        (*gdt).0[6] = tss_lo;
        (*gdt).0[7] = tss_hi;
        &*gdt
    }
}

/// Loads the GDT, reloads the segment registers, and loads the TSS.
///
/// Must run before the IDT is loaded: the IDT's interrupt gates reference
/// `KERNEL_CODE_SELECTOR`.
pub fn init() {
    let gdt = build_gdt();
    let ptr = GDT_PTR.call_once(|| GdtPointer {
        limit: (core::mem::size_of::<RawGdt>() - 1) as u16,
        base: gdt as *const RawGdt as u64,
    });

    // SAFETY: `ptr` describes the just-built, 16-byte-aligned `gdt` for its
    // full lifetime (`'static`). Reloading CS performs a far return to the
    // new kernel code selector; DS and the TSS selector reference entries
    // in the table we just loaded.
    unsafe {
        core::arch::asm!("lgdt [{}]", in(reg) ptr as *const GdtPointer, options(nostack, preserves_flags));
        CS::set_reg(KERNEL_CODE_SELECTOR);
        DS::set_reg(KERNEL_DATA_SELECTOR);
        load_tss(TSS_SELECTOR);
    }
}

/// Mirrors the TSS's `RSP0` so the syscall entry trampoline can load it with
/// a plain `mov` from a `sym`, without walking the TSS's layout from
/// assembly or relying on a GS-based per-CPU slot this uniprocessor kernel
/// has no other use for.
pub(crate) static CURRENT_KERNEL_RSP0: AtomicU64 = AtomicU64::new(0);

/// Updates the kernel stack pointer in the TSS (`RSP0`).
///
/// Called by the scheduler on every context switch so that the next
/// Ring 3 -> Ring 0 transition lands on the new thread's kernel stack. Must
/// be called with interrupts disabled.
pub fn set_kernel_stack(stack_top: u64) {
    // SAFETY: the TSS is a 'static allocated once at boot; writing
    // `privilege_stack_table[0]` through a raw pointer is sound here because
    // callers only invoke this with interrupts disabled, so there is no
    // concurrent reader.
    unsafe {
        let tss_ptr = &*TSS as *const TaskStateSegment as *mut TaskStateSegment;
        (*tss_ptr).privilege_stack_table[0] = VirtAddr::new(stack_top);
    }
    CURRENT_KERNEL_RSP0.store(stack_top, Ordering::Relaxed);
}

/// Reads the current kernel stack pointer from the TSS (`RSP0`).
pub fn get_kernel_stack() -> u64 {
    TSS.privilege_stack_table[0].as_u64()
}
