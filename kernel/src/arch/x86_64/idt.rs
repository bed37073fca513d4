//! Interrupt Descriptor Table and the narrow assembly entry stubs.
//!
//! Every vector funnels through a single assembly stub that normalizes the
//! stack (pushing a dummy error code for vectors the CPU doesn't supply one
//! for) and a single common stub that saves all general-purpose registers
//! before handing a `&InterruptFrame` to Rust. This keeps the 48 per-vector
//! stubs to three instructions each instead of 48 handwritten handler
//! bodies, and gives exception and IRQ dispatch one shared frame layout.
//!
//! We still build the table itself with `x86_64::structures::idt` — its
//! `InterruptDescriptorTable`/`Entry` types are a plain encoding of the
//! hardware gate descriptor, not a builder that would fight the raw stub
//! addresses below.

use lazy_static::lazy_static;
use x86_64::structures::idt::InterruptDescriptorTable;
use x86_64::VirtAddr;

/// Registers and CPU-pushed frame as left on the stack by `isr_common_stub`.
///
/// Field order matches push order high-to-low so that `rdi` (passed to
/// `interrupt_dispatch`) can point straight at this struct.
#[repr(C)]
pub struct InterruptFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rax: u64,
    pub vector: u64,
    pub error_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

core::arch::global_asm!(
    r#"
.global isr_common_stub
isr_common_stub:
    push rax
    push rcx
    push rdx
    push rbx
    push rbp
    push rsi
    push rdi
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    mov rdi, rsp
    call interrupt_dispatch
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rdi
    pop rsi
    pop rbp
    pop rbx
    pop rdx
    pop rcx
    pop rax
    add rsp, 16
    iretq
"#
);

macro_rules! stub_noerr {
    ($name:ident, $vec:expr) => {
        core::arch::global_asm!(concat!(
            ".global ",
            stringify!($name),
            "\n",
            stringify!($name),
            ":\n",
            "push 0\n",
            "push ",
            stringify!($vec),
            "\n",
            "jmp isr_common_stub\n"
        ));
    };
}

macro_rules! stub_err {
    ($name:ident, $vec:expr) => {
        core::arch::global_asm!(concat!(
            ".global ",
            stringify!($name),
            "\n",
            stringify!($name),
            ":\n",
            "push ",
            stringify!($vec),
            "\n",
            "jmp isr_common_stub\n"
        ));
    };
}

stub_noerr!(isr_stub_0, 0);
stub_noerr!(isr_stub_1, 1);
stub_noerr!(isr_stub_2, 2);
stub_noerr!(isr_stub_3, 3);
stub_noerr!(isr_stub_4, 4);
stub_noerr!(isr_stub_5, 5);
stub_noerr!(isr_stub_6, 6);
stub_noerr!(isr_stub_7, 7);
stub_err!(isr_stub_8, 8);
stub_noerr!(isr_stub_9, 9);
stub_err!(isr_stub_10, 10);
stub_err!(isr_stub_11, 11);
stub_err!(isr_stub_12, 12);
stub_err!(isr_stub_13, 13);
stub_err!(isr_stub_14, 14);
stub_noerr!(isr_stub_15, 15);
stub_noerr!(isr_stub_16, 16);
stub_err!(isr_stub_17, 17);
stub_noerr!(isr_stub_18, 18);
stub_noerr!(isr_stub_19, 19);
stub_noerr!(isr_stub_20, 20);
stub_err!(isr_stub_21, 21);
stub_noerr!(isr_stub_22, 22);
stub_noerr!(isr_stub_23, 23);
stub_noerr!(isr_stub_24, 24);
stub_noerr!(isr_stub_25, 25);
stub_noerr!(isr_stub_26, 26);
stub_noerr!(isr_stub_27, 27);
stub_noerr!(isr_stub_28, 28);
stub_err!(isr_stub_29, 29);
stub_err!(isr_stub_30, 30);
stub_noerr!(isr_stub_31, 31);
// Remapped legacy PIC vectors (see `arch::x86_64::pic`): IRQ0..15 -> 32..47.
stub_noerr!(isr_stub_32, 32);
stub_noerr!(isr_stub_33, 33);
stub_noerr!(isr_stub_34, 34);
stub_noerr!(isr_stub_35, 35);
stub_noerr!(isr_stub_36, 36);
stub_noerr!(isr_stub_37, 37);
stub_noerr!(isr_stub_38, 38);
stub_noerr!(isr_stub_39, 39);
stub_noerr!(isr_stub_40, 40);
stub_noerr!(isr_stub_41, 41);
stub_noerr!(isr_stub_42, 42);
stub_noerr!(isr_stub_43, 43);
stub_noerr!(isr_stub_44, 44);
stub_noerr!(isr_stub_45, 45);
stub_noerr!(isr_stub_46, 46);
stub_noerr!(isr_stub_47, 47);

extern "C" {
    fn isr_stub_0();
    fn isr_stub_1();
    fn isr_stub_2();
    fn isr_stub_3();
    fn isr_stub_4();
    fn isr_stub_5();
    fn isr_stub_6();
    fn isr_stub_7();
    fn isr_stub_8();
    fn isr_stub_9();
    fn isr_stub_10();
    fn isr_stub_11();
    fn isr_stub_12();
    fn isr_stub_13();
    fn isr_stub_14();
    fn isr_stub_15();
    fn isr_stub_16();
    fn isr_stub_17();
    fn isr_stub_18();
    fn isr_stub_19();
    fn isr_stub_20();
    fn isr_stub_21();
    fn isr_stub_22();
    fn isr_stub_23();
    fn isr_stub_24();
    fn isr_stub_25();
    fn isr_stub_26();
    fn isr_stub_27();
    fn isr_stub_28();
    fn isr_stub_29();
    fn isr_stub_30();
    fn isr_stub_31();
    fn isr_stub_32();
    fn isr_stub_33();
    fn isr_stub_34();
    fn isr_stub_35();
    fn isr_stub_36();
    fn isr_stub_37();
    fn isr_stub_38();
    fn isr_stub_39();
    fn isr_stub_40();
    fn isr_stub_41();
    fn isr_stub_42();
    fn isr_stub_43();
    fn isr_stub_44();
    fn isr_stub_45();
    fn isr_stub_46();
    fn isr_stub_47();
}

fn stub_addr(vector: usize) -> VirtAddr {
    let f: unsafe extern "C" fn() = match vector {
        0 => isr_stub_0,
        1 => isr_stub_1,
        2 => isr_stub_2,
        3 => isr_stub_3,
        4 => isr_stub_4,
        5 => isr_stub_5,
        6 => isr_stub_6,
        7 => isr_stub_7,
        8 => isr_stub_8,
        9 => isr_stub_9,
        10 => isr_stub_10,
        11 => isr_stub_11,
        12 => isr_stub_12,
        13 => isr_stub_13,
        14 => isr_stub_14,
        15 => isr_stub_15,
        16 => isr_stub_16,
        17 => isr_stub_17,
        18 => isr_stub_18,
        19 => isr_stub_19,
        20 => isr_stub_20,
        21 => isr_stub_21,
        22 => isr_stub_22,
        23 => isr_stub_23,
        24 => isr_stub_24,
        25 => isr_stub_25,
        26 => isr_stub_26,
        27 => isr_stub_27,
        28 => isr_stub_28,
        29 => isr_stub_29,
        30 => isr_stub_30,
        31 => isr_stub_31,
        32 => isr_stub_32,
        33 => isr_stub_33,
        34 => isr_stub_34,
        35 => isr_stub_35,
        36 => isr_stub_36,
        37 => isr_stub_37,
        38 => isr_stub_38,
        39 => isr_stub_39,
        40 => isr_stub_40,
        41 => isr_stub_41,
        42 => isr_stub_42,
        43 => isr_stub_43,
        44 => isr_stub_44,
        45 => isr_stub_45,
        46 => isr_stub_46,
        47 => isr_stub_47,
        _ => unreachable!("only vectors 0..=47 have stubs"),
    };
    VirtAddr::new(f as usize as u64)
}

lazy_static! {
    static ref IDT: InterruptDescriptorTable = {
        let mut idt = InterruptDescriptorTable::new();
        for vector in 0..48usize {
            let addr = stub_addr(vector);
            // SAFETY: `addr` points at one of the `isr_stub_*` assembly
            // labels above, each of which ends in `iretq` and expects the
            // CPU-pushed interrupt frame exactly as the hardware leaves it.
            unsafe {
                let options = idt[vector].set_handler_addr(addr);
                if vector == 8 {
                    options.set_stack_index(crate::arch::x86_64::gdt::DOUBLE_FAULT_IST_INDEX);
                }
            }
        }
        idt
    };
}

/// Loads the IDT. Must run after `gdt::init()` so `KERNEL_CODE_SELECTOR`
/// (implicitly baked into the gates by `set_handler_addr`, which reads the
/// current CS) is already correct.
pub fn init() {
    IDT.load();
}

/// Common entry point for every vector, called from `isr_common_stub`.
///
/// Exceptions (`vector < 32`) are unrecoverable at this stage of the kernel:
/// we print the frame and halt. IRQs (`vector >= 32`) are acknowledged and
/// dispatched through [`crate::irq`].
#[no_mangle]
extern "C" fn interrupt_dispatch(frame: *mut InterruptFrame) {
    // SAFETY: `frame` always points at the `InterruptFrame` the calling
    // `isr_common_stub` just built on its own stack.
    let frame = unsafe { &*frame };
    if frame.vector < 32 {
        crate::irq::handle_exception(frame);
    } else {
        crate::irq::handle_irq((frame.vector - 32) as u8);
    }
}
