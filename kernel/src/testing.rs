//! Shared support for the `tests/` integration binaries.
//!
//! Those binaries are freestanding (`no_std`/`no_main`) targets of their
//! own, built against this crate as an ordinary library; they supply their
//! own `_start` and `#[panic_handler]` and call into here only for the
//! QEMU exit protocol.

use core::panic::PanicInfo;

use crate::arch::x86_64::outb;

/// Exit code written to the `isa-debug-exit` device
/// (`-device isa-debug-exit,iobase=0xf4,iosize=0x04`). QEMU terminates with
/// status `(code << 1) | 1`, so `Success` maps to an even process exit code
/// a test runner can check for.
#[repr(u32)]
#[derive(Debug, Clone, Copy)]
pub enum QemuExitCode {
    Success = 0x10,
    Failed = 0x11,
}

/// Writes `code` to the isa-debug-exit port. Under QEMU with the device
/// attached this terminates the VM immediately; without it, falls back to
/// halting so the binary still stops cleanly.
pub fn exit_qemu(code: QemuExitCode) -> ! {
    // SAFETY: 0xF4 is only wired to anything when `-device isa-debug-exit`
    // is present; the write is otherwise an ignored I/O port access.
    unsafe {
        outb(0xF4, code as u32 as u8);
    }
    crate::arch::x86_64::halt();
}

/// Panic handler shared by the integration test binaries: reports the
/// panic over serial and exits QEMU with a failure code.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    crate::serial_println!("[failed]");
    crate::serial_println!("{info}");
    exit_qemu(QemuExitCode::Failed)
}
