//! Boot-path integration test: brings the memory hierarchy and architecture
//! layer up exactly as `kernel_main` does, then checks a handful of
//! properties a reader can't exercise from `#[cfg(test)]` unit tests alone
//! because they need real privileged instructions (loading a GDT/IDT,
//! touching CR3).

#![no_std]
#![no_main]

use core::panic::PanicInfo;

use aurora_kernel::mm::{self, heap, frame_allocator};
use aurora_kernel::testing::{exit_qemu, test_panic_handler, QemuExitCode};
use aurora_kernel::{arch, serial_println};

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("basic_boot: starting");

    // SAFETY: first thing this binary does; no prior mapping or allocation.
    unsafe {
        mm::init(None);
    }
    arch::init();

    test_frame_allocator_hands_out_distinct_frames();
    test_heap_allocates_and_frees();
    test_heap_survives_many_small_allocations();

    serial_println!("basic_boot: all tests passed");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_frame_allocator_hands_out_distinct_frames() {
    serial_println!("test_frame_allocator_hands_out_distinct_frames...");
    let a = frame_allocator::alloc_frame().expect("frame allocator exhausted");
    let b = frame_allocator::alloc_frame().expect("frame allocator exhausted");
    assert_ne!(a, b, "two successive allocations returned the same frame");
    frame_allocator::free_frame(a).expect("freeing a just-allocated frame failed");
    frame_allocator::free_frame(b).expect("freeing a just-allocated frame failed");
    serial_println!("  ok");
}

fn test_heap_allocates_and_frees() {
    serial_println!("test_heap_allocates_and_frees...");
    let ptr = heap::malloc(256);
    assert!(!ptr.is_null(), "malloc(256) returned null with a fresh heap");
    // SAFETY: `ptr` is a fresh 256-byte allocation from `malloc` above.
    unsafe {
        core::ptr::write_bytes(ptr, 0xAB, 256);
    }
    heap::free(ptr);
    serial_println!("  ok");
}

fn test_heap_survives_many_small_allocations() {
    serial_println!("test_heap_survives_many_small_allocations...");
    let mut ptrs = [core::ptr::null_mut(); 64];
    for slot in ptrs.iter_mut() {
        let p = heap::malloc(32);
        assert!(!p.is_null(), "malloc(32) returned null mid-loop");
        *slot = p;
    }
    for &p in ptrs.iter() {
        heap::free(p);
    }
    // The freed blocks should have coalesced back into something large
    // enough to satisfy a request bigger than any single one of them.
    let big = heap::malloc(64 * 32);
    assert!(!big.is_null(), "heap did not coalesce freed blocks");
    heap::free(big);
    serial_println!("  ok");
}
