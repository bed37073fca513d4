//! Round-robin fairness test: three threads each append a letter to a shared
//! trace then yield, and the trace is expected to be a strict `ABCABC...`
//! rotation — the idle thread must never interleave into it.

#![no_std]
#![no_main]

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use aurora_kernel::sched;
use aurora_kernel::testing::{exit_qemu, test_panic_handler, QemuExitCode};
use aurora_kernel::{arch, mm, serial_println};

/// How many letters each of the three threads writes before exiting.
const ITERATIONS: usize = 5;
const TRACE_LEN: usize = ITERATIONS * 3;

static TRACE: [AtomicU8; TRACE_LEN] = [const { AtomicU8::new(0) }; TRACE_LEN];
static TRACE_INDEX: AtomicUsize = AtomicUsize::new(0);

fn record(letter: u8) {
    let i = TRACE_INDEX.fetch_add(1, Ordering::SeqCst);
    if i < TRACE_LEN {
        TRACE[i].store(letter, Ordering::SeqCst);
    }
}

extern "C" fn thread_a() -> ! {
    for _ in 0..ITERATIONS {
        record(b'A');
        sched::yield_now();
    }
    sched::thread_exit();
}

extern "C" fn thread_b() -> ! {
    for _ in 0..ITERATIONS {
        record(b'B');
        sched::yield_now();
    }
    sched::thread_exit();
}

extern "C" fn thread_c() -> ! {
    for _ in 0..ITERATIONS {
        record(b'C');
        sched::yield_now();
    }
    sched::thread_exit();
}

#[no_mangle]
pub extern "C" fn _start() -> ! {
    serial_println!("scheduler_tests: starting");

    // SAFETY: first thing this binary does; no prior mapping or allocation.
    unsafe {
        mm::init(None);
    }
    arch::init();

    sched::init();
    sched::process_create("trace_a", thread_a);
    sched::process_create("trace_b", thread_b);
    sched::process_create("trace_c", thread_c);

    // Every thread above is created Ready and pushed to the FIFO before this
    // runs, so the first `schedule()` call hands off to `thread_a` and only
    // returns here once all three have exited and the ready queue is empty
    // again — the boot flow resumes as the idle thread, per `schedule`'s
    // contract.
    sched::schedule();

    test_trace_is_strict_round_robin();

    serial_println!("scheduler_tests: all tests passed");
    exit_qemu(QemuExitCode::Success)
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    test_panic_handler(info)
}

fn test_trace_is_strict_round_robin() {
    serial_println!("test_trace_is_strict_round_robin...");
    let written = TRACE_INDEX.load(Ordering::SeqCst);
    assert_eq!(written, TRACE_LEN, "not every thread ran to completion");

    const EXPECTED: [u8; 3] = [b'A', b'B', b'C'];
    for (i, slot) in TRACE.iter().enumerate() {
        let got = slot.load(Ordering::SeqCst);
        assert_eq!(
            got, EXPECTED[i % 3],
            "trace[{i}] = {got} ({}), expected {} — idle or another thread broke the rotation",
            got as char, EXPECTED[i % 3] as char
        );
    }

    // Every prefix of length 3k must contain exactly k of each letter: the
    // per-position check above already implies this, but state it directly
    // since it's the property the rotation is actually for.
    for k in 1..=ITERATIONS {
        let prefix = &TRACE[..k * 3];
        for &letter in &EXPECTED {
            let count = prefix.iter().filter(|s| s.load(Ordering::SeqCst) == letter).count();
            assert_eq!(count, k, "prefix of length {} did not contain exactly {k} of {}", k * 3, letter as char);
        }
    }

    assert_eq!(sched::ready_len(), 0, "ready queue should be empty once every thread has exited");
    serial_println!("  ok");
}
