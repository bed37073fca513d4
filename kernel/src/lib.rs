//! Aurora kernel core.
//!
//! An x86_64 monolithic kernel core: everything that runs from a single
//! entry point with a populated boot-information record up to the moment
//! the first ring-3 task executes system calls and is preempted by the
//! timer. See [`kernel_main`] for the bring-up sequence.
//!
//! `#![no_std]` only on the bare-metal build: `#[cfg(test)]` unit tests
//! scattered through `mm` run against the host `std` test harness, since
//! nothing below the memory hierarchy needs real hardware to exercise.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod arch;
pub mod boot_info;
pub mod console;
pub mod error;
pub mod irq;
pub mod keyboard;
pub mod logger;
pub mod mm;
pub mod print;
pub mod sched;
pub mod syscall;
pub mod testing;

pub use boot_info::BootInfo;

/// The kernel's single C-callable entry point, per spec.md §6: takes one
/// pointer argument, the boot record, handed in by whatever loader jumped
/// here. A null pointer or a record that fails [`BootInfo::is_valid`] falls
/// back to bringing the memory hierarchy up without a firmware memory map
/// (see [`mm::frame_allocator::init`]).
///
/// Brings up, in dependency order: the memory hierarchy (frame allocator,
/// paging, heap), the architecture layer (GDT, IDT, PIC), the syscall gate,
/// the scheduler and keyboard driver, then the timebase last so the first
/// tick never lands before anything downstream of it is ready. Never
/// returns.
pub extern "C" fn kernel_main(boot_info: *const BootInfo) -> ! {
    logger::init();
    log::info!(
        "Aurora kernel {} (git {}, built {})",
        env!("CARGO_PKG_VERSION"),
        &env!("GIT_HASH")[..12.min(env!("GIT_HASH").len())],
        env!("BUILD_TIMESTAMP"),
    );

    // SAFETY: `boot_info` is the caller-supplied boot record pointer; a
    // non-null pointer is dereferenced once here to validate its magic
    // before any field is otherwise trusted.
    let info = unsafe { boot_info.as_ref() }.filter(|info| info.is_valid());

    // SAFETY: called exactly once, first, before any code touches `alloc`
    // or installs additional page mappings.
    unsafe {
        mm::init(info);
    }

    arch::init();

    // SAFETY: runs after `arch::init` has loaded the GDT the `STAR`
    // selector arithmetic depends on, and before any ring-3 code exists to
    // execute `syscall`.
    unsafe {
        arch::x86_64::syscall::init();
    }
    log::info!("syscall gate armed");

    sched::init();
    log::info!("scheduler ready");

    keyboard::init();

    // SAFETY: the PIC has remapped IRQ0 but both lines are still masked
    // (unmasked below, after this call, per `timer::init`'s contract).
    unsafe {
        arch::x86_64::timer::init(arch::x86_64::timer::DEFAULT_FREQUENCY_HZ);
    }
    log::info!("timer armed at {} Hz", arch::x86_64::timer::DEFAULT_FREQUENCY_HZ);

    arch::x86_64::pic::unmask(irq::IRQ_TIMER);
    arch::x86_64::pic::unmask(irq::IRQ_KEYBOARD);

    arch::enable_interrupts();
    log::info!("interrupts enabled");

    match arch::x86_64::usermode::spawn_demo_process() {
        Ok(pid) => log::info!("demo process {pid} scheduled"),
        Err(e) => log::error!("failed to map demo program: {e:?}"),
    }

    // Hands off to the scheduler: the boot flow has been the idle thread's
    // identity since `sched::init`, so this both starts the demo process
    // and becomes the idle loop once it and everything after it yields back.
    sched::schedule();
    loop {
        arch::idle();
    }
}
