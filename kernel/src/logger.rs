//! Installs the `log`-crate facade used by every other module's
//! `log::info!`/`warn!`/`error!` calls, backed by [`crate::console`]'s
//! default sink.
//!
//! Named `logger`, not `log`, so it never shadows the `log` crate's own path
//! at call sites scattered through the rest of the kernel.

use core::fmt::Write;

use log::{Log, Metadata, Record};

struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        crate::console::write(s.as_bytes());
        Ok(())
    }
}

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut w = ConsoleWriter;
        // No timestamp until the PIT is programmed: before that, a tick
        // count would read as real elapsed time when it's just zero.
        if crate::arch::x86_64::timer::is_ready() {
            let ms = crate::arch::x86_64::timer::milliseconds();
            let _ = write!(w, "[{:>6}.{:03}] {:<5} {}\n", ms / 1000, ms % 1000, record.level(), record.args());
        } else {
            let _ = write!(w, "[ --.--- ] {:<5} {}\n", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Installs the global logger. Must run before any other subsystem's
/// `init()`, so every later `log::info!`/`warn!`/`error!` call actually
/// reaches the console instead of being dropped by `log`'s no-op default.
///
/// # Panics
///
/// Panics if called more than once, which would only happen on a
/// programming error in [`crate::kernel_main`].
pub fn init() {
    log::set_logger(&LOGGER).expect("logger::init called more than once");
    log::set_max_level(log::LevelFilter::Trace);
}
