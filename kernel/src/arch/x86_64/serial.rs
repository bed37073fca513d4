//! x86_64 serial port driver for kernel debugging output and the console
//! sink (`crate::console::serial`).
//!
//! Uses the `uart_16550` crate to interface with COM1 at I/O port 0x3F8. The
//! port is initialized exactly once, the first time anything locks
//! [`SERIAL1`], and stays persisted for the life of the kernel.

use lazy_static::lazy_static;
use spin::{Mutex, MutexGuard};
use uart_16550::SerialPort;

lazy_static! {
    pub static ref SERIAL1: Mutex<SerialPort> = {
        let mut serial_port = unsafe { SerialPort::new(0x3F8) };
        serial_port.init();
        Mutex::new(serial_port)
    };
}

/// Locks the persisted COM1 port for direct `fmt::Write` use.
pub fn port() -> MutexGuard<'static, SerialPort> {
    SERIAL1.lock()
}

#[doc(hidden)]
pub fn _print(args: ::core::fmt::Arguments) {
    use core::fmt::Write;

    use x86_64::instructions::interrupts;

    interrupts::without_interrupts(|| {
        SERIAL1
            .lock()
            .write_fmt(args)
            .expect("Printing to serial failed");
    });
}
