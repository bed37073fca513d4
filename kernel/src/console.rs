//! Console sinks satisfying the "opaque logger with a `write(bytes)`
//! contract" the syscall table's `write(1, ...)`/`write(2, ...)` need
//! somewhere observable to land.
//!
//! The serial port is the default sink used by `write()`. A VGA text-buffer
//! writer is provided behind the same shape for parity with the hardware
//! interfaces list, but nothing wires it to a syscall by default.

/// A sink that can absorb raw console bytes.
pub trait ConsoleSink {
    fn write(&self, bytes: &[u8]);
}

/// Writes to the default console sink (the serial port).
pub fn write(bytes: &[u8]) {
    serial::write(bytes);
}

pub mod serial {
    //! Thin wrapper over [`crate::arch::x86_64::serial`]'s persisted port.

    use core::fmt::Write;

    pub fn write(bytes: &[u8]) {
        // A no_std kernel console has no encoding guarantees on its input;
        // lossily rendering non-UTF8 bytes beats dropping them.
        let s = core::str::from_utf8(bytes).unwrap_or("\u{FFFD}");
        x86_64::instructions::interrupts::without_interrupts(|| {
            let _ = crate::arch::x86_64::serial::port().write_str(s);
        });
    }
}

pub mod vga {
    //! 80x25 VGA text-mode buffer at physical 0xB8000, identity-mapped by
    //! the VMM's static bootstrap. Unwired by default (see module docs).

    use core::ptr::write_volatile;
    use spin::Mutex;

    const WIDTH: usize = 80;
    const HEIGHT: usize = 25;
    const BUFFER: usize = 0xB8000;
    const DEFAULT_ATTR: u8 = 0x07; // light grey on black

    struct VgaWriter {
        col: usize,
        row: usize,
    }

    impl VgaWriter {
        const fn new() -> Self {
            Self { col: 0, row: 0 }
        }

        fn cell(row: usize, col: usize) -> *mut u16 {
            (BUFFER + (row * WIDTH + col) * 2) as *mut u16
        }

        fn put_byte(&mut self, byte: u8) {
            if byte == b'\n' {
                self.newline();
                return;
            }
            if self.col >= WIDTH {
                self.newline();
            }
            let cell = ((DEFAULT_ATTR as u16) << 8) | byte as u16;
            // SAFETY: `row`/`col` are kept within [0, HEIGHT)/[0, WIDTH) by
            // `newline`/the bound check above, and 0xB8000 is identity
            // mapped by the VMM's static bootstrap.
            unsafe { write_volatile(Self::cell(self.row, self.col), cell) };
            self.col += 1;
        }

        fn newline(&mut self) {
            self.col = 0;
            self.row += 1;
            if self.row >= HEIGHT {
                self.row = HEIGHT - 1;
                self.scroll();
            }
        }

        fn scroll(&mut self) {
            for row in 1..HEIGHT {
                for col in 0..WIDTH {
                    // SAFETY: see `put_byte`; both source and destination
                    // cells are within the mapped 80x25 buffer.
                    unsafe {
                        let value = Self::cell(row, col).read_volatile();
                        write_volatile(Self::cell(row - 1, col), value);
                    }
                }
            }
            let blank = ((DEFAULT_ATTR as u16) << 8) | b' ' as u16;
            for col in 0..WIDTH {
                // SAFETY: see `put_byte`.
                unsafe { write_volatile(Self::cell(HEIGHT - 1, col), blank) };
            }
        }
    }

    static WRITER: Mutex<VgaWriter> = Mutex::new(VgaWriter::new());

    pub fn write(bytes: &[u8]) {
        let mut writer = WRITER.lock();
        for &byte in bytes {
            writer.put_byte(byte);
        }
    }
}
