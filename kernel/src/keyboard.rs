//! PS/2 keyboard IRQ1 handler and bounded scancode ring buffer.
//!
//! Scancode-to-key decoding is delegated to `pc_keyboard` (set 1, US layout);
//! this module owns only the IRQ-side plumbing: reading port 0x60, feeding
//! the decoder, and landing decoded bytes in a fixed-capacity ring that
//! `sys_read(0, ...)` drains.

use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;
use x86_64::instructions::port::Port;

const RING_CAPACITY: usize = 256;

struct Ring {
    buf: [u8; RING_CAPACITY],
    head: usize,
    len: usize,
    overflow: u64,
}

impl Ring {
    const fn new() -> Self {
        Self {
            buf: [0; RING_CAPACITY],
            head: 0,
            len: 0,
            overflow: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.len == RING_CAPACITY {
            // Consumer too slow: drop the oldest byte rather than block the
            // IRQ handler.
            self.head = (self.head + 1) % RING_CAPACITY;
            self.len -= 1;
            self.overflow = self.overflow.saturating_add(1);
        }
        let tail = (self.head + self.len) % RING_CAPACITY;
        self.buf[tail] = byte;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % RING_CAPACITY;
        self.len -= 1;
        Some(byte)
    }
}

static RING: Mutex<Ring> = Mutex::new(Ring::new());
static DECODER: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(Keyboard::new(
    ScancodeSet1::new(),
    layouts::Us104Key,
    HandleControl::Ignore,
));

/// Called once from the IRQ bring-up sequence. Does not touch hardware —
/// the PIC remap/unmask already happened.
pub fn init() {
    log::info!("keyboard ring buffer ready ({RING_CAPACITY} bytes)");
}

/// Called from [`crate::irq::handle_irq`] on IRQ1.
pub fn handle_interrupt() {
    // SAFETY: port 0x60 is the PS/2 controller's data port; reading it here
    // is exactly what the controller expects in response to IRQ1.
    let scancode: u8 = unsafe { Port::new(0x60).read() };

    let mut decoder = DECODER.lock();
    if let Ok(Some(event)) = decoder.add_byte(scancode) {
        if let Some(DecodedKey::Unicode(c)) = decoder.process_keyevent(event) {
            let mut utf8_buf = [0u8; 4];
            for byte in c.encode_utf8(&mut utf8_buf).bytes() {
                RING.lock().push(byte);
            }
        }
    }
}

/// Pops one decoded byte, non-blocking.
pub fn read_byte() -> Option<u8> {
    RING.lock().pop()
}

/// Blocks (via `hlt` + scheduler yield) until a byte is available.
pub fn read_blocking() -> u8 {
    loop {
        if let Some(byte) = read_byte() {
            return byte;
        }
        crate::sched::yield_now();
    }
}

/// Number of bytes dropped because the consumer fell behind.
pub fn overflow_count() -> u64 {
    RING.lock().overflow
}
