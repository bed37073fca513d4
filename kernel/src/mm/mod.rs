//! Memory management: physical frames, page tables, virtual memory, and the
//! kernel heap.

#![allow(dead_code)]

pub mod frame_allocator;
pub mod heap;
pub mod page_table;
pub mod vmm;

use crate::boot_info::BootInfo;
pub use crate::error::{KernelError, KernelResult};

/// Size of a physical page frame.
pub const FRAME_SIZE: usize = 4096;
/// log2(FRAME_SIZE)
pub const FRAME_SHIFT: u32 = 12;

/// A physical memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalAddress(u64);

impl PhysicalAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub const fn is_frame_aligned(&self) -> bool {
        self.0 & (FRAME_SIZE as u64 - 1) == 0
    }

    pub const fn align_down(&self) -> Self {
        Self(self.0 & !(FRAME_SIZE as u64 - 1))
    }

    pub const fn align_up(&self) -> Self {
        Self((self.0 + FRAME_SIZE as u64 - 1) & !(FRAME_SIZE as u64 - 1))
    }

    pub const fn offset(&self, offset: u64) -> Self {
        Self(self.0 + offset)
    }

    pub const fn frame(&self) -> FrameNumber {
        FrameNumber::new(self.0 >> FRAME_SHIFT)
    }
}

/// A virtual memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtualAddress(u64);

impl VirtualAddress {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn as_usize(&self) -> usize {
        self.0 as usize
    }

    pub const fn as_ptr<T>(&self) -> *const T {
        self.0 as *const T
    }

    pub const fn as_mut_ptr<T>(&self) -> *mut T {
        self.0 as *mut T
    }

    pub const fn is_frame_aligned(&self) -> bool {
        self.0 & (FRAME_SIZE as u64 - 1) == 0
    }

    pub const fn align_down(&self) -> Self {
        Self(self.0 & !(FRAME_SIZE as u64 - 1))
    }

    pub const fn align_up(&self) -> Self {
        Self((self.0 + FRAME_SIZE as u64 - 1) & !(FRAME_SIZE as u64 - 1))
    }

    pub const fn offset(&self, offset: i64) -> Self {
        Self((self.0 as i64 + offset) as u64)
    }
}

/// A physical page-frame number (address / FRAME_SIZE).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(u64);

impl FrameNumber {
    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub const fn from_addr(addr: PhysicalAddress) -> Self {
        Self(addr.as_u64() >> FRAME_SHIFT)
    }

    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    pub const fn addr(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.0 << FRAME_SHIFT)
    }
}

bitflags::bitflags! {
    /// Page table entry flags, laid out to match the x86_64 hardware PTE bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const HUGE          = 1 << 7;
        const GLOBAL        = 1 << 8;
        const NO_EXECUTE    = 1 << 63;
    }
}

impl PageFlags {
    /// Flags for ordinary kernel-owned read/write data.
    pub const KERNEL_DATA: Self = Self::PRESENT.union(Self::WRITABLE).union(Self::NO_EXECUTE);
    /// Flags for user-accessible read/write data.
    pub const USER_DATA: Self = Self::PRESENT
        .union(Self::WRITABLE)
        .union(Self::USER)
        .union(Self::NO_EXECUTE);
}

/// Page size variants understood by the VMM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSize {
    /// 4 KiB page.
    Small = FRAME_SIZE as isize,
    /// 2 MiB huge page.
    Huge = 2 * 1024 * 1024,
}

/// Bring up the full memory hierarchy: physical frame allocator, virtual
/// memory manager, and kernel heap, in that order.
///
/// # Safety
///
/// Must be called exactly once, early in boot, before any code touches
/// dynamic memory (`alloc`) or installs additional page mappings.
pub unsafe fn init(boot_info: Option<&BootInfo>) {
    // SAFETY: called once during early boot, before any frame is handed out.
    unsafe {
        frame_allocator::init(boot_info);
    }
    log::info!(
        "[mm] frame allocator ready, {} frames free",
        frame_allocator::free_frame_count()
    );

    // SAFETY: the static 16 MiB bootstrap mapping has not been installed yet.
    unsafe {
        vmm::init();
    }
    log::info!("[mm] virtual memory bootstrap mapping installed");

    // SAFETY: the VMM is up, so heap growth can map fresh pages on demand.
    unsafe {
        heap::init();
    }
    log::info!(
        "[mm] kernel heap ready at {:#x}",
        heap::HEAP_START
    );
}
