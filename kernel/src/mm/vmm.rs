//! Virtual memory manager.
//!
//! Bring-up happens in two phases. First, a static 16 MiB identity mapping
//! built from 2 MiB huge pages in three link-time-reserved tables gets the
//! kernel running with paging enabled without ever calling the frame
//! allocator. Second, once the PMM is up, [`map_page`]/[`unmap_page`] and
//! friends extend the same PML4 with ordinary 4 KiB mappings backed by
//! PMM-allocated intermediate tables.

#![allow(dead_code)]

use spin::Mutex;

use super::{
    frame_allocator,
    page_table::{self, PageMapper, PageTable},
    FrameNumber, KernelError, KernelResult, PageFlags, PhysicalAddress, VirtualAddress, FRAME_SIZE,
};

/// Size of the static huge-page bootstrap mapping.
pub const BOOTSTRAP_SIZE: u64 = 16 * 1024 * 1024;
const HUGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;
const BOOTSTRAP_HUGE_PAGES: usize = (BOOTSTRAP_SIZE / HUGE_PAGE_SIZE) as usize;

static mut PML4: PageTable = PageTable::new();
static mut PDPT: PageTable = PageTable::new();
static mut PD: PageTable = PageTable::new();

static KERNEL_MAPPER: Mutex<Option<PageMapper>> = Mutex::new(None);

/// Build the static huge-page bootstrap mapping, load it into CR3, and
/// install the dynamic mapper over the same PML4 for everything that comes
/// after.
///
/// # Safety
///
/// Must run exactly once, after the frame allocator is up (so later dynamic
/// mappings have somewhere to get intermediate-table frames from) and before
/// any code depends on an identity mapping beyond the bootloader's own.
pub unsafe fn init() {
    // SAFETY: single-threaded bring-up, called once; no other code touches
    // these statics until this function publishes `KERNEL_MAPPER`.
    let (pml4_ptr, pdpt_ptr, pd_ptr) = unsafe {
        let pml4_ptr = core::ptr::addr_of_mut!(PML4);
        let pdpt_ptr = core::ptr::addr_of_mut!(PDPT);
        let pd_ptr = core::ptr::addr_of_mut!(PD);
        (*pml4_ptr).zero();
        (*pdpt_ptr).zero();
        (*pd_ptr).zero();
        (pml4_ptr, pdpt_ptr, pd_ptr)
    };

    let pdpt_phys = PhysicalAddress::new(pdpt_ptr as u64);
    let pd_phys = PhysicalAddress::new(pd_ptr as u64);
    let pml4_phys = PhysicalAddress::new(pml4_ptr as u64);

    // SAFETY: `pd_ptr`/`pdpt_ptr`/`pml4_ptr` are valid for the duration of
    // this function; no aliasing reference exists yet.
    unsafe {
        for i in 0..BOOTSTRAP_HUGE_PAGES {
            let frame = FrameNumber::new((i as u64 * HUGE_PAGE_SIZE) >> super::FRAME_SHIFT);
            (*pd_ptr)[i].set(frame, PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::HUGE);
        }
        (*pdpt_ptr)[0].set_addr(pd_phys, PageFlags::PRESENT | PageFlags::WRITABLE);
        (*pml4_ptr)[0].set_addr(pdpt_phys, PageFlags::PRESENT | PageFlags::WRITABLE);
        (*pml4_ptr)[page_table::RECURSIVE_INDEX as usize]
            .set_addr(pml4_phys, PageFlags::PRESENT | PageFlags::WRITABLE);
    }

    // SAFETY: the tables above map at least the currently executing kernel
    // image (contained within the 16 MiB identity range) and its stack.
    unsafe {
        page_table::write_cr3(pml4_phys);
    }

    // SAFETY: `pml4_ptr` stays valid for the lifetime of the kernel; it is a
    // `'static` item and nothing else holds a `&mut` to it after this point.
    let mapper = unsafe { PageMapper::new(pml4_ptr) };
    *KERNEL_MAPPER.lock() = Some(mapper);
}

fn with_mapper<R>(f: impl FnOnce(&mut PageMapper) -> R) -> R {
    let mut guard = KERNEL_MAPPER.lock();
    let mapper = guard.as_mut().expect("vmm::init was not called");
    f(mapper)
}

/// Map a single 4 KiB page.
pub fn map_page(virt: VirtualAddress, phys: PhysicalAddress, flags: PageFlags) -> KernelResult<()> {
    let frame = FrameNumber::from_addr(phys);
    with_mapper(|mapper| mapper.map_page(virt, frame, flags))
}

/// Allocate a fresh physical frame and map it at `virt`. Used by the heap
/// when it needs to grow into unbacked virtual address space.
pub fn map_new_page(virt: VirtualAddress, flags: PageFlags) -> KernelResult<PhysicalAddress> {
    let phys = frame_allocator::alloc_frame().ok_or(KernelError::OutOfMemory)?;
    if let Err(e) = map_page(virt, phys, flags) {
        let _ = frame_allocator::free_frame(phys);
        return Err(e);
    }
    Ok(phys)
}

/// Unmap a single page and return the frame that backed it. Does not free
/// the frame back to the allocator — callers that own the frame decide that.
pub fn unmap_page(virt: VirtualAddress) -> KernelResult<PhysicalAddress> {
    with_mapper(|mapper| mapper.unmap_page(virt)).map(|f| f.addr())
}

/// Map `len` bytes (rounded up to whole pages) starting at `virt`/`phys`.
pub fn map_range(
    virt_start: VirtualAddress,
    phys_start: PhysicalAddress,
    len: usize,
    flags: PageFlags,
) -> KernelResult<()> {
    let pages = len.div_ceil(FRAME_SIZE);
    for i in 0..pages {
        let offset = (i * FRAME_SIZE) as u64;
        map_page(
            virt_start.offset(offset as i64),
            phys_start.offset(offset),
            flags,
        )?;
    }
    Ok(())
}

/// Unmap `len` bytes (rounded up to whole pages) starting at `virt`.
pub fn unmap_range(virt_start: VirtualAddress, len: usize) -> KernelResult<()> {
    let pages = len.div_ceil(FRAME_SIZE);
    for i in 0..pages {
        unmap_page(virt_start.offset((i * FRAME_SIZE) as i64))?;
    }
    Ok(())
}

/// Look up the raw page table entry backing `virt`, without allocating.
pub fn get_pte(virt: VirtualAddress) -> Option<page_table::PageTableEntry> {
    with_mapper(|mapper| mapper.get_pte(virt))
}

/// Translate a mapped virtual address to its physical address.
pub fn get_physical(virt: VirtualAddress) -> Option<PhysicalAddress> {
    with_mapper(|mapper| mapper.get_physical(virt))
}

/// Flush the TLB entry for a single address.
pub fn flush_tlb_single(virt: VirtualAddress) {
    crate::arch::x86_64::tlb_flush_address(virt.as_u64());
}

/// Flush the entire TLB.
pub fn flush_tlb() {
    crate::arch::x86_64::tlb_flush_all();
}
