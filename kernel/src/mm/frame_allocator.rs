//! Physical frame allocator.
//!
//! A flat bitmap over physical memory: one bit per 4 KiB frame, `1` meaning
//! free. The bitmap covers up to 32 GiB of physical address space (1 MiB of
//! bitmap storage). Allocation is first-fit; there is no buddy system, no
//! NUMA awareness, and no per-size-class pooling — callers that need
//! contiguous multi-frame ranges ask for them directly.

use spin::Mutex;

use super::{FrameNumber, KernelError, KernelResult, PhysicalAddress, FRAME_SIZE};
use crate::boot_info::{BootInfo, MemoryRegionType};

/// Frames below this PFN are never handed out: real-mode IVT, BDA, and
/// other BIOS-owned low memory.
const RESERVED_LOW_FRAMES: u64 = 256; // 0 - 1 MiB

/// Bitmap storage, sized to cover 32 GiB of physical memory (one bit per
/// frame).
const BITMAP_BYTES: usize = 1024 * 1024;
const BITMAP_WORDS: usize = BITMAP_BYTES / 8;
const MAX_FRAMES: u64 = (BITMAP_BYTES * 8) as u64;

struct Bitmap {
    words: [u64; BITMAP_WORDS],
    total_frames: u64,
    free_frames: u64,
}

impl Bitmap {
    const fn new() -> Self {
        Self {
            words: [0; BITMAP_WORDS],
            total_frames: 0,
            free_frames: 0,
        }
    }

    fn set_free(&mut self, frame: u64, free: bool) {
        let word = (frame / 64) as usize;
        let bit = frame % 64;
        let was_free = self.words[word] & (1 << bit) != 0;
        if free == was_free {
            return;
        }
        if free {
            self.words[word] |= 1 << bit;
            self.free_frames += 1;
        } else {
            self.words[word] &= !(1 << bit);
            self.free_frames -= 1;
        }
    }

    fn is_free(&self, frame: u64) -> bool {
        let word = (frame / 64) as usize;
        let bit = frame % 64;
        self.words[word] & (1 << bit) != 0
    }

    /// First-fit scan for `count` contiguous free frames.
    fn find_run(&self, count: u64) -> Option<u64> {
        let mut run_start = None;
        let mut run_len = 0u64;
        for frame in RESERVED_LOW_FRAMES..self.total_frames {
            if self.is_free(frame) {
                if run_len == 0 {
                    run_start = Some(frame);
                }
                run_len += 1;
                if run_len == count {
                    return run_start;
                }
            } else {
                run_len = 0;
                run_start = None;
            }
        }
        None
    }
}

static BITMAP: Mutex<Bitmap> = Mutex::new(Bitmap::new());

/// Bring up the frame allocator over the memory reported by `boot_info`.
///
/// Every frame starts reserved; usable ranges from the memory map are then
/// marked free, and the low 1 MiB plus the kernel's own image are reserved
/// again on top so they can never be handed out.
///
/// # Safety
///
/// Must run once, before any other code calls [`alloc_frame`].
pub unsafe fn init(boot_info: Option<&BootInfo>) {
    let mut bitmap = BITMAP.lock();
    bitmap.total_frames = MAX_FRAMES;
    bitmap.free_frames = 0;

    match boot_info.filter(|b| b.is_valid()) {
        Some(info) => {
            for region in info.memory_map.iter() {
                if region.region_type != MemoryRegionType::Conventional {
                    continue;
                }
                let start_frame = region.phys_start / FRAME_SIZE as u64;
                let end_frame = (start_frame + region.pages).min(MAX_FRAMES);
                for frame in start_frame..end_frame {
                    bitmap.set_free(frame, true);
                }
            }
        }
        None => {
            // No memory map: assume 16 MiB total, minus the low 1 MiB
            // reserved below.
            let fallback_frames = (16 * 1024 * 1024 / FRAME_SIZE) as u64;
            for frame in 0..fallback_frames.min(MAX_FRAMES) {
                bitmap.set_free(frame, true);
            }
        }
    }

    for frame in 0..RESERVED_LOW_FRAMES {
        bitmap.set_free(frame, false);
    }

    if let Some(info) = boot_info {
        let start = info.kernel_phys_base / FRAME_SIZE as u64;
        let end = start + info.kernel_size.div_ceil(FRAME_SIZE as u64);
        for frame in start..end.min(MAX_FRAMES) {
            bitmap.set_free(frame, false);
        }
    }
}

/// Allocate a single physical frame. Returns `None` when memory is exhausted.
pub fn alloc_frame() -> Option<PhysicalAddress> {
    alloc_frames(1)
}

/// Allocate `count` contiguous physical frames.
pub fn alloc_frames(count: usize) -> Option<PhysicalAddress> {
    if count == 0 {
        return None;
    }
    let mut bitmap = BITMAP.lock();
    let start = bitmap.find_run(count as u64)?;
    for frame in start..start + count as u64 {
        bitmap.set_free(frame, false);
    }
    Some(FrameNumber::new(start).addr())
}

/// Free a single previously allocated frame.
pub fn free_frame(phys: PhysicalAddress) -> KernelResult<()> {
    free_frames(phys, 1)
}

/// Free `count` contiguous frames starting at `phys`.
pub fn free_frames(phys: PhysicalAddress, count: usize) -> KernelResult<()> {
    if !phys.is_frame_aligned() {
        return Err(KernelError::InvalidArgument);
    }
    let start = phys.frame().as_u64();
    let mut bitmap = BITMAP.lock();
    if start + count as u64 > bitmap.total_frames {
        return Err(KernelError::InvalidArgument);
    }
    for frame in start..start + count as u64 {
        if bitmap.is_free(frame) {
            return Err(KernelError::CorruptState);
        }
        bitmap.set_free(frame, true);
    }
    Ok(())
}

/// Mark a single physical frame used without going through the allocator —
/// used to protect frames (boot page tables, the kernel image) that are
/// "allocated" before the allocator itself exists.
pub fn mark_used(phys: PhysicalAddress) {
    mark_used_range(phys, 1);
}

/// Mark `count` contiguous frames used.
pub fn mark_used_range(phys: PhysicalAddress, count: usize) {
    let start = phys.frame().as_u64();
    let mut bitmap = BITMAP.lock();
    for frame in start..(start + count as u64).min(bitmap.total_frames) {
        bitmap.set_free(frame, false);
    }
}

/// Number of frames currently free.
pub fn free_frame_count() -> u64 {
    BITMAP.lock().free_frames
}

/// Total number of frames the allocator is aware of.
pub fn total_frame_count() -> u64 {
    BITMAP.lock().total_frames
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reset_with_free_range(start: u64, count: u64) {
        let mut bitmap = BITMAP.lock();
        *bitmap = Bitmap::new();
        bitmap.total_frames = MAX_FRAMES;
        for frame in start..start + count {
            bitmap.set_free(frame, true);
        }
    }

    #[test]
    fn pfn_zero_is_never_allocated() {
        reset_with_free_range(0, 1024);
        let phys = alloc_frame().expect("allocation should succeed with frames free");
        assert_ne!(phys.frame().as_u64(), 0);
    }

    #[test]
    fn alloc_then_free_is_reusable() {
        reset_with_free_range(RESERVED_LOW_FRAMES, 8);
        let a = alloc_frame().unwrap();
        free_frame(a).unwrap();
        let b = alloc_frame().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn contiguous_allocation_is_actually_contiguous() {
        reset_with_free_range(RESERVED_LOW_FRAMES, 16);
        let base = alloc_frames(4).unwrap();
        assert!(base.is_frame_aligned());
        for i in 0..4 {
            assert!(!BITMAP.lock().is_free(base.frame().as_u64() + i));
        }
    }

    #[test]
    fn exhaustion_returns_none_not_panic() {
        reset_with_free_range(RESERVED_LOW_FRAMES, 1);
        let _ = alloc_frame().unwrap();
        assert!(alloc_frame().is_none());
    }

    #[test]
    fn double_free_is_rejected() {
        reset_with_free_range(RESERVED_LOW_FRAMES, 2);
        let a = alloc_frame().unwrap();
        free_frame(a).unwrap();
        assert!(free_frame(a).is_err());
    }
}
